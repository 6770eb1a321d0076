use crate::config::{NoiseModel, PipelineConfig};
use crate::core::dispersion::ClassificationMasks;
use crate::core::phase_filter::unwrap_series;
use crate::types::{PhaseCube, PixelMask, QualityMap, SarError, SarResult, Stage};
use ndarray::{Array1, Array2, Axis, Zip};

/// Smallest coherence fed into `-2 ln γ`, keeps the noise of incoherent pixels finite
const MIN_COHERENCE: f64 = 1e-12;

/// Scene-calibrated reliability cutoffs
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdaptiveThresholds {
    /// Points need `coherence >= coherence`
    pub coherence: f64,
    /// Points need `noise <= noise`
    pub noise: f64,
}

/// Temporal coherence and phase-noise estimation on arc-phase series
pub struct TemporalNoiseEstimator {
    model: NoiseModel,
    percentile: f64,
}

impl TemporalNoiseEstimator {
    pub fn new(model: NoiseModel, percentile: f64) -> Self {
        Self { model, percentile }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.noise_model, config.noise_percentile)
    }

    pub fn model(&self) -> NoiseModel {
        self.model
    }

    pub fn percentile(&self) -> f64 {
        self.percentile
    }

    /// γ = |mean_t exp(iφ_t)| per pixel, in [0, 1]
    pub fn compute_temporal_coherence(arc_phases: &PhaseCube) -> QualityMap {
        let (_, rows, cols) = arc_phases.dim();
        let mut coherence = Array2::<f64>::zeros((rows, cols));

        zip_for_each!(Zip::from(&mut coherence).and(arc_phases.lanes(Axis(0))), |gamma, series| {
            *gamma = circular_coherence(series.iter().copied());
        });

        log::debug!(
            "Temporal coherence: mean {:.3} over {} pixels",
            coherence.mean().unwrap_or(0.0),
            rows * cols
        );
        coherence
    }

    /// Phase standard deviation per pixel according to the configured noise model
    ///
    /// `times` gives the sample time of every slot and is only used by the
    /// detrending model.
    pub fn estimate_phase_noise(&self, arc_phases: &PhaseCube, times: &Array1<f64>) -> SarResult<QualityMap> {
        let (slots, rows, cols) = arc_phases.dim();
        if times.len() != slots {
            return Err(SarError::Data {
                stage: Stage::TemporalNoise,
                message: format!("{} sample times for {} arc-phase slots", times.len(), slots),
            });
        }
        log::info!("Estimating phase noise ({:?}) for {} x {} pixels", self.model, rows, cols);

        let mut noise = Array2::<f64>::zeros((rows, cols));
        match self.model {
            NoiseModel::CircularVariance => {
                zip_for_each!(Zip::from(&mut noise).and(arc_phases.lanes(Axis(0))), |sigma, series| {
                    let gamma = circular_coherence(series.iter().copied()).max(MIN_COHERENCE);
                    *sigma = (-2.0 * gamma.ln()).max(0.0).sqrt();
                });
            }
            NoiseModel::DetrendedResidual => {
                let t = times.to_vec();
                zip_for_each!(Zip::from(&mut noise).and(arc_phases.lanes(Axis(0))), |sigma, series| {
                    let mut unwrapped = series.to_vec();
                    unwrap_series(&mut unwrapped);
                    *sigma = detrended_std(&t, &unwrapped);
                });
            }
        }

        Ok(noise)
    }

    /// Percentile cutoffs of the coherence and noise maps
    ///
    /// The coherence cutoff is the `percentile`-th percentile of the coherence
    /// map and the noise cutoff the `(100 - percentile)`-th percentile of the
    /// noise map, so both keep the same share of the scene. Non-finite values
    /// are ignored; an empty map yields a NaN cutoff that rejects every point.
    pub fn compute_adaptive_thresholds(
        coherence_map: &QualityMap,
        noise_map: &QualityMap,
        percentile: f64,
    ) -> SarResult<AdaptiveThresholds> {
        if !(0.0..=100.0).contains(&percentile) {
            return Err(SarError::Configuration {
                stage: Stage::TemporalNoise,
                message: format!("percentile {} must lie in [0, 100]", percentile),
            });
        }

        let coherence = percentile_of(coherence_map.iter().copied(), percentile);
        let noise = percentile_of(noise_map.iter().copied(), 100.0 - percentile);

        for (name, map) in [("coherence", coherence_map), ("noise", noise_map)] {
            if is_degenerate(map) {
                log::warn!(
                    "{} map is empty or constant: the adaptive filter will pass or reject all points",
                    name
                );
            }
        }

        log::info!(
            "Adaptive thresholds at P{}: coherence >= {:.4}, noise <= {:.4}",
            percentile,
            coherence,
            noise
        );
        Ok(AdaptiveThresholds { coherence, noise })
    }

    /// Intersect the classification masks with the reliability criteria
    pub fn filter_noisy_points(
        masks: &ClassificationMasks,
        coherence_map: &QualityMap,
        noise_map: &QualityMap,
        thresholds: &AdaptiveThresholds,
    ) -> SarResult<ClassificationMasks> {
        let shape = masks.shape();
        if coherence_map.dim() != shape || noise_map.dim() != shape {
            return Err(SarError::Data {
                stage: Stage::TemporalNoise,
                message: format!(
                    "mask shape {:?} does not match coherence {:?} / noise {:?}",
                    shape,
                    coherence_map.dim(),
                    noise_map.dim()
                ),
            });
        }

        let reliable: PixelMask = Zip::from(coherence_map)
            .and(noise_map)
            .map_collect(|&gamma, &sigma| gamma >= thresholds.coherence && sigma <= thresholds.noise);

        let first_order = &masks.first_order & &reliable;
        let tcs = &masks.tcs & &reliable;
        let filtered = ClassificationMasks { first_order, tcs };

        log::info!(
            "Reliability filter kept {}/{} first-order and {}/{} TCS points",
            filtered.count_first_order(),
            masks.count_first_order(),
            filtered.count_tcs(),
            masks.count_tcs()
        );
        Ok(filtered)
    }
}

/// Mean resultant length of a set of phases
fn circular_coherence<I: Iterator<Item = f64>>(phases: I) -> f64 {
    let mut n = 0usize;
    let (mut re, mut im) = (0.0f64, 0.0f64);
    for phi in phases {
        re += phi.cos();
        im += phi.sin();
        n += 1;
    }
    if n == 0 {
        return 0.0;
    }
    (re.hypot(im) / n as f64).min(1.0)
}

/// Population standard deviation of `y` around its least-squares line in `t`
fn detrended_std(t: &[f64], y: &[f64]) -> f64 {
    let n = y.len();
    if n < 2 {
        return 0.0;
    }
    let nf = n as f64;
    let t_mean = t.iter().sum::<f64>() / nf;
    let y_mean = y.iter().sum::<f64>() / nf;
    let sxx: f64 = t.iter().map(|&ti| (ti - t_mean).powi(2)).sum();
    let sxy: f64 = t.iter().zip(y).map(|(&ti, &yi)| (ti - t_mean) * (yi - y_mean)).sum();
    let slope = if sxx > 0.0 { sxy / sxx } else { 0.0 };

    let ss: f64 = t
        .iter()
        .zip(y)
        .map(|(&ti, &yi)| (yi - y_mean - slope * (ti - t_mean)).powi(2))
        .sum();
    (ss / nf).sqrt()
}

/// Linear-interpolation percentile over the finite values
pub fn percentile_of<I: Iterator<Item = f64>>(values: I, percentile: f64) -> f64 {
    let mut sorted: Vec<f64> = values.filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return f64::NAN;
    }
    sorted.sort_by(|a, b| a.total_cmp(b));

    let rank = (percentile / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let frac = rank - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * frac
}

fn is_degenerate(map: &QualityMap) -> bool {
    let mut finite = map.iter().copied().filter(|v| v.is_finite());
    match finite.next() {
        None => true,
        Some(first) => finite.all(|v| v == first),
    }
}
