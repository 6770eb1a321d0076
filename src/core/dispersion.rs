use crate::config::PipelineConfig;
use crate::types::{PixelCoord, PixelMask, SarRealImage, SarResult, SlcStack};
use ndarray::{Array2, Axis, Zip};

/// Per-pixel amplitude statistics derived once from the SLC stack
#[derive(Debug, Clone)]
pub struct DispersionMaps {
    /// Amplitude dispersion index std/mean; `+inf` where the mean amplitude is zero
    pub adi: SarRealImage,
    pub mean_amplitude: SarRealImage,
}

/// First-order (PS) and TCS masks
///
/// Both masks share the stack's spatial shape and never overlap.
#[derive(Debug, Clone)]
pub struct ClassificationMasks {
    pub first_order: PixelMask,
    pub tcs: PixelMask,
}

impl ClassificationMasks {
    pub fn count_first_order(&self) -> usize {
        self.first_order.iter().filter(|&&v| v).count()
    }

    pub fn count_tcs(&self) -> usize {
        self.tcs.iter().filter(|&&v| v).count()
    }

    /// First-order coordinates in row-major order
    pub fn first_order_points(&self) -> Vec<PixelCoord> {
        mask_points(&self.first_order)
    }

    /// TCS coordinates in row-major order
    pub fn tcs_points(&self) -> Vec<PixelCoord> {
        mask_points(&self.tcs)
    }

    pub fn shape(&self) -> (usize, usize) {
        self.first_order.dim()
    }
}

/// Coordinates of every set pixel of a mask, row-major
pub fn mask_points(mask: &PixelMask) -> Vec<PixelCoord> {
    mask.indexed_iter()
        .filter(|(_, &set)| set)
        .map(|((row, col), _)| PixelCoord::new(row, col))
        .collect()
}

/// Amplitude-dispersion classifier
pub struct DispersionClassifier {
    adi_thr_ps: f32,
    adi_thr_tcs: f32,
    min_amplitude: f32,
}

impl DispersionClassifier {
    pub fn new(adi_thr_ps: f32, adi_thr_tcs: f32) -> Self {
        Self {
            adi_thr_ps,
            adi_thr_tcs,
            min_amplitude: 1e-6,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            adi_thr_ps: config.adi_thr_ps,
            adi_thr_tcs: config.adi_thr_tcs,
            min_amplitude: config.min_amplitude,
        }
    }

    /// Compute ADI and mean amplitude for every pixel
    pub fn compute_adi(&self, stack: &SlcStack) -> DispersionMaps {
        let (rows, cols) = stack.shape();
        log::info!(
            "Computing amplitude dispersion for {} acquisitions of {} x {} pixels",
            stack.num_acquisitions(),
            rows,
            cols
        );

        let amplitude = stack.amplitude();
        let mut adi = Array2::<f32>::zeros((rows, cols));
        let mut mean_amplitude = Array2::<f32>::zeros((rows, cols));
        let min_amplitude = self.min_amplitude as f64;

        zip_for_each!(
            Zip::from(&mut adi).and(&mut mean_amplitude).and(amplitude.lanes(Axis(0))),
            |adi_px, mean_px, series| {
                let n = series.len() as f64;
                // Accumulate in f64 to keep constant-amplitude pixels at ADI 0
                let mean = series.iter().map(|&a| a as f64).sum::<f64>() / n;
                let variance = series
                    .iter()
                    .map(|&a| (a as f64 - mean).powi(2))
                    .sum::<f64>()
                    / n;

                *mean_px = mean as f32;
                *adi_px = if mean > min_amplitude {
                    (variance.sqrt() / mean) as f32
                } else {
                    f32::INFINITY
                };
            }
        );

        let finite: Vec<f32> = adi.iter().copied().filter(|v| v.is_finite()).collect();
        if !finite.is_empty() {
            let mean_adi = finite.iter().sum::<f32>() / finite.len() as f32;
            log::debug!(
                "ADI statistics: {} valid pixels, mean ADI {:.3}, {} zero-amplitude pixels",
                finite.len(),
                mean_adi,
                rows * cols - finite.len()
            );
        }

        DispersionMaps { adi, mean_amplitude }
    }

    /// Threshold the ADI map into first-order and TCS masks
    ///
    /// `first_order = ADI <= ADI_THR_PS`, `tcs = ADI_THR_PS < ADI <= ADI_THR_TCS`.
    /// Zero-amplitude pixels carry `ADI = +inf` and therefore fall in neither.
    pub fn select_points(&self, maps: &DispersionMaps) -> ClassificationMasks {
        let ps = self.adi_thr_ps;
        let tcs = self.adi_thr_tcs;
        let min_amplitude = self.min_amplitude;

        let valid = Zip::from(&maps.adi)
            .and(&maps.mean_amplitude)
            .map_collect(|&adi, &mean| adi.is_finite() && mean > min_amplitude);

        let first_order = Zip::from(&maps.adi)
            .and(&valid)
            .map_collect(|&adi, &ok| ok && adi <= ps);
        let tcs_mask = Zip::from(&maps.adi)
            .and(&valid)
            .map_collect(|&adi, &ok| ok && adi > ps && adi <= tcs);

        let masks = ClassificationMasks {
            first_order,
            tcs: tcs_mask,
        };
        log::info!(
            "Point selection: {} first-order, {} TCS (ADI_THR_PS={}, ADI_THR_TCS={})",
            masks.count_first_order(),
            masks.count_tcs(),
            ps,
            tcs
        );
        if masks.count_first_order() == 0 {
            log::warn!("No first-order points selected; reference selection will fail");
        }
        masks
    }

    /// ADI computation followed by point selection
    pub fn classify(&self, stack: &SlcStack) -> SarResult<(DispersionMaps, ClassificationMasks)> {
        let maps = self.compute_adi(stack);
        let masks = self.select_points(&maps);
        Ok((maps, masks))
    }
}
