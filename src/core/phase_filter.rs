/*!
 * Temporal smoothing of arc-phase time series
 *
 * Linear filters are only meaningful on a continuous signal, so every pixel's
 * series is unwrapped along time (Itoh) and anchored to the master slot before
 * filtering. Filtered series and residuals stay unwrapped; wrap them again
 * only for display.
 *
 * Two independent smoothers are provided:
 * - Savitzky-Golay local polynomial fit (Savitzky & Golay, 1964), with the
 *   boundary samples taken from the polynomial of the first/last full window
 * - Butterworth low-pass as a cascade of second-order sections designed by the
 *   pre-warped bilinear transform, run forward and backward for zero phase
 */

use crate::config::{ButterworthParams, SavitzkyGolayParams};
use crate::core::arc_phase::{wrap_phase, ArcPhases};
use crate::types::{PhaseCube, SarError, SarResult, Stage};
use nalgebra::{DMatrix, RowDVector};
use ndarray::{Array1, Axis, Zip};
use rustfft::num_complex::Complex;
use rustfft::FftPlanner;
use std::f64::consts::PI;

/// Available temporal filter types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseFilterType {
    SavitzkyGolay,
    Butterworth,
}

/// Unwrapped input, filtered series and residual for one filter type
#[derive(Debug, Clone)]
pub struct FilteredPhase {
    pub filter_type: PhaseFilterType,
    /// Unwrapped arc phases anchored to the master slot
    pub unwrapped: PhaseCube,
    pub filtered: PhaseCube,
    /// `unwrapped - filtered`
    pub residual: PhaseCube,
}

/// Itoh unwrapping: accumulate wrapped sample-to-sample differences
///
/// Non-finite samples propagate as NaN to the rest of the series.
pub fn unwrap_series(series: &mut [f64]) {
    for i in 1..series.len() {
        let delta = wrap_phase(series[i] - series[i - 1]);
        series[i] = series[i - 1] + delta;
    }
}

/// Energy of the spectral components above `fraction` of the Nyquist frequency
pub fn high_frequency_energy(series: &[f64], fraction: f64) -> f64 {
    let n = series.len();
    if n < 2 {
        return 0.0;
    }

    let mut buffer: Vec<Complex<f64>> = series.iter().map(|&v| Complex::new(v, 0.0)).collect();
    let mut planner = FftPlanner::<f64>::new();
    planner.plan_fft_forward(n).process(&mut buffer);

    let nyquist = n as f64 / 2.0;
    buffer
        .iter()
        .enumerate()
        .filter(|(k, _)| {
            let bin = (*k).min(n - *k) as f64;
            bin / nyquist >= fraction
        })
        .map(|(_, c)| c.norm_sqr())
        .sum::<f64>()
        / n as f64
}

/// Savitzky-Golay smoother with precomputed least-squares projection
#[derive(Debug, Clone)]
pub struct SavitzkyGolay {
    params: SavitzkyGolayParams,
    /// (poly_order + 1) x window_length projection (AᵀA)⁻¹Aᵀ
    projection: DMatrix<f64>,
    /// Row 0 of the projection: the smoothing weights at the window centre
    centre: Vec<f64>,
}

impl SavitzkyGolay {
    pub fn new(params: SavitzkyGolayParams) -> SarResult<Self> {
        params.validate()?;

        let m = params.window_length;
        let p = params.poly_order + 1;
        let half = (m / 2) as f64;

        // Vandermonde design matrix on offsets -h..=h
        let design = DMatrix::from_fn(m, p, |i, j| (i as f64 - half).powi(j as i32));
        let normal = design.transpose() * &design;
        let inverse = normal.try_inverse().ok_or_else(|| {
            SarError::Processing("singular Savitzky-Golay normal matrix".to_string())
        })?;
        let projection = inverse * design.transpose();
        let centre = projection.row(0).iter().copied().collect();

        Ok(Self { params, projection, centre })
    }

    pub fn params(&self) -> &SavitzkyGolayParams {
        &self.params
    }

    /// Convolution weights evaluating the window polynomial at `offset` from the centre
    fn weights_at(&self, offset: f64) -> Vec<f64> {
        let powers = RowDVector::from_fn(self.projection.nrows(), |_, j| offset.powi(j as i32));
        (powers * &self.projection).iter().copied().collect()
    }

    pub fn check_length(&self, len: usize) -> SarResult<()> {
        if len < self.params.window_length {
            return Err(SarError::Configuration {
                stage: Stage::PhaseFilter,
                message: format!(
                    "Savitzky-Golay window {} is longer than the series ({} samples)",
                    self.params.window_length, len
                ),
            });
        }
        Ok(())
    }

    /// Smooth one series; its length must be at least the window length
    pub fn apply(&self, series: &[f64]) -> SarResult<Vec<f64>> {
        self.check_length(series.len())?;
        Ok(self.apply_unchecked(series))
    }

    fn apply_unchecked(&self, series: &[f64]) -> Vec<f64> {
        let n = series.len();
        let m = self.params.window_length;
        let half = m / 2;
        let centre = &self.centre;
        let dot = |weights: &[f64], start: usize| -> f64 {
            weights.iter().zip(&series[start..start + m]).map(|(w, x)| w * x).sum()
        };

        let mut out = vec![0.0; n];
        for i in half..n - half {
            out[i] = dot(centre, i - half);
        }
        for i in 0..half {
            out[i] = dot(&self.weights_at(i as f64 - half as f64), 0);
        }
        for i in n - half..n {
            let offset = (i - (n - m)) as f64 - half as f64;
            out[i] = dot(&self.weights_at(offset), n - m);
        }
        out
    }
}

/// Direct-form II transposed second-order section
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Biquad {
    pub b: [f64; 3],
    /// Denominator without the leading 1
    pub a: [f64; 2],
}

impl Biquad {
    fn dc_gain(&self) -> f64 {
        (self.b[0] + self.b[1] + self.b[2]) / (1.0 + self.a[0] + self.a[1])
    }

    /// Filter state at rest for a constant input `level`
    fn steady_state(&self, level: f64) -> [f64; 2] {
        let g = self.dc_gain();
        let z2 = (self.b[2] - self.a[1] * g) * level;
        let z1 = (self.b[1] - self.a[0] * g) * level + z2;
        [z1, z2]
    }

    fn run(&self, signal: &mut [f64], mut state: [f64; 2]) {
        for x in signal.iter_mut() {
            let input = *x;
            let y = self.b[0] * input + state[0];
            state[0] = self.b[1] * input - self.a[0] * y + state[1];
            state[1] = self.b[2] * input - self.a[1] * y;
            *x = y;
        }
    }
}

/// Butterworth low-pass designed as cascaded second-order sections
#[derive(Debug, Clone)]
pub struct Butterworth {
    params: ButterworthParams,
    sections: Vec<Biquad>,
}

impl Butterworth {
    pub fn new(params: ButterworthParams) -> SarResult<Self> {
        params.validate()?;

        let n = params.order;
        let k = (PI * params.cutoff / 2.0).tan();
        let k2 = k * k;
        let mut sections = Vec::with_capacity((n + 1) / 2);

        for pair in 1..=n / 2 {
            let q_inv = 2.0 * ((2 * pair - 1) as f64 * PI / (2 * n) as f64).sin();
            let norm = 1.0 / (1.0 + k * q_inv + k2);
            let b0 = k2 * norm;
            sections.push(Biquad {
                b: [b0, 2.0 * b0, b0],
                a: [2.0 * (k2 - 1.0) * norm, (1.0 - k * q_inv + k2) * norm],
            });
        }
        if n % 2 == 1 {
            let b0 = k / (1.0 + k);
            sections.push(Biquad {
                b: [b0, b0, 0.0],
                a: [(k - 1.0) / (k + 1.0), 0.0],
            });
        }

        log::debug!(
            "Butterworth order {} cutoff {} designed as {} sections",
            n,
            params.cutoff,
            sections.len()
        );
        Ok(Self { params, sections })
    }

    pub fn params(&self) -> &ButterworthParams {
        &self.params
    }

    pub fn sections(&self) -> &[Biquad] {
        &self.sections
    }

    /// Single forward pass with initial state matched to the first sample
    fn forward(&self, signal: &mut [f64]) {
        let Some(&first) = signal.first() else {
            return;
        };
        let mut level = first;
        for section in &self.sections {
            section.run(signal, section.steady_state(level));
            level *= section.dc_gain();
        }
    }

    /// Zero-phase forward-backward filtering with odd-extension padding
    pub fn filtfilt(&self, series: &[f64]) -> Vec<f64> {
        let n = series.len();
        if n < 2 {
            return series.to_vec();
        }

        let ntaps = 2 * self.sections.len() + 1;
        let padlen = (3 * ntaps).min(n - 1);

        let mut extended = Vec::with_capacity(n + 2 * padlen);
        let (first, last) = (series[0], series[n - 1]);
        extended.extend((1..=padlen).rev().map(|i| 2.0 * first - series[i]));
        extended.extend_from_slice(series);
        extended.extend((1..=padlen).map(|i| 2.0 * last - series[n - 1 - i]));

        self.forward(&mut extended);
        extended.reverse();
        self.forward(&mut extended);
        extended.reverse();

        extended[padlen..padlen + n].to_vec()
    }
}

/// Temporal phase filter processor
pub struct PhaseFilter {
    savgol: SavitzkyGolay,
    butterworth: Butterworth,
}

impl PhaseFilter {
    pub fn new(savgol: SavitzkyGolayParams, butterworth: ButterworthParams) -> SarResult<Self> {
        Ok(Self {
            savgol: SavitzkyGolay::new(savgol)?,
            butterworth: Butterworth::new(butterworth)?,
        })
    }

    /// Unwrap every pixel's series along time and anchor it to the master slot
    pub fn unwrap_arc_phases(arc_phases: &ArcPhases) -> PhaseCube {
        let mut unwrapped = arc_phases.phases.clone();
        let anchor = arc_phases.master_slot();

        zip_for_each!(Zip::from(unwrapped.lanes_mut(Axis(0))), |mut lane| {
            let mut series = lane.to_vec();
            unwrap_series(&mut series);
            let offset = anchor.map(|slot| series[slot]).unwrap_or(0.0);
            for (out, v) in lane.iter_mut().zip(series) {
                *out = v - offset;
            }
        });

        unwrapped
    }

    /// Apply one filter type to every pixel's arc-phase series
    pub fn apply_filter(&self, arc_phases: &ArcPhases, filter_type: PhaseFilterType) -> SarResult<FilteredPhase> {
        let slots = arc_phases.num_slots();
        log::info!("Applying {:?} filter to {} x {:?} arc-phase series", filter_type, slots, arc_phases.shape());
        if filter_type == PhaseFilterType::SavitzkyGolay {
            self.savgol.check_length(slots)?;
        }

        let unwrapped = Self::unwrap_arc_phases(arc_phases);
        let mut filtered = PhaseCube::zeros(unwrapped.raw_dim());

        zip_for_each!(Zip::from(filtered.lanes_mut(Axis(0))).and(unwrapped.lanes(Axis(0))), |mut out, series| {
            let series = series.to_vec();
            let smoothed = match filter_type {
                PhaseFilterType::SavitzkyGolay => self.savgol.apply_unchecked(&series),
                PhaseFilterType::Butterworth => self.butterworth.filtfilt(&series),
            };
            out.assign(&Array1::from(smoothed));
        });

        let residual = &unwrapped - &filtered;
        log::debug!(
            "{:?} residual RMS: {:.4} rad",
            filter_type,
            residual.mapv(|r| r * r).mean().unwrap_or(0.0).sqrt()
        );

        Ok(FilteredPhase {
            filter_type,
            unwrapped,
            filtered,
            residual,
        })
    }

    pub fn apply_savitzky_golay(&self, arc_phases: &ArcPhases) -> SarResult<FilteredPhase> {
        self.apply_filter(arc_phases, PhaseFilterType::SavitzkyGolay)
    }

    pub fn apply_butterworth(&self, arc_phases: &ArcPhases) -> SarResult<FilteredPhase> {
        self.apply_filter(arc_phases, PhaseFilterType::Butterworth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PixelCoord;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_unwrap_series() {
        let truth: Vec<f64> = (0..20).map(|i| 0.9 * i as f64).collect();
        let mut wrapped: Vec<f64> = truth.iter().map(|&v| crate::core::arc_phase::wrap_phase(v)).collect();
        unwrap_series(&mut wrapped);
        for (a, b) in wrapped.iter().zip(&truth) {
            assert_abs_diff_eq!(a, b, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_unwrap_series_with_non_finite_sample() {
        let mut series = vec![0.0, 0.5, f64::INFINITY, 1.0];
        unwrap_series(&mut series);
        assert_abs_diff_eq!(series[1], 0.5, epsilon = 1e-12);
        assert!(series[2].is_nan());
        assert!(series[3].is_nan());

        let mut with_nan = vec![f64::NAN, 0.2];
        unwrap_series(&mut with_nan);
        assert!(with_nan[1].is_nan());
    }

    #[test]
    fn test_savgol_reproduces_ramp() {
        let sg = SavitzkyGolay::new(SavitzkyGolayParams { window_length: 5, poly_order: 2 }).unwrap();
        let ramp: Vec<f64> = (0..12).map(|i| 0.25 * i as f64 - 1.0).collect();
        let smoothed = sg.apply(&ramp).unwrap();
        for (s, r) in smoothed.iter().zip(&ramp) {
            assert_abs_diff_eq!(s, r, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_savgol_known_coefficients() {
        // Classic 5-point quadratic smoothing weights: (-3, 12, 17, 12, -3) / 35
        let sg = SavitzkyGolay::new(SavitzkyGolayParams { window_length: 5, poly_order: 2 }).unwrap();
        let expected = [-3.0, 12.0, 17.0, 12.0, -3.0];
        for (w, e) in sg.centre.iter().zip(expected) {
            assert_abs_diff_eq!(*w, e / 35.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_savgol_parameter_errors() {
        assert!(SavitzkyGolay::new(SavitzkyGolayParams { window_length: 6, poly_order: 2 }).is_err());
        assert!(SavitzkyGolay::new(SavitzkyGolayParams { window_length: 3, poly_order: 4 }).is_err());
        let sg = SavitzkyGolay::new(SavitzkyGolayParams { window_length: 7, poly_order: 2 }).unwrap();
        assert!(matches!(
            sg.apply(&[0.0; 5]),
            Err(SarError::Configuration { stage: Stage::PhaseFilter, .. })
        ));
    }

    #[test]
    fn test_butterworth_design_second_order() {
        // Cutoff at half Nyquist: K = 1, b = [0.2929, 0.5858, 0.2929], a = [0, 0.1716]
        let bw = Butterworth::new(ButterworthParams { order: 2, cutoff: 0.5 }).unwrap();
        let s = bw.sections()[0];
        assert_abs_diff_eq!(s.b[0], 0.292_893_218_8, epsilon = 1e-9);
        assert_abs_diff_eq!(s.b[1], 0.585_786_437_6, epsilon = 1e-9);
        assert_abs_diff_eq!(s.a[0], 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(s.a[1], 0.171_572_875_3, epsilon = 1e-9);

        let odd = Butterworth::new(ButterworthParams { order: 3, cutoff: 0.2 }).unwrap();
        assert_eq!(odd.sections().len(), 2);
        for section in odd.sections() {
            assert_abs_diff_eq!(section.dc_gain(), 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_butterworth_preserves_constant_and_removes_noise() {
        let bw = Butterworth::new(ButterworthParams { order: 4, cutoff: 0.2 }).unwrap();
        let constant = vec![1.5; 30];
        for v in bw.filtfilt(&constant) {
            assert_abs_diff_eq!(v, 1.5, epsilon = 1e-9);
        }

        let n = 128;
        let signal: Vec<f64> = (0..n)
            .map(|i| {
                let t = i as f64;
                (2.0 * PI * t / 64.0).sin() + 0.4 * if i % 2 == 0 { 1.0 } else { -1.0 } + 0.2 * (2.0 * PI * 0.4 * t).sin()
            })
            .collect();
        let filtered = bw.filtfilt(&signal);
        let raw_energy = high_frequency_energy(&signal, 0.5);
        let filtered_energy = high_frequency_energy(&filtered, 0.5);
        assert!(filtered_energy < raw_energy * 0.05, "{} vs {}", filtered_energy, raw_energy);
    }

    #[test]
    fn test_butterworth_short_series() {
        let bw = Butterworth::new(ButterworthParams::default()).unwrap();
        assert_eq!(bw.filtfilt(&[0.3]), vec![0.3]);
        assert_eq!(bw.filtfilt(&[0.1, 0.2, 0.3]).len(), 3);
        assert!(Butterworth::new(ButterworthParams { order: 0, cutoff: 0.3 }).is_err());
        assert!(Butterworth::new(ButterworthParams { order: 2, cutoff: 0.0 }).is_err());
    }

    #[test]
    fn test_apply_filter_on_arc_phases() {
        let (n, rows, cols) = (12, 2, 3);
        let mut phases = PhaseCube::zeros((n, rows, cols));
        for t in 0..n {
            for r in 0..rows {
                for c in 0..cols {
                    let drift = 0.5 * (r * cols + c) as f64 * (t as f64 - 4.0);
                    phases[[t, r, c]] = crate::core::arc_phase::wrap_phase(drift);
                }
            }
        }
        let arc = ArcPhases {
            phases,
            acquisitions: (0..n).collect(),
            master_index: 4,
            reference: PixelCoord::new(0, 0),
        };

        let filter = PhaseFilter::new(SavitzkyGolayParams::default(), ButterworthParams::default()).unwrap();
        let sg = filter.apply_savitzky_golay(&arc).unwrap();

        // Linear drifts unwrap exactly and pass the quadratic smoother untouched
        let px = PixelCoord::new(1, 2);
        for t in 0..n {
            let truth = 0.5 * 5.0 * (t as f64 - 4.0);
            assert_abs_diff_eq!(sg.unwrapped[[t, px.row, px.col]], truth, epsilon = 1e-9);
            assert_abs_diff_eq!(sg.residual[[t, px.row, px.col]], 0.0, epsilon = 1e-9);
        }

        let bw = filter.apply_butterworth(&arc).unwrap();
        for ((u, f), r) in bw.unwrapped.iter().zip(bw.filtered.iter()).zip(bw.residual.iter()) {
            assert_abs_diff_eq!(u - f, *r, epsilon = 1e-12);
        }
        assert!(bw.unwrapped.index_axis(Axis(0), 4).iter().all(|&v| v == 0.0));
    }
}
