use approx::assert_abs_diff_eq;
use tcsar::config::{ButterworthParams, SavitzkyGolayParams};
use tcsar::core::phase_filter::{high_frequency_energy, unwrap_series};
use tcsar::core::{coherence_likelihood_ratio, Butterworth, SavitzkyGolay};

/// Slow periodic signal plus alternating noise at the Nyquist frequency
fn noisy_signal(n: usize) -> Vec<f64> {
    (0..n)
        .map(|i| {
            let t = i as f64 / n as f64;
            0.4 * (4.0 * std::f64::consts::PI * t).sin() + if i % 2 == 0 { 0.3 } else { -0.3 }
        })
        .collect()
}

#[test]
fn test_savitzky_golay_preserves_polynomials() {
    let sg = SavitzkyGolay::new(SavitzkyGolayParams {
        window_length: 7,
        poly_order: 2,
    })
    .expect("valid parameters");

    let quadratic: Vec<f64> = (0..15).map(|i| 0.5 - 0.2 * i as f64 + 0.03 * (i * i) as f64).collect();
    let smoothed = sg.apply(&quadratic).expect("long enough");
    for (a, b) in quadratic.iter().zip(&smoothed) {
        assert_abs_diff_eq!(a, b, epsilon = 1e-9);
    }

    // Window longer than the series
    assert!(sg.apply(&quadratic[..5]).is_err());
}

#[test]
fn test_smoothers_remove_alternating_noise() {
    let series = noisy_signal(40);
    let before = high_frequency_energy(&series, 0.5);

    let sg = SavitzkyGolay::new(SavitzkyGolayParams::default()).expect("valid parameters");
    let bw = Butterworth::new(ButterworthParams::default()).expect("valid parameters");

    let sg_out = sg.apply(&series).expect("long enough");
    let bw_out = bw.filtfilt(&series);
    println!(
        "HF energy: raw {:.4}, savgol {:.4}, butterworth {:.4}",
        before,
        high_frequency_energy(&sg_out, 0.5),
        high_frequency_energy(&bw_out, 0.5)
    );

    assert!(high_frequency_energy(&sg_out, 0.5) < 0.5 * before);
    assert!(high_frequency_energy(&bw_out, 0.5) < 0.2 * before);
    assert_eq!(bw_out.len(), series.len());
}

#[test]
fn test_butterworth_design() {
    let third = Butterworth::new(ButterworthParams { order: 3, cutoff: 0.25 }).expect("valid parameters");
    assert_eq!(third.sections().len(), 2);

    // Unit DC gain: constants pass unchanged
    let constant = vec![1.7; 12];
    for v in third.filtfilt(&constant) {
        assert_abs_diff_eq!(v, 1.7, epsilon = 1e-9);
    }

    assert!(Butterworth::new(ButterworthParams { order: 0, cutoff: 0.25 }).is_err());
    assert!(Butterworth::new(ButterworthParams { order: 2, cutoff: 1.0 }).is_err());
}

#[test]
fn test_unwrap_recovers_steep_ramp() {
    let truth: Vec<f64> = (0..20).map(|i| 1.1 * i as f64).collect();
    let mut wrapped: Vec<f64> = truth.iter().map(|&v| tcsar::core::wrap_phase(v)).collect();
    unwrap_series(&mut wrapped);
    for (a, b) in truth.iter().zip(&wrapped) {
        assert_abs_diff_eq!(a, b, epsilon = 1e-9);
    }
}

#[test]
fn test_likelihood_ratio_orders_coherence() {
    let close = coherence_likelihood_ratio(0.62, 0.6, 25, 0.05).expect("valid inputs");
    let far = coherence_likelihood_ratio(0.95, 0.6, 25, 0.05).expect("valid inputs");
    assert!(far.statistic > close.statistic);
    assert!(far.reject);
    assert!(!close.reject);
}
