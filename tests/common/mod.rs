//! Shared fixtures for the integration tests

use chrono::NaiveDate;
use ndarray::Array1;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f32::consts::PI;
use tcsar::types::{GeometryLayers, PixelCoord, SarComplex, SarCube, SlcStack, StackData};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Random stack with one pixel of constant amplitude at `stable`
///
/// Other pixels draw amplitudes from [0.5, 1.5); every phase is uniform. Acquisitions
/// are 12 days apart and perpendicular baselines step by 15 m from -30 m.
pub fn stack_with_stable_pixel(n: usize, rows: usize, cols: usize, stable: PixelCoord) -> StackData {
    let mut rng = StdRng::seed_from_u64(0x9E37_79B9);
    let cube = SarCube::from_shape_fn((n, rows, cols), |(_, r, c)| {
        let amplitude: f32 = if r == stable.row && c == stable.col {
            3.0
        } else {
            rng.gen_range(0.5..1.5)
        };
        SarComplex::from_polar(amplitude, rng.gen_range(-PI..PI))
    });

    let start = NaiveDate::from_ymd_opt(2020, 3, 1).expect("valid date");
    StackData::new(
        SlcStack::new(cube).expect("non-empty cube"),
        Array1::from_iter((0..n).map(|t| 12.0 * t as f64)),
        Array1::from_iter((0..n).map(|t| 15.0 * t as f64 - 30.0)),
        (0..n).map(|t| start + chrono::Duration::days(12 * t as i64)).collect(),
        GeometryLayers::new(),
    )
    .expect("consistent stack")
}
