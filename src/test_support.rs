//! Seeded random data shared by the unit tests

use crate::types::{GeometryLayers, SarComplex, SarCube, SlcStack, StackData};
use chrono::NaiveDate;
use ndarray::Array1;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f32::consts::PI;

/// Unit phasor with a uniformly distributed phase
pub(crate) fn random_phasor(rng: &mut StdRng) -> SarComplex {
    SarComplex::from_polar(1.0, rng.gen_range(-PI..PI))
}

/// Stack of amplitudes in [0.5, 1.5) and uniform phases, one acquisition every 6 days
pub(crate) fn random_stack(n: usize, rows: usize, cols: usize, seed: u64) -> StackData {
    let mut rng = StdRng::seed_from_u64(seed);
    let cube = SarCube::from_shape_fn((n, rows, cols), |_| {
        let amplitude: f32 = rng.gen_range(0.5..1.5);
        SarComplex::from_polar(amplitude, rng.gen_range(-PI..PI))
    });

    let start = NaiveDate::from_ymd_opt(2019, 6, 1).unwrap();
    StackData::new(
        SlcStack::new(cube).unwrap(),
        Array1::from_iter((0..n).map(|t| 6.0 * t as f64)),
        Array1::zeros(n),
        (0..n).map(|t| start + chrono::Duration::days(6 * t as i64)).collect(),
        GeometryLayers::new(),
    )
    .unwrap()
}
