use crate::core::network::{IfgNetwork, VirtualReferenceNetwork};
use crate::types::{PhaseCube, PixelCoord, SarComplex, SarError, SarResult, SlcStack, Stage};
use ndarray::{Array1, Array2, ArrayView2, Axis, Zip};
use num_complex::Complex64;
use std::f64::consts::PI;

/// Map a phase into (−π, π] through its angle on the unit circle
pub fn wrap_phase(phase: f64) -> f64 {
    normalize_angle(phase.sin().atan2(phase.cos()))
}

/// Fold the single `atan2` edge value −π onto +π
fn normalize_angle(angle: f64) -> f64 {
    if angle <= -PI {
        angle + 2.0 * PI
    } else {
        angle
    }
}

/// Phase of `z * conj(reference)` in (−π, π]
fn phase_difference(z: SarComplex, reference: SarComplex) -> f64 {
    let z = Complex64::new(z.re as f64, z.im as f64);
    let r = Complex64::new(reference.re as f64, reference.im as f64);
    normalize_angle((z * r.conj()).arg())
}

/// Wrapped double-difference phase of every pixel against the reference pixel
#[derive(Debug, Clone)]
pub struct ArcPhases {
    /// Phases indexed (slot, row, col); slot `i` belongs to `acquisitions[i]`
    pub phases: PhaseCube,
    /// Chronological acquisition indices covered, master included
    pub acquisitions: Vec<usize>,
    pub master_index: usize,
    pub reference: PixelCoord,
}

impl ArcPhases {
    pub fn num_slots(&self) -> usize {
        self.acquisitions.len()
    }

    pub fn shape(&self) -> (usize, usize) {
        let (_, h, w) = self.phases.dim();
        (h, w)
    }

    /// Arc-phase time series of one pixel
    pub fn series(&self, coord: PixelCoord) -> Array1<f64> {
        self.phases.slice(ndarray::s![.., coord.row, coord.col]).to_owned()
    }

    /// Slot holding the master acquisition
    pub fn master_slot(&self) -> Option<usize> {
        self.acquisitions.iter().position(|&a| a == self.master_index)
    }

    /// Phases of the interferometric pairs only, master slot removed
    pub fn network_phases(&self) -> PhaseCube {
        let slots: Vec<usize> = (0..self.num_slots())
            .filter(|&s| Some(s) != self.master_slot())
            .collect();
        self.phases.select(Axis(0), &slots)
    }

    /// Values of a per-acquisition sequence (e.g. tbase) at the covered acquisitions
    pub fn sample_times(&self, per_acquisition: &Array1<f64>) -> Array1<f64> {
        self.acquisitions.iter().map(|&a| per_acquisition[a]).collect()
    }

    /// Same as [`ArcPhases::sample_times`] restricted to the slots of [`ArcPhases::network_phases`]
    pub fn network_sample_times(&self, per_acquisition: &Array1<f64>) -> Array1<f64> {
        self.acquisitions
            .iter()
            .filter(|&&a| a != self.master_index)
            .map(|&a| per_acquisition[a])
            .collect()
    }
}

/// Arc phases of TCS points integrated through their local first-order reference
#[derive(Debug, Clone)]
pub struct VirtualArcPhases {
    pub points: Vec<PixelCoord>,
    pub local_references: Vec<PixelCoord>,
    /// Phase of each TCS point relative to its local reference, indexed (point, slot)
    pub local: Array2<f64>,
    /// Local arc plus the local reference's arc phase, re-wrapped, indexed (point, slot)
    pub integrated: Array2<f64>,
}

/// Computes arc phases from the interferogram network or directly from the SLC stack
pub struct ArcPhaseEngine;

impl ArcPhaseEngine {
    /// Arc phase `wrap(φ_ifg(p) − φ_ifg(reference))` for every pixel and pair
    ///
    /// The master slot is identically zero. Acquisitions skipped by the
    /// network are not represented.
    pub fn compute_arc_phase(network: &IfgNetwork, reference: PixelCoord) -> SarResult<ArcPhases> {
        let (rows, cols) = network.shape();
        check_reference(reference, rows, cols)?;
        log::info!(
            "Computing arc phases for {} pairs relative to reference {}",
            network.num_pairs(),
            reference
        );

        let mut acquisitions: Vec<usize> = network.pairs.iter().map(|p| p.secondary).collect();
        acquisitions.push(network.master_index);
        acquisitions.sort_unstable();

        let mut phases = PhaseCube::zeros((acquisitions.len(), rows, cols));
        for (k, pair) in network.pairs.iter().enumerate() {
            let slot = acquisitions
                .iter()
                .position(|&a| a == pair.secondary)
                .ok_or_else(|| SarError::Processing(format!("acquisition {} missing from slots", pair.secondary)))?;
            let ifg = network.ifg(k);
            fill_arc_slot(&mut phases, slot, &ifg, ifg[[reference.row, reference.col]]);
        }

        Ok(ArcPhases {
            phases,
            acquisitions,
            master_index: network.master_index,
            reference,
        })
    }

    /// Same double difference computed straight from the SLC stack, every acquisition included
    pub fn compute_arc_phase_from_slc(stack: &SlcStack, master: usize, reference: PixelCoord) -> SarResult<ArcPhases> {
        let n = stack.num_acquisitions();
        if master >= n {
            return Err(SarError::Configuration {
                stage: Stage::ArcPhase,
                message: format!("master index {} is out of range for {} acquisitions", master, n),
            });
        }
        let (rows, cols) = stack.shape();
        check_reference(reference, rows, cols)?;
        log::info!("Computing arc phases from {} SLC acquisitions (master {})", n, master);

        let master_slc = stack.slice(master);
        let mut phases = PhaseCube::zeros((n, rows, cols));
        for t in 0..n {
            let ifg = Zip::from(&stack.slice(t))
                .and(&master_slc)
                .map_collect(|&s, &m| s * m.conj());
            let reference_value = ifg[[reference.row, reference.col]];
            fill_arc_slot(&mut phases, t, &ifg.view(), reference_value);
        }

        Ok(ArcPhases {
            phases,
            acquisitions: (0..n).collect(),
            master_index: master,
            reference,
        })
    }

    /// Arc phases of TCS points through their nearest first-order point
    pub fn compute_virtual_arc_phase(
        network: &IfgNetwork,
        arc_phases: &ArcPhases,
        virtual_network: &VirtualReferenceNetwork,
    ) -> SarResult<VirtualArcPhases> {
        if network.shape() != arc_phases.shape() {
            return Err(SarError::Data {
                stage: Stage::ArcPhase,
                message: format!(
                    "network shape {:?} differs from arc phase shape {:?}",
                    network.shape(),
                    arc_phases.shape()
                ),
            });
        }

        let mut points = Vec::new();
        let mut local_references = Vec::new();
        for arc in virtual_network.arcs() {
            if points.last() != Some(&arc.tcs) {
                points.push(arc.tcs);
                local_references.push(arc.reference);
            }
        }

        let slots = arc_phases.num_slots();
        let mut local = Array2::<f64>::zeros((points.len(), slots));
        let mut integrated = Array2::<f64>::zeros((points.len(), slots));

        for (k, pair) in network.pairs.iter().enumerate() {
            let slot = arc_phases
                .acquisitions
                .iter()
                .position(|&a| a == pair.secondary)
                .ok_or_else(|| SarError::Data {
                    stage: Stage::ArcPhase,
                    message: format!("arc phases do not cover acquisition {}", pair.secondary),
                })?;
            let ifg = network.ifg(k);

            for (i, (tcs, reference)) in points.iter().zip(&local_references).enumerate() {
                let arc = phase_difference(ifg[[tcs.row, tcs.col]], ifg[[reference.row, reference.col]]);
                local[[i, slot]] = arc;
                integrated[[i, slot]] =
                    wrap_phase(arc + arc_phases.phases[[slot, reference.row, reference.col]]);
            }
        }

        log::info!(
            "Virtual arc phases for {} TCS points ({} orphans left on the global reference)",
            points.len(),
            virtual_network.orphans().len()
        );

        Ok(VirtualArcPhases {
            points,
            local_references,
            local,
            integrated,
        })
    }
}

fn check_reference(reference: PixelCoord, rows: usize, cols: usize) -> SarResult<()> {
    if reference.row >= rows || reference.col >= cols {
        return Err(SarError::Configuration {
            stage: Stage::ArcPhase,
            message: format!("reference pixel {} lies outside the {} x {} grid", reference, rows, cols),
        });
    }
    Ok(())
}

fn fill_arc_slot(phases: &mut PhaseCube, slot: usize, ifg: &ArrayView2<'_, SarComplex>, reference_value: SarComplex) {
    zip_for_each!(Zip::from(phases.index_axis_mut(Axis(0), slot)).and(ifg), |out, &z| {
        *out = phase_difference(z, reference_value)
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MasterSelection;
    use crate::core::dispersion::ClassificationMasks;
    use crate::core::network::NetworkBuilder;
    use crate::test_support::random_stack;
    use crate::types::{PixelMask, SarCube};
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_wrap_phase_range() {
        assert_abs_diff_eq!(wrap_phase(3.0 * PI), PI, epsilon = 1e-12);
        assert_abs_diff_eq!(wrap_phase(-PI), PI, epsilon = 1e-12);
        assert_abs_diff_eq!(wrap_phase(0.5), 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(wrap_phase(-0.5 - 4.0 * PI), -0.5, epsilon = 1e-12);
        for k in -50..50 {
            let w = wrap_phase(k as f64 * 0.37);
            assert!(w > -PI && w <= PI);
        }
    }

    #[test]
    fn test_reference_series_is_zero_and_values_wrapped() {
        let data = random_stack(6, 5, 5, 7);
        let network = NetworkBuilder::new(MasterSelection::Midpoint).build_star_network(&data).unwrap();
        let reference = PixelCoord::new(2, 3);
        let arc = ArcPhaseEngine::compute_arc_phase(&network, reference).unwrap();

        assert_eq!(arc.acquisitions, vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(arc.master_slot(), Some(3));
        assert!(arc.series(reference).iter().all(|&v| v == 0.0));
        assert!(arc.phases.iter().all(|&v| v > -PI && v <= PI));
        assert!(arc.phases.index_axis(Axis(0), 3).iter().all(|&v| v == 0.0));
        assert_eq!(arc.network_phases().dim(), (5, 5, 5));
    }

    #[test]
    fn test_network_and_slc_paths_agree() {
        let data = random_stack(5, 4, 4, 99);
        let network = NetworkBuilder::new(MasterSelection::Index(2)).build_star_network(&data).unwrap();
        let reference = PixelCoord::new(1, 1);
        let from_network = ArcPhaseEngine::compute_arc_phase(&network, reference).unwrap();
        let from_slc = ArcPhaseEngine::compute_arc_phase_from_slc(&data.slc, 2, reference).unwrap();

        for (a, b) in from_network.phases.iter().zip(from_slc.phases.iter()) {
            let diff = wrap_phase(a - b);
            assert!(diff.abs() < 1e-9, "{} vs {}", a, b);
        }
        assert!(from_slc.series(reference).iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_known_phase_difference() {
        let mut cube = SarCube::from_elem((3, 1, 2), SarComplex::new(1.0, 0.0));
        // pixel (0, 1) drifts by 0.4 rad per acquisition, reference (0, 0) is static
        for t in 0..3 {
            cube[[t, 0, 1]] = SarComplex::from_polar(1.0, 0.4 * t as f32);
        }
        let stack = SlcStack::new(cube).unwrap();
        let arc = ArcPhaseEngine::compute_arc_phase_from_slc(&stack, 1, PixelCoord::new(0, 0)).unwrap();
        let series = arc.series(PixelCoord::new(0, 1));
        assert_abs_diff_eq!(series[0], -0.4, epsilon = 1e-6);
        assert_abs_diff_eq!(series[1], 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(series[2], 0.4, epsilon = 1e-6);
    }

    #[test]
    fn test_reference_outside_grid() {
        let data = random_stack(3, 2, 2, 1);
        let err = ArcPhaseEngine::compute_arc_phase_from_slc(&data.slc, 0, PixelCoord::new(2, 0)).unwrap_err();
        assert!(matches!(err, SarError::Configuration { stage: Stage::ArcPhase, .. }));
    }

    #[test]
    fn test_virtual_arc_phase_matches_direct() {
        let data = random_stack(6, 6, 6, 31);
        let network = NetworkBuilder::new(MasterSelection::Midpoint).build_star_network(&data).unwrap();
        let reference = PixelCoord::new(0, 0);
        let arc = ArcPhaseEngine::compute_arc_phase(&network, reference).unwrap();

        let mut first_order = PixelMask::from_elem((6, 6), false);
        first_order[[0, 0]] = true;
        first_order[[5, 5]] = true;
        let mut tcs = PixelMask::from_elem((6, 6), false);
        tcs[[4, 4]] = true;
        tcs[[1, 2]] = true;
        let masks = ClassificationMasks { first_order, tcs };
        let vrn = NetworkBuilder::new(MasterSelection::Midpoint)
            .compute_virtual_reference(&masks)
            .unwrap();

        let virtual_arc = ArcPhaseEngine::compute_virtual_arc_phase(&network, &arc, &vrn).unwrap();
        assert_eq!(virtual_arc.points, vec![PixelCoord::new(1, 2), PixelCoord::new(4, 4)]);
        assert_eq!(virtual_arc.local_references[1], PixelCoord::new(5, 5));

        for (i, point) in virtual_arc.points.iter().enumerate() {
            let direct = arc.series(*point);
            for slot in 0..arc.num_slots() {
                let diff = wrap_phase(virtual_arc.integrated[[i, slot]] - direct[slot]);
                assert!(diff.abs() < 1e-9);
            }
        }
    }
}
