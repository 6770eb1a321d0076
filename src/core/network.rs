use crate::config::{MasterSelection, PipelineConfig, VirtualReferenceParams};
use crate::core::dispersion::ClassificationMasks;
use crate::core::spatial_index::PointIndex;
use crate::types::{
    PixelCoord, SarComplex, SarCube, SarError, SarRealImage, SarResult, StackData, Stage,
};
use ndarray::{Array1, Array2, Array3, ArrayView2, Axis, Zip};

/// One interferogram of the star network
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IfgPair {
    pub master: usize,
    pub secondary: usize,
    /// tbase[secondary] - tbase[master] (days)
    pub temporal_baseline: f64,
    /// pbase[secondary] - pbase[master] (meters)
    pub perpendicular_baseline: f64,
}

/// Star interferogram network around a single master acquisition
#[derive(Debug, Clone)]
pub struct IfgNetwork {
    pub master_index: usize,
    pub num_acquisitions: usize,
    pub pairs: Vec<IfgPair>,
    /// Complex interferograms `secondary * conj(master)`, indexed (pair, row, col)
    pub ifg_stack: SarCube,
    /// Windowed spatial coherence per pair, indexed (pair, row, col)
    pub pair_coherence: Array3<f32>,
    /// Mean of `pair_coherence` over all pairs
    pub coherence_map: SarRealImage,
}

impl IfgNetwork {
    pub fn num_pairs(&self) -> usize {
        self.pairs.len()
    }

    /// `(master, secondary)` index tuples in network order
    pub fn valid_ifg_pairs(&self) -> Vec<(usize, usize)> {
        self.pairs.iter().map(|p| (p.master, p.secondary)).collect()
    }

    pub fn temporal_baselines(&self) -> Array1<f64> {
        self.pairs.iter().map(|p| p.temporal_baseline).collect()
    }

    pub fn perpendicular_baselines(&self) -> Array1<f64> {
        self.pairs.iter().map(|p| p.perpendicular_baseline).collect()
    }

    /// Position in `pairs` of the interferogram formed with `secondary`
    pub fn pair_index(&self, secondary: usize) -> Option<usize> {
        self.pairs.iter().position(|p| p.secondary == secondary)
    }

    pub fn ifg(&self, pair: usize) -> ArrayView2<'_, SarComplex> {
        self.ifg_stack.index_axis(Axis(0), pair)
    }

    pub fn shape(&self) -> (usize, usize) {
        let (_, h, w) = self.ifg_stack.dim();
        (h, w)
    }
}

/// Arc linking a TCS point to a nearby first-order point
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VirtualArc {
    pub tcs: PixelCoord,
    pub reference: PixelCoord,
    /// Arc length in pixels
    pub distance: f64,
}

/// Local reference candidates for every TCS point
#[derive(Debug, Clone)]
pub struct VirtualReferenceNetwork {
    index: PointIndex,
    arcs: Vec<VirtualArc>,
    orphans: Vec<PixelCoord>,
}

impl VirtualReferenceNetwork {
    /// All arcs, grouped by TCS point (row-major), closest reference first
    pub fn arcs(&self) -> &[VirtualArc] {
        &self.arcs
    }

    /// TCS points that found no first-order point within the distance limit
    pub fn orphans(&self) -> &[PixelCoord] {
        &self.orphans
    }

    /// Closest local reference of a TCS point
    pub fn nearest_reference(&self, tcs: PixelCoord) -> Option<&VirtualArc> {
        self.arcs_for(tcs).first()
    }

    pub fn arcs_for(&self, tcs: PixelCoord) -> &[VirtualArc] {
        let start = self.arcs.partition_point(|a| a.tcs < tcs);
        let end = self.arcs.partition_point(|a| a.tcs <= tcs);
        &self.arcs[start..end]
    }

    /// Spatial index over the first-order points
    pub fn index(&self) -> &PointIndex {
        &self.index
    }

    pub fn num_arcs(&self) -> usize {
        self.arcs.len()
    }
}

/// Builds the star network and the virtual reference network
pub struct NetworkBuilder {
    master: MasterSelection,
    coherence_window: usize,
    max_temporal_baseline: Option<f64>,
    max_perpendicular_baseline: Option<f64>,
    virtual_reference: VirtualReferenceParams,
}

impl NetworkBuilder {
    pub fn new(master: MasterSelection) -> Self {
        Self {
            master,
            coherence_window: 3,
            max_temporal_baseline: None,
            max_perpendicular_baseline: None,
            virtual_reference: VirtualReferenceParams::default(),
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            master: config.master,
            coherence_window: config.coherence_window,
            max_temporal_baseline: config.max_temporal_baseline,
            max_perpendicular_baseline: config.max_perpendicular_baseline,
            virtual_reference: config.virtual_reference,
        }
    }

    pub fn with_coherence_window(mut self, window: usize) -> Self {
        self.coherence_window = window;
        self
    }

    pub fn with_virtual_reference(mut self, params: VirtualReferenceParams) -> Self {
        self.virtual_reference = params;
        self
    }

    /// Resolve the master selection policy against a stack of `num_acquisitions`
    pub fn resolve_master(&self, num_acquisitions: usize) -> SarResult<usize> {
        if num_acquisitions < 2 {
            return Err(SarError::Configuration {
                stage: Stage::Network,
                message: format!(
                    "a star network needs at least 2 acquisitions, got {}",
                    num_acquisitions
                ),
            });
        }
        match self.master {
            MasterSelection::Midpoint => Ok(num_acquisitions / 2),
            MasterSelection::Index(index) if index < num_acquisitions => Ok(index),
            MasterSelection::Index(index) => Err(SarError::Configuration {
                stage: Stage::Network,
                message: format!(
                    "master index {} is out of range for {} acquisitions",
                    index, num_acquisitions
                ),
            }),
        }
    }

    /// Form every (master, secondary) interferogram and its coherence
    pub fn build_star_network(&self, data: &StackData) -> SarResult<IfgNetwork> {
        let n = data.num_acquisitions();
        let master = self.resolve_master(n)?;
        if self.coherence_window == 0 || self.coherence_window % 2 == 0 {
            return Err(SarError::Configuration {
                stage: Stage::Network,
                message: format!("coherence window {} must be odd", self.coherence_window),
            });
        }
        let (rows, cols) = data.shape();
        log::info!(
            "Building star network: master {} ({}) of {} acquisitions",
            master,
            data.dates[master],
            n
        );

        let master_slc = data.slc.slice(master);
        let mut pairs = Vec::with_capacity(n - 1);

        for secondary in (0..n).filter(|&t| t != master) {
            let pair = IfgPair {
                master,
                secondary,
                temporal_baseline: data.tbase[secondary] - data.tbase[master],
                perpendicular_baseline: data.pbase[secondary] - data.pbase[master],
            };

            if let Some(limit) = self.max_temporal_baseline {
                if pair.temporal_baseline.abs() > limit {
                    log::debug!("Skipping pair {:?}: |Δt| {} > {}", (master, secondary), pair.temporal_baseline, limit);
                    continue;
                }
            }
            if let Some(limit) = self.max_perpendicular_baseline {
                if pair.perpendicular_baseline.abs() > limit {
                    log::debug!("Skipping pair {:?}: |Δb| {} > {}", (master, secondary), pair.perpendicular_baseline, limit);
                    continue;
                }
            }
            if data.slc.slice(secondary).iter().all(|s| s.norm_sqr() == 0.0) {
                log::warn!("Skipping pair {:?}: secondary acquisition contains no data", (master, secondary));
                continue;
            }

            pairs.push(pair);
        }

        if pairs.is_empty() {
            return Err(SarError::EmptySelection {
                stage: Stage::Network,
                message: format!("no valid interferogram pairs around master {}", master),
            });
        }

        let mut ifg_stack = SarCube::zeros((pairs.len(), rows, cols));
        let mut pair_coherence = Array3::<f32>::zeros((pairs.len(), rows, cols));

        for (k, pair) in pairs.iter().enumerate() {
            let secondary_slc = data.slc.slice(pair.secondary);
            zip_for_each!(
                Zip::from(ifg_stack.index_axis_mut(Axis(0), k)).and(&secondary_slc).and(&master_slc),
                |ifg, &s, &m| *ifg = s * m.conj()
            );

            let coherence = local_coherence(&master_slc, &secondary_slc, self.coherence_window);
            pair_coherence.index_axis_mut(Axis(0), k).assign(&coherence);

            log::debug!(
                "Pair ({}, {}): Δt = {:.1} d, Δb = {:.1} m, mean coherence {:.3}",
                pair.master,
                pair.secondary,
                pair.temporal_baseline,
                pair.perpendicular_baseline,
                coherence.mean().unwrap_or(0.0)
            );
        }

        let coherence_map = pair_coherence
            .mean_axis(Axis(0))
            .unwrap_or_else(|| SarRealImage::zeros((rows, cols)));

        log::info!("Star network complete: {} interferograms", pairs.len());

        Ok(IfgNetwork {
            master_index: master,
            num_acquisitions: n,
            pairs,
            ifg_stack,
            pair_coherence,
            coherence_map,
        })
    }

    /// Link every TCS point to its nearest first-order point(s)
    pub fn compute_virtual_reference(&self, masks: &ClassificationMasks) -> SarResult<VirtualReferenceNetwork> {
        let first_order = masks.first_order_points();
        if first_order.is_empty() {
            return Err(SarError::EmptySelection {
                stage: Stage::Network,
                message: "virtual reference network needs at least one first-order point".to_string(),
            });
        }

        let params = self.virtual_reference;
        let index = PointIndex::build(first_order);
        let max_distance = params.max_distance.unwrap_or(f64::INFINITY);

        let mut arcs = Vec::new();
        let mut orphans = Vec::new();
        for tcs in masks.tcs_points() {
            let neighbours = index.nearest_within(tcs, params.neighbours, max_distance);
            if neighbours.is_empty() {
                orphans.push(tcs);
                continue;
            }
            arcs.extend(neighbours.into_iter().map(|nb| VirtualArc {
                tcs,
                reference: nb.coord,
                distance: nb.distance,
            }));
        }

        log::info!(
            "Virtual reference network: {} arcs from {} TCS points to {} first-order points ({} orphans)",
            arcs.len(),
            masks.count_tcs(),
            index.len(),
            orphans.len()
        );

        Ok(VirtualReferenceNetwork { index, arcs, orphans })
    }
}

/// Boxcar spatial coherence |Σ m s*| / sqrt(Σ|m|² Σ|s|²), with truncated windows at the edges
pub fn local_coherence(
    master: &ArrayView2<'_, SarComplex>,
    secondary: &ArrayView2<'_, SarComplex>,
    window: usize,
) -> SarRealImage {
    let (rows, cols) = master.dim();
    let half = window / 2;
    let mut coherence = Array2::<f32>::zeros((rows, cols));

    zip_for_each!(Zip::indexed(&mut coherence), |(i, j), out| {
        let r0 = i.saturating_sub(half);
        let r1 = (i + half + 1).min(rows);
        let c0 = j.saturating_sub(half);
        let c1 = (j + half + 1).min(cols);

        let mut cross_re = 0.0f64;
        let mut cross_im = 0.0f64;
        let mut power_m = 0.0f64;
        let mut power_s = 0.0f64;
        for r in r0..r1 {
            for c in c0..c1 {
                let m = master[[r, c]];
                let s = secondary[[r, c]];
                let cross = m * s.conj();
                cross_re += cross.re as f64;
                cross_im += cross.im as f64;
                power_m += m.norm_sqr() as f64;
                power_s += s.norm_sqr() as f64;
            }
        }

        let denom = (power_m * power_s).sqrt();
        *out = if denom > 0.0 {
            ((cross_re.hypot(cross_im) / denom).min(1.0)) as f32
        } else {
            0.0
        };
    });

    coherence
}
