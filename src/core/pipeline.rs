use crate::config::PipelineConfig;
use crate::core::arc_phase::{ArcPhaseEngine, ArcPhases, VirtualArcPhases};
use crate::core::dispersion::{ClassificationMasks, DispersionClassifier, DispersionMaps};
use crate::core::network::{IfgNetwork, NetworkBuilder, VirtualReferenceNetwork};
use crate::core::phase_filter::{FilteredPhase, PhaseFilter};
use crate::core::reference::ReferenceSelector;
use crate::core::temporal_noise::{AdaptiveThresholds, TemporalNoiseEstimator};
use crate::types::{
    PhaseCube, PixelCoord, QualityMap, SarCube, SarError, SarRealImage, SarResult, StackData, Stage,
};
use ndarray::Array1;

/// Every product of one pipeline run
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub dispersion: DispersionMaps,
    pub masks: ClassificationMasks,
    pub network: IfgNetwork,
    pub virtual_network: Option<VirtualReferenceNetwork>,
    pub reference: PixelCoord,
    pub arc_phases: ArcPhases,
    pub virtual_arc_phases: Option<VirtualArcPhases>,
    pub temporal_coherence: QualityMap,
    pub phase_noise: QualityMap,
    pub thresholds: AdaptiveThresholds,
    pub filtered_masks: ClassificationMasks,
    pub savgol: FilteredPhase,
    pub butterworth: FilteredPhase,
    pub tbase: Array1<f64>,
    pub pbase: Array1<f64>,
}

/// Read-only bundle handed to plotting front-ends
#[derive(Debug, Clone)]
pub struct VisualizationData<'a> {
    pub amplitude: &'a SarRealImage,
    pub arc_phases: &'a PhaseCube,
    pub masks: &'a ClassificationMasks,
    pub ifg_stack: &'a SarCube,
    pub valid_ifg_pairs: Vec<(usize, usize)>,
    pub tbase: &'a Array1<f64>,
    pub pbase: &'a Array1<f64>,
    pub coherence_map: &'a SarRealImage,
}

/// Everything derived for a single selected pixel
#[derive(Debug, Clone)]
pub struct PixelSeries {
    pub coord: PixelCoord,
    /// Temporal baseline of every slot
    pub times: Array1<f64>,
    pub wrapped: Array1<f64>,
    pub unwrapped: Array1<f64>,
    pub savgol: Array1<f64>,
    pub savgol_residual: Array1<f64>,
    pub butterworth: Array1<f64>,
    pub butterworth_residual: Array1<f64>,
    pub temporal_coherence: f64,
    pub phase_noise: f64,
    pub adi: f32,
    pub first_order: bool,
    pub tcs: bool,
    pub reliable: bool,
}

impl PipelineOutput {
    pub fn visualization(&self) -> VisualizationData<'_> {
        VisualizationData {
            amplitude: &self.dispersion.mean_amplitude,
            arc_phases: &self.arc_phases.phases,
            masks: &self.masks,
            ifg_stack: &self.network.ifg_stack,
            valid_ifg_pairs: self.network.valid_ifg_pairs(),
            tbase: &self.tbase,
            pbase: &self.pbase,
            coherence_map: &self.network.coherence_map,
        }
    }

    /// Series and quality figures of one pixel (e.g. a clicked point)
    pub fn pixel_series(&self, coord: PixelCoord) -> SarResult<PixelSeries> {
        let (rows, cols) = self.arc_phases.shape();
        if coord.row >= rows || coord.col >= cols {
            return Err(SarError::Configuration {
                stage: Stage::Pipeline,
                message: format!("pixel {} lies outside the {} x {} grid", coord, rows, cols),
            });
        }

        let lane = |cube: &PhaseCube| cube.slice(ndarray::s![.., coord.row, coord.col]).to_owned();
        let idx = [coord.row, coord.col];

        Ok(PixelSeries {
            coord,
            times: self.arc_phases.sample_times(&self.tbase),
            wrapped: lane(&self.arc_phases.phases),
            unwrapped: lane(&self.savgol.unwrapped),
            savgol: lane(&self.savgol.filtered),
            savgol_residual: lane(&self.savgol.residual),
            butterworth: lane(&self.butterworth.filtered),
            butterworth_residual: lane(&self.butterworth.residual),
            temporal_coherence: self.temporal_coherence[idx],
            phase_noise: self.phase_noise[idx],
            adi: self.dispersion.adi[idx],
            first_order: self.masks.first_order[idx],
            tcs: self.masks.tcs[idx],
            reliable: self.filtered_masks.first_order[idx] || self.filtered_masks.tcs[idx],
        })
    }
}

/// Single entry point running all stages in order
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    /// Validate the configuration once
    pub fn new(config: PipelineConfig) -> SarResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn run(&self, data: &StackData) -> SarResult<PipelineOutput> {
        let (rows, cols) = data.shape();
        log::info!(
            "Starting time-series pipeline: {} acquisitions, {} x {} pixels",
            data.num_acquisitions(),
            rows,
            cols
        );
        let start_time = std::time::Instant::now();

        let classifier = DispersionClassifier::from_config(&self.config);
        let (dispersion, masks) = classifier.classify(&data.slc)?;

        let builder = NetworkBuilder::from_config(&self.config);
        let network = builder.build_star_network(data)?;

        let reference = ReferenceSelector::select_reference_pixel_with_geometry(&masks, &dispersion, &data.geometry)?;
        let arc_phases = ArcPhaseEngine::compute_arc_phase(&network, reference)?;

        let (virtual_network, virtual_arc_phases) = if self.config.virtual_reference.enabled {
            let vrn = builder.compute_virtual_reference(&masks)?;
            let phases = ArcPhaseEngine::compute_virtual_arc_phase(&network, &arc_phases, &vrn)?;
            (Some(vrn), Some(phases))
        } else {
            (None, None)
        };

        let filter = PhaseFilter::new(self.config.savgol, self.config.butterworth)?;
        let estimator = TemporalNoiseEstimator::from_config(&self.config);

        let noise_branch = || -> SarResult<(QualityMap, QualityMap, AdaptiveThresholds, ClassificationMasks)> {
            let network_phases = arc_phases.network_phases();
            let times = arc_phases.network_sample_times(&data.tbase);
            let coherence = TemporalNoiseEstimator::compute_temporal_coherence(&network_phases);
            let noise = estimator.estimate_phase_noise(&network_phases, &times)?;
            let thresholds =
                TemporalNoiseEstimator::compute_adaptive_thresholds(&coherence, &noise, estimator.percentile())?;
            let filtered = TemporalNoiseEstimator::filter_noisy_points(&masks, &coherence, &noise, &thresholds)?;
            Ok((coherence, noise, thresholds, filtered))
        };
        let filter_branch = || -> SarResult<(FilteredPhase, FilteredPhase)> {
            Ok((
                filter.apply_savitzky_golay(&arc_phases)?,
                filter.apply_butterworth(&arc_phases)?,
            ))
        };

        #[cfg(feature = "parallel")]
        let (noise_result, filter_result) = rayon::join(noise_branch, filter_branch);
        #[cfg(not(feature = "parallel"))]
        let (noise_result, filter_result) = (noise_branch(), filter_branch());

        let (temporal_coherence, phase_noise, thresholds, filtered_masks) = noise_result?;
        let (savgol, butterworth) = filter_result?;

        log::info!(
            "Pipeline complete in {:?}: reference {}, {} reliable first-order and {} reliable TCS points",
            start_time.elapsed(),
            reference,
            filtered_masks.count_first_order(),
            filtered_masks.count_tcs()
        );

        Ok(PipelineOutput {
            dispersion,
            masks,
            network,
            virtual_network,
            reference,
            arc_phases,
            virtual_arc_phases,
            temporal_coherence,
            phase_noise,
            thresholds,
            filtered_masks,
            savgol,
            butterworth,
            tbase: data.tbase.clone(),
            pbase: data.pbase.clone(),
        })
    }
}
