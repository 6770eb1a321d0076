//! Core time-series processing modules

/// Run an `ndarray::Zip` on the rayon pool when the `parallel` feature is on
macro_rules! zip_for_each {
    ($zip:expr, $kernel:expr) => {{
        #[cfg(feature = "parallel")]
        $zip.par_for_each($kernel);
        #[cfg(not(feature = "parallel"))]
        $zip.for_each($kernel);
    }};
}

pub mod dispersion;
pub mod spatial_index;
pub mod network;
pub mod reference;
pub mod arc_phase;
pub mod temporal_noise;
pub mod phase_filter;
pub mod pipeline;

// Re-export main types
pub use dispersion::{DispersionClassifier, DispersionMaps, ClassificationMasks};
pub use spatial_index::{PointIndex, Neighbour};
pub use network::{NetworkBuilder, IfgNetwork, IfgPair, VirtualArc, VirtualReferenceNetwork};
pub use reference::ReferenceSelector;
pub use arc_phase::{ArcPhaseEngine, ArcPhases, VirtualArcPhases, wrap_phase};
pub use temporal_noise::{TemporalNoiseEstimator, AdaptiveThresholds};
pub use phase_filter::{PhaseFilter, PhaseFilterType, FilteredPhase, SavitzkyGolay, Butterworth};
pub use coherence_test::{coherence_likelihood_ratio, LikelihoodRatioOutcome};
pub use pipeline::{Pipeline, PipelineOutput, PixelSeries, VisualizationData};
