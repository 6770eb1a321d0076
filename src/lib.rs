//! tcsar: coherent-scatterer selection and phase time series for InSAR stacks
//!
//! Starting from a co-registered SLC stack with its baselines and acquisition dates,
//! the crate classifies stable pixels by amplitude dispersion, forms a single-master
//! interferogram network, computes arc phases against a reference pixel, scores their
//! temporal noise and smooths them with Savitzky-Golay and Butterworth filters.

pub mod types;
pub mod config;
pub mod io;
pub mod core;

#[cfg(feature = "python")]
mod python;

#[cfg(test)]
mod test_support;

// Re-export main types and functions for easier access
pub use types::{
    SarComplex, SarImage, SarRealImage, SarCube, PhaseCube, QualityMap, PixelMask,
    PixelCoord, SlcStack, StackData, GeometryLayers, Stage, SarError, SarResult,
};

pub use config::{
    PipelineConfig, MasterSelection, NoiseModel, SavitzkyGolayParams, ButterworthParams,
    VirtualReferenceParams, DatasetLayout,
};

pub use io::{StackReader, StackSource, MemoryStackSource, Dataset};

pub use crate::core::{Pipeline, PipelineOutput, PixelSeries};
