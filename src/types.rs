use chrono::NaiveDate;
use ndarray::{Array1, Array2, Array3, ArrayView2, Axis};
use num_complex::Complex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Complex-valued SAR sample (I + jQ)
pub type SarComplex = Complex<f32>;

/// Real-valued amplitude, dispersion or geometry raster
pub type SarReal = f32;

/// 2D complex SAR data array (row x column)
pub type SarImage = Array2<SarComplex>;

/// 2D real SAR data array (row x column)
pub type SarRealImage = Array2<SarReal>;

/// 3D complex data cube (acquisition/pair x row x column)
pub type SarCube = Array3<SarComplex>;

/// 3D phase cube in radians (acquisition x row x column)
pub type PhaseCube = Array3<f64>;

/// 2D per-pixel quality map
pub type QualityMap = Array2<f64>;

/// Boolean pixel mask
pub type PixelMask = Array2<bool>;

/// Pixel coordinate in radar geometry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PixelCoord {
    pub row: usize,
    pub col: usize,
}

impl PixelCoord {
    pub fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }

    /// Euclidean distance in pixel units
    pub fn distance(&self, other: &PixelCoord) -> f64 {
        let dr = self.row as f64 - other.row as f64;
        let dc = self.col as f64 - other.col as f64;
        (dr * dr + dc * dc).sqrt()
    }
}

impl fmt::Display for PixelCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.row, self.col)
    }
}

/// Co-registered SLC stack, chronologically ordered along the first axis.
///
/// The cube is private so that the acquisition order and spatial shape cannot
/// change once the stack has been validated.
#[derive(Debug, Clone)]
pub struct SlcStack {
    data: SarCube,
}

impl SlcStack {
    /// Wrap a `[T, H, W]` cube, rejecting empty dimensions
    pub fn new(data: SarCube) -> SarResult<Self> {
        let (t, h, w) = data.dim();
        if t == 0 || h == 0 || w == 0 {
            return Err(SarError::Data {
                stage: Stage::Ingestion,
                message: format!("SLC stack has an empty dimension: {} x {} x {}", t, h, w),
            });
        }
        Ok(Self { data })
    }

    pub fn num_acquisitions(&self) -> usize {
        self.data.len_of(Axis(0))
    }

    /// Spatial shape `(rows, cols)` shared by every acquisition
    pub fn shape(&self) -> (usize, usize) {
        let (_, h, w) = self.data.dim();
        (h, w)
    }

    pub fn slice(&self, acquisition: usize) -> ArrayView2<'_, SarComplex> {
        self.data.index_axis(Axis(0), acquisition)
    }

    pub fn data(&self) -> &SarCube {
        &self.data
    }

    /// Per-sample amplitude cube |s|
    pub fn amplitude(&self) -> Array3<SarReal> {
        self.data.mapv(|s| s.norm())
    }
}

/// Named auxiliary rasters (incidence angle, height, ...) sharing the SLC grid
#[derive(Debug, Clone, Default)]
pub struct GeometryLayers {
    layers: BTreeMap<String, SarRealImage>,
}

impl GeometryLayers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, layer: SarRealImage) {
        self.layers.insert(name.into(), layer);
    }

    pub fn get(&self, name: &str) -> Option<&SarRealImage> {
        self.layers.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.layers.keys().map(|k| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (&String, &SarRealImage)> {
        self.layers.iter()
    }
}

/// Everything the processing chain needs from the data source
#[derive(Debug, Clone)]
pub struct StackData {
    pub slc: SlcStack,
    /// Temporal baseline per acquisition (days)
    pub tbase: Array1<f64>,
    /// Perpendicular baseline per acquisition (meters)
    pub pbase: Array1<f64>,
    pub dates: Vec<NaiveDate>,
    pub geometry: GeometryLayers,
}

impl StackData {
    /// Assemble stack data, checking that every per-acquisition sequence and
    /// every geometry layer is aligned with the SLC cube.
    pub fn new(
        slc: SlcStack,
        tbase: Array1<f64>,
        pbase: Array1<f64>,
        dates: Vec<NaiveDate>,
        geometry: GeometryLayers,
    ) -> SarResult<Self> {
        let n = slc.num_acquisitions();
        let shape = slc.shape();

        for (name, len) in [("tbase", tbase.len()), ("pbase", pbase.len()), ("dates", dates.len())] {
            if len != n {
                return Err(SarError::Data {
                    stage: Stage::Ingestion,
                    message: format!("{} has {} entries but the SLC stack has {} acquisitions", name, len, n),
                });
            }
        }

        if dates.windows(2).any(|w| w[1] < w[0]) {
            return Err(SarError::Data {
                stage: Stage::Ingestion,
                message: "acquisition dates are not in chronological order".to_string(),
            });
        }

        for (name, layer) in geometry.iter() {
            if layer.dim() != shape {
                return Err(SarError::Data {
                    stage: Stage::Ingestion,
                    message: format!(
                        "geometry layer '{}' has shape {:?}, expected {:?}",
                        name,
                        layer.dim(),
                        shape
                    ),
                });
            }
        }

        Ok(Self { slc, tbase, pbase, dates, geometry })
    }

    pub fn num_acquisitions(&self) -> usize {
        self.slc.num_acquisitions()
    }

    pub fn shape(&self) -> (usize, usize) {
        self.slc.shape()
    }

    /// Crop a spatial window `[row0, row1) x [col0, col1)` out of the stack
    pub fn subset(&self, rows: (usize, usize), cols: (usize, usize)) -> SarResult<Self> {
        let (h, w) = self.shape();
        if rows.0 >= rows.1 || cols.0 >= cols.1 || rows.1 > h || cols.1 > w {
            return Err(SarError::Configuration {
                stage: Stage::Ingestion,
                message: format!(
                    "subset rows {:?} cols {:?} is empty or outside the {} x {} grid",
                    rows, cols, h, w
                ),
            });
        }

        let window = ndarray::s![.., rows.0..rows.1, cols.0..cols.1];
        let slc = SlcStack::new(self.slc.data().slice(window).to_owned())?;

        let mut geometry = GeometryLayers::new();
        for (name, layer) in self.geometry.iter() {
            geometry.insert(
                name.clone(),
                layer.slice(ndarray::s![rows.0..rows.1, cols.0..cols.1]).to_owned(),
            );
        }

        Ok(Self {
            slc,
            tbase: self.tbase.clone(),
            pbase: self.pbase.clone(),
            dates: self.dates.clone(),
            geometry,
        })
    }
}

/// Processing stage that raised an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Ingestion,
    Dispersion,
    Network,
    Reference,
    ArcPhase,
    TemporalNoise,
    PhaseFilter,
    Pipeline,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Ingestion => "ingestion",
            Stage::Dispersion => "dispersion",
            Stage::Network => "network",
            Stage::Reference => "reference",
            Stage::ArcPhase => "arc-phase",
            Stage::TemporalNoise => "temporal-noise",
            Stage::PhaseFilter => "phase-filter",
            Stage::Pipeline => "pipeline",
        };
        write!(f, "{}", name)
    }
}

/// Error types for time-series processing
#[derive(Debug, thiserror::Error)]
pub enum SarError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("[{stage}] configuration error: {message}")]
    Configuration { stage: Stage, message: String },

    #[error("[{stage}] data error: {message}")]
    Data { stage: Stage, message: String },

    #[error("Missing dataset: {0}")]
    MissingDataset(String),

    #[error("[{stage}] empty selection: {message}")]
    EmptySelection { stage: Stage, message: String },

    #[error("Processing error: {0}")]
    Processing(String),
}

impl SarError {
    /// Stage that raised the error, when known
    pub fn stage(&self) -> Option<Stage> {
        match self {
            SarError::Configuration { stage, .. }
            | SarError::Data { stage, .. }
            | SarError::EmptySelection { stage, .. } => Some(*stage),
            SarError::MissingDataset(_) => Some(Stage::Ingestion),
            _ => None,
        }
    }
}

/// Result type for SAR operations
pub type SarResult<T> = Result<T, SarError>;
