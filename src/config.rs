//! Pipeline parameters, validated once before any stage runs

use crate::types::{SarError, SarResult, Stage};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

/// How the common master acquisition of the star network is chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MasterSelection {
    /// Temporal midpoint of the stack (`T / 2`)
    Midpoint,
    /// Explicit acquisition index
    Index(usize),
}

impl Default for MasterSelection {
    fn default() -> Self {
        MasterSelection::Midpoint
    }
}

/// Phase noise model used by the temporal noise estimator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NoiseModel {
    /// sqrt(-2 ln γ) from the circular variance of the arc phases
    CircularVariance,
    /// Standard deviation of the unwrapped series after removing a linear trend in time
    DetrendedResidual,
}

impl Default for NoiseModel {
    fn default() -> Self {
        NoiseModel::CircularVariance
    }
}

/// Savitzky-Golay smoothing parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SavitzkyGolayParams {
    /// Number of acquisitions in the sliding window (must be odd)
    pub window_length: usize,
    /// Degree of the local polynomial (must be below the window length)
    pub poly_order: usize,
}

impl Default for SavitzkyGolayParams {
    fn default() -> Self {
        Self {
            window_length: 5,
            poly_order: 2,
        }
    }
}

impl SavitzkyGolayParams {
    pub fn validate(&self) -> SarResult<()> {
        if self.window_length % 2 == 0 {
            return Err(SarError::Configuration {
                stage: Stage::PhaseFilter,
                message: format!("Savitzky-Golay window length {} must be odd", self.window_length),
            });
        }
        if self.window_length <= self.poly_order {
            return Err(SarError::Configuration {
                stage: Stage::PhaseFilter,
                message: format!(
                    "Savitzky-Golay window length {} must be greater than polynomial order {}",
                    self.window_length, self.poly_order
                ),
            });
        }
        Ok(())
    }
}

/// Butterworth low-pass parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ButterworthParams {
    pub order: usize,
    /// Cutoff as a fraction of the Nyquist frequency of the acquisition sampling, in (0, 1)
    pub cutoff: f64,
}

impl Default for ButterworthParams {
    fn default() -> Self {
        Self {
            order: 2,
            cutoff: 0.3,
        }
    }
}

impl ButterworthParams {
    pub fn validate(&self) -> SarResult<()> {
        if self.order == 0 {
            return Err(SarError::Configuration {
                stage: Stage::PhaseFilter,
                message: "Butterworth order must be at least 1".to_string(),
            });
        }
        if !(self.cutoff > 0.0 && self.cutoff < 1.0) {
            return Err(SarError::Configuration {
                stage: Stage::PhaseFilter,
                message: format!("Butterworth cutoff {} must lie in (0, 1)", self.cutoff),
            });
        }
        Ok(())
    }
}

/// Nearest-neighbour parameters for the virtual reference network
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VirtualReferenceParams {
    pub enabled: bool,
    /// First-order neighbours linked to each TCS point
    pub neighbours: usize,
    /// Maximum arc length in pixels; `None` accepts any distance
    pub max_distance: Option<f64>,
}

impl Default for VirtualReferenceParams {
    fn default() -> Self {
        Self {
            enabled: true,
            neighbours: 1,
            max_distance: None,
        }
    }
}

/// Names of the datasets read from the SLC and geometry containers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetLayout {
    pub slc: String,
    pub tbase: String,
    pub pbase: String,
    pub dates: String,
    pub geometry_layers: Vec<String>,
}

impl Default for DatasetLayout {
    fn default() -> Self {
        Self {
            slc: "slc".to_string(),
            tbase: "tbase".to_string(),
            pbase: "pbase".to_string(),
            dates: "date".to_string(),
            geometry_layers: vec!["incidenceAngle".to_string(), "height".to_string()],
        }
    }
}

/// Complete set of pipeline parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// ADI threshold for first-order (PS) points
    pub adi_thr_ps: f32,
    /// ADI threshold for temporary coherent scatterers
    pub adi_thr_tcs: f32,
    /// Mean amplitudes at or below this value are treated as no-data
    pub min_amplitude: f32,
    pub master: MasterSelection,
    /// Boxcar window (odd) for per-pair spatial coherence
    pub coherence_window: usize,
    /// Maximum |Δt| in days for a pair to be kept
    pub max_temporal_baseline: Option<f64>,
    /// Maximum |Δb⊥| in meters for a pair to be kept
    pub max_perpendicular_baseline: Option<f64>,
    pub virtual_reference: VirtualReferenceParams,
    pub savgol: SavitzkyGolayParams,
    pub butterworth: ButterworthParams,
    /// Percentile (0-100) used for the adaptive reliability thresholds
    pub noise_percentile: f64,
    pub noise_model: NoiseModel,
    pub layout: DatasetLayout,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            adi_thr_ps: 0.25,
            adi_thr_tcs: 0.4,
            min_amplitude: 1e-6,
            master: MasterSelection::Midpoint,
            coherence_window: 3,
            max_temporal_baseline: None,
            max_perpendicular_baseline: None,
            virtual_reference: VirtualReferenceParams::default(),
            savgol: SavitzkyGolayParams::default(),
            butterworth: ButterworthParams::default(),
            noise_percentile: 25.0,
            noise_model: NoiseModel::CircularVariance,
            layout: DatasetLayout::default(),
        }
    }
}

impl PipelineConfig {
    /// Validate every parameter group
    pub fn validate(&self) -> SarResult<()> {
        for (name, thr) in [("ADI_THR_PS", self.adi_thr_ps), ("ADI_THR_TCS", self.adi_thr_tcs)] {
            if !thr.is_finite() || thr < 0.0 {
                return Err(SarError::Configuration {
                    stage: Stage::Dispersion,
                    message: format!("{} must be finite and non-negative, got {}", name, thr),
                });
            }
        }
        if self.adi_thr_ps > self.adi_thr_tcs {
            log::warn!(
                "ADI_THR_PS ({}) exceeds ADI_THR_TCS ({}): the TCS mask will be empty",
                self.adi_thr_ps,
                self.adi_thr_tcs
            );
        }
        if !self.min_amplitude.is_finite() || self.min_amplitude < 0.0 {
            return Err(SarError::Configuration {
                stage: Stage::Dispersion,
                message: format!("minimum amplitude {} must be finite and non-negative", self.min_amplitude),
            });
        }

        if self.coherence_window == 0 || self.coherence_window % 2 == 0 {
            return Err(SarError::Configuration {
                stage: Stage::Network,
                message: format!("coherence window {} must be odd", self.coherence_window),
            });
        }
        for (name, limit) in [
            ("temporal", self.max_temporal_baseline),
            ("perpendicular", self.max_perpendicular_baseline),
        ] {
            if let Some(limit) = limit {
                if !(limit > 0.0) {
                    return Err(SarError::Configuration {
                        stage: Stage::Network,
                        message: format!("maximum {} baseline must be positive, got {}", name, limit),
                    });
                }
            }
        }
        if self.virtual_reference.enabled && self.virtual_reference.neighbours == 0 {
            return Err(SarError::Configuration {
                stage: Stage::Network,
                message: "virtual reference needs at least one neighbour".to_string(),
            });
        }

        self.savgol.validate()?;
        self.butterworth.validate()?;

        if !(0.0..=100.0).contains(&self.noise_percentile) {
            return Err(SarError::Configuration {
                stage: Stage::TemporalNoise,
                message: format!("noise percentile {} must lie in [0, 100]", self.noise_percentile),
            });
        }

        Ok(())
    }

    /// Load a configuration from a JSON file; missing fields take their defaults
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> SarResult<Self> {
        log::info!("Reading pipeline configuration: {}", path.as_ref().display());
        let reader = BufReader::new(File::open(path)?);
        let config: PipelineConfig = serde_json::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json_file<P: AsRef<Path>>(&self, path: P) -> SarResult<()> {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(PipelineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_savgol_parameter_errors() {
        let even = SavitzkyGolayParams { window_length: 4, poly_order: 2 };
        assert!(even.validate().is_err());

        let too_high = SavitzkyGolayParams { window_length: 3, poly_order: 3 };
        assert!(matches!(
            too_high.validate(),
            Err(SarError::Configuration { stage: Stage::PhaseFilter, .. })
        ));
    }

    #[test]
    fn test_invalid_thresholds_and_cutoff() {
        let mut config = PipelineConfig::default();
        config.adi_thr_ps = f32::NAN;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.butterworth.cutoff = 1.0;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.noise_percentile = 101.0;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.coherence_window = 4;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_json_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.json");

        let mut config = PipelineConfig::default();
        config.master = MasterSelection::Index(2);
        config.noise_model = NoiseModel::DetrendedResidual;
        config.to_json_file(&path).unwrap();

        let loaded = PipelineConfig::from_json_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.json");
        std::fs::write(&path, r#"{ "adi_thr_ps": 0.2, "noise_percentile": 50.0 }"#).unwrap();

        let loaded = PipelineConfig::from_json_file(&path).unwrap();
        assert_eq!(loaded.adi_thr_ps, 0.2);
        assert_eq!(loaded.noise_percentile, 50.0);
        assert_eq!(loaded.savgol, SavitzkyGolayParams::default());
    }
}
