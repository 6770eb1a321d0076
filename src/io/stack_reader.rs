use crate::config::DatasetLayout;
use crate::types::{
    GeometryLayers, SarCube, SarError, SarRealImage, SarResult, SlcStack, StackData, Stage,
};
use chrono::NaiveDate;
use ndarray::Array1;
use std::collections::HashMap;

/// A typed dataset held by a container
#[derive(Debug, Clone)]
pub enum Dataset {
    /// Complex cube `[T, H, W]`
    Complex(SarCube),
    /// Real vector (baselines)
    Vector(Array1<f64>),
    /// Real raster `[H, W]`
    Raster(SarRealImage),
    /// Text entries (acquisition dates)
    Text(Vec<String>),
}

impl Dataset {
    fn kind(&self) -> &'static str {
        match self {
            Dataset::Complex(_) => "complex cube",
            Dataset::Vector(_) => "vector",
            Dataset::Raster(_) => "raster",
            Dataset::Text(_) => "text",
        }
    }
}

/// Named-dataset access to an opaque container (HDF5 file, memory, ...)
///
/// Implementations only hand out arrays; shape validation happens in
/// [`StackReader`].
pub trait StackSource {
    /// Description used in log messages
    fn describe(&self) -> String;

    /// Names of all datasets available in the container
    fn dataset_names(&self) -> Vec<String>;

    fn read_complex_cube(&self, name: &str) -> SarResult<SarCube>;

    fn read_vector(&self, name: &str) -> SarResult<Array1<f64>>;

    fn read_raster(&self, name: &str) -> SarResult<SarRealImage>;

    fn read_text(&self, name: &str) -> SarResult<Vec<String>>;

    fn contains(&self, name: &str) -> bool {
        self.dataset_names().iter().any(|n| n == name)
    }
}

/// In-memory container, used when arrays are already loaded
#[derive(Debug, Clone, Default)]
pub struct MemoryStackSource {
    name: String,
    datasets: HashMap<String, Dataset>,
}

impl MemoryStackSource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            datasets: HashMap::new(),
        }
    }

    pub fn insert(&mut self, name: impl Into<String>, dataset: Dataset) {
        self.datasets.insert(name.into(), dataset);
    }

    pub fn with(mut self, name: impl Into<String>, dataset: Dataset) -> Self {
        self.insert(name, dataset);
        self
    }

    fn get(&self, name: &str) -> SarResult<&Dataset> {
        self.datasets
            .get(name)
            .ok_or_else(|| SarError::MissingDataset(format!("'{}' in {}", name, self.name)))
    }

    fn wrong_kind(&self, name: &str, expected: &str, found: &Dataset) -> SarError {
        SarError::Data {
            stage: Stage::Ingestion,
            message: format!(
                "dataset '{}' in {} is a {}, expected a {}",
                name,
                self.name,
                found.kind(),
                expected
            ),
        }
    }
}

impl StackSource for MemoryStackSource {
    fn describe(&self) -> String {
        format!("memory container '{}'", self.name)
    }

    fn dataset_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.datasets.keys().cloned().collect();
        names.sort();
        names
    }

    fn read_complex_cube(&self, name: &str) -> SarResult<SarCube> {
        match self.get(name)? {
            Dataset::Complex(cube) => Ok(cube.clone()),
            other => Err(self.wrong_kind(name, "complex cube", other)),
        }
    }

    fn read_vector(&self, name: &str) -> SarResult<Array1<f64>> {
        match self.get(name)? {
            Dataset::Vector(v) => Ok(v.clone()),
            other => Err(self.wrong_kind(name, "vector", other)),
        }
    }

    fn read_raster(&self, name: &str) -> SarResult<SarRealImage> {
        match self.get(name)? {
            Dataset::Raster(r) => Ok(r.clone()),
            other => Err(self.wrong_kind(name, "raster", other)),
        }
    }

    fn read_text(&self, name: &str) -> SarResult<Vec<String>> {
        match self.get(name)? {
            Dataset::Text(t) => Ok(t.clone()),
            other => Err(self.wrong_kind(name, "text", other)),
        }
    }

    fn contains(&self, name: &str) -> bool {
        self.datasets.contains_key(name)
    }
}

/// Reads and validates a complete stack from an SLC container and a geometry container
pub struct StackReader {
    layout: DatasetLayout,
}

impl StackReader {
    pub fn new(layout: DatasetLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &DatasetLayout {
        &self.layout
    }

    /// Load SLC cube, baselines and dates from `slc_source` and the configured
    /// geometry layers from `geometry_source`
    pub fn load(&self, slc_source: &dyn StackSource, geometry_source: &dyn StackSource) -> SarResult<StackData> {
        log::info!(
            "Loading stack from {} (geometry: {})",
            slc_source.describe(),
            geometry_source.describe()
        );
        let start_time = std::time::Instant::now();

        let slc = SlcStack::new(slc_source.read_complex_cube(&self.layout.slc)?)?;
        let (rows, cols) = slc.shape();
        log::debug!(
            "SLC stack: {} acquisitions of {} x {} pixels",
            slc.num_acquisitions(),
            rows,
            cols
        );

        let tbase = slc_source.read_vector(&self.layout.tbase)?;
        let pbase = slc_source.read_vector(&self.layout.pbase)?;
        let dates = slc_source
            .read_text(&self.layout.dates)?
            .iter()
            .map(|s| parse_acquisition_date(s))
            .collect::<SarResult<Vec<_>>>()?;

        let mut geometry = GeometryLayers::new();
        for name in &self.layout.geometry_layers {
            let layer = geometry_source.read_raster(name)?;
            log::debug!("Geometry layer '{}': {:?}", name, layer.dim());
            geometry.insert(name.clone(), layer);
        }

        let data = StackData::new(slc, tbase, pbase, dates, geometry)?;
        log::info!(
            "Stack loaded in {:?}: {} acquisitions, {} geometry layers",
            start_time.elapsed(),
            data.num_acquisitions(),
            data.geometry.len()
        );
        Ok(data)
    }
}

impl Default for StackReader {
    fn default() -> Self {
        Self::new(DatasetLayout::default())
    }
}

/// Load a stack with an explicit dataset layout
pub fn load_stack(
    slc_source: &dyn StackSource,
    geometry_source: &dyn StackSource,
    layout: &DatasetLayout,
) -> SarResult<StackData> {
    StackReader::new(layout.clone()).load(slc_source, geometry_source)
}

/// Parse an acquisition date written as `YYYYMMDD` or `YYYY-MM-DD`
pub fn parse_acquisition_date(text: &str) -> SarResult<NaiveDate> {
    let trimmed = text.trim();
    NaiveDate::parse_from_str(trimmed, "%Y%m%d")
        .or_else(|_| NaiveDate::parse_from_str(trimmed, "%Y-%m-%d"))
        .map_err(|e| SarError::Data {
            stage: Stage::Ingestion,
            message: format!("invalid acquisition date '{}': {}", text, e),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SarComplex;

    fn slc_container(n: usize) -> MemoryStackSource {
        let dates = (0..n).map(|i| format!("202001{:02}", 1 + i * 6)).collect();
        MemoryStackSource::new("slc")
            .with("slc", Dataset::Complex(SarCube::from_elem((n, 4, 3), SarComplex::new(1.0, 1.0))))
            .with("tbase", Dataset::Vector(Array1::from_iter((0..n).map(|i| i as f64 * 6.0))))
            .with("pbase", Dataset::Vector(Array1::zeros(n)))
            .with("date", Dataset::Text(dates))
    }

    fn geometry_container() -> MemoryStackSource {
        MemoryStackSource::new("geometry")
            .with("incidenceAngle", Dataset::Raster(SarRealImage::from_elem((4, 3), 38.0)))
            .with("height", Dataset::Raster(SarRealImage::zeros((4, 3))))
    }

    #[test]
    fn test_load_stack() {
        let reader = StackReader::default();
        let data = reader.load(&slc_container(4), &geometry_container()).unwrap();

        assert_eq!(data.num_acquisitions(), 4);
        assert_eq!(data.shape(), (4, 3));
        assert_eq!(data.dates[1], NaiveDate::from_ymd_opt(2020, 1, 7).unwrap());
        assert_eq!(data.geometry.len(), 2);
    }

    #[test]
    fn test_missing_dataset() {
        let geometry = MemoryStackSource::new("geometry")
            .with("height", Dataset::Raster(SarRealImage::zeros((4, 3))));
        let err = StackReader::default().load(&slc_container(3), &geometry).unwrap_err();
        assert!(matches!(err, SarError::MissingDataset(ref name) if name.contains("incidenceAngle")));
    }

    #[test]
    fn test_baseline_length_mismatch() {
        let mut slc = slc_container(3);
        slc.insert("pbase", Dataset::Vector(Array1::zeros(2)));
        let err = StackReader::default().load(&slc, &geometry_container()).unwrap_err();
        assert!(matches!(err, SarError::Data { stage: Stage::Ingestion, .. }));
    }

    #[test]
    fn test_wrong_dataset_kind() {
        let mut slc = slc_container(3);
        slc.insert("tbase", Dataset::Text(vec!["0".into(), "6".into(), "12".into()]));
        assert!(StackReader::default().load(&slc, &geometry_container()).is_err());
    }

    #[test]
    fn test_parse_dates() {
        assert!(parse_acquisition_date("20191231").is_ok());
        assert!(parse_acquisition_date("2019-12-31").is_ok());
        assert!(parse_acquisition_date("31/12/2019").is_err());
    }
}
