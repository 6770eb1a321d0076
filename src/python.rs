//! Python bindings, built with the `python` feature

use crate::config::PipelineConfig;
use crate::core::{Pipeline, PipelineOutput};
use crate::io::parse_acquisition_date;
use crate::types::{GeometryLayers, PixelCoord, SarComplex, SarError, SlcStack, StackData};
use numpy::{IntoPyArray, PyArray1, PyArray2, PyArray3, PyReadonlyArray1, PyReadonlyArray3};
use pyo3::prelude::*;

fn to_py_err(err: SarError) -> PyErr {
    match err {
        SarError::Configuration { .. } => PyErr::new::<pyo3::exceptions::PyValueError, _>(format!("{}", err)),
        _ => PyErr::new::<pyo3::exceptions::PyRuntimeError, _>(format!("{}", err)),
    }
}

/// Python module definition
#[pymodule]
fn _core(_py: Python, m: &PyModule) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(run_pipeline, m)?)?;
    m.add_class::<PyPipelineOutput>()?;
    Ok(())
}

/// Run every stage on an in-memory stack; `config_json` overrides the defaults
#[pyfunction]
#[pyo3(signature = (slc, tbase, pbase, dates, config_json = None))]
fn run_pipeline(
    py: Python<'_>,
    slc: PyReadonlyArray3<SarComplex>,
    tbase: PyReadonlyArray1<f64>,
    pbase: PyReadonlyArray1<f64>,
    dates: Vec<String>,
    config_json: Option<String>,
) -> PyResult<PyPipelineOutput> {
    let config = match config_json {
        Some(text) => serde_json::from_str::<PipelineConfig>(&text)
            .map_err(|e| to_py_err(SarError::from(e)))?,
        None => PipelineConfig::default(),
    };
    let dates = dates
        .iter()
        .map(|d| parse_acquisition_date(d))
        .collect::<Result<Vec<_>, _>>()
        .map_err(to_py_err)?;

    let stack = SlcStack::new(slc.as_array().to_owned()).map_err(to_py_err)?;
    let data = StackData::new(
        stack,
        tbase.as_array().to_owned(),
        pbase.as_array().to_owned(),
        dates,
        GeometryLayers::new(),
    )
    .map_err(to_py_err)?;

    let pipeline = Pipeline::new(config).map_err(to_py_err)?;
    let inner = py.allow_threads(|| pipeline.run(&data)).map_err(to_py_err)?;
    Ok(PyPipelineOutput { inner })
}

/// Python wrapper for PipelineOutput
#[pyclass(name = "PipelineOutput")]
struct PyPipelineOutput {
    inner: PipelineOutput,
}

#[pymethods]
impl PyPipelineOutput {
    #[getter]
    fn reference(&self) -> (usize, usize) {
        (self.inner.reference.row, self.inner.reference.col)
    }

    #[getter]
    fn master_index(&self) -> usize {
        self.inner.network.master_index
    }

    #[getter]
    fn valid_ifg_pairs(&self) -> Vec<(usize, usize)> {
        self.inner.network.valid_ifg_pairs()
    }

    fn adi<'py>(&self, py: Python<'py>) -> &'py PyArray2<f32> {
        self.inner.dispersion.adi.clone().into_pyarray(py)
    }

    fn amplitude<'py>(&self, py: Python<'py>) -> &'py PyArray2<f32> {
        self.inner.dispersion.mean_amplitude.clone().into_pyarray(py)
    }

    fn first_order_mask<'py>(&self, py: Python<'py>) -> &'py PyArray2<bool> {
        self.inner.masks.first_order.clone().into_pyarray(py)
    }

    fn tcs_mask<'py>(&self, py: Python<'py>) -> &'py PyArray2<bool> {
        self.inner.masks.tcs.clone().into_pyarray(py)
    }

    fn coherence_map<'py>(&self, py: Python<'py>) -> &'py PyArray2<f32> {
        self.inner.network.coherence_map.clone().into_pyarray(py)
    }

    fn arc_phases<'py>(&self, py: Python<'py>) -> &'py PyArray3<f64> {
        self.inner.arc_phases.phases.clone().into_pyarray(py)
    }

    fn temporal_coherence<'py>(&self, py: Python<'py>) -> &'py PyArray2<f64> {
        self.inner.temporal_coherence.clone().into_pyarray(py)
    }

    fn phase_noise<'py>(&self, py: Python<'py>) -> &'py PyArray2<f64> {
        self.inner.phase_noise.clone().into_pyarray(py)
    }

    /// (wrapped, savgol, butterworth) series of one pixel
    fn pixel_series<'py>(
        &self,
        py: Python<'py>,
        row: usize,
        col: usize,
    ) -> PyResult<(&'py PyArray1<f64>, &'py PyArray1<f64>, &'py PyArray1<f64>)> {
        let series = self.inner.pixel_series(PixelCoord::new(row, col)).map_err(to_py_err)?;
        Ok((
            series.wrapped.into_pyarray(py),
            series.savgol.into_pyarray(py),
            series.butterworth.into_pyarray(py),
        ))
    }

    fn __repr__(&self) -> String {
        format!(
            "PipelineOutput(reference={}, pairs={}, first_order={}, tcs={})",
            self.inner.reference,
            self.inner.network.num_pairs(),
            self.inner.masks.count_first_order(),
            self.inner.masks.count_tcs()
        )
    }
}
