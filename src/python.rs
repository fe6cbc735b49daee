use numpy::{PyArray2, PyReadonlyArray2, ToPyArray};
use pyo3::exceptions::{PyIOError, PyRuntimeError, PyValueError};
use pyo3::prelude::*;

use crate::config::MetaFeatConfig;
use crate::error::MetaFeatError;
use crate::models::base_model::ClassifierKind;
use crate::pipeline::candidate;
use crate::pipeline::manager::MatrixStore;
use crate::storage::background::{BackgroundModel as BackgroundModelImpl, BackgroundModelBuilder};
use crate::storage::instance_cache::InstanceMatrixCache;

impl From<MetaFeatError> for PyErr {
    fn from(err: MetaFeatError) -> PyErr {
        match err {
            MetaFeatError::Configuration(_) | MetaFeatError::UnsupportedColumnType(_) => {
                PyValueError::new_err(err.to_string())
            }
            MetaFeatError::Io(_) => PyIOError::new_err(err.to_string()),
            other => PyRuntimeError::new_err(other.to_string()),
        }
    }
}

/// 1 when an AUC gain of `delta` counts as an improvement.
#[pyfunction]
fn label_for_delta(delta: f64) -> usize {
    candidate::label_for_delta(delta)
}

/// Code of a classifier name in the classifier meta-feature.
#[pyfunction]
fn classifier_index(name: &str) -> PyResult<usize> {
    let kind: ClassifierKind = name.parse()?;
    Ok(kind.index())
}

/// Cached candidate matrix of `dataset` as a 2-D array, or None.
#[pyfunction]
fn load_dataset_instances<'py>(py: Python<'py>, config_path: &str, dataset: &str) -> PyResult<Option<&'py PyArray2<f64>>> {
    let config = MetaFeatConfig::from_properties_file(config_path)?;
    let cache = InstanceMatrixCache::from_config(&config);
    Ok(cache.load(dataset)?.map(|m| m.data().to_pyarray(py)))
}

/// Python-exposed wrapper around the background meta-classifier.
#[pyclass]
pub struct BackgroundModel {
    inner: BackgroundModelImpl,
}

#[pymethods]
impl BackgroundModel {
    /// Load or train the leave-one-out model for `dataset`.
    #[staticmethod]
    fn build(config_path: &str, dataset: &str) -> PyResult<Self> {
        let config = MetaFeatConfig::from_properties_file(config_path)?;
        let inner = BackgroundModelBuilder::new(&config).build(dataset)?;
        Ok(BackgroundModel { inner })
    }

    #[getter]
    fn dataset(&self) -> String {
        self.inner.dataset().to_string()
    }

    fn predict_proba<'py>(&self, py: Python<'py>, x: PyReadonlyArray2<f64>) -> PyResult<&'py PyArray2<f64>> {
        let proba = self.inner.predict_proba(x.as_array())?;
        Ok(proba.to_pyarray(py))
    }
}

#[pymodule]
fn metafeat_rust(_py: Python, m: &PyModule) -> PyResult<()> {
    crate::utils::logging::init_tracing();
    m.add_function(wrap_pyfunction!(label_for_delta, m)?)?;
    m.add_function(wrap_pyfunction!(classifier_index, m)?)?;
    m.add_function(wrap_pyfunction!(load_dataset_instances, m)?)?;
    m.add_class::<BackgroundModel>()?;
    Ok(())
}
