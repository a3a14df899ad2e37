mod diagnostics;
mod estimator;
pub mod math;
mod shape;

pub use diagnostics::{AnomalyKind, AnomalyRecord, CollectingSink, DiagnosticSink, TracingSink};
pub use estimator::{EstimatorConfig, TargetProbabilityEstimator};
pub use shape::{DiagonalModelPolicy, ModelCollapsePolicy, ScoreShapeError};

use numpy::{IntoPyArray, PyArrayDyn, PyReadonlyArrayDyn};
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

#[pyfunction]
#[pyo3(signature = (scores, softmax_scale=2.0, valid_targets=None, marginalize_models=true))]
fn estimate_target_probabilities<'py>(
    py: Python<'py>,
    scores: PyReadonlyArrayDyn<'py, f64>,
    softmax_scale: f64,
    valid_targets: Option<PyReadonlyArrayDyn<'py, bool>>,
    marginalize_models: bool,
) -> PyResult<Bound<'py, PyArrayDyn<f64>>> {
    let mut est = TargetProbabilityEstimator::new(EstimatorConfig {
        softmax_scale,
        marginalize_models,
    });
    let mask = valid_targets.as_ref().map(|m| m.as_array());
    let probs = est
        .estimate(scores.as_array(), mask)
        .map_err(|err| PyValueError::new_err(err.to_string()))?;
    Ok(probs.into_pyarray_bound(py))
}

#[pyfunction]
#[pyo3(signature = (scores, valid_targets=None))]
fn masked_softmax<'py>(
    py: Python<'py>,
    scores: PyReadonlyArrayDyn<'py, f64>,
    valid_targets: Option<PyReadonlyArrayDyn<'py, bool>>,
) -> PyResult<Bound<'py, PyArrayDyn<f64>>> {
    let mask = valid_targets.as_ref().map(|m| m.as_array());
    let probs = math::softmax::masked_softmax(scores.as_array(), mask)
        .map_err(|err| PyValueError::new_err(err.to_string()))?;
    Ok(probs.into_pyarray_bound(py))
}

#[pymodule]
fn bci_softmax(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(estimate_target_probabilities, m)?)?;
    m.add_function(wrap_pyfunction!(masked_softmax, m)?)?;
    Ok(())
}
