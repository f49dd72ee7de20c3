//! Model capability traits.

use std::fmt::Debug;

use crate::dataset::XycDataset;
use crate::errors::EvaluationError;
use crate::space::{ParameterValue, Params, SearchSpace};

/// A trainable model family: knows its name, its default search space, and
/// how to build an untrained model from a parameter assignment.
pub trait ModelType: Send + Sync + Debug {
    fn name(&self) -> &str;

    /// Search space used when the caller registers the bare type.
    fn default_space(&self) -> SearchSpace;

    fn build(&self, params: &Params) -> Result<Box<dyn Model>, EvaluationError>;
}

/// A single model instance configured with concrete hyperparameters.
pub trait Model: Send {
    fn fit(&mut self, train: &XycDataset) -> Result<(), EvaluationError>;

    /// Hard predictions (class labels or regression values).
    fn predict(&self, x: &[Vec<f64>]) -> Result<Vec<f64>, EvaluationError>;

    /// Positive-class probabilities. Defaults to the hard predictions.
    fn predict_proba(&self, x: &[Vec<f64>]) -> Result<Vec<f64>, EvaluationError> {
        self.predict(x)
    }
}

/// Read an integer hyperparameter, falling back to `default` when absent.
pub fn param_i64(params: &Params, name: &str, default: i64) -> Result<i64, EvaluationError> {
    match params.get(name) {
        None => Ok(default),
        Some(value) => value.as_i64().ok_or_else(|| invalid(name, value, "an integer")),
    }
}

/// Read a numeric hyperparameter, falling back to `default` when absent.
pub fn param_f64(params: &Params, name: &str, default: f64) -> Result<f64, EvaluationError> {
    match params.get(name) {
        None => Ok(default),
        Some(value) => value.as_f64().ok_or_else(|| invalid(name, value, "a number")),
    }
}

/// Read a string hyperparameter, falling back to `default` when absent.
pub fn param_str<'a>(
    params: &'a Params,
    name: &str,
    default: &'a str,
) -> Result<&'a str, EvaluationError> {
    match params.get(name) {
        None => Ok(default),
        Some(value) => value.as_str().ok_or_else(|| invalid(name, value, "a string")),
    }
}

fn invalid(name: &str, value: &ParameterValue, expected: &str) -> EvaluationError {
    EvaluationError::InvalidParameter {
        name: name.to_string(),
        message: format!("expected {expected}, got {value}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_typed_param_access() {
        let mut params = Params::new();
        params.insert("k".into(), ParameterValue::Int(5));
        params.insert("lr".into(), ParameterValue::Float(0.5));
        params.insert("weights".into(), ParameterValue::Json(json!("distance")));

        assert_eq!(param_i64(&params, "k", 1).unwrap(), 5);
        assert_eq!(param_i64(&params, "missing", 7).unwrap(), 7);
        assert_eq!(param_f64(&params, "k", 0.0).unwrap(), 5.0);
        assert_eq!(param_f64(&params, "lr", 0.0).unwrap(), 0.5);
        assert_eq!(param_str(&params, "weights", "uniform").unwrap(), "distance");

        assert!(matches!(
            param_i64(&params, "lr", 1),
            Err(EvaluationError::InvalidParameter { ref name, .. }) if name == "lr"
        ));
        assert!(param_str(&params, "k", "uniform").is_err());
    }
}
