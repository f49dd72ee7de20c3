//! Hyperparameter search space definitions.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use crate::errors::OptimizerError;

/// A single hyperparameter dimension in the search space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDef {
    /// Hyperparameter name as the model expects it (e.g. "n_estimators").
    pub name: String,
    /// The kind of search range.
    pub kind: ParameterKind,
}

/// Describes the domain of a hyperparameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParameterKind {
    /// Continuous uniform range [low, high].
    FloatRange { low: f64, high: f64 },
    /// Integer range [low, high] inclusive.
    IntRange { low: i64, high: i64 },
    /// Log-uniform range (sampled in log-space then exponentiated).
    LogUniform { low: f64, high: f64 },
    /// Categorical choices.
    Choice { values: Vec<serde_json::Value> },
}

/// A concrete hyperparameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Int(i64),
    Float(f64),
    Json(serde_json::Value),
}

impl ParameterValue {
    /// Numeric view of the value; integers widen, JSON numbers are read.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            Self::Json(v) => v.as_f64(),
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            Self::Float(_) => None,
            Self::Json(v) => v.as_i64(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Json(v) => v.as_str(),
            _ => None,
        }
    }
}

impl std::fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Float(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Json(v) => write!(f, "{v}"),
        }
    }
}

/// Named hyperparameter assignment handed to a model type.
pub type Params = BTreeMap<String, ParameterValue>;

/// The full search space: an ordered list of parameter definitions.
///
/// Order matters: optimizers address dimensions positionally, and the
/// trainer maps those positions back to names in this order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchSpace {
    pub parameters: Vec<ParameterDef>,
}

impl SearchSpace {
    pub fn new() -> Self {
        Self {
            parameters: Vec::new(),
        }
    }

    pub fn add_float(mut self, name: impl Into<String>, low: f64, high: f64) -> Self {
        self.parameters.push(ParameterDef {
            name: name.into(),
            kind: ParameterKind::FloatRange { low, high },
        });
        self
    }

    pub fn add_int(mut self, name: impl Into<String>, low: i64, high: i64) -> Self {
        self.parameters.push(ParameterDef {
            name: name.into(),
            kind: ParameterKind::IntRange { low, high },
        });
        self
    }

    pub fn add_log_uniform(mut self, name: impl Into<String>, low: f64, high: f64) -> Self {
        self.parameters.push(ParameterDef {
            name: name.into(),
            kind: ParameterKind::LogUniform { low, high },
        });
        self
    }

    pub fn add_choice(mut self, name: impl Into<String>, values: Vec<serde_json::Value>) -> Self {
        self.parameters.push(ParameterDef {
            name: name.into(),
            kind: ParameterKind::Choice { values },
        });
        self
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    /// Dimension names in positional order.
    pub fn names(&self) -> Vec<String> {
        self.parameters.iter().map(|p| p.name.clone()).collect()
    }

    /// Check every dimension is well formed and names are unique.
    pub fn validate(&self) -> Result<(), OptimizerError> {
        if self.parameters.is_empty() {
            return Err(OptimizerError::EmptySpace);
        }

        let mut seen = HashSet::new();
        for param in &self.parameters {
            let invalid = |message: &str| OptimizerError::InvalidDimension {
                name: param.name.clone(),
                message: message.to_string(),
            };

            if !seen.insert(param.name.as_str()) {
                return Err(invalid("duplicate dimension name"));
            }

            match &param.kind {
                ParameterKind::FloatRange { low, high } => {
                    if !low.is_finite() || !high.is_finite() || low >= high {
                        return Err(invalid("float range needs finite low < high"));
                    }
                }
                ParameterKind::IntRange { low, high } => {
                    if low > high {
                        return Err(invalid("int range needs low <= high"));
                    }
                }
                ParameterKind::LogUniform { low, high } => {
                    if !low.is_finite() || *low <= 0.0 || !high.is_finite() || low >= high {
                        return Err(invalid("log-uniform range needs 0 < low < high"));
                    }
                }
                ParameterKind::Choice { values } => {
                    if values.is_empty() {
                        return Err(invalid("choice needs at least one value"));
                    }
                }
            }
        }

        Ok(())
    }
}

impl Default for SearchSpace {
    fn default() -> Self {
        Self::new()
    }
}

impl ParameterDef {
    /// Whether `value` lies inside this dimension's domain.
    pub fn contains(&self, value: &ParameterValue) -> bool {
        match (&self.kind, value) {
            (ParameterKind::FloatRange { low, high }, v)
            | (ParameterKind::LogUniform { low, high }, v) => match v.as_f64() {
                Some(x) => x >= *low && x <= *high,
                None => false,
            },
            (ParameterKind::IntRange { low, high }, ParameterValue::Int(v)) => {
                v >= low && v <= high
            }
            (ParameterKind::IntRange { .. }, _) => false,
            (ParameterKind::Choice { values }, ParameterValue::Json(v)) => values.contains(v),
            (ParameterKind::Choice { .. }, _) => false,
        }
    }
}
