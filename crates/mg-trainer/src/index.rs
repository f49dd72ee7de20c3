//! Positional optimizer coordinates to named hyperparameters.

use mg_optimizer::Point;
use mg_types::{MgResult, OptimizerError, ParameterValue, Params, SearchSpace};
use serde::{Deserialize, Serialize};

/// Ordered hyperparameter names of one model space, aligned with the
/// coordinates of the points its optimizer proposes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamIndex {
    names: Vec<String>,
}

impl ParamIndex {
    pub fn from_space(space: &SearchSpace) -> Self {
        Self { names: space.names() }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Name each coordinate of `point`.
    pub fn to_params(&self, point: &[ParameterValue]) -> MgResult<Params> {
        if point.len() != self.names.len() {
            return Err(OptimizerError::PointOutOfSpace {
                message: format!("expected {} coordinates, got {}", self.names.len(), point.len()),
            }
            .into());
        }
        Ok(self.names.iter().cloned().zip(point.iter().cloned()).collect())
    }

    /// Coordinates of `params` in index order, if every name is present.
    pub fn to_point(&self, params: &Params) -> Option<Point> {
        self.names.iter().map(|name| params.get(name).cloned()).collect()
    }
}
