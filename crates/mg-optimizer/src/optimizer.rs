//! The ask/tell surrogate-optimizer interface.

use mg_types::{OptimizerError, ParameterValue};
use serde::{Deserialize, Serialize};

/// A candidate: one value per search-space dimension, in dimension order.
pub type Point = Vec<ParameterValue>;

/// Best observation so far, returned from every `tell`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizeState {
    /// Point with the lowest finite objective, if any was observed.
    pub best_point: Option<Point>,
    /// Lowest finite objective, `f64::INFINITY` when none was observed.
    pub best_value: f64,
    pub n_observations: usize,
}

/// Sequential optimizer that proposes points and learns from their losses.
///
/// `tell` is position-sensitive: `values[i]` is the loss of `points[i]`.
pub trait SurrogateOptimizer: Send {
    /// Propose `n_points` candidates to evaluate next.
    fn ask(&mut self, n_points: usize) -> Result<Vec<Point>, OptimizerError>;

    /// Record the losses of evaluated points and return the updated best.
    fn tell(&mut self, points: Vec<Point>, values: Vec<f64>) -> Result<OptimizeState, OptimizerError>;

    /// Current best without recording anything.
    fn state(&self) -> OptimizeState;

    /// Human-readable optimizer name.
    fn name(&self) -> &str;
}

/// Observed points, their unit-cube coordinates, and losses.
#[derive(Debug, Clone, Default)]
pub(crate) struct Observations {
    pub points: Vec<Point>,
    pub units: Vec<Vec<f64>>,
    pub values: Vec<f64>,
}

impl Observations {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn push(&mut self, point: Point, unit: Vec<f64>, value: f64) {
        self.points.push(point);
        self.units.push(unit);
        self.values.push(value);
    }

    pub fn state(&self) -> OptimizeState {
        let best = self
            .values
            .iter()
            .enumerate()
            .filter(|(_, v)| v.is_finite())
            .min_by(|a, b| a.1.total_cmp(b.1));

        match best {
            Some((idx, &value)) => OptimizeState {
                best_point: Some(self.points[idx].clone()),
                best_value: value,
                n_observations: self.len(),
            },
            None => OptimizeState {
                best_point: None,
                best_value: f64::INFINITY,
                n_observations: self.len(),
            },
        }
    }

    /// Losses with non-finite entries replaced by the worst finite loss
    /// plus one (or 1.0 when nothing finite was observed).
    pub fn sanitized_values(&self) -> Vec<f64> {
        sanitize(&self.values)
    }
}

pub(crate) fn sanitize(values: &[f64]) -> Vec<f64> {
    let worst = values
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |a| a.max(v))));
    let penalty = worst.map_or(1.0, |w| w + 1.0);
    values
        .iter()
        .map(|&v| if v.is_finite() { v } else { penalty })
        .collect()
}

/// Validate a `tell` batch before anything is recorded.
pub(crate) fn check_batch(points: &[Point], values: &[f64]) -> Result<(), OptimizerError> {
    if points.len() != values.len() {
        return Err(OptimizerError::LengthMismatch {
            points: points.len(),
            values: values.len(),
        });
    }
    Ok(())
}
