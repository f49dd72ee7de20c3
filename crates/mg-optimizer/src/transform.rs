//! Mapping between search-space points and the unit hypercube.

use mg_types::{OptimizerError, ParameterKind, ParameterValue, SearchSpace};
use rand::Rng;

use crate::optimizer::Point;

/// Converts points of a validated [`SearchSpace`] to and from `[0, 1]^d`.
///
/// Floats and ints map linearly, log-uniform dimensions map in log-space,
/// and choices map to their index spread evenly over the unit interval.
#[derive(Debug, Clone)]
pub struct SpaceTransform {
    space: SearchSpace,
}

impl SpaceTransform {
    pub fn new(space: SearchSpace) -> Result<Self, OptimizerError> {
        space.validate()?;
        Ok(Self { space })
    }

    pub fn space(&self) -> &SearchSpace {
        &self.space
    }

    pub fn n_dims(&self) -> usize {
        self.space.len()
    }

    /// Draw one point uniformly from the space.
    pub fn sample(&self, rng: &mut impl Rng) -> Point {
        self.space
            .parameters
            .iter()
            .map(|param| match &param.kind {
                ParameterKind::FloatRange { low, high } => {
                    ParameterValue::Float(rng.gen_range(*low..=*high))
                }
                ParameterKind::IntRange { low, high } => {
                    ParameterValue::Int(rng.gen_range(*low..=*high))
                }
                ParameterKind::LogUniform { low, high } => {
                    let log_val: f64 = rng.gen_range(low.ln()..=high.ln());
                    ParameterValue::Float(log_val.exp().clamp(*low, *high))
                }
                ParameterKind::Choice { values } => {
                    let idx = rng.gen_range(0..values.len());
                    ParameterValue::Json(values[idx].clone())
                }
            })
            .collect()
    }

    /// Check that `point` has one in-domain value per dimension.
    pub fn validate_point(&self, point: &Point) -> Result<(), OptimizerError> {
        if point.len() != self.space.len() {
            return Err(OptimizerError::PointOutOfSpace {
                message: format!(
                    "expected {} coordinates, got {}",
                    self.space.len(),
                    point.len()
                ),
            });
        }
        for (param, value) in self.space.parameters.iter().zip(point) {
            if !param.contains(value) {
                return Err(OptimizerError::PointOutOfSpace {
                    message: format!("{} = {value} is outside its domain", param.name),
                });
            }
        }
        Ok(())
    }

    /// Unit-cube coordinates of a point. Fails if the point is not in the space.
    pub fn to_unit(&self, point: &Point) -> Result<Vec<f64>, OptimizerError> {
        self.validate_point(point)?;

        Ok(self
            .space
            .parameters
            .iter()
            .zip(point)
            .map(|(param, value)| match &param.kind {
                ParameterKind::FloatRange { low, high } => {
                    let v = value.as_f64().unwrap_or(*low);
                    (v - low) / (high - low)
                }
                ParameterKind::IntRange { low, high } => {
                    if low == high {
                        0.5
                    } else {
                        let v = value.as_i64().unwrap_or(*low);
                        (v as f64 - *low as f64) / (*high as f64 - *low as f64)
                    }
                }
                ParameterKind::LogUniform { low, high } => {
                    let v = value.as_f64().unwrap_or(*low);
                    (v.ln() - low.ln()) / (high.ln() - low.ln())
                }
                ParameterKind::Choice { values } => {
                    let idx = match value {
                        ParameterValue::Json(v) => values.iter().position(|c| c == v).unwrap_or(0),
                        _ => 0,
                    };
                    if values.len() == 1 {
                        0.5
                    } else {
                        idx as f64 / (values.len() - 1) as f64
                    }
                }
            })
            .collect())
    }

    /// Point nearest to the given unit-cube coordinates.
    pub fn from_unit(&self, unit: &[f64]) -> Point {
        self.space
            .parameters
            .iter()
            .zip(unit)
            .map(|(param, &u)| {
                let u = u.clamp(0.0, 1.0);
                match &param.kind {
                    ParameterKind::FloatRange { low, high } => {
                        ParameterValue::Float(low + u * (high - low))
                    }
                    ParameterKind::IntRange { low, high } => {
                        let v = *low as f64 + u * (*high as f64 - *low as f64);
                        ParameterValue::Int((v.round() as i64).clamp(*low, *high))
                    }
                    ParameterKind::LogUniform { low, high } => {
                        let v = (low.ln() + u * (high.ln() - low.ln())).exp();
                        ParameterValue::Float(v.clamp(*low, *high))
                    }
                    ParameterKind::Choice { values } => {
                        let idx = (u * (values.len() - 1) as f64).round() as usize;
                        ParameterValue::Json(values[idx.min(values.len() - 1)].clone())
                    }
                }
            })
            .collect()
    }
}
