//! Uniform random search behind the ask/tell interface.

use mg_types::{OptimizerError, SearchSpace};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::optimizer::{check_batch, Observations, OptimizeState, Point, SurrogateOptimizer};
use crate::transform::SpaceTransform;

/// Samples every point uniformly and only tracks the best observation.
pub struct RandomOptimizer {
    transform: SpaceTransform,
    rng: ChaCha8Rng,
    observations: Observations,
}

impl RandomOptimizer {
    pub fn new(space: SearchSpace, seed: u64) -> Result<Self, OptimizerError> {
        Ok(Self {
            transform: SpaceTransform::new(space)?,
            rng: ChaCha8Rng::seed_from_u64(seed),
            observations: Observations::default(),
        })
    }
}

impl SurrogateOptimizer for RandomOptimizer {
    fn ask(&mut self, n_points: usize) -> Result<Vec<Point>, OptimizerError> {
        if n_points == 0 {
            return Err(OptimizerError::InvalidBatchSize);
        }
        Ok((0..n_points).map(|_| self.transform.sample(&mut self.rng)).collect())
    }

    fn tell(&mut self, points: Vec<Point>, values: Vec<f64>) -> Result<OptimizeState, OptimizerError> {
        check_batch(&points, &values)?;
        let units = points
            .iter()
            .map(|p| self.transform.to_unit(p))
            .collect::<Result<Vec<_>, _>>()?;
        for ((point, unit), value) in points.into_iter().zip(units).zip(values) {
            self.observations.push(point, unit, value);
        }
        Ok(self.observations.state())
    }

    fn state(&self) -> OptimizeState {
        self.observations.state()
    }

    fn name(&self) -> &str {
        "random"
    }
}
