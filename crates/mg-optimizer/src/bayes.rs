//! Sequential model-based optimization over a pluggable surrogate.
//!
//! The first `n_initial_points` proposals are uniform random draws. After
//! that every ask fits the surrogate on all observations, scores
//! `n_candidates` random points with the acquisition function, and returns
//! the best. Batches of more than one point use the constant-liar strategy:
//! each proposal is temporarily recorded with the lowest loss seen so far
//! before the next one is chosen.

use mg_types::{OptimizerError, SearchSpace};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::acquisition::{Acquisition, HedgeState, HEDGE_PORTFOLIO};
use crate::optimizer::{check_batch, sanitize, Observations, OptimizeState, Point, SurrogateOptimizer};
use crate::transform::SpaceTransform;

/// A regression model over the unit hypercube with a predictive mean and
/// standard deviation, in the same units as the targets it was fit on.
pub trait SurrogateModel: Sized + Send {
    type Config: Clone + Send + std::fmt::Debug;

    const NAME: &'static str;

    fn fit(config: &Self::Config, xs: &[Vec<f64>], ys: &[f64], seed: u64) -> Result<Self, OptimizerError>;

    fn predict(&self, x: &[f64]) -> (f64, f64);
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BayesConfig {
    /// Random proposals before the surrogate is consulted.
    pub n_initial_points: usize,
    /// Random candidates scored per model-guided proposal.
    pub n_candidates: usize,
    pub acquisition: Acquisition,
}

impl Default for BayesConfig {
    fn default() -> Self {
        Self {
            n_initial_points: 10,
            n_candidates: 1000,
            acquisition: Acquisition::default(),
        }
    }
}

impl BayesConfig {
    pub fn with_initial_points(mut self, n: usize) -> Self {
        self.n_initial_points = n;
        self
    }

    pub fn with_candidates(mut self, n: usize) -> Self {
        self.n_candidates = n;
        self
    }

    pub fn with_acquisition(mut self, acquisition: Acquisition) -> Self {
        self.acquisition = acquisition;
        self
    }
}

pub struct BayesOptimizer<S: SurrogateModel> {
    transform: SpaceTransform,
    config: BayesConfig,
    surrogate_config: S::Config,
    rng: ChaCha8Rng,
    seed: u64,
    fits: u64,
    observations: Observations,
    hedge: Option<HedgeState>,
}

impl<S: SurrogateModel> BayesOptimizer<S> {
    pub fn new(
        space: SearchSpace,
        config: BayesConfig,
        surrogate_config: S::Config,
        seed: u64,
    ) -> Result<Self, OptimizerError> {
        let transform = SpaceTransform::new(space)?;
        let hedge = match config.acquisition {
            Acquisition::Hedge { eta } => Some(HedgeState::new(eta)),
            _ => None,
        };

        Ok(Self {
            transform,
            config,
            surrogate_config,
            rng: ChaCha8Rng::seed_from_u64(seed),
            seed,
            fits: 0,
            observations: Observations::default(),
            hedge,
        })
    }

    fn fit(&mut self, xs: &[Vec<f64>], ys: &[f64]) -> Result<S, OptimizerError> {
        self.fits += 1;
        let model = S::fit(&self.surrogate_config, xs, ys, self.seed.wrapping_add(self.fits))?;
        debug!(surrogate = S::NAME, n_train = ys.len(), "surrogate fitted");
        Ok(model)
    }

    /// Choose one point by maximizing the acquisition over random candidates.
    /// Returns the point, its unit coordinates, and for hedge the proposal
    /// of every portfolio member.
    fn propose(&mut self, model: &S, y_best: f64) -> (Point, Vec<f64>, Option<[Vec<f64>; 3]>) {
        let n_candidates = self.config.n_candidates.max(1);
        let mut candidates = Vec::with_capacity(n_candidates);
        for _ in 0..n_candidates {
            let point = self.transform.sample(&mut self.rng);
            // sampled points are always inside the space
            if let Ok(unit) = self.transform.to_unit(&point) {
                let posterior = model.predict(&unit);
                candidates.push((point, unit, posterior));
            }
        }

        let argmax = |acquisition: &Acquisition| -> usize {
            candidates
                .iter()
                .enumerate()
                .map(|(i, (_, _, (mean, std)))| (i, acquisition.score(*mean, *std, y_best)))
                .max_by(|a, b| a.1.total_cmp(&b.1))
                .map_or(0, |(i, _)| i)
        };

        match &self.hedge {
            Some(hedge) => {
                let picks = HEDGE_PORTFOLIO.map(|acq| argmax(&acq));
                let member = hedge.choose(&mut self.rng);
                let proposals = picks.map(|i| candidates[i].1.clone());
                let (point, unit, _) = candidates.swap_remove(picks[member]);
                (point, unit, Some(proposals))
            }
            None => {
                let chosen = argmax(&self.config.acquisition);
                let (point, unit, _) = candidates.swap_remove(chosen);
                (point, unit, None)
            }
        }
    }
}

impl<S: SurrogateModel> SurrogateOptimizer for BayesOptimizer<S> {
    fn ask(&mut self, n_points: usize) -> Result<Vec<Point>, OptimizerError> {
        if n_points == 0 {
            return Err(OptimizerError::InvalidBatchSize);
        }

        let mut xs = self.observations.units.clone();
        let mut ys = self.observations.sanitized_values();
        let mut points = Vec::with_capacity(n_points);

        for i in 0..n_points {
            if self.observations.len() + i < self.config.n_initial_points || self.observations.is_empty() {
                points.push(self.transform.sample(&mut self.rng));
                continue;
            }

            let model = self.fit(&xs, &ys)?;
            let y_best = ys.iter().copied().fold(f64::INFINITY, f64::min);
            let (point, unit, proposals) = self.propose(&model, y_best);

            if let (Some(hedge), Some(proposals)) = (self.hedge.as_mut(), proposals) {
                if i == 0 {
                    hedge.set_pending(proposals);
                }
            }

            // constant liar: pretend the proposal scored the best loss so far
            xs.push(unit);
            ys.push(y_best);
            points.push(point);
        }

        Ok(points)
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

        if self.hedge.is_some() && self.observations.len() >= self.config.n_initial_points {
            let xs = self.observations.units.clone();
            let ys = sanitize(&self.observations.values);
            let model = self.fit(&xs, &ys)?;
            if let Some(hedge) = self.hedge.as_mut() {
                hedge.update(|x| model.predict(x).0);
            }
        }

        Ok(self.observations.state())
    }

    fn state(&self) -> OptimizeState {
        self.observations.state()
    }

    fn name(&self) -> &str {
        S::NAME
    }
}
