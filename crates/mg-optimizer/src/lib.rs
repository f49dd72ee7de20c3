//! # mg-optimizer
//!
//! Ask/tell surrogate optimizers for ModelGym.
//!
//! Provides Gaussian-process and random-forest Bayesian optimizers, a random
//! search baseline, unit-cube transforms of search spaces, and the
//! [`OptimizerFactory`] the trainer uses to build one optimizer per model
//! space.

mod acquisition;
mod bayes;
mod factory;
mod forest;
mod gp;
mod optimizer;
mod random;
mod transform;

pub use acquisition::Acquisition;
pub use bayes::{BayesConfig, BayesOptimizer, SurrogateModel};
pub use factory::{ForestOptimizer, GpOptimizer, OptimizerFactory, OptimizerKind};
pub use forest::{ForestConfig, RandomForest};
pub use gp::{GaussianProcess, GpConfig};
pub use optimizer::{OptimizeState, Point, SurrogateOptimizer};
pub use random::RandomOptimizer;
pub use transform::SpaceTransform;
