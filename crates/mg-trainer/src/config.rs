//! Trainer configuration: defaults, JSON files and environment overrides.

use mg_optimizer::OptimizerKind;
use mg_types::{config_error, validation_error, Metric, MgResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

use crate::scheduler::SchedulerConfig;
use crate::trainer::OptimizeOptions;

pub const ENV_OPT_EVALS: &str = "MODELGYM_OPT_EVALS";
pub const ENV_BATCH_SIZE: &str = "MODELGYM_BATCH_SIZE";
pub const ENV_CV_FOLDS: &str = "MODELGYM_CV_FOLDS";
pub const ENV_SEED: &str = "MODELGYM_SEED";
pub const ENV_OPTIMIZER: &str = "MODELGYM_OPTIMIZER";
pub const ENV_VERBOSE: &str = "MODELGYM_VERBOSE";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
    /// Total evaluations per model space.
    pub opt_evals: usize,
    /// Candidates asked for and evaluated concurrently per round.
    pub batch_size: usize,
    pub cv_folds: usize,
    /// Seed handed to every optimizer.
    pub seed: u64,
    pub verbose: bool,
    pub optimizer: OptimizerKind,
    pub scheduler: SchedulerConfig,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            opt_evals: 50,
            batch_size: 1,
            cv_folds: 3,
            seed: 1,
            verbose: false,
            optimizer: OptimizerKind::gp(),
            scheduler: SchedulerConfig::default(),
        }
    }
}

impl TrainerConfig {
    pub fn with_opt_evals(mut self, n: usize) -> Self {
        self.opt_evals = n;
        self
    }

    pub fn with_batch_size(mut self, n: usize) -> Self {
        self.batch_size = n;
        self
    }

    pub fn with_cv_folds(mut self, n: usize) -> Self {
        self.cv_folds = n;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_optimizer(mut self, optimizer: OptimizerKind) -> Self {
        self.optimizer = optimizer;
        self
    }

    pub fn with_scheduler(mut self, scheduler: SchedulerConfig) -> Self {
        self.scheduler = scheduler;
        self
    }

    /// Load from a JSON file; missing fields keep their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> MgResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Apply `MODELGYM_*` overrides from the process environment.
    pub fn with_env_overrides(self) -> MgResult<Self> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply `MODELGYM_*` overrides read through `lookup`.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> MgResult<Self> {
        if let Some(v) = lookup(ENV_OPT_EVALS) {
            self.opt_evals = parse(ENV_OPT_EVALS, &v)?;
        }
        if let Some(v) = lookup(ENV_BATCH_SIZE) {
            self.batch_size = parse(ENV_BATCH_SIZE, &v)?;
        }
        if let Some(v) = lookup(ENV_CV_FOLDS) {
            self.cv_folds = parse(ENV_CV_FOLDS, &v)?;
        }
        if let Some(v) = lookup(ENV_SEED) {
            self.seed = parse(ENV_SEED, &v)?;
        }
        if let Some(v) = lookup(ENV_OPTIMIZER) {
            self.optimizer = OptimizerKind::from_name(v.trim())
                .ok_or_else(|| config_error!("{ENV_OPTIMIZER}: unknown optimizer {v:?}"))?;
        }
        if let Some(v) = lookup(ENV_VERBOSE) {
            self.verbose = match v.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" | "" => false,
                _ => return Err(config_error!("{ENV_VERBOSE}: expected a boolean, got {v:?}")),
            };
        }
        Ok(self)
    }

    pub fn validate(&self) -> MgResult<()> {
        if self.batch_size == 0 {
            return Err(validation_error!("batch_size must be at least 1"));
        }
        if self.cv_folds < 2 {
            return Err(validation_error!("cv_folds must be at least 2, got {}", self.cv_folds));
        }
        if self.scheduler.worker_threads == 0 {
            return Err(validation_error!("scheduler.worker_threads must be at least 1"));
        }
        Ok(())
    }

    /// Loop options for this configuration with extra reported `metrics`.
    pub fn optimize_options(&self, metrics: Vec<Arc<dyn Metric>>) -> OptimizeOptions {
        OptimizeOptions {
            opt_evals: self.opt_evals,
            metrics,
            batch_size: self.batch_size,
            verbose: self.verbose,
        }
    }
}

fn parse<T: std::str::FromStr>(key: &str, value: &str) -> MgResult<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| config_error!("{key}: cannot parse {value:?}: {e}"))
}
