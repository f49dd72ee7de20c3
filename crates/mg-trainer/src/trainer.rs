//! The cross-validated optimization loop and its best-result record.

use mg_optimizer::{OptimizeState, OptimizerFactory, OptimizerKind};
use mg_types::{
    internal_error, validation_error, CvFold, EvaluationResult, Metric, MgResult, XycDataset,
};
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use crate::config::TrainerConfig;
use crate::evaluator::{CrossValEvaluator, EvalRequest, Evaluator};
use crate::index::ParamIndex;
use crate::registry::{process_model_spaces, ModelSpace, ModelSpaceInput, ModelSpaceRegistry};
use crate::scheduler::{EvalScheduler, SchedulerConfig};
use crate::status::{SpaceRunStatus, Trial};

/// Per-call loop settings.
#[derive(Debug, Clone)]
pub struct OptimizeOptions {
    /// Evaluations per model space.
    pub opt_evals: usize,
    /// Reported alongside the optimized metric, which is appended after them.
    pub metrics: Vec<Arc<dyn Metric>>,
    pub batch_size: usize,
    /// Log per-round progress at `info` instead of `debug`.
    pub verbose: bool,
}

impl Default for OptimizeOptions {
    fn default() -> Self {
        Self {
            opt_evals: 50,
            metrics: Vec::new(),
            batch_size: 1,
            verbose: false,
        }
    }
}

impl OptimizeOptions {
    pub fn with_opt_evals(mut self, n: usize) -> Self {
        self.opt_evals = n;
        self
    }

    pub fn with_metrics(mut self, metrics: Vec<Arc<dyn Metric>>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_batch_size(mut self, n: usize) -> Self {
        self.batch_size = n;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}

/// Where the cross-validation folds come from.
#[derive(Debug, Clone)]
pub enum CrossValidation {
    /// Split the dataset into `k` contiguous folds.
    Folds(usize),
    /// Use these folds as they are.
    Explicit(Vec<CvFold>),
}

/// Incumbent of one model space together with the space it belongs to.
#[derive(Debug, Clone, Serialize)]
pub struct BestResult {
    pub result: EvaluationResult,
    #[serde(serialize_with = "serialize_space")]
    pub model_space: Arc<ModelSpace>,
}

fn serialize_space<S: Serializer>(space: &Arc<ModelSpace>, serializer: S) -> Result<S::Ok, S::Error> {
    space.as_ref().serialize(serializer)
}

/// Hyperparameter optimizer over a registry of model spaces, driven by a
/// surrogate built per space from an [`OptimizerFactory`].
pub struct SurrogateTrainer {
    registry: ModelSpaceRegistry,
    factory: Arc<dyn OptimizerFactory>,
    evaluator: Arc<dyn Evaluator>,
    scheduler: EvalScheduler,
    seed: u64,
    best_results: BTreeMap<String, EvaluationResult>,
    ind2names: BTreeMap<String, ParamIndex>,
    history: BTreeMap<String, Vec<Trial>>,
    status: BTreeMap<String, SpaceRunStatus>,
}

impl SurrogateTrainer {
    /// Register `model_spaces` and start the evaluation scheduler.
    pub fn new(
        model_spaces: Vec<ModelSpaceInput>,
        factory: Arc<dyn OptimizerFactory>,
        scheduler: SchedulerConfig,
    ) -> MgResult<Self> {
        let registry = process_model_spaces(model_spaces)?;
        let mut scheduler = EvalScheduler::new(scheduler);
        scheduler.start()?;

        info!(
            "Created {} trainer over {} model spaces: {:?}",
            factory.name(),
            registry.len(),
            registry.names()
        );

        Ok(Self {
            registry,
            factory,
            evaluator: Arc::new(CrossValEvaluator::new()),
            scheduler,
            seed: 1,
            best_results: BTreeMap::new(),
            ind2names: BTreeMap::new(),
            history: BTreeMap::new(),
            status: BTreeMap::new(),
        })
    }

    /// Gaussian-process surrogate with default settings.
    pub fn gp(model_spaces: Vec<ModelSpaceInput>) -> MgResult<Self> {
        Self::new(model_spaces, Arc::new(OptimizerKind::gp()), SchedulerConfig::default())
    }

    /// Random-forest surrogate with default settings.
    pub fn forest(model_spaces: Vec<ModelSpaceInput>) -> MgResult<Self> {
        Self::new(model_spaces, Arc::new(OptimizerKind::forest()), SchedulerConfig::default())
    }

    pub fn from_config(model_spaces: Vec<ModelSpaceInput>, config: &TrainerConfig) -> MgResult<Self> {
        config.validate()?;
        Ok(Self::new(
            model_spaces,
            Arc::new(config.optimizer.clone()),
            config.scheduler.clone(),
        )?
        .with_seed(config.seed))
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_evaluator(mut self, evaluator: Arc<dyn Evaluator>) -> Self {
        self.evaluator = evaluator;
        self
    }

    pub fn registry(&self) -> &ModelSpaceRegistry {
        &self.registry
    }

    /// Parameter-index map of `space`, built by the latest run.
    pub fn param_index(&self, space: &str) -> Option<&ParamIndex> {
        self.ind2names.get(space)
    }

    /// Trials of `space` in evaluation order.
    pub fn history(&self, space: &str) -> &[Trial] {
        self.history.get(space).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn status(&self, space: &str) -> Option<&SpaceRunStatus> {
        self.status.get(space)
    }

    /// Runtime handle of the scheduler, e.g. for [`crate::spawn_eval_worker`].
    pub fn scheduler_handle(&self) -> MgResult<Handle> {
        self.scheduler.handle()
    }

    /// Stop the scheduler. Later runs fail until a new trainer is built.
    pub fn shutdown(&mut self) {
        self.scheduler.shutdown();
    }

    /// Optimize every registered space in registration order and return each
    /// space's final optimizer state.
    ///
    /// `opt_metric` is appended to `options.metrics` and drives the loss.
    /// Blocks the calling thread; do not call from inside a tokio runtime.
    pub fn crossval_optimize_params(
        &mut self,
        opt_metric: Arc<dyn Metric>,
        dataset: Option<&XycDataset>,
        cv: CrossValidation,
        options: OptimizeOptions,
    ) -> MgResult<BTreeMap<String, OptimizeState>> {
        if options.batch_size == 0 {
            return Err(validation_error!("batch_size must be at least 1"));
        }

        let folds = match cv {
            CrossValidation::Folds(k) => dataset
                .ok_or_else(|| validation_error!("a dataset is required to split into {k} folds"))?
                .cv_split(k)?,
            CrossValidation::Explicit(folds) if folds.is_empty() => {
                return Err(validation_error!("explicit cross-validation needs at least one fold"));
            }
            CrossValidation::Explicit(folds) => folds,
        };
        let folds = Arc::new(folds);

        let mut metrics = options.metrics.clone();
        metrics.push(opt_metric);
        let metrics = Arc::new(metrics);

        self.ind2names = self
            .registry
            .iter()
            .map(|space| (space.name.clone(), ParamIndex::from_space(&space.space)))
            .collect();

        let spaces: Vec<Arc<ModelSpace>> = self.registry.iter().cloned().collect();
        let mut states = BTreeMap::new();

        for space in spaces {
            let mut status = SpaceRunStatus::new();
            status.mark_running();
            self.status.insert(space.name.clone(), status);
            self.history.insert(space.name.clone(), Vec::new());

            match self.optimize_space(&space, &folds, &metrics, &options) {
                Ok(state) => {
                    if let Some(status) = self.status.get_mut(&space.name) {
                        status.mark_completed();
                    }
                    states.insert(space.name.clone(), state);
                }
                Err(e) => {
                    warn!("Optimization of {} aborted: {}", space.name, e);
                    if let Some(status) = self.status.get_mut(&space.name) {
                        status.mark_failed(e.to_string());
                    }
                    return Err(e);
                }
            }
        }

        Ok(states)
    }

    fn optimize_space(
        &mut self,
        space: &Arc<ModelSpace>,
        folds: &Arc<Vec<CvFold>>,
        metrics: &Arc<Vec<Arc<dyn Metric>>>,
        options: &OptimizeOptions,
    ) -> MgResult<OptimizeState> {
        let index = self
            .ind2names
            .get(&space.name)
            .cloned()
            .ok_or_else(|| internal_error!("no parameter index for {}", space.name))?;

        let mut optimizer = self.factory.build(&space.space, self.seed)?;
        let rounds = options.opt_evals.div_ceil(options.batch_size);
        let mut remaining = options.opt_evals;
        let mut state = optimizer.state();
        let mut round_best: Option<EvaluationResult> = None;

        if options.verbose {
            info!("Optimizing {} with {} over {} rounds", space.name, optimizer.name(), rounds);
        } else {
            debug!("Optimizing {} with {} over {} rounds", space.name, optimizer.name(), rounds);
        }

        for round in 0..rounds {
            let n_points = options.batch_size.min(remaining);
            let points = optimizer.ask(n_points)?;

            let requests = points
                .iter()
                .map(|point| {
                    Ok(EvalRequest {
                        model_type: Arc::clone(&space.model_type),
                        params: index.to_params(point)?,
                        folds: Arc::clone(folds),
                        metrics: Arc::clone(metrics),
                        verbose: options.verbose,
                    })
                })
                .collect::<MgResult<Vec<_>>>()?;

            let results = self.scheduler.run_batch(Arc::clone(&self.evaluator), requests)?;
            let losses: Vec<f64> = results.iter().map(|r| r.loss).collect();
            state = optimizer.tell(points, losses)?;

            for result in results.iter().filter(|r| r.is_ok() && r.loss.is_finite()) {
                if round_best.as_ref().map_or(true, |best| result.loss < best.loss) {
                    round_best = Some(result.clone());
                }
            }
            self.record_round(&space.name, round, &results);
            remaining -= n_points;

            if options.verbose {
                info!(
                    "{} round {}/{}: best loss {:.5} after {} evaluations",
                    space.name,
                    round + 1,
                    rounds,
                    state.best_value,
                    state.n_observations
                );
            } else {
                debug!(
                    "{} round {}/{}: best loss {:.5} after {} evaluations",
                    space.name,
                    round + 1,
                    rounds,
                    state.best_value,
                    state.n_observations
                );
            }
        }

        self.update_incumbent(space, &state, round_best, folds, metrics, options.verbose)?;
        Ok(state)
    }

    fn record_round(&mut self, space: &str, round: usize, results: &[EvaluationResult]) {
        let trials = self.history.entry(space.to_string()).or_default();
        for result in results {
            trials.push(Trial::from_result(trials.len(), round, result));
        }
        if let Some(status) = self.status.get_mut(space) {
            status.record_round(results);
        }
    }

    /// Re-evaluate the optimizer's best point and keep it if it beats the
    /// stored incumbent. When the re-evaluation fails, the best `Ok` result
    /// seen during the rounds stands in for it.
    fn update_incumbent(
        &mut self,
        space: &Arc<ModelSpace>,
        state: &OptimizeState,
        round_best: Option<EvaluationResult>,
        folds: &Arc<Vec<CvFold>>,
        metrics: &Arc<Vec<Arc<dyn Metric>>>,
        verbose: bool,
    ) -> MgResult<()> {
        let Some(best_point) = state.best_point.as_ref() else {
            debug!("{} has no finite loss, incumbent unchanged", space.name);
            return Ok(());
        };
        if !state.best_value.is_finite() {
            return Ok(());
        }

        let incumbent_loss = self.best_results.get(&space.name).map(|r| r.loss);
        let beats_incumbent = |loss: f64| incumbent_loss.map_or(true, |current| loss < current);
        if !beats_incumbent(state.best_value) {
            return Ok(());
        }

        let params = self
            .ind2names
            .get(&space.name)
            .ok_or_else(|| internal_error!("no parameter index for {}", space.name))?
            .to_params(best_point)?;
        let request = EvalRequest {
            model_type: Arc::clone(&space.model_type),
            params,
            folds: Arc::clone(folds),
            metrics: Arc::clone(metrics),
            verbose,
        };
        let fresh = self
            .scheduler
            .run_batch(Arc::clone(&self.evaluator), vec![request])?
            .pop();

        let candidate = match fresh {
            Some(fresh) if fresh.is_ok() => fresh,
            fresh => {
                if let Some(failed) = fresh {
                    warn!(
                        "Re-evaluation of the best {} point failed: {}",
                        space.name,
                        failed.error.as_deref().unwrap_or("unknown error")
                    );
                }
                let Some(best) = round_best else {
                    return Ok(());
                };
                best
            }
        };

        if beats_incumbent(candidate.loss) {
            info!(
                "New best for {}: loss {:.5} with {:?}",
                space.name, candidate.loss, candidate.params
            );
            self.best_results.insert(space.name.clone(), candidate);
        } else {
            debug!(
                "Best of {} did not improve on the incumbent (loss {})",
                space.name, candidate.loss
            );
        }
        Ok(())
    }

    /// Best result per model space. Spaces without an incumbent are omitted.
    pub fn get_best_results(&self) -> BTreeMap<String, BestResult> {
        self.best_results
            .iter()
            .filter_map(|(name, result)| {
                self.registry.get(name).map(|space| {
                    (
                        name.clone(),
                        BestResult {
                            result: result.clone(),
                            model_space: Arc::clone(space),
                        },
                    )
                })
            })
            .collect()
    }

    /// [`Self::get_best_results`] as JSON.
    pub fn best_results_json(&self) -> MgResult<serde_json::Value> {
        Ok(serde_json::to_value(self.get_best_results())?)
    }
}
