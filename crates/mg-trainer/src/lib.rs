//! # mg-trainer
//!
//! Cross-validated hyperparameter optimization for ModelGym.
//!
//! Registers model spaces, runs a batched ask/evaluate/tell loop per space
//! on an owned evaluation scheduler, and keeps the best cross-validated
//! result found for each space.

mod config;
mod evaluator;
mod index;
mod registry;
mod remote;
mod scheduler;
mod status;
mod trainer;

pub use config::{
    TrainerConfig, ENV_BATCH_SIZE, ENV_CV_FOLDS, ENV_OPTIMIZER, ENV_OPT_EVALS, ENV_SEED, ENV_VERBOSE,
};
pub use evaluator::{crossval_fit_eval, CrossValEvaluator, EvalRequest, Evaluator};
pub use index::ParamIndex;
pub use registry::{process_model_spaces, ModelSpace, ModelSpaceInput, ModelSpaceRegistry};
pub use remote::{spawn_eval_worker, EvalTask, EvalTaskDescriptor, RemoteEvaluator, WorkerPoolConfig, WorkerStats};
pub use scheduler::{EvalScheduler, SchedulerConfig};
pub use status::{RunState, SpaceRunStatus, Trial};
pub use trainer::{BestResult, CrossValidation, OptimizeOptions, SurrogateTrainer};
