//! Owned async runtime that evaluates batches of candidates concurrently.

use mg_types::{internal_error, EvaluationError, EvaluationResult, MgResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::evaluator::{EvalRequest, Evaluator};

fn default_parallelism() -> usize {
    std::thread::available_parallelism().map_or(4, |n| n.get())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Runtime worker threads.
    pub worker_threads: usize,
    /// Upper bound on evaluations in flight at once.
    pub max_concurrent_evaluations: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        let n = default_parallelism();
        Self {
            worker_threads: n,
            max_concurrent_evaluations: n,
        }
    }
}

impl SchedulerConfig {
    pub fn with_worker_threads(mut self, n: usize) -> Self {
        self.worker_threads = n;
        self
    }

    pub fn with_max_concurrent_evaluations(mut self, n: usize) -> Self {
        self.max_concurrent_evaluations = n;
        self
    }
}

/// Evaluation context with an explicit `start`/`shutdown` lifecycle.
///
/// [`EvalScheduler::run_batch`] blocks the calling thread until the whole
/// batch is done, so it must not be called from inside another tokio runtime.
pub struct EvalScheduler {
    config: SchedulerConfig,
    runtime: Option<Runtime>,
    permits: Arc<Semaphore>,
}

impl EvalScheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_concurrent_evaluations.max(1)));
        Self {
            config,
            runtime: None,
            permits,
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Build the runtime. Starting a running scheduler is a no-op.
    pub fn start(&mut self) -> MgResult<()> {
        if self.runtime.is_some() {
            return Ok(());
        }
        if self.config.worker_threads == 0 {
            return Err(mg_types::config_error!("scheduler needs at least one worker thread"));
        }

        let runtime = Builder::new_multi_thread()
            .worker_threads(self.config.worker_threads)
            .thread_name("mg-eval")
            .enable_all()
            .build()?;
        debug!(
            "Evaluation scheduler started with {} workers, {} concurrent evaluations",
            self.config.worker_threads, self.config.max_concurrent_evaluations
        );
        self.runtime = Some(runtime);
        Ok(())
    }

    /// Stop the runtime without waiting for in-flight work.
    pub fn shutdown(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
            debug!("Evaluation scheduler stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.runtime.is_some()
    }

    /// Handle for spawning long-lived tasks (such as evaluation workers).
    pub fn handle(&self) -> MgResult<Handle> {
        self.runtime
            .as_ref()
            .map(|rt| rt.handle().clone())
            .ok_or_else(|| internal_error!("evaluation scheduler is not running"))
    }

    /// Evaluate every request concurrently and return the results in request
    /// order. Failed or panicking evaluations come back as failed results.
    pub fn run_batch(
        &self,
        evaluator: Arc<dyn Evaluator>,
        requests: Vec<EvalRequest>,
    ) -> MgResult<Vec<EvaluationResult>> {
        let runtime = self
            .runtime
            .as_ref()
            .ok_or_else(|| internal_error!("evaluation scheduler is not running"))?;

        let permits = Arc::clone(&self.permits);
        let results = runtime.block_on(async move {
            let handles: Vec<_> = requests
                .into_iter()
                .map(|request| {
                    let evaluator = Arc::clone(&evaluator);
                    let permits = Arc::clone(&permits);
                    let params = request.params.clone();
                    let handle = tokio::spawn(async move {
                        let _permit = permits.acquire_owned().await.ok();
                        evaluator.evaluate(request).await
                    });
                    (params, handle)
                })
                .collect();

            let mut results = Vec::with_capacity(handles.len());
            for (params, handle) in handles {
                let result = match handle.await {
                    Ok(Ok(result)) => result,
                    Ok(Err(e)) => {
                        warn!("Evaluation failed for {:?}: {}", params, e);
                        EvaluationResult::failed(params, e.to_string())
                    }
                    Err(e) => {
                        let error = EvaluationError::TaskPanicked { message: e.to_string() };
                        warn!("Evaluation task for {:?} did not finish: {}", params, error);
                        EvaluationResult::failed(params, error.to_string())
                    }
                };
                results.push(result);
            }
            results
        });

        Ok(results)
    }
}

impl Drop for EvalScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}
