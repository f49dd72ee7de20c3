//! Channel-backed evaluation: a client [`RemoteEvaluator`] submits
//! [`EvalTask`]s to a worker task that serves them with an inner evaluator.
//!
//! Each task carries a serializable [`EvalTaskDescriptor`] so a worker on the
//! far side of a real transport could be substituted without changing the
//! client.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mg_types::{EvaluationError, EvaluationResult, MgResult, Params};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::evaluator::{EvalRequest, Evaluator};

/// Wire-level description of one evaluation task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalTaskDescriptor {
    pub task_id: Uuid,
    /// Name of the model type to build.
    pub model_type: String,
    pub params: Params,
    pub n_folds: usize,
    /// Metric names in evaluation order; the last one is optimized.
    pub metrics: Vec<String>,
    pub submitted_at: DateTime<Utc>,
}

impl EvalTaskDescriptor {
    pub fn from_request(request: &EvalRequest) -> Self {
        Self {
            task_id: Uuid::new_v4(),
            model_type: request.model_type.name().to_string(),
            params: request.params.clone(),
            n_folds: request.folds.len(),
            metrics: request.metrics.iter().map(|m| m.name().to_string()).collect(),
            submitted_at: Utc::now(),
        }
    }
}

/// A submitted task and the channel its result goes back on.
pub struct EvalTask {
    pub descriptor: EvalTaskDescriptor,
    pub request: EvalRequest,
    reply: oneshot::Sender<MgResult<EvaluationResult>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerPoolConfig {
    /// Tasks the worker evaluates at once.
    pub max_concurrent_tasks: usize,
    /// Submitted tasks buffered before senders wait.
    pub queue_capacity: usize,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: 4,
            queue_capacity: 64,
        }
    }
}

/// Counters kept by a worker.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerStats {
    pub tasks_received: usize,
    pub tasks_completed: usize,
    pub tasks_failed: usize,
}

/// Client end of an evaluation worker.
#[derive(Clone)]
pub struct RemoteEvaluator {
    sender: mpsc::Sender<EvalTask>,
    stats: Arc<Mutex<WorkerStats>>,
}

impl RemoteEvaluator {
    pub fn stats(&self) -> WorkerStats {
        self.stats.lock().clone()
    }
}

#[async_trait]
impl Evaluator for RemoteEvaluator {
    async fn evaluate(&self, request: EvalRequest) -> MgResult<EvaluationResult> {
        let descriptor = EvalTaskDescriptor::from_request(&request);
        let task_id = descriptor.task_id;
        let (reply, response) = oneshot::channel();

        self.sender
            .send(EvalTask {
                descriptor,
                request,
                reply,
            })
            .await
            .map_err(|_| EvaluationError::Dispatch {
                message: format!("evaluation worker is gone, task {task_id} not sent"),
            })?;

        response.await.map_err(|_| EvaluationError::Dispatch {
            message: format!("evaluation worker dropped task {task_id}"),
        })?
    }

    fn name(&self) -> &str {
        "remote"
    }
}

/// Start a worker on `handle` that serves tasks with `inner`, and return the
/// client for it. The worker stops once every client is dropped.
pub fn spawn_eval_worker(
    handle: &Handle,
    inner: Arc<dyn Evaluator>,
    config: WorkerPoolConfig,
) -> (RemoteEvaluator, JoinHandle<()>) {
    let (sender, mut receiver) = mpsc::channel::<EvalTask>(config.queue_capacity.max(1));
    let stats = Arc::new(Mutex::new(WorkerStats::default()));
    let permits = Arc::new(Semaphore::new(config.max_concurrent_tasks.max(1)));

    let worker_stats = Arc::clone(&stats);
    let worker = handle.spawn(async move {
        while let Some(task) = receiver.recv().await {
            let Ok(permit) = Arc::clone(&permits).acquire_owned().await else {
                break;
            };
            worker_stats.lock().tasks_received += 1;

            let inner = Arc::clone(&inner);
            let stats = Arc::clone(&worker_stats);
            tokio::spawn(async move {
                let EvalTask {
                    descriptor,
                    request,
                    reply,
                } = task;
                debug!(
                    "Serving task {} for {} with {} folds",
                    descriptor.task_id, descriptor.model_type, descriptor.n_folds
                );

                let result = inner.evaluate(request).await;
                {
                    let mut stats = stats.lock();
                    match &result {
                        Ok(r) if r.is_ok() => stats.tasks_completed += 1,
                        _ => stats.tasks_failed += 1,
                    }
                }
                if reply.send(result).is_err() {
                    warn!("Requester of task {} went away", descriptor.task_id);
                }
                drop(permit);
            });
        }
        debug!("Evaluation worker channel closed");
    });

    (RemoteEvaluator { sender, stats }, worker)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mg_types::{Metric, Model, ModelType, ParameterValue, SearchSpace, ZeroOneLoss};
    use std::time::Duration;

    #[derive(Debug)]
    struct Unused;

    impl ModelType for Unused {
        fn name(&self) -> &str {
            "unused"
        }

        fn default_space(&self) -> SearchSpace {
            SearchSpace::new().add_int("k", 1, 3)
        }

        fn build(&self, _params: &Params) -> Result<Box<dyn Model>, EvaluationError> {
            unreachable!("remote tests never build models")
        }
    }

    /// Loss equals `k`; `k == 0` fails.
    struct ByK;

    #[async_trait]
    impl Evaluator for ByK {
        async fn evaluate(&self, request: EvalRequest) -> MgResult<EvaluationResult> {
            tokio::time::sleep(Duration::from_millis(5)).await;
            match request.params["k"].as_i64() {
                Some(0) | None => Ok(EvaluationResult::failed(request.params, "k must be positive")),
                Some(k) => Ok(EvaluationResult::from_folds(request.params, &[k as f64], Vec::new())),
            }
        }

        fn name(&self) -> &str {
            "by_k"
        }
    }

    fn request(k: i64) -> EvalRequest {
        let metrics: Vec<Arc<dyn Metric>> = vec![Arc::new(ZeroOneLoss)];
        EvalRequest {
            model_type: Arc::new(Unused),
            params: Params::from([("k".to_string(), ParameterValue::Int(k))]),
            folds: Arc::new(Vec::new()),
            metrics: Arc::new(metrics),
            verbose: false,
        }
    }

    #[tokio::test]
    async fn test_worker_serves_tasks_and_counts_them() {
        let (client, _worker) = spawn_eval_worker(&Handle::current(), Arc::new(ByK), WorkerPoolConfig::default());

        let (a, b, c) = tokio::join!(
            client.evaluate(request(2)),
            client.evaluate(request(3)),
            client.evaluate(request(0))
        );
        assert_eq!(a.unwrap().loss, 2.0);
        assert_eq!(b.unwrap().loss, 3.0);
        assert!(!c.unwrap().is_ok());

        let stats = client.stats();
        assert_eq!(stats.tasks_received, 3);
        assert_eq!(stats.tasks_completed, 2);
        assert_eq!(stats.tasks_failed, 1);
    }

    #[tokio::test]
    async fn test_stopped_worker_is_a_dispatch_error() {
        let (client, worker) = spawn_eval_worker(&Handle::current(), Arc::new(ByK), WorkerPoolConfig::default());
        worker.abort();
        let _ = worker.await;

        let err = client.evaluate(request(1)).await.unwrap_err();
        assert!(matches!(
            err,
            mg_types::MgError::Evaluation(EvaluationError::Dispatch { .. })
        ));
    }

    #[test]
    fn test_descriptor_describes_the_request() {
        let descriptor = EvalTaskDescriptor::from_request(&request(2));
        assert_eq!(descriptor.model_type, "unused");
        assert_eq!(descriptor.metrics, vec!["zero_one_loss"]);
        assert_eq!(descriptor.n_folds, 0);

        let json = serde_json::to_string(&descriptor).unwrap();
        let back: EvalTaskDescriptor = serde_json::from_str(&json).unwrap();
        assert_eq!(back, descriptor);
    }
}
