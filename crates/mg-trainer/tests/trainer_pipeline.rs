use async_trait::async_trait;
use mg_optimizer::{
    BayesConfig, OptimizeState, OptimizerFactory, OptimizerKind, Point, SurrogateOptimizer,
};
use mg_trainer::{
    spawn_eval_worker, CrossValEvaluator, CrossValidation, EvalRequest, Evaluator, ModelSpace,
    ModelSpaceInput, OptimizeOptions, RunState, SchedulerConfig, SurrogateTrainer, WorkerPoolConfig,
};
use mg_types::{
    make_classification, param_i64, Accuracy, EvalStatus, EvaluationError, EvaluationResult, Metric, MgError,
    MgResult, Model, ModelType, OptimizerError, ParameterValue, Params, SearchSpace, XycDataset, ZeroOneLoss,
};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// Nearest-centroid classifier over the first `max_depth` features, named
/// like the tree ensembles it stands in for.
#[derive(Debug)]
struct FakeEnsemble(&'static str);

struct CentroidModel {
    n_features: usize,
    centroids: Vec<(f64, Vec<f64>)>,
}

impl ModelType for FakeEnsemble {
    fn name(&self) -> &str {
        self.0
    }

    fn default_space(&self) -> SearchSpace {
        SearchSpace::new()
            .add_int("n_estimators", 10, 100)
            .add_int("max_depth", 1, 10)
    }

    fn build(&self, params: &Params) -> Result<Box<dyn Model>, EvaluationError> {
        param_i64(params, "n_estimators", 10)?;
        let max_depth = param_i64(params, "max_depth", 3)?;
        Ok(Box::new(CentroidModel {
            n_features: max_depth.max(1) as usize,
            centroids: Vec::new(),
        }))
    }
}

impl Model for CentroidModel {
    fn fit(&mut self, train: &XycDataset) -> Result<(), EvaluationError> {
        let d = self.n_features.min(train.n_features());
        let mut sums: BTreeMap<i64, (usize, Vec<f64>)> = BTreeMap::new();
        for (row, &y) in train.x.iter().zip(&train.y) {
            let entry = sums.entry(y as i64).or_insert_with(|| (0, vec![0.0; d]));
            entry.0 += 1;
            for (s, x) in entry.1.iter_mut().zip(row) {
                *s += x;
            }
        }
        self.centroids = sums
            .into_iter()
            .map(|(label, (n, sum))| (label as f64, sum.into_iter().map(|s| s / n as f64).collect()))
            .collect();
        Ok(())
    }

    fn predict(&self, x: &[Vec<f64>]) -> Result<Vec<f64>, EvaluationError> {
        Ok(x.iter()
            .map(|row| {
                self.centroids
                    .iter()
                    .map(|(label, c)| {
                        let d: f64 = c.iter().zip(row).map(|(a, b)| (a - b).powi(2)).sum();
                        (*label, d)
                    })
                    .min_by(|a, b| a.1.total_cmp(&b.1))
                    .map_or(0.0, |(label, _)| label)
            })
            .collect())
    }
}

/// Model type whose models can never be built or fitted.
#[derive(Debug)]
struct Broken {
    name: &'static str,
    panic: bool,
}

impl ModelType for Broken {
    fn name(&self) -> &str {
        self.name
    }

    fn default_space(&self) -> SearchSpace {
        SearchSpace::new().add_float("alpha", 0.0, 1.0)
    }

    fn build(&self, _params: &Params) -> Result<Box<dyn Model>, EvaluationError> {
        if self.panic {
            panic!("{} cannot be constructed", self.name);
        }
        Err(EvaluationError::FitFailed {
            model: self.name.to_string(),
            message: "always fails".to_string(),
        })
    }
}

fn xgb() -> ModelSpaceInput {
    ModelSpaceInput::Bare(Arc::new(FakeEnsemble("XGBClassifier")))
}

fn rf() -> ModelSpaceInput {
    ModelSpaceInput::Bare(Arc::new(FakeEnsemble("RFClassifier")))
}

fn dataset() -> XycDataset {
    make_classification(100, 4, 7).unwrap()
}

fn scheduler() -> SchedulerConfig {
    SchedulerConfig::default().with_worker_threads(2)
}

fn options(opt_evals: usize, batch_size: usize) -> OptimizeOptions {
    let metrics: Vec<Arc<dyn Metric>> = vec![Arc::new(Accuracy)];
    OptimizeOptions::default()
        .with_opt_evals(opt_evals)
        .with_batch_size(batch_size)
        .with_metrics(metrics)
}

fn run(trainer: &mut SurrogateTrainer, opt_evals: usize, batch_size: usize) -> MgResult<BTreeMap<String, OptimizeState>> {
    let data = dataset();
    trainer.crossval_optimize_params(
        Arc::new(ZeroOneLoss),
        Some(&data),
        CrossValidation::Folds(3),
        options(opt_evals, batch_size),
    )
}

// ---------------------------------------------------------------------------
// End to end
// ---------------------------------------------------------------------------

#[test]
fn test_two_spaces_end_to_end() {
    let mut trainer = SurrogateTrainer::gp(vec![xgb(), rf()]).unwrap();
    let states = run(&mut trainer, 6, 2).unwrap();
    assert_eq!(states.len(), 2);

    for name in ["XGBClassifier", "RFClassifier"] {
        assert_eq!(states[name].n_observations, 6);

        let rounds: Vec<usize> = trainer.history(name).iter().map(|t| t.round).collect();
        assert_eq!(rounds, vec![0, 0, 1, 1, 2, 2]);
        let numbers: Vec<usize> = trainer.history(name).iter().map(|t| t.trial_number).collect();
        assert_eq!(numbers, (0..6).collect::<Vec<_>>());

        let status = trainer.status(name).unwrap();
        assert_eq!(status.state, RunState::Completed);
        assert_eq!(status.rounds_completed, 3);
        assert_eq!(status.evaluations_completed, 6);
    }

    let best = trainer.get_best_results();
    assert_eq!(best.keys().collect::<Vec<_>>(), vec!["RFClassifier", "XGBClassifier"]);
    for (name, entry) in &best {
        let result = &entry.result;
        assert_eq!(result.status, EvalStatus::Ok);
        assert!((0.0..=1.0).contains(&result.loss), "{name} loss {}", result.loss);
        assert_eq!(result.metric_cv_results.len(), 3);
        for fold in &result.metric_cv_results {
            assert!(fold.contains_key("accuracy"));
            assert!(fold.contains_key("zero_one_loss"));
        }
        assert_eq!(
            result.params.keys().collect::<Vec<_>>(),
            vec!["max_depth", "n_estimators"]
        );
        assert_eq!(&entry.model_space.name, name);
        assert!(result.loss >= states[name.as_str()].best_value - 1e-12);
    }

    let json = trainer.best_results_json().unwrap();
    assert_eq!(json["XGBClassifier"]["model_space"]["model_type"], "XGBClassifier");
    assert_eq!(json["RFClassifier"]["result"]["status"], "ok");
    trainer.shutdown();
}

#[test]
fn test_explicit_folds_are_used_as_given() {
    let mut trainer = SurrogateTrainer::forest(vec![xgb()]).unwrap();
    let folds = dataset().cv_split_shuffled(4, 3).unwrap();
    trainer
        .crossval_optimize_params(
            Arc::new(ZeroOneLoss),
            None,
            CrossValidation::Explicit(folds),
            options(3, 3),
        )
        .unwrap();

    let best = trainer.get_best_results();
    assert_eq!(best["XGBClassifier"].result.metric_cv_results.len(), 4);
}

#[test]
fn test_explicit_search_space_drives_parameter_names() {
    let custom = ModelSpace::new(
        Arc::new(FakeEnsemble("XGBClassifier")),
        SearchSpace::new().add_int("max_depth", 1, 2),
    );
    let mut trainer = SurrogateTrainer::gp(vec![custom.into()]).unwrap();
    run(&mut trainer, 2, 1).unwrap();

    assert_eq!(trainer.param_index("XGBClassifier").unwrap().names(), ["max_depth"]);
    let best = trainer.get_best_results();
    let params = &best["XGBClassifier"].result.params;
    assert_eq!(params.keys().collect::<Vec<_>>(), vec!["max_depth"]);
}

// ---------------------------------------------------------------------------
// Failures
// ---------------------------------------------------------------------------

#[test]
fn test_failing_candidates_never_become_incumbents() {
    let kind = OptimizerKind::forest().with_bayes(BayesConfig::default().with_initial_points(2).with_candidates(50));
    let mut trainer = SurrogateTrainer::new(
        vec![
            ModelSpaceInput::Bare(Arc::new(Broken { name: "Erroring", panic: false })),
            ModelSpaceInput::Bare(Arc::new(Broken { name: "Panicking", panic: true })),
        ],
        Arc::new(kind),
        scheduler(),
    )
    .unwrap();

    let states = run(&mut trainer, 4, 2).unwrap();

    for name in ["Erroring", "Panicking"] {
        assert!(states[name].best_point.is_none());
        assert_eq!(states[name].best_value, f64::INFINITY);
        assert_eq!(states[name].n_observations, 4);

        let history = trainer.history(name);
        assert_eq!(history.len(), 4);
        assert!(history.iter().all(|t| t.status == EvalStatus::Fail && t.loss.is_infinite()));
        assert!(history.iter().all(|t| t.error.is_some()));

        let status = trainer.status(name).unwrap();
        assert_eq!(status.state, RunState::Completed);
        assert_eq!(status.evaluations_failed, 4);
        assert_eq!(status.best_loss, None);
    }
    assert!(trainer.get_best_results().is_empty());
}

/// Builds random search, except for spaces with a dimension named `broken`.
struct PickyFactory;

impl OptimizerFactory for PickyFactory {
    fn build(&self, space: &SearchSpace, seed: u64) -> Result<Box<dyn SurrogateOptimizer>, OptimizerError> {
        if space.names().iter().any(|n| n == "broken") {
            return Err(OptimizerError::Surrogate {
                message: "refusing to model this space".to_string(),
            });
        }
        OptimizerKind::Random.build(space, seed)
    }

    fn name(&self) -> &str {
        "picky"
    }
}

#[test]
fn test_optimizer_errors_abort_but_keep_completed_incumbents() {
    let bad = ModelSpace::new(
        Arc::new(FakeEnsemble("Unmodelable")),
        SearchSpace::new().add_int("broken", 1, 3),
    );
    let mut trainer = SurrogateTrainer::new(vec![xgb(), bad.into()], Arc::new(PickyFactory), scheduler()).unwrap();

    let err = run(&mut trainer, 2, 1).unwrap_err();
    assert!(matches!(err, MgError::Optimizer(OptimizerError::Surrogate { .. })));

    assert_eq!(trainer.status("XGBClassifier").unwrap().state, RunState::Completed);
    assert_eq!(trainer.status("Unmodelable").unwrap().state, RunState::Failed);
    let best = trainer.get_best_results();
    assert!(best.contains_key("XGBClassifier"));
    assert!(!best.contains_key("Unmodelable"));
}

#[test]
fn test_duplicate_default_names_are_rejected() {
    let err = SurrogateTrainer::gp(vec![xgb(), rf(), xgb()]).err();
    assert!(matches!(err, Some(MgError::DuplicateName { ref name }) if name == "XGBClassifier"));
}

// ---------------------------------------------------------------------------
// Incumbent record
// ---------------------------------------------------------------------------

#[test]
fn test_best_results_are_idempotent_and_never_regress() {
    let mut trainer = SurrogateTrainer::gp(vec![xgb()]).unwrap();
    run(&mut trainer, 4, 2).unwrap();

    let first = trainer.get_best_results();
    let again = trainer.get_best_results();
    assert_eq!(first["XGBClassifier"].result, again["XGBClassifier"].result);
    assert_eq!(trainer.best_results_json().unwrap(), trainer.best_results_json().unwrap());

    let first_loss = first["XGBClassifier"].result.loss;
    for _ in 0..2 {
        run(&mut trainer, 4, 2).unwrap();
        let loss = trainer.get_best_results()["XGBClassifier"].result.loss;
        assert!(loss <= first_loss);
    }
}

// ---------------------------------------------------------------------------
// Batching and positional correspondence
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Log {
    asks: Vec<usize>,
    tells: Vec<(Vec<Point>, Vec<f64>)>,
}

/// Proposes `n_estimators = 10, 11, 12, ...` and records everything it sees.
struct Recording {
    next: i64,
    best: OptimizeState,
    log: Arc<Mutex<Log>>,
}

impl SurrogateOptimizer for Recording {
    fn ask(&mut self, n_points: usize) -> Result<Vec<Point>, OptimizerError> {
        self.log.lock().asks.push(n_points);
        Ok((0..n_points)
            .map(|_| {
                self.next += 1;
                vec![ParameterValue::Int(self.next), ParameterValue::Int(3)]
            })
            .collect())
    }

    fn tell(&mut self, points: Vec<Point>, values: Vec<f64>) -> Result<OptimizeState, OptimizerError> {
        for (point, &value) in points.iter().zip(&values) {
            if value < self.best.best_value {
                self.best.best_value = value;
                self.best.best_point = Some(point.clone());
            }
        }
        self.best.n_observations += values.len();
        self.log.lock().tells.push((points, values));
        Ok(self.best.clone())
    }

    fn state(&self) -> OptimizeState {
        self.best.clone()
    }

    fn name(&self) -> &str {
        "recording"
    }
}

struct RecordingFactory(Arc<Mutex<Log>>);

impl OptimizerFactory for RecordingFactory {
    fn build(&self, _space: &SearchSpace, _seed: u64) -> Result<Box<dyn SurrogateOptimizer>, OptimizerError> {
        Ok(Box::new(Recording {
            next: 9,
            best: OptimizeState {
                best_point: None,
                best_value: f64::INFINITY,
                n_observations: 0,
            },
            log: Arc::clone(&self.0),
        }))
    }

    fn name(&self) -> &str {
        "recording"
    }
}

/// Loss is `n_estimators / 1000`; larger values finish sooner.
struct ByEstimators;

#[async_trait]
impl Evaluator for ByEstimators {
    async fn evaluate(&self, request: EvalRequest) -> MgResult<EvaluationResult> {
        let n = request.params["n_estimators"].as_i64().unwrap_or(0);
        tokio::time::sleep(Duration::from_millis(60u64.saturating_sub(n as u64 * 3))).await;
        let folds = vec![BTreeMap::new(); request.folds.len()];
        Ok(EvaluationResult::from_folds(
            request.params,
            &vec![n as f64 / 1000.0; request.folds.len()],
            folds,
        ))
    }

    fn name(&self) -> &str {
        "by_estimators"
    }
}

#[test]
fn test_rounds_are_batched_and_losses_stay_aligned() {
    let log = Arc::new(Mutex::new(Log::default()));
    let mut trainer = SurrogateTrainer::new(
        vec![xgb()],
        Arc::new(RecordingFactory(Arc::clone(&log))),
        SchedulerConfig::default().with_worker_threads(4),
    )
    .unwrap()
    .with_evaluator(Arc::new(ByEstimators));

    let states = run(&mut trainer, 5, 2).unwrap();

    let log = log.lock();
    assert_eq!(log.asks, vec![2, 2, 1]);
    for (points, values) in &log.tells {
        assert_eq!(points.len(), values.len());
        for (point, value) in points.iter().zip(values) {
            let n = point[0].as_i64().unwrap();
            assert!((value - n as f64 / 1000.0).abs() < 1e-12);
        }
    }

    // first proposal has the smallest n_estimators
    let state = &states["XGBClassifier"];
    assert_eq!(state.best_point.as_ref().unwrap()[0], ParameterValue::Int(10));
    let best = trainer.get_best_results();
    assert_eq!(best["XGBClassifier"].result.params["n_estimators"], ParameterValue::Int(10));
    assert!((best["XGBClassifier"].result.loss - 0.01).abs() < 1e-12);
}

/// Starts each new optimizer at the next scripted `n_estimators` value.
struct ScriptedStarts(Mutex<Vec<i64>>);

impl OptimizerFactory for ScriptedStarts {
    fn build(&self, _space: &SearchSpace, _seed: u64) -> Result<Box<dyn SurrogateOptimizer>, OptimizerError> {
        let mut starts = self.0.lock();
        if starts.is_empty() {
            return Err(OptimizerError::Surrogate {
                message: "script exhausted".to_string(),
            });
        }
        let start = starts.remove(0);
        Ok(Box::new(Recording {
            next: start - 1,
            best: OptimizeState {
                best_point: None,
                best_value: f64::INFINITY,
                n_observations: 0,
            },
            log: Arc::new(Mutex::new(Log::default())),
        }))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

#[test]
fn test_better_runs_replace_the_incumbent_and_worse_runs_do_not() {
    let mut trainer = SurrogateTrainer::new(
        vec![xgb()],
        Arc::new(ScriptedStarts(Mutex::new(vec![50, 20, 80]))),
        scheduler(),
    )
    .unwrap()
    .with_evaluator(Arc::new(ByEstimators));

    let incumbent = |trainer: &SurrogateTrainer| {
        let best = trainer.get_best_results();
        let result = &best["XGBClassifier"].result;
        (result.loss, result.params["n_estimators"].clone())
    };

    run(&mut trainer, 1, 1).unwrap();
    let (loss, n) = incumbent(&trainer);
    assert!((loss - 0.05).abs() < 1e-12);
    assert_eq!(n, ParameterValue::Int(50));

    run(&mut trainer, 1, 1).unwrap();
    let (loss, n) = incumbent(&trainer);
    assert!((loss - 0.02).abs() < 1e-12);
    assert_eq!(n, ParameterValue::Int(20));

    let states = run(&mut trainer, 1, 1).unwrap();
    assert!((states["XGBClassifier"].best_value - 0.08).abs() < 1e-12);
    let (loss, n) = incumbent(&trainer);
    assert!((loss - 0.02).abs() < 1e-12);
    assert_eq!(n, ParameterValue::Int(20));
}

/// Succeeds with a fixed loss for the first `ok_calls` evaluations, then
/// reports a dispatch failure for every later one.
struct Flaky {
    ok_calls: usize,
    calls: AtomicUsize,
}

#[async_trait]
impl Evaluator for Flaky {
    async fn evaluate(&self, request: EvalRequest) -> MgResult<EvaluationResult> {
        if self.calls.fetch_add(1, Ordering::SeqCst) >= self.ok_calls {
            return Err(EvaluationError::Dispatch {
                message: "worker went away".to_string(),
            }
            .into());
        }
        let folds = vec![BTreeMap::new(); request.folds.len()];
        Ok(EvaluationResult::from_folds(
            request.params,
            &vec![0.25; request.folds.len()],
            folds,
        ))
    }

    fn name(&self) -> &str {
        "flaky"
    }
}

#[test]
fn test_failed_reevaluation_keeps_the_best_round_result() {
    let flaky = Arc::new(Flaky {
        ok_calls: 2,
        calls: AtomicUsize::new(0),
    });
    let mut trainer = SurrogateTrainer::new(vec![xgb()], Arc::new(OptimizerKind::Random), scheduler())
        .unwrap()
        .with_evaluator(Arc::clone(&flaky) as Arc<dyn Evaluator>);

    let states = run(&mut trainer, 2, 2).unwrap();
    assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);
    assert!((states["XGBClassifier"].best_value - 0.25).abs() < 1e-12);

    let best = trainer.get_best_results();
    assert_eq!(best.len(), 1);
    let result = &best["XGBClassifier"].result;
    assert_eq!(result.status, EvalStatus::Ok);
    assert!((result.loss - 0.25).abs() < 1e-12);
    let explored: Vec<&Params> = trainer.history("XGBClassifier").iter().map(|t| &t.params).collect();
    assert!(explored.contains(&&result.params));
}

// ---------------------------------------------------------------------------
// Remote evaluation
// ---------------------------------------------------------------------------

#[test]
fn test_remote_worker_serves_the_loop() {
    let trainer = SurrogateTrainer::new(vec![xgb()], Arc::new(OptimizerKind::Random), scheduler()).unwrap();
    let (client, _worker) = spawn_eval_worker(
        &trainer.scheduler_handle().unwrap(),
        Arc::new(CrossValEvaluator::new()),
        WorkerPoolConfig::default(),
    );
    let mut trainer = trainer.with_evaluator(Arc::new(client.clone()));

    run(&mut trainer, 4, 2).unwrap();

    // four candidates plus the re-evaluated winner
    let stats = client.stats();
    assert_eq!(stats.tasks_received, 5);
    assert_eq!(stats.tasks_completed, 5);
    assert!(trainer.get_best_results().contains_key("XGBClassifier"));
}

#[test]
fn test_runs_after_shutdown_fail() {
    let mut trainer = SurrogateTrainer::gp(vec![xgb()]).unwrap();
    trainer.shutdown();
    assert!(run(&mut trainer, 2, 1).is_err());
    assert!(trainer.get_best_results().is_empty());
}
