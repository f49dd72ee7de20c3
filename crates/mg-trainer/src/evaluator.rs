//! Evaluation of one hyperparameter assignment over cross-validation folds.

use async_trait::async_trait;
use mg_types::{
    validation_error, CvFold, EvaluationError, EvaluationResult, Metric, MgResult, ModelType, Params,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Everything needed to evaluate one candidate.
#[derive(Debug, Clone)]
pub struct EvalRequest {
    pub model_type: Arc<dyn ModelType>,
    pub params: Params,
    pub folds: Arc<Vec<CvFold>>,
    /// Metrics computed per fold. The last one drives the loss.
    pub metrics: Arc<Vec<Arc<dyn Metric>>>,
    pub verbose: bool,
}

/// Turns a request into an [`EvaluationResult`].
///
/// An `Err` means the candidate could not be evaluated at all; the trainer
/// records it as a failed result and keeps going.
#[async_trait]
pub trait Evaluator: Send + Sync {
    async fn evaluate(&self, request: EvalRequest) -> MgResult<EvaluationResult>;

    fn name(&self) -> &str;
}

/// Fit and score the candidate on every fold, in fold order.
pub fn crossval_fit_eval(request: &EvalRequest) -> MgResult<EvaluationResult> {
    if request.folds.is_empty() {
        return Err(validation_error!("no cross-validation folds to evaluate on"));
    }
    if request.metrics.is_empty() {
        return Err(validation_error!("no metrics to evaluate"));
    }

    let needs_proba = request.metrics.iter().any(|m| m.requires_proba());
    let mut fold_losses = Vec::with_capacity(request.folds.len());
    let mut metric_cv_results = Vec::with_capacity(request.folds.len());

    for (fold_idx, fold) in request.folds.iter().enumerate() {
        let mut model = request.model_type.build(&request.params)?;
        model.fit(&fold.train)?;

        let labels = model.predict(&fold.validation.x)?;
        let proba = if needs_proba {
            Some(model.predict_proba(&fold.validation.x)?)
        } else {
            None
        };

        let mut scores = BTreeMap::new();
        let mut loss = f64::NAN;
        for metric in request.metrics.iter() {
            let predictions = match (&proba, metric.requires_proba()) {
                (Some(proba), true) => proba,
                _ => &labels,
            };
            let score = metric.score(&fold.validation.y, predictions)?;
            scores.insert(metric.name().to_string(), score);
            loss = metric.to_loss(score);
        }

        if !loss.is_finite() {
            return Err(EvaluationError::MetricFailed {
                metric: request.metrics[request.metrics.len() - 1].name().to_string(),
                message: format!("non-finite loss {loss} on fold {fold_idx}"),
            }
            .into());
        }

        if request.verbose {
            info!("{} fold {}: loss {:.5}", request.model_type.name(), fold_idx, loss);
        }
        fold_losses.push(loss);
        metric_cv_results.push(scores);
    }

    Ok(EvaluationResult::from_folds(
        request.params.clone(),
        &fold_losses,
        metric_cv_results,
    ))
}

/// Runs [`crossval_fit_eval`] on the blocking pool of the current runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct CrossValEvaluator;

impl CrossValEvaluator {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Evaluator for CrossValEvaluator {
    async fn evaluate(&self, request: EvalRequest) -> MgResult<EvaluationResult> {
        let model = request.model_type.name().to_string();
        let result = tokio::task::spawn_blocking(move || crossval_fit_eval(&request))
            .await
            .map_err(|e| EvaluationError::TaskPanicked {
                message: format!("{model}: {e}"),
            })??;

        debug!(model = %model, loss = result.loss, "cross-validation finished");
        Ok(result)
    }

    fn name(&self) -> &str {
        "crossval"
    }
}
