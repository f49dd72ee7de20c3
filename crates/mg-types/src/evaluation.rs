//! Cross-validated evaluation results.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::space::Params;

/// Loss assigned to a candidate whose evaluation failed.
pub const FAILED_LOSS: f64 = f64::INFINITY;

/// Outcome tag of an evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvalStatus {
    Ok,
    Fail,
}

/// Record produced per (model type, params, folds) evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    /// Mean per-fold loss (the optimized metric, negated when maximized).
    pub loss: f64,
    /// Population variance of the per-fold losses.
    pub loss_variance: f64,
    /// One map from metric name to value per fold.
    pub metric_cv_results: Vec<BTreeMap<String, f64>>,
    pub status: EvalStatus,
    pub params: Params,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EvaluationResult {
    /// Build a successful result from per-fold losses and metric maps.
    pub fn from_folds(
        params: Params,
        fold_losses: &[f64],
        metric_cv_results: Vec<BTreeMap<String, f64>>,
    ) -> Self {
        let n = fold_losses.len().max(1) as f64;
        let loss = fold_losses.iter().sum::<f64>() / n;
        let loss_variance = fold_losses.iter().map(|l| (l - loss).powi(2)).sum::<f64>() / n;
        Self {
            loss,
            loss_variance,
            metric_cv_results,
            status: EvalStatus::Ok,
            params,
            error: None,
        }
    }

    /// Degraded result for a candidate that could not be evaluated.
    pub fn failed(params: Params, error: impl Into<String>) -> Self {
        Self {
            loss: FAILED_LOSS,
            loss_variance: 0.0,
            metric_cv_results: Vec::new(),
            status: EvalStatus::Fail,
            params,
            error: Some(error.into()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == EvalStatus::Ok
    }
}
