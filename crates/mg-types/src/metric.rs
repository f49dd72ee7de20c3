//! Scoring metrics.
//!
//! A [`Metric`] scores predictions against ground truth and carries its
//! optimisation orientation, which decides how the score becomes a loss.

use std::fmt::Debug;

use crate::errors::EvaluationError;

/// A named scoring function with a minimize-vs-maximize orientation.
pub trait Metric: Send + Sync + Debug {
    /// Key used in per-fold metric maps.
    fn name(&self) -> &str;

    /// `true` when smaller scores are better.
    fn is_min_optimal(&self) -> bool;

    /// `true` when `score` expects positive-class probabilities instead of
    /// hard labels.
    fn requires_proba(&self) -> bool {
        false
    }

    fn score(&self, y_true: &[f64], y_pred: &[f64]) -> Result<f64, EvaluationError>;

    /// Loss signal fed to the optimizer: the score itself, or its negation
    /// for metrics that are maximized.
    fn to_loss(&self, score: f64) -> f64 {
        if self.is_min_optimal() {
            score
        } else {
            -score
        }
    }
}

fn check_lengths(metric: &str, y_true: &[f64], y_pred: &[f64]) -> Result<(), EvaluationError> {
    if y_true.is_empty() || y_true.len() != y_pred.len() {
        return Err(EvaluationError::MetricFailed {
            metric: metric.to_string(),
            message: format!(
                "expected equal non-empty inputs, got {} targets and {} predictions",
                y_true.len(),
                y_pred.len()
            ),
        });
    }
    Ok(())
}

fn fraction_correct(y_true: &[f64], y_pred: &[f64]) -> f64 {
    let correct = y_true
        .iter()
        .zip(y_pred)
        .filter(|(t, p)| t.round() == p.round())
        .count();
    correct as f64 / y_true.len() as f64
}

/// Fraction of correctly predicted labels.
#[derive(Debug, Clone, Copy, Default)]
pub struct Accuracy;

impl Metric for Accuracy {
    fn name(&self) -> &str {
        "accuracy"
    }

    fn is_min_optimal(&self) -> bool {
        false
    }

    fn score(&self, y_true: &[f64], y_pred: &[f64]) -> Result<f64, EvaluationError> {
        check_lengths(self.name(), y_true, y_pred)?;
        Ok(fraction_correct(y_true, y_pred))
    }
}

/// Fraction of misclassified labels (`1 - accuracy`).
#[derive(Debug, Clone, Copy, Default)]
pub struct ZeroOneLoss;

impl Metric for ZeroOneLoss {
    fn name(&self) -> &str {
        "zero_one_loss"
    }

    fn is_min_optimal(&self) -> bool {
        true
    }

    fn score(&self, y_true: &[f64], y_pred: &[f64]) -> Result<f64, EvaluationError> {
        check_lengths(self.name(), y_true, y_pred)?;
        Ok(1.0 - fraction_correct(y_true, y_pred))
    }
}

/// Binary cross-entropy over positive-class probabilities.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogLoss;

const LOG_LOSS_EPS: f64 = 1e-15;

impl Metric for LogLoss {
    fn name(&self) -> &str {
        "logloss"
    }

    fn is_min_optimal(&self) -> bool {
        true
    }

    fn requires_proba(&self) -> bool {
        true
    }

    fn score(&self, y_true: &[f64], y_pred: &[f64]) -> Result<f64, EvaluationError> {
        check_lengths(self.name(), y_true, y_pred)?;
        let total: f64 = y_true
            .iter()
            .zip(y_pred)
            .map(|(&t, &p)| {
                let p = p.clamp(LOG_LOSS_EPS, 1.0 - LOG_LOSS_EPS);
                -(t * p.ln() + (1.0 - t) * (1.0 - p).ln())
            })
            .sum();
        Ok(total / y_true.len() as f64)
    }
}

/// Area under the ROC curve via the rank-sum statistic (ties share the
/// average rank).
#[derive(Debug, Clone, Copy, Default)]
pub struct RocAuc;

impl Metric for RocAuc {
    fn name(&self) -> &str {
        "roc_auc"
    }

    fn is_min_optimal(&self) -> bool {
        false
    }

    fn requires_proba(&self) -> bool {
        true
    }

    fn score(&self, y_true: &[f64], y_pred: &[f64]) -> Result<f64, EvaluationError> {
        check_lengths(self.name(), y_true, y_pred)?;

        let mut order: Vec<usize> = (0..y_pred.len()).collect();
        order.sort_by(|&a, &b| y_pred[a].total_cmp(&y_pred[b]));

        let mut ranks = vec![0.0; y_pred.len()];
        let mut i = 0;
        while i < order.len() {
            let mut j = i;
            while j + 1 < order.len() && y_pred[order[j + 1]] == y_pred[order[i]] {
                j += 1;
            }
            // 1-based average rank of the tie group i..=j
            let rank = (i + j) as f64 / 2.0 + 1.0;
            for &idx in &order[i..=j] {
                ranks[idx] = rank;
            }
            i = j + 1;
        }

        let n_pos = y_true.iter().filter(|&&t| t > 0.5).count();
        let n_neg = y_true.len() - n_pos;
        if n_pos == 0 || n_neg == 0 {
            return Err(EvaluationError::MetricFailed {
                metric: self.name().to_string(),
                message: "only one class present in targets".to_string(),
            });
        }

        let pos_rank_sum: f64 = y_true
            .iter()
            .zip(&ranks)
            .filter(|(&t, _)| t > 0.5)
            .map(|(_, &r)| r)
            .sum();
        let n_pos = n_pos as f64;
        Ok((pos_rank_sum - n_pos * (n_pos + 1.0) / 2.0) / (n_pos * n_neg as f64))
    }
}
