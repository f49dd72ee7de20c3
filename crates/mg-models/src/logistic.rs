//! Binary logistic regression trained with full-batch gradient descent.

use mg_types::{param_f64, param_i64, EvaluationError, Model, ModelType, Params, SearchSpace, XycDataset};
use tracing::trace;

const NAME: &str = "LogisticRegression";

/// Model type for [`LogisticModel`]. Hyperparameters: `learning_rate`,
/// `n_iter` and the L2 penalty `l2`. Labels must be 0 or 1.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogisticRegression;

impl ModelType for LogisticRegression {
    fn name(&self) -> &str {
        NAME
    }

    fn default_space(&self) -> SearchSpace {
        SearchSpace::new()
            .add_log_uniform("learning_rate", 1e-3, 1.0)
            .add_int("n_iter", 50, 500)
            .add_log_uniform("l2", 1e-6, 1.0)
    }

    fn build(&self, params: &Params) -> Result<Box<dyn Model>, EvaluationError> {
        let learning_rate = param_f64(params, "learning_rate", 0.1)?;
        let n_iter = param_i64(params, "n_iter", 100)?;
        let l2 = param_f64(params, "l2", 0.0)?;

        let invalid = |name: &str, message: String| EvaluationError::InvalidParameter {
            name: name.to_string(),
            message,
        };
        if !(learning_rate.is_finite() && learning_rate > 0.0) {
            return Err(invalid("learning_rate", format!("must be positive, got {learning_rate}")));
        }
        if n_iter < 1 {
            return Err(invalid("n_iter", format!("must be positive, got {n_iter}")));
        }
        if !(l2.is_finite() && l2 >= 0.0) {
            return Err(invalid("l2", format!("must be non-negative, got {l2}")));
        }

        Ok(Box::new(LogisticModel {
            learning_rate,
            n_iter: n_iter as usize,
            l2,
            fitted: None,
        }))
    }
}

struct Fitted {
    weights: Vec<f64>,
    bias: f64,
    /// Per-feature standardization learned on the training set.
    means: Vec<f64>,
    scales: Vec<f64>,
}

struct LogisticModel {
    learning_rate: f64,
    n_iter: usize,
    l2: f64,
    fitted: Option<Fitted>,
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

impl Fitted {
    fn logit(&self, row: &[f64]) -> f64 {
        row.iter()
            .zip(&self.means)
            .zip(&self.scales)
            .zip(&self.weights)
            .map(|(((x, m), s), w)| (x - m) / s * w)
            .sum::<f64>()
            + self.bias
    }
}

impl Model for LogisticModel {
    fn fit(&mut self, train: &XycDataset) -> Result<(), EvaluationError> {
        let fit_failed = |message: String| EvaluationError::FitFailed {
            model: NAME.to_string(),
            message,
        };
        if train.n_samples() == 0 {
            return Err(fit_failed("empty training set".to_string()));
        }
        if let Some(label) = train.y.iter().find(|&&y| y != 0.0 && y != 1.0) {
            return Err(fit_failed(format!("labels must be 0 or 1, found {label}")));
        }

        let n = train.n_samples() as f64;
        let d = train.n_features();
        let means: Vec<f64> = (0..d).map(|j| train.x.iter().map(|r| r[j]).sum::<f64>() / n).collect();
        let scales: Vec<f64> = (0..d)
            .map(|j| {
                let var = train.x.iter().map(|r| (r[j] - means[j]).powi(2)).sum::<f64>() / n;
                if var > 1e-12 {
                    var.sqrt()
                } else {
                    1.0
                }
            })
            .collect();

        let mut fitted = Fitted {
            weights: vec![0.0; d],
            bias: 0.0,
            means,
            scales,
        };

        for iter in 0..self.n_iter {
            let mut grad_w = vec![0.0; d];
            let mut grad_b = 0.0;
            for (row, &y) in train.x.iter().zip(&train.y) {
                let err = sigmoid(fitted.logit(row)) - y;
                for j in 0..d {
                    grad_w[j] += err * (row[j] - fitted.means[j]) / fitted.scales[j];
                }
                grad_b += err;
            }
            for (w, g) in fitted.weights.iter_mut().zip(&grad_w) {
                *w -= self.learning_rate * (g / n + self.l2 * *w);
            }
            fitted.bias -= self.learning_rate * grad_b / n;

            if !fitted.bias.is_finite() {
                return Err(fit_failed(format!("diverged after {iter} iterations")));
            }
        }

        trace!(n_iter = self.n_iter, bias = fitted.bias, "logistic regression fitted");
        self.fitted = Some(fitted);
        Ok(())
    }

    fn predict(&self, x: &[Vec<f64>]) -> Result<Vec<f64>, EvaluationError> {
        Ok(self
            .predict_proba(x)?
            .into_iter()
            .map(|p| if p >= 0.5 { 1.0 } else { 0.0 })
            .collect())
    }

    fn predict_proba(&self, x: &[Vec<f64>]) -> Result<Vec<f64>, EvaluationError> {
        let fitted = self.fitted.as_ref().ok_or_else(|| EvaluationError::PredictFailed {
            model: NAME.to_string(),
            message: "model has not been fitted".to_string(),
        })?;
        if let Some(row) = x.iter().find(|row| row.len() != fitted.weights.len()) {
            return Err(EvaluationError::PredictFailed {
                model: NAME.to_string(),
                message: format!("expected {} features, got {}", fitted.weights.len(), row.len()),
            });
        }
        Ok(x.iter().map(|row| sigmoid(fitted.logit(row))).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mg_types::{make_classification, ParameterValue};

    fn params(learning_rate: f64, n_iter: i64) -> Params {
        let mut params = Params::new();
        params.insert("learning_rate".into(), ParameterValue::Float(learning_rate));
        params.insert("n_iter".into(), ParameterValue::Int(n_iter));
        params.insert("l2".into(), ParameterValue::Float(1e-4));
        params
    }

    #[test]
    fn test_learns_a_linear_boundary() {
        let data = make_classification(150, 5, 4).unwrap();
        let folds = data.cv_split(3).unwrap();
        let mut model = LogisticRegression.build(&params(0.5, 200)).unwrap();
        model.fit(&folds[1].train).unwrap();

        let preds = model.predict(&folds[1].validation.x).unwrap();
        let correct = preds.iter().zip(&folds[1].validation.y).filter(|(p, y)| p == y).count();
        assert!(correct as f64 / preds.len() as f64 > 0.75);
    }

    #[test]
    fn test_rejects_non_binary_labels() {
        let train = XycDataset::new(vec![vec![0.0], vec![1.0]], vec![0.0, 2.0]).unwrap();
        let mut model = LogisticRegression.build(&params(0.1, 10)).unwrap();
        assert!(matches!(
            model.fit(&train),
            Err(EvaluationError::FitFailed { .. })
        ));
    }

    #[test]
    fn test_rejects_bad_parameters() {
        assert!(LogisticRegression.build(&params(0.0, 10)).is_err());
        assert!(LogisticRegression.build(&params(0.1, 0)).is_err());
    }

    #[test]
    fn test_constant_feature_does_not_poison_the_fit() {
        let x = (0..20).map(|i| vec![i as f64, 3.0]).collect();
        let y = (0..20).map(|i| if i < 10 { 0.0 } else { 1.0 }).collect();
        let train = XycDataset::new(x, y).unwrap();
        let mut model = LogisticRegression.build(&params(1.0, 300)).unwrap();
        model.fit(&train).unwrap();
        let proba = model.predict_proba(&[vec![0.0, 3.0], vec![19.0, 3.0]]).unwrap();
        assert!(proba[0] < 0.5 && proba[1] > 0.5, "{proba:?}");
    }
}
