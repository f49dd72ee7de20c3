//! k-nearest-neighbours classifier.

use mg_types::{param_i64, param_str, EvaluationError, Model, ModelType, Params, SearchSpace, XycDataset};
use rayon::prelude::*;
use serde_json::json;

const NAME: &str = "KnnClassifier";

/// Model type for [`KnnModel`]. Hyperparameters: `n_neighbors` and
/// `weights` (`"uniform"` or `"distance"`).
#[derive(Debug, Clone, Copy, Default)]
pub struct KnnClassifier;

impl ModelType for KnnClassifier {
    fn name(&self) -> &str {
        NAME
    }

    fn default_space(&self) -> SearchSpace {
        SearchSpace::new()
            .add_int("n_neighbors", 1, 30)
            .add_choice("weights", vec![json!("uniform"), json!("distance")])
    }

    fn build(&self, params: &Params) -> Result<Box<dyn Model>, EvaluationError> {
        let n_neighbors = param_i64(params, "n_neighbors", 5)?;
        if n_neighbors < 1 {
            return Err(EvaluationError::InvalidParameter {
                name: "n_neighbors".to_string(),
                message: format!("must be positive, got {n_neighbors}"),
            });
        }

        let distance_weighted = match param_str(params, "weights", "uniform")? {
            "uniform" => false,
            "distance" => true,
            other => {
                return Err(EvaluationError::InvalidParameter {
                    name: "weights".to_string(),
                    message: format!("unknown weighting {other}"),
                })
            }
        };

        Ok(Box::new(KnnModel {
            n_neighbors: n_neighbors as usize,
            distance_weighted,
            train: None,
        }))
    }
}

struct KnnModel {
    n_neighbors: usize,
    distance_weighted: bool,
    train: Option<XycDataset>,
}

impl KnnModel {
    fn train(&self) -> Result<&XycDataset, EvaluationError> {
        self.train.as_ref().ok_or_else(|| EvaluationError::PredictFailed {
            model: NAME.to_string(),
            message: "model has not been fitted".to_string(),
        })
    }

    /// Weighted votes per distinct label among the nearest neighbours of `row`.
    fn votes(&self, train: &XycDataset, row: &[f64]) -> Vec<(f64, f64)> {
        let mut distances: Vec<(f64, f64)> = train
            .x
            .iter()
            .zip(&train.y)
            .map(|(x, &y)| {
                let d = x.iter().zip(row).map(|(a, b)| (a - b).powi(2)).sum::<f64>().sqrt();
                (d, y)
            })
            .collect();
        distances.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut votes: Vec<(f64, f64)> = Vec::new();
        for &(d, label) in distances.iter().take(self.n_neighbors) {
            let weight = if self.distance_weighted { 1.0 / d.max(1e-12) } else { 1.0 };
            match votes.iter_mut().find(|(l, _)| *l == label) {
                Some((_, w)) => *w += weight,
                None => votes.push((label, weight)),
            }
        }
        votes
    }

    fn check_width(&self, train: &XycDataset, x: &[Vec<f64>]) -> Result<(), EvaluationError> {
        match x.iter().find(|row| row.len() != train.n_features()) {
            Some(row) => Err(EvaluationError::PredictFailed {
                model: NAME.to_string(),
                message: format!("expected {} features, got {}", train.n_features(), row.len()),
            }),
            None => Ok(()),
        }
    }
}

impl Model for KnnModel {
    fn fit(&mut self, train: &XycDataset) -> Result<(), EvaluationError> {
        if train.n_samples() == 0 {
            return Err(EvaluationError::FitFailed {
                model: NAME.to_string(),
                message: "empty training set".to_string(),
            });
        }
        self.train = Some(train.clone());
        Ok(())
    }

    fn predict(&self, x: &[Vec<f64>]) -> Result<Vec<f64>, EvaluationError> {
        let train = self.train()?;
        self.check_width(train, x)?;
        Ok(x
            .par_iter()
            .map(|row| {
                self.votes(train, row)
                    .into_iter()
                    .max_by(|a, b| a.1.total_cmp(&b.1))
                    .map_or(0.0, |(label, _)| label)
            })
            .collect())
    }

    fn predict_proba(&self, x: &[Vec<f64>]) -> Result<Vec<f64>, EvaluationError> {
        let train = self.train()?;
        self.check_width(train, x)?;
        Ok(x
            .par_iter()
            .map(|row| {
                let votes = self.votes(train, row);
                let total: f64 = votes.iter().map(|(_, w)| w).sum();
                let positive: f64 = votes.iter().filter(|(l, _)| *l == 1.0).map(|(_, w)| w).sum();
                positive / total
            })
            .collect())
    }
}
