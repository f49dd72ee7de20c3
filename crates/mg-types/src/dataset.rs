//! Feature/label datasets and cross-validation folds.

use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::errors::{DataError, MgResult};

/// Dense feature matrix `x`, targets `y`, and the indices of categorical
/// columns `cat_cols`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct XycDataset {
    pub x: Vec<Vec<f64>>,
    pub y: Vec<f64>,
    pub cat_cols: Vec<usize>,
}

/// One train/validation pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CvFold {
    pub train: XycDataset,
    pub validation: XycDataset,
}

impl XycDataset {
    pub fn new(x: Vec<Vec<f64>>, y: Vec<f64>) -> MgResult<Self> {
        Self::with_categorical(x, y, Vec::new())
    }

    pub fn with_categorical(x: Vec<Vec<f64>>, y: Vec<f64>, cat_cols: Vec<usize>) -> MgResult<Self> {
        if x.is_empty() {
            return Err(DataError::Empty.into());
        }
        if x.len() != y.len() {
            return Err(DataError::LengthMismatch {
                features: x.len(),
                labels: y.len(),
            }
            .into());
        }

        let expected = x[0].len();
        if let Some((row, found)) = x
            .iter()
            .enumerate()
            .map(|(i, r)| (i, r.len()))
            .find(|(_, len)| *len != expected)
        {
            return Err(DataError::RaggedRows {
                row,
                expected,
                found,
            }
            .into());
        }

        if let Some(&index) = cat_cols.iter().find(|&&c| c >= expected) {
            return Err(DataError::InvalidCategoricalColumn {
                index,
                columns: expected,
            }
            .into());
        }

        Ok(Self { x, y, cat_cols })
    }

    pub fn n_samples(&self) -> usize {
        self.y.len()
    }

    pub fn n_features(&self) -> usize {
        self.x.first().map_or(0, Vec::len)
    }

    /// Rows selected by `indices`, in that order.
    pub fn subset(&self, indices: &[usize]) -> Self {
        Self {
            x: indices.iter().map(|&i| self.x[i].clone()).collect(),
            y: indices.iter().map(|&i| self.y[i]).collect(),
            cat_cols: self.cat_cols.clone(),
        }
    }

    /// Contiguous k-fold split without shuffling. The first `n % k` folds
    /// hold one extra validation sample.
    pub fn cv_split(&self, n_folds: usize) -> MgResult<Vec<CvFold>> {
        let order: Vec<usize> = (0..self.n_samples()).collect();
        self.split_ordered(&order, n_folds)
    }

    /// K-fold split over a seeded permutation of the rows.
    pub fn cv_split_shuffled(&self, n_folds: usize, seed: u64) -> MgResult<Vec<CvFold>> {
        let mut order: Vec<usize> = (0..self.n_samples()).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        order.shuffle(&mut rng);
        self.split_ordered(&order, n_folds)
    }

    fn split_ordered(&self, order: &[usize], n_folds: usize) -> MgResult<Vec<CvFold>> {
        let n = order.len();
        if n_folds < 2 || n_folds > n {
            return Err(DataError::InvalidFolds {
                samples: n,
                folds: n_folds,
            }
            .into());
        }

        let base = n / n_folds;
        let extra = n % n_folds;
        let mut folds = Vec::with_capacity(n_folds);
        let mut start = 0;

        for fold in 0..n_folds {
            let size = base + usize::from(fold < extra);
            let end = start + size;
            let validation: Vec<usize> = order[start..end].to_vec();
            let train: Vec<usize> = order[..start]
                .iter()
                .chain(order[end..].iter())
                .copied()
                .collect();
            folds.push(CvFold {
                train: self.subset(&train),
                validation: self.subset(&validation),
            });
            start = end;
        }

        Ok(folds)
    }
}

/// Seeded synthetic binary classification data: two Gaussian blobs whose
/// centres differ along every feature, with labels in {0.0, 1.0}.
pub fn make_classification(n_samples: usize, n_features: usize, seed: u64) -> MgResult<XycDataset> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut x = Vec::with_capacity(n_samples);
    let mut y = Vec::with_capacity(n_samples);

    for i in 0..n_samples {
        let label = (i % 2) as f64;
        let centre = if label > 0.5 { 1.0 } else { -1.0 };
        let row: Vec<f64> = (0..n_features)
            .map(|_| centre + 1.5 * standard_normal(&mut rng))
            .collect();
        x.push(row);
        y.push(label);
    }

    XycDataset::new(x, y)
}

/// Box-Muller transform.
fn standard_normal(rng: &mut impl Rng) -> f64 {
    let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
    let u2: f64 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}
