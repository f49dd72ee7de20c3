//! Gaussian-process surrogate with a Matérn 5/2 kernel.
//!
//! Inputs live in the unit hypercube. Targets are standardized before
//! fitting and predictions are mapped back to the original loss scale, so
//! acquisition functions can compare them directly with observed losses.
//! ARD lengthscales are the per-dimension standard deviation of the training
//! inputs. When the Cholesky factorisation fails the diagonal jitter is
//! raised tenfold, up to six times.

use mg_types::OptimizerError;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::bayes::SurrogateModel;

/// Precomputed √5 constant.
const SQRT_5: f64 = 2.236_067_977_499_79;

const JITTER_ATTEMPTS: i32 = 6;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpConfig {
    /// Observation noise added to the kernel diagonal.
    pub noise_variance: f64,
    /// Only the most recent observations are used for fitting.
    pub max_train_points: usize,
}

impl Default for GpConfig {
    fn default() -> Self {
        Self {
            noise_variance: 1e-6,
            max_train_points: 200,
        }
    }
}

/// A fitted GP posterior.
pub struct GaussianProcess {
    /// Cholesky factor of K + σ²I.
    cholesky: nalgebra::linalg::Cholesky<f64, nalgebra::Dyn>,
    /// α = (K + σ²I)^{-1} y.
    alpha: DVector<f64>,
    x_train: Vec<Vec<f64>>,
    lengthscales: Vec<f64>,
    signal_var: f64,
    y_mean: f64,
    y_std: f64,
}

/// `k(x1, x2) = σ² (1 + √5 r + 5/3 r²) exp(-√5 r)` with
/// `r = sqrt(Σ ((x1_i - x2_i) / l_i)²)`.
fn matern52(x1: &[f64], x2: &[f64], lengthscales: &[f64], signal_var: f64) -> f64 {
    let r_sq: f64 = x1
        .iter()
        .zip(x2)
        .zip(lengthscales)
        .map(|((a, b), l)| ((a - b) / l).powi(2))
        .sum();
    let sqrt5_r = SQRT_5 * r_sq.sqrt();
    signal_var * (1.0 + sqrt5_r + 5.0 / 3.0 * r_sq) * (-sqrt5_r).exp()
}

fn kernel_matrix(x: &[Vec<f64>], lengthscales: &[f64], signal_var: f64, noise_var: f64) -> DMatrix<f64> {
    let n = x.len();
    DMatrix::from_fn(n, n, |i, j| {
        let k = matern52(&x[i], &x[j], lengthscales, signal_var);
        if i == j {
            k + noise_var
        } else {
            k
        }
    })
}

impl SurrogateModel for GaussianProcess {
    type Config = GpConfig;

    const NAME: &'static str = "gp";

    fn fit(config: &GpConfig, xs: &[Vec<f64>], ys: &[f64], _seed: u64) -> Result<Self, OptimizerError> {
        if xs.is_empty() || xs.len() != ys.len() {
            return Err(OptimizerError::Surrogate {
                message: format!("cannot fit GP on {} inputs and {} targets", xs.len(), ys.len()),
            });
        }

        let start = xs.len().saturating_sub(config.max_train_points.max(1));
        let x_train = xs[start..].to_vec();
        let y_train = &ys[start..];
        let n = y_train.len() as f64;

        let y_mean = y_train.iter().sum::<f64>() / n;
        let y_var = if y_train.len() > 1 {
            y_train.iter().map(|y| (y - y_mean).powi(2)).sum::<f64>() / (n - 1.0)
        } else {
            1.0
        };
        let y_std = y_var.sqrt().max(1e-10);
        let y_standardized: Vec<f64> = y_train.iter().map(|y| (y - y_mean) / y_std).collect();

        let d = x_train[0].len();
        let lengthscales: Vec<f64> = (0..d)
            .map(|j| {
                let mean_j = x_train.iter().map(|x| x[j]).sum::<f64>() / n;
                let var_j = x_train.iter().map(|x| (x[j] - mean_j).powi(2)).sum::<f64>() / n;
                var_j.sqrt().max(0.01)
            })
            .collect();
        let signal_var = 1.0;

        let mut noise = config.noise_variance.max(1e-12);
        for _ in 0..JITTER_ATTEMPTS {
            let k = kernel_matrix(&x_train, &lengthscales, signal_var, noise);
            if let Some(cholesky) = nalgebra::linalg::Cholesky::new(k) {
                let alpha = cholesky.solve(&DVector::from_column_slice(&y_standardized));
                return Ok(Self {
                    cholesky,
                    alpha,
                    x_train,
                    lengthscales,
                    signal_var,
                    y_mean,
                    y_std,
                });
            }
            noise *= 10.0;
        }

        Err(OptimizerError::Surrogate {
            message: format!("kernel matrix not positive definite after {JITTER_ATTEMPTS} jitter attempts"),
        })
    }

    fn predict(&self, x: &[f64]) -> (f64, f64) {
        let k_star = DVector::from_fn(self.x_train.len(), |i, _| {
            matern52(x, &self.x_train[i], &self.lengthscales, self.signal_var)
        });

        let mean = k_star.dot(&self.alpha);
        let v = self.cholesky.solve(&k_star);
        let var = (self.signal_var - k_star.dot(&v)).max(0.0);

        (mean * self.y_std + self.y_mean, var.sqrt() * self.y_std)
    }
}
