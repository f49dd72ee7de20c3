//! Randomized regression-tree ensemble used as a surrogate.
//!
//! Each tree picks split thresholds uniformly at random between the
//! feature's observed extremes (extremely randomized trees) and keeps the
//! split with the lowest squared error. The predictive distribution is the
//! mixture of per-tree leaf distributions:
//! `var = mean_t(leaf_var_t + leaf_mean_t²) - mean²`.

use mg_types::OptimizerError;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::bayes::SurrogateModel;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestConfig {
    pub n_trees: usize,
    pub min_samples_leaf: usize,
    pub max_depth: usize,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            n_trees: 32,
            min_samples_leaf: 2,
            max_depth: 12,
        }
    }
}

#[derive(Debug, Clone)]
enum Node {
    Leaf {
        mean: f64,
        variance: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone)]
struct Tree {
    nodes: Vec<Node>,
}

struct TreeBuilder<'a> {
    xs: &'a [Vec<f64>],
    ys: &'a [f64],
    config: &'a ForestConfig,
    rng: ChaCha8Rng,
    nodes: Vec<Node>,
}

fn mean_and_variance(ys: &[f64], indices: &[usize]) -> (f64, f64) {
    let n = indices.len() as f64;
    let mean = indices.iter().map(|&i| ys[i]).sum::<f64>() / n;
    let variance = indices.iter().map(|&i| (ys[i] - mean).powi(2)).sum::<f64>() / n;
    (mean, variance)
}

impl TreeBuilder<'_> {
    fn build(&mut self, indices: Vec<usize>, depth: usize) -> usize {
        let (mean, variance) = mean_and_variance(self.ys, &indices);
        let min_leaf = self.config.min_samples_leaf.max(1);

        if depth >= self.config.max_depth || indices.len() < 2 * min_leaf || variance < 1e-15 {
            return self.push(Node::Leaf { mean, variance });
        }

        let n_features = self.xs[indices[0]].len();
        let mut best: Option<(f64, usize, f64)> = None;

        for feature in 0..n_features {
            let (lo, hi) = indices
                .iter()
                .map(|&i| self.xs[i][feature])
                .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
            if hi - lo < 1e-12 {
                continue;
            }

            let threshold = self.rng.gen_range(lo..hi);
            let (left, right): (Vec<usize>, Vec<usize>) =
                indices.iter().partition(|&&i| self.xs[i][feature] <= threshold);
            if left.len() < min_leaf || right.len() < min_leaf {
                continue;
            }

            let (_, left_var) = mean_and_variance(self.ys, &left);
            let (_, right_var) = mean_and_variance(self.ys, &right);
            let sse = left_var * left.len() as f64 + right_var * right.len() as f64;
            if best.map_or(true, |(best_sse, _, _)| sse < best_sse) {
                best = Some((sse, feature, threshold));
            }
        }

        let Some((_, feature, threshold)) = best else {
            return self.push(Node::Leaf { mean, variance });
        };

        let (left, right): (Vec<usize>, Vec<usize>) =
            indices.into_iter().partition(|&i| self.xs[i][feature] <= threshold);

        let slot = self.push(Node::Leaf { mean, variance });
        let left = self.build(left, depth + 1);
        let right = self.build(right, depth + 1);
        self.nodes[slot] = Node::Split {
            feature,
            threshold,
            left,
            right,
        };
        slot
    }

    fn push(&mut self, node: Node) -> usize {
        self.nodes.push(node);
        self.nodes.len() - 1
    }
}

impl Tree {
    fn fit(xs: &[Vec<f64>], ys: &[f64], config: &ForestConfig, seed: u64) -> Self {
        let mut builder = TreeBuilder {
            xs,
            ys,
            config,
            rng: ChaCha8Rng::seed_from_u64(seed),
            nodes: Vec::new(),
        };
        builder.build((0..ys.len()).collect(), 0);
        Self {
            nodes: builder.nodes,
        }
    }

    /// Leaf `(mean, variance)` reached by `x`.
    fn leaf(&self, x: &[f64]) -> (f64, f64) {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { mean, variance } => return (*mean, *variance),
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if x[*feature] <= *threshold { *left } else { *right };
                }
            }
        }
    }
}

/// A fitted ensemble.
pub struct RandomForest {
    trees: Vec<Tree>,
}

impl SurrogateModel for RandomForest {
    type Config = ForestConfig;

    const NAME: &'static str = "forest";

    fn fit(config: &ForestConfig, xs: &[Vec<f64>], ys: &[f64], seed: u64) -> Result<Self, OptimizerError> {
        if xs.is_empty() || xs.len() != ys.len() || config.n_trees == 0 {
            return Err(OptimizerError::Surrogate {
                message: format!(
                    "cannot fit {} trees on {} inputs and {} targets",
                    config.n_trees,
                    xs.len(),
                    ys.len()
                ),
            });
        }

        let trees = (0..config.n_trees as u64)
            .into_par_iter()
            .map(|t| Tree::fit(xs, ys, config, seed.wrapping_mul(31).wrapping_add(t)))
            .collect();

        Ok(Self { trees })
    }

    fn predict(&self, x: &[f64]) -> (f64, f64) {
        let n = self.trees.len() as f64;
        let (sum_mean, sum_second) = self.trees.iter().fold((0.0, 0.0), |(m, s), tree| {
            let (mean, var) = tree.leaf(x);
            (m + mean, s + var + mean * mean)
        });
        let mean = sum_mean / n;
        let var = (sum_second / n - mean * mean).max(0.0);
        (mean, var.sqrt())
    }
}
