//! Acquisition functions over a surrogate's posterior.

use rand::Rng;
use serde::{Deserialize, Serialize};

/// How candidate points are scored. Higher scores are preferred.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Acquisition {
    /// `E[max(y_best - y - xi, 0)]`
    ExpectedImprovement { xi: f64 },
    /// `P(y < y_best - xi)`
    ProbabilityOfImprovement { xi: f64 },
    /// `-(mean - kappa * std)`
    LowerConfidenceBound { kappa: f64 },
    /// Portfolio of EI, PI and LCB; each ask picks one member with
    /// probability `softmax(eta * gains)`.
    Hedge { eta: f64 },
}

impl Default for Acquisition {
    fn default() -> Self {
        Self::Hedge { eta: 1.0 }
    }
}

pub(crate) const DEFAULT_XI: f64 = 0.01;
pub(crate) const DEFAULT_KAPPA: f64 = 1.96;

/// Members of the hedge portfolio, in gain order.
pub(crate) const HEDGE_PORTFOLIO: [Acquisition; 3] = [
    Acquisition::ExpectedImprovement { xi: DEFAULT_XI },
    Acquisition::ProbabilityOfImprovement { xi: DEFAULT_XI },
    Acquisition::LowerConfidenceBound {
        kappa: DEFAULT_KAPPA,
    },
];

impl Acquisition {
    /// Score a posterior `(mean, std)` against the best observed loss.
    ///
    /// `Hedge` has no score of its own; it is resolved to a portfolio member
    /// before scoring and falls back to expected improvement here.
    pub fn score(&self, mean: f64, std: f64, y_best: f64) -> f64 {
        match *self {
            Self::ExpectedImprovement { xi } => expected_improvement(mean, std, y_best, xi),
            Self::ProbabilityOfImprovement { xi } => probability_of_improvement(mean, std, y_best, xi),
            Self::LowerConfidenceBound { kappa } => -(mean - kappa * std),
            Self::Hedge { .. } => expected_improvement(mean, std, y_best, DEFAULT_XI),
        }
    }
}

fn expected_improvement(mean: f64, std: f64, y_best: f64, xi: f64) -> f64 {
    let improvement = y_best - mean - xi;
    if std < 1e-12 {
        return improvement.max(0.0);
    }
    let z = improvement / std;
    (improvement * norm_cdf(z) + std * norm_pdf(z)).max(0.0)
}

fn probability_of_improvement(mean: f64, std: f64, y_best: f64, xi: f64) -> f64 {
    let improvement = y_best - mean - xi;
    if std < 1e-12 {
        return if improvement > 0.0 { 1.0 } else { 0.0 };
    }
    norm_cdf(improvement / std)
}

/// Standard normal PDF.
pub(crate) fn norm_pdf(x: f64) -> f64 {
    const INV_SQRT_2PI: f64 = 0.398_942_280_401_432_7;
    INV_SQRT_2PI * (-0.5 * x * x).exp()
}

/// Standard normal CDF (Hart rational approximation).
pub(crate) fn norm_cdf(x: f64) -> f64 {
    if x < -8.0 {
        return 0.0;
    }
    if x > 8.0 {
        return 1.0;
    }

    let abs_x = x.abs();
    let t = 1.0 / (1.0 + 0.231_641_9 * abs_x);
    let t2 = t * t;
    let t3 = t2 * t;
    let t4 = t3 * t;
    let t5 = t4 * t;

    let poly = 0.319_381_530 * t - 0.356_563_782 * t2 + 1.781_477_937 * t3 - 1.821_255_978 * t4
        + 1.330_274_429 * t5;
    let cdf = 1.0 - norm_pdf(abs_x) * poly;

    if x >= 0.0 {
        cdf
    } else {
        1.0 - cdf
    }
}

/// Running gains of the hedge portfolio.
#[derive(Debug, Clone)]
pub(crate) struct HedgeState {
    eta: f64,
    gains: [f64; 3],
    /// Unit-cube proposals of each member from the latest ask.
    pending: Option<[Vec<f64>; 3]>,
}

impl HedgeState {
    pub fn new(eta: f64) -> Self {
        Self {
            eta,
            gains: [0.0; 3],
            pending: None,
        }
    }

    /// Pick a portfolio member index with probability `softmax(eta * gains)`.
    pub fn choose(&self, rng: &mut impl Rng) -> usize {
        let scaled: Vec<f64> = self.gains.iter().map(|g| self.eta * g).collect();
        let max = scaled.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let weights: Vec<f64> = scaled.iter().map(|s| (s - max).exp()).collect();
        let total: f64 = weights.iter().sum();

        let mut draw = rng.gen::<f64>() * total;
        for (idx, w) in weights.iter().enumerate() {
            if draw < *w {
                return idx;
            }
            draw -= w;
        }
        weights.len() - 1
    }

    pub fn set_pending(&mut self, proposals: [Vec<f64>; 3]) {
        self.pending = Some(proposals);
    }

    /// Reward each member by the negated posterior mean at its last
    /// proposal, under the refitted surrogate.
    pub fn update(&mut self, predict_mean: impl Fn(&[f64]) -> f64) {
        if let Some(proposals) = self.pending.take() {
            for (gain, x) in self.gains.iter_mut().zip(proposals.iter()) {
                *gain -= predict_mean(x);
            }
        }
    }

    #[cfg(test)]
    pub fn gains(&self) -> [f64; 3] {
        self.gains
    }
}
