//! Named optimizer configurations that build a fresh optimizer per search space.

use mg_types::{OptimizerError, SearchSpace};
use serde::{Deserialize, Serialize};

use crate::bayes::{BayesConfig, BayesOptimizer};
use crate::forest::{ForestConfig, RandomForest};
use crate::gp::{GaussianProcess, GpConfig};
use crate::optimizer::SurrogateOptimizer;
use crate::random::RandomOptimizer;

pub type GpOptimizer = BayesOptimizer<GaussianProcess>;
pub type ForestOptimizer = BayesOptimizer<RandomForest>;

/// Builds an independent optimizer for one search space.
pub trait OptimizerFactory: Send + Sync {
    fn build(&self, space: &SearchSpace, seed: u64) -> Result<Box<dyn SurrogateOptimizer>, OptimizerError>;

    fn name(&self) -> &str;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OptimizerKind {
    Gp {
        #[serde(default)]
        bayes: BayesConfig,
        #[serde(default)]
        gp: GpConfig,
    },
    Forest {
        #[serde(default)]
        bayes: BayesConfig,
        #[serde(default)]
        forest: ForestConfig,
    },
    Random,
}

impl Default for OptimizerKind {
    fn default() -> Self {
        Self::gp()
    }
}

impl OptimizerKind {
    pub fn gp() -> Self {
        Self::Gp {
            bayes: BayesConfig::default(),
            gp: GpConfig::default(),
        }
    }

    pub fn forest() -> Self {
        Self::Forest {
            bayes: BayesConfig::default(),
            forest: ForestConfig::default(),
        }
    }

    /// Default configuration for `"gp"`, `"forest"` or `"random"`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "gp" => Some(Self::gp()),
            "forest" | "rf" => Some(Self::forest()),
            "random" => Some(Self::Random),
            _ => None,
        }
    }

    /// Replace the Bayesian loop settings; no-op for random search.
    pub fn with_bayes(mut self, config: BayesConfig) -> Self {
        match &mut self {
            Self::Gp { bayes, .. } | Self::Forest { bayes, .. } => *bayes = config,
            Self::Random => {}
        }
        self
    }
}

impl OptimizerFactory for OptimizerKind {
    fn build(&self, space: &SearchSpace, seed: u64) -> Result<Box<dyn SurrogateOptimizer>, OptimizerError> {
        let optimizer: Box<dyn SurrogateOptimizer> = match self {
            Self::Gp { bayes, gp } => Box::new(GpOptimizer::new(space.clone(), bayes.clone(), gp.clone(), seed)?),
            Self::Forest { bayes, forest } => Box::new(ForestOptimizer::new(
                space.clone(),
                bayes.clone(),
                forest.clone(),
                seed,
            )?),
            Self::Random => Box::new(RandomOptimizer::new(space.clone(), seed)?),
        };
        Ok(optimizer)
    }

    fn name(&self) -> &str {
        match self {
            Self::Gp { .. } => "gp",
            Self::Forest { .. } => "forest",
            Self::Random => "random",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_name_resolves_known_kinds() {
        assert_eq!(OptimizerKind::from_name("GP"), Some(OptimizerKind::gp()));
        assert_eq!(OptimizerKind::from_name("forest"), Some(OptimizerKind::forest()));
        assert_eq!(OptimizerKind::from_name("random"), Some(OptimizerKind::Random));
        assert_eq!(OptimizerKind::from_name("tpe"), None);
    }

    #[test]
    fn test_built_optimizers_report_their_kind() {
        let space = SearchSpace::new().add_int("k", 1, 5);
        for kind in [OptimizerKind::gp(), OptimizerKind::forest(), OptimizerKind::Random] {
            let opt = kind.build(&space, 1).unwrap();
            assert_eq!(opt.name(), kind.name());
        }
    }

    #[test]
    fn test_invalid_space_fails_to_build() {
        let err = OptimizerKind::gp().build(&SearchSpace::new(), 1).err();
        assert!(matches!(err, Some(OptimizerError::EmptySpace)));
    }

    #[test]
    fn test_kind_deserializes_with_defaults() {
        let kind: OptimizerKind = serde_json::from_str(r#"{"kind": "forest"}"#).unwrap();
        assert_eq!(kind, OptimizerKind::forest());
    }
}
