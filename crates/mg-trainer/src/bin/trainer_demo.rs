use anyhow::Context;
use mg_models::{KnnClassifier, LogisticRegression};
use mg_trainer::{CrossValidation, ModelSpaceInput, SurrogateTrainer, TrainerConfig};
use mg_types::{make_classification, Accuracy, Metric, RocAuc, ZeroOneLoss};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match std::env::var("MODELGYM_CONFIG") {
        Ok(path) => TrainerConfig::from_json_file(&path).with_context(|| format!("loading config from {path}"))?,
        Err(_) => TrainerConfig::default(),
    }
    .with_env_overrides()?;
    config.validate()?;

    let data = make_classification(200, 4, config.seed)?;
    info!(
        "ModelGym demo: {} samples, {} folds, {} evaluations per model",
        data.n_samples(),
        config.cv_folds,
        config.opt_evals
    );

    let mut trainer = SurrogateTrainer::from_config(
        vec![
            ModelSpaceInput::Bare(Arc::new(KnnClassifier)),
            ModelSpaceInput::Bare(Arc::new(LogisticRegression)),
        ],
        &config,
    )?;

    let reported: Vec<Arc<dyn Metric>> = vec![Arc::new(Accuracy), Arc::new(RocAuc)];
    let states = trainer.crossval_optimize_params(
        Arc::new(ZeroOneLoss),
        Some(&data),
        CrossValidation::Folds(config.cv_folds),
        config.optimize_options(reported),
    )?;
    for (name, state) in &states {
        info!("{}: best loss {:.4} after {} evaluations", name, state.best_value, state.n_observations);
    }

    println!("{}", serde_json::to_string_pretty(&trainer.best_results_json()?)?);
    trainer.shutdown();
    Ok(())
}
