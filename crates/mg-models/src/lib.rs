//! # mg-models
//!
//! Small reference classifiers implementing [`mg_types::ModelType`], used by
//! the demo binary and the trainer's integration tests.

mod knn;
mod logistic;

pub use knn::KnnClassifier;
pub use logistic::LogisticRegression;
