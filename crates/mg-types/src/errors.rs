use thiserror::Error;

/// Main error type for the ModelGym system
#[derive(Error, Debug)]
pub enum MgError {
    #[error("Duplicate model space name: {name}")]
    DuplicateName { name: String },

    #[error("Data error: {0}")]
    Data(#[from] DataError),

    #[error("Optimizer error: {0}")]
    Optimizer(#[from] OptimizerError),

    #[error("Evaluation error: {0}")]
    Evaluation(#[from] EvaluationError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

/// Dataset and cross-validation errors
#[derive(Error, Debug)]
pub enum DataError {
    #[error("Dataset is empty")]
    Empty,

    #[error("Feature/label length mismatch: {features} rows, {labels} labels")]
    LengthMismatch { features: usize, labels: usize },

    #[error("Ragged feature matrix: row {row} has {found} columns, expected {expected}")]
    RaggedRows {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("Cannot split {samples} samples into {folds} folds")]
    InvalidFolds { samples: usize, folds: usize },

    #[error("Categorical column index {index} out of range for {columns} columns")]
    InvalidCategoricalColumn { index: usize, columns: usize },
}

/// Surrogate-optimizer errors
#[derive(Error, Debug)]
pub enum OptimizerError {
    #[error("Search space has no dimensions")]
    EmptySpace,

    #[error("Invalid dimension {name}: {message}")]
    InvalidDimension { name: String, message: String },

    #[error("Batch size must be at least 1")]
    InvalidBatchSize,

    #[error("Told {points} points but {values} values")]
    LengthMismatch { points: usize, values: usize },

    #[error("Point outside the search space: {message}")]
    PointOutOfSpace { message: String },

    #[error("Surrogate model failure: {message}")]
    Surrogate { message: String },
}

/// Errors raised while training or scoring a single candidate
#[derive(Error, Debug)]
pub enum EvaluationError {
    #[error("Invalid parameter {name}: {message}")]
    InvalidParameter { name: String, message: String },

    #[error("Model {model} failed to fit: {message}")]
    FitFailed { model: String, message: String },

    #[error("Model {model} failed to predict: {message}")]
    PredictFailed { model: String, message: String },

    #[error("Metric {metric} failed: {message}")]
    MetricFailed { metric: String, message: String },

    #[error("Evaluation dispatch failed: {message}")]
    Dispatch { message: String },

    #[error("Evaluation task panicked: {message}")]
    TaskPanicked { message: String },
}

/// Result type alias for ModelGym operations
pub type MgResult<T> = Result<T, MgError>;

/// Macro for creating validation errors
#[macro_export]
macro_rules! validation_error {
    ($($arg:tt)*) => {
        $crate::MgError::Validation(format!($($arg)*))
    };
}

/// Macro for creating internal errors
#[macro_export]
macro_rules! internal_error {
    ($($arg:tt)*) => {
        $crate::MgError::Internal(format!($($arg)*))
    };
}

/// Macro for creating configuration errors
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::MgError::Config(format!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = DataError::InvalidFolds {
            samples: 2,
            folds: 5,
        };

        assert!(error.to_string().contains("2 samples"));
        assert!(error.to_string().contains("5 folds"));

        let duplicate = MgError::DuplicateName {
            name: "KnnClassifier".to_string(),
        };
        assert!(duplicate.to_string().contains("KnnClassifier"));
    }

    #[test]
    fn test_error_conversion() {
        let optimizer_error = OptimizerError::LengthMismatch {
            points: 2,
            values: 1,
        };
        let mg_error: MgError = optimizer_error.into();

        match mg_error {
            MgError::Optimizer(OptimizerError::LengthMismatch { points: 2, values: 1 }) => (),
            other => panic!("Expected Optimizer error, got {other:?}"),
        }
    }

    #[test]
    fn test_macros() {
        let validation_err = validation_error!("Invalid value: {}", 42);
        assert!(matches!(validation_err, MgError::Validation(ref m) if m == "Invalid value: 42"));
        assert!(matches!(internal_error!("Something went wrong"), MgError::Internal(_)));
        assert!(matches!(
            config_error!("Missing required field: {}", "opt_evals"),
            MgError::Config(ref m) if m.contains("opt_evals")
        ));
    }
}
