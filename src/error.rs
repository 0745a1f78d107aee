use serde::Serialize;
use thiserror::Error;

/// Pipeline stage an error was raised in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Stage {
    Ingestion,
    Schema,
    Calendar,
    Fields,
    Aggregation,
    Layout,
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Schema error: unnamed column (raw name '{0}' is empty after cleaning)")]
    UnnamedColumn(String),

    #[error("Schema error: column collision on '{canonical}' (from '{first}' and '{second}')")]
    ColumnCollision {
        canonical: String,
        first: String,
        second: String,
    },

    #[error("Schema error: unexpected column '{column}' in row {row}")]
    UnexpectedColumn { column: String, row: usize },

    #[error("Schema error: missing required column '{0}'")]
    MissingColumn(String),

    #[error("Schema error: column '{0}' has no declared type")]
    UndeclaredColumn(String),

    #[error("Schema error: cannot infer a type for column '{0}' (all values are null)")]
    AmbiguousColumnType(String),

    #[error("Schema error: column '{column}' is declared {declared} but row {row} holds '{found}'")]
    TypeMismatch {
        column: String,
        declared: String,
        row: usize,
        found: String,
    },

    #[error("Field error: {consumer} references missing field '{field}'")]
    MissingField { consumer: String, field: String },

    #[error("Field error: field '{field}' in row {row} is not numeric")]
    NonNumericField { field: String, row: usize },

    #[error("Field error: no metrics requested for aggregation")]
    NoMetricsRequested,

    #[error("Value error: timestamp field '{0}' is missing")]
    MissingTimestampField(String),

    #[error("Value error: timestamp field '{field}' in row {row}: {details}")]
    InvalidTimestamp {
        field: String,
        row: usize,
        details: String,
    },

    #[error("Invalid layout column count {0}: must be at least 1")]
    InvalidColumnCount(usize),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl PipelineError {
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::UnnamedColumn(_)
            | PipelineError::ColumnCollision { .. }
            | PipelineError::UnexpectedColumn { .. }
            | PipelineError::MissingColumn(_)
            | PipelineError::UndeclaredColumn(_)
            | PipelineError::AmbiguousColumnType(_)
            | PipelineError::TypeMismatch { .. } => Stage::Schema,
            PipelineError::MissingField { .. } | PipelineError::NonNumericField { .. } => {
                Stage::Fields
            }
            PipelineError::NoMetricsRequested => Stage::Aggregation,
            PipelineError::MissingTimestampField(_) | PipelineError::InvalidTimestamp { .. } => {
                Stage::Calendar
            }
            PipelineError::InvalidColumnCount(_) => Stage::Layout,
            PipelineError::Csv(_)
            | PipelineError::SerializationError(_)
            | PipelineError::IoError(_) => Stage::Ingestion,
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
