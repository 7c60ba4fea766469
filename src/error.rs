use chrono::NaiveDate;
use thiserror::Error;

/// Errors raised by the pipeline components.
///
/// Empty upstream data and short feature tables are not errors: they flow
/// through the pipeline as empty series and empty example sets.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A configuration value is missing, malformed or inconsistent.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A provider bar carried a timestamp that cannot be mapped to a date.
    #[error("Invalid bar timestamp: {0} ms")]
    InvalidTimestamp(i64),

    /// Every value of a column is missing, so there is nothing to impute from.
    #[error("Column `{column}` has no known values to impute from")]
    AllValuesMissing { column: String },

    /// A series expected to be gap-free still has a hole in it.
    #[error("Column `{column}` is missing a value on {date}")]
    MissingValue { column: &'static str, date: NaiveDate },

    #[error("Window parameters must be positive (n_previous_days={n_previous_days}, step_size={step_size})")]
    InvalidWindow {
        n_previous_days: usize,
        step_size: usize,
    },

    #[error("Feature matrix shape mismatch")]
    Shape(#[from] ndarray::ShapeError),

    #[error("I/O error")]
    Io(#[from] std::io::Error),

    #[error("CSV error")]
    Csv(#[from] csv::Error),
}
