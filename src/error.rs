use chrono::NaiveDateTime;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, FetchError>;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Date parsing error: {0}")]
    DateParse(#[from] chrono::ParseError),

    #[error("Parquet write error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Configuration source error: {0}")]
    ConfigSource(#[from] config::ConfigError),

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("Fetch for {start} - {end} did not deliver {missing} of {expected} results within {deadline:?}")]
    FetchTimeout {
        start: NaiveDateTime,
        end: NaiveDateTime,
        expected: usize,
        missing: usize,
        deadline: Duration,
    },

    #[error("Upstream fetch failed for pattern '{pattern}': {message}")]
    Upstream { pattern: String, message: String },

    #[error("Merged data failed validation: {0}")]
    MergeValidation(String),

    #[error("Path is not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("Missing nearby data for {time} - point_id {point_id} - fxx {fxx} nearby: {found}")]
    InterpolationInsufficientData {
        time: NaiveDateTime,
        point_id: u32,
        fxx: u32,
        found: usize,
    },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid data format: {0}")]
    InvalidFormat(String),

    #[error("Async task error: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),
}

impl FetchError {
    /// Errors that must stop the whole run rather than a single interval.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            FetchError::Configuration(_)
                | FetchError::ConfigSource(_)
                | FetchError::Validation(_)
                | FetchError::NotADirectory(_)
        )
    }
}
