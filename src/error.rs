//! Error types for building and publishing the R1 dataset.

use thiserror::Error;

/// Result type alias for dataset operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// I/O errors.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors raised while reading or writing frames.
    #[error("Polars error: {0}")]
    Polars(#[from] polars::prelude::PolarsError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Transport-level HTTP failures.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// HuggingFace Hub errors (API rejections, missing files).
    #[error("Hub error: {0}")]
    Hub(String),

    /// Output frame does not match the declared features.
    #[error("Schema error: {0}")]
    Schema(String),

    /// A source row could not be turned into an example.
    #[error("Invalid row {row}: {reason}")]
    InvalidRow { row: usize, reason: String },

    #[error("Mapping error: {0}")]
    Mapping(String),

    #[error("Split error: {0}")]
    Split(String),
}

impl Error {
    pub(crate) fn invalid_row(row: usize, reason: impl Into<String>) -> Self {
        Self::InvalidRow {
            row,
            reason: reason.into(),
        }
    }
}

impl From<hf_hub::api::sync::ApiError> for Error {
    fn from(value: hf_hub::api::sync::ApiError) -> Self {
        Self::Hub(value.to_string())
    }
}
