//! Error taxonomies for the generation pipeline.

use std::path::PathBuf;
use thiserror::Error;

use crate::form::FormError;
use crate::report::RunStatus;

/// Failures loading the field mapping registry.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read field mappings {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed field mappings: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Batch-fatal failures. Each is reported before any output is produced.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("Invalid subject selected: {0}")]
    InvalidSubject(String),

    #[error("Failed to load CSV file: {0}")]
    MalformedInput(String),

    #[error("Failed to load PDF template: {0}")]
    UnreadableTemplate(String),

    /// Every required column absent from the roster, in mapping order.
    #[error("Missing columns in CSV file: {}", .0.join(", "))]
    MissingColumns(Vec<String>),
}

impl BatchError {
    pub fn status(&self) -> RunStatus {
        match self {
            BatchError::InvalidSubject(_) => RunStatus::InvalidSubject,
            BatchError::MalformedInput(_) | BatchError::UnreadableTemplate(_) => {
                RunStatus::MalformedInput
            }
            BatchError::MissingColumns(_) => RunStatus::MissingColumns,
        }
    }
}

/// Row-level failures. These never propagate past the row loop.
#[derive(Debug, Error)]
pub enum RowError {
    #[error("{column} value {value:?} is not usable as a file name")]
    InvalidName { column: String, value: String },

    #[error("form population failed: {0}")]
    Form(#[from] FormError),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("rasterization failed: {0:#}")]
    Raster(anyhow::Error),
}
