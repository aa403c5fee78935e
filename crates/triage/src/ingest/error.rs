//! Error types for acquisition ingestion

use std::io;
use std::path::PathBuf;
use thiserror::Error;
use triage_db::BackendError;

/// Problems reading the results manifest.
#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("Cannot find {file} in {}", .dir.display())]
    Missing { file: String, dir: PathBuf },

    #[error("File does not contain enough fields at line {line}, got {actual}, expecting {expected}")]
    FieldCount {
        line: usize,
        actual: usize,
        expected: usize,
    },

    #[error("Invalid {field} '{value}' at line {line}")]
    InvalidNumber {
        line: usize,
        field: &'static str,
        value: String,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Ingestion error type
#[derive(Error, Debug)]
pub enum IngestError {
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error("Database error: {0}")]
    Database(#[from] BackendError),

    #[error("Failed to copy directory {} to {}: {source}", .src.display(), .dest.display())]
    Copy {
        src: PathBuf,
        dest: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to add report {}. Reason= {reason}", .path.display())]
    Report { path: PathBuf, reason: String },

    #[error("Fail to get canonical path for {0}")]
    CanonicalPath(String),

    #[error("Directory {} does not contain any images", .0.display())]
    RootMissing(PathBuf),

    #[error("Cannot find data source for image {0}")]
    DataSourceNotFound(String),

    #[error("Ingestion cancelled")]
    Cancelled,

    #[error("Failed to add interesting files: {0}")]
    Tagging(String),

    #[error("Image ingestion failed: {0}")]
    SubTask(String),

    #[error("Invalid settings: {0}")]
    Settings(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, IngestError>;
