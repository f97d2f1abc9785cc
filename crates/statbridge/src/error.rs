//! Error types for the statbridge library.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for statbridge operations.
#[derive(Debug, Error)]
pub enum StatBridgeError {
    /// Error reading or accessing a file.
    #[error("IO error for '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Error from the CSV library.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// No encoding/delimiter combination produced a readable header.
    #[error("Failed to read CSV header (tried {attempted:?}): {message}")]
    HeaderRead {
        attempted: Vec<String>,
        message: String,
    },

    /// A client-supplied column token did not match any header.
    #[error("Cannot find column '{token}'. Available columns: {available:?}")]
    ColumnNotFound {
        token: String,
        available: Vec<String>,
    },

    /// The engine failed under every encoding candidate.
    #[error("Analysis failed after trying encodings {attempted:?}: {last_error}")]
    EngineCall {
        attempted: Vec<String>,
        last_error: String,
    },

    /// The engine failed with an error that retrying cannot fix.
    #[error("Analysis failed (encoding {encoding}): {message}")]
    EngineAborted { encoding: String, message: String },

    /// The engine could not be loaded or introspected.
    #[error("Engine load error: {0}")]
    EngineLoad(String),

    /// An engine call exceeded its time budget.
    #[error("Engine call timed out after {seconds}s")]
    EngineTimeout { seconds: u64 },

    /// Reading or writing dataset metadata failed.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// No stored dataset with this id.
    #[error("Dataset not found: {0}")]
    DatasetNotFound(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Empty file or no data to analyze.
    #[error("Empty data: {0}")]
    EmptyData(String),
}

impl StatBridgeError {
    /// Wrap an I/O error with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StatBridgeError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type alias for statbridge operations.
pub type Result<T> = std::result::Result<T, StatBridgeError>;
