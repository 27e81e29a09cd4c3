//! Error types for hhprep.

use std::path::PathBuf;

/// Result type alias for hhprep operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can abort a preprocessing run.
///
/// Per-cell problems (an unparsable salary, a bad date) never surface here;
/// they become missing values inside the pipeline. Only structural problems
/// that would make the output wrong are reported.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// I/O error during file operations.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        /// The path where the error occurred, if known.
        path: Option<PathBuf>,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Arrow error during batch processing.
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// CSV tokenizer error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid configuration.
    #[error("Invalid configuration: {message}")]
    InvalidConfig {
        /// Description of the configuration error.
        message: String,
    },

    /// Input could not be decoded or tokenized.
    #[error("Parse error: {message}")]
    Parse {
        /// Description of the parse error.
        message: String,
    },

    /// No encoding/engine combination could read the input.
    #[error("Failed to read CSV {path:?}: {source}")]
    ReadExhausted {
        /// The input file.
        path: PathBuf,
        /// The error raised by the last combination tried.
        #[source]
        source: Box<Error>,
    },

    /// The target column does not exist after parsing.
    #[error("Target column '{target}' not found after parsing. Available: {available:?}")]
    TargetNotFound {
        /// The configured target column.
        target: String,
        /// Columns present in the working batch.
        available: Vec<String>,
    },

    /// The fit pass produced no usable rows.
    #[error("No data produced by pipeline. Check input/filters/target parsing.")]
    EmptyResult,

    /// A batch diverged structurally from what the encoder expects.
    #[error("Schema mismatch: {message}")]
    SchemaMismatch {
        /// Description of the schema mismatch.
        message: String,
    },

    /// Invalid write into the output arrays.
    #[error("Write error: {message}")]
    Write {
        /// Description of the write error.
        message: String,
    },

    /// The number of rows written differs from the allocated shape.
    #[error("Row count mismatch: expected {expected} rows, got {actual}")]
    RowCountMismatch {
        /// Rows counted in the fit pass.
        expected: usize,
        /// Rows actually written.
        actual: usize,
    },
}

impl Error {
    /// Create an I/O error with a path context.
    pub fn io(source: std::io::Error, path: impl Into<PathBuf>) -> Self {
        Self::Io {
            path: Some(path.into()),
            source,
        }
    }

    /// Create an invalid configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Create a parse error.
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    /// Create a schema mismatch error.
    pub fn schema_mismatch(message: impl Into<String>) -> Self {
        Self::SchemaMismatch {
            message: message.into(),
        }
    }

    /// Create a write error.
    pub fn write(message: impl Into<String>) -> Self {
        Self::Write {
            message: message.into(),
        }
    }

    /// Create a read exhaustion error wrapping the last failure.
    pub fn read_exhausted(path: impl Into<PathBuf>, last: Error) -> Self {
        Self::ReadExhausted {
            path: path.into(),
            source: Box::new(last),
        }
    }
}
