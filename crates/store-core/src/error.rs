use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors produced by the pipeline stages.
#[derive(Error, Debug)]
pub enum StoreError {
    /// A file could not be opened or read from disk.
    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A file could not be created or written.
    #[error("Failed to write file {path}: {source}")]
    FileWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The CSV layer failed in a way that is not confined to one row.
    #[error("CSV error in {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    /// A required column is absent from a file header.
    #[error("Missing column \"{column}\" in {path}")]
    MissingColumn { path: PathBuf, column: String },

    /// The SQLite destination rejected an operation.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A pre-flight check on a path did not pass.
    #[error("Pre-flight check failed for {path}: {reason}")]
    Preflight { path: PathBuf, reason: String },

    /// A configuration value is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A JSON document could not be produced or parsed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Pass-through for any raw I/O error that does not carry a path.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Catch-all for errors from third-party crates via `anyhow`.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Convenience alias used throughout the store crates.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Why a single input row was rejected.
///
/// Row errors never abort a stage; they are logged and counted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RowError {
    #[error("missing value for {0}")]
    Missing(&'static str),

    #[error("{field}: \"{value}\" is not an integer")]
    InvalidInteger { field: &'static str, value: String },

    #[error("{field}: \"{value}\" is not a currency amount")]
    InvalidCurrency { field: &'static str, value: String },

    #[error("{field}: \"{value}\" is not a recognised date")]
    InvalidDate { field: &'static str, value: String },

    #[error("{field}: {value} is out of range")]
    OutOfRange { field: &'static str, value: String },

    #[error("malformed record: {0}")]
    Malformed(String),
}
