//! Error types for sweep-db
//!
//! Expected non-error conditions (duplicate experiment ids on merge) are
//! ordinary return values, not variants here.

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// sweep-db error types
#[derive(Error, Debug)]
pub enum Error {
    /// Simulator log text does not match any record shape
    #[error("malformed simulator log at line {line}: {message}")]
    MalformedLog {
        /// Zero-based index of the offending line
        line: usize,
        /// What the parser expected at that line
        message: String,
    },

    /// Template text does not match the template grammar
    #[error("malformed template at line {line}: {message}")]
    MalformedTemplate {
        /// Zero-based index of the offending line
        line: usize,
        /// What the template loader expected at that line
        message: String,
    },

    /// Axis arrays disagree between matrices, or log time buckets disagree
    /// on their observable set
    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),

    /// Wrong configuration/data dimensions passed to the store
    #[error("shape mismatch: expected {expected}, got {actual}")]
    ShapeMismatch {
        /// Dimensions the matrix schema requires
        expected: String,
        /// Dimensions the caller supplied
        actual: String,
    },

    /// No `BIND-PARAMETER` line found for a schema parameter
    #[error("parameter '{0}' is not bound in the configuration text")]
    ParameterNotBound(String),

    /// A `BIND-PARAMETER` value that does not parse as a float
    #[error("parameter '{name}' is bound to '{token}', which is not a number")]
    InvalidBinding {
        /// Parameter name from the schema
        name: String,
        /// The unparseable token
        token: String,
    },

    /// Substitution was asked to realize a template without a value for
    /// a declared parameter
    #[error("no binding supplied for template parameter '{0}'")]
    MissingBinding(String),

    /// Dataset directory contents do not match the supplied template
    #[error("template mismatch: {0}")]
    TemplateMismatch(String),

    /// Dataset directory is missing or malformed
    #[error("dataset error: {0}")]
    Dataset(String),

    /// Snapshot container is missing required metadata or columns
    #[error("snapshot error: {0}")]
    Snapshot(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Arrow error
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// Parquet error
    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),
}
