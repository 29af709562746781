//! Error types for reading schema sources and build configuration.

use std::path::PathBuf;

use field_schema_core::SchemaError;
use thiserror::Error;

/// Errors that can occur while loading build inputs.
#[derive(Debug, Error)]
pub enum LoaderError {
    /// File I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing or serialization failure.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A file that could be read but not parsed as the expected document.
    #[error("invalid document {}: {message}", path.display())]
    InvalidDocument { path: PathBuf, message: String },

    /// Resolution of the loaded documents failed.
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// No schema documents were found under the configured paths.
    #[error("no schema files found in {0}")]
    NoSchemaFiles(String),

    /// Configuration that parses but cannot be used.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Convenience alias for results with [`LoaderError`].
pub type Result<T> = std::result::Result<T, LoaderError>;
