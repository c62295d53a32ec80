//! SDK error types

use thiserror::Error;

/// SDK error type
#[derive(Error, Debug)]
pub enum SdkError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Source data could not be read or typed
    #[error("Source error: {0}")]
    SourceError(String),

    /// No feature set registered under this name
    #[error("Unknown feature set: {0}")]
    UnknownFeatureSet(String),

    /// Lookup on a feature set without a key-value target
    #[error("Feature set '{0}' has no key-value target")]
    NoKeyValueTarget(String),

    /// Runtime error
    #[error("Runtime error: {0}")]
    RuntimeError(#[from] fstore_runtime::RuntimeError),

    /// Core type error
    #[error("Core error: {0}")]
    CoreError(#[from] fstore_core::CoreError),

    /// YAML error
    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// CSV error
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Result type for SDK operations
pub type Result<T> = std::result::Result<T, SdkError>;
