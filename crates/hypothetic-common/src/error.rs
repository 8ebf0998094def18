//! Error types shared by every hypothetic crate.

use thiserror::Error;

/// Result type alias using HypotheticError.
pub type HypotheticResult<T> = Result<T, HypotheticError>;

/// Primary error type for dataset assembly.
#[derive(Debug, Error)]
pub enum HypotheticError {
    // === Fatal, never retried ===
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Failed to find template cube: {0}")]
    TemplateNotFound(String),

    #[error("Invalid partition index: {0}")]
    PartitionIndex(String),

    // === Per-object failures ===
    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("I/O failure: {0}")]
    IoFailure(String),

    #[error("Failed to read cube: {0}")]
    CubeRead(String),

    // === Aggregate layer ===
    #[error("Aggregate build failed: {0}")]
    Aggregate(String),
}

impl HypotheticError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn io_failure(msg: impl Into<String>) -> Self {
        Self::IoFailure(msg.into())
    }

    pub fn cube_read(msg: impl Into<String>) -> Self {
        Self::CubeRead(msg.into())
    }

    pub fn partition_index(msg: impl Into<String>) -> Self {
        Self::PartitionIndex(msg.into())
    }

    /// Whether a failure while probing one candidate object should move the
    /// template scan on to the next row instead of aborting it.
    pub fn is_recoverable_probe_failure(&self) -> bool {
        matches!(
            self,
            HypotheticError::NotFound(_) | HypotheticError::IoFailure(_) | HypotheticError::CubeRead(_)
        )
    }

    /// Short label used for log fields and metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            HypotheticError::Configuration(_) => "configuration",
            HypotheticError::TemplateNotFound(_) => "template_not_found",
            HypotheticError::PartitionIndex(_) => "partition_index",
            HypotheticError::NotFound(_) => "not_found",
            HypotheticError::IoFailure(_) => "io_failure",
            HypotheticError::CubeRead(_) => "cube_read",
            HypotheticError::Aggregate(_) => "aggregate",
        }
    }
}

impl From<std::io::Error> for HypotheticError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => HypotheticError::NotFound(err.to_string()),
            _ => HypotheticError::IoFailure(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for HypotheticError {
    fn from(err: serde_json::Error) -> Self {
        HypotheticError::Configuration(format!("JSON error: {}", err))
    }
}
