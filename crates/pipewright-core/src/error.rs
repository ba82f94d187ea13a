//! Error types for pipeline compilation.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("job '{job}': unknown gpu_size '{tier}'")]
    UnknownGpuTier { job: String, tier: String },

    #[error("job '{job}' requires '{upstream}', which has not been constructed")]
    MissingUpstream { job: String, upstream: String },

    #[error("revision resolution failed: {0}")]
    RevisionResolution(String),

    #[error("cycle detected in dependencies: {0}")]
    CycleDetected(String),

    #[error("job '{job}': invalid setting '{field}': {message}")]
    InvalidSettings {
        job: String,
        field: String,
        message: String,
    },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("secret resolution failed: {0}")]
    Secret(String),

    #[error("execution engine error: {0}")]
    Engine(String),
}

pub type Result<T> = std::result::Result<T, Error>;
