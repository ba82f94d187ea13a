//! Configuration parsing errors.

use pipewright_core::ValueKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("KDL parse error: {0}")]
    Parse(#[from] kdl::KdlError),

    #[error("missing required field: {0}")]
    MissingField(String),

    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("duplicate definition: {0}")]
    Duplicate(String),

    #[error("invalid reference: {0}")]
    InvalidReference(String),

    #[error("cycle detected in dependencies: {0}")]
    CycleDetected(String),

    #[error("cannot merge field '{field}' of scope '{scope}': unsupported type {kind}")]
    Type {
        scope: String,
        field: String,
        kind: ValueKind,
    },

    #[error("IO error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl ConfigError {
    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        ConfigError::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

pub(crate) fn read_file(path: &std::path::Path) -> ConfigResult<String> {
    std::fs::read_to_string(path).map_err(|e| ConfigError::io(path, e))
}
