//! KDL configuration parsing for Pipewright.
//!
//! This crate handles parsing of:
//! - Parameter documents (`all` plus one scope per job) and their resolution
//! - Per-job configs (job.kdl)
//! - Credentials
//! - Pipeline definitions

pub mod credentials;
pub mod error;
pub mod job;
pub mod params;
pub mod pipeline;
mod value;

pub use credentials::Credentials;
pub use error::{ConfigError, ConfigResult};
pub use params::{ParameterDocument, load_parameters, parse_parameters, resolve_parameters};
pub use pipeline::PipelineDocument;
