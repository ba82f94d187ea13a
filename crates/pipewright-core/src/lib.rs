//! Core domain types and traits for the Pipewright pipeline compiler.
//!
//! This crate contains:
//! - Configuration values and resolved per-job settings
//! - Job definitions, job configs and compiled job nodes
//! - Resource limits and the GPU tier table
//! - Collaborator traits (execution engine, version control, secrets)
//! - Dependency graph validation

pub mod engine;
pub mod error;
pub mod graph;
pub mod id;
pub mod job;
pub mod resources;
pub mod secret;
pub mod value;
pub mod vcs;

pub use error::{Error, Result};
pub use id::SubmissionId;
pub use value::{ConfigValue, ResolvedSettings, ValueKind};
