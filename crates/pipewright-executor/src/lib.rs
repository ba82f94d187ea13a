//! Execution engine backends for Pipewright.
//!
//! Provides engine implementations for compiled pipelines:
//! - Kubernetes manifests (batch/v1 Jobs with volume claims)

pub mod kubernetes;

pub use kubernetes::KubernetesManifests;
pub use pipewright_core::engine::{ArtifactHandle, ContainerSpec, ExecutionEngine, NodeHandle};
