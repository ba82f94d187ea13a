//! Execution engine collaborator.
//!
//! The engine owns scheduling, volumes and container lifetimes. The
//! compiler only describes nodes and their wiring through this trait.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::Result;
use crate::resources::ResourceLimits;

/// Everything the engine needs to create a container node.
#[derive(Debug, Clone, Serialize)]
pub struct ContainerSpec<'a> {
    pub name: &'a str,
    pub image: &'a str,
    pub command: Vec<String>,
    pub env: &'a BTreeMap<String, String>,
    pub resources: &'a ResourceLimits,
}

/// Engine-issued reference to a created node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeHandle {
    /// Engine-specific identifier (e.g., manifest name).
    pub id: String,
    /// Job name the node was created for.
    pub job: String,
}

/// Engine-issued reference to a node's output artifact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactHandle {
    /// Engine-specific identifier (e.g., volume claim name).
    pub id: String,
    /// Job that produces the artifact.
    pub producer: String,
}

/// Trait for execution engines consuming a compiled pipeline.
pub trait ExecutionEngine {
    /// Name of this engine.
    fn name(&self) -> &'static str;

    /// Create a node running `spec`.
    fn create_node(&mut self, spec: ContainerSpec<'_>) -> Result<NodeHandle>;

    /// `consumer` may not start before `producer` completes.
    fn declare_dependency(&mut self, consumer: &NodeHandle, producer: &NodeHandle) -> Result<()>;

    /// Mount `source` into `node` at `path`.
    fn mount_artifact(&mut self, node: &NodeHandle, path: &str, source: &ArtifactHandle)
    -> Result<()>;

    /// Declare the node's single output artifact.
    fn declare_output_artifact(&mut self, node: &NodeHandle) -> Result<ArtifactHandle>;
}
