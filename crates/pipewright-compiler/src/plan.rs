//! In-memory execution engine that records a serializable plan.

use std::collections::{BTreeMap, HashMap};

use pipewright_core::engine::{ArtifactHandle, ContainerSpec, ExecutionEngine, NodeHandle};
use pipewright_core::resources::ResourceLimits;
use pipewright_core::{Error, Result};
use serde::Serialize;

/// A recorded pipeline: what an engine was asked to create, in order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExecutionPlan {
    pub pipeline: String,
    pub nodes: Vec<PlannedNode>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlannedNode {
    pub name: String,
    pub image: String,
    pub command: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub resources: ResourceLimits,
    pub depends_on: Vec<String>,
    pub mounts: Vec<PlannedMount>,
    /// Artifact produced by this node.
    pub output: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedMount {
    pub path: String,
    pub artifact: String,
}

impl ExecutionPlan {
    pub fn node(&self, name: &str) -> Option<&PlannedNode> {
        self.nodes.iter().find(|n| n.name == name)
    }
}

/// Records engine calls into an [`ExecutionPlan`].
#[derive(Debug, Default)]
pub struct PlanRecorder {
    plan: ExecutionPlan,
    index: HashMap<String, usize>,
}

impl PlanRecorder {
    pub fn new(pipeline: impl Into<String>) -> Self {
        Self {
            plan: ExecutionPlan {
                pipeline: pipeline.into(),
                nodes: Vec::new(),
            },
            index: HashMap::new(),
        }
    }

    pub fn plan(&self) -> &ExecutionPlan {
        &self.plan
    }

    pub fn into_plan(self) -> ExecutionPlan {
        self.plan
    }

    fn node_mut(&mut self, handle: &NodeHandle) -> Result<&mut PlannedNode> {
        let idx = *self
            .index
            .get(&handle.id)
            .ok_or_else(|| Error::Engine(format!("unknown node handle '{}'", handle.id)))?;
        Ok(&mut self.plan.nodes[idx])
    }

    fn artifact_name(job: &str) -> String {
        format!("{}-output", job)
    }
}

impl ExecutionEngine for PlanRecorder {
    fn name(&self) -> &'static str {
        "plan"
    }

    fn create_node(&mut self, spec: ContainerSpec<'_>) -> Result<NodeHandle> {
        if self.index.contains_key(spec.name) {
            return Err(Error::Engine(format!("node '{}' already exists", spec.name)));
        }

        self.index.insert(spec.name.to_string(), self.plan.nodes.len());
        self.plan.nodes.push(PlannedNode {
            name: spec.name.to_string(),
            image: spec.image.to_string(),
            command: spec.command,
            env: spec.env.clone(),
            resources: spec.resources.clone(),
            depends_on: Vec::new(),
            mounts: Vec::new(),
            output: None,
        });

        Ok(NodeHandle {
            id: spec.name.to_string(),
            job: spec.name.to_string(),
        })
    }

    fn declare_dependency(&mut self, consumer: &NodeHandle, producer: &NodeHandle) -> Result<()> {
        if !self.index.contains_key(&producer.id) {
            return Err(Error::Engine(format!("unknown node handle '{}'", producer.id)));
        }
        let node = self.node_mut(consumer)?;
        if !node.depends_on.contains(&producer.job) {
            node.depends_on.push(producer.job.clone());
        }
        Ok(())
    }

    fn mount_artifact(
        &mut self,
        node: &NodeHandle,
        path: &str,
        source: &ArtifactHandle,
    ) -> Result<()> {
        let node = self.node_mut(node)?;
        if node.mounts.iter().any(|m| m.path == path) {
            return Err(Error::Engine(format!(
                "node '{}' already has a mount at {}",
                node.name, path
            )));
        }
        node.mounts.push(PlannedMount {
            path: path.to_string(),
            artifact: source.id.clone(),
        });
        Ok(())
    }

    fn declare_output_artifact(&mut self, node: &NodeHandle) -> Result<ArtifactHandle> {
        let planned = self.node_mut(node)?;
        if planned.output.is_some() {
            return Err(Error::Engine(format!(
                "node '{}' already declares an output",
                planned.name
            )));
        }
        let id = Self::artifact_name(&planned.name);
        planned.output = Some(id.clone());
        Ok(ArtifactHandle {
            id,
            producer: node.job.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipewright_core::resources::DEFAULT_OUTPUT_SIZE;

    fn limits() -> ResourceLimits {
        ResourceLimits {
            memory: "1G".to_string(),
            cpu: "1".to_string(),
            gpu: None,
            output_size: DEFAULT_OUTPUT_SIZE.to_string(),
        }
    }

    fn create(recorder: &mut PlanRecorder, name: &str) -> NodeHandle {
        let env = BTreeMap::new();
        let resources = limits();
        recorder
            .create_node(ContainerSpec {
                name,
                image: "alpine",
                command: vec!["true".to_string()],
                env: &env,
                resources: &resources,
            })
            .unwrap()
    }

    #[test]
    fn test_records_nodes_in_order() {
        let mut recorder = PlanRecorder::new("p");
        create(&mut recorder, "a");
        create(&mut recorder, "b");

        let names: Vec<_> = recorder.plan().nodes.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_duplicate_node_rejected() {
        let mut recorder = PlanRecorder::new("p");
        create(&mut recorder, "a");
        let env = BTreeMap::new();
        let resources = limits();
        let result = recorder.create_node(ContainerSpec {
            name: "a",
            image: "alpine",
            command: vec![],
            env: &env,
            resources: &resources,
        });
        assert!(matches!(result, Err(Error::Engine(_))));
    }

    #[test]
    fn test_single_output_per_node() {
        let mut recorder = PlanRecorder::new("p");
        let a = create(&mut recorder, "a");

        let output = recorder.declare_output_artifact(&a).unwrap();
        assert_eq!(output.id, "a-output");
        assert!(recorder.declare_output_artifact(&a).is_err());
    }

    #[test]
    fn test_mount_path_collision_rejected() {
        let mut recorder = PlanRecorder::new("p");
        let a = create(&mut recorder, "a");
        let b = create(&mut recorder, "b");
        let out = recorder.declare_output_artifact(&a).unwrap();

        recorder.mount_artifact(&b, "/input/a", &out).unwrap();
        assert!(recorder.mount_artifact(&b, "/input/a", &out).is_err());
    }

    #[test]
    fn test_unknown_handle_rejected() {
        let mut recorder = PlanRecorder::new("p");
        let a = create(&mut recorder, "a");
        let ghost = NodeHandle {
            id: "ghost".to_string(),
            job: "ghost".to_string(),
        };
        assert!(recorder.declare_dependency(&a, &ghost).is_err());
        assert!(recorder.declare_output_artifact(&ghost).is_err());
    }

    #[test]
    fn test_plan_serializes() {
        let mut recorder = PlanRecorder::new("p");
        let a = create(&mut recorder, "a");
        recorder.declare_output_artifact(&a).unwrap();

        let json = serde_json::to_value(recorder.plan()).unwrap();
        assert_eq!(json["pipeline"], "p");
        assert_eq!(json["nodes"][0]["output"], "a-output");
        assert_eq!(json["nodes"][0]["resources"]["memory"], "1G");
    }
}
