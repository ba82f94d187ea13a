//! The compiled job graph and its registration with an execution engine.

use std::collections::{BTreeMap, HashMap};

use pipewright_core::engine::{ArtifactHandle, ContainerSpec, ExecutionEngine, NodeHandle};
use pipewright_core::graph::validate_dag;
use pipewright_core::job::{JobConfig, JobDefinition, JobNode};
use pipewright_core::{Error, ResolvedSettings, Result};
use tracing::{debug, info};

use crate::builder::{BuildContext, build_node};

/// Job nodes in construction order, each after everything it requires.
#[derive(Debug, Clone, Default)]
pub struct JobGraph {
    nodes: Vec<JobNode>,
    index: HashMap<String, usize>,
}

/// Engine handles for one registered node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredNode {
    pub node: NodeHandle,
    pub output: ArtifactHandle,
}

/// Result of registering a graph: handles per job name.
#[derive(Debug, Clone, Default)]
pub struct RegisteredGraph {
    pub nodes: BTreeMap<String, RegisteredNode>,
}

impl JobGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile a pipeline.
    ///
    /// Names and the `requires` relation are validated before any node is
    /// built, and nodes are built in the order given. Any error discards the
    /// whole graph.
    pub fn compile(
        definitions: &[JobDefinition],
        settings: &BTreeMap<String, ResolvedSettings>,
        configs: &HashMap<String, JobConfig>,
        ctx: &BuildContext<'_>,
    ) -> Result<Self> {
        validate_dag(definitions)?;

        let empty = ResolvedSettings::default();
        let mut graph = Self::new();

        for definition in definitions {
            let config = configs.get(&definition.name).ok_or_else(|| {
                Error::InvalidInput(format!("no job config loaded for '{}'", definition.name))
            })?;
            let job_settings = settings.get(&definition.name).unwrap_or(&empty);

            let node = build_node(definition, job_settings, config, &graph, ctx)?;
            graph.insert(node)?;
        }

        info!(jobs = graph.len(), edges = graph.edge_count(), "Compiled job graph");
        Ok(graph)
    }

    /// Add a node whose upstream jobs are already present.
    pub fn insert(&mut self, node: JobNode) -> Result<()> {
        if self.index.contains_key(&node.name) {
            return Err(Error::InvalidInput(format!(
                "job '{}' is defined more than once",
                node.name
            )));
        }
        if let Some(upstream) = node.requires.iter().find(|r| !self.index.contains_key(*r)) {
            return Err(Error::MissingUpstream {
                job: node.name.clone(),
                upstream: upstream.clone(),
            });
        }

        self.index.insert(node.name.clone(), self.nodes.len());
        self.nodes.push(node);
        Ok(())
    }

    pub fn nodes(&self) -> &[JobNode] {
        &self.nodes
    }

    pub fn node(&self, name: &str) -> Option<&JobNode> {
        self.index.get(name).map(|&i| &self.nodes[i])
    }

    /// Jobs `name` waits for.
    pub fn upstream_of(&self, name: &str) -> &[String] {
        self.node(name).map(|n| n.requires.as_slice()).unwrap_or(&[])
    }

    /// Jobs that wait for `name`.
    pub fn downstream_of(&self, name: &str) -> Vec<&str> {
        self.nodes
            .iter()
            .filter(|n| n.requires.iter().any(|r| r == name))
            .map(|n| n.name.as_str())
            .collect()
    }

    /// Total number of order edges.
    pub fn edge_count(&self) -> usize {
        self.nodes.iter().map(|n| n.requires.len()).sum()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Hand every node to `engine`, wiring order edges and artifact mounts.
    pub fn register<E: ExecutionEngine + ?Sized>(&self, engine: &mut E) -> Result<RegisteredGraph> {
        let mut registered = RegisteredGraph::default();

        for node in &self.nodes {
            let handle = engine.create_node(ContainerSpec {
                name: &node.name,
                image: &node.image,
                command: node.container_command(),
                env: &node.env,
                resources: &node.resources,
            })?;
            let output = engine.declare_output_artifact(&handle)?;

            for input in &node.inputs {
                let upstream = registered.nodes.get(&input.upstream).ok_or_else(|| {
                    Error::MissingUpstream {
                        job: node.name.clone(),
                        upstream: input.upstream.clone(),
                    }
                })?;
                engine.declare_dependency(&handle, &upstream.node)?;
                engine.mount_artifact(&handle, &input.path, &upstream.output)?;
            }

            debug!(job = %node.name, engine = engine.name(), "Registered job node");
            registered.nodes.insert(
                node.name.clone(),
                RegisteredNode {
                    node: handle,
                    output,
                },
            );
        }

        Ok(registered)
    }
}
