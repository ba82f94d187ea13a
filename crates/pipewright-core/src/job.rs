//! Job definitions, per-job configs and compiled job nodes.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::resources::ResourceLimits;

/// Directory inside the container where the repository is checked out.
pub const CODE_DIR: &str = "/code";

/// Where every job writes its results. Mounted into downstream jobs.
pub const OUTPUT_PATH: &str = "/output";

/// Parent directory of upstream artifact mounts.
pub const INPUT_ROOT: &str = "/input";

/// Script run from the job directory when the job config names none.
pub const DEFAULT_ENTRYPOINT: &str = "build.sh";

/// Mount path for the output artifact of `upstream`.
///
/// Namespaced by job name, so distinct upstream jobs never collide.
pub fn input_mount_path(upstream: &str) -> String {
    format!("{}/{}", INPUT_ROOT, upstream)
}

/// One job of a pipeline, as declared by the pipeline author.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobDefinition {
    /// Unique job name.
    pub name: String,
    /// Path of the job's directory inside the repository.
    pub job_dir: String,
    /// Repository to clone.
    pub repo_url: String,
    /// Branch to pull.
    pub git_branch: String,
    /// Pinned revision. Resolved from the local checkout when absent.
    pub commit: Option<String>,
    /// Names of jobs whose output this job consumes, in order.
    pub requires: Vec<String>,
}

impl JobDefinition {
    pub fn new(
        name: impl Into<String>,
        job_dir: impl Into<String>,
        repo_url: impl Into<String>,
        git_branch: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            job_dir: job_dir.into(),
            repo_url: repo_url.into(),
            git_branch: git_branch.into(),
            commit: None,
            requires: Vec::new(),
        }
    }

    pub fn with_commit(mut self, commit: impl Into<String>) -> Self {
        self.commit = Some(commit.into());
        self
    }

    pub fn with_requires<I, S>(mut self, requires: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.requires = requires.into_iter().map(Into::into).collect();
        self
    }
}

/// Static configuration stored in the job's own directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobConfig {
    /// Container image reference.
    pub docker: String,
    /// Script to run from the job directory.
    pub entrypoint: Option<String>,
    /// Environment used when the resolved settings carry no `env`.
    pub env: Option<BTreeMap<String, String>>,
}

impl JobConfig {
    pub fn new(docker: impl Into<String>) -> Self {
        Self {
            docker: docker.into(),
            entrypoint: None,
            env: None,
        }
    }

    pub fn entrypoint(&self) -> &str {
        self.entrypoint.as_deref().unwrap_or(DEFAULT_ENTRYPOINT)
    }
}

/// An upstream artifact mounted into a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputMount {
    pub upstream: String,
    pub path: String,
}

/// A fully compiled job, ready to be registered with an execution engine.
///
/// Nodes are plain descriptions. They carry no run state and are never
/// updated in place: different inputs produce a different node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobNode {
    pub name: String,
    pub image: String,
    /// Revision checked out by the node, captured at construction.
    pub commit: String,
    /// Shell steps, run in order and short-circuiting on failure.
    pub commands: Vec<String>,
    pub resources: ResourceLimits,
    pub env: BTreeMap<String, String>,
    /// Jobs that must complete before this one starts.
    pub requires: Vec<String>,
    pub inputs: Vec<InputMount>,
    pub output_path: String,
}

impl JobNode {
    /// The command steps joined into one `&&` chain.
    pub fn script(&self) -> String {
        self.commands.join(" && ")
    }

    /// Container argv running [`JobNode::script`].
    pub fn container_command(&self) -> Vec<String> {
        vec!["sh".to_string(), "-c".to_string(), self.script()]
    }
}
