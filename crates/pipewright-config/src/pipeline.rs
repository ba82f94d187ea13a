//! Pipeline definition parsing.
//!
//! ```kdl
//! pipeline "training"
//! repository "https://github.com/acme/models"
//! branch "main"
//!
//! job "prepare" dir="jobs/prepare"
//! job "train" dir="jobs/train" requires="prepare"
//! job "report" dir="jobs/report" requires="prepare" requires="train" commit="abc123"
//! ```

use std::collections::HashSet;
use std::path::Path;
use std::sync::LazyLock;

use kdl::{KdlDocument, KdlNode};
use pipewright_core::graph::{Dependent, find_cycle};
use pipewright_core::job::JobDefinition;
use regex::Regex;

use crate::error::read_file;
use crate::value::{get_first_string_arg, get_string_list_prop, get_string_prop};
use crate::{ConfigError, ConfigResult};

// Job names become engine object names, so they must be DNS-1123 labels.
static JOB_NAME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9]([-a-z0-9]{0,61}[a-z0-9])?$").unwrap());

/// A parsed pipeline definition.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineDocument {
    pub name: String,
    /// Default repository for jobs that do not set their own.
    pub repository: Option<String>,
    /// Default branch. When absent, the caller supplies the current branch.
    pub branch: Option<String>,
    /// Default pinned commit.
    pub commit: Option<String>,
    /// Jobs in declaration order, which is also construction order.
    pub jobs: Vec<JobEntry>,
}

/// One `job` node.
#[derive(Debug, Clone, PartialEq)]
pub struct JobEntry {
    pub name: String,
    /// Job directory; defaults to the job name.
    pub dir: String,
    pub requires: Vec<String>,
    pub repository: Option<String>,
    pub branch: Option<String>,
    pub commit: Option<String>,
}

impl Dependent for JobEntry {
    fn name(&self) -> &str {
        &self.name
    }

    fn requires(&self) -> &[String] {
        &self.requires
    }
}

impl PipelineDocument {
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        parse_pipeline(&read_file(path.as_ref())?)
    }

    /// Whether some job has no branch without a caller-supplied fallback.
    pub fn needs_branch(&self) -> bool {
        self.branch.is_none() && self.jobs.iter().any(|j| j.branch.is_none())
    }

    /// Turn the job entries into job definitions, in declaration order.
    ///
    /// `fallback_branch` is used for jobs with no branch at job or pipeline level.
    pub fn job_definitions(
        &self,
        fallback_branch: Option<&str>,
    ) -> ConfigResult<Vec<JobDefinition>> {
        self.jobs
            .iter()
            .map(|job| {
                let repo_url = job
                    .repository
                    .as_ref()
                    .or(self.repository.as_ref())
                    .cloned()
                    .ok_or_else(|| {
                        ConfigError::MissingField(format!("repository for job '{}'", job.name))
                    })?;
                let git_branch = job
                    .branch
                    .as_deref()
                    .or(self.branch.as_deref())
                    .or(fallback_branch)
                    .map(str::to_string)
                    .ok_or_else(|| {
                        ConfigError::MissingField(format!("branch for job '{}'", job.name))
                    })?;

                Ok(JobDefinition {
                    name: job.name.clone(),
                    job_dir: job.dir.clone(),
                    repo_url,
                    git_branch,
                    commit: job.commit.clone().or_else(|| self.commit.clone()),
                    requires: job.requires.clone(),
                })
            })
            .collect()
    }
}

/// Parse a pipeline definition from KDL text.
pub fn parse_pipeline(kdl: &str) -> ConfigResult<PipelineDocument> {
    let doc: KdlDocument = kdl.parse()?;

    let mut name = String::new();
    let mut repository = None;
    let mut branch = None;
    let mut commit = None;
    let mut jobs = Vec::new();

    for node in doc.nodes() {
        match node.name().value() {
            "pipeline" => {
                name = get_first_string_arg(node)
                    .ok_or_else(|| ConfigError::MissingField("pipeline name".to_string()))?;
            }
            "repository" => repository = get_first_string_arg(node),
            "branch" => branch = get_first_string_arg(node),
            "commit" => commit = get_first_string_arg(node),
            "job" => jobs.push(parse_job(node)?),
            _ => {} // Ignore unknown nodes
        }
    }

    if name.is_empty() {
        return Err(ConfigError::MissingField("pipeline name".to_string()));
    }

    let mut seen = HashSet::new();
    for job in &jobs {
        if !seen.insert(job.name.as_str()) {
            return Err(ConfigError::Duplicate(format!("job '{}'", job.name)));
        }
    }

    for job in &jobs {
        for dep in &job.requires {
            if !seen.contains(dep.as_str()) {
                return Err(ConfigError::InvalidReference(format!(
                    "job '{}' requires unknown job '{}'",
                    job.name, dep
                )));
            }
        }
    }

    if let Some(cycle) = find_cycle(&jobs) {
        return Err(ConfigError::CycleDetected(cycle.join(" -> ")));
    }

    Ok(PipelineDocument {
        name,
        repository,
        branch,
        commit,
        jobs,
    })
}

fn parse_job(node: &KdlNode) -> ConfigResult<JobEntry> {
    let name = get_first_string_arg(node)
        .ok_or_else(|| ConfigError::MissingField("job name".to_string()))?;

    if !JOB_NAME_REGEX.is_match(&name) {
        return Err(ConfigError::InvalidValue {
            field: "job name".to_string(),
            message: format!(
                "'{}' must be lowercase alphanumerics and '-', at most 63 characters",
                name
            ),
        });
    }

    Ok(JobEntry {
        dir: get_string_prop(node, "dir").unwrap_or_else(|| name.clone()),
        requires: get_string_list_prop(node, "requires"),
        repository: get_string_prop(node, "repository"),
        branch: get_string_prop(node, "branch"),
        commit: get_string_prop(node, "commit"),
        name,
    })
}
