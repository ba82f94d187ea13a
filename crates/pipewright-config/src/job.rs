//! Per-job configuration stored in the job's directory.
//!
//! ```kdl
//! docker "python:3.11-slim"
//! entrypoint "build.sh"
//! env {
//!     PYTHONUNBUFFERED 1
//! }
//! ```

use std::path::Path;

use kdl::KdlDocument;
use pipewright_core::job::JobConfig;

use crate::error::read_file;
use crate::value::{get_first_string_arg, string_map};
use crate::{ConfigError, ConfigResult};

/// File name of the job config inside a job directory.
pub const JOB_CONFIG_FILE: &str = "job.kdl";

/// Parse a job config from KDL text.
pub fn parse_job_config(kdl: &str) -> ConfigResult<JobConfig> {
    let doc: KdlDocument = kdl.parse()?;

    let mut docker = None;
    let mut entrypoint = None;
    let mut env = None;

    for node in doc.nodes() {
        match node.name().value() {
            "docker" => docker = get_first_string_arg(node),
            "entrypoint" => entrypoint = get_first_string_arg(node),
            "env" => env = string_map(node, "env")?,
            _ => {} // Ignore unknown nodes
        }
    }

    let docker = docker
        .filter(|d| !d.is_empty())
        .ok_or_else(|| ConfigError::MissingField("docker".to_string()))?;

    Ok(JobConfig {
        docker,
        entrypoint,
        env,
    })
}

/// Load `<job_dir>/job.kdl`, with `job_dir` relative to `root`.
pub fn load_job_config(root: impl AsRef<Path>, job_dir: &str) -> ConfigResult<JobConfig> {
    let path = root.as_ref().join(job_dir).join(JOB_CONFIG_FILE);
    parse_job_config(&read_file(&path)?)
}
