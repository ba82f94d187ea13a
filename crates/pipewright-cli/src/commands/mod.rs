//! CLI command implementations.

pub mod compile;
pub mod submit;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use pipewright_config::PipelineDocument;
use pipewright_config::params::load_parameters;

use crate::InputArgs;

/// Directory holding the pipeline file. Job directories and the git
/// checkout are resolved against it.
pub fn pipeline_root(pipeline_path: &str) -> PathBuf {
    match Path::new(pipeline_path).parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

pub fn validate(inputs: &InputArgs) -> Result<()> {
    let pipeline = PipelineDocument::load(&inputs.pipeline)
        .with_context(|| format!("Invalid pipeline definition: {}", inputs.pipeline))?;
    let settings = load_parameters(&inputs.params)
        .with_context(|| format!("Invalid parameters: {}", inputs.params))?;

    let unconfigured: Vec<_> = pipeline
        .jobs
        .iter()
        .filter(|job| !settings.contains_key(&job.name))
        .map(|job| job.name.as_str())
        .collect();
    if !unconfigured.is_empty() {
        tracing::warn!(jobs = ?unconfigured, "Jobs have no parameter scope");
    }

    println!(
        "Pipeline '{}' is valid ({} jobs)",
        pipeline.name,
        pipeline.jobs.len()
    );
    Ok(())
}

pub fn resolve(params: &str) -> Result<()> {
    let settings =
        load_parameters(params).with_context(|| format!("Invalid parameters: {}", params))?;
    println!("{}", serde_json::to_string_pretty(&settings)?);
    Ok(())
}
