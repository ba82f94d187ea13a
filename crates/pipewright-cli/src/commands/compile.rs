//! Pipeline compilation command.

use std::collections::HashMap;

use anyhow::{Context, Result};
use pipewright_compiler::{BuildContext, ExecutionPlan, GitCli, JobGraph, PlanRecorder};
use pipewright_config::job::load_job_config;
use pipewright_config::params::load_parameters;
use pipewright_config::{Credentials, PipelineDocument};
use pipewright_core::secret::InlineSecrets;
use pipewright_core::vcs::VersionControl;
use pipewright_executor::KubernetesManifests;
use tracing::info;

use super::pipeline_root;
use crate::{CompileArgs, OutputFormat};

/// A validated graph together with the pipeline it came from.
pub struct Compiled {
    pub pipeline: PipelineDocument,
    pub graph: JobGraph,
}

pub fn load_credentials(args: &CompileArgs) -> Result<Credentials> {
    Credentials::load(&args.credentials)
        .with_context(|| format!("Failed to load credentials: {}", args.credentials))
}

/// Load the pipeline, parameters and job configs, then compile the job graph.
pub fn compile_graph(args: &CompileArgs, credentials: &Credentials) -> Result<Compiled> {
    let inputs = &args.inputs;
    let pipeline = PipelineDocument::load(&inputs.pipeline)
        .with_context(|| format!("Failed to load pipeline: {}", inputs.pipeline))?;
    let settings = load_parameters(&inputs.params)
        .with_context(|| format!("Failed to load parameters: {}", inputs.params))?;

    let root = pipeline_root(&inputs.pipeline);
    let git = GitCli::new(&root);

    let fallback_branch = if pipeline.needs_branch() {
        Some(git.current_branch_name().context("Failed to determine branch")?)
    } else {
        None
    };
    let definitions = pipeline.job_definitions(fallback_branch.as_deref())?;

    let mut configs = HashMap::new();
    for definition in &definitions {
        let config = load_job_config(&root, &definition.job_dir).with_context(|| {
            format!("Failed to load job config for '{}'", definition.name)
        })?;
        configs.insert(definition.name.clone(), config);
    }

    let ctx = BuildContext {
        credentials,
        vcs: &git,
        secrets: &InlineSecrets,
    };
    let graph = JobGraph::compile(&definitions, &settings, &configs, &ctx)
        .with_context(|| format!("Failed to compile pipeline '{}'", pipeline.name))?;

    Ok(Compiled { pipeline, graph })
}

/// Register the graph with an in-memory recorder.
pub fn plan(compiled: &Compiled) -> Result<ExecutionPlan> {
    let mut recorder = PlanRecorder::new(&compiled.pipeline.name);
    compiled.graph.register(&mut recorder)?;
    Ok(recorder.into_plan())
}

pub fn run(args: &CompileArgs, format: OutputFormat, namespace: &str) -> Result<()> {
    let credentials = load_credentials(args)?;
    let compiled = compile_graph(args, &credentials)?;

    let output = match format {
        OutputFormat::Plan => serde_json::to_value(plan(&compiled)?)?,
        OutputFormat::Kubernetes => {
            let mut manifests = KubernetesManifests::new(namespace, &compiled.pipeline.name);
            compiled.graph.register(&mut manifests)?;
            serde_json::Value::Array(manifests.to_manifests()?)
        }
    };

    info!(
        pipeline = %compiled.pipeline.name,
        jobs = compiled.graph.len(),
        format = ?format,
        "Pipeline compiled"
    );
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
