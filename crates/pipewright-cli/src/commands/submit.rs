//! Submission of compiled plans to the pipeline service.

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use pipewright_compiler::ExecutionPlan;
use pipewright_core::SubmissionId;
use serde::Serialize;
use tracing::info;
use url::Url;

use super::compile::{compile_graph, load_credentials, plan};
use crate::CompileArgs;

const SUBMIT_PATH: &str = "api/v1/pipelines";

#[derive(Debug, Serialize)]
struct Submission<'a> {
    id: SubmissionId,
    submitted_at: DateTime<Utc>,
    plan: &'a ExecutionPlan,
}

/// `<api_url>/api/v1/pipelines`, whether or not the base ends in a slash.
fn submit_url(api_url: &str) -> Result<Url> {
    let mut base = Url::parse(api_url).with_context(|| format!("Invalid API URL: {}", api_url))?;
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    Ok(base.join(SUBMIT_PATH)?)
}

pub async fn run(args: &CompileArgs, api_url: &str) -> Result<()> {
    let url = submit_url(api_url)?;

    let credentials = load_credentials(args)?;
    let Some(api_key) = credentials.api_key.as_deref() else {
        bail!("No service.api_key in {}", args.credentials);
    };

    let compiled = compile_graph(args, &credentials)?;
    let plan = plan(&compiled)?;
    let submission = Submission {
        id: SubmissionId::new(),
        submitted_at: Utc::now(),
        plan: &plan,
    };

    let response = reqwest::Client::new()
        .post(url.clone())
        .header("Authorization", format!("Bearer {}", api_key))
        .header("User-Agent", "Pipewright")
        .json(&submission)
        .send()
        .await
        .with_context(|| format!("Failed to reach {}", url))?;

    if !response.status().is_success() {
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        bail!("Submission rejected ({}): {}", status, text);
    }

    info!(id = %submission.id, pipeline = %plan.pipeline, "Pipeline submitted");
    println!("{}", submission.id);
    Ok(())
}
