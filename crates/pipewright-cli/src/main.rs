//! Pipewright CLI tool.

use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "pipewright")]
#[command(about = "Compile declarative job pipelines", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a pipeline definition and its parameters
    Validate {
        #[command(flatten)]
        inputs: InputArgs,
    },
    /// Print resolved per-job settings as JSON
    Resolve {
        /// Path to the parameters file
        #[arg(long, default_value = "parameters.kdl")]
        params: String,
    },
    /// Compile a pipeline and print the result as JSON
    Compile {
        #[command(flatten)]
        compile: CompileArgs,
        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Plan)]
        format: OutputFormat,
        /// Namespace for Kubernetes manifests
        #[arg(long, default_value = "default")]
        namespace: String,
    },
    /// Compile a pipeline and submit the plan to the pipeline service
    Submit {
        #[command(flatten)]
        compile: CompileArgs,
        /// Pipeline service URL
        #[arg(long, env = "PIPEWRIGHT_API_URL", default_value = "http://localhost:3000")]
        api_url: String,
    },
}

#[derive(Args, Clone)]
pub struct InputArgs {
    /// Path to the pipeline definition
    #[arg(long, default_value = "pipeline.kdl")]
    pub pipeline: String,
    /// Path to the parameters file
    #[arg(long, default_value = "parameters.kdl")]
    pub params: String,
}

#[derive(Args, Clone)]
pub struct CompileArgs {
    #[command(flatten)]
    pub inputs: InputArgs,
    /// Path to the credentials file
    #[arg(long, env = "PIPEWRIGHT_CREDENTIALS", default_value = "credentials.kdl")]
    pub credentials: String,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    /// Engine-neutral execution plan
    Plan,
    /// batch/v1 Jobs and PersistentVolumeClaims
    Kubernetes,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout carries JSON output, so logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Validate { inputs } => {
            commands::validate(&inputs)?;
        }
        Commands::Resolve { params } => {
            commands::resolve(&params)?;
        }
        Commands::Compile {
            compile,
            format,
            namespace,
        } => {
            commands::compile::run(&compile, format, &namespace)?;
        }
        Commands::Submit { compile, api_url } => {
            commands::submit::run(&compile, &api_url).await?;
        }
    }

    Ok(())
}
