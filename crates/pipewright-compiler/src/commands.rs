//! Shell steps run inside every job container.

use pipewright_core::job::{CODE_DIR, JobDefinition, OUTPUT_PATH};

/// Build the ordered command sequence for a job.
///
/// Each step depends on the side effects of the previous ones; the steps are
/// joined with `&&`, so the first failure aborts the job.
pub fn job_commands(
    definition: &JobDefinition,
    commit: &str,
    oauth_token: &str,
    entrypoint: &str,
) -> Vec<String> {
    vec![
        // Working and output directories
        format!("mkdir -p {}", CODE_DIR),
        format!("mkdir -p {}", OUTPUT_PATH),
        // Containers may be reused; start from an empty checkout
        format!("rm -rf {}/*", CODE_DIR),
        format!("cd {}", CODE_DIR),
        // Route both https and ssh GitHub remotes through the token
        format!(
            r#"git config --global url."https://{}@github.com".insteadOf https://github.com"#,
            oauth_token
        ),
        format!(
            r#"git config --global url."https://{}@github.com/".insteadOf git@github.com:"#,
            oauth_token
        ),
        // Echo the remaining steps
        "set -ex".to_string(),
        "git init".to_string(),
        format!("git pull {} {}", definition.repo_url, definition.git_branch),
        format!("git checkout {}", commit),
        "git submodule init".to_string(),
        "git submodule update --recursive".to_string(),
        format!("cd {}", definition.job_dir),
        format!("bash {}", entrypoint),
    ]
}
