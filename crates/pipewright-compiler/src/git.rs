//! Version control through the `git` command line.

use std::path::{Path, PathBuf};
use std::process::Command;

use pipewright_core::vcs::VersionControl;
use pipewright_core::{Error, Result};
use tracing::debug;

/// Reads revision information from a local checkout.
#[derive(Debug, Clone)]
pub struct GitCli {
    repo_path: PathBuf,
}

impl GitCli {
    pub fn new(repo_path: impl Into<PathBuf>) -> Self {
        Self {
            repo_path: repo_path.into(),
        }
    }

    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    fn run_git(&self, args: &[&str]) -> Result<String> {
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.repo_path)
            .output()
            .map_err(|e| {
                Error::RevisionResolution(format!(
                    "failed to run git in {}: {}",
                    self.repo_path.display(),
                    e
                ))
            })?;

        if !output.status.success() {
            return Err(Error::RevisionResolution(format!(
                "git {} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        debug!(args = ?args, output = %stdout, "git");
        Ok(stdout)
    }
}

impl VersionControl for GitCli {
    fn current_commit_hash(&self) -> Result<String> {
        self.run_git(&["rev-parse", "HEAD"])
    }

    fn current_branch_name(&self) -> Result<String> {
        let branch = self.run_git(&["rev-parse", "--abbrev-ref", "HEAD"])?;
        if branch == "HEAD" {
            return Err(Error::RevisionResolution(format!(
                "HEAD is detached in {}",
                self.repo_path.display()
            )));
        }
        Ok(branch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_repository_fails() {
        let git = GitCli::new("/nonexistent/pipewright/checkout");
        assert!(matches!(
            git.current_commit_hash(),
            Err(Error::RevisionResolution(_))
        ));
        assert!(matches!(
            git.current_branch_name(),
            Err(Error::RevisionResolution(_))
        ));
    }
}
