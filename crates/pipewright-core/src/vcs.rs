//! Version-control collaborator.

use crate::Result;

/// Read-only view of the local source checkout.
///
/// Both calls fail with [`crate::Error::RevisionResolution`] when there is no
/// repository or HEAD does not point at a branch.
pub trait VersionControl {
    /// Full hash of the checked-out commit.
    fn current_commit_hash(&self) -> Result<String>;

    /// Short name of the checked-out branch.
    fn current_branch_name(&self) -> Result<String>;
}

/// A fixed revision, for callers that already know it.
#[derive(Debug, Clone)]
pub struct FixedRevision {
    pub commit: String,
    pub branch: String,
}

impl VersionControl for FixedRevision {
    fn current_commit_hash(&self) -> Result<String> {
        Ok(self.commit.clone())
    }

    fn current_branch_name(&self) -> Result<String> {
        Ok(self.branch.clone())
    }
}
