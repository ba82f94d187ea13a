//! Credentials document.
//!
//! ```kdl
//! github {
//!     oauth_token "ghp_..."
//! }
//! service {
//!     api_key "..."
//! }
//! ```

use std::fmt;
use std::path::Path;

use kdl::{KdlDocument, KdlNode};

use crate::error::read_file;
use crate::value::get_first_string_arg;
use crate::{ConfigError, ConfigResult};

/// Credentials loaded once at startup and passed by reference afterwards.
#[derive(Clone)]
pub struct Credentials {
    /// Token embedded in git URL rewrites inside job containers.
    pub github_oauth_token: String,
    /// Key for the pipeline service API, needed only for submission.
    pub api_key: Option<String>,
}

impl Credentials {
    pub fn new(github_oauth_token: impl Into<String>) -> Self {
        Self {
            github_oauth_token: github_oauth_token.into(),
            api_key: None,
        }
    }

    /// Parse credentials from KDL text.
    pub fn parse(kdl: &str) -> ConfigResult<Self> {
        let doc: KdlDocument = kdl.parse()?;

        let mut github_oauth_token = None;
        let mut api_key = None;

        for node in doc.nodes() {
            match node.name().value() {
                "github" => github_oauth_token = child_string(node, "oauth_token"),
                "service" => api_key = child_string(node, "api_key"),
                _ => {}
            }
        }

        Ok(Self {
            github_oauth_token: github_oauth_token
                .ok_or_else(|| ConfigError::MissingField("github.oauth_token".to_string()))?,
            api_key,
        })
    }

    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        Self::parse(&read_file(path.as_ref())?)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("github_oauth_token", &"[REDACTED]")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

fn child_string(node: &KdlNode, name: &str) -> Option<String> {
    node.children()?
        .nodes()
        .iter()
        .find(|n| n.name().value() == name)
        .and_then(get_first_string_arg)
}
