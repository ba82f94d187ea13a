//! Secret resolution.

use std::collections::HashMap;

use crate::{Error, Result};

/// Resolves secret references to their values.
///
/// Node construction only sees this trait, so a real secret store can
/// replace the plaintext provider without touching the compiler.
pub trait SecretProvider {
    fn resolve(&self, reference: &str) -> Result<String>;
}

/// Treats each reference as the secret value itself.
///
/// This is the plaintext behaviour of inline `secrets` mappings.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineSecrets;

impl SecretProvider for InlineSecrets {
    fn resolve(&self, reference: &str) -> Result<String> {
        Ok(reference.to_string())
    }
}

/// A fixed reference → value table.
#[derive(Debug, Clone, Default)]
pub struct StaticSecrets {
    values: HashMap<String, String>,
}

impl StaticSecrets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, reference: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(reference.into(), value.into());
        self
    }
}

impl SecretProvider for StaticSecrets {
    fn resolve(&self, reference: &str) -> Result<String> {
        self.values
            .get(reference)
            .cloned()
            .ok_or_else(|| Error::Secret(format!("no secret named '{}'", reference)))
    }
}
