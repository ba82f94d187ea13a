//! Configuration values and resolved per-job settings.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// A value read from a configuration document.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    List(Vec<ConfigValue>),
    Map(BTreeMap<String, ConfigValue>),
}

/// Type tag of a [`ConfigValue`], used in error reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Null,
    Bool,
    Integer,
    Float,
    String,
    List,
    Map,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Null => "null",
            ValueKind::Bool => "bool",
            ValueKind::Integer => "integer",
            ValueKind::Float => "float",
            ValueKind::String => "string",
            ValueKind::List => "list",
            ValueKind::Map => "mapping",
        };
        f.write_str(name)
    }
}

impl ConfigValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            ConfigValue::Null => ValueKind::Null,
            ConfigValue::Bool(_) => ValueKind::Bool,
            ConfigValue::Integer(_) => ValueKind::Integer,
            ConfigValue::Float(_) => ValueKind::Float,
            ConfigValue::String(_) => ValueKind::String,
            ConfigValue::List(_) => ValueKind::List,
            ConfigValue::Map(_) => ValueKind::Map,
        }
    }

    /// Strings and numbers. Booleans and null are not scalars for merging.
    pub fn is_scalar(&self) -> bool {
        matches!(
            self,
            ConfigValue::String(_) | ConfigValue::Integer(_) | ConfigValue::Float(_)
        )
    }

    pub fn is_null(&self) -> bool {
        matches!(self, ConfigValue::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConfigValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, ConfigValue>> {
        match self {
            ConfigValue::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Textual form used when a value becomes an environment variable.
    ///
    /// Null renders as the empty string, booleans as `true`/`false`, lists
    /// and maps as compact JSON.
    pub fn to_env_string(&self) -> String {
        match self {
            ConfigValue::Null => String::new(),
            ConfigValue::Bool(b) => b.to_string(),
            ConfigValue::Integer(i) => i.to_string(),
            ConfigValue::Float(f) => format!("{:?}", f),
            ConfigValue::String(s) => s.clone(),
            ConfigValue::List(_) | ConfigValue::Map(_) => {
                serde_json::to_string(self).unwrap_or_default()
            }
        }
    }
}

impl From<&str> for ConfigValue {
    fn from(s: &str) -> Self {
        ConfigValue::String(s.to_string())
    }
}

impl From<String> for ConfigValue {
    fn from(s: String) -> Self {
        ConfigValue::String(s)
    }
}

impl From<i64> for ConfigValue {
    fn from(i: i64) -> Self {
        ConfigValue::Integer(i)
    }
}

impl From<f64> for ConfigValue {
    fn from(f: f64) -> Self {
        ConfigValue::Float(f)
    }
}

/// A job's settings after merging its own scope with the global scope.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ResolvedSettings {
    fields: BTreeMap<String, ConfigValue>,
}

impl ResolvedSettings {
    pub fn new(fields: BTreeMap<String, ConfigValue>) -> Self {
        Self { fields }
    }

    /// Look up a field. Explicit nulls read as absent.
    pub fn get(&self, field: &str) -> Option<&ConfigValue> {
        self.fields.get(field).filter(|v| !v.is_null())
    }

    pub fn contains(&self, field: &str) -> bool {
        self.get(field).is_some()
    }

    pub fn fields(&self) -> &BTreeMap<String, ConfigValue> {
        &self.fields
    }

    pub fn into_fields(self) -> BTreeMap<String, ConfigValue> {
        self.fields
    }
}

impl FromIterator<(String, ConfigValue)> for ResolvedSettings {
    fn from_iter<I: IntoIterator<Item = (String, ConfigValue)>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
