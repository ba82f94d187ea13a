//! Parameter documents and their resolution into per-job settings.
//!
//! A parameter document holds one global scope named `all` and one scope per
//! job:
//!
//! ```kdl
//! all {
//!     env { FOO "1" }
//!     memory 2
//!     cpus 1
//! }
//! train {
//!     env { BAR "2" }
//!     memory 8
//! }
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use kdl::KdlDocument;
use pipewright_core::{ConfigValue, ResolvedSettings};
use tracing::debug;

use crate::error::read_file;
use crate::value::document_to_map;
use crate::{ConfigError, ConfigResult};

/// Name of the global scope.
pub const GLOBAL_SCOPE: &str = "all";

/// Field whose values are coerced to strings after merging.
pub const ENV_FIELD: &str = "env";

type Scope = BTreeMap<String, ConfigValue>;

/// A parsed, unresolved parameter document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterDocument {
    pub global: Scope,
    pub jobs: BTreeMap<String, Scope>,
}

impl ParameterDocument {
    /// Parse a parameter document from KDL text.
    pub fn parse(kdl: &str) -> ConfigResult<Self> {
        let doc: KdlDocument = kdl.parse()?;
        let mut global = None;
        let mut jobs = BTreeMap::new();

        for node in doc.nodes() {
            let name = node.name().value();
            if !node.entries().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: name.to_string(),
                    message: "a scope takes a children block, not arguments".to_string(),
                });
            }
            let scope = match node.children() {
                Some(children) => document_to_map(children, name)?,
                None => Scope::new(),
            };

            let duplicate = if name == GLOBAL_SCOPE {
                global.replace(scope).is_some()
            } else {
                jobs.insert(name.to_string(), scope).is_some()
            };
            if duplicate {
                return Err(ConfigError::Duplicate(format!("scope '{}'", name)));
            }
        }

        Ok(Self {
            global: global.unwrap_or_default(),
            jobs,
        })
    }

    /// Read and parse a parameter document.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        Self::parse(&read_file(path.as_ref())?)
    }
}

/// Parse a parameter document from KDL text.
pub fn parse_parameters(kdl: &str) -> ConfigResult<ParameterDocument> {
    ParameterDocument::parse(kdl)
}

/// Read, parse and resolve a parameter document.
pub fn load_parameters(path: impl AsRef<Path>) -> ConfigResult<BTreeMap<String, ResolvedSettings>> {
    resolve_parameters(ParameterDocument::load(path)?)
}

/// Merge the global scope into every job scope.
///
/// Fails as a whole on the first unmergeable field; no partial result is
/// returned.
pub fn resolve_parameters(
    doc: ParameterDocument,
) -> ConfigResult<BTreeMap<String, ResolvedSettings>> {
    let ParameterDocument { global, jobs } = doc;
    let mut resolved = BTreeMap::new();

    for (job, mut scope) in jobs {
        for (field, global_value) in &global {
            let merged = match scope.remove(field) {
                None => global_value.clone(),
                Some(job_value) => merge_field(&job, field, job_value, global_value)?,
            };
            scope.insert(field.clone(), merged);
        }

        if let Some(env) = scope.remove(ENV_FIELD) {
            scope.insert(ENV_FIELD.to_string(), normalize_env(&job, env)?);
        }

        debug!(job = %job, fields = scope.len(), "Resolved job parameters");
        resolved.insert(job, ResolvedSettings::new(scope));
    }

    Ok(resolved)
}

/// Merge one field present in both a job scope and the global scope.
///
/// - mappings: union, job entries win on conflicting keys
/// - lists: job list followed by the global list
/// - strings and numbers: the global value replaces the job value, even
///   when the global value is a list, mapping or null
pub fn merge_field(
    scope: &str,
    field: &str,
    job_value: ConfigValue,
    global_value: &ConfigValue,
) -> ConfigResult<ConfigValue> {
    let type_error = |value: &ConfigValue| ConfigError::Type {
        scope: scope.to_string(),
        field: field.to_string(),
        kind: value.kind(),
    };

    match job_value {
        ConfigValue::Map(mut entries) => {
            let ConfigValue::Map(global_entries) = global_value else {
                return Err(type_error(global_value));
            };
            for (key, value) in global_entries {
                entries.entry(key.clone()).or_insert_with(|| value.clone());
            }
            Ok(ConfigValue::Map(entries))
        }
        ConfigValue::List(mut items) => {
            let ConfigValue::List(global_items) = global_value else {
                return Err(type_error(global_value));
            };
            items.extend(global_items.iter().cloned());
            Ok(ConfigValue::List(items))
        }
        // The global value replaces a job scalar whatever its kind.
        ConfigValue::String(_) | ConfigValue::Integer(_) | ConfigValue::Float(_) => {
            Ok(global_value.clone())
        }
        ConfigValue::Null | ConfigValue::Bool(_) => Err(type_error(&job_value)),
    }
}

fn normalize_env(job: &str, env: ConfigValue) -> ConfigResult<ConfigValue> {
    match env {
        ConfigValue::Map(vars) => Ok(ConfigValue::Map(
            vars.into_iter()
                .map(|(k, v)| (k, ConfigValue::String(v.to_env_string())))
                .collect(),
        )),
        // `env` with no value at all means no variables.
        ConfigValue::Null => Ok(ConfigValue::Map(BTreeMap::new())),
        other => Err(ConfigError::Type {
            scope: job.to_string(),
            field: ENV_FIELD.to_string(),
            kind: other.kind(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipewright_core::ValueKind;

    fn resolve(kdl: &str) -> BTreeMap<String, ResolvedSettings> {
        resolve_parameters(parse_parameters(kdl).unwrap()).unwrap()
    }

    fn env_of(settings: &ResolvedSettings) -> BTreeMap<String, ConfigValue> {
        settings.get("env").unwrap().as_map().unwrap().clone()
    }

    // The job's `memory 8` loses to the global `memory 2`: scalars take the
    // global value.
    #[test]
    fn test_end_to_end_example_global_scalar_wins() {
        let resolved = resolve(
            r#"
            all {
                env {
                    FOO "1"
                }
                memory 2
                cpus 1
            }
            train {
                env {
                    BAR "2"
                }
                memory 8
            }
            "#,
        );

        let train = &resolved["train"];
        let env = env_of(train);
        assert_eq!(env.get("FOO"), Some(&ConfigValue::from("1")));
        assert_eq!(env.get("BAR"), Some(&ConfigValue::from("2")));
        assert_eq!(env.len(), 2);
        assert_eq!(train.get("cpus"), Some(&ConfigValue::Integer(1)));
        assert_eq!(train.get("memory"), Some(&ConfigValue::Integer(2)));
        assert_eq!(train.fields().len(), 3);
    }

    #[test]
    fn test_global_scope_is_removed() {
        let resolved = resolve(
            r#"
            all {
                cpus 1
            }
            a {}
            b {}
            "#,
        );
        assert!(!resolved.contains_key("all"));
        assert_eq!(resolved.keys().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn test_every_global_field_reaches_every_job() {
        let resolved = resolve(
            r#"
            all {
                cpus 1
                memory 4
                tags "shared"
            }
            a {}
            b {
                cpus 2
            }
            "#,
        );
        for settings in resolved.values() {
            for field in ["cpus", "memory", "tags"] {
                assert!(settings.contains(field), "missing {}", field);
            }
        }
    }

    #[test]
    fn test_scalar_conflict_takes_global_value() {
        let merged = merge_field(
            "train",
            "cpus",
            ConfigValue::Integer(4),
            &ConfigValue::Integer(1),
        )
        .unwrap();
        assert_eq!(merged, ConfigValue::Integer(1));

        let merged = merge_field(
            "train",
            "image",
            ConfigValue::from("job"),
            &ConfigValue::Float(2.5),
        )
        .unwrap();
        assert_eq!(merged, ConfigValue::Float(2.5));
    }

    #[test]
    fn test_job_scalar_takes_any_global_kind() {
        let merged = merge_field("train", "gpus", ConfigValue::Integer(2), &ConfigValue::Null)
            .unwrap();
        assert_eq!(merged, ConfigValue::Null);

        let tags = ConfigValue::List(vec![ConfigValue::from("a"), ConfigValue::from("b")]);
        let merged = merge_field("train", "tags", ConfigValue::from("x"), &tags).unwrap();
        assert_eq!(merged, tags);

        let limits =
            ConfigValue::Map(BTreeMap::from([("cpu".to_string(), ConfigValue::Integer(1))]));
        let merged = merge_field("train", "limits", ConfigValue::Float(0.5), &limits).unwrap();
        assert_eq!(merged, limits);
    }

    #[test]
    fn test_single_item_job_list_against_global_list() {
        let resolved = resolve(
            r#"
            all {
                gpus
                cpus 1
                tags "a" "b"
            }
            train {
                gpus 2
                tags "x"
            }
            "#,
        );

        let train = &resolved["train"];
        assert_eq!(train.get("gpus"), None);
        assert_eq!(
            train.get("tags"),
            Some(&ConfigValue::List(vec![ConfigValue::from("a"), ConfigValue::from("b")]))
        );
    }

    #[test]
    fn test_map_conflict_keeps_job_entry() {
        let job = ConfigValue::Map(BTreeMap::from([("K".to_string(), ConfigValue::from("job"))]));
        let global = ConfigValue::Map(BTreeMap::from([
            ("K".to_string(), ConfigValue::from("global")),
            ("G".to_string(), ConfigValue::from("g")),
        ]));

        let merged = merge_field("j", "env", job, &global).unwrap();
        let map = merged.as_map().unwrap();
        assert_eq!(map.get("K"), Some(&ConfigValue::from("job")));
        assert_eq!(map.get("G"), Some(&ConfigValue::from("g")));
    }

    #[test]
    fn test_map_merge_is_idempotent() {
        let job = ConfigValue::Map(BTreeMap::from([("A".to_string(), ConfigValue::Integer(1))]));
        let global = ConfigValue::Map(BTreeMap::from([
            ("A".to_string(), ConfigValue::Integer(9)),
            ("B".to_string(), ConfigValue::Integer(2)),
        ]));

        let once = merge_field("j", "m", job, &global).unwrap();
        let twice = merge_field("j", "m", once.clone(), &global).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_list_merge_concatenates_job_first() {
        let job = ConfigValue::List(vec![ConfigValue::from("a"), ConfigValue::from("b")]);
        let global = ConfigValue::List(vec![ConfigValue::from("c")]);

        let merged = merge_field("j", "tags", job, &global).unwrap();
        assert_eq!(
            merged,
            ConfigValue::List(vec![
                ConfigValue::from("a"),
                ConfigValue::from("b"),
                ConfigValue::from("c"),
            ])
        );
    }

    #[test]
    fn test_unsupported_types_fail() {
        let err = merge_field("j", "debug", ConfigValue::Bool(true), &ConfigValue::Bool(false))
            .unwrap_err();
        match err {
            ConfigError::Type { scope, field, kind } => {
                assert_eq!(scope, "j");
                assert_eq!(field, "debug");
                assert_eq!(kind, ValueKind::Bool);
            }
            other => panic!("Expected Type error, got {:?}", other),
        }

        assert!(matches!(
            merge_field("j", "x", ConfigValue::Null, &ConfigValue::Integer(1)),
            Err(ConfigError::Type { .. })
        ));
    }

    #[test]
    fn test_mismatched_container_types_fail() {
        let err = merge_field(
            "j",
            "env",
            ConfigValue::Map(BTreeMap::new()),
            &ConfigValue::List(vec![]),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Type { kind: ValueKind::List, .. }));
    }

    #[test]
    fn test_type_error_aborts_whole_resolution() {
        let mut doc = ParameterDocument::default();
        doc.global.insert("flag".to_string(), ConfigValue::Bool(true));
        doc.jobs.insert("ok".to_string(), Scope::new());
        doc.jobs.insert(
            "bad".to_string(),
            Scope::from([("flag".to_string(), ConfigValue::Bool(false))]),
        );

        assert!(resolve_parameters(doc).is_err());
    }

    #[test]
    fn test_env_values_become_strings() {
        let mut doc = ParameterDocument::default();
        doc.global.insert(
            "env".to_string(),
            ConfigValue::Map(BTreeMap::from([
                ("NUM".to_string(), ConfigValue::Integer(3)),
                ("EMPTY".to_string(), ConfigValue::Null),
            ])),
        );
        doc.jobs.insert(
            "job".to_string(),
            Scope::from([(
                "env".to_string(),
                ConfigValue::Map(BTreeMap::from([(
                    "RATE".to_string(),
                    ConfigValue::Float(0.5),
                )])),
            )]),
        );

        let resolved = resolve_parameters(doc).unwrap();
        let env = env_of(&resolved["job"]);
        assert_eq!(env.get("NUM"), Some(&ConfigValue::from("3")));
        assert_eq!(env.get("EMPTY"), Some(&ConfigValue::from("")));
        assert_eq!(env.get("RATE"), Some(&ConfigValue::from("0.5")));
        assert!(env.values().all(|v| matches!(v, ConfigValue::String(_))));
    }

    #[test]
    fn test_env_is_not_created_when_absent() {
        let resolved = resolve(
            r#"
            all {
                cpus 1
            }
            job {}
            "#,
        );
        assert!(!resolved["job"].contains("env"));
    }

    #[test]
    fn test_unknown_fields_pass_through() {
        let resolved = resolve(
            r#"
            job {
                custom_field "kept"
                retries 3
            }
            "#,
        );
        assert_eq!(
            resolved["job"].get("custom_field"),
            Some(&ConfigValue::from("kept"))
        );
        assert_eq!(resolved["job"].get("retries"), Some(&ConfigValue::Integer(3)));
    }

    #[test]
    fn test_missing_global_scope_is_empty() {
        let doc = ParameterDocument::parse("job {\n memory 1\n}").unwrap();
        assert!(doc.global.is_empty());
        assert_eq!(doc.jobs.len(), 1);
    }

    #[test]
    fn test_duplicate_scope_rejected() {
        let err = ParameterDocument::parse("a {}\na {}").unwrap_err();
        assert!(matches!(err, ConfigError::Duplicate(_)));
    }

    #[test]
    fn test_scope_with_arguments_rejected() {
        let err = ParameterDocument::parse(r#"a "oops""#).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }
}
