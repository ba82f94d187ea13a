//! Conversion of KDL nodes into configuration values, plus small node helpers.
//!
//! Encoding of a field node:
//! - `memory 8`: one argument is a scalar
//! - `gpu_size`: no argument and no children is null
//! - `tags "a" "b"`: several arguments are a list
//! - `tags { - "a" }`: children all named `-` are a list
//! - `env { FOO "1" }`: any other children block is a mapping
//! - `limits cpu=1 memory=2`: properties alone are a mapping

use std::collections::BTreeMap;

use kdl::{KdlDocument, KdlEntry, KdlNode, KdlValue};
use pipewright_core::ConfigValue;

use crate::{ConfigError, ConfigResult};

const LIST_ITEM: &str = "-";

/// Convert every child node of `doc` into a `name → value` mapping.
///
/// `context` names the enclosing node in error messages.
pub(crate) fn document_to_map(
    doc: &KdlDocument,
    context: &str,
) -> ConfigResult<BTreeMap<String, ConfigValue>> {
    let mut map = BTreeMap::new();
    for node in doc.nodes() {
        let key = node.name().value().to_string();
        let value = node_to_value(node, &format!("{}.{}", context, key))?;
        if map.insert(key, value).is_some() {
            return Err(ConfigError::Duplicate(format!(
                "{}.{}",
                context,
                node.name().value()
            )));
        }
    }
    Ok(map)
}

pub(crate) fn node_to_value(node: &KdlNode, context: &str) -> ConfigResult<ConfigValue> {
    let args: Vec<&KdlValue> = node
        .entries()
        .iter()
        .filter(|e| e.name().is_none())
        .map(KdlEntry::value)
        .collect();
    let props: Vec<&KdlEntry> = node.entries().iter().filter(|e| e.name().is_some()).collect();

    if let Some(children) = node.children() {
        if !args.is_empty() || !props.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: context.to_string(),
                message: "a node cannot have both arguments and a children block".to_string(),
            });
        }
        let nodes = children.nodes();
        if !nodes.is_empty() && nodes.iter().all(|n| n.name().value() == LIST_ITEM) {
            let items = nodes
                .iter()
                .map(|n| node_to_value(n, context))
                .collect::<ConfigResult<Vec<_>>>()?;
            return Ok(ConfigValue::List(items));
        }
        return Ok(ConfigValue::Map(document_to_map(children, context)?));
    }

    if !props.is_empty() {
        if !args.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: context.to_string(),
                message: "a node cannot mix arguments and properties".to_string(),
            });
        }
        let mut map = BTreeMap::new();
        for entry in props {
            if let Some(name) = entry.name() {
                let key = name.value().to_string();
                if map.insert(key, scalar(entry.value(), context)?).is_some() {
                    return Err(ConfigError::Duplicate(format!("{}.{}", context, name.value())));
                }
            }
        }
        return Ok(ConfigValue::Map(map));
    }

    match args.as_slice() {
        [] => Ok(ConfigValue::Null),
        [single] => scalar(single, context),
        many => Ok(ConfigValue::List(
            many.iter()
                .map(|v| scalar(v, context))
                .collect::<ConfigResult<Vec<_>>>()?,
        )),
    }
}

fn scalar(value: &KdlValue, context: &str) -> ConfigResult<ConfigValue> {
    Ok(match value {
        KdlValue::String(s) => ConfigValue::String(s.clone()),
        KdlValue::Integer(i) => {
            ConfigValue::Integer(i64::try_from(*i).map_err(|_| ConfigError::InvalidValue {
                field: context.to_string(),
                message: format!("integer {} is out of range", i),
            })?)
        }
        KdlValue::Float(f) => ConfigValue::Float(*f),
        KdlValue::Bool(b) => ConfigValue::Bool(*b),
        KdlValue::Null => ConfigValue::Null,
    })
}

// Helper functions for extracting values from KDL nodes

pub(crate) fn get_first_string_arg(node: &KdlNode) -> Option<String> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_string())
        .map(|s| s.to_string())
}

pub(crate) fn get_string_prop(node: &KdlNode, name: &str) -> Option<String> {
    node.get(name)
        .and_then(|v| v.as_string())
        .map(|s| s.to_string())
}

/// All values of a property that may be repeated (`requires="a" requires="b"`).
pub(crate) fn get_string_list_prop(node: &KdlNode, name: &str) -> Vec<String> {
    node.entries()
        .iter()
        .filter(|e| e.name().is_some_and(|n| n.value() == name))
        .filter_map(|e| e.value().as_string())
        .map(|s| s.to_string())
        .collect()
}

/// Read a `name → string` mapping from a children block, coercing values.
pub(crate) fn string_map(
    node: &KdlNode,
    context: &str,
) -> ConfigResult<Option<BTreeMap<String, String>>> {
    match node_to_value(node, context)? {
        ConfigValue::Null => Ok(None),
        ConfigValue::Map(map) => Ok(Some(
            map.into_iter()
                .map(|(k, v)| (k, v.to_env_string()))
                .collect(),
        )),
        other => Err(ConfigError::InvalidValue {
            field: context.to_string(),
            message: format!("expected a mapping, found {}", other.kind()),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_field(kdl: &str) -> ConfigValue {
        let doc: KdlDocument = kdl.parse().unwrap();
        node_to_value(&doc.nodes()[0], "test").unwrap()
    }

    #[test]
    fn test_single_argument_is_scalar() {
        assert_eq!(parse_field("memory 8"), ConfigValue::Integer(8));
        assert_eq!(parse_field("cpus 1.5"), ConfigValue::Float(1.5));
        assert_eq!(parse_field(r#"image "alpine""#), ConfigValue::from("alpine"));
    }

    #[test]
    fn test_bare_node_is_null() {
        assert_eq!(parse_field("gpu_size"), ConfigValue::Null);
    }

    #[test]
    fn test_many_arguments_are_a_list() {
        assert_eq!(
            parse_field(r#"tags "a" "b""#),
            ConfigValue::List(vec![ConfigValue::from("a"), ConfigValue::from("b")])
        );
    }

    #[test]
    fn test_dash_children_are_a_list() {
        let value = parse_field(
            r#"
            tags {
                - "only"
            }
            "#,
        );
        assert_eq!(value, ConfigValue::List(vec![ConfigValue::from("only")]));
    }

    #[test]
    fn test_children_block_is_a_mapping() {
        let value = parse_field(
            r#"
            env {
                FOO "1"
                BAR 2
            }
            "#,
        );
        let map = value.as_map().unwrap();
        assert_eq!(map.get("FOO"), Some(&ConfigValue::from("1")));
        assert_eq!(map.get("BAR"), Some(&ConfigValue::Integer(2)));
    }

    #[test]
    fn test_properties_are_a_mapping() {
        let value = parse_field(r#"limits cpu=1 memory="2G""#);
        let map = value.as_map().unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map.get("memory"), Some(&ConfigValue::from("2G")));
    }

    #[test]
    fn test_duplicate_keys_rejected() {
        let doc: KdlDocument = r#"
            env {
                FOO "1"
                FOO "2"
            }
        "#
        .parse()
        .unwrap();
        let err = node_to_value(&doc.nodes()[0], "job").unwrap_err();
        assert!(matches!(err, ConfigError::Duplicate(_)));
    }

    #[test]
    fn test_duplicate_properties_rejected() {
        let doc: KdlDocument = r#"limits cpu=1 cpu=2"#.parse().unwrap();
        let err = node_to_value(&doc.nodes()[0], "job").unwrap_err();
        assert!(matches!(err, ConfigError::Duplicate(_)));
    }

    #[test]
    fn test_repeated_property_collects_all_values() {
        let doc: KdlDocument = r#"job "c" requires="a" requires="b""#.parse().unwrap();
        assert_eq!(get_string_list_prop(&doc.nodes()[0], "requires"), vec!["a", "b"]);
    }
}
