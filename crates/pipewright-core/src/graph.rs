//! Validation of the job dependency graph.

use std::collections::{HashMap, HashSet};

use crate::job::JobDefinition;
use crate::{Error, Result};

/// Anything with a name and an ordered list of required names.
pub trait Dependent {
    fn name(&self) -> &str;
    fn requires(&self) -> &[String];
}

impl Dependent for JobDefinition {
    fn name(&self) -> &str {
        &self.name
    }

    fn requires(&self) -> &[String] {
        &self.requires
    }
}

/// Check that job names are unique and that `requires` has no cycle.
///
/// Unknown names in `requires` are not reported here; they surface when the
/// dependency is wired.
pub fn validate_dag<T: Dependent>(definitions: &[T]) -> Result<()> {
    let mut seen = HashSet::new();
    for def in definitions {
        if !seen.insert(def.name()) {
            return Err(Error::InvalidInput(format!(
                "job '{}' is defined more than once",
                def.name()
            )));
        }
    }

    if let Some(cycle) = find_cycle(definitions) {
        return Err(Error::CycleDetected(cycle.join(" -> ")));
    }
    Ok(())
}

/// Find one cycle in the `requires` relation, returned as a closed path.
pub fn find_cycle<T: Dependent>(definitions: &[T]) -> Option<Vec<String>> {
    let by_name: HashMap<&str, &T> = definitions.iter().map(|d| (d.name(), d)).collect();

    let mut visited = HashSet::new();
    let mut path = Vec::new();

    for def in definitions {
        if !visited.contains(def.name()) {
            if let Some(cycle) = dfs(def.name(), &by_name, &mut visited, &mut path) {
                return Some(cycle);
            }
        }
    }
    None
}

fn dfs<'a, T: Dependent>(
    node: &'a str,
    by_name: &HashMap<&'a str, &'a T>,
    visited: &mut HashSet<&'a str>,
    path: &mut Vec<&'a str>,
) -> Option<Vec<String>> {
    visited.insert(node);
    path.push(node);

    if let Some(&def) = by_name.get(node) {
        for dep in def.requires() {
            let dep = dep.as_str();
            if let Some(start) = path.iter().position(|n| *n == dep) {
                let mut cycle: Vec<String> = path[start..].iter().map(|n| n.to_string()).collect();
                cycle.push(dep.to_string());
                return Some(cycle);
            }
            if !visited.contains(dep) && by_name.contains_key(dep) {
                if let Some(cycle) = dfs(dep, by_name, visited, path) {
                    return Some(cycle);
                }
            }
        }
    }

    path.pop();
    None
}
