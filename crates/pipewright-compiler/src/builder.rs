//! Construction of job nodes from definitions, settings and job configs.

use std::collections::BTreeMap;

use pipewright_config::Credentials;
use pipewright_core::job::{
    InputMount, JobConfig, JobDefinition, JobNode, OUTPUT_PATH, input_mount_path,
};
use pipewright_core::resources::{DEFAULT_OUTPUT_SIZE, GpuLimit, GpuTier, ResourceLimits};
use pipewright_core::secret::SecretProvider;
use pipewright_core::vcs::VersionControl;
use pipewright_core::{ConfigValue, Error, ResolvedSettings, Result};
use tracing::debug;

use crate::commands::job_commands;
use crate::dag::JobGraph;

/// Collaborators shared by every node of one compilation.
#[derive(Clone, Copy)]
pub struct BuildContext<'a> {
    pub credentials: &'a Credentials,
    pub vcs: &'a dyn VersionControl,
    pub secrets: &'a dyn SecretProvider,
}

/// Construct the node for one job.
///
/// `built` holds the nodes constructed so far; every job named in
/// `requires` must already be in it. The only outside calls are the
/// revision lookup and secret resolution through `ctx`.
pub fn build_node(
    definition: &JobDefinition,
    settings: &ResolvedSettings,
    config: &JobConfig,
    built: &JobGraph,
    ctx: &BuildContext<'_>,
) -> Result<JobNode> {
    let job = definition.name.as_str();

    for upstream in &definition.requires {
        if built.node(upstream).is_none() {
            return Err(Error::MissingUpstream {
                job: job.to_string(),
                upstream: upstream.clone(),
            });
        }
    }

    let commit = resolve_commit(definition, ctx.vcs)?;
    let commands = job_commands(
        definition,
        &commit,
        &ctx.credentials.github_oauth_token,
        config.entrypoint(),
    );
    let resources = resource_limits(job, settings)?;
    let env = environment(job, settings, config, ctx.secrets)?;

    let inputs = definition
        .requires
        .iter()
        .map(|upstream| InputMount {
            upstream: upstream.clone(),
            path: input_mount_path(upstream),
        })
        .collect();

    debug!(
        job = %job,
        commit = %commit,
        image = %config.docker,
        requires = ?definition.requires,
        "Constructed job node"
    );

    Ok(JobNode {
        name: definition.name.clone(),
        image: config.docker.clone(),
        commit,
        commands,
        resources,
        env,
        requires: definition.requires.clone(),
        inputs,
        output_path: OUTPUT_PATH.to_string(),
    })
}

fn resolve_commit(definition: &JobDefinition, vcs: &dyn VersionControl) -> Result<String> {
    if let Some(commit) = definition.commit.as_ref().filter(|c| !c.is_empty()) {
        return Ok(commit.clone());
    }
    vcs.current_commit_hash().map_err(|e| match e {
        Error::RevisionResolution(message) => {
            Error::RevisionResolution(format!("job '{}': {}", definition.name, message))
        }
        other => other,
    })
}

/// Map resolved settings onto engine resource limits.
///
/// `memory` (GB) and `cpus` are required. A GPU limit is attached only when
/// `gpus` is positive and `gpu_size` is set; `gpu_size` is checked against
/// the tier table whenever it is present.
pub fn resource_limits(job: &str, settings: &ResolvedSettings) -> Result<ResourceLimits> {
    let memory = format!("{}G", quantity(job, settings, "memory")?);
    let cpu = quantity(job, settings, "cpus")?;

    let tier = match settings.get("gpu_size") {
        None => None,
        Some(ConfigValue::String(size)) => {
            Some(size.parse::<GpuTier>().map_err(|e| Error::UnknownGpuTier {
                job: job.to_string(),
                tier: e.0,
            })?)
        }
        Some(other) => return Err(unexpected(job, "gpu_size", "a string", other)),
    };

    let count = match settings.get("gpus") {
        None => 0,
        Some(ConfigValue::Integer(n)) => u32::try_from(*n)
            .map_err(|_| invalid(job, "gpus", format!("{} is not a valid device count", n)))?,
        Some(other) => return Err(unexpected(job, "gpus", "an integer", other)),
    };

    let gpu = match tier {
        Some(tier) if count > 0 => Some(GpuLimit {
            device_class: tier.device_class().to_string(),
            count,
        }),
        _ => None,
    };

    let output_size = match settings.get("output_size") {
        None => DEFAULT_OUTPUT_SIZE.to_string(),
        Some(ConfigValue::String(size)) if !size.is_empty() => size.clone(),
        Some(other) => return Err(unexpected(job, "output_size", "a size string", other)),
    };

    Ok(ResourceLimits {
        memory,
        cpu,
        gpu,
        output_size,
    })
}

fn quantity(job: &str, settings: &ResolvedSettings, field: &str) -> Result<String> {
    let value = settings
        .get(field)
        .ok_or_else(|| invalid(job, field, "required".to_string()))?;

    let (text, amount) = match value {
        ConfigValue::Integer(i) => (i.to_string(), *i as f64),
        ConfigValue::Float(f) => (f.to_string(), *f),
        ConfigValue::String(s) => {
            let amount = s
                .parse::<f64>()
                .map_err(|_| invalid(job, field, format!("'{}' is not a number", s)))?;
            (s.clone(), amount)
        }
        other => return Err(unexpected(job, field, "a number", other)),
    };

    if !(amount > 0.0) {
        return Err(invalid(job, field, format!("{} must be positive", text)));
    }
    Ok(text)
}

/// Environment for a job node.
///
/// The resolved `env` is used when present, otherwise the job config's
/// `env`; the two are never merged. Secrets are resolved afterwards and
/// override variables of the same name.
pub fn environment(
    job: &str,
    settings: &ResolvedSettings,
    config: &JobConfig,
    secrets: &dyn SecretProvider,
) -> Result<BTreeMap<String, String>> {
    let mut env = match settings.get("env") {
        Some(ConfigValue::Map(vars)) => vars
            .iter()
            .map(|(k, v)| (k.clone(), v.to_env_string()))
            .collect(),
        Some(other) => return Err(unexpected(job, "env", "a mapping", other)),
        None => config.env.clone().unwrap_or_default(),
    };

    match settings.get("secrets") {
        None => {}
        Some(ConfigValue::Map(entries)) => {
            for (name, reference) in entries {
                let value = secrets.resolve(&reference.to_env_string())?;
                env.insert(name.clone(), value);
            }
        }
        Some(other) => return Err(unexpected(job, "secrets", "a mapping", other)),
    }

    Ok(env)
}

fn unexpected(job: &str, field: &str, expected: &str, found: &ConfigValue) -> Error {
    invalid(job, field, format!("expected {}, found {}", expected, found.kind()))
}

fn invalid(job: &str, field: &str, message: String) -> Error {
    Error::InvalidSettings {
        job: job.to_string(),
        field: field.to_string(),
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipewright_core::secret::{InlineSecrets, StaticSecrets};
    use pipewright_core::vcs::FixedRevision;

    struct NoRepository;

    impl VersionControl for NoRepository {
        fn current_commit_hash(&self) -> Result<String> {
            Err(Error::RevisionResolution("not a git repository".to_string()))
        }

        fn current_branch_name(&self) -> Result<String> {
            Err(Error::RevisionResolution("not a git repository".to_string()))
        }
    }

    fn settings(fields: &[(&str, ConfigValue)]) -> ResolvedSettings {
        fields
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn base_settings() -> Vec<(&'static str, ConfigValue)> {
        vec![("memory", ConfigValue::Integer(8)), ("cpus", ConfigValue::Integer(2))]
    }

    fn string_map(pairs: &[(&str, &str)]) -> ConfigValue {
        ConfigValue::Map(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), ConfigValue::from(*v)))
                .collect(),
        )
    }

    fn head() -> FixedRevision {
        FixedRevision {
            commit: "deadbeef".to_string(),
            branch: "main".to_string(),
        }
    }

    #[test]
    fn test_basic_limits() {
        let limits = resource_limits("job", &settings(&base_settings())).unwrap();
        assert_eq!(limits.memory, "8G");
        assert_eq!(limits.cpu, "2");
        assert_eq!(limits.gpu, None);
        assert_eq!(limits.output_size, "5Gi");
    }

    #[test]
    fn test_fractional_limits() {
        let limits = resource_limits(
            "job",
            &settings(&[("memory", ConfigValue::Float(1.5)), ("cpus", ConfigValue::Float(0.5))]),
        )
        .unwrap();
        assert_eq!(limits.memory, "1.5G");
        assert_eq!(limits.cpu, "0.5");
    }

    #[test]
    fn test_gpu_limit() {
        let mut fields = base_settings();
        fields.push(("gpus", ConfigValue::Integer(2)));
        fields.push(("gpu_size", ConfigValue::from("40gb")));

        let gpu = resource_limits("job", &settings(&fields)).unwrap().gpu.unwrap();
        assert_eq!(gpu.device_class, "nvidia.com/mig-4g.40gb");
        assert_eq!(gpu.count, 2);
    }

    #[test]
    fn test_unknown_gpu_tier() {
        let mut fields = base_settings();
        fields.push(("gpus", ConfigValue::Integer(2)));
        fields.push(("gpu_size", ConfigValue::from("99gb")));

        let err = resource_limits("train", &settings(&fields)).unwrap_err();
        match err {
            Error::UnknownGpuTier { job, tier } => {
                assert_eq!(job, "train");
                assert_eq!(tier, "99gb");
            }
            other => panic!("Expected UnknownGpuTier, got {:?}", other),
        }
    }

    #[test]
    fn test_no_gpu_without_both_fields() {
        let mut only_count = base_settings();
        only_count.push(("gpus", ConfigValue::Integer(1)));
        assert!(resource_limits("j", &settings(&only_count)).unwrap().gpu.is_none());

        let mut only_size = base_settings();
        only_size.push(("gpu_size", ConfigValue::from("10gb")));
        assert!(resource_limits("j", &settings(&only_size)).unwrap().gpu.is_none());

        let mut zero = base_settings();
        zero.push(("gpus", ConfigValue::Integer(0)));
        zero.push(("gpu_size", ConfigValue::from("10gb")));
        assert!(resource_limits("j", &settings(&zero)).unwrap().gpu.is_none());
    }

    #[test]
    fn test_missing_memory() {
        let err =
            resource_limits("j", &settings(&[("cpus", ConfigValue::Integer(1))])).unwrap_err();
        assert!(matches!(err, Error::InvalidSettings { field, .. } if field == "memory"));
    }

    #[test]
    fn test_non_positive_cpus() {
        let err = resource_limits(
            "j",
            &settings(&[("memory", ConfigValue::Integer(1)), ("cpus", ConfigValue::Integer(0))]),
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidSettings { field, .. } if field == "cpus"));
    }

    #[test]
    fn test_custom_output_size() {
        let mut fields = base_settings();
        fields.push(("output_size", ConfigValue::from("20Gi")));
        assert_eq!(
            resource_limits("j", &settings(&fields)).unwrap().output_size,
            "20Gi"
        );
    }

    #[test]
    fn test_settings_env_replaces_config_env() {
        let mut config = JobConfig::new("alpine");
        config.env = Some(BTreeMap::from([("FROM_CONFIG".to_string(), "1".to_string())]));

        let mut fields = base_settings();
        fields.push(("env", string_map(&[("FROM_SETTINGS", "2")])));

        let env = environment("j", &settings(&fields), &config, &InlineSecrets).unwrap();
        assert_eq!(env.get("FROM_SETTINGS").map(String::as_str), Some("2"));
        assert!(!env.contains_key("FROM_CONFIG"));
    }

    #[test]
    fn test_config_env_used_without_settings_env() {
        let mut config = JobConfig::new("alpine");
        config.env = Some(BTreeMap::from([("FROM_CONFIG".to_string(), "1".to_string())]));

        let env = environment("j", &settings(&base_settings()), &config, &InlineSecrets).unwrap();
        assert_eq!(env.get("FROM_CONFIG").map(String::as_str), Some("1"));
    }

    #[test]
    fn test_secrets_become_env_vars() {
        let mut fields = base_settings();
        fields.push(("env", string_map(&[("TOKEN", "plain")])));
        fields.push(("secrets", string_map(&[("TOKEN", "db-token"), ("API", "api-ref")])));

        let provider = StaticSecrets::new()
            .with("db-token", "t0k3n")
            .with("api-ref", "k3y");
        let env =
            environment("j", &settings(&fields), &JobConfig::new("alpine"), &provider).unwrap();

        assert_eq!(env.get("TOKEN").map(String::as_str), Some("t0k3n"));
        assert_eq!(env.get("API").map(String::as_str), Some("k3y"));
    }

    #[test]
    fn test_unresolvable_secret_fails() {
        let mut fields = base_settings();
        fields.push(("secrets", string_map(&[("TOKEN", "missing")])));

        let config = JobConfig::new("alpine");
        let err = environment("j", &settings(&fields), &config, &StaticSecrets::new()).unwrap_err();
        assert!(matches!(err, Error::Secret(_)));
    }

    #[test]
    fn test_build_node_uses_pinned_commit() {
        let credentials = Credentials::new("tok");
        let vcs = NoRepository;
        let ctx = BuildContext {
            credentials: &credentials,
            vcs: &vcs,
            secrets: &InlineSecrets,
        };
        let def = JobDefinition::new("train", "jobs/train", "https://github.com/acme/ml", "main")
            .with_commit("abc123");

        let node = build_node(
            &def,
            &settings(&base_settings()),
            &JobConfig::new("python:3.11"),
            &JobGraph::new(),
            &ctx,
        )
        .unwrap();

        assert_eq!(node.commit, "abc123");
        assert_eq!(node.image, "python:3.11");
        assert_eq!(node.output_path, "/output");
        assert!(node.commands.contains(&"git checkout abc123".to_string()));
        assert_eq!(node.container_command()[..2], ["sh".to_string(), "-c".to_string()]);
    }

    #[test]
    fn test_build_node_resolves_current_commit() {
        let credentials = Credentials::new("tok");
        let vcs = head();
        let ctx = BuildContext {
            credentials: &credentials,
            vcs: &vcs,
            secrets: &InlineSecrets,
        };
        let def = JobDefinition::new("train", "jobs/train", "repo", "main");

        let node = build_node(
            &def,
            &settings(&base_settings()),
            &JobConfig::new("alpine"),
            &JobGraph::new(),
            &ctx,
        )
        .unwrap();
        assert_eq!(node.commit, "deadbeef");
    }

    #[test]
    fn test_build_node_revision_failure_names_job() {
        let credentials = Credentials::new("tok");
        let vcs = NoRepository;
        let ctx = BuildContext {
            credentials: &credentials,
            vcs: &vcs,
            secrets: &InlineSecrets,
        };
        let def = JobDefinition::new("train", "jobs/train", "repo", "main");

        let err = build_node(
            &def,
            &settings(&base_settings()),
            &JobConfig::new("alpine"),
            &JobGraph::new(),
            &ctx,
        )
        .unwrap_err();
        assert!(matches!(err, Error::RevisionResolution(msg) if msg.contains("train")));
    }

    #[test]
    fn test_build_node_requires_constructed_upstream() {
        let credentials = Credentials::new("tok");
        let vcs = head();
        let ctx = BuildContext {
            credentials: &credentials,
            vcs: &vcs,
            secrets: &InlineSecrets,
        };
        let def = JobDefinition::new("train", "jobs/train", "repo", "main")
            .with_requires(["prepare"]);

        let err = build_node(
            &def,
            &settings(&base_settings()),
            &JobConfig::new("alpine"),
            &JobGraph::new(),
            &ctx,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            Error::MissingUpstream { job, upstream } if job == "train" && upstream == "prepare"
        ));
    }
}
