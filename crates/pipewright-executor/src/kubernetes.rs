//! Kubernetes manifest engine.
//!
//! Renders every node as a batch/v1 Job and every output artifact as a
//! PersistentVolumeClaim. Ordering is recorded in an annotation for the
//! controller that applies the manifests.

use std::collections::{BTreeMap, HashMap};

use k8s_openapi::api::batch::v1::{Job, JobSpec};
use k8s_openapi::api::core::v1::{
    Container, EnvVar, PersistentVolumeClaim, PersistentVolumeClaimSpec,
    PersistentVolumeClaimVolumeSource, PodSpec, PodTemplateSpec, ResourceRequirements, Volume,
    VolumeMount, VolumeResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use pipewright_core::engine::{ArtifactHandle, ContainerSpec, ExecutionEngine, NodeHandle};
use pipewright_core::job::OUTPUT_PATH;
use pipewright_core::resources::ResourceLimits;
use pipewright_core::{Error, Result};
use tracing::debug;

pub const DEPENDS_ON_ANNOTATION: &str = "pipewright.io/depends-on";
pub const PIPELINE_ANNOTATION: &str = "pipewright.io/pipeline";
pub const JOB_LABEL: &str = "pipewright.io/job";
const MANAGED_BY: (&str, &str) = ("app.kubernetes.io/managed-by", "pipewright");
const CONTAINER_NAME: &str = "main";
const OUTPUT_VOLUME: &str = "output";
const INPUT_VOLUME_PREFIX: &str = "input-";

/// Collects Kubernetes manifests for a pipeline.
#[derive(Debug)]
pub struct KubernetesManifests {
    namespace: String,
    pipeline: String,
    jobs: Vec<Job>,
    claims: Vec<PersistentVolumeClaim>,
    /// Job name → (index in `jobs`, requested output size).
    index: HashMap<String, (usize, String)>,
}

impl KubernetesManifests {
    pub fn new(namespace: impl Into<String>, pipeline: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            pipeline: pipeline.into(),
            jobs: Vec::new(),
            claims: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }

    pub fn claims(&self) -> &[PersistentVolumeClaim] {
        &self.claims
    }

    /// All manifests as JSON, volume claims before the jobs that mount them.
    pub fn to_manifests(&self) -> Result<Vec<serde_json::Value>> {
        let claims = self.claims.iter().map(serde_json::to_value);
        let jobs = self.jobs.iter().map(serde_json::to_value);
        claims
            .chain(jobs)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::Engine(format!("failed to serialize manifest: {}", e)))
    }

    /// Metadata for an object `name` belonging to `job`.
    fn metadata(&self, name: &str, job: &str) -> ObjectMeta {
        ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(self.namespace.clone()),
            labels: Some(BTreeMap::from([
                (MANAGED_BY.0.to_string(), MANAGED_BY.1.to_string()),
                (JOB_LABEL.to_string(), job.to_string()),
            ])),
            annotations: Some(BTreeMap::from([(
                PIPELINE_ANNOTATION.to_string(),
                self.pipeline.clone(),
            )])),
            ..Default::default()
        }
    }

    fn lookup(&self, handle: &NodeHandle) -> Result<(usize, String)> {
        self.index
            .get(&handle.id)
            .cloned()
            .ok_or_else(|| Error::Engine(format!("unknown node handle '{}'", handle.id)))
    }

    fn pod_spec_mut(&mut self, idx: usize) -> Result<&mut PodSpec> {
        self.jobs[idx]
            .spec
            .as_mut()
            .and_then(|spec| spec.template.spec.as_mut())
            .ok_or_else(|| Error::Engine("job manifest has no pod spec".to_string()))
    }

    /// Attach a claim-backed volume to the job's pod and its container.
    fn attach_volume(
        &mut self,
        idx: usize,
        volume: &str,
        claim: &str,
        mount_path: &str,
        read_only: bool,
    ) -> Result<()> {
        let pod = self.pod_spec_mut(idx)?;
        let container = pod
            .containers
            .first_mut()
            .ok_or_else(|| Error::Engine("job manifest has no container".to_string()))?;
        let mounts = container.volume_mounts.get_or_insert_with(Vec::new);
        let volumes = pod.volumes.get_or_insert_with(Vec::new);

        // Check both before touching either, so a rejected attach changes nothing.
        if volumes.iter().any(|v| v.name == volume) {
            return Err(Error::Engine(format!("volume '{}' is already attached", volume)));
        }
        if mounts.iter().any(|m| m.mount_path == mount_path) {
            return Err(Error::Engine(format!("mount path {} is already in use", mount_path)));
        }

        volumes.push(Volume {
            name: volume.to_string(),
            persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                claim_name: claim.to_string(),
                read_only: Some(read_only),
            }),
            ..Default::default()
        });
        mounts.push(VolumeMount {
            name: volume.to_string(),
            mount_path: mount_path.to_string(),
            read_only: Some(read_only),
            ..Default::default()
        });
        Ok(())
    }
}

fn resource_requirements(resources: &ResourceLimits) -> ResourceRequirements {
    let mut limits = BTreeMap::from([
        ("memory".to_string(), Quantity(resources.memory.clone())),
        ("cpu".to_string(), Quantity(resources.cpu.clone())),
    ]);
    if let Some(gpu) = &resources.gpu {
        limits.insert(gpu.device_class.clone(), Quantity(gpu.count.to_string()));
    }
    ResourceRequirements {
        limits: Some(limits),
        ..Default::default()
    }
}

impl ExecutionEngine for KubernetesManifests {
    fn name(&self) -> &'static str {
        "kubernetes"
    }

    fn create_node(&mut self, spec: ContainerSpec<'_>) -> Result<NodeHandle> {
        if self.index.contains_key(spec.name) {
            return Err(Error::Engine(format!("job '{}' already exists", spec.name)));
        }

        let env = spec
            .env
            .iter()
            .map(|(name, value)| EnvVar {
                name: name.clone(),
                value: Some(value.clone()),
                ..Default::default()
            })
            .collect();

        let container = Container {
            name: CONTAINER_NAME.to_string(),
            image: Some(spec.image.to_string()),
            command: Some(spec.command),
            env: Some(env),
            resources: Some(resource_requirements(spec.resources)),
            ..Default::default()
        };

        let metadata = self.metadata(spec.name, spec.name);
        let job = Job {
            metadata: metadata.clone(),
            spec: Some(JobSpec {
                template: PodTemplateSpec {
                    metadata: Some(ObjectMeta {
                        labels: metadata.labels,
                        ..Default::default()
                    }),
                    spec: Some(PodSpec {
                        containers: vec![container],
                        restart_policy: Some("Never".to_string()),
                        ..Default::default()
                    }),
                },
                ..Default::default()
            }),
            ..Default::default()
        };

        debug!(job = %spec.name, namespace = %self.namespace, "Rendered job manifest");
        self.index.insert(
            spec.name.to_string(),
            (self.jobs.len(), spec.resources.output_size.clone()),
        );
        self.jobs.push(job);

        Ok(NodeHandle {
            id: spec.name.to_string(),
            job: spec.name.to_string(),
        })
    }

    fn declare_dependency(&mut self, consumer: &NodeHandle, producer: &NodeHandle) -> Result<()> {
        let (idx, _) = self.lookup(consumer)?;
        self.lookup(producer)?;

        let annotations = self.jobs[idx]
            .metadata
            .annotations
            .get_or_insert_with(BTreeMap::new);
        let entry = annotations
            .entry(DEPENDS_ON_ANNOTATION.to_string())
            .or_default();
        if !entry.split(',').any(|dep| dep == producer.job) {
            if !entry.is_empty() {
                entry.push(',');
            }
            entry.push_str(&producer.job);
        }
        Ok(())
    }

    fn mount_artifact(
        &mut self,
        node: &NodeHandle,
        path: &str,
        source: &ArtifactHandle,
    ) -> Result<()> {
        let (idx, _) = self.lookup(node)?;
        // Volume names are DNS-1123 labels; job names may already use all 63 characters.
        let inputs = self
            .pod_spec_mut(idx)?
            .volumes
            .as_ref()
            .map_or(0, |volumes| {
                volumes.iter().filter(|v| v.name.starts_with(INPUT_VOLUME_PREFIX)).count()
            });
        let volume = format!("{}{}", INPUT_VOLUME_PREFIX, inputs);
        self.attach_volume(idx, &volume, &source.id, path, true)
    }

    fn declare_output_artifact(&mut self, node: &NodeHandle) -> Result<ArtifactHandle> {
        let (idx, size) = self.lookup(node)?;
        let claim_name = format!("{}-output", node.job);

        self.attach_volume(idx, OUTPUT_VOLUME, &claim_name, OUTPUT_PATH, false)?;
        self.claims.push(PersistentVolumeClaim {
            metadata: self.metadata(&claim_name, &node.job),
            spec: Some(PersistentVolumeClaimSpec {
                access_modes: Some(vec!["ReadWriteMany".to_string()]),
                resources: Some(VolumeResourceRequirements {
                    requests: Some(BTreeMap::from([("storage".to_string(), Quantity(size))])),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        });

        Ok(ArtifactHandle {
            id: claim_name,
            producer: node.job.clone(),
        })
    }
}
