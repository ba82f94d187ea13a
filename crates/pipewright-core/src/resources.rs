//! Resource limits and the GPU tier table.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Size of the output volume when a job does not set `output_size`.
pub const DEFAULT_OUTPUT_SIZE: &str = "5Gi";

/// Limits handed to the execution engine for one node.
///
/// These are directives only; enforcement belongs to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLimits {
    /// Memory limit (e.g., "8G").
    pub memory: String,
    /// CPU limit (e.g., "2").
    pub cpu: String,
    /// GPU devices, if any were requested.
    pub gpu: Option<GpuLimit>,
    /// Requested size of the output volume (e.g., "5Gi").
    pub output_size: String,
}

/// A GPU request: a device class and how many of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GpuLimit {
    pub device_class: String,
    pub count: u32,
}

/// GPU memory tiers, each backed by one MIG device profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GpuTier {
    Gb10,
    Gb20,
    Gb40,
    Gb80,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown gpu tier: {0}")]
pub struct UnknownGpuTier(pub String);

impl GpuTier {
    pub const ALL: [GpuTier; 4] = [GpuTier::Gb10, GpuTier::Gb20, GpuTier::Gb40, GpuTier::Gb80];

    /// Device-class resource name requested from the cluster.
    pub fn device_class(self) -> &'static str {
        match self {
            GpuTier::Gb10 => "nvidia.com/mig-1g.10gb",
            GpuTier::Gb20 => "nvidia.com/mig-2g.20gb",
            GpuTier::Gb40 => "nvidia.com/mig-4g.40gb",
            GpuTier::Gb80 => "nvidia.com/mig-7g.80gb",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            GpuTier::Gb10 => "10gb",
            GpuTier::Gb20 => "20gb",
            GpuTier::Gb40 => "40gb",
            GpuTier::Gb80 => "80gb",
        }
    }
}

impl FromStr for GpuTier {
    type Err = UnknownGpuTier;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "10gb" => Ok(GpuTier::Gb10),
            "20gb" => Ok(GpuTier::Gb20),
            "40gb" => Ok(GpuTier::Gb40),
            "80gb" => Ok(GpuTier::Gb80),
            other => Err(UnknownGpuTier(other.to_string())),
        }
    }
}

impl fmt::Display for GpuTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
