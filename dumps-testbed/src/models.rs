use ipnetwork::Ipv4Network;
use std::{collections::BTreeMap as Map, fmt, path::PathBuf};

pub type Labels = Map<String, String>;

#[derive(Clone, Debug, Hash, PartialOrd, Ord, PartialEq, Eq)]
pub struct NetworkId(pub String);

#[derive(Clone, Debug, Hash, PartialOrd, Ord, PartialEq, Eq)]
pub struct ImageId(pub String);

#[derive(Clone, Debug, Hash, PartialOrd, Ord, PartialEq, Eq)]
pub struct ImageTag(pub String);

#[derive(Clone, Debug, Hash, PartialOrd, Ord, PartialEq, Eq)]
pub struct ContainerId(pub String);

#[derive(Clone, Debug, Hash, PartialOrd, Ord, PartialEq, Eq)]
pub struct ContainerName(pub String);

impl fmt::Display for ImageTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for ContainerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl ContainerId {
    /// The 12 character prefix the docker cli shows.
    pub fn short(&self) -> &str {
        let end = self.0.len().min(12);
        &self.0[..end]
    }
}

impl ImageId {
    /// The digest without its algorithm, cut like a container id.
    pub fn short(&self) -> &str {
        let digest = self.0.strip_prefix("sha256:").unwrap_or(&self.0);
        let end = digest.len().min(12);
        &digest[..end]
    }
}

#[derive(Clone, Debug)]
pub struct Network {
    pub id: NetworkId,
    pub name: String,
    pub labels: Labels,
    /// Subnets from the IPAM configuration, as the runtime reports them.
    pub subnets: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct NetworkSpec {
    pub name: String,
    pub driver: String,
    pub subnet: Ipv4Network,
    pub labels: Labels,
}

#[derive(Clone, Debug)]
pub struct Image {
    pub id: ImageId,
    pub tags: Vec<ImageTag>,
    pub labels: Labels,
}

#[derive(Clone, Debug)]
pub struct ImageBuildSpec {
    pub tag: ImageTag,
    pub context: PathBuf,
    /// Recipe file name, relative to `context`.
    pub dockerfile: String,
    pub labels: Labels,
    pub build_args: Map<String, String>,
    pub squash: bool,
}

#[derive(Clone, Debug)]
pub struct Container {
    pub id: ContainerId,
    pub name: ContainerName,
    pub image: String,
    pub status: ContainerStatus,
    pub labels: Labels,
}

#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq)]
pub enum ContainerStatus {
    Created,
    Running,
    Exited,
    Unknown,
}

impl ContainerStatus {
    /// Whether the container has to be stopped before it can be removed.
    pub fn is_active(self) -> bool {
        match self {
            ContainerStatus::Created | ContainerStatus::Exited => false,
            ContainerStatus::Running | ContainerStatus::Unknown => true,
        }
    }
}

impl fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = match self {
            ContainerStatus::Created => "created",
            ContainerStatus::Running => "running",
            ContainerStatus::Exited => "exited",
            ContainerStatus::Unknown => "unknown",
        };
        f.pad(status)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VolumeBinding {
    pub source: String,
    pub target: String,
    pub read_only: bool,
}

impl VolumeBinding {
    /// The `source:target:mode` form used for bind mounts.
    pub fn to_bind(&self) -> String {
        let mode = if self.read_only { "ro" } else { "rw" };
        format!("{}:{}:{}", self.source, self.target, mode)
    }
}

#[derive(Clone, Debug)]
pub struct ContainerSpec {
    pub name: ContainerName,
    pub image: ImageTag,
    pub labels: Labels,
    pub network: String,
    pub domain_name: String,
    pub volumes: Vec<VolumeBinding>,
}
