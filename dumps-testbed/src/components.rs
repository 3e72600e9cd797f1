use std::{fmt, str::FromStr};

use crate::{
    error::Error,
    models::{ContainerName, ImageTag},
};

/// The image every base image is built on top of.
pub const FOUNDATION_IMAGE: &str = "wikimedia-dumps/base:latest";
pub const FOUNDATION_RECIPE: &str = "Dockerfile.base";

const IMAGE_PREFIX: &str = "wikimedia-dumps";

#[derive(Copy, Clone, Debug, Hash, PartialOrd, Ord, PartialEq, Eq)]
pub enum ComponentType {
    Snapshot,
    DbPrimary,
    DbReplica,
    DbExtStore,
    Httpd,
    PhpFpm,
    DumpsData,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Volume {
    Wikifarm,
    DumpsRepo,
    DumpsEtc,
    DumpsRuns,
}

impl Volume {
    pub fn name(self) -> &'static str {
        match self {
            Volume::Wikifarm => "wikifarm",
            Volume::DumpsRepo => "dumpsrepo",
            Volume::DumpsEtc => "dumpsetc",
            Volume::DumpsRuns => "dumpsruns",
        }
    }
}

#[derive(Copy, Clone, Debug)]
pub struct VolumeMount {
    pub volume: Volume,
    pub target: &'static str,
    pub read_only: bool,
}

#[derive(Debug)]
pub struct ComponentDescriptor {
    pub kind: ComponentType,
    /// Replicated components carry a cap, singletons carry `None`.
    pub max_instances: Option<u32>,
    pub container_basename: &'static str,
    pub image_basename: &'static str,
    pub volumes: &'static [VolumeMount],
}

const WIKIFARM: VolumeMount = VolumeMount {
    volume: Volume::Wikifarm,
    target: "/srv/mediawiki/wikifarm",
    read_only: false,
};

/// Creation order, and the order names appear in the generated container list.
pub static COMPONENTS: [ComponentDescriptor; 7] = [
    ComponentDescriptor {
        kind: ComponentType::Snapshot,
        max_instances: Some(99),
        container_basename: "snapshot",
        image_basename: "snapshot",
        volumes: &[
            WIKIFARM,
            VolumeMount {
                volume: Volume::DumpsRepo,
                target: "/srv/dumps/dumpsrepo",
                read_only: true,
            },
            VolumeMount {
                volume: Volume::DumpsEtc,
                target: "/srv/dumps/etc",
                read_only: true,
            },
            VolumeMount {
                volume: Volume::DumpsRuns,
                target: "/srv/dumps/runs",
                read_only: false,
            },
        ],
    },
    ComponentDescriptor {
        kind: ComponentType::DbPrimary,
        max_instances: None,
        container_basename: "dbprimary",
        image_basename: "dbprimary",
        volumes: &[],
    },
    ComponentDescriptor {
        kind: ComponentType::DbReplica,
        max_instances: Some(99),
        container_basename: "db",
        image_basename: "dbreplica",
        volumes: &[],
    },
    ComponentDescriptor {
        kind: ComponentType::DbExtStore,
        max_instances: None,
        container_basename: "dbextstore",
        image_basename: "dbextstore",
        volumes: &[],
    },
    ComponentDescriptor {
        kind: ComponentType::Httpd,
        max_instances: None,
        container_basename: "httpd",
        image_basename: "httpd",
        volumes: &[WIKIFARM],
    },
    ComponentDescriptor {
        kind: ComponentType::PhpFpm,
        max_instances: None,
        container_basename: "phpfpm",
        image_basename: "phpfpm",
        volumes: &[WIKIFARM],
    },
    ComponentDescriptor {
        kind: ComponentType::DumpsData,
        max_instances: None,
        container_basename: "dumpsdata",
        image_basename: "dumpsdata",
        volumes: &[],
    },
];

/// Descriptors for every component, or just the filtered one.
pub fn in_scope(filter: Option<ComponentType>) -> impl Iterator<Item = &'static ComponentDescriptor> {
    COMPONENTS
        .iter()
        .filter(move |descriptor| filter.map_or(true, |kind| descriptor.kind == kind))
}

/// Whether `tag` names a base image of any component.
pub fn is_base_tag(tag: &ImageTag) -> bool {
    tag.0.starts_with(IMAGE_PREFIX) && tag.0.ends_with("-base:latest") && tag.0 != FOUNDATION_IMAGE
}

/// Whether `tag` names a final image of any component in any set.
pub fn is_final_tag(tag: &ImageTag) -> bool {
    tag.0.starts_with(IMAGE_PREFIX) && tag.0.ends_with("-final:latest")
}

/// Whether `tag` names a final image of `set`.
pub fn is_final_tag_of(tag: &ImageTag, set: &str) -> bool {
    COMPONENTS
        .iter()
        .any(|descriptor| descriptor.final_image(set) == *tag)
}

impl ComponentType {
    pub fn descriptor(self) -> &'static ComponentDescriptor {
        let index = match self {
            ComponentType::Snapshot => 0,
            ComponentType::DbPrimary => 1,
            ComponentType::DbReplica => 2,
            ComponentType::DbExtStore => 3,
            ComponentType::Httpd => 4,
            ComponentType::PhpFpm => 5,
            ComponentType::DumpsData => 6,
        };
        &COMPONENTS[index]
    }
}

impl ComponentDescriptor {
    pub fn base_image(&self) -> ImageTag {
        ImageTag(format!("{}/{}-base:latest", IMAGE_PREFIX, self.image_basename))
    }

    pub fn final_image(&self, set: &str) -> ImageTag {
        ImageTag(format!(
            "{}/{}-{}-final:latest",
            IMAGE_PREFIX, self.image_basename, set
        ))
    }

    pub fn base_recipe(&self) -> String {
        format!("Dockerfile.{}-base", self.image_basename)
    }

    pub fn final_recipe(&self) -> String {
        format!("Dockerfile.{}-final", self.image_basename)
    }

    /// Names of the `count` containers of this component in `set`.
    /// Replicated components get a two digit, 1-based index.
    pub fn container_names(&self, set: &str, count: u32) -> Vec<ContainerName> {
        match self.max_instances {
            Some(_) => (1..=count)
                .map(|index| {
                    ContainerName(format!("{}-{}-{:02}", set, self.container_basename, index))
                })
                .collect(),
            None if count > 0 => vec![ContainerName(format!(
                "{}-{}",
                set, self.container_basename
            ))],
            None => Vec::new(),
        }
    }

    /// Whether `name` is one of this component's containers in `set`.
    pub fn owns_container(&self, set: &str, name: &str) -> bool {
        let stem = format!("{}-{}", set, self.container_basename);
        name == stem || name.starts_with(&format!("{}-", stem))
    }
}

impl fmt::Display for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.descriptor().image_basename)
    }
}

impl FromStr for ComponentType {
    type Err = Error;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        if name == "nfs" {
            return Ok(ComponentType::DumpsData);
        }

        COMPONENTS
            .iter()
            .find(|descriptor| descriptor.image_basename == name)
            .map(|descriptor| descriptor.kind)
            .ok_or_else(|| Error::UnknownComponent(name.into()))
    }
}
