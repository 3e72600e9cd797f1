use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap as Map, path::Path};

use crate::{
    components::{in_scope, ComponentDescriptor, ComponentType, Volume},
    error::Error,
    models::VolumeBinding,
};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    /// `None` when the user configuration has an explicitly empty `global` stanza.
    #[serde(default)]
    pub global: Option<GlobalConfig>,

    pub sets: Map<String, SetConfig>,

    #[serde(default)]
    pub squash: bool,

    #[serde(default)]
    pub prune: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GlobalConfig {
    #[serde(default)]
    pub passwords: PasswordsConfig,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SetConfig {
    #[serde(default)]
    pub snapshots: u32,

    #[serde(default = "default_dbprimary")]
    pub dbprimary: bool,

    #[serde(default)]
    pub dbreplicas: u32,

    #[serde(default)]
    pub dbextstore: bool,

    /// Also turns on the phpfpm container.
    #[serde(default)]
    pub httpd: bool,

    #[serde(default)]
    pub dumpsdata: bool,

    #[serde(default)]
    pub wikidbs: Vec<String>,

    #[serde(default)]
    pub passwords: PasswordsConfig,

    #[serde(default)]
    pub volumes: VolumesConfig,
}

fn default_dbprimary() -> bool {
    true
}

impl Default for SetConfig {
    fn default() -> Self {
        SetConfig {
            snapshots: 0,
            dbprimary: default_dbprimary(),
            dbreplicas: 0,
            dbextstore: false,
            httpd: false,
            dumpsdata: false,
            wikidbs: Vec::new(),
            passwords: Default::default(),
            volumes: Default::default(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PasswordsConfig {
    #[serde(default)]
    pub containers: Map<String, String>,

    /// A user listed without a password is rejected when credentials are assembled.
    #[serde(default)]
    pub dbs: Map<String, Option<String>>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VolumesConfig {
    pub wikifarm: Option<String>,
    pub dumpsrepo: Option<String>,
    pub dumpsetc: Option<String>,
    pub dumpsruns: Option<String>,
}

impl VolumesConfig {
    pub fn path(&self, volume: Volume) -> Option<&str> {
        let path = match volume {
            Volume::Wikifarm => &self.wikifarm,
            Volume::DumpsRepo => &self.dumpsrepo,
            Volume::DumpsEtc => &self.dumpsetc,
            Volume::DumpsRuns => &self.dumpsruns,
        };
        path.as_deref().filter(|path| !path.is_empty())
    }
}

/// What a single command runs with. Handed to every reconciler.
#[derive(Copy, Clone, Debug)]
pub struct Invocation<'a> {
    pub config: &'a Configuration,
    /// The build context directory, where generated files are written too.
    pub context: &'a Path,
    pub dry_run: bool,
    /// Seconds a container gets to stop before it is killed.
    pub stop_timeout: u32,
}

impl Configuration {
    pub fn set(&self, name: &str) -> Result<&SetConfig, Error> {
        self.sets
            .get(name)
            .ok_or_else(|| Error::UnknownSet(name.into()))
    }

    pub fn set_names(&self) -> Vec<&str> {
        self.sets.keys().map(|name| name.as_str()).collect()
    }
}

impl SetConfig {
    /// How many containers of this component the set asks for. Toggles count
    /// as zero or one.
    pub fn requested(&self, kind: ComponentType) -> u32 {
        let toggle = |enabled: bool| if enabled { 1 } else { 0 };
        match kind {
            ComponentType::Snapshot => self.snapshots,
            ComponentType::DbPrimary => toggle(self.dbprimary),
            ComponentType::DbReplica => self.dbreplicas,
            ComponentType::DbExtStore => toggle(self.dbextstore),
            ComponentType::Httpd | ComponentType::PhpFpm => toggle(self.httpd),
            ComponentType::DumpsData => toggle(self.dumpsdata),
        }
    }

    pub fn enabled(&self, kind: ComponentType) -> bool {
        self.requested(kind) > 0
    }

    /// Fails if the requested count is above the component's cap.
    pub fn check_cap(&self, set: &str, descriptor: &ComponentDescriptor) -> Result<u32, Error> {
        let requested = self.requested(descriptor.kind);
        match descriptor.max_instances {
            Some(max) if requested > max => Err(Error::TooManyInstances {
                set: set.into(),
                component: descriptor.kind,
                requested,
                max,
            }),
            _ => Ok(requested),
        }
    }

    /// Bind mounts for the component, failing if a host path is not configured.
    pub fn volume_bindings(
        &self,
        set: &str,
        descriptor: &ComponentDescriptor,
    ) -> Result<Vec<VolumeBinding>, Error> {
        descriptor
            .volumes
            .iter()
            .map(|mount| {
                let source = self
                    .volumes
                    .path(mount.volume)
                    .ok_or_else(|| Error::MissingVolume {
                        set: set.into(),
                        component: descriptor.kind,
                        volume: mount.volume.name(),
                    })?;

                Ok(VolumeBinding {
                    source: source.into(),
                    target: mount.target.into(),
                    read_only: mount.read_only,
                })
            })
            .collect()
    }

    /// Checks every enabled component in scope before anything is created.
    pub fn validate(&self, set: &str, filter: Option<ComponentType>) -> Result<(), Error> {
        for descriptor in in_scope(filter) {
            if !self.enabled(descriptor.kind) {
                continue;
            }
            self.check_cap(set, descriptor)?;
            self.volume_bindings(set, descriptor)?;
        }

        Ok(())
    }
}
