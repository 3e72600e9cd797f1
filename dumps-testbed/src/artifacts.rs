//! Files generated into the build context before final images are built.
//! The in-image setup scripts read them to fill in container names and
//! credentials for the set.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap as Map,
    fs::{self, File},
    path::{Path, PathBuf},
};

use crate::{
    components::COMPONENTS,
    config::{GlobalConfig, PasswordsConfig, SetConfig},
    error::Error,
};

const ROOT_USER: &str = "root";

/// Every container name the set will have once created, qualified with the
/// network name, in creation order.
pub fn container_list(set_name: &str, set: &SetConfig, network: &str) -> Vec<String> {
    COMPONENTS
        .iter()
        .flat_map(|descriptor| descriptor.container_names(set_name, set.requested(descriptor.kind)))
        .map(|name| format!("{}.{}", name, network))
        .collect()
}

pub fn container_list_path(context: &Path, set_name: &str) -> PathBuf {
    context.join(format!("container_list.{}", set_name))
}

pub fn credentials_path(context: &Path, set_name: &str) -> PathBuf {
    context.join(format!("credentials.{}.yaml", set_name))
}

pub fn write_container_list(path: &Path, names: &[String]) -> Result<()> {
    let mut contents = names.join("\n");
    contents.push('\n');
    fs::write(path, contents)?;
    Ok(())
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Root password inside the containers.
    pub rootuser: String,
    /// Root password of the database servers.
    pub rootdbuser: String,
    /// One `user: password` entry per wiki database user.
    pub wikidbusers: Vec<Map<String, String>>,
    pub wikis: Vec<String>,
}

fn container_root(passwords: &PasswordsConfig) -> Option<&str> {
    passwords
        .containers
        .get(ROOT_USER)
        .map(|password| password.as_str())
        .filter(|password| !password.is_empty())
}

fn db_root(passwords: &PasswordsConfig) -> Option<&str> {
    passwords
        .dbs
        .get(ROOT_USER)
        .and_then(|password| password.as_deref())
        .filter(|password| !password.is_empty())
}

impl Credentials {
    /// Root passwords come from the set, then from the globals. Database
    /// users other than root come from the set only.
    pub fn assemble(
        set_name: &str,
        set: &SetConfig,
        global: Option<&GlobalConfig>,
    ) -> Result<Credentials, Error> {
        let global = global.map(|global| &global.passwords);

        let rootuser = container_root(&set.passwords)
            .or_else(|| global.and_then(container_root))
            .ok_or_else(|| {
                Error::Config(format!(
                    "a root password for containers must be configured for set {:?}",
                    set_name
                ))
            })?;

        let rootdbuser = db_root(&set.passwords)
            .or_else(|| global.and_then(db_root))
            .ok_or_else(|| {
                Error::Config(format!(
                    "a root password for the db must be configured for set {:?}",
                    set_name
                ))
            })?;

        let mut wikidbusers = Vec::new();
        for (user, password) in set.passwords.dbs.iter() {
            if user == ROOT_USER {
                continue;
            }

            let password = password
                .as_deref()
                .filter(|password| !password.is_empty())
                .ok_or_else(|| {
                    Error::Config(format!(
                        "db user {:?} in set {:?} has no password",
                        user, set_name
                    ))
                })?;

            let mut entry = Map::new();
            entry.insert(user.clone(), password.to_string());
            wikidbusers.push(entry);
        }

        Ok(Credentials {
            rootuser: rootuser.into(),
            rootdbuser: rootdbuser.into(),
            wikidbusers,
            wikis: set.wikidbs.clone(),
        })
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let file = File::create(path)?;
        serde_yaml::to_writer(file, self)?;
        Ok(())
    }
}
