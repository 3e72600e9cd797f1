use anyhow::Result;
use serde_yaml::{Mapping, Value};
use std::{fs::File, path::Path};

use crate::{config::Configuration, error::Error, services::ConfigFrontend};

/// Reads `default.conf` and an optional user configuration, both YAML, and
/// merges the user's settings over the defaults.
pub struct YamlConfigFrontend;

impl YamlConfigFrontend {
    pub fn new() -> YamlConfigFrontend {
        YamlConfigFrontend
    }
}

impl ConfigFrontend for YamlConfigFrontend {
    fn configuration(
        &mut self,
        defaults_path: &Path,
        user_path: Option<&Path>,
    ) -> Result<Configuration> {
        let defaults = read_document(defaults_path)?;
        let user = match user_path {
            Some(path) => read_document(path)?,
            None => Mapping::new(),
        };

        let merged = merge(defaults, user);
        let configuration: Configuration = serde_yaml::from_value(Value::Mapping(merged))
            .map_err(|err| Error::Config(format!("invalid configuration: {}", err)))?;

        if configuration.sets.is_empty() {
            return Err(Error::Config("no sets are configured".into()).into());
        }

        Ok(configuration)
    }
}

fn read_document(path: &Path) -> Result<Mapping, Error> {
    let file = File::open(path).map_err(|err| {
        Error::Config(format!(
            "missing or unreadable config file {}: {}",
            path.display(),
            err
        ))
    })?;

    let document: Value = serde_yaml::from_reader(file)
        .map_err(|err| Error::Config(format!("cannot parse {}: {}", path.display(), err)))?;

    match document {
        Value::Mapping(mapping) => Ok(mapping),
        Value::Null => Ok(Mapping::new()),
        _ => Err(Error::Config(format!(
            "{} does not contain a mapping",
            path.display()
        ))),
    }
}

fn is_empty(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::Mapping(mapping)) => mapping.is_empty(),
        Some(Value::Sequence(sequence)) => sequence.is_empty(),
        Some(_) => false,
    }
}

/// Missing or empty `sets` come from the defaults. Any other missing top
/// level key comes from the defaults too, but a key that is present stays as
/// the user wrote it, so `global:` with no value means no globals at all.
fn merge(defaults: Mapping, mut user: Mapping) -> Mapping {
    let sets_key = Value::from("sets");
    let sets_missing = is_empty(user.get(&sets_key));

    for (key, value) in defaults {
        if key == sets_key {
            if sets_missing {
                user.insert(key, value);
            }
        } else if !user.contains_key(&key) {
            user.insert(key, value);
        }
    }

    user
}
