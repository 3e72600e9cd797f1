//! Fixtures shared by the unit tests.

use std::fs;
use tempfile::TempDir;

use crate::{
    components::{COMPONENTS, FOUNDATION_RECIPE},
    config::{Configuration, Invocation},
};

const CONFIGURATION: &str = r#"
global:
  passwords:
    dbs:
      root: notverysecure
    containers:
      root: testing
sets:
  atg:
    snapshots: 2
    dbprimary: true
    httpd: true
    wikidbs:
      - w
    passwords:
      dbs:
        u: p
    volumes:
      wikifarm: /srv/wikifarm
      dumpsrepo: /srv/dumps
      dumpsetc: /srv/etc
      dumpsruns: /srv/runs
  other:
    dbprimary: true
"#;

/// Two sets: `atg` with snapshots, a primary db and httpd, `other` with just
/// a primary db.
pub fn configuration() -> Configuration {
    serde_yaml::from_str(CONFIGURATION).unwrap()
}

/// A build context with every recipe present.
pub fn context() -> TempDir {
    let context = TempDir::new().unwrap();
    fs::write(context.path().join(FOUNDATION_RECIPE), "FROM debian\n").unwrap();
    for descriptor in COMPONENTS.iter() {
        for recipe in [descriptor.base_recipe(), descriptor.final_recipe()].iter() {
            fs::write(context.path().join(recipe), "FROM scratch\n").unwrap();
        }
    }
    context
}

pub fn invocation<'a>(config: &'a Configuration, context: &'a TempDir) -> Invocation<'a> {
    Invocation {
        config,
        context: context.path(),
        dry_run: false,
        stop_timeout: 10,
    }
}
