use ipnetwork::Ipv4Network;
use std::path::PathBuf;
use thiserror::Error;

use crate::components::ComponentType;

#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("no set named {0:?} in the configuration")]
    UnknownSet(String),

    #[error("unknown container type {0:?}")]
    UnknownComponent(String),

    #[error("set {set:?} asks for {requested} {component} containers, the limit is {max}")]
    TooManyInstances {
        set: String,
        component: ComponentType,
        requested: u32,
        max: u32,
    },

    #[error("set {set:?} needs the {volume} volume for {component} but it is not configured")]
    MissingVolume {
        set: String,
        component: ComponentType,
        volume: &'static str,
    },

    #[error("missing build recipe {0:?}")]
    MissingRecipe(PathBuf),

    #[error("build failed for image {tag}")]
    BuildFailed { tag: String, log: Vec<String> },

    #[error("no free /{prefix} network left in {supernet}")]
    AddressSpaceExhausted { supernet: Ipv4Network, prefix: u8 },
}

impl Error {
    /// Errors the user fixes by editing the configuration or the command line.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::Config(_)
                | Error::UnknownSet(_)
                | Error::UnknownComponent(_)
                | Error::TooManyInstances { .. }
                | Error::MissingVolume { .. }
                | Error::MissingRecipe(_)
        )
    }
}
