use anyhow::Result;
use std::path::Path;

use crate::{
    config::Configuration,
    models::{
        Container, ContainerId, ContainerSpec, Image, ImageBuildSpec, ImageId, ImageTag, Network,
        NetworkId, NetworkSpec,
    },
};

pub trait ConfigFrontend {
    fn configuration(
        &mut self,
        defaults_path: &Path,
        user_path: Option<&Path>,
    ) -> Result<Configuration>;
}

/// Blocking access to the container runtime. Listings return everything the
/// runtime knows about; callers select resources by label.
pub trait ContainerBackend {
    fn list_networks(&mut self) -> Result<Vec<Network>>;

    fn create_network(&mut self, spec: NetworkSpec) -> Result<()>;

    fn remove_network(&mut self, id: &NetworkId) -> Result<()>;

    fn list_images(&mut self) -> Result<Vec<Image>>;

    fn build_image(&mut self, spec: ImageBuildSpec) -> Result<ImageId>;

    fn remove_image(&mut self, tag: &ImageTag) -> Result<()>;

    fn list_containers(&mut self) -> Result<Vec<Container>>;

    fn create_container(&mut self, spec: ContainerSpec) -> Result<ContainerId>;

    fn start_container(&mut self, id: &ContainerId) -> Result<()>;

    fn stop_container(&mut self, id: &ContainerId, timeout: u32) -> Result<()>;

    fn remove_container(&mut self, id: &ContainerId) -> Result<()>;
}
