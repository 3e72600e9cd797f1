use anyhow::Result;

use crate::{
    models::{
        Container, ContainerId, ContainerSpec, Image, ImageBuildSpec, ImageId, ImageTag, Network,
        NetworkId, NetworkSpec,
    },
    report,
    services::ContainerBackend,
};

/// Passes every listing through to the wrapped backend and reports every
/// mutation instead of performing it.
pub struct DryRunBackend<B> {
    inner: B,
}

impl<B: ContainerBackend> DryRunBackend<B> {
    pub fn new(inner: B) -> DryRunBackend<B> {
        DryRunBackend { inner }
    }
}

impl<B: ContainerBackend> ContainerBackend for DryRunBackend<B> {
    fn list_networks(&mut self) -> Result<Vec<Network>> {
        self.inner.list_networks()
    }

    fn create_network(&mut self, spec: NetworkSpec) -> Result<()> {
        report::would(&format!(
            "create {} network {} with subnet {}",
            spec.driver, spec.name, spec.subnet
        ));
        Ok(())
    }

    fn remove_network(&mut self, id: &NetworkId) -> Result<()> {
        report::would(&format!("remove network {}", id.0));
        Ok(())
    }

    fn list_images(&mut self) -> Result<Vec<Image>> {
        self.inner.list_images()
    }

    fn build_image(&mut self, spec: ImageBuildSpec) -> Result<ImageId> {
        report::would(&format!("build image {} from {}", spec.tag, spec.dockerfile));
        Ok(ImageId(spec.tag.0))
    }

    fn remove_image(&mut self, tag: &ImageTag) -> Result<()> {
        report::would(&format!("remove image {}", tag));
        Ok(())
    }

    fn list_containers(&mut self) -> Result<Vec<Container>> {
        self.inner.list_containers()
    }

    fn create_container(&mut self, spec: ContainerSpec) -> Result<ContainerId> {
        report::would(&format!(
            "create container {} from {} on {}",
            spec.name, spec.image, spec.network
        ));
        Ok(ContainerId(spec.name.0))
    }

    fn start_container(&mut self, id: &ContainerId) -> Result<()> {
        report::would(&format!("start container {}", id.short()));
        Ok(())
    }

    fn stop_container(&mut self, id: &ContainerId, _timeout: u32) -> Result<()> {
        report::would(&format!("stop container {}", id.short()));
        Ok(())
    }

    fn remove_container(&mut self, id: &ContainerId) -> Result<()> {
        report::would(&format!("remove container {}", id.short()));
        Ok(())
    }
}
