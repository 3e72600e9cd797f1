use anyhow::{anyhow, Result};
use std::{cell::RefCell, rc::Rc};

use crate::{
    error::Error,
    models::{
        Container, ContainerId, ContainerName, ContainerSpec, ContainerStatus, Image,
        ImageBuildSpec, ImageId, ImageTag, Labels, Network, NetworkId, NetworkSpec,
    },
    services::ContainerBackend,
};

/// Every call made against the runtime, in order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    ListNetworks,
    ListImages,
    ListContainers,
    CreateNetwork(String),
    RemoveNetwork(String),
    BuildImage(String),
    RemoveImage(String),
    CreateContainer(String),
    StartContainer(String),
    StopContainer(String),
    RemoveContainer(String),
}

impl Call {
    pub fn is_mutation(&self) -> bool {
        !matches!(
            self,
            Call::ListNetworks | Call::ListImages | Call::ListContainers
        )
    }
}

#[derive(Debug, Default)]
struct State {
    networks: Vec<Network>,
    images: Vec<Image>,
    containers: Vec<Container>,
    calls: Vec<Call>,
    failing_builds: Vec<String>,
    next_id: u64,
}

impl State {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}{:016x}", prefix, self.next_id)
    }

    fn container_index(&self, id: &ContainerId) -> Result<usize> {
        self.containers
            .iter()
            .position(|container| container.id == *id)
            .ok_or_else(|| anyhow!("no such container: {}", id.0))
    }
}

/// A runtime kept in memory. Clones share state, so a test can hand one
/// clone to the code under test and inspect the other.
#[derive(Clone, Debug, Default)]
pub struct MemoryBackend {
    state: Rc<RefCell<State>>,
}

impl MemoryBackend {
    pub fn new() -> MemoryBackend {
        Default::default()
    }

    pub fn add_network(&self, name: &str, subnet: &str, labels: Labels) {
        let mut state = self.state.borrow_mut();
        let id = NetworkId(state.next_id("net"));
        state.networks.push(Network {
            id,
            name: name.into(),
            labels,
            subnets: vec![subnet.into()],
        });
    }

    pub fn add_image(&self, tag: &str, labels: Labels) {
        let mut state = self.state.borrow_mut();
        let id = ImageId(state.next_id("sha256:"));
        state.images.push(Image {
            id,
            tags: vec![ImageTag(tag.into())],
            labels,
        });
    }

    pub fn add_container(&self, name: &str, status: ContainerStatus, labels: Labels) {
        let mut state = self.state.borrow_mut();
        let id = ContainerId(state.next_id(""));
        state.containers.push(Container {
            id,
            name: ContainerName(name.into()),
            image: "unknown".into(),
            status,
            labels,
        });
    }

    /// Makes every later build of `tag` fail.
    pub fn fail_build(&self, tag: &str) {
        self.state.borrow_mut().failing_builds.push(tag.into());
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.borrow().calls.clone()
    }

    pub fn mutations(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|call| call.is_mutation())
            .collect()
    }

    pub fn clear_calls(&self) {
        self.state.borrow_mut().calls.clear();
    }

    pub fn network(&self, name: &str) -> Option<Network> {
        self.state
            .borrow()
            .networks
            .iter()
            .find(|network| network.name == name)
            .cloned()
    }

    pub fn network_names(&self) -> Vec<String> {
        self.state
            .borrow()
            .networks
            .iter()
            .map(|network| network.name.clone())
            .collect()
    }

    pub fn image_tags(&self) -> Vec<String> {
        self.state
            .borrow()
            .images
            .iter()
            .flat_map(|image| image.tags.iter().map(|tag| tag.0.clone()))
            .collect()
    }

    pub fn container(&self, name: &str) -> Option<Container> {
        self.state
            .borrow()
            .containers
            .iter()
            .find(|container| container.name.0 == name)
            .cloned()
    }

    pub fn container_names(&self) -> Vec<String> {
        self.state
            .borrow()
            .containers
            .iter()
            .map(|container| container.name.0.clone())
            .collect()
    }

    fn record(&self, call: Call) {
        self.state.borrow_mut().calls.push(call);
    }
}

impl ContainerBackend for MemoryBackend {
    fn list_networks(&mut self) -> Result<Vec<Network>> {
        self.record(Call::ListNetworks);
        Ok(self.state.borrow().networks.clone())
    }

    fn create_network(&mut self, spec: NetworkSpec) -> Result<()> {
        self.record(Call::CreateNetwork(spec.name.clone()));
        let mut state = self.state.borrow_mut();
        let id = NetworkId(state.next_id("net"));
        state.networks.push(Network {
            id,
            name: spec.name,
            labels: spec.labels,
            subnets: vec![spec.subnet.to_string()],
        });
        Ok(())
    }

    fn remove_network(&mut self, id: &NetworkId) -> Result<()> {
        let mut state = self.state.borrow_mut();
        let index = state
            .networks
            .iter()
            .position(|network| network.id == *id)
            .ok_or_else(|| anyhow!("no such network: {}", id.0))?;
        let network = state.networks.remove(index);
        state.calls.push(Call::RemoveNetwork(network.name));
        Ok(())
    }

    fn list_images(&mut self) -> Result<Vec<Image>> {
        self.record(Call::ListImages);
        Ok(self.state.borrow().images.clone())
    }

    fn build_image(&mut self, spec: ImageBuildSpec) -> Result<ImageId> {
        self.record(Call::BuildImage(spec.tag.0.clone()));
        let mut state = self.state.borrow_mut();

        if state.failing_builds.contains(&spec.tag.0) {
            return Err(Error::BuildFailed {
                tag: spec.tag.0,
                log: vec!["Step 1/1 : RUN false".into(), "exit code 1".into()],
            }
            .into());
        }

        for image in state.images.iter_mut() {
            image.tags.retain(|tag| *tag != spec.tag);
        }

        let id = ImageId(state.next_id("sha256:"));
        state.images.push(Image {
            id: id.clone(),
            tags: vec![spec.tag],
            labels: spec.labels,
        });
        Ok(id)
    }

    fn remove_image(&mut self, tag: &ImageTag) -> Result<()> {
        self.record(Call::RemoveImage(tag.0.clone()));
        let mut state = self.state.borrow_mut();
        let index = state
            .images
            .iter()
            .position(|image| image.tags.contains(tag))
            .ok_or_else(|| anyhow!("no such image: {}", tag))?;

        state.images[index].tags.retain(|t| t != tag);
        if state.images[index].tags.is_empty() {
            state.images.remove(index);
        }
        Ok(())
    }

    fn list_containers(&mut self) -> Result<Vec<Container>> {
        self.record(Call::ListContainers);
        Ok(self.state.borrow().containers.clone())
    }

    fn create_container(&mut self, spec: ContainerSpec) -> Result<ContainerId> {
        self.record(Call::CreateContainer(spec.name.0.clone()));
        let mut state = self.state.borrow_mut();

        if state
            .containers
            .iter()
            .any(|container| container.name == spec.name)
        {
            return Err(anyhow!("container name {} is already in use", spec.name));
        }
        if !state.images.iter().any(|image| image.tags.contains(&spec.image)) {
            return Err(anyhow!("no such image: {}", spec.image));
        }
        if !state
            .networks
            .iter()
            .any(|network| network.name == spec.network)
        {
            return Err(anyhow!("network {} not found", spec.network));
        }

        let id = ContainerId(state.next_id(""));
        state.containers.push(Container {
            id: id.clone(),
            name: spec.name,
            image: spec.image.0,
            status: ContainerStatus::Created,
            labels: spec.labels,
        });
        Ok(id)
    }

    fn start_container(&mut self, id: &ContainerId) -> Result<()> {
        let mut state = self.state.borrow_mut();
        let index = state.container_index(id)?;
        let name = state.containers[index].name.0.clone();
        state.calls.push(Call::StartContainer(name));
        state.containers[index].status = ContainerStatus::Running;
        Ok(())
    }

    fn stop_container(&mut self, id: &ContainerId, _timeout: u32) -> Result<()> {
        let mut state = self.state.borrow_mut();
        let index = state.container_index(id)?;
        let name = state.containers[index].name.0.clone();
        state.calls.push(Call::StopContainer(name));
        state.containers[index].status = ContainerStatus::Exited;
        Ok(())
    }

    fn remove_container(&mut self, id: &ContainerId) -> Result<()> {
        let mut state = self.state.borrow_mut();
        let index = state.container_index(id)?;
        if state.containers[index].status.is_active() {
            return Err(anyhow!(
                "cannot remove running container {}",
                state.containers[index].name
            ));
        }
        let container = state.containers.remove(index);
        state.calls.push(Call::RemoveContainer(container.name.0));
        Ok(())
    }
}
