use anyhow::Result;
use bollard::{
    container::{
        Config, CreateContainerOptions, ListContainersOptions, RemoveContainerOptions,
        StartContainerOptions, StopContainerOptions,
    },
    image::{BuildImageOptions, ListImagesOptions, RemoveImageOptions},
    models::{HostConfig, Ipam, IpamConfig},
    network::{CreateNetworkOptions, ListNetworksOptions},
    Docker,
};
use futures_util::stream::StreamExt;
use ignore::WalkBuilder;
use log::{debug, info};
use number_prefix::NumberPrefix;
use std::{
    fs::{self, OpenOptions},
    io::{stdout, Write},
    path::Path,
    time::Duration,
};
use tar::Builder as TarBuilder;
use tempfile::TempDir;
use tokio::runtime::{Builder as RuntimeBuilder, Runtime};

use crate::{
    error::Error,
    models::{
        Container, ContainerId, ContainerName, ContainerSpec, ContainerStatus, Image,
        ImageBuildSpec, ImageId, ImageTag, Network, NetworkId, NetworkSpec, VolumeBinding,
    },
    services::ContainerBackend,
};

/// Image builds run inside a single request, so the client timeout has to
/// cover the slowest build.
const CLIENT_TIMEOUT: Duration = Duration::from_secs(60 * 60);

const UNTAGGED: &str = "<none>:<none>";

/// Talks to the docker daemon. Every call blocks until the daemon answers.
pub struct DockerBackend {
    docker: Docker,
    runtime: Runtime,
}

impl DockerBackend {
    pub fn connect() -> Result<DockerBackend> {
        let runtime = RuntimeBuilder::new_current_thread().enable_all().build()?;
        let docker = runtime
            .block_on(async { Docker::connect_with_local_defaults() })?
            .with_timeout(CLIENT_TIMEOUT);

        let version = runtime.block_on(docker.ping())?;
        debug!("docker answered ping with {:?}", version);

        Ok(DockerBackend { docker, runtime })
    }
}

/// Archives the build context into memory, skipping whatever `.dockerignore`
/// excludes.
fn archive_context(context: &Path) -> Result<Vec<u8>> {
    let temp_dir = TempDir::new()?;
    let temp_context_path = temp_dir.path().join("context.tar");
    let temp_context = {
        let mut options = OpenOptions::new();
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        options.write(true).create(true).open(&temp_context_path)?
    };

    let mut tar = TarBuilder::new(temp_context);
    let walk = WalkBuilder::new(context)
        .add_custom_ignore_filename(".dockerignore")
        .ignore(false)
        .git_global(false)
        .git_ignore(false)
        .git_exclude(false)
        .hidden(false)
        .build();

    let mut context_size = 0;
    for result in walk {
        let entry = result?;
        let relative = entry.path().strip_prefix(context)?;
        if relative.as_os_str().is_empty() {
            continue;
        }

        tar.append_path_with_name(entry.path(), relative)?;
        context_size += entry.metadata()?.len();
    }

    match NumberPrefix::binary(context_size as f32) {
        NumberPrefix::Standalone(bytes) => println!("Archived build context ({} bytes)", bytes),
        NumberPrefix::Prefixed(prefix, n) => {
            println!("Archived build context ({:.1} {}B)", n, prefix)
        }
    };

    tar.into_inner()?.sync_all()?;
    let archive = fs::read(&temp_context_path)?;
    temp_dir.close()?;

    Ok(archive)
}

fn container_status(name: &ContainerName, state: Option<&str>) -> ContainerStatus {
    match state {
        Some("created") => ContainerStatus::Created,
        Some("running") => ContainerStatus::Running,
        Some("exited") => ContainerStatus::Exited,
        state => {
            debug!("container {} is in state {:?}", name, state);
            ContainerStatus::Unknown
        }
    }
}

impl ContainerBackend for DockerBackend {
    fn list_networks(&mut self) -> Result<Vec<Network>> {
        let reply = self
            .runtime
            .block_on(self.docker.list_networks(None::<ListNetworksOptions<String>>))?;

        let networks = reply
            .into_iter()
            .filter_map(|network| {
                let subnets = network
                    .ipam
                    .and_then(|ipam| ipam.config)
                    .unwrap_or_default()
                    .into_iter()
                    .filter_map(|config| config.subnet)
                    .collect();

                Some(Network {
                    id: NetworkId(network.id?),
                    name: network.name?,
                    labels: network.labels.unwrap_or_default().into_iter().collect(),
                    subnets,
                })
            })
            .collect();

        Ok(networks)
    }

    fn create_network(&mut self, spec: NetworkSpec) -> Result<()> {
        let options = CreateNetworkOptions {
            name: spec.name,
            driver: spec.driver,
            ipam: Ipam {
                config: Some(vec![IpamConfig {
                    subnet: Some(spec.subnet.to_string()),
                    ..Default::default()
                }]),
                ..Default::default()
            },
            labels: spec.labels.into_iter().collect(),
            ..Default::default()
        };

        self.runtime.block_on(self.docker.create_network(options))?;

        Ok(())
    }

    fn remove_network(&mut self, id: &NetworkId) -> Result<()> {
        self.runtime.block_on(self.docker.remove_network(&id.0))?;

        Ok(())
    }

    fn list_images(&mut self) -> Result<Vec<Image>> {
        let options = ListImagesOptions::<String> {
            all: true,
            ..Default::default()
        };
        let reply = self.runtime.block_on(self.docker.list_images(Some(options)))?;

        let images = reply
            .into_iter()
            .map(|image| Image {
                id: ImageId(image.id),
                tags: image
                    .repo_tags
                    .into_iter()
                    .filter(|tag| tag != UNTAGGED)
                    .map(ImageTag)
                    .collect(),
                labels: image.labels.into_iter().collect(),
            })
            .collect();

        Ok(images)
    }

    fn build_image(&mut self, spec: ImageBuildSpec) -> Result<ImageId> {
        let archive = archive_context(&spec.context)?;
        info!("building {} from {}", spec.tag, spec.dockerfile);

        let options = BuildImageOptions {
            dockerfile: spec.dockerfile,
            t: spec.tag.0.clone(),
            rm: true,
            forcerm: true,
            squash: spec.squash,
            labels: spec.labels.into_iter().collect(),
            buildargs: spec.build_args.into_iter().collect(),
            ..Default::default()
        };

        let docker = &self.docker;
        let tag = spec.tag.0;

        let (log, image_id, failed) = self.runtime.block_on(async move {
            let mut stream = Box::pin(docker.build_image(options, None, Some(archive.into())));
            let mut log = Vec::new();
            let mut image_id = None;
            let mut failed = false;

            while let Some(reply) = stream.next().await {
                let reply = match reply {
                    Ok(reply) => reply,
                    Err(err) => {
                        log.push(err.to_string());
                        failed = true;
                        break;
                    }
                };

                if let Some(line) = reply.stream {
                    print!("{}", line);
                    log.push(line.trim_end().to_string());
                }

                if let Some(error) = reply.error {
                    println!("{}", error);
                    log.push(error);
                    failed = true;
                }

                if let Some(id) = reply.aux.and_then(|aux| aux.id) {
                    image_id = Some(id);
                }
            }

            (log, image_id, failed)
        });

        stdout().flush()?;

        if failed {
            return Err(Error::BuildFailed { tag, log }.into());
        }

        Ok(ImageId(image_id.unwrap_or(tag)))
    }

    fn remove_image(&mut self, tag: &ImageTag) -> Result<()> {
        let options = RemoveImageOptions {
            force: false,
            noprune: false,
        };
        self.runtime
            .block_on(self.docker.remove_image(&tag.0, Some(options), None))?;

        Ok(())
    }

    fn list_containers(&mut self) -> Result<Vec<Container>> {
        let options = ListContainersOptions::<String> {
            all: true,
            ..Default::default()
        };
        let reply = self
            .runtime
            .block_on(self.docker.list_containers(Some(options)))?;

        let containers = reply
            .into_iter()
            .filter_map(|container| {
                let name = container
                    .names
                    .and_then(|names| names.into_iter().next())
                    .map(|name| ContainerName(name.trim_start_matches('/').to_string()))?;
                let status = container_status(&name, container.state.as_deref());

                Some(Container {
                    id: ContainerId(container.id?),
                    name,
                    image: container.image.unwrap_or_default(),
                    status,
                    labels: container.labels.unwrap_or_default().into_iter().collect(),
                })
            })
            .collect();

        Ok(containers)
    }

    fn create_container(&mut self, spec: ContainerSpec) -> Result<ContainerId> {
        let options = CreateContainerOptions {
            name: spec.name.0,
            platform: None,
        };

        let binds = spec
            .volumes
            .iter()
            .map(VolumeBinding::to_bind)
            .collect::<Vec<_>>();

        let config = Config {
            image: Some(spec.image.0),
            domainname: Some(spec.domain_name),
            labels: Some(spec.labels.into_iter().collect()),
            host_config: Some(HostConfig {
                binds: if binds.is_empty() { None } else { Some(binds) },
                network_mode: Some(spec.network),
                ..Default::default()
            }),
            ..Default::default()
        };

        let reply = self
            .runtime
            .block_on(self.docker.create_container(Some(options), config))?;

        Ok(ContainerId(reply.id))
    }

    fn start_container(&mut self, id: &ContainerId) -> Result<()> {
        self.runtime.block_on(
            self.docker
                .start_container(&id.0, None::<StartContainerOptions<String>>),
        )?;

        Ok(())
    }

    fn stop_container(&mut self, id: &ContainerId, timeout: u32) -> Result<()> {
        let options = StopContainerOptions {
            t: i64::from(timeout),
        };
        self.runtime
            .block_on(self.docker.stop_container(&id.0, Some(options)))?;

        Ok(())
    }

    fn remove_container(&mut self, id: &ContainerId) -> Result<()> {
        self.runtime.block_on(
            self.docker
                .remove_container(&id.0, None::<RemoveContainerOptions>),
        )?;

        Ok(())
    }
}
