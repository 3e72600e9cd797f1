use anyhow::Result;
use log::info;
use std::path::PathBuf;

use crate::{
    backends::DryRunBackend,
    components::ComponentType,
    config::{Configuration, Invocation},
    containers::{ContainerLifecycle, Scope},
    images::ImageLifecycle,
    labels::set_of,
    report,
    services::ContainerBackend,
};

/// Seconds a container gets to stop when no `--timeout` is given.
const DEFAULT_STOP_TIMEOUT: u32 = 10;

const NONE: &str = "  <None>";

/// Runs each command as a fixed sequence of reconcile steps against the
/// container runtime.
pub struct Controller {
    backend: Box<dyn ContainerBackend>,
    config: Configuration,
    context: PathBuf,
    dry_run: bool,
}

impl Controller {
    /// With `dry_run` every mutation is reported instead of performed.
    pub fn init<B>(backend: B, config: Configuration, context: PathBuf, dry_run: bool) -> Controller
    where
        B: 'static + ContainerBackend,
    {
        let backend: Box<dyn ContainerBackend> = if dry_run {
            Box::new(DryRunBackend::new(backend))
        } else {
            Box::new(backend)
        };

        Controller {
            backend,
            config,
            context,
            dry_run,
        }
    }

    fn parts(&mut self, timeout: Option<u32>) -> (&mut dyn ContainerBackend, Invocation<'_>) {
        let invocation = Invocation {
            config: &self.config,
            context: &self.context,
            dry_run: self.dry_run,
            stop_timeout: timeout.unwrap_or(DEFAULT_STOP_TIMEOUT),
        };

        (&mut *self.backend, invocation)
    }

    fn images(&mut self, timeout: Option<u32>) -> ImageLifecycle<'_> {
        let (backend, invocation) = self.parts(timeout);
        ImageLifecycle::new(backend, invocation)
    }

    fn containers(&mut self, timeout: Option<u32>) -> ContainerLifecycle<'_> {
        let (backend, invocation) = self.parts(timeout);
        ContainerLifecycle::new(backend, invocation)
    }

    /// Fails on anything wrong with the set before the runtime is touched.
    fn validate(&self, set: &str, filter: Option<ComponentType>) -> Result<()> {
        self.config.set(set)?.validate(set, filter)?;
        Ok(())
    }

    /// Lines describing the containers and images of `set`, or of every set.
    pub fn list(&mut self, set: Option<&str>) -> Result<Vec<String>> {
        let mut lines = Vec::new();

        let scope = match set {
            Some(set) => {
                self.config.set(set)?;
                Scope::Set(set)
            }
            None => {
                lines.push(format!("Sets: {}", self.config.set_names().join(", ")));
                Scope::All
            }
        };

        let containers = self.containers(None).select(&scope)?;
        lines.push("Containers:".to_string());
        if containers.is_empty() {
            lines.push(NONE.to_string());
        }
        for container in containers.iter() {
            lines.push(format!(
                "  {:<24} {:<12} {:<8} {:<12} {}",
                container.name.0,
                container.id.short(),
                container.status,
                set_of(&container.labels).unwrap_or("-"),
                container.image
            ));
        }

        let images = self.images(None).list(set)?;
        lines.push("Images:".to_string());
        if images.is_empty() {
            lines.push(NONE.to_string());
        }
        for (tag, image) in images.iter() {
            lines.push(format!("  {:<48} {}", tag.0, image.id.short()));
        }

        Ok(lines)
    }

    /// Builds the base images the set needs.
    pub fn base(&mut self, set: &str, filter: Option<ComponentType>) -> Result<()> {
        self.validate(set, filter)?;
        self.images(None)
            .ensure_base_build(set, filter)
    }

    /// Builds the set's final images, and base images as needed.
    pub fn build(&mut self, set: &str, filter: Option<ComponentType>) -> Result<()> {
        self.validate(set, filter)?;
        self.images(None)
            .ensure_final_build(set, filter)
    }

    pub fn create(&mut self, set: &str, filter: Option<ComponentType>) -> Result<()> {
        self.build(set, filter)?;

        let created = self
            .containers(None)
            .ensure_all(set, filter)?;
        info!("created {} containers for set {}", created, set);

        Ok(())
    }

    /// Deploys whatever is missing, then starts the set.
    pub fn start(&mut self, set: &str, filter: Option<ComponentType>) -> Result<()> {
        self.create(set, filter)?;

        let started = self
            .containers(None)
            .start(&Scope::for_set(set, filter))?;
        if started == 0 {
            report::info("No containers to start");
        }

        Ok(())
    }

    pub fn stop(
        &mut self,
        set: &str,
        filter: Option<ComponentType>,
        timeout: Option<u32>,
    ) -> Result<()> {
        self.config.set(set)?;

        let stopped = self
            .containers(timeout)
            .stop(&Scope::for_set(set, filter))?;
        if stopped == 0 {
            report::info("No containers to stop");
        }

        Ok(())
    }

    pub fn destroy(
        &mut self,
        set: &str,
        filter: Option<ComponentType>,
        timeout: Option<u32>,
    ) -> Result<()> {
        self.config.set(set)?;

        let removed = self
            .containers(timeout)
            .destroy(&Scope::for_set(set, filter))?;
        if removed == 0 {
            report::info("No containers to remove");
        }

        Ok(())
    }

    /// Destroys the set's containers, then its network and final images.
    pub fn remove(
        &mut self,
        set: &str,
        filter: Option<ComponentType>,
        network: Option<&str>,
        timeout: Option<u32>,
    ) -> Result<()> {
        self.destroy(set, filter, timeout)?;
        self.images(timeout).remove_final(set, filter, network)
    }

    fn destroy_everything(&mut self, timeout: Option<u32>) -> Result<()> {
        let removed = self.containers(timeout).destroy(&Scope::All)?;
        if removed == 0 {
            report::info("No containers to remove");
        }

        Ok(())
    }

    /// Removes every container of every set first. Then, with a filter,
    /// removes that component's base image; otherwise every network and
    /// image except the foundation image.
    pub fn purge(&mut self, filter: Option<ComponentType>, timeout: Option<u32>) -> Result<()> {
        self.destroy_everything(timeout)?;
        self.images(timeout).purge(filter)
    }

    pub fn purge_all(&mut self, timeout: Option<u32>) -> Result<()> {
        self.destroy_everything(timeout)?;
        self.images(timeout).purge_all()
    }
}
