use anyhow::Result;
use log::{debug, info};

use crate::{
    components::{in_scope, ComponentDescriptor, ComponentType},
    config::{Invocation, SetConfig},
    labels::{has_labels, ownership_label, resource_labels, set_label},
    models::{Container, ContainerSpec, ContainerStatus},
    networks::{network_name, NetworkAllocator},
    report::Progress,
    services::ContainerBackend,
};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ContainerOperation {
    Start,
    Stop,
    Remove,
}

impl ContainerOperation {
    fn verb(self) -> &'static str {
        match self {
            ContainerOperation::Start => "Starting",
            ContainerOperation::Stop => "Stopping",
            ContainerOperation::Remove => "Removing",
        }
    }
}

/// Which containers an operation acts on.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Scope<'s> {
    /// The containers of one component in a set.
    Named {
        set: &'s str,
        component: ComponentType,
    },
    Set(&'s str),
    /// Everything we own, across every set.
    All,
}

impl<'s> Scope<'s> {
    pub fn for_set(set: &'s str, filter: Option<ComponentType>) -> Scope<'s> {
        match filter {
            Some(component) => Scope::Named { set, component },
            None => Scope::Set(set),
        }
    }

    fn matches(&self, container: &Container) -> bool {
        match *self {
            Scope::Named { set, component } => {
                has_labels(&container.labels, &set_label(set))
                    && component.descriptor().owns_container(set, &container.name.0)
            }
            Scope::Set(set) => has_labels(&container.labels, &set_label(set)),
            Scope::All => has_labels(&container.labels, &ownership_label()),
        }
    }
}

/// Creates, starts, stops and removes the containers of a set.
pub struct ContainerLifecycle<'a> {
    backend: &'a mut dyn ContainerBackend,
    invocation: Invocation<'a>,
}

impl<'a> ContainerLifecycle<'a> {
    pub fn new(
        backend: &'a mut dyn ContainerBackend,
        invocation: Invocation<'a>,
    ) -> ContainerLifecycle<'a> {
        ContainerLifecycle {
            backend,
            invocation,
        }
    }

    fn progress(&self, lines: &[String]) -> Result<Progress> {
        // Dry-run lines would land in the middle of the block.
        Progress::start(lines, !self.invocation.dry_run)
    }

    /// Creates whichever of the component's containers are missing from
    /// `known`. The cap is checked before anything is created. Returns how
    /// many were created.
    pub fn check_and_create(
        &mut self,
        set: &str,
        set_config: &SetConfig,
        descriptor: &ComponentDescriptor,
        known: &[Container],
    ) -> Result<usize> {
        let count = set_config.check_cap(set, descriptor)?;
        if count == 0 {
            return Ok(0);
        }
        let volumes = set_config.volume_bindings(set, descriptor)?;

        let wanted = set_label(set);
        let missing = descriptor
            .container_names(set, count)
            .into_iter()
            .filter(|name| {
                let exists = known.iter().any(|container| {
                    container.name == *name && has_labels(&container.labels, &wanted)
                });
                if exists {
                    info!("container {} already exists", name);
                }
                !exists
            })
            .collect::<Vec<_>>();

        let lines = missing
            .iter()
            .map(|name| format!("Creating {}", name))
            .collect::<Vec<_>>();
        let progress = self.progress(&lines)?;

        let network = network_name(set);
        for (line, name) in missing.iter().enumerate() {
            self.backend.create_container(ContainerSpec {
                name: name.clone(),
                image: descriptor.final_image(set),
                labels: resource_labels(set),
                network: network.clone(),
                domain_name: network.clone(),
                volumes: volumes.clone(),
            })?;
            progress.done(line)?;
        }

        Ok(missing.len())
    }

    /// Validates the set, makes sure its network exists and creates every
    /// missing container in table order.
    pub fn ensure_all(&mut self, set: &str, filter: Option<ComponentType>) -> Result<usize> {
        let config = self.invocation.config;
        let set_config = config.set(set)?;
        set_config.validate(set, filter)?;

        NetworkAllocator::new(&mut *self.backend).ensure_network(set)?;

        // One snapshot serves every creation check below.
        let known = self.backend.list_containers()?;
        debug!("containers before creation: {:?}", known);

        let mut created = 0;
        for descriptor in in_scope(filter) {
            created += self.check_and_create(set, set_config, descriptor, &known)?;
        }

        Ok(created)
    }

    pub fn select(&mut self, scope: &Scope) -> Result<Vec<Container>> {
        let selected = self
            .backend
            .list_containers()?
            .into_iter()
            .filter(|container| scope.matches(container))
            .collect::<Vec<_>>();
        info!("selected containers {:?} for {:?}", selected, scope);

        Ok(selected)
    }

    fn apply(&mut self, operations: Vec<(Container, ContainerOperation)>) -> Result<usize> {
        let lines = operations
            .iter()
            .map(|(container, operation)| format!("{} {}", operation.verb(), container.name))
            .collect::<Vec<_>>();
        let progress = self.progress(&lines)?;
        let timeout = self.invocation.stop_timeout;

        for (line, (container, operation)) in operations.iter().enumerate() {
            match operation {
                ContainerOperation::Start => self.backend.start_container(&container.id)?,
                ContainerOperation::Stop => self.backend.stop_container(&container.id, timeout)?,
                ContainerOperation::Remove => {
                    if container.status.is_active() {
                        self.backend.stop_container(&container.id, timeout)?;
                    }
                    self.backend.remove_container(&container.id)?;
                }
            }
            progress.done(line)?;
        }

        Ok(operations.len())
    }

    /// Stops and removes every selected container. Returns how many were
    /// removed; none is fine.
    pub fn destroy(&mut self, scope: &Scope) -> Result<usize> {
        let operations = self
            .select(scope)?
            .into_iter()
            .map(|container| (container, ContainerOperation::Remove))
            .collect();

        self.apply(operations)
    }

    /// Starts every selected container that is not already running.
    pub fn start(&mut self, scope: &Scope) -> Result<usize> {
        let operations = self
            .select(scope)?
            .into_iter()
            .filter(|container| container.status != ContainerStatus::Running)
            .map(|container| (container, ContainerOperation::Start))
            .collect();

        self.apply(operations)
    }

    /// Stops every selected container that is running.
    pub fn stop(&mut self, scope: &Scope) -> Result<usize> {
        let operations = self
            .select(scope)?
            .into_iter()
            .filter(|container| container.status.is_active())
            .map(|container| (container, ContainerOperation::Stop))
            .collect();

        self.apply(operations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        backends::memory::{Call, MemoryBackend},
        error::Error,
        labels,
        models::{ContainerId, ContainerName, Labels},
        testing,
    };

    /// A backend holding the network and final images `atg` needs.
    fn deployable() -> MemoryBackend {
        let memory = MemoryBackend::new();
        memory.add_network("atg.lan", "172.16.0.0/24", resource_labels("atg"));
        for kind in [
            ComponentType::Snapshot,
            ComponentType::DbPrimary,
            ComponentType::Httpd,
            ComponentType::PhpFpm,
        ]
        .iter()
        {
            let tag = kind.descriptor().final_image("atg");
            memory.add_image(&tag.0, resource_labels("atg"));
        }
        memory
    }

    fn creations(memory: &MemoryBackend) -> Vec<String> {
        memory
            .mutations()
            .into_iter()
            .filter_map(|call| match call {
                Call::CreateContainer(name) => Some(name),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn creates_in_table_order() {
        let config = testing::configuration();
        let context = testing::context();
        let memory = deployable();
        let mut backend = memory.clone();

        let created = ContainerLifecycle::new(&mut backend, testing::invocation(&config, &context))
            .ensure_all("atg", None)
            .unwrap();

        assert_eq!(created, 5);
        assert_eq!(
            creations(&memory),
            vec![
                "atg-snapshot-01",
                "atg-snapshot-02",
                "atg-dbprimary",
                "atg-httpd",
                "atg-phpfpm",
            ]
        );

        let snapshot = memory.container("atg-snapshot-01").unwrap();
        assert_eq!(snapshot.status, ContainerStatus::Created);
        assert!(has_labels(&snapshot.labels, &resource_labels("atg")));
        assert_eq!(snapshot.image, "wikimedia-dumps/snapshot-atg-final:latest");
    }

    #[test]
    fn creation_is_idempotent() {
        let config = testing::configuration();
        let context = testing::context();
        let memory = deployable();
        let mut backend = memory.clone();

        ContainerLifecycle::new(&mut backend, testing::invocation(&config, &context))
            .ensure_all("atg", None)
            .unwrap();

        memory.clear_calls();
        let created = ContainerLifecycle::new(&mut backend, testing::invocation(&config, &context))
            .ensure_all("atg", None)
            .unwrap();

        assert_eq!(created, 0);
        assert!(memory.mutations().is_empty());
        assert_eq!(
            memory.calls(),
            vec![Call::ListNetworks, Call::ListContainers]
        );
    }

    #[test]
    fn fills_in_missing_replicas() {
        let config = testing::configuration();
        let context = testing::context();
        let memory = deployable();
        memory.add_container("atg-snapshot-01", ContainerStatus::Running, resource_labels("atg"));
        let mut backend = memory.clone();

        ContainerLifecycle::new(&mut backend, testing::invocation(&config, &context))
            .ensure_all("atg", Some(ComponentType::Snapshot))
            .unwrap();

        assert_eq!(creations(&memory), vec!["atg-snapshot-02"]);
    }

    #[test]
    fn cap_violation_creates_nothing() {
        let mut config = testing::configuration();
        if let Some(atg) = config.sets.get_mut("atg") {
            atg.snapshots = 100;
        }
        let context = testing::context();
        let memory = deployable();
        let mut backend = memory.clone();

        let err = ContainerLifecycle::new(&mut backend, testing::invocation(&config, &context))
            .ensure_all("atg", None)
            .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::TooManyInstances { requested: 100, max: 99, .. })
        ));
        assert!(memory.mutations().is_empty());
        assert!(memory.container_names().is_empty());
    }

    #[test]
    fn cap_is_checked_before_the_first_container() {
        let mut config = testing::configuration();
        if let Some(atg) = config.sets.get_mut("atg") {
            atg.snapshots = 100;
        }
        let context = testing::context();
        let memory = deployable();
        let mut backend = memory.clone();

        let set_config = config.set("atg").unwrap().clone();
        let result = ContainerLifecycle::new(&mut backend, testing::invocation(&config, &context))
            .check_and_create("atg", &set_config, ComponentType::Snapshot.descriptor(), &[]);

        assert!(result.is_err());
        assert!(memory.calls().is_empty());
    }

    #[test]
    fn disabled_component_is_left_alone() {
        let config = testing::configuration();
        let context = testing::context();
        let memory = deployable();
        let mut backend = memory.clone();

        let set_config = config.set("atg").unwrap().clone();
        let created = ContainerLifecycle::new(&mut backend, testing::invocation(&config, &context))
            .check_and_create("atg", &set_config, ComponentType::DumpsData.descriptor(), &[])
            .unwrap();

        assert_eq!(created, 0);
        assert!(memory.calls().is_empty());
    }

    #[test]
    fn same_name_in_another_set_does_not_count() {
        let config = testing::configuration();
        let context = testing::context();
        let memory = deployable();
        let mut backend = memory.clone();

        let known = vec![Container {
            id: ContainerId("0123456789abcdef".into()),
            name: ContainerName("atg-dbprimary".into()),
            image: "unknown".into(),
            status: ContainerStatus::Exited,
            labels: labels::set_label("other"),
        }];
        let set_config = config.set("atg").unwrap().clone();
        let created = ContainerLifecycle::new(&mut backend, testing::invocation(&config, &context))
            .check_and_create("atg", &set_config, ComponentType::DbPrimary.descriptor(), &known)
            .unwrap();

        assert_eq!(created, 1);
        assert_eq!(creations(&memory), vec!["atg-dbprimary"]);
    }

    #[test]
    fn destroy_with_nothing_selected_is_a_no_op() {
        let config = testing::configuration();
        let context = testing::context();
        let memory = MemoryBackend::new();
        memory.add_container("other-httpd", ContainerStatus::Running, resource_labels("other"));
        memory.add_container("atg-httpd", ContainerStatus::Running, Labels::new());
        let mut backend = memory.clone();

        let removed = ContainerLifecycle::new(&mut backend, testing::invocation(&config, &context))
            .destroy(&Scope::Set("atg"))
            .unwrap();

        assert_eq!(removed, 0);
        assert!(memory.mutations().is_empty());
    }

    #[test]
    fn destroy_stops_running_containers_first() {
        let config = testing::configuration();
        let context = testing::context();
        let memory = MemoryBackend::new();
        memory.add_container("atg-httpd", ContainerStatus::Running, resource_labels("atg"));
        memory.add_container("atg-dbprimary", ContainerStatus::Exited, resource_labels("atg"));
        let mut backend = memory.clone();

        let removed = ContainerLifecycle::new(&mut backend, testing::invocation(&config, &context))
            .destroy(&Scope::Set("atg"))
            .unwrap();

        assert_eq!(removed, 2);
        assert_eq!(
            memory.mutations(),
            vec![
                Call::StopContainer("atg-httpd".into()),
                Call::RemoveContainer("atg-httpd".into()),
                Call::RemoveContainer("atg-dbprimary".into()),
            ]
        );
    }

    #[test]
    fn named_scope_matches_the_component_basename() {
        let config = testing::configuration();
        let context = testing::context();
        let memory = MemoryBackend::new();
        memory.add_container("atg-db-01", ContainerStatus::Exited, resource_labels("atg"));
        memory.add_container("atg-dbprimary", ContainerStatus::Exited, resource_labels("atg"));
        memory.add_container("atg-dbextstore", ContainerStatus::Exited, resource_labels("atg"));
        let mut backend = memory.clone();

        let scope = Scope::for_set("atg", Some(ComponentType::DbReplica));
        let selected = ContainerLifecycle::new(&mut backend, testing::invocation(&config, &context))
            .select(&scope)
            .unwrap();

        assert_eq!(
            selected.into_iter().map(|c| c.name.0).collect::<Vec<_>>(),
            vec!["atg-db-01"]
        );
    }

    #[test]
    fn all_scope_needs_the_ownership_label() {
        let config = testing::configuration();
        let context = testing::context();
        let memory = MemoryBackend::new();
        memory.add_container("atg-httpd", ContainerStatus::Exited, resource_labels("atg"));
        memory.add_container("other-httpd", ContainerStatus::Exited, resource_labels("other"));
        memory.add_container("stray", ContainerStatus::Exited, labels::set_label("atg"));
        let mut backend = memory.clone();

        let removed = ContainerLifecycle::new(&mut backend, testing::invocation(&config, &context))
            .destroy(&Scope::All)
            .unwrap();

        assert_eq!(removed, 2);
        assert_eq!(memory.container_names(), vec!["stray"]);
    }

    #[test]
    fn start_and_stop_follow_the_state_machine() {
        let config = testing::configuration();
        let context = testing::context();
        let memory = MemoryBackend::new();
        memory.add_container("atg-httpd", ContainerStatus::Created, resource_labels("atg"));
        memory.add_container("atg-phpfpm", ContainerStatus::Running, resource_labels("atg"));
        memory.add_container("atg-dbprimary", ContainerStatus::Exited, resource_labels("atg"));
        let mut backend = memory.clone();
        let scope = Scope::Set("atg");

        let started = ContainerLifecycle::new(&mut backend, testing::invocation(&config, &context))
            .start(&scope)
            .unwrap();
        assert_eq!(started, 2);
        assert_eq!(
            memory.mutations(),
            vec![
                Call::StartContainer("atg-httpd".into()),
                Call::StartContainer("atg-dbprimary".into()),
            ]
        );

        memory.clear_calls();
        let stopped = ContainerLifecycle::new(&mut backend, testing::invocation(&config, &context))
            .stop(&scope)
            .unwrap();
        assert_eq!(stopped, 3);
        for name in ["atg-httpd", "atg-phpfpm", "atg-dbprimary"].iter() {
            assert_eq!(memory.container(name).unwrap().status, ContainerStatus::Exited);
        }

        memory.clear_calls();
        let stopped = ContainerLifecycle::new(&mut backend, testing::invocation(&config, &context))
            .stop(&scope)
            .unwrap();
        assert_eq!(stopped, 0);
        assert!(memory.mutations().is_empty());
    }
}
