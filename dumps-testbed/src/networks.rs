use anyhow::Result;
use ipnetwork::Ipv4Network;
use log::{info, warn};
use std::net::Ipv4Addr;

use crate::{
    error::Error,
    labels::{has_labels, resource_labels, set_label},
    models::{Labels, Network, NetworkSpec},
    services::ContainerBackend,
};

/// Every set network is carved out of 172.16.0.0/12.
const SUPERNET_BASE: Ipv4Addr = Ipv4Addr::new(172, 16, 0, 0);
const SUPERNET_PREFIX: u8 = 12;
const SUBNET_PREFIX: u8 = 24;

/// Subnets reported with this prefix count as used.
const USED_PREFIX: &str = "172.";

const DRIVER: &str = "bridge";

pub fn network_name(set: &str) -> String {
    format!("{}.lan", set)
}

/// Inclusive first and last address of a network, as integers.
fn bounds(network: &Ipv4Network) -> (u32, u32) {
    (
        u32::from(network.network()),
        u32::from(network.broadcast()),
    )
}

/// Picks the lowest /24 in the supernet that overlaps none of `used`.
/// Used subnets outside the supernet are ignored.
pub fn allocate_subnet(used: &[Ipv4Network]) -> Result<Ipv4Network> {
    let supernet = Ipv4Network::new(SUPERNET_BASE, SUPERNET_PREFIX)?;
    let (first, last) = bounds(&supernet);
    let step = 1u32 << (32 - SUBNET_PREFIX);

    let used = used.iter().map(bounds).collect::<Vec<_>>();

    let mut start = first;
    while start <= last {
        let end = start + (step - 1);
        let overlapping = used
            .iter()
            .find(|(used_start, used_end)| *used_start <= end && start <= *used_end);

        match overlapping {
            // Jump past the overlapping block, rounded up to the next /24.
            Some((_, used_end)) => match used_end.checked_add(1) {
                Some(next) => start = next.saturating_add(step - 1) & !(step - 1),
                None => break,
            },
            None => return Ok(Ipv4Network::new(Ipv4Addr::from(start), SUBNET_PREFIX)?),
        }
    }

    Err(Error::AddressSpaceExhausted {
        supernet,
        prefix: SUBNET_PREFIX,
    }
    .into())
}

pub struct NetworkAllocator<'a> {
    backend: &'a mut dyn ContainerBackend,
}

impl<'a> NetworkAllocator<'a> {
    pub fn new(backend: &'a mut dyn ContainerBackend) -> NetworkAllocator<'a> {
        NetworkAllocator { backend }
    }

    /// Creates `<set>.lan` with a free /24 unless it already exists.
    pub fn ensure_network(&mut self, set: &str) -> Result<()> {
        let name = network_name(set);
        let networks = self.backend.list_networks()?;

        let wanted = set_label(set);
        let exists = networks
            .iter()
            .any(|network| network.name == name && has_labels(&network.labels, &wanted));
        if exists {
            info!("network {} already exists", name);
            return Ok(());
        }

        let used = networks
            .iter()
            .flat_map(|network| network.subnets.iter())
            .filter(|subnet| subnet.starts_with(USED_PREFIX))
            .filter_map(|subnet| match subnet.parse::<Ipv4Network>() {
                Ok(subnet) => Some(subnet),
                Err(err) => {
                    warn!("ignoring unparsable subnet {:?}: {}", subnet, err);
                    None
                }
            })
            .collect::<Vec<_>>();
        info!("address space already used: {:?}", used);

        let subnet = allocate_subnet(&used)?;
        info!("creating network {} with subnet {}", name, subnet);

        self.backend.create_network(NetworkSpec {
            name,
            driver: DRIVER.into(),
            subnet,
            labels: resource_labels(set),
        })
    }

    /// Removes every network named `name` or `<set>.lan` that carries the
    /// set label. Returns how many were removed; none is fine.
    pub fn remove_set_networks(&mut self, set: &str, name: Option<&str>) -> Result<usize> {
        let canonical = network_name(set);
        let wanted = set_label(set);

        self.remove_matching(|network| {
            (name == Some(network.name.as_str()) || network.name == canonical)
                && has_labels(&network.labels, &wanted)
        })
    }

    /// Removes every network carrying all of `labels`.
    pub fn remove_labelled(&mut self, labels: &Labels) -> Result<usize> {
        self.remove_matching(|network| has_labels(&network.labels, labels))
    }

    fn remove_matching(&mut self, doomed: impl Fn(&Network) -> bool) -> Result<usize> {
        let doomed = self
            .backend
            .list_networks()?
            .into_iter()
            .filter(|network| doomed(network))
            .collect::<Vec<_>>();

        for network in doomed.iter() {
            info!("removing network {}", network.name);
            self.backend.remove_network(&network.id)?;
        }

        Ok(doomed.len())
    }
}
