//! L3 routing types.

use sdn_types::{DeviceId, TableId};
use std::collections::BTreeSet;
use std::net::Ipv4Addr;

use crate::topology::{Host, TopologySnapshot};

/// Configuration for L3RoutingOrch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingConfig {
    /// Table holding per-host routes and the bootstrap rules.
    pub table: TableId,
    /// Table the bootstrap catch-all continues to.
    pub next_table: TableId,
    /// Virtual IPs whose TCP and ARP traffic is punted to the controller.
    pub virtual_ips: Vec<Ipv4Addr>,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            table: TableId::new(1),
            next_table: TableId::new(2),
            virtual_ips: Vec::new(),
        }
    }
}

/// Work item for L3RoutingOrch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutingTask {
    /// A device (re)joined and needs its bootstrap rules.
    DeviceJoined(DeviceId),
    /// A device left; its rules went with it.
    DeviceRemoved(DeviceId),
    /// Recompute paths and rebuild every device's routes.
    Resync {
        topology: TopologySnapshot,
        hosts: Vec<Host>,
    },
    HostAttached(Host),
    HostDetached(Host),
    HostMoved { previous: Host, current: Host },
}

impl RoutingTask {
    pub fn is_resync(&self) -> bool {
        matches!(self, RoutingTask::Resync { .. })
    }
}

/// Destination IPs whose routes are installed on one device.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstalledRuleRecord {
    destinations: BTreeSet<Ipv4Addr>,
}

impl InstalledRuleRecord {
    pub fn insert(&mut self, ip: Ipv4Addr) -> bool {
        self.destinations.insert(ip)
    }

    pub fn remove(&mut self, ip: Ipv4Addr) -> bool {
        self.destinations.remove(&ip)
    }

    pub fn contains(&self, ip: Ipv4Addr) -> bool {
        self.destinations.contains(&ip)
    }

    pub fn iter(&self) -> impl Iterator<Item = Ipv4Addr> + '_ {
        self.destinations.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.destinations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.destinations.is_empty()
    }

    /// Empties the record, returning what it held.
    pub fn take(&mut self) -> BTreeSet<Ipv4Addr> {
        std::mem::take(&mut self.destinations)
    }
}
