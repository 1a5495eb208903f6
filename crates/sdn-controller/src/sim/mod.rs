//! In-process collaborators for running without a device channel.
//!
//! The topology and hosts come from configuration; rule programming and
//! packet emission are only logged.

use log::info;
use sdn_types::{DeviceId, MacAddress, PortNo, TableId};
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use crate::config::StaticTopologyConfig;
use crate::flow::{
    AddressResolver, FlowError, FlowMatch, FlowProgrammer, FlowRule, HostTracker, PacketEmitter,
    TopologyProvider,
};
use crate::topology::{Device, Host, HostChange, Link};

/// Fixed device and link sets.
#[derive(Debug, Clone, Default)]
pub struct StaticTopology {
    devices: Vec<Device>,
    links: Vec<Link>,
}

impl StaticTopology {
    pub fn new(devices: Vec<Device>, links: Vec<Link>) -> Self {
        Self { devices, links }
    }

    pub fn from_config(config: &StaticTopologyConfig) -> Self {
        Self::new(config.devices.clone(), config.links.clone())
    }
}

impl TopologyProvider for StaticTopology {
    fn devices(&self) -> Vec<Device> {
        self.devices.clone()
    }

    fn links(&self) -> Vec<Link> {
        self.links.clone()
    }
}

/// Host table that also answers address resolution.
#[derive(Debug, Default)]
pub struct StaticHostTracker {
    hosts: RwLock<Vec<Host>>,
}

impl StaticHostTracker {
    pub fn new(hosts: Vec<Host>) -> Self {
        Self {
            hosts: RwLock::new(hosts),
        }
    }

    pub fn from_config(config: &StaticTopologyConfig) -> Self {
        Self::new(config.hosts.iter().map(|h| h.to_host()).collect())
    }
}

impl HostTracker for StaticHostTracker {
    fn hosts(&self) -> Vec<Host> {
        self.hosts.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Keeps the table in step with host changes fed to the controller.
    fn record_change(&self, change: &HostChange) {
        let mut hosts = self.hosts.write().unwrap_or_else(|e| e.into_inner());
        match change {
            HostChange::Attached(host) => {
                hosts.retain(|h| h.mac != host.mac);
                hosts.push(host.clone());
            }
            HostChange::Detached(host) => {
                if let Some(h) = hosts.iter_mut().find(|h| h.mac == host.mac) {
                    h.attachment = None;
                }
            }
            HostChange::Moved { current, .. } => {
                hosts.retain(|h| h.mac != current.mac);
                hosts.push(current.clone());
            }
        }
    }
}

impl AddressResolver for StaticHostTracker {
    fn resolve_mac(&self, ip: Ipv4Addr) -> Option<MacAddress> {
        self.hosts
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .find(|h| h.ipv4 == Some(ip))
            .map(|h| h.mac)
    }
}

/// Logs every rule operation instead of sending it to a device.
#[derive(Debug, Default)]
pub struct LoggingFlowProgrammer {
    installs: AtomicU64,
    removals: AtomicU64,
}

impl LoggingFlowProgrammer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn installs(&self) -> u64 {
        self.installs.load(Ordering::Relaxed)
    }

    pub fn removals(&self) -> u64 {
        self.removals.load(Ordering::Relaxed)
    }
}

impl FlowProgrammer for LoggingFlowProgrammer {
    fn install(&self, device: DeviceId, rule: &FlowRule) -> Result<(), FlowError> {
        self.installs.fetch_add(1, Ordering::Relaxed);
        info!("flow-mod add {}: {}", device, rule);
        Ok(())
    }

    fn remove(&self, device: DeviceId, table: TableId, flow_match: &FlowMatch) -> Result<(), FlowError> {
        self.removals.fetch_add(1, Ordering::Relaxed);
        info!("flow-mod delete {} {}: [{}]", device, table, flow_match);
        Ok(())
    }
}

/// Logs every emitted frame instead of sending it.
#[derive(Debug, Default)]
pub struct LoggingPacketEmitter {
    sent: AtomicU64,
}

impl LoggingPacketEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }
}

impl PacketEmitter for LoggingPacketEmitter {
    fn send(&self, device: DeviceId, port: PortNo, frame: &[u8]) -> Result<(), FlowError> {
        self.sent.fetch_add(1, Ordering::Relaxed);
        info!("packet-out {}:{} ({} bytes)", device, port, frame.len());
        Ok(())
    }
}
