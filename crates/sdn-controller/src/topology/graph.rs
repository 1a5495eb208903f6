//! Mutable topology graph.

use log::debug;
use sdn_types::{DeviceId, PortNo};
use std::collections::{BTreeMap, BTreeSet};

use super::types::{Device, Link, TopologyChange, TopologySnapshot};

/// Error type for topology updates.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TopologyError {
    #[error("Unknown device {0}")]
    UnknownDevice(DeviceId),

    #[error("Link {0} references unknown device {1}")]
    LinkToUnknownDevice(Link, DeviceId),

    #[error("Link {0} loops back to the same device")]
    SelfLoop(Link),
}

/// Result type for topology updates.
pub type Result<T> = std::result::Result<T, TopologyError>;

/// The controller's view of devices, ports and links.
///
/// Links are stored in canonical orientation, so the two per-direction
/// reports of one physical link produce a single entry.
#[derive(Debug, Clone, Default)]
pub struct TopologyGraph {
    devices: BTreeMap<DeviceId, Device>,
    links: BTreeSet<Link>,
    version: u64,
}

impl TopologyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Monotonic counter bumped on every effective change.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    pub fn contains_device(&self, id: DeviceId) -> bool {
        self.devices.contains_key(&id)
    }

    pub fn device(&self, id: DeviceId) -> Option<&Device> {
        self.devices.get(&id)
    }

    pub fn devices(&self) -> impl Iterator<Item = &Device> {
        self.devices.values()
    }

    pub fn links(&self) -> impl Iterator<Item = &Link> {
        self.links.iter()
    }

    /// Applies one change notification.
    ///
    /// Returns `Ok(true)` when the graph changed and paths must be
    /// recomputed, `Ok(false)` when the notification was redundant.
    pub fn apply(&mut self, change: TopologyChange) -> Result<bool> {
        let changed = match change {
            TopologyChange::DeviceAdded(device) => {
                let id = device.id;
                let previous = self.devices.insert(id, device);
                previous.as_ref() != self.devices.get(&id)
            }
            TopologyChange::DeviceRemoved(id) => {
                if self.devices.remove(&id).is_none() {
                    return Err(TopologyError::UnknownDevice(id));
                }
                let before = self.links.len();
                self.links.retain(|link| !link.touches(id));
                debug!(
                    "Topology: removed {} and {} attached links",
                    id,
                    before - self.links.len()
                );
                true
            }
            TopologyChange::PortAdded { device, port } => self
                .devices
                .get_mut(&device)
                .ok_or(TopologyError::UnknownDevice(device))?
                .ports
                .insert(port),
            TopologyChange::PortRemoved { device, port } => {
                let removed = self
                    .devices
                    .get_mut(&device)
                    .ok_or(TopologyError::UnknownDevice(device))?
                    .ports
                    .remove(&port);
                let before = self.links.len();
                self.links.retain(|link| !link.uses_port(device, port));
                removed || before != self.links.len()
            }
            TopologyChange::LinkAdded(link) => {
                self.validate_link(&link)?;
                self.links.insert(link.canonical())
            }
            TopologyChange::LinkRemoved(link) => self.links.remove(&link.canonical()),
        };

        if changed {
            self.version += 1;
        }
        Ok(changed)
    }

    fn validate_link(&self, link: &Link) -> Result<()> {
        if link.src == link.dst {
            return Err(TopologyError::SelfLoop(*link));
        }
        for endpoint in [link.src, link.dst] {
            if !self.devices.contains_key(&endpoint) {
                return Err(TopologyError::LinkToUnknownDevice(*link, endpoint));
            }
        }
        Ok(())
    }

    /// Returns the ports of `device` that face other devices.
    pub fn inter_device_ports(&self, device: DeviceId) -> BTreeSet<PortNo> {
        self.links
            .iter()
            .filter_map(|link| {
                if link.src == device {
                    Some(link.src_port)
                } else if link.dst == device {
                    Some(link.dst_port)
                } else {
                    None
                }
            })
            .collect()
    }

    /// Copies the current device and link sets.
    pub fn snapshot(&self) -> TopologySnapshot {
        TopologySnapshot {
            devices: self.devices.values().cloned().collect(),
            links: self.links.iter().copied().collect(),
        }
    }
}
