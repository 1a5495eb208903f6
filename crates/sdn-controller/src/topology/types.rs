//! Topology data types.

use sdn_types::{DeviceId, MacAddress, PortNo};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::net::Ipv4Addr;

/// A forwarding device (switch) and its ports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub id: DeviceId,
    #[serde(default)]
    pub ports: BTreeSet<PortNo>,
}

impl Device {
    pub fn new(id: DeviceId) -> Self {
        Self {
            id,
            ports: BTreeSet::new(),
        }
    }

    pub fn with_ports(mut self, ports: impl IntoIterator<Item = PortNo>) -> Self {
        self.ports.extend(ports);
        self
    }
}

/// A link between two device ports.
///
/// Links are reported per direction by discovery but are always treated as
/// bidirectional for routing; [`Link::canonical`] gives the orientation the
/// graph stores so both directions collapse to one entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Link {
    pub src: DeviceId,
    pub src_port: PortNo,
    pub dst: DeviceId,
    pub dst_port: PortNo,
}

impl Link {
    pub fn new(src: DeviceId, src_port: PortNo, dst: DeviceId, dst_port: PortNo) -> Self {
        Self {
            src,
            src_port,
            dst,
            dst_port,
        }
    }

    /// Returns the same link seen from the other end.
    pub fn reversed(&self) -> Self {
        Self::new(self.dst, self.dst_port, self.src, self.src_port)
    }

    /// Returns the orientation with the lower (device, port) endpoint first.
    pub fn canonical(&self) -> Self {
        if (self.src, self.src_port) <= (self.dst, self.dst_port) {
            *self
        } else {
            self.reversed()
        }
    }

    /// Returns true if this link joins `a` and `b`, in either direction.
    pub fn connects(&self, a: DeviceId, b: DeviceId) -> bool {
        (self.src == a && self.dst == b) || (self.src == b && self.dst == a)
    }

    /// Returns true if `device` is one of the endpoints.
    pub fn touches(&self, device: DeviceId) -> bool {
        self.src == device || self.dst == device
    }

    /// Returns true if the given device port is one of the endpoints.
    pub fn uses_port(&self, device: DeviceId, port: PortNo) -> bool {
        (self.src == device && self.src_port == port) || (self.dst == device && self.dst_port == port)
    }

    /// Returns the port on `device`'s side of a link towards `peer`.
    pub fn port_towards(&self, device: DeviceId, peer: DeviceId) -> Option<PortNo> {
        if self.src == device && self.dst == peer {
            Some(self.src_port)
        } else if self.dst == device && self.src == peer {
            Some(self.dst_port)
        } else {
            None
        }
    }
}

impl fmt::Display for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} <-> {}:{}",
            self.src, self.src_port, self.dst, self.dst_port
        )
    }
}

/// Where a host is plugged into the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Attachment {
    pub device: DeviceId,
    pub port: PortNo,
}

/// An end system as reported by the host tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Host {
    pub mac: MacAddress,
    pub ipv4: Option<Ipv4Addr>,
    pub attachment: Option<Attachment>,
}

impl Host {
    pub fn new(mac: MacAddress) -> Self {
        Self {
            mac,
            ipv4: None,
            attachment: None,
        }
    }

    pub fn with_ipv4(mut self, ip: Ipv4Addr) -> Self {
        self.ipv4 = Some(ip);
        self
    }

    pub fn attached_to(mut self, device: DeviceId, port: PortNo) -> Self {
        self.attachment = Some(Attachment { device, port });
        self
    }

    /// Returns a copy of this host with its attachment cleared.
    pub fn detached(&self) -> Self {
        Self {
            attachment: None,
            ..self.clone()
        }
    }

    /// A host is routable once it has both an attachment point and an IPv4
    /// address.
    pub fn is_attached(&self) -> bool {
        self.attachment.is_some() && self.ipv4.is_some()
    }
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.ipv4, self.attachment) {
            (Some(ip), Some(at)) => write!(f, "{} ({}) at {}:{}", ip, self.mac, at.device, at.port),
            (Some(ip), None) => write!(f, "{} ({}) detached", ip, self.mac),
            (None, _) => write!(f, "{}", self.mac),
        }
    }
}

/// Point-in-time copy of the device and link sets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopologySnapshot {
    pub devices: Vec<Device>,
    pub links: Vec<Link>,
}

impl TopologySnapshot {
    pub fn device_ids(&self) -> impl Iterator<Item = DeviceId> + '_ {
        self.devices.iter().map(|d| d.id)
    }

    /// Returns `device`'s port on the first link towards `peer`.
    pub fn port_towards(&self, device: DeviceId, peer: DeviceId) -> Option<PortNo> {
        self.links
            .iter()
            .find_map(|link| link.port_towards(device, peer))
    }
}

/// A change notification from the topology source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopologyChange {
    DeviceAdded(Device),
    DeviceRemoved(DeviceId),
    PortAdded { device: DeviceId, port: PortNo },
    PortRemoved { device: DeviceId, port: PortNo },
    LinkAdded(Link),
    LinkRemoved(Link),
}

/// A change notification from the host tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostChange {
    Attached(Host),
    Detached(Host),
    Moved { previous: Host, current: Host },
}
