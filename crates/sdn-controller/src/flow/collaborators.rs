//! Collaborator traits for the services the controller depends on.
//!
//! Discovery, host tracking and the device channel live outside this crate.
//! Every call is a synchronous submit; a returned error means the request
//! was not accepted, and the caller logs it without retrying.

use sdn_types::{DeviceId, MacAddress, PortNo, TableId};
use std::net::Ipv4Addr;

use super::types::{FlowMatch, FlowRule};
use crate::topology::{Device, Host, HostChange, Link};

/// Error type for device programming and packet emission.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FlowError {
    #[error("Device {0} is not connected")]
    DeviceDisconnected(DeviceId),

    #[error("Device {device} rejected request: {reason}")]
    Rejected { device: DeviceId, reason: String },

    #[error("Channel error: {0}")]
    Channel(String),
}

/// Result type for collaborator calls.
pub type Result<T> = std::result::Result<T, FlowError>;

/// Source of the current device and link sets.
pub trait TopologyProvider: Send + Sync {
    fn devices(&self) -> Vec<Device>;

    fn links(&self) -> Vec<Link>;
}

/// Source of known end hosts.
pub trait HostTracker: Send + Sync {
    fn hosts(&self) -> Vec<Host>;

    /// Called for every host change the controller receives, before it is
    /// acted on. Trackers that learn hosts on their own can ignore it.
    fn record_change(&self, _change: &HostChange) {}
}

/// Maps IPv4 addresses to hardware addresses of known hosts.
pub trait AddressResolver: Send + Sync {
    fn resolve_mac(&self, ip: Ipv4Addr) -> Option<MacAddress>;
}

/// Installs and removes rules on devices.
pub trait FlowProgrammer: Send + Sync {
    fn install(&self, device: DeviceId, rule: &FlowRule) -> Result<()>;

    /// Removes the rule with exactly this match from `table`. Removing a
    /// rule that does not exist is not an error.
    fn remove(&self, device: DeviceId, table: TableId, flow_match: &FlowMatch) -> Result<()>;
}

/// Emits raw frames out of a device port.
pub trait PacketEmitter: Send + Sync {
    fn send(&self, device: DeviceId, port: PortNo, frame: &[u8]) -> Result<()>;
}
