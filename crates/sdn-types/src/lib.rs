//! Common types for the SDN control plane.
//!
//! This crate provides type-safe representations of the network primitives
//! shared by the topology model, the rule synthesizer and the load balancer:
//!
//! - [`MacAddress`]: 48-bit Ethernet MAC addresses
//! - [`DeviceId`]: Stable datapath identifier of a forwarding device
//! - [`PortNo`]: Port number on a device
//! - [`TableId`]: Flow table (pipeline stage) identifier

mod ids;
mod mac;

pub use ids::{DeviceId, PortNo, TableId};
pub use mac::MacAddress;

/// Common error type for parsing failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid MAC address format: {0}")]
    InvalidMacAddress(String),

    #[error("invalid device id: {0}")]
    InvalidDeviceId(String),

    #[error("invalid port number: {0}")]
    InvalidPort(String),

    #[error("invalid table id: {0}")]
    InvalidTableId(String),
}
