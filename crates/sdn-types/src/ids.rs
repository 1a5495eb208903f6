//! Identifiers for devices, ports and flow tables.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Stable datapath identifier of a forwarding device (switch).
///
/// Displayed as `s<id>`; parsing accepts `s<id>`, a decimal id, or a
/// `0x`-prefixed hexadecimal datapath id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(u64);

impl DeviceId {
    pub const fn new(id: u64) -> Self {
        DeviceId(id)
    }

    pub const fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

impl FromStr for DeviceId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseError::InvalidDeviceId(s.to_string());
        let trimmed = s.trim();

        let id = if let Some(hex) = trimmed.strip_prefix("0x") {
            u64::from_str_radix(hex, 16).map_err(|_| invalid())?
        } else {
            trimmed
                .strip_prefix('s')
                .unwrap_or(trimmed)
                .parse::<u64>()
                .map_err(|_| invalid())?
        };

        Ok(DeviceId(id))
    }
}

impl From<u64> for DeviceId {
    fn from(id: u64) -> Self {
        DeviceId(id)
    }
}

/// Port number on a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PortNo(u32);

impl PortNo {
    pub const fn new(port: u32) -> Self {
        PortNo(port)
    }

    pub const fn get(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for PortNo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for PortNo {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u32>()
            .map(PortNo)
            .map_err(|_| ParseError::InvalidPort(s.to_string()))
    }
}

impl From<u32> for PortNo {
    fn from(port: u32) -> Self {
        PortNo(port)
    }
}

/// Flow table identifier, i.e. one stage of a device's forwarding pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TableId(u8);

impl TableId {
    pub const fn new(id: u8) -> Self {
        TableId(id)
    }

    pub const fn get(&self) -> u8 {
        self.0
    }

    /// Returns the following pipeline stage, if there is one.
    pub fn next(&self) -> Option<TableId> {
        self.0.checked_add(1).map(TableId)
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "table{}", self.0)
    }
}

impl FromStr for TableId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u8>()
            .map(TableId)
            .map_err(|_| ParseError::InvalidTableId(s.to_string()))
    }
}

impl From<u8> for TableId {
    fn from(id: u8) -> Self {
        TableId(id)
    }
}
