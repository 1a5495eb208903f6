//! Shortest-path L3 routing of host traffic.

mod orch;
mod types;

pub use orch::{L3RoutingOrch, Result, RoutingError};
pub use types::{InstalledRuleRecord, RoutingConfig, RoutingTask};
