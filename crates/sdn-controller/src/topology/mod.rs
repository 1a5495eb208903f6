//! Topology graph model.
//!
//! Holds the controller's view of the network: devices, their ports, the
//! bidirectional links between them, and the host records supplied by the
//! host tracker. The graph is mutated only by [`TopologyChange`]
//! notifications applied on the daemon task.

mod graph;
mod types;

pub use graph::{TopologyError, TopologyGraph};
pub use types::{Attachment, Device, Host, HostChange, Link, TopologyChange, TopologySnapshot};
