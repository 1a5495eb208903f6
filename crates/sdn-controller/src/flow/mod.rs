//! Flow rules and the collaborator interfaces used to program devices.

mod collaborators;
mod types;

pub use collaborators::{
    AddressResolver, FlowError, FlowProgrammer, HostTracker, PacketEmitter, TopologyProvider,
};
pub use types::{
    bootstrap_rules, EtherType, FlowAction, FlowInstruction, FlowMatch, FlowRule, IpProtocol,
    DEFAULT_PRIORITY, IDLE_TIMEOUT_SECS, MAX_PRIORITY, NO_TIMEOUT,
};
