//! Transparent TCP load balancing for virtual service IPs.

mod instance;
mod orch;

pub use instance::{
    build_instances, parse_instance, parse_instance_list, InstanceConfig, LoadBalancerInstance,
};
pub use orch::{
    LoadBalancerCollaborators, LoadBalancerConfig, LoadBalancerError, LoadBalancerOrch,
    LoadBalancerTask, PacketDisposition, Result,
};
