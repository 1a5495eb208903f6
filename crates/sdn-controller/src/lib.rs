//! SDN Controller - shortest-path routing and transparent load balancing
//!
//! This crate is the control-plane logic of an SDN application. It keeps a
//! model of the network topology, computes shortest paths between devices,
//! installs per-host forwarding rules on every device, and load-balances
//! TCP connections addressed to virtual service IPs across real backends.
//!
//! # Architecture
//!
//! ```text
//! [discovery] ──TopologyChange──┐
//! [host tracker] ──HostChange───┼──> [ControllerDaemon] ──> [L3RoutingOrch] ──┐
//! [devices] ──PacketIn──────────┘          │                                  ├──> [FlowProgrammer]
//!                                          └──────────> [LoadBalancerOrch] ───┼──> [PacketEmitter]
//!                                                                             └──< [AddressResolver]
//! ```
//!
//! # Key Components
//!
//! - [`daemon::ControllerDaemon`]: Single-writer event loop and Orch coordination
//! - [`paths`]: Shortest-path trees over the unit-weight device graph
//! - [`l3routing::L3RoutingOrch`]: Per-host route synthesis and resync
//! - [`loadbalancer::LoadBalancerOrch`]: ARP answering and connection dispatch
//! - [`flow`]: Rule model and collaborator traits

pub mod config;
pub mod daemon;
pub mod flow;
pub mod l3routing;
pub mod loadbalancer;
pub mod packet;
pub mod paths;
pub mod sim;
pub mod topology;

pub use config::{ConfigError, ControllerConfig};
pub use daemon::{ControllerDaemon, ControllerEvent, ControllerHandle};
