//! LoadBalancerOrch implementation.
//!
//! Answers ARP for virtual IPs and turns the first packet of every TCP
//! connection to a virtual IP into a pair of rewrite rules, so the rest of
//! the connection flows between client and backend in the data plane.

use async_trait::async_trait;
use log::{debug, error, info, warn};
use sdn_orch_common::{Orch, QueueConfig, TaskCounters, TaskQueue, TaskStatus};
use sdn_types::{DeviceId, TableId};
use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::sync::Arc;

use super::instance::LoadBalancerInstance;
use crate::flow::{
    bootstrap_rules, AddressResolver, FlowAction, FlowError, FlowMatch, FlowProgrammer, FlowRule,
    PacketEmitter, IDLE_TIMEOUT_SECS, MAX_PRIORITY,
};
use crate::packet::{build_arp_reply, parse_frame, ArpFrame, PacketError, PacketIn, ParsedPacket, TcpSegmentInfo};

/// Error type for LoadBalancerOrch operations.
#[derive(Debug, thiserror::Error)]
pub enum LoadBalancerError {
    #[error("Malformed instance '{definition}': {reason}")]
    MalformedInstanceConfig { definition: String, reason: String },

    #[error("No MAC address known for backend {0}")]
    UnresolvedAddress(Ipv4Addr),

    #[error("{0} is not a virtual IP")]
    UnknownVirtualIp(Ipv4Addr),

    #[error("Undecodable frame: {0}")]
    Packet(#[from] PacketError),

    #[error("Flow programming failed: {0}")]
    Flow(#[from] FlowError),
}

impl LoadBalancerError {
    pub fn to_status(&self) -> TaskStatus {
        match self {
            LoadBalancerError::MalformedInstanceConfig { .. } | LoadBalancerError::Packet(_) => {
                TaskStatus::InvalidEntry
            }
            LoadBalancerError::UnresolvedAddress(_) => TaskStatus::Skipped,
            LoadBalancerError::UnknownVirtualIp(_) => TaskStatus::Ignore,
            LoadBalancerError::Flow(_) => TaskStatus::Failed,
        }
    }
}

/// Result type for LoadBalancerOrch operations.
pub type Result<T> = std::result::Result<T, LoadBalancerError>;

/// Configuration for LoadBalancerOrch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadBalancerConfig {
    /// Table holding the bootstrap and connection rules.
    pub table: TableId,
    /// Table rewritten packets continue to.
    pub routing_table: TableId,
    /// Idle timeout of connection rules, in seconds.
    pub idle_timeout: u16,
}

impl Default for LoadBalancerConfig {
    fn default() -> Self {
        Self {
            table: TableId::new(0),
            routing_table: TableId::new(1),
            idle_timeout: IDLE_TIMEOUT_SECS,
        }
    }
}

/// Whether the dispatcher took ownership of a packet-in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketDisposition {
    /// Handled here; no other application should process it.
    Consumed,
    /// Not virtual-IP traffic.
    Ignored,
}

/// Work item for LoadBalancerOrch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadBalancerTask {
    DeviceJoined(DeviceId),
    PacketIn(PacketIn),
}

/// Collaborators used by LoadBalancerOrch.
#[derive(Clone)]
pub struct LoadBalancerCollaborators {
    pub programmer: Arc<dyn FlowProgrammer>,
    pub emitter: Arc<dyn PacketEmitter>,
    pub resolver: Arc<dyn AddressResolver>,
}

/// LoadBalancerOrch - virtual IP connection dispatcher.
pub struct LoadBalancerOrch {
    config: LoadBalancerConfig,
    instances: BTreeMap<Ipv4Addr, LoadBalancerInstance>,
    queue: TaskQueue<LoadBalancerTask>,
    collaborators: LoadBalancerCollaborators,
    counters: TaskCounters,
}

impl LoadBalancerOrch {
    pub fn new(
        config: LoadBalancerConfig,
        instances: BTreeMap<Ipv4Addr, LoadBalancerInstance>,
        collaborators: LoadBalancerCollaborators,
    ) -> Self {
        Self {
            config,
            instances,
            queue: TaskQueue::new(QueueConfig::new("LOADBALANCER_TASKS")),
            collaborators,
            counters: TaskCounters::default(),
        }
    }

    pub fn config(&self) -> &LoadBalancerConfig {
        &self.config
    }

    pub fn instance(&self, vip: Ipv4Addr) -> Option<&LoadBalancerInstance> {
        self.instances.get(&vip)
    }

    pub fn instances(&self) -> impl Iterator<Item = &LoadBalancerInstance> {
        self.instances.values()
    }

    pub fn virtual_ips(&self) -> Vec<Ipv4Addr> {
        self.instances.keys().copied().collect()
    }

    pub fn counters(&self) -> TaskCounters {
        self.counters
    }

    pub fn enqueue(&mut self, task: LoadBalancerTask) {
        self.queue.push(task);
    }

    /// Installs the bootstrap rules on a (re)joining device.
    pub fn bootstrap_device(&mut self, device: DeviceId) -> Result<()> {
        let rules = bootstrap_rules(self.config.table, self.config.routing_table, &self.virtual_ips());
        for rule in &rules {
            self.collaborators.programmer.install(device, rule)?;
        }
        info!(
            "LoadBalancerOrch: Installed {} bootstrap rules on {}",
            rules.len(),
            device
        );
        Ok(())
    }

    /// Classifies one packet-in and acts on virtual-IP traffic.
    pub fn handle_packet_in(&mut self, packet: &PacketIn) -> PacketDisposition {
        let (disposition, status) = match self.classify(packet) {
            Ok(disposition) => {
                let status = match disposition {
                    PacketDisposition::Consumed => TaskStatus::Success,
                    PacketDisposition::Ignored => TaskStatus::Ignore,
                };
                (disposition, status)
            }
            Err(LoadBalancerError::Packet(e)) => {
                debug!(
                    "LoadBalancerOrch: Ignoring undecodable frame from {}:{}: {}",
                    packet.device, packet.in_port, e
                );
                (PacketDisposition::Ignored, TaskStatus::InvalidEntry)
            }
            Err(e) => {
                // Virtual-IP traffic is consumed even when dispatch fails
                error!(
                    "LoadBalancerOrch: Dropping packet from {}:{}: {}",
                    packet.device, packet.in_port, e
                );
                (PacketDisposition::Consumed, e.to_status())
            }
        };
        self.counters.record(status);
        disposition
    }

    fn classify(&mut self, packet: &PacketIn) -> Result<PacketDisposition> {
        match parse_frame(&packet.data)? {
            ParsedPacket::Arp(arp) if arp.is_request() && self.instances.contains_key(&arp.target_ip) => {
                self.answer_arp(packet, &arp)?;
                Ok(PacketDisposition::Consumed)
            }
            ParsedPacket::Tcp(segment) if self.instances.contains_key(&segment.dst_ip) => {
                self.dispatch_connection(packet.device, &segment)?;
                Ok(PacketDisposition::Consumed)
            }
            _ => Ok(PacketDisposition::Ignored),
        }
    }

    fn answer_arp(&self, packet: &PacketIn, request: &ArpFrame) -> Result<()> {
        let instance = self
            .instances
            .get(&request.target_ip)
            .ok_or(LoadBalancerError::UnknownVirtualIp(request.target_ip))?;

        let reply = build_arp_reply(request, instance.virtual_mac(), instance.virtual_ip());
        self.collaborators
            .emitter
            .send(packet.device, packet.in_port, &reply)?;

        debug!(
            "LoadBalancerOrch: Answered ARP for {} from {} on {}:{}",
            request.target_ip, request.sender_ip, packet.device, packet.in_port
        );
        Ok(())
    }

    /// Picks a backend for a new connection and installs its rewrite rules.
    ///
    /// Returns the selected backend.
    pub fn dispatch_connection(&mut self, device: DeviceId, segment: &TcpSegmentInfo) -> Result<Ipv4Addr> {
        let instance = self
            .instances
            .get_mut(&segment.dst_ip)
            .ok_or(LoadBalancerError::UnknownVirtualIp(segment.dst_ip))?;
        let vip = instance.virtual_ip();
        let vmac = instance.virtual_mac();
        let server = instance.next_server();

        let server_mac = self
            .collaborators
            .resolver
            .resolve_mac(server)
            .ok_or(LoadBalancerError::UnresolvedAddress(server))?;

        let client = segment.src_ip;
        let client_port = segment.src_port;
        let server_port = segment.dst_port;

        let to_server = FlowRule::new(
            self.config.table,
            MAX_PRIORITY,
            FlowMatch::tcp_flow(client, vip, client_port, server_port),
        )
        .apply(vec![
            FlowAction::SetIpv4Dst(server),
            FlowAction::SetEthDst(server_mac),
        ])
        .goto(self.config.routing_table)
        .with_idle_timeout(self.config.idle_timeout);

        let to_client = FlowRule::new(
            self.config.table,
            MAX_PRIORITY,
            FlowMatch::tcp_flow(server, client, server_port, client_port),
        )
        .apply(vec![FlowAction::SetIpv4Src(vip), FlowAction::SetEthSrc(vmac)])
        .goto(self.config.routing_table)
        .with_idle_timeout(self.config.idle_timeout);

        let programmer = &self.collaborators.programmer;
        programmer.install(device, &to_server)?;
        if let Err(e) = programmer.install(device, &to_client) {
            // Never leave a forward rule without its return path
            if let Err(undo) = programmer.remove(device, to_server.table, &to_server.flow_match) {
                warn!(
                    "LoadBalancerOrch: Failed to roll back {} on {}: {}",
                    to_server.flow_match, device, undo
                );
            }
            return Err(e.into());
        }

        info!(
            "LoadBalancerOrch: {}:{} -> {}:{} dispatched to {} on {}",
            client, client_port, vip, server_port, server, device
        );
        Ok(server)
    }

    fn process(&mut self, task: LoadBalancerTask) {
        match task {
            LoadBalancerTask::DeviceJoined(device) => {
                let status = match self.bootstrap_device(device) {
                    Ok(()) => TaskStatus::Success,
                    Err(e) => {
                        error!("LoadBalancerOrch: Bootstrap of {} failed: {}", device, e);
                        e.to_status()
                    }
                };
                self.counters.record(status);
            }
            LoadBalancerTask::PacketIn(packet) => {
                self.handle_packet_in(&packet);
            }
        }
    }

    /// Human-readable per-instance dispatch statistics.
    pub fn dump_instances(&self) -> Vec<String> {
        self.instances
            .values()
            .map(|instance| {
                let assignments: Vec<String> = instance
                    .assignments()
                    .map(|(server, count)| format!("{}={}", server, count))
                    .collect();
                format!(
                    "{} ({}): {}",
                    instance.virtual_ip(),
                    instance.virtual_mac(),
                    assignments.join(" ")
                )
            })
            .collect()
    }
}

#[async_trait]
impl Orch for LoadBalancerOrch {
    fn name(&self) -> &str {
        "LoadBalancerOrch"
    }

    fn priority(&self) -> i32 {
        5
    }

    async fn do_task(&mut self) {
        while self.queue.has_pending() {
            for task in self.queue.drain() {
                self.process(task);
            }
        }
    }

    fn has_pending_tasks(&self) -> bool {
        self.queue.has_pending()
    }

    fn dump_pending_tasks(&self) -> Vec<String> {
        self.queue.dump()
    }
}
