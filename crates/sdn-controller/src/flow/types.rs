//! Flow rule model: matches, actions, instructions.

use sdn_types::{MacAddress, PortNo, TableId};
use std::fmt;
use std::net::Ipv4Addr;

/// Priority of ordinary forwarding rules.
pub const DEFAULT_PRIORITY: u16 = 1;

/// Priority of per-connection rewrite rules.
pub const MAX_PRIORITY: u16 = u16::MAX;

/// Timeout value meaning "never expires".
pub const NO_TIMEOUT: u16 = 0;

/// Idle timeout of load-balancer connection rules, in seconds.
pub const IDLE_TIMEOUT_SECS: u16 = 20;

/// Ethernet payload types the controller matches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EtherType {
    Ipv4,
    Arp,
}

impl EtherType {
    pub const fn value(&self) -> u16 {
        match self {
            EtherType::Ipv4 => 0x0800,
            EtherType::Arp => 0x0806,
        }
    }
}

/// IPv4 protocol numbers the controller matches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IpProtocol {
    Icmp,
    Tcp,
    Udp,
}

impl IpProtocol {
    pub const fn value(&self) -> u8 {
        match self {
            IpProtocol::Icmp => 1,
            IpProtocol::Tcp => 6,
            IpProtocol::Udp => 17,
        }
    }
}

/// Header fields a rule matches on. Unset fields are wildcards.
///
/// For ARP rules `ipv4_dst` matches the target protocol address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct FlowMatch {
    pub eth_type: Option<EtherType>,
    pub ip_proto: Option<IpProtocol>,
    pub ipv4_src: Option<Ipv4Addr>,
    pub ipv4_dst: Option<Ipv4Addr>,
    pub tcp_src: Option<u16>,
    pub tcp_dst: Option<u16>,
}

impl FlowMatch {
    /// Matches every packet.
    pub fn any() -> Self {
        Self::default()
    }

    /// IPv4 packets addressed to `ip`.
    pub fn ipv4_dst(ip: Ipv4Addr) -> Self {
        Self::any().with_eth_type(EtherType::Ipv4).with_ipv4_dst(ip)
    }

    /// TCP segments addressed to `ip`.
    pub fn tcp_to(ip: Ipv4Addr) -> Self {
        Self::ipv4_dst(ip).with_ip_proto(IpProtocol::Tcp)
    }

    /// ARP packets whose target protocol address is `ip`.
    pub fn arp_for(ip: Ipv4Addr) -> Self {
        Self::any().with_eth_type(EtherType::Arp).with_ipv4_dst(ip)
    }

    /// One direction of a TCP connection.
    pub fn tcp_flow(src: Ipv4Addr, dst: Ipv4Addr, src_port: u16, dst_port: u16) -> Self {
        Self::any()
            .with_eth_type(EtherType::Ipv4)
            .with_ip_proto(IpProtocol::Tcp)
            .with_ipv4_src(src)
            .with_ipv4_dst(dst)
            .with_tcp_src(src_port)
            .with_tcp_dst(dst_port)
    }

    pub fn with_eth_type(mut self, eth_type: EtherType) -> Self {
        self.eth_type = Some(eth_type);
        self
    }

    pub fn with_ip_proto(mut self, proto: IpProtocol) -> Self {
        self.ip_proto = Some(proto);
        self
    }

    pub fn with_ipv4_src(mut self, ip: Ipv4Addr) -> Self {
        self.ipv4_src = Some(ip);
        self
    }

    pub fn with_ipv4_dst(mut self, ip: Ipv4Addr) -> Self {
        self.ipv4_dst = Some(ip);
        self
    }

    pub fn with_tcp_src(mut self, port: u16) -> Self {
        self.tcp_src = Some(port);
        self
    }

    pub fn with_tcp_dst(mut self, port: u16) -> Self {
        self.tcp_dst = Some(port);
        self
    }

    pub fn is_wildcard(&self) -> bool {
        *self == Self::any()
    }
}

impl fmt::Display for FlowMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_wildcard() {
            return write!(f, "*");
        }

        let mut fields = Vec::new();
        if let Some(t) = self.eth_type {
            fields.push(format!("eth_type={:#06x}", t.value()));
        }
        if let Some(p) = self.ip_proto {
            fields.push(format!("ip_proto={}", p.value()));
        }
        if let Some(ip) = self.ipv4_src {
            fields.push(format!("nw_src={}", ip));
        }
        if let Some(ip) = self.ipv4_dst {
            fields.push(format!("nw_dst={}", ip));
        }
        if let Some(p) = self.tcp_src {
            fields.push(format!("tp_src={}", p));
        }
        if let Some(p) = self.tcp_dst {
            fields.push(format!("tp_dst={}", p));
        }
        write!(f, "{}", fields.join(","))
    }
}

/// A packet action.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FlowAction {
    Output(PortNo),
    /// Punt the packet to the controller.
    Controller,
    SetEthSrc(MacAddress),
    SetEthDst(MacAddress),
    SetIpv4Src(Ipv4Addr),
    SetIpv4Dst(Ipv4Addr),
}

/// A rule instruction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FlowInstruction {
    ApplyActions(Vec<FlowAction>),
    GotoTable(TableId),
}

/// A complete forwarding rule for one device table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowRule {
    pub table: TableId,
    pub priority: u16,
    pub flow_match: FlowMatch,
    pub instructions: Vec<FlowInstruction>,
    /// Seconds without traffic before expiry; 0 never expires.
    pub idle_timeout: u16,
    /// Seconds after installation before expiry; 0 never expires.
    pub hard_timeout: u16,
}

impl FlowRule {
    pub fn new(table: TableId, priority: u16, flow_match: FlowMatch) -> Self {
        Self {
            table,
            priority,
            flow_match,
            instructions: Vec::new(),
            idle_timeout: NO_TIMEOUT,
            hard_timeout: NO_TIMEOUT,
        }
    }

    pub fn apply(mut self, actions: Vec<FlowAction>) -> Self {
        self.instructions.push(FlowInstruction::ApplyActions(actions));
        self
    }

    pub fn goto(mut self, table: TableId) -> Self {
        self.instructions.push(FlowInstruction::GotoTable(table));
        self
    }

    pub fn with_idle_timeout(mut self, secs: u16) -> Self {
        self.idle_timeout = secs;
        self
    }

    /// Returns the actions of every apply-actions instruction, in order.
    pub fn actions(&self) -> impl Iterator<Item = &FlowAction> {
        self.instructions.iter().flat_map(|i| match i {
            FlowInstruction::ApplyActions(actions) => actions.as_slice(),
            FlowInstruction::GotoTable(_) => &[][..],
        })
    }

    /// Returns the goto-table target, if any.
    pub fn goto_table(&self) -> Option<TableId> {
        self.instructions.iter().find_map(|i| match i {
            FlowInstruction::GotoTable(t) => Some(*t),
            FlowInstruction::ApplyActions(_) => None,
        })
    }
}

impl fmt::Display for FlowRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} prio={} match=[{}]",
            self.table, self.priority, self.flow_match
        )?;
        for instruction in &self.instructions {
            match instruction {
                FlowInstruction::ApplyActions(actions) => write!(f, " apply={:?}", actions)?,
                FlowInstruction::GotoTable(t) => write!(f, " goto={}", t)?,
            }
        }
        if self.idle_timeout != NO_TIMEOUT {
            write!(f, " idle={}s", self.idle_timeout)?;
        }
        Ok(())
    }
}

/// Rules installed once per device on `table` when it joins.
///
/// TCP and ARP traffic for each virtual IP is sent to the controller one
/// priority above the catch-all; everything else continues to `next_table`.
pub fn bootstrap_rules(table: TableId, next_table: TableId, virtual_ips: &[Ipv4Addr]) -> Vec<FlowRule> {
    let mut rules = Vec::with_capacity(virtual_ips.len() * 2 + 1);
    for vip in virtual_ips {
        rules.push(
            FlowRule::new(table, DEFAULT_PRIORITY + 1, FlowMatch::tcp_to(*vip))
                .apply(vec![FlowAction::Controller]),
        );
        rules.push(
            FlowRule::new(table, DEFAULT_PRIORITY + 1, FlowMatch::arp_for(*vip))
                .apply(vec![FlowAction::Controller]),
        );
    }
    rules.push(FlowRule::new(table, DEFAULT_PRIORITY, FlowMatch::any()).goto(next_table));
    rules
}
