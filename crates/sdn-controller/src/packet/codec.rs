//! Frame classification and construction on top of `pnet`.

use pnet::packet::arp::{ArpHardwareTypes, ArpOperations, ArpPacket, MutableArpPacket};
use pnet::packet::ethernet::{EtherTypes, EthernetPacket, MutableEthernetPacket};
use pnet::packet::ip::IpNextHeaderProtocols;
use pnet::packet::ipv4::{self, Ipv4Packet, MutableIpv4Packet};
use pnet::packet::tcp::{self, MutableTcpPacket, TcpPacket};
use pnet::packet::Packet;
use pnet::util::MacAddr;
use sdn_types::{DeviceId, MacAddress, PortNo};
use std::net::Ipv4Addr;

const ETHERNET_HEADER_LEN: usize = 14;
const ARP_PACKET_LEN: usize = 28;
const IPV4_HEADER_LEN: usize = 20;
const TCP_HEADER_LEN: usize = 20;
const DEFAULT_TTL: u8 = 64;

/// Error type for frame decoding.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PacketError {
    #[error("Truncated {layer} header ({len} bytes)")]
    Truncated { layer: &'static str, len: usize },

    #[error("Invalid IPv4 header length {0}")]
    BadIpHeaderLength(u8),
}

/// Result type for frame decoding.
pub type Result<T> = std::result::Result<T, PacketError>;

/// A frame the data plane could not match, punted to the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketIn {
    pub device: DeviceId,
    pub in_port: PortNo,
    pub data: Vec<u8>,
}

impl PacketIn {
    pub fn new(device: DeviceId, in_port: PortNo, data: Vec<u8>) -> Self {
        Self {
            device,
            in_port,
            data,
        }
    }
}

/// ARP opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArpOp {
    Request,
    Reply,
    Other(u16),
}

/// Decoded Ethernet/ARP frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArpFrame {
    pub eth_src: MacAddress,
    pub eth_dst: MacAddress,
    pub operation: ArpOp,
    pub sender_mac: MacAddress,
    pub sender_ip: Ipv4Addr,
    pub target_mac: MacAddress,
    pub target_ip: Ipv4Addr,
}

impl ArpFrame {
    /// Broadcast "who has `target_ip`" from the given sender.
    pub fn request(sender_mac: MacAddress, sender_ip: Ipv4Addr, target_ip: Ipv4Addr) -> Self {
        Self {
            eth_src: sender_mac,
            eth_dst: MacAddress::BROADCAST,
            operation: ArpOp::Request,
            sender_mac,
            sender_ip,
            target_mac: MacAddress::ZERO,
            target_ip,
        }
    }

    pub fn is_request(&self) -> bool {
        self.operation == ArpOp::Request
    }
}

/// Addressing of a decoded Ethernet/IPv4/TCP frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TcpSegmentInfo {
    pub eth_src: MacAddress,
    pub eth_dst: MacAddress,
    pub src_ip: Ipv4Addr,
    pub dst_ip: Ipv4Addr,
    pub src_port: u16,
    pub dst_port: u16,
}

/// Classification of a raw frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedPacket {
    Arp(ArpFrame),
    Tcp(TcpSegmentInfo),
    /// Anything else, including non-TCP IPv4.
    Other { ethertype: u16 },
}

fn from_pnet(mac: MacAddr) -> MacAddress {
    MacAddress::new([mac.0, mac.1, mac.2, mac.3, mac.4, mac.5])
}

fn to_pnet(mac: MacAddress) -> MacAddr {
    let b = mac.as_bytes();
    MacAddr::new(b[0], b[1], b[2], b[3], b[4], b[5])
}

/// Classifies a raw Ethernet frame.
pub fn parse_frame(data: &[u8]) -> Result<ParsedPacket> {
    let eth = EthernetPacket::new(data).ok_or(PacketError::Truncated {
        layer: "ethernet",
        len: data.len(),
    })?;

    match eth.get_ethertype() {
        EtherTypes::Arp => parse_arp(&eth).map(ParsedPacket::Arp),
        EtherTypes::Ipv4 => parse_ipv4(&eth),
        other => Ok(ParsedPacket::Other {
            ethertype: other.0,
        }),
    }
}

fn parse_arp(eth: &EthernetPacket<'_>) -> Result<ArpFrame> {
    let payload = eth.payload();
    let arp = ArpPacket::new(payload).ok_or(PacketError::Truncated {
        layer: "arp",
        len: payload.len(),
    })?;

    let operation = match arp.get_operation() {
        ArpOperations::Request => ArpOp::Request,
        ArpOperations::Reply => ArpOp::Reply,
        other => ArpOp::Other(other.0),
    };

    Ok(ArpFrame {
        eth_src: from_pnet(eth.get_source()),
        eth_dst: from_pnet(eth.get_destination()),
        operation,
        sender_mac: from_pnet(arp.get_sender_hw_addr()),
        sender_ip: arp.get_sender_proto_addr(),
        target_mac: from_pnet(arp.get_target_hw_addr()),
        target_ip: arp.get_target_proto_addr(),
    })
}

fn parse_ipv4(eth: &EthernetPacket<'_>) -> Result<ParsedPacket> {
    let payload = eth.payload();
    let ip = Ipv4Packet::new(payload).ok_or(PacketError::Truncated {
        layer: "ipv4",
        len: payload.len(),
    })?;

    if ip.get_next_level_protocol() != IpNextHeaderProtocols::Tcp {
        return Ok(ParsedPacket::Other {
            ethertype: EtherTypes::Ipv4.0,
        });
    }

    let header_len = usize::from(ip.get_header_length()) * 4;
    if header_len < IPV4_HEADER_LEN || header_len > payload.len() {
        return Err(PacketError::BadIpHeaderLength(ip.get_header_length()));
    }

    let segment = &payload[header_len..];
    let tcp = TcpPacket::new(segment).ok_or(PacketError::Truncated {
        layer: "tcp",
        len: segment.len(),
    })?;

    Ok(ParsedPacket::Tcp(TcpSegmentInfo {
        eth_src: from_pnet(eth.get_source()),
        eth_dst: from_pnet(eth.get_destination()),
        src_ip: ip.get_source(),
        dst_ip: ip.get_destination(),
        src_port: tcp.get_source(),
        dst_port: tcp.get_destination(),
    }))
}

/// Encodes an Ethernet/ARP frame.
pub fn encode_arp(frame: &ArpFrame) -> Vec<u8> {
    let mut arp_buf = [0u8; ARP_PACKET_LEN];
    if let Some(mut arp) = MutableArpPacket::new(&mut arp_buf) {
        arp.set_hardware_type(ArpHardwareTypes::Ethernet);
        arp.set_protocol_type(EtherTypes::Ipv4);
        arp.set_hw_addr_len(6);
        arp.set_proto_addr_len(4);
        arp.set_operation(match frame.operation {
            ArpOp::Request => ArpOperations::Request,
            ArpOp::Reply => ArpOperations::Reply,
            ArpOp::Other(op) => pnet::packet::arp::ArpOperation::new(op),
        });
        arp.set_sender_hw_addr(to_pnet(frame.sender_mac));
        arp.set_sender_proto_addr(frame.sender_ip);
        arp.set_target_hw_addr(to_pnet(frame.target_mac));
        arp.set_target_proto_addr(frame.target_ip);
    }

    let mut buf = vec![0u8; ETHERNET_HEADER_LEN + ARP_PACKET_LEN];
    if let Some(mut eth) = MutableEthernetPacket::new(&mut buf) {
        eth.set_destination(to_pnet(frame.eth_dst));
        eth.set_source(to_pnet(frame.eth_src));
        eth.set_ethertype(EtherTypes::Arp);
        eth.set_payload(&arp_buf);
    }
    buf
}

/// Builds the reply to `request` announcing `virtual_mac` as the owner of
/// `virtual_ip`.
pub fn build_arp_reply(request: &ArpFrame, virtual_mac: MacAddress, virtual_ip: Ipv4Addr) -> Vec<u8> {
    encode_arp(&ArpFrame {
        eth_src: virtual_mac,
        eth_dst: request.eth_src,
        operation: ArpOp::Reply,
        sender_mac: virtual_mac,
        sender_ip: virtual_ip,
        target_mac: request.sender_mac,
        target_ip: request.sender_ip,
    })
}

/// Encodes an Ethernet/IPv4/TCP frame with valid checksums.
pub fn encode_tcp_segment(info: &TcpSegmentInfo, data: &[u8]) -> Vec<u8> {
    let tcp_len = TCP_HEADER_LEN + data.len();
    let mut tcp_buf = vec![0u8; tcp_len];
    if let Some(mut segment) = MutableTcpPacket::new(&mut tcp_buf) {
        segment.set_source(info.src_port);
        segment.set_destination(info.dst_port);
        segment.set_data_offset((TCP_HEADER_LEN / 4) as u8);
        segment.set_window(u16::MAX);
        segment.set_payload(data);
        let checksum = tcp::ipv4_checksum(&segment.to_immutable(), &info.src_ip, &info.dst_ip);
        segment.set_checksum(checksum);
    }

    let ip_len = IPV4_HEADER_LEN + tcp_len;
    let mut ip_buf = vec![0u8; ip_len];
    if let Some(mut ip) = MutableIpv4Packet::new(&mut ip_buf) {
        ip.set_version(4);
        ip.set_header_length((IPV4_HEADER_LEN / 4) as u8);
        ip.set_total_length(ip_len as u16);
        ip.set_ttl(DEFAULT_TTL);
        ip.set_next_level_protocol(IpNextHeaderProtocols::Tcp);
        ip.set_source(info.src_ip);
        ip.set_destination(info.dst_ip);
        ip.set_payload(&tcp_buf);
        let checksum = ipv4::checksum(&ip.to_immutable());
        ip.set_checksum(checksum);
    }

    let mut buf = vec![0u8; ETHERNET_HEADER_LEN + ip_len];
    if let Some(mut eth) = MutableEthernetPacket::new(&mut buf) {
        eth.set_destination(to_pnet(info.eth_dst));
        eth.set_source(to_pnet(info.eth_src));
        eth.set_ethertype(EtherTypes::Ipv4);
        eth.set_payload(&ip_buf);
    }
    buf
}
