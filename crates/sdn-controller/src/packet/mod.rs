//! Packet-in frames: classification and ARP reply construction.

mod codec;

pub use codec::{
    build_arp_reply, encode_arp, encode_tcp_segment, parse_frame, ArpFrame, ArpOp, PacketError,
    PacketIn, ParsedPacket, TcpSegmentInfo,
};
