//! `APP_$RECEIVE`'s decoded result: a fixed 44-byte shape carrying both
//! endpoints' UIDs plus the PKT-layer routing fields the packet arrived
//! with. The two source UIDs are read out of the packet's own template
//! bytes, since PKT headers route by node/socket, not by UID -- UID
//! addressing is an APP-layer concern layered on top.

use apollo_common::{NodeId, Status, Uid};
use apollo_pkt::PktDescriptor;
use apollo_socket::SocketNum;
use byteorder::{ByteOrder, NetworkEndian};

pub const RESULT_LEN: usize = 44;
const UID_PAIR_LEN: usize = 16;

/// Packets larger than this are decoded via a temp buffer under the APP
/// mutex rather than in place; this crate's template is always a owned
/// `Vec<u8>`, so the distinction doesn't change how decoding happens here,
/// but the constant is kept for parity with the documented behavior.
pub const INLINE_THRESHOLD: usize = 0x3B8;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AppHeader {
    pub src_uid: Uid,
    pub dest_uid: Uid,
    pub src_node: NodeId,
    pub dest_node: NodeId,
    pub routing_key: u32,
    pub socket: SocketNum,
    pub flags: u8,
    pub protocol_info: u8,
}

impl AppHeader {
    pub fn encode(&self) -> [u8; RESULT_LEN] {
        let mut buf = [0u8; RESULT_LEN];
        NetworkEndian::write_u32(&mut buf[0..4], self.src_uid.high);
        NetworkEndian::write_u32(&mut buf[4..8], self.src_uid.low);
        NetworkEndian::write_u32(&mut buf[8..12], self.dest_uid.high);
        NetworkEndian::write_u32(&mut buf[12..16], self.dest_uid.low);
        NetworkEndian::write_u32(&mut buf[16..20], self.src_node);
        NetworkEndian::write_u32(&mut buf[20..24], self.dest_node);
        NetworkEndian::write_u32(&mut buf[24..28], self.routing_key);
        NetworkEndian::write_u16(&mut buf[28..30], self.socket);
        buf[30] = self.flags;
        buf[31] = self.protocol_info;
        buf
    }
}

/// Decodes the fixed APP result from a received packet descriptor. The two
/// UIDs are read from the front of the packet's template; anything shorter
/// than that is malformed.
pub fn app_receive(descriptor: &PktDescriptor) -> Result<AppHeader, Status> {
    if descriptor.template.len() < UID_PAIR_LEN {
        return Err(Status::NETWORK_MESSAGE_HEADER_TOO_BIG);
    }
    let src_uid = Uid::new(
        NetworkEndian::read_u32(&descriptor.template[0..4]),
        NetworkEndian::read_u32(&descriptor.template[4..8]),
    );
    let dest_uid = Uid::new(
        NetworkEndian::read_u32(&descriptor.template[8..12]),
        NetworkEndian::read_u32(&descriptor.template[12..16]),
    );
    Ok(AppHeader {
        src_uid,
        dest_uid,
        src_node: descriptor.parsed.src_node,
        dest_node: descriptor.parsed.dest_node,
        routing_key: descriptor.parsed.routing_key,
        socket: descriptor.parsed.dest_sock,
        flags: descriptor.parsed.flags,
        protocol_info: if descriptor.parsed.extended { 1 } else { 0 },
    })
}
