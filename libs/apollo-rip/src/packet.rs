//! RIP wire format: a 2-byte command followed by up to 90 {network(4),
//! metric(2)} entries. Shared by both the standard-header-wrapped send path
//! and the legacy non-standard path, which copies this same body directly.

use apollo_common::Status;
use byteorder::{ByteOrder, NetworkEndian};

pub const MAX_ENTRIES: usize = 90;
pub const SENTINEL_FULL_TABLE: u32 = 0xFFFF_FFFF;
const ENTRY_SIZE: usize = 6;
const CMD_SIZE: usize = 2;

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum RipCommand {
    Request = 1,
    Response = 2,
    NameRegister = 3,
}

impl RipCommand {
    fn from_u16(v: u16) -> Option<Self> {
        match v {
            1 => Some(RipCommand::Request),
            2 => Some(RipCommand::Response),
            3 => Some(RipCommand::NameRegister),
            _ => None,
        }
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct RipEntry {
    pub network: u32,
    pub metric: u16,
}

#[derive(Clone, Debug)]
pub struct RipPacket {
    pub command: RipCommand,
    pub entries: Vec<RipEntry>,
}

pub fn encode(packet: &RipPacket) -> Result<Vec<u8>, Status> {
    if packet.entries.len() > MAX_ENTRIES {
        return Err(Status::NETWORK_MESSAGE_HEADER_TOO_BIG);
    }
    let mut buf = vec![0u8; CMD_SIZE + packet.entries.len() * ENTRY_SIZE];
    NetworkEndian::write_u16(&mut buf[0..2], packet.command as u16);
    for (i, entry) in packet.entries.iter().enumerate() {
        let off = CMD_SIZE + i * ENTRY_SIZE;
        NetworkEndian::write_u32(&mut buf[off..off + 4], entry.network);
        NetworkEndian::write_u16(&mut buf[off + 4..off + 6], entry.metric);
    }
    Ok(buf)
}

/// Validates `length == entries*6 + 2` as part of decoding, per the wire
/// contract; a length that doesn't divide evenly is a malformed packet.
pub fn decode(buf: &[u8]) -> Result<RipPacket, Status> {
    if buf.len() < CMD_SIZE {
        return Err(Status::NETWORK_MESSAGE_HEADER_TOO_BIG);
    }
    let body_len = buf.len() - CMD_SIZE;
    if body_len % ENTRY_SIZE != 0 {
        return Err(Status::NETWORK_MESSAGE_HEADER_TOO_BIG);
    }
    let n = body_len / ENTRY_SIZE;
    if n > MAX_ENTRIES {
        return Err(Status::NETWORK_MESSAGE_HEADER_TOO_BIG);
    }
    let command = RipCommand::from_u16(NetworkEndian::read_u16(&buf[0..2]))
        .ok_or(Status::NETWORK_MESSAGE_HEADER_TOO_BIG)?;
    let mut entries = Vec::with_capacity(n);
    for i in 0..n {
        let off = CMD_SIZE + i * ENTRY_SIZE;
        entries.push(RipEntry {
            network: NetworkEndian::read_u32(&buf[off..off + 4]),
            metric: NetworkEndian::read_u16(&buf[off + 4..off + 6]),
        });
    }
    Ok(RipPacket { command, entries })
}
