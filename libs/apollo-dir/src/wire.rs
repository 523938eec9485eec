//! Request/response wire shapes for `DIR_$DO_OP`, at the exact documented
//! offsets. Request and response are both carried in a single mutable
//! buffer in the original; here they are read into/written from owned
//! structs at the same offsets.

use crate::opcode::Opcode;
use apollo_common::{Status, Uid};
use byteorder::{ByteOrder, NetworkEndian};

pub const REQUEST_OPCODE_OFFSET: usize = 3;
pub const REQUEST_UID_OFFSET: usize = 4;
pub const REQUEST_VERSION_OFFSET: usize = 0x12;
pub const REQUEST_PAYLOAD_OFFSET: usize = 0x8E;

pub const RESPONSE_CONTINUATION_OFFSET: usize = 1;
pub const RESPONSE_LOOP_OFFSET: usize = 3;
pub const RESPONSE_STATUS_OFFSET: usize = 4;
pub const RESPONSE_DATA_OFFSET: usize = 8;

/// Leaf names are capped at 255 bytes, link targets at 1023, and the whole
/// encoded request must not exceed 0x500 bytes.
pub const MAX_LEAF_LEN: usize = 255;
pub const MAX_LINK_LEN: usize = 1023;
pub const MAX_REQUEST_LEN: usize = 0x500;

#[derive(Clone, Debug)]
pub struct DirRequest {
    pub opcode: Opcode,
    pub uid: Uid,
    pub version: u16,
    pub payload: Vec<u8>,
}

impl DirRequest {
    pub fn new(opcode: Opcode, uid: Uid, payload: Vec<u8>) -> Self {
        DirRequest { opcode, uid, version: crate::opcode::CURRENT_VERSION, payload }
    }

    pub fn parse(buf: &[u8]) -> Result<Self, Status> {
        if buf.len() < REQUEST_PAYLOAD_OFFSET {
            return Err(Status::NAMING_BAD_DIRECTORY);
        }
        let opcode_raw = NetworkEndian::read_u16(&buf[REQUEST_OPCODE_OFFSET..REQUEST_OPCODE_OFFSET + 2]);
        let opcode = Opcode::from_u16(opcode_raw).ok_or(Status::NAMING_BAD_DIRECTORY)?;
        let uid = Uid::new(
            NetworkEndian::read_u32(&buf[REQUEST_UID_OFFSET..REQUEST_UID_OFFSET + 4]),
            NetworkEndian::read_u32(&buf[REQUEST_UID_OFFSET + 4..REQUEST_UID_OFFSET + 8]),
        );
        let version = NetworkEndian::read_u16(&buf[REQUEST_VERSION_OFFSET..REQUEST_VERSION_OFFSET + 2]);
        let payload = buf[REQUEST_PAYLOAD_OFFSET..].to_vec();
        Ok(DirRequest { opcode, uid, version, payload })
    }

    pub fn build(&self, buf: &mut [u8]) -> Result<usize, Status> {
        let total = REQUEST_PAYLOAD_OFFSET + self.payload.len();
        if total > MAX_REQUEST_LEN || buf.len() < total {
            return Err(Status::NAMING_BAD_DIRECTORY);
        }
        NetworkEndian::write_u16(&mut buf[REQUEST_OPCODE_OFFSET..], self.opcode as u16);
        NetworkEndian::write_u32(&mut buf[REQUEST_UID_OFFSET..], self.uid.high);
        NetworkEndian::write_u32(&mut buf[REQUEST_UID_OFFSET + 4..], self.uid.low);
        NetworkEndian::write_u16(&mut buf[REQUEST_VERSION_OFFSET..], self.version);
        buf[REQUEST_PAYLOAD_OFFSET..total].copy_from_slice(&self.payload);
        Ok(total)
    }

    /// A copy stamped with `version`, made just before a remote hop.
    pub fn stamped(&self, version: u16) -> Self {
        DirRequest { version, ..self.clone() }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DirResponse {
    pub status: Status,
    pub continuation: bool,
    pub loop_flag: bool,
    pub data: Vec<u8>,
}

impl DirResponse {
    pub fn ok(data: Vec<u8>) -> Self {
        DirResponse { status: Status::OK, continuation: false, loop_flag: false, data }
    }

    pub fn failed(status: Status) -> Self {
        DirResponse { status, continuation: false, loop_flag: false, data: Vec::new() }
    }

    pub fn parse(buf: &[u8]) -> Result<Self, Status> {
        if buf.len() < RESPONSE_DATA_OFFSET {
            return Err(Status::NAMING_BAD_DIRECTORY);
        }
        Ok(DirResponse {
            status: Status::from_bits(NetworkEndian::read_u32(&buf[RESPONSE_STATUS_OFFSET..RESPONSE_STATUS_OFFSET + 4])),
            continuation: buf[RESPONSE_CONTINUATION_OFFSET] != 0,
            loop_flag: buf[RESPONSE_LOOP_OFFSET] != 0,
            data: buf[RESPONSE_DATA_OFFSET..].to_vec(),
        })
    }

    pub fn build(&self, buf: &mut [u8]) -> Result<usize, Status> {
        let total = RESPONSE_DATA_OFFSET + self.data.len();
        if buf.len() < total {
            return Err(Status::NAMING_BAD_DIRECTORY);
        }
        buf[0] = 0;
        buf[RESPONSE_CONTINUATION_OFFSET] = self.continuation as u8;
        buf[2] = 0;
        buf[RESPONSE_LOOP_OFFSET] = self.loop_flag as u8;
        NetworkEndian::write_u32(&mut buf[RESPONSE_STATUS_OFFSET..], self.status.bits());
        buf[RESPONSE_DATA_OFFSET..total].copy_from_slice(&self.data);
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_build_then_parse_roundtrips() {
        let req = DirRequest::new(Opcode::Resolve, Uid::new(1, 2), vec![9, 9, 9]);
        let mut buf = vec![0u8; REQUEST_PAYLOAD_OFFSET + 3];
        let len = req.build(&mut buf).unwrap();
        assert_eq!(len, buf.len());
        let parsed = DirRequest::parse(&buf).unwrap();
        assert_eq!(parsed.opcode, Opcode::Resolve);
        assert_eq!(parsed.uid, Uid::new(1, 2));
        assert_eq!(parsed.payload, vec![9, 9, 9]);
    }

    #[test]
    fn response_build_then_parse_roundtrips() {
        let resp = DirResponse { status: Status::DIR_STALE_ENTRY, continuation: true, loop_flag: false, data: vec![1, 2] };
        let mut buf = vec![0u8; RESPONSE_DATA_OFFSET + 2];
        resp.build(&mut buf).unwrap();
        let parsed = DirResponse::parse(&buf).unwrap();
        assert_eq!(parsed, resp);
    }

    #[test]
    fn unrecognized_opcode_is_rejected_on_parse() {
        let mut buf = vec![0u8; REQUEST_PAYLOAD_OFFSET];
        NetworkEndian::write_u16(&mut buf[REQUEST_OPCODE_OFFSET..], 0x5E);
        assert_eq!(DirRequest::parse(&buf).unwrap_err(), Status::NAMING_BAD_DIRECTORY);
    }

    #[test]
    fn oversized_request_is_rejected_on_build() {
        let req = DirRequest::new(Opcode::Add, Uid::NIL, vec![0u8; MAX_REQUEST_LEN]);
        let mut buf = vec![0u8; MAX_REQUEST_LEN + REQUEST_PAYLOAD_OFFSET];
        assert!(req.build(&mut buf).is_err());
    }
}
