//! Internet header builder/parser. Field offsets follow the documented wire
//! layout; byte-for-byte compatibility with the original m68k header is not
//! a goal, only the documented offsets and the round-trip contract are.

use apollo_common::{node_wire_bits, NodeId, Status};
use byteorder::{ByteOrder, NetworkEndian};

pub const HDR_MAX_SIZE: usize = 952;

const OFF_FLAGS: usize = 0x00;
const OFF_HDR_SIZE: usize = 0x04;
const OFF_SRC_NODE: usize = 0x08;
const OFF_DATA_LEN: usize = 0x14;
const OFF_REQUEST_ID: usize = 0x16;
const OFF_HDR_SIZE_INDICATOR: usize = 0x18;
const OFF_PROTOCOL_SUBTYPE: usize = 0x2D;
const OFF_ROUTING_KEY: usize = 0x2E;
const OFF_DEST_NODE: usize = 0x34;
const OFF_DEST_SOCK: usize = 0x38;
const OFF_SRC_NODE_ECHO: usize = 0x40;
const OFF_SRC_SOCK: usize = 0x44;
const OFF_EXT: usize = 0x46;
const OFF_EXT_SUBTYPE_BYTE: usize = 0x4B;
const EXT_LEN: usize = 6;
const SIGNATURE_LEN: usize = 16;

const TYPE1_SIZE: usize = 4 + 0x1E;
const TYPE1_OFF_DEST_NODE: usize = 0x0C;
const TYPE1_OFF_DEST_SOCK: usize = 0x10;
const TYPE1_OFF_SRC_SOCK: usize = 0x12;

const HDR_SIZE_INDICATOR_SIMPLE: u8 = 0x04;
const HDR_SIZE_INDICATOR_STD: u8 = 0x28;
const HDR_SIZE_INDICATOR_EXTENDED: u8 = 0x2E;

const PROTOCOL_STANDARD: u8 = 1;
const PROTOCOL_EXTENDED: u8 = 4;
const SIGNATURE_SUBTYPE: u8 = 0x29;

pub const FLAG_REPLY: u8 = 0x01;
pub const FLAG_RAW: u8 = 0x02;

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum HeaderShape {
    Type1Loopback,
    Type2Internet,
}

/// The parameters needed to build either header shape. `request_id` and
/// `template` are supplied by the caller; the routing-dependent fields are
/// only meaningful for [`HeaderShape::Type2Internet`].
#[derive(Clone, Debug)]
pub struct BuildParams {
    pub shape: HeaderShape,
    pub flags: u8,
    pub routing_key: u32,
    pub dest_node: NodeId,
    pub dest_sock: u16,
    pub src_node: NodeId,
    pub src_sock: u16,
    pub request_id: u16,
    pub data_len: u16,
    pub extended: bool,
    pub signature: bool,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ParsedHeader {
    pub shape: HeaderShape,
    pub flags: u8,
    pub header_size: u16,
    pub src_node: NodeId,
    pub dest_node: NodeId,
    pub dest_sock: u16,
    pub src_sock: u16,
    pub routing_key: u32,
    pub request_id: u16,
    pub data_len: u16,
    pub extended: bool,
    pub signature: bool,
    pub template_offset: usize,
}

fn base_len(shape: HeaderShape, extended: bool, signature: bool) -> usize {
    match shape {
        HeaderShape::Type1Loopback => TYPE1_SIZE,
        HeaderShape::Type2Internet => {
            let mut len = OFF_EXT;
            if extended {
                len += EXT_LEN;
                if signature {
                    len += SIGNATURE_LEN;
                }
            }
            len
        }
    }
}

/// Builds a header plus trailing template bytes into `buf`. Returns the
/// offset the template was written at (== header size) on success.
///
/// Mirrors `PKT_$BLD_INTERNET_HDR`: type-1 is a fixed-size loopback shape
/// with no routing lookup; type-2 carries the full routing portion plus an
/// optional extension and signature.
pub fn bld_internet_hdr(
    params: &BuildParams,
    template: &[u8],
    buf: &mut [u8],
) -> Result<usize, Status> {
    let hdr_len = base_len(params.shape, params.extended, params.signature);
    if hdr_len + template.len() > HDR_MAX_SIZE {
        return Err(Status::NETWORK_MESSAGE_HEADER_TOO_BIG);
    }
    if buf.len() < hdr_len + template.len() {
        return Err(Status::NETWORK_MESSAGE_HEADER_TOO_BIG);
    }

    buf[OFF_FLAGS] = params.flags;
    buf[OFF_FLAGS + 1..OFF_FLAGS + 4].fill(0);
    NetworkEndian::write_u32(&mut buf[OFF_HDR_SIZE..], hdr_len as u32);
    NetworkEndian::write_u32(&mut buf[OFF_SRC_NODE..], node_wire_bits(params.src_node));
    NetworkEndian::write_u16(&mut buf[OFF_DATA_LEN..], params.data_len);
    NetworkEndian::write_u16(&mut buf[OFF_REQUEST_ID..], params.request_id);

    match params.shape {
        HeaderShape::Type1Loopback => {
            buf[OFF_HDR_SIZE_INDICATOR] = HDR_SIZE_INDICATOR_SIMPLE;
            NetworkEndian::write_u32(
                &mut buf[TYPE1_OFF_DEST_NODE..],
                node_wire_bits(params.dest_node),
            );
            NetworkEndian::write_u16(&mut buf[TYPE1_OFF_DEST_SOCK..], params.dest_sock);
            NetworkEndian::write_u16(&mut buf[TYPE1_OFF_SRC_SOCK..], params.src_sock);
        }
        HeaderShape::Type2Internet => {
            buf[OFF_HDR_SIZE_INDICATOR] = if params.extended {
                HDR_SIZE_INDICATOR_EXTENDED
            } else {
                HDR_SIZE_INDICATOR_STD
            };
            buf[OFF_PROTOCOL_SUBTYPE] = if params.extended {
                PROTOCOL_EXTENDED
            } else {
                PROTOCOL_STANDARD
            };
            NetworkEndian::write_u32(&mut buf[OFF_ROUTING_KEY..], params.routing_key);
            NetworkEndian::write_u32(
                &mut buf[OFF_DEST_NODE..],
                node_wire_bits(params.dest_node),
            );
            NetworkEndian::write_u16(&mut buf[OFF_DEST_SOCK..], params.dest_sock);
            NetworkEndian::write_u32(
                &mut buf[OFF_SRC_NODE_ECHO..],
                node_wire_bits(params.src_node),
            );
            NetworkEndian::write_u16(&mut buf[OFF_SRC_SOCK..], params.src_sock);
            if params.extended {
                buf[OFF_EXT..OFF_EXT + EXT_LEN].fill(0);
                buf[OFF_EXT_SUBTYPE_BYTE] = if params.signature { SIGNATURE_SUBTYPE } else { 0 };
            }
        }
    }

    buf[hdr_len..hdr_len + template.len()].copy_from_slice(template);
    Ok(hdr_len)
}

/// Inverse of [`bld_internet_hdr`]. Reads the header-size indicator to pick
/// the parser variant, then the rest of the fixed fields; `template_out` is
/// filled with up to its own length of template bytes.
pub fn brk_internet_hdr(buf: &[u8], template_out: &mut [u8]) -> Result<(ParsedHeader, usize), Status> {
    if buf.len() < TYPE1_SIZE.min(OFF_HDR_SIZE_INDICATOR + 1) {
        return Err(Status::NETWORK_MESSAGE_HEADER_TOO_BIG);
    }
    let indicator = buf[OFF_HDR_SIZE_INDICATOR];
    let flags = buf[OFF_FLAGS];
    let header_size = NetworkEndian::read_u32(&buf[OFF_HDR_SIZE..]) as u16;
    let data_len = NetworkEndian::read_u16(&buf[OFF_DATA_LEN..]);
    let request_id = NetworkEndian::read_u16(&buf[OFF_REQUEST_ID..]);

    let parsed = if indicator == HDR_SIZE_INDICATOR_SIMPLE {
        let src_node = NetworkEndian::read_u32(&buf[OFF_SRC_NODE..]);
        let dest_node = NetworkEndian::read_u32(&buf[TYPE1_OFF_DEST_NODE..]);
        let dest_sock = NetworkEndian::read_u16(&buf[TYPE1_OFF_DEST_SOCK..]);
        let src_sock = NetworkEndian::read_u16(&buf[TYPE1_OFF_SRC_SOCK..]);
        ParsedHeader {
            shape: HeaderShape::Type1Loopback,
            flags,
            header_size,
            src_node: node_wire_bits(src_node),
            dest_node: node_wire_bits(dest_node),
            dest_sock,
            src_sock,
            routing_key: 0,
            request_id,
            data_len,
            extended: false,
            signature: false,
            template_offset: TYPE1_SIZE,
        }
    } else {
        let extended = indicator == HDR_SIZE_INDICATOR_EXTENDED;
        let signature = extended && buf.len() > OFF_EXT_SUBTYPE_BYTE
            && buf[OFF_EXT_SUBTYPE_BYTE] == SIGNATURE_SUBTYPE;
        let src_node = NetworkEndian::read_u32(&buf[OFF_SRC_NODE..]);
        let dest_node = NetworkEndian::read_u32(&buf[OFF_DEST_NODE..]);
        let dest_sock = NetworkEndian::read_u16(&buf[OFF_DEST_SOCK..]);
        let routing_key = NetworkEndian::read_u32(&buf[OFF_ROUTING_KEY..]);
        let src_sock = NetworkEndian::read_u16(&buf[OFF_SRC_SOCK..]);
        ParsedHeader {
            shape: HeaderShape::Type2Internet,
            flags,
            header_size,
            src_node: node_wire_bits(src_node),
            dest_node: node_wire_bits(dest_node),
            dest_sock,
            src_sock,
            routing_key,
            request_id,
            data_len,
            extended,
            signature,
            template_offset: base_len(HeaderShape::Type2Internet, extended, signature),
        }
    };

    let available = buf.len().saturating_sub(parsed.template_offset);
    let take = available.min(template_out.len());
    template_out[..take].copy_from_slice(&buf[parsed.template_offset..parsed.template_offset + take]);

    Ok((parsed, take))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(shape: HeaderShape) -> BuildParams {
        BuildParams {
            shape,
            flags: 0,
            routing_key: 0xCAFEBABE,
            dest_node: 0x00_ABCDEF,
            dest_sock: 42,
            src_node: 0x00_112233,
            src_sock: 7,
            request_id: 99,
            data_len: 0,
            extended: false,
            signature: false,
        }
    }

    #[test]
    fn type2_build_then_parse_roundtrips() {
        let p = params(HeaderShape::Type2Internet);
        let template = b"hello apollo";
        let mut buf = [0u8; HDR_MAX_SIZE];
        let hdr_len = bld_internet_hdr(&p, template, &mut buf).unwrap();
        assert_eq!(hdr_len, base_len(HeaderShape::Type2Internet, false, false));

        let mut out = [0u8; 64];
        let (parsed, tpl_len) = brk_internet_hdr(&buf, &mut out).unwrap();
        assert_eq!(parsed.shape, HeaderShape::Type2Internet);
        assert_eq!(parsed.routing_key, p.routing_key);
        assert_eq!(parsed.dest_node, p.dest_node);
        assert_eq!(parsed.dest_sock, p.dest_sock);
        assert_eq!(parsed.src_sock, p.src_sock);
        assert_eq!(parsed.request_id, p.request_id);
        assert_eq!(&out[..tpl_len], &template[..]);
    }

    #[test]
    fn type1_omits_routing_key_and_still_roundtrips() {
        let p = params(HeaderShape::Type1Loopback);
        let mut buf = [0u8; HDR_MAX_SIZE];
        bld_internet_hdr(&p, b"", &mut buf).unwrap();
        let mut out = [0u8; 4];
        let (parsed, tpl_len) = brk_internet_hdr(&buf, &mut out).unwrap();
        assert_eq!(parsed.shape, HeaderShape::Type1Loopback);
        assert_eq!(parsed.routing_key, 0);
        assert_eq!(parsed.dest_node, p.dest_node);
        assert_eq!(tpl_len, 0);
    }

    #[test]
    fn extended_header_with_signature_reserves_extra_space() {
        let mut p = params(HeaderShape::Type2Internet);
        p.extended = true;
        p.signature = true;
        let mut buf = [0u8; HDR_MAX_SIZE];
        let hdr_len = bld_internet_hdr(&p, b"tpl", &mut buf).unwrap();
        assert_eq!(hdr_len, OFF_EXT + EXT_LEN + SIGNATURE_LEN);

        let mut out = [0u8; 8];
        let (parsed, tpl_len) = brk_internet_hdr(&buf, &mut out).unwrap();
        assert!(parsed.extended);
        assert!(parsed.signature);
        assert_eq!(&out[..tpl_len], b"tpl");
    }

    #[test]
    fn oversized_header_is_rejected() {
        let p = params(HeaderShape::Type2Internet);
        let template = vec![0u8; HDR_MAX_SIZE];
        let mut buf = vec![0u8; HDR_MAX_SIZE + 16];
        let err = bld_internet_hdr(&p, &template, &mut buf).unwrap_err();
        assert_eq!(err, Status::NETWORK_MESSAGE_HEADER_TOO_BIG);
    }

    #[test]
    fn node_ids_are_masked_to_24_bits_on_write() {
        let mut p = params(HeaderShape::Type2Internet);
        p.dest_node = 0xFF_ABCDEF;
        let mut buf = [0u8; HDR_MAX_SIZE];
        bld_internet_hdr(&p, b"", &mut buf).unwrap();
        let mut out = [0u8; 1];
        let (parsed, _) = brk_internet_hdr(&buf, &mut out).unwrap();
        assert_eq!(parsed.dest_node, 0x00_ABCDEF);
    }
}
