//! Thin CID-wrapping client for `netd`. Mirrors [`xous-api-ticktimer`]'s
//! shape: one `connect()` at construction, one `send_message` per call.
//! The request-building and response-parsing logic itself lives in
//! [`apollo_dir`]/[`apollo_pkt`]; this crate only owns the `CID` and moves
//! bytes across it.

pub mod api;

use apollo_common::Status;
use apollo_dir::{DirRequest, DirResponse};
use num_traits::ToPrimitive;
use xous::{CID, Error};

#[derive(Debug)]
pub struct NetdClient {
    conn: CID,
}

impl NetdClient {
    pub fn new() -> Result<Self, Error> {
        REFCOUNT.fetch_add(1, Ordering::Relaxed);
        let xns = xous_names::XousNames::new()?;
        let conn = xns.request_connection_blocking(api::SERVER_NAME_NETD)?;
        Ok(NetdClient { conn })
    }

    /// `NET_IO_$PING`: blocks until the peer answers or the transport gives up.
    pub fn ping(&self, dest_node: u32, dest_sock: u16) -> Result<(), Status> {
        let response = xous::send_message(
            self.conn,
            xous::Message::new_blocking_scalar(
                api::Opcode::Ping.to_usize().unwrap(),
                dest_node as usize,
                dest_sock as usize,
                0,
                0,
            ),
        )
        .map_err(|_| Status::NETWORK_REMOTE_NODE_FAILED_TO_RESPOND)?;
        match response {
            xous::Result::Scalar1(bits) => {
                let status = Status::from_bits(bits as u32);
                if status.is_ok() { Ok(()) } else { Err(status) }
            }
            _ => Err(Status::NETWORK_REMOTE_NODE_FAILED_TO_RESPOND),
        }
    }

    /// `DIR_$DO_OP`: lends a buffer carrying the built request, then parses
    /// the server's in-place response out of the same buffer.
    pub fn dir_do_op(&self, request: &DirRequest) -> Result<DirResponse, Status> {
        let mut raw = [0u8; api::DIR_BUF_LEN];
        let len = request.build(&mut raw)?;
        let mut buf = xous_ipc::Buffer::into_buf(RawDirBuf { len: len as u32, data: raw })
            .map_err(|_| Status::NAMING_BAD_DIRECTORY)?;
        buf.lend_mut(self.conn, api::Opcode::DirDoOp.to_u32().unwrap())
            .map_err(|_| Status::NETWORK_REMOTE_NODE_FAILED_TO_RESPOND)?;
        let reply = buf.to_original::<RawDirBuf, _>().map_err(|_| Status::NAMING_BAD_DIRECTORY)?;
        DirResponse::parse(&reply.data[..reply.len as usize])
    }
}

/// The flat bytes lent across IPC for a [`NetdClient::dir_do_op`] call,
/// carrying [`apollo_dir::DirRequest`]/[`apollo_dir::DirResponse`]'s own
/// wire encoding rather than a second, IPC-specific format.
#[derive(rkyv::Archive, rkyv::Serialize, rkyv::Deserialize)]
pub struct RawDirBuf {
    pub len: u32,
    pub data: [u8; api::DIR_BUF_LEN],
}

use core::sync::atomic::{AtomicU32, Ordering};
static REFCOUNT: AtomicU32 = AtomicU32::new(0);
impl Drop for NetdClient {
    fn drop(&mut self) {
        if REFCOUNT.fetch_sub(1, Ordering::Relaxed) == 1 {
            unsafe {
                xous::disconnect(self.conn).ok();
            }
        }
    }
}
