pub const SERVER_NAME_NETD: &str = "_Apollo Domain network stack_";

/// Largest buffer lent across IPC for a `DirDoOp` call; sized to
/// `apollo_dir::MAX_REQUEST_LEN` so a request never needs more than one
/// lend.
pub const DIR_BUF_LEN: usize = apollo_dir::MAX_REQUEST_LEN;

#[repr(usize)]
#[derive(num_derive::FromPrimitive, num_derive::ToPrimitive, Debug)]
pub enum Opcode {
    /// `NET_IO_$PING`: blocking scalar, args (dest_node, dest_sock).
    /// Returns `Scalar1(status_bits)`.
    Ping = 0,
    /// `DIR_$DO_OP`: a lent buffer holding a built [`apollo_dir::DirRequest`],
    /// overwritten in place with the built [`apollo_dir::DirResponse`].
    DirDoOp = 1,
    /// Suspend/resume callback registration, mirroring every other netd-hosted server.
    SuspendResume = 2,
    InvalidCall = usize::MAX,
}
