//! PKT: internet packet header build/parse, packet-id allocation,
//! send-and-retry, node-visibility tracking, and the ping server that
//! answers `NET_IO_$PING` probes on socket [`apollo_socket::SOCKET_PING`].
//!
//! Routing decisions are taken through the [`route::RouteProvider`] trait
//! rather than a direct dependency on the RIP routing table, so this crate
//! has no circular dependency on the subsystem that implements it.

mod descriptor;
mod header;
mod id;
mod link;
mod ping;
mod route;
mod send;
mod visibility;

pub use descriptor::PktDescriptor;
pub use header::{
    bld_internet_hdr, brk_internet_hdr, BuildParams, HeaderShape, ParsedHeader, FLAG_RAW,
    FLAG_REPLY, HDR_MAX_SIZE,
};
pub use id::{IdGenerator, MAX_SHORT_ID};
pub use link::{LinkLayer, LoopbackLink};
pub use ping::{handle_one_ping, run_ping_server};
pub use route::{validate_payload_size, NextHop, Port, RouteClass, RouteProvider};
pub use send::{sar_internet, send_internet, SarParams, SarResponse, SendParams, DEFAULT_RETRY_CAP};
pub use visibility::{MissingNodeTable, MAX_MISSING_NODES};
