//! RIP: the distance-vector routing protocol run on socket
//! [`apollo_socket::SOCKET_RIP`]. Maintains parallel "standard" and
//! "non-standard" tables, ages and reclaims routes on a timer, answers
//! request/response/name-register packets, broadcasts updates, poisons on
//! last-port-closed, and bootstraps a diskless node from its mother node.
//!
//! Implements [`apollo_pkt::RouteProvider`] so the packet layer can resolve
//! a destination node into a next hop without depending back on this crate.

mod init;
mod packet;
mod server;
mod table;
mod timer;

pub use init::{bootstrap_diskless, BootstrapRoute, MOTHER_NODE_SOCKET};
pub use packet::{decode, encode, RipCommand, RipEntry, RipPacket, MAX_ENTRIES, SENTINEL_FULL_TABLE};
pub use server::{NameServiceSink, RipState, BROADCAST_NODE, DEFAULT_PORT_MTU};
pub use table::{RouteEntry, RouteState, RoutingTable, TableClass, AGE_TICKS_AGING, AGE_TICKS_VALID};
pub use timer::{run_aging_timer, DEFAULT_TICK_INTERVAL};
