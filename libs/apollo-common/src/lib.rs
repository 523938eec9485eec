//! Shared primitives used across the PKT, RIP, DIR, and APP subsystems:
//! UIDs, packed status codes, node identity, event counts, and the
//! numbered-lock ordering discipline described for the kernel fragment.

mod eventcount;
mod lock;
mod node;
mod status;
mod uid;

pub use eventcount::{EcWaitResult, EventCount};
pub use lock::{LockGuard, LockId, SpinLock};
pub use node::{node_wire_bits, NodeId, NODE_WIRE_MASK};
pub use status::Status;
pub use uid::Uid;
