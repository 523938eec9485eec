use crate::route::Port;
use apollo_common::Status;

/// Abstracts `NET_IO_$SEND`: handing a built header and its payload bytes
/// to whatever carries packets between nodes. A loopback/test double and a
/// real transport both implement this the same way PKT expects.
pub trait LinkLayer: Send + Sync {
    fn send(&self, port: Port, header: &[u8], payload: &[u8]) -> Result<(), Status>;

    /// The raw/IDP send path: hands `body` straight to the wire with no
    /// internet header built around it. `RIP_$HALT_ROUTER`'s non-standard
    /// class poison goes out this way instead of through [`Self::send`].
    fn send_raw(&self, port: Port, body: &[u8]) -> Result<(), Status>;
}

/// A link layer that only ever talks to itself, used by hosted tests and by
/// the ping server's own loopback probe.
pub struct LoopbackLink;

impl LinkLayer for LoopbackLink {
    fn send(&self, _port: Port, _header: &[u8], _payload: &[u8]) -> Result<(), Status> {
        Ok(())
    }

    fn send_raw(&self, _port: Port, _body: &[u8]) -> Result<(), Status> {
        Ok(())
    }
}
