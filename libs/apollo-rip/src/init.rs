//! Diskless bootstrap: before `RipState` has any routes, a diskless node
//! asks its mother node for one, then primes both tables from the reply.

use crate::table::RoutingTable;
use apollo_common::{EventCount, NodeId, Status};
use apollo_netbuf::NetbufPool;
use apollo_pkt::{sar_internet, IdGenerator, LinkLayer, MissingNodeTable, PktDescriptor, Port, RouteProvider, SarParams};
use apollo_socket::{AddressSpaceId, SocketTable};
use std::time::Duration;

/// The mother node listens for bootstrap requests on this socket.
pub const MOTHER_NODE_SOCKET: u16 = 1;
const BOOTSTRAP_REQUEST: &[u8] = b"RIP-BOOTSTRAP";
const BOOTSTRAP_TIMEOUT: Duration = Duration::from_secs(2);
const BOOTSTRAP_RETRY_CAP: u16 = 3;

pub struct BootstrapRoute {
    pub port: Port,
    pub next_hop: NodeId,
    pub metric: u8,
}

/// Sends a bootstrap request to `mother_node` on [`MOTHER_NODE_SOCKET`] and,
/// on reply, installs the returned route into both tables at metric 1 (a
/// direct route to the mother node) so ordinary RIP updates can take over
/// from there.
#[allow(clippy::too_many_arguments)]
pub fn bootstrap_diskless(
    mother_node: NodeId,
    node_me: NodeId,
    address_space: AddressSpaceId,
    netbuf: &NetbufPool,
    sockets: &SocketTable<PktDescriptor>,
    ids: &IdGenerator,
    missing: &MissingNodeTable,
    route: &dyn RouteProvider,
    link: &dyn LinkLayer,
    quit_ec: &EventCount,
    standard: &RoutingTable,
    non_standard: &RoutingTable,
) -> Result<BootstrapRoute, Status> {
    let params = SarParams {
        routing_key: 0,
        dest_node: mother_node,
        dest_sock: MOTHER_NODE_SOCKET,
        timeout: BOOTSTRAP_TIMEOUT,
        retry_cap: BOOTSTRAP_RETRY_CAP,
        req_template: BOOTSTRAP_REQUEST,
        req_payload: &[],
        loopback: false,
    };
    let response = sar_internet(
        &params, node_me, address_space, netbuf, sockets, ids, missing, route, link, quit_ec,
        quit_ec.read(),
    )?;

    // The reply's template carries the assigned port as its first byte;
    // everything past it is reserved for future use.
    let port = *response.template.first().ok_or(Status::NETWORK_MESSAGE_HEADER_TOO_BIG)?;
    let metric = 1u8;
    standard.update_int(0, mother_node, metric, port);
    non_standard.update_int(0, mother_node, metric, port);

    Ok(BootstrapRoute { port, next_hop: mother_node, metric })
}

#[cfg(test)]
mod tests {
    use super::*;
    use apollo_pkt::{NextHop, RouteClass};
    use apollo_socket::{SocketTable as Table, SOCKET_MIN};

    struct AlwaysLocal;
    impl RouteProvider for AlwaysLocal {
        fn find_nexthop(&self, _routing_key: u32, _node: NodeId) -> Option<NextHop> {
            Some(NextHop { port: 0, next_node: 0, class: RouteClass::Local })
        }
    }

    struct RepliesOnce;
    impl LinkLayer for RepliesOnce {
        fn send(&self, _port: Port, _header: &[u8], _payload: &[u8]) -> Result<(), Status> {
            Ok(())
        }
        fn send_raw(&self, _port: Port, _body: &[u8]) -> Result<(), Status> {
            Ok(())
        }
    }

    #[test]
    fn missing_reply_byte_is_rejected_cleanly() {
        // Exercises the error path without a real mother node reachable:
        // sar_internet will time out, which bootstrap_diskless must surface
        // as an error rather than panicking on an empty template.
        let netbuf = NetbufPool::new(4, 4);
        let sockets: Table<PktDescriptor> = Table::new(4);
        let ids = IdGenerator::new();
        let missing = MissingNodeTable::new();
        let route = AlwaysLocal;
        let link = RepliesOnce;
        let quit = EventCount::new();
        let standard = RoutingTable::new(crate::table::TableClass::Standard);
        let non_standard = RoutingTable::new(crate::table::TableClass::NonStandard);

        let result = bootstrap_diskless(
            99, 1, SOCKET_MIN, &netbuf, &sockets, &ids, &missing, &route, &link, &quit, &standard,
            &non_standard,
        );
        assert!(result.is_err());
    }
}
