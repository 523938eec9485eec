use crate::descriptor::PktDescriptor;
use crate::header::FLAG_REPLY;
use crate::link::LinkLayer;
use crate::route::RouteProvider;
use crate::send::{send_internet, SendParams};
use apollo_common::{EventCount, NodeId, Status};
use apollo_netbuf::NetbufPool;
use apollo_socket::{SocketTable, SOCKET_PING};

/// Processes one packet off the ping socket: copies its template back into
/// a reply with the reply flag set, sends it to the originator, and
/// returns the netbuf pages the request held. Split out of the server
/// loop so it can be driven one packet at a time in tests.
pub fn handle_one_ping(
    descriptor: PktDescriptor,
    node_me: NodeId,
    netbuf: &NetbufPool,
    route: &dyn RouteProvider,
    link: &dyn LinkLayer,
    quit_ec: &EventCount,
    quit_since: u64,
) -> Result<(), Status> {
    let reply_template = descriptor.template.clone();
    let src_node = descriptor.parsed.src_node;
    let src_sock = descriptor.parsed.src_sock;
    let request_id = descriptor.parsed.request_id;
    let routing_key = descriptor.parsed.routing_key;
    descriptor.release(netbuf);

    let params = SendParams {
        routing_key,
        dest_node: src_node,
        dest_sock: src_sock,
        src_node: node_me,
        src_sock: SOCKET_PING,
        request_id,
        template: &reply_template,
        payload: &[],
        retry_cap: 1,
        loopback: false,
        extended: false,
        signature: false,
        flags: FLAG_REPLY,
    };
    send_internet(&params, netbuf, route, link, quit_ec, quit_since)
}

/// Runs the ping server: opens socket `PING`, then repeatedly dequeues and
/// answers requests until `should_stop` reports true. The socket is
/// expected to already be open on `sockets`; this only drives the loop.
pub fn run_ping_server(
    sockets: &SocketTable<PktDescriptor>,
    node_me: NodeId,
    netbuf: &NetbufPool,
    route: &dyn RouteProvider,
    link: &dyn LinkLayer,
    quit_ec: &EventCount,
    quit_since: u64,
    should_stop: impl Fn() -> bool,
) {
    while !should_stop() {
        match sockets.dequeue_blocking(SOCKET_PING, std::time::Duration::from_millis(250)) {
            None => continue,
            Some(desc) => {
                if let Err(status) = handle_one_ping(desc, node_me, netbuf, route, link, quit_ec, quit_since) {
                    log::warn!("ping server: reply send failed: {status}");
                }
            }
        }
    }
}
