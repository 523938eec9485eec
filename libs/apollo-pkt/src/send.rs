use crate::header::{bld_internet_hdr, BuildParams, HeaderShape};
use crate::id::IdGenerator;
use crate::link::LinkLayer;
use crate::route::{validate_payload_size, Port, RouteProvider};
use crate::visibility::MissingNodeTable;
use apollo_common::{EcWaitResult, EventCount, NodeId, Status};
use apollo_netbuf::NetbufPool;
use apollo_socket::{SocketNum, SocketTable};
use std::time::Duration;

use crate::descriptor::PktDescriptor;

pub const DEFAULT_RETRY_CAP: u16 = 8;
pub const RETRY_WAIT: Duration = Duration::from_millis(25);

/// Inputs to `send_internet` that don't change across a retry loop.
pub struct SendParams<'a> {
    pub routing_key: u32,
    pub dest_node: NodeId,
    pub dest_sock: u16,
    pub src_node: NodeId,
    pub src_sock: u16,
    pub request_id: u16,
    pub template: &'a [u8],
    pub payload: &'a [u8],
    /// 0 means "derive from the first attempt", matching the original's
    /// deferred retry-cap policy; here that derivation is a fixed default
    /// rather than a value read back from the first header build.
    pub retry_cap: u16,
    pub loopback: bool,
    pub extended: bool,
    pub signature: bool,
    pub flags: u8,
}

/// Builds, sends, and retries a single internet packet. On repeated
/// failure waits 25ms on the caller's quit event count between attempts;
/// if that count advances past `quit_since` the send aborts immediately
/// with [`Status::FIM_QUIT`].
pub fn send_internet(
    params: &SendParams,
    netbuf: &NetbufPool,
    route: &dyn RouteProvider,
    link: &dyn LinkLayer,
    quit_ec: &EventCount,
    quit_since: u64,
) -> Result<(), Status> {
    let max_retries = if params.retry_cap == 0 {
        DEFAULT_RETRY_CAP
    } else {
        params.retry_cap
    };
    let shape = if params.loopback {
        HeaderShape::Type1Loopback
    } else {
        HeaderShape::Type2Internet
    };

    let mut attempt: u16 = 0;
    loop {
        attempt += 1;

        let (hdr_addr, mut hdr_page) = match netbuf.get_hdr() {
            Some(p) => p,
            None => return Err(Status::NETWORK_NO_SOCKET_AVAILABLE),
        };

        let mut port: Port = 0;
        let routed = if shape == HeaderShape::Type2Internet {
            match route.find_nexthop(params.routing_key, params.dest_node) {
                Some(hop) => {
                    port = hop.port;
                    validate_payload_size(hop.class, params.template.len(), params.payload.len())
                }
                None => Err(Status::NETWORK_REMOTE_NODE_FAILED_TO_RESPOND),
            }
        } else {
            Ok(())
        };

        let build_result = routed.and_then(|_| {
            let bp = BuildParams {
                shape,
                flags: params.flags,
                routing_key: params.routing_key,
                dest_node: params.dest_node,
                dest_sock: params.dest_sock,
                src_node: params.src_node,
                src_sock: params.src_sock,
                request_id: params.request_id,
                data_len: params.payload.len() as u16,
                extended: params.extended,
                signature: params.signature,
            };
            bld_internet_hdr(&bp, params.template, &mut hdr_page)
        });

        let hdr_len = match build_result {
            Ok(len) => len,
            Err(status) => {
                netbuf.rtn_hdr(hdr_addr);
                return Err(status);
            }
        };

        let sent = link.send(port, &hdr_page[..hdr_len + params.template.len()], params.payload);
        netbuf.rtn_hdr(hdr_addr);

        match sent {
            Ok(()) => return Ok(()),
            Err(status) => {
                if attempt >= max_retries {
                    return Err(status);
                }
                if quit_ec.wait_until_advanced(quit_since, RETRY_WAIT) == EcWaitResult::Advanced {
                    return Err(Status::FIM_QUIT.as_remote());
                }
            }
        }
    }
}

pub struct SarParams<'a> {
    pub routing_key: u32,
    pub dest_node: NodeId,
    pub dest_sock: u16,
    pub timeout: Duration,
    pub retry_cap: u16,
    pub req_template: &'a [u8],
    pub req_payload: &'a [u8],
    pub loopback: bool,
}

pub struct SarResponse {
    pub template: Vec<u8>,
    pub payload: Vec<u8>,
}

/// Send-and-receive with retry and node-visibility tracking. Allocates a
/// fresh reply socket, sends, and waits for a matching reply id up to the
/// retry cap; after two timeouts it consults `likely_to_answer` before
/// giving up. The socket is closed on every exit path.
#[allow(clippy::too_many_arguments)]
pub fn sar_internet(
    params: &SarParams,
    node_me: NodeId,
    address_space: apollo_socket::AddressSpaceId,
    netbuf: &NetbufPool,
    sockets: &SocketTable<PktDescriptor>,
    ids: &IdGenerator,
    missing: &MissingNodeTable,
    route: &dyn RouteProvider,
    link: &dyn LinkLayer,
    quit_ec: &EventCount,
    quit_since: u64,
) -> Result<SarResponse, Status> {
    let sock_num = sockets
        .allocate(apollo_socket::SOCKET_MIN, address_space)
        .ok_or_else(|| {
            log::error!("sar_internet: no socket available for reply allocation");
            Status::NETWORK_NO_SOCKET_AVAILABLE
        })?;

    let result = sar_internet_on_socket(
        params, node_me, sock_num, netbuf, sockets, ids, missing, route, link, quit_ec, quit_since,
    );
    sockets.close(sock_num);
    result
}

#[allow(clippy::too_many_arguments)]
fn sar_internet_on_socket(
    params: &SarParams,
    node_me: NodeId,
    sock_num: SocketNum,
    netbuf: &NetbufPool,
    sockets: &SocketTable<PktDescriptor>,
    ids: &IdGenerator,
    missing: &MissingNodeTable,
    route: &dyn RouteProvider,
    link: &dyn LinkLayer,
    quit_ec: &EventCount,
    quit_since: u64,
) -> Result<SarResponse, Status> {
    let request_id = ids.next_id();
    let max_retries = if params.retry_cap == 0 {
        DEFAULT_RETRY_CAP
    } else {
        params.retry_cap
    };

    let mut retry_num: u16 = 1;
    loop {
        let send_params = SendParams {
            routing_key: params.routing_key,
            dest_node: params.dest_node,
            dest_sock: params.dest_sock,
            src_node: node_me,
            src_sock: sock_num,
            request_id,
            template: params.req_template,
            payload: params.req_payload,
            retry_cap: 1,
            loopback: params.loopback,
            extended: false,
            signature: false,
            flags: 0,
        };
        send_internet(&send_params, netbuf, route, link, quit_ec, quit_since)?;

        match wait_for_reply(sockets, sock_num, request_id, params.timeout, netbuf, quit_ec, quit_since) {
            WaitOutcome::Matched(response) => {
                missing.note_visible(params.dest_node, true);
                return Ok(response);
            }
            WaitOutcome::Quit => return Err(Status::FIM_QUIT.as_remote()),
            WaitOutcome::Timeout => {}
        }

        if retry_num == max_retries {
            if retry_num > 2 {
                missing.note_visible(params.dest_node, false);
            }
            return Err(Status::NETWORK_REMOTE_NODE_FAILED_TO_RESPOND);
        }

        if retry_num == 2 && missing.recently_missing(params.dest_node) {
            return Err(Status::NETWORK_REMOTE_NODE_FAILED_TO_RESPOND);
        }

        retry_num += 1;
    }
}

enum WaitOutcome {
    Matched(SarResponse),
    Timeout,
    Quit,
}

fn wait_for_reply(
    sockets: &SocketTable<PktDescriptor>,
    sock_num: SocketNum,
    request_id: u16,
    timeout: Duration,
    netbuf: &NetbufPool,
    quit_ec: &EventCount,
    quit_since: u64,
) -> WaitOutcome {
    let deadline = std::time::Instant::now() + timeout;
    loop {
        if quit_ec.read() != quit_since {
            return WaitOutcome::Quit;
        }
        let remaining = match deadline.checked_duration_since(std::time::Instant::now()) {
            Some(d) if !d.is_zero() => d,
            _ => return WaitOutcome::Timeout,
        };
        match sockets.dequeue_blocking(sock_num, remaining) {
            None => return WaitOutcome::Timeout,
            Some(desc) => {
                if desc.parsed.request_id != request_id {
                    desc.release(netbuf);
                    continue;
                }
                let response = SarResponse {
                    template: desc.template.clone(),
                    payload: vec![0u8; desc.payload_len],
                };
                desc.release(netbuf);
                return WaitOutcome::Matched(response);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::route::{NextHop, RouteClass};

    struct AlwaysLocal;
    impl RouteProvider for AlwaysLocal {
        fn find_nexthop(&self, _routing_key: u32, _node: NodeId) -> Option<NextHop> {
            Some(NextHop { port: 0, next_node: 0, class: RouteClass::Local })
        }
    }

    struct FailingLink;
    impl LinkLayer for FailingLink {
        fn send(&self, _port: Port, _header: &[u8], _payload: &[u8]) -> Result<(), Status> {
            Err(Status::NETWORK_COMMS_PROBLEM_WITH_REMOTE_NODE)
        }
        fn send_raw(&self, _port: Port, _body: &[u8]) -> Result<(), Status> {
            Err(Status::NETWORK_COMMS_PROBLEM_WITH_REMOTE_NODE)
        }
    }

    #[test]
    fn send_internet_gives_up_after_retry_cap_and_returns_last_status() {
        let netbuf = NetbufPool::new(4, 4);
        let route = AlwaysLocal;
        let link = FailingLink;
        let quit = EventCount::new();
        let params = SendParams {
            routing_key: 1,
            dest_node: 2,
            dest_sock: 3,
            src_node: 9,
            src_sock: 4,
            request_id: 1,
            template: b"x",
            payload: b"",
            retry_cap: 2,
            loopback: false,
            extended: false,
            signature: false,
            flags: 0,
        };
        let result = send_internet(&params, &netbuf, &route, &link, &quit, quit.read());
        assert_eq!(result, Err(Status::NETWORK_COMMS_PROBLEM_WITH_REMOTE_NODE));
        // every header page must have been returned to the pool across retries
        assert!(netbuf.get_hdr().is_some());
    }

    struct SilentLink;
    impl LinkLayer for SilentLink {
        fn send(&self, _port: Port, _header: &[u8], _payload: &[u8]) -> Result<(), Status> {
            Ok(())
        }
        fn send_raw(&self, _port: Port, _body: &[u8]) -> Result<(), Status> {
            Ok(())
        }
    }

    #[test]
    fn sar_internet_times_out_to_remote_node_failed_to_respond() {
        let netbuf = NetbufPool::new(4, 4);
        let sockets: SocketTable<PktDescriptor> = SocketTable::new(4);
        let ids = IdGenerator::new();
        let missing = MissingNodeTable::new();
        let route = AlwaysLocal;
        let link = SilentLink;
        let quit = EventCount::new();

        let params = SarParams {
            routing_key: 1,
            dest_node: 55,
            dest_sock: 3,
            timeout: Duration::from_millis(5),
            retry_cap: 2,
            req_template: b"ping",
            req_payload: b"",
            loopback: false,
        };

        let result = sar_internet(
            &params, 9, 1, &netbuf, &sockets, &ids, &missing, &route, &link, &quit, quit.read(),
        );
        assert_eq!(result.unwrap_err(), Status::NETWORK_REMOTE_NODE_FAILED_TO_RESPOND);
        // the reply socket sar_internet allocated must have been closed on exit
        assert_eq!(sockets.allocate(apollo_socket::SOCKET_MIN, 2), Some(apollo_socket::SOCKET_MIN));
    }
}
