#![cfg_attr(target_os = "none", no_std)]
#![cfg_attr(target_os = "none", no_main)]

//! The single process hosting PKT's ping server, the RIP routing server,
//! APP's receive-side demux, and the DIR dispatcher's local-handler table
//! behind one `Opcode`-dispatched main loop -- the same shape
//! `services/net` hosts TCP/UDP/ICMP/DNS behind one registration.

use apollo_common::{EventCount, NodeId, Status};
use apollo_dir::{CallerKind, DirRequest, DirResponse, LocalHandler, Opcode as DirOpcode, RemoteFileSender};
use apollo_hint::HintCache;
use apollo_netbuf::NetbufPool;
use apollo_pkt::{
    sar_internet, IdGenerator, LinkLayer, LoopbackLink, MissingNodeTable, PktDescriptor, Port,
    RouteClass, RouteProvider, SarParams,
};
use apollo_rip::RipState;
use apollo_socket::{SocketTable, SOCKET_FILE, SOCKET_OVERFLOW, SOCKET_PING, SOCKET_RIP};
use netd_client::api::{self, Opcode};
use num_traits::FromPrimitive;
use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use xous_ipc::Buffer;

/// This hosted reconstruction has no real node-assignment authority to
/// consult at boot, so `NODE_ME` is derived from the process id rather
/// than read from persisted configuration.
fn node_me() -> NodeId {
    xous::process::id() as NodeId
}

/// Every route this reconstruction knows about is local-loopback; a real
/// deployment would consult the RIP tables via [`RipState`] for a remote
/// next-hop instead.
struct LoopbackRoute;
impl RouteProvider for LoopbackRoute {
    fn find_nexthop(&self, _routing_key: u32, _node: NodeId) -> Option<apollo_pkt::NextHop> {
        Some(apollo_pkt::NextHop { port: 0, next_node: 0, class: RouteClass::Local })
    }
}

/// No remote peers exist in this hosted reconstruction, so every `DIR`
/// hop that isn't local fails immediately with the same status a real
/// unreachable peer would report.
struct NoRemotePeers;
impl RemoteFileSender for NoRemotePeers {
    fn send_request(&self, _hop: (NodeId, Port), _request: &DirRequest) -> Result<(DirResponse, u16), Status> {
        Err(Status::NETWORK_REMOTE_NODE_FAILED_TO_RESPOND)
    }
}

/// The flat bytes lent across IPC for a `DirDoOp` call, matching
/// [`netd_client::RawDirBuf`]'s layout so both ends agree on the wire
/// shape without a second definition.
#[derive(rkyv::Archive, rkyv::Serialize, rkyv::Deserialize)]
struct RawDirBuf {
    len: u32,
    data: [u8; api::DIR_BUF_LEN],
}

#[xous::xous_main]
fn xmain() -> ! {
    log_server::init_wait().unwrap();
    log::set_max_level(log::LevelFilter::Info);
    log::info!("my PID is {}", xous::process::id());

    let xns = xous_names::XousNames::new().unwrap();
    let netd_sid = xns.register_name(api::SERVER_NAME_NETD).expect("can't register server");
    log::trace!("registered with NS -- {:?}", netd_sid);

    let node_me = node_me();
    let netbuf = Arc::new(NetbufPool::new(32, 32));
    let sockets: Arc<SocketTable<PktDescriptor>> = Arc::new(SocketTable::new(apollo_socket::DEFAULT_CAPACITY));
    sockets.open(SOCKET_PING, 0).expect("couldn't open ping socket");
    sockets.open(SOCKET_RIP, 0).expect("couldn't open rip socket");
    sockets.open(SOCKET_FILE, 0).expect("couldn't open file socket");
    sockets.open(SOCKET_OVERFLOW, 0).expect("couldn't open overflow socket");

    let ids = Arc::new(IdGenerator::new());
    let missing = Arc::new(MissingNodeTable::new());
    let route = Arc::new(LoopbackRoute);
    let link: Arc<dyn LinkLayer> = Arc::new(LoopbackLink);
    let quit_ec = Arc::new(EventCount::new());
    let rip = Arc::new(RipState::new(node_me));
    let hints = HintCache::new();
    let dir_locals: HashMap<DirOpcode, Box<dyn LocalHandler>> = HashMap::new();
    let dir_remote = NoRemotePeers;

    // Ping server: answers `NET_IO_$PING` probes arriving over the wire on
    // the PING socket. Runs on its own thread so the main loop stays free
    // to answer IPC requests from local callers.
    thread::spawn({
        let sockets = sockets.clone();
        let netbuf = netbuf.clone();
        let route = route.clone();
        let link = link.clone();
        let quit_ec = quit_ec.clone();
        move || {
            apollo_pkt::run_ping_server(&sockets, node_me, &netbuf, route.as_ref(), link.as_ref(), &quit_ec, quit_ec.read(), || false);
        }
    });

    // RIP aging timer: ticks the routing tables and broadcasts changes.
    thread::spawn({
        let rip = rip.clone();
        let netbuf = netbuf.clone();
        let link = link.clone();
        let quit_ec = quit_ec.clone();
        move || {
            apollo_rip::run_aging_timer(
                rip.as_ref(),
                &netbuf,
                link.as_ref(),
                apollo_rip::DEFAULT_TICK_INTERVAL,
                || quit_ec.read() != 0,
            );
        }
    });

    log::trace!("netd ready to accept requests");

    loop {
        let mut msg = xous::receive_message(netd_sid).unwrap();
        match FromPrimitive::from_usize(msg.body.id()) {
            Some(Opcode::Ping) => xous::msg_blocking_scalar_unpack!(msg, dest_node, dest_sock, _, _, {
                let params = SarParams {
                    routing_key: 0,
                    dest_node: dest_node as NodeId,
                    dest_sock: dest_sock as u16,
                    timeout: Duration::from_secs(2),
                    retry_cap: apollo_pkt::DEFAULT_RETRY_CAP,
                    req_template: &[],
                    req_payload: &[],
                    loopback: false,
                };
                let status = match sar_internet(
                    &params,
                    node_me,
                    0,
                    &netbuf,
                    &sockets,
                    &ids,
                    &missing,
                    route.as_ref(),
                    link.as_ref(),
                    &quit_ec,
                    quit_ec.read(),
                ) {
                    Ok(_) => Status::OK,
                    Err(status) => status,
                };
                xous::return_scalar(msg.sender, status.bits() as usize).ok();
            }),
            Some(Opcode::DirDoOp) => {
                let mut buf = unsafe { Buffer::from_memory_message_mut(msg.body.memory_message_mut().unwrap()) };
                let raw = buf.to_original::<RawDirBuf, _>().unwrap();
                let response = match DirRequest::parse(&raw.data[..raw.len as usize]) {
                    Ok(request) => apollo_dir::dir_do_op(&request, CallerKind::Ordinary, node_me, &hints, &dir_remote, &dir_locals, None),
                    Err(status) => DirResponse::failed(status),
                };
                let mut out = RawDirBuf { len: 0, data: [0u8; api::DIR_BUF_LEN] };
                out.len = response.build(&mut out.data).unwrap_or(0) as u32;
                buf.replace(out).ok();
            }
            Some(Opcode::SuspendResume) => {
                log::trace!("suspend/resume is a no-op in this hosted reconstruction");
            }
            Some(Opcode::InvalidCall) | None => {
                log::error!("netd: unknown opcode {}", msg.body.id());
            }
        }
    }
}
