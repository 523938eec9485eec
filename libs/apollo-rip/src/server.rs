//! RIP server logic: handling request/response/name-register packets on
//! socket `RIP`, broadcasting updates, and the halt-on-last-port poison.
//!
//! Packets travel as the `template` field of a [`PktDescriptor`], mirroring
//! how the ping server treats its own socket's payload — this crate never
//! touches netbuf data pages directly, only the header pool.

use crate::packet::{decode, encode, RipCommand, RipEntry, RipPacket, SENTINEL_FULL_TABLE};
use crate::table::{RouteState, RoutingTable, TableClass};
use apollo_common::NodeId;
use apollo_common::Status;
use apollo_netbuf::NetbufPool;
use apollo_pkt::{
    bld_internet_hdr, BuildParams, HeaderShape, LinkLayer, NextHop, PktDescriptor, Port,
    RouteClass, RouteProvider,
};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

/// Node-id used as the RIP broadcast target. The original's 20-bit sentinel
/// `0xFFFFF` is reused here as the low bits of a full node id.
pub const BROADCAST_NODE: NodeId = 0x0000_FFFF;

/// Default port MTU assumed for a direct route when no port-specific MTU
/// has been registered.
pub const DEFAULT_PORT_MTU: usize = 1500;

/// Hook invoked for a name-register (command 3) packet; wired to whatever
/// serves the directory-of-services in the surrounding process.
pub trait NameServiceSink: Send + Sync {
    fn register(&self, source_node: NodeId, port: Port, network: u32);
}

pub struct RipState {
    node_me: NodeId,
    standard: RoutingTable,
    non_standard: RoutingTable,
    port_mtu: Mutex<HashMap<Port, usize>>,
    active_ports: Mutex<HashSet<Port>>,
    port_network: Mutex<HashMap<Port, u32>>,
    name_sink: Option<Box<dyn NameServiceSink>>,
}

impl RipState {
    pub fn new(node_me: NodeId) -> Self {
        RipState {
            node_me,
            standard: RoutingTable::new(TableClass::Standard),
            non_standard: RoutingTable::new(TableClass::NonStandard),
            port_mtu: Mutex::new(HashMap::new()),
            active_ports: Mutex::new(HashSet::new()),
            port_network: Mutex::new(HashMap::new()),
            name_sink: None,
        }
    }

    pub fn with_name_sink(mut self, sink: Box<dyn NameServiceSink>) -> Self {
        self.name_sink = Some(sink);
        self
    }

    pub fn table_for(&self, class: TableClass) -> &RoutingTable {
        match class {
            TableClass::Standard => &self.standard,
            TableClass::NonStandard => &self.non_standard,
        }
    }

    pub fn standard(&self) -> &RoutingTable {
        &self.standard
    }

    pub fn non_standard(&self) -> &RoutingTable {
        &self.non_standard
    }

    pub fn set_port_mtu(&self, port: Port, mtu: usize) {
        self.port_mtu.lock().unwrap().insert(port, mtu);
    }

    fn mtu_for(&self, port: Port) -> usize {
        *self.port_mtu.lock().unwrap().get(&port).unwrap_or(&DEFAULT_PORT_MTU)
    }

    /// Registers `port` as routing-capable. Call on link-up.
    pub fn port_opened(&self, port: Port) {
        self.active_ports.lock().unwrap().insert(port);
    }

    /// Deregisters `port`. If exactly one routing port remains afterward,
    /// emits the halt poison broadcast on both classes.
    pub fn port_closed(&self, port: Port, netbuf: &NetbufPool, link: &dyn LinkLayer) {
        let remaining = {
            let mut ports = self.active_ports.lock().unwrap();
            ports.remove(&port);
            ports.len()
        };
        if remaining == 1 {
            self.halt_poison(netbuf, link);
        }
    }

    /// The non-standard class's poison goes out the raw/IDP send path, the
    /// standard class's through the ordinary wired internet-header path --
    /// two distinct channels, each clearing only its own class's
    /// recent-changes flag.
    fn halt_poison(&self, netbuf: &NetbufPool, link: &dyn LinkLayer) {
        let ports: Vec<Port> = self.active_ports.lock().unwrap().iter().copied().collect();
        let poison = RipPacket {
            command: RipCommand::Response,
            entries: vec![RipEntry { network: SENTINEL_FULL_TABLE, metric: 16 }],
        };

        if let Ok(body) = encode(&poison) {
            for &port in &ports {
                let _ = link.send_raw(port, &body);
            }
        }
        self.table_for(TableClass::NonStandard).clear_recent_changes();

        for &port in &ports {
            let _ = self.send_packet_to(BROADCAST_NODE, port, &poison, netbuf, link);
        }
        self.table_for(TableClass::Standard).clear_recent_changes();
    }

    /// Decodes and dispatches one RIP packet taken off socket `RIP`.
    /// Releases the descriptor's netbuf pages before returning.
    pub fn handle_packet(
        &self,
        descriptor: PktDescriptor,
        port: Port,
        class: TableClass,
        netbuf: &NetbufPool,
        link: &dyn LinkLayer,
    ) -> Result<(), Status> {
        let source_node = descriptor.parsed.src_node;
        let body = descriptor.template.clone();
        descriptor.release(netbuf);
        let packet = decode(&body)?;

        match packet.command {
            RipCommand::Request => {
                let table = self.table_for(class);
                let response = build_response(table, &packet.entries);
                self.send_packet_to(source_node, port, &response, netbuf, link)
            }
            RipCommand::Response => {
                self.handle_response(class, source_node, port, &packet);
                Ok(())
            }
            RipCommand::NameRegister => {
                if let (Some(sink), Some(first)) = (&self.name_sink, packet.entries.first()) {
                    sink.register(source_node, port, first.network);
                }
                Ok(())
            }
        }
    }

    fn handle_response(&self, class: TableClass, source_node: NodeId, port: Port, packet: &RipPacket) {
        let table = self.table_for(class);
        if let Some(first) = packet.entries.first() {
            let mut port_network = self.port_network.lock().unwrap();
            if let Some(&prev) = port_network.get(&port) {
                if prev != first.network {
                    table.retract(prev, port);
                }
            }
            port_network.insert(port, first.network);
        }
        for entry in &packet.entries {
            let metric = entry.metric.min(u8::MAX as u16) as u8;
            table.update_int(entry.network, source_node, metric, port);
        }
    }

    /// Broadcasts `class`'s table to every active port if it has pending
    /// changes, then clears the flag. Best-effort: a port whose send fails
    /// is skipped, not retried.
    pub fn send_updates(&self, class: TableClass, netbuf: &NetbufPool, link: &dyn LinkLayer) -> Result<(), Status> {
        let table = self.table_for(class);
        if !table.recent_changes() {
            return Ok(());
        }
        let ceiling = table.class().infinity();
        let entries: Vec<RipEntry> = table
            .entries_snapshot()
            .into_iter()
            .filter(|(_, e)| e.state != RouteState::Dead)
            .map(|(network, e)| RipEntry { network, metric: e.metric.min(ceiling) as u16 })
            .collect();
        let packet = RipPacket { command: RipCommand::Response, entries };
        let ports: Vec<Port> = self.active_ports.lock().unwrap().iter().copied().collect();
        for port in ports {
            let _ = self.send_packet_to(BROADCAST_NODE, port, &packet, netbuf, link);
        }
        table.clear_recent_changes();
        Ok(())
    }

    fn send_packet_to(
        &self,
        dest_node: NodeId,
        port: Port,
        packet: &RipPacket,
        netbuf: &NetbufPool,
        link: &dyn LinkLayer,
    ) -> Result<(), Status> {
        let body = encode(packet)?;
        let (hdr_addr, mut hdr_page) = netbuf.get_hdr().ok_or(Status::NETWORK_NO_SOCKET_AVAILABLE)?;
        let bp = BuildParams {
            shape: HeaderShape::Type1Loopback,
            flags: 0,
            routing_key: 0,
            dest_node,
            dest_sock: apollo_socket::SOCKET_RIP,
            src_node: self.node_me,
            src_sock: apollo_socket::SOCKET_RIP,
            request_id: 0,
            data_len: 0,
            extended: false,
            signature: false,
        };
        let built = bld_internet_hdr(&bp, &body, &mut hdr_page);
        let hdr_len = match built {
            Ok(len) => len,
            Err(status) => {
                netbuf.rtn_hdr(hdr_addr);
                return Err(status);
            }
        };
        let sent = link.send(port, &hdr_page[..hdr_len + body.len()], &[]);
        netbuf.rtn_hdr(hdr_addr);
        sent
    }
}

impl RouteProvider for RipState {
    fn find_nexthop(&self, routing_key: u32, node: NodeId) -> Option<NextHop> {
        if node == self.node_me {
            return Some(NextHop { port: 0, next_node: self.node_me, class: RouteClass::Local });
        }
        let candidate = self
            .standard
            .lookup(routing_key)
            .filter(|e| e.state != RouteState::Dead)
            .or_else(|| self.non_standard.lookup(routing_key).filter(|e| e.state != RouteState::Dead))?;
        let class = if candidate.metric <= 1 {
            RouteClass::Direct { mtu: self.mtu_for(candidate.port) }
        } else {
            RouteClass::Gateway
        };
        Some(NextHop { port: candidate.port, next_node: candidate.next_hop, class })
    }
}

/// Builds a response for a request packet: the whole live table when the
/// sentinel `0xFFFFFFFF` appears among the requested networks, otherwise
/// just the requested ones (metric ceiling on a miss or a dead entry).
fn build_response(table: &RoutingTable, requested: &[RipEntry]) -> RipPacket {
    let ceiling = table.class().infinity() as u16;
    let wants_full = requested.iter().any(|e| e.network == SENTINEL_FULL_TABLE);
    let entries = if wants_full {
        table
            .entries_snapshot()
            .into_iter()
            .filter(|(_, e)| e.state != RouteState::Dead)
            .map(|(network, e)| RipEntry { network, metric: (e.metric as u16).min(ceiling) })
            .collect()
    } else {
        requested
            .iter()
            .map(|req| match table.lookup(req.network) {
                Some(e) if e.state != RouteState::Dead => {
                    RipEntry { network: req.network, metric: (e.metric as u16).min(ceiling) }
                }
                _ => RipEntry { network: req.network, metric: ceiling },
            })
            .collect()
    };
    RipPacket { command: RipCommand::Response, entries }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apollo_pkt::{HeaderShape as Shape, ParsedHeader};

    struct RecordingLink {
        sent: Mutex<Vec<(Port, Vec<u8>)>>,
        sent_raw: Mutex<Vec<(Port, Vec<u8>)>>,
    }
    impl RecordingLink {
        fn new() -> Self {
            RecordingLink { sent: Mutex::new(Vec::new()), sent_raw: Mutex::new(Vec::new()) }
        }
    }
    impl LinkLayer for RecordingLink {
        fn send(&self, port: Port, header: &[u8], _payload: &[u8]) -> Result<(), Status> {
            self.sent.lock().unwrap().push((port, header.to_vec()));
            Ok(())
        }
        fn send_raw(&self, port: Port, body: &[u8]) -> Result<(), Status> {
            self.sent_raw.lock().unwrap().push((port, body.to_vec()));
            Ok(())
        }
    }

    fn descriptor_with(netbuf: &NetbufPool, src_node: NodeId, body: Vec<u8>) -> PktDescriptor {
        let (hdr_addr, _page) = netbuf.get_hdr().unwrap();
        PktDescriptor {
            header_page: hdr_addr,
            data_pages: vec![],
            parsed: ParsedHeader {
                shape: Shape::Type2Internet,
                flags: 0,
                header_size: 0,
                src_node,
                dest_node: 0,
                dest_sock: apollo_socket::SOCKET_RIP,
                src_sock: apollo_socket::SOCKET_RIP,
                routing_key: 0,
                request_id: 0,
                data_len: body.len() as u16,
                extended: false,
                signature: false,
                template_offset: 0,
            },
            template: body,
            payload_len: 0,
        }
    }

    #[test]
    fn request_for_full_table_returns_every_live_entry() {
        let state = RipState::new(1);
        state.standard().update_int(42, 9, 3, 5);
        let req = RipPacket { command: RipCommand::Request, entries: vec![RipEntry { network: SENTINEL_FULL_TABLE, metric: 0 }] };
        let body = encode(&req).unwrap();

        let netbuf = NetbufPool::new(4, 4);
        let link = RecordingLink::new();
        let desc = descriptor_with(&netbuf, 2, body);
        state.handle_packet(desc, 5, TableClass::Standard, &netbuf, &link).unwrap();

        let sent = link.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
    }

    #[test]
    fn response_updates_the_right_class_table() {
        let state = RipState::new(1);
        let resp = RipPacket { command: RipCommand::Response, entries: vec![RipEntry { network: 99, metric: 2 }] };
        let body = encode(&resp).unwrap();
        let netbuf = NetbufPool::new(4, 4);
        let link = RecordingLink::new();
        let desc = descriptor_with(&netbuf, 7, body);
        state.handle_packet(desc, 3, TableClass::NonStandard, &netbuf, &link).unwrap();

        assert_eq!(state.non_standard().lookup(99).unwrap().metric, 2);
        assert!(state.standard().lookup(99).is_none());
    }

    #[test]
    fn halt_on_last_port_broadcasts_poison_on_both_classes() {
        let state = RipState::new(1);
        state.port_opened(1);
        state.port_opened(2);
        let netbuf = NetbufPool::new(4, 4);
        let link = RecordingLink::new();
        state.port_closed(2, &netbuf, &link);

        // Standard class goes out the ordinary wired-header channel...
        let sent = link.sent.lock().unwrap();
        assert_eq!(sent.len(), 1); // one poison broadcast, to the one remaining port
        // ...non-standard class goes out the raw/IDP channel.
        let sent_raw = link.sent_raw.lock().unwrap();
        assert_eq!(sent_raw.len(), 1);
    }

    #[test]
    fn send_updates_is_a_no_op_without_pending_changes() {
        let state = RipState::new(1);
        state.port_opened(1);
        let netbuf = NetbufPool::new(4, 4);
        let link = RecordingLink::new();
        state.send_updates(TableClass::Standard, &netbuf, &link).unwrap();
        assert!(link.sent.lock().unwrap().is_empty());
    }
}
