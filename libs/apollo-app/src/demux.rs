//! `APP_$DEMUX`: called by the link layer with a freshly-received packet
//! descriptor, decides whether it's a direct-return raw packet or needs
//! decoding and socket fan-out, with overflow spillover for the `FILE`
//! socket.

use crate::header::app_receive;
use apollo_common::Status;
use apollo_netbuf::NetbufPool;
use apollo_pkt::{HeaderShape, PktDescriptor, FLAG_RAW};
use apollo_socket::{SocketTable, SOCKET_FILE, SOCKET_OVERFLOW};

#[derive(Debug)]
pub enum DemuxOutcome {
    /// Network-type-2, socket `FILE`, raw-flagged packets skip socket
    /// queueing entirely; the caller gets the descriptor straight back.
    Direct(PktDescriptor),
    /// Landed on its destination socket, or spilled over to `OVERFLOW`.
    Enqueued,
    /// Both the destination socket (or `FILE`/`OVERFLOW` pair) were full;
    /// buffers were released back to the pool.
    Dropped,
}

fn is_direct_return(descriptor: &PktDescriptor) -> bool {
    descriptor.parsed.shape == HeaderShape::Type2Internet
        && descriptor.parsed.dest_sock == SOCKET_FILE
        && (descriptor.parsed.flags & FLAG_RAW) != 0
}

pub fn app_demux(
    descriptor: PktDescriptor,
    netbuf: &NetbufPool,
    sockets: &SocketTable<PktDescriptor>,
) -> Result<DemuxOutcome, Status> {
    if is_direct_return(&descriptor) {
        return Ok(DemuxOutcome::Direct(descriptor));
    }

    let header = app_receive(&descriptor)?;
    let sock = header.socket;

    // `SocketTable::enqueue_file` is generic over the queued item and has
    // no way to release netbuf pages on a final drop, so the FILE/OVERFLOW
    // spillover is driven here instead, where the descriptor (and the
    // netbuf pool it belongs to) are both in scope.
    if sock == SOCKET_FILE {
        let descriptor = match sockets.enqueue(SOCKET_FILE, descriptor) {
            Ok(()) => return Ok(DemuxOutcome::Enqueued),
            Err(descriptor) => descriptor,
        };
        *sockets.overflow_counters.file_overflow.lock().unwrap() += 1;
        return match sockets.enqueue(SOCKET_OVERFLOW, descriptor) {
            Ok(()) => Ok(DemuxOutcome::Enqueued),
            Err(descriptor) => {
                *sockets.overflow_counters.overflow_overflow.lock().unwrap() += 1;
                descriptor.release(netbuf);
                Ok(DemuxOutcome::Dropped)
            }
        };
    }

    match sockets.enqueue(sock, descriptor) {
        Ok(()) => Ok(DemuxOutcome::Enqueued),
        Err(descriptor) => {
            descriptor.release(netbuf);
            Ok(DemuxOutcome::Dropped)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apollo_pkt::ParsedHeader;
    use apollo_socket::SOCKET_OVERFLOW;

    fn descriptor(netbuf: &NetbufPool, dest_sock: u16, flags: u8, shape: HeaderShape) -> PktDescriptor {
        let (hdr_addr, _page) = netbuf.get_hdr().unwrap();
        let template = vec![0u8; 16]; // long enough for app_receive to decode both UIDs
        PktDescriptor {
            header_page: hdr_addr,
            data_pages: vec![],
            parsed: ParsedHeader {
                shape,
                flags,
                header_size: 0,
                src_node: 1,
                dest_node: 2,
                dest_sock,
                src_sock: 5,
                routing_key: 0,
                request_id: 1,
                data_len: 0,
                extended: false,
                signature: false,
                template_offset: 0,
            },
            template,
            payload_len: 0,
        }
    }

    #[test]
    fn raw_file_socket_packet_is_returned_directly() {
        let netbuf = NetbufPool::new(2, 1);
        let desc = descriptor(&netbuf, SOCKET_FILE, FLAG_RAW, HeaderShape::Type2Internet);
        match app_demux(desc, &netbuf, &SocketTable::new(4)).unwrap() {
            DemuxOutcome::Direct(_) => {}
            other => panic!("expected Direct, got {other:?}"),
        }
    }

    #[test]
    fn ordinary_packet_is_enqueued_on_its_destination_socket() {
        let netbuf = NetbufPool::new(2, 1);
        let sockets: SocketTable<PktDescriptor> = SocketTable::new(4);
        sockets.open(20, 1).unwrap();
        let desc = descriptor(&netbuf, 20, 0, HeaderShape::Type2Internet);
        let outcome = app_demux(desc, &netbuf, &sockets).unwrap();
        assert!(matches!(outcome, DemuxOutcome::Enqueued));
        assert!(sockets.dequeue(20).is_some());
    }

    #[test]
    fn full_file_socket_spills_to_overflow_then_drops_and_releases() {
        // 4 header pages total; d1..d3 below consume 3 of them, leaving 1 free.
        let netbuf = NetbufPool::new(4, 1);
        let sockets: SocketTable<PktDescriptor> = SocketTable::new(1);
        sockets.open(SOCKET_FILE, 1).unwrap();
        sockets.open(SOCKET_OVERFLOW, 1).unwrap();

        let d1 = descriptor(&netbuf, SOCKET_FILE, 0, HeaderShape::Type2Internet);
        let d2 = descriptor(&netbuf, SOCKET_FILE, 0, HeaderShape::Type2Internet);
        let d3 = descriptor(&netbuf, SOCKET_FILE, 0, HeaderShape::Type2Internet);

        assert!(matches!(app_demux(d1, &netbuf, &sockets).unwrap(), DemuxOutcome::Enqueued));
        assert!(matches!(app_demux(d2, &netbuf, &sockets).unwrap(), DemuxOutcome::Enqueued));
        assert_eq!(*sockets.overflow_counters.file_overflow.lock().unwrap(), 1);

        assert!(matches!(app_demux(d3, &netbuf, &sockets).unwrap(), DemuxOutcome::Dropped));
        assert_eq!(*sockets.overflow_counters.overflow_overflow.lock().unwrap(), 1);

        // d3's header page came back to the pool: the one page left free at
        // the start plus d3's released page means two `get_hdr` calls succeed.
        assert!(netbuf.get_hdr().is_some());
        assert!(netbuf.get_hdr().is_some());
    }

    #[test]
    fn non_file_socket_releases_buffers_when_destination_is_full() {
        let netbuf = NetbufPool::new(2, 1);
        let sockets: SocketTable<PktDescriptor> = SocketTable::new(0);
        sockets.open(30, 1).unwrap();
        let d1 = descriptor(&netbuf, 30, 0, HeaderShape::Type2Internet);
        let outcome = app_demux(d1, &netbuf, &sockets).unwrap();
        assert!(matches!(outcome, DemuxOutcome::Dropped));
    }
}
