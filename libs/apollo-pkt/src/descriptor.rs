use crate::header::ParsedHeader;
use apollo_netbuf::{NetbufPool, PageAddr};

/// What gets enqueued onto a socket's FIFO when a packet is received: the
/// parsed header plus the netbuf pages it still owns. The receiver must
/// call [`PktDescriptor::release`] (directly, or via whatever decodes the
/// template/payload out of it) so the pages return to the pool.
pub struct PktDescriptor {
    pub header_page: PageAddr,
    pub data_pages: Vec<PageAddr>,
    pub parsed: ParsedHeader,
    pub template: Vec<u8>,
    pub payload_len: usize,
}

impl PktDescriptor {
    pub fn release(self, netbuf: &NetbufPool) {
        netbuf.rtn_hdr(self.header_page);
        for page in self.data_pages {
            netbuf.rtn_dat(page);
        }
    }
}
