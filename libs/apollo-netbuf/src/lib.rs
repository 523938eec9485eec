//! Netbuf: the fixed-size page pool that backs every packet send and
//! receive. Two pools are kept, one of 952-byte header pages and one of
//! 1 KiB data pages; callers acquire pages by address and must explicitly
//! return them, mirroring the ownership rules an interrupt-level allocator
//! would need.

use apollo_common::EventCount;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

pub const HDR_PAGE_CAPACITY: usize = 952;
pub const DAT_PAGE_SIZE: usize = 1024;
/// Largest payload `copy_to_pa`/`dat_copy` will move across pages in one call.
pub const MAX_DATA_PAGES: usize = 4;
pub const MAX_PAYLOAD: usize = DAT_PAGE_SIZE * MAX_DATA_PAGES;

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct PageAddr(u32);

struct Pool {
    slots: Vec<Mutex<Box<[u8]>>>,
    free: Mutex<Vec<u32>>,
    avail: EventCount,
    page_size: usize,
}

impl Pool {
    fn new(count: usize, page_size: usize) -> Self {
        let slots = (0..count)
            .map(|_| Mutex::new(vec![0u8; page_size].into_boxed_slice()))
            .collect();
        let free = (0..count as u32).collect();
        Pool {
            slots,
            free: Mutex::new(free),
            avail: EventCount::new(),
            page_size,
        }
    }

    fn try_get(&self) -> Option<PageAddr> {
        let mut free = self.free.lock().unwrap();
        free.pop().map(PageAddr)
    }

    /// Blocks on the pool's event count until a page is free or `timeout`
    /// elapses. Callers of `get_hdr`/`get_dat` that got `None` are expected
    /// to wait here themselves rather than have the pool block internally.
    fn get_blocking(&self, timeout: Duration) -> Option<PageAddr> {
        if let Some(addr) = self.try_get() {
            return Some(addr);
        }
        let since = self.avail.read();
        self.avail.wait_until_advanced(since, timeout);
        self.try_get()
    }

    fn release(&self, addr: PageAddr) {
        {
            let mut buf = self.slots[addr.0 as usize].lock().unwrap();
            buf.iter_mut().for_each(|b| *b = 0);
        }
        self.free.lock().unwrap().push(addr.0);
        self.avail.advance();
    }

    fn map(&self, addr: PageAddr) -> MappedPage<'_> {
        let guard = self.slots[addr.0 as usize].lock().unwrap();
        MappedPage { addr, guard }
    }
}

/// A page mapped into accessible memory. Dropping it without calling
/// [`NetbufPool::rtnva`]/[`NetbufPool::rtn_hdr`]/[`NetbufPool::rtn_dat`]
/// leaves the page allocated but unreachable until the pool is reset — the
/// caller, not this type, owns returning it.
pub struct MappedPage<'a> {
    addr: PageAddr,
    guard: MutexGuard<'a, Box<[u8]>>,
}

impl<'a> MappedPage<'a> {
    pub fn addr(&self) -> PageAddr {
        self.addr
    }
}

impl<'a> core::ops::Deref for MappedPage<'a> {
    type Target = [u8];
    fn deref(&self) -> &[u8] {
        &self.guard
    }
}

impl<'a> core::ops::DerefMut for MappedPage<'a> {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.guard
    }
}

pub struct NetbufPool {
    hdr: Pool,
    dat: Pool,
}

impl NetbufPool {
    pub fn new(hdr_pages: usize, dat_pages: usize) -> Self {
        NetbufPool {
            hdr: Pool::new(hdr_pages, HDR_PAGE_CAPACITY),
            dat: Pool::new(dat_pages, DAT_PAGE_SIZE),
        }
    }

    pub fn get_hdr(&self) -> Option<(PageAddr, MappedPage<'_>)> {
        let addr = self.hdr.try_get()?;
        Some((addr, self.hdr.map(addr)))
    }

    pub fn get_hdr_blocking(&self, timeout: Duration) -> Option<(PageAddr, MappedPage<'_>)> {
        let addr = self.hdr.get_blocking(timeout)?;
        Some((addr, self.hdr.map(addr)))
    }

    pub fn rtn_hdr(&self, addr: PageAddr) {
        self.hdr.release(addr);
    }

    pub fn get_dat(&self) -> Option<PageAddr> {
        self.dat.try_get()
    }

    pub fn get_dat_blocking(&self, timeout: Duration) -> Option<PageAddr> {
        self.dat.get_blocking(timeout)
    }

    pub fn getva(&self, addr: PageAddr) -> MappedPage<'_> {
        self.dat.map(addr)
    }

    pub fn rtnva(&self, page: MappedPage<'_>) -> PageAddr {
        page.addr
    }

    pub fn rtn_dat(&self, addr: PageAddr) {
        self.dat.release(addr);
    }

    /// Copies up to [`MAX_PAYLOAD`] bytes out of `pages` (in order) into
    /// `dest`, mapping and unmapping each page in turn. `pages` holds
    /// physical page addresses; unused trailing slots are ignored once
    /// `len` bytes have been copied.
    pub fn dat_copy(&self, pages: &[PageAddr], len: usize, dest: &mut [u8]) {
        assert!(dest.len() >= len);
        let mut copied = 0;
        for &page in pages {
            if copied >= len {
                break;
            }
            let take = (len - copied).min(DAT_PAGE_SIZE);
            let mapped = self.getva(page);
            dest[copied..copied + take].copy_from_slice(&mapped[..take]);
            self.rtnva(mapped);
            copied += take;
        }
    }

    /// Allocates enough data pages to hold `src`, copies it in, and returns
    /// the page list. On partial failure (pool exhausted mid-copy) every
    /// page acquired so far is released before returning `None`, so a
    /// caller can treat this as atomic.
    pub fn copy_to_pa(&self, src: &[u8]) -> Option<Vec<PageAddr>> {
        if src.len() > MAX_PAYLOAD {
            return None;
        }
        let mut alloc = DataPageAlloc::new(self);
        let mut copied = 0;
        while copied < src.len() {
            let addr = alloc.acquire()?;
            let take = (src.len() - copied).min(DAT_PAGE_SIZE);
            let mut mapped = self.getva(addr);
            mapped[..take].copy_from_slice(&src[copied..copied + take]);
            self.rtnva(mapped);
            copied += take;
        }
        Some(alloc.commit())
    }
}

/// Fault-cleanup guard for a partial `copy_to_pa`: every page acquired
/// through `acquire` is released on drop unless `commit` is called first.
struct DataPageAlloc<'a> {
    pool: &'a NetbufPool,
    pages: Vec<PageAddr>,
}

impl<'a> DataPageAlloc<'a> {
    fn new(pool: &'a NetbufPool) -> Self {
        DataPageAlloc {
            pool,
            pages: Vec::new(),
        }
    }

    fn acquire(&mut self) -> Option<PageAddr> {
        let addr = self.pool.get_dat()?;
        self.pages.push(addr);
        Some(addr)
    }

    fn commit(mut self) -> Vec<PageAddr> {
        std::mem::take(&mut self.pages)
    }
}

impl<'a> Drop for DataPageAlloc<'a> {
    fn drop(&mut self) {
        for addr in self.pages.drain(..) {
            self.pool.rtn_dat(addr);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_hdr_returns_none_when_pool_drained() {
        let pool = NetbufPool::new(1, 1);
        let first = pool.get_hdr();
        assert!(first.is_some());
        assert!(pool.get_hdr().is_none());
    }

    #[test]
    fn returning_a_header_page_makes_it_available_again() {
        let pool = NetbufPool::new(1, 1);
        let (addr, page) = pool.get_hdr().unwrap();
        drop(page);
        pool.rtn_hdr(addr);
        assert!(pool.get_hdr().is_some());
    }

    #[test]
    fn copy_to_pa_and_dat_copy_roundtrip_across_pages() {
        let pool = NetbufPool::new(1, 4);
        let src: Vec<u8> = (0..(DAT_PAGE_SIZE + 37) as u32).map(|i| i as u8).collect();
        let pages = pool.copy_to_pa(&src).expect("should fit in 2 pages");
        assert_eq!(pages.len(), 2);

        let mut dest = vec![0u8; src.len()];
        pool.dat_copy(&pages, src.len(), &mut dest);
        assert_eq!(dest, src);

        for p in pages {
            pool.rtn_dat(p);
        }
    }

    #[test]
    fn copy_to_pa_releases_partial_allocation_on_exhaustion() {
        let pool = NetbufPool::new(1, 1);
        let src = vec![0u8; DAT_PAGE_SIZE + 1];
        assert!(pool.copy_to_pa(&src).is_none());
        // the one page in the pool must have been released by the fault-cleanup guard
        assert!(pool.get_dat().is_some());
    }

    #[test]
    fn oversized_payload_is_rejected_without_touching_the_pool() {
        let pool = NetbufPool::new(0, MAX_DATA_PAGES);
        let src = vec![0u8; MAX_PAYLOAD + 1];
        assert!(pool.copy_to_pa(&src).is_none());
        assert!(pool.get_dat().is_some());
    }
}
