//! The socket layer: a fixed table of numbered FIFOs, each with its own
//! event count so a receiver can block until something is enqueued, plus
//! an owner bitmap keyed by address-space id so a process's sockets can be
//! torn down in one pass on exit.

use apollo_common::{EcWaitResult, EventCount};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub type SocketNum = u16;
pub type AddressSpaceId = u16;

pub const SOCKET_MIN: SocketNum = 1;
pub const SOCKET_MAX: SocketNum = 224;

pub const SOCKET_FILE_SERVER: SocketNum = 2;
pub const SOCKET_FILE: SocketNum = 4;
pub const SOCKET_OVERFLOW: SocketNum = 6;
pub const SOCKET_RIP: SocketNum = 8;
pub const SOCKET_PING: SocketNum = 0x0D;

/// Default per-socket FIFO depth. The original system sized this by
/// available netbuf pages; here it simply bounds memory growth.
pub const DEFAULT_CAPACITY: usize = 64;

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum OpenError {
    OutOfRange,
    AlreadyOpen,
}

struct Socket<T> {
    queue: Mutex<VecDeque<T>>,
    capacity: usize,
    owner: Mutex<Option<AddressSpaceId>>,
    arrived: EventCount,
}

impl<T> Socket<T> {
    fn new(capacity: usize) -> Self {
        Socket {
            queue: Mutex::new(VecDeque::new()),
            capacity,
            owner: Mutex::new(None),
            arrived: EventCount::new(),
        }
    }

    fn try_enqueue(&self, item: T) -> Result<(), T> {
        let mut q = self.queue.lock().unwrap();
        if q.len() >= self.capacity {
            return Err(item);
        }
        q.push_back(item);
        drop(q);
        self.arrived.advance();
        Ok(())
    }

    fn try_dequeue(&self) -> Option<T> {
        self.queue.lock().unwrap().pop_front()
    }
}

/// Drop counters for the socket `FILE` / `OVERFLOW` spillover path.
#[derive(Default)]
pub struct OverflowCounters {
    pub file_overflow: Mutex<u64>,
    pub overflow_overflow: Mutex<u64>,
}

pub struct SocketTable<T> {
    sockets: Vec<Mutex<Option<Arc<Socket<T>>>>>,
    owners: Mutex<HashMap<AddressSpaceId, HashSet<SocketNum>>>,
    pub overflow_counters: OverflowCounters,
    default_capacity: usize,
}

impl<T> SocketTable<T> {
    pub fn new(default_capacity: usize) -> Self {
        let mut sockets = Vec::with_capacity(SOCKET_MAX as usize + 1);
        for _ in 0..=SOCKET_MAX {
            sockets.push(Mutex::new(None));
        }
        SocketTable {
            sockets,
            owners: Mutex::new(HashMap::new()),
            overflow_counters: OverflowCounters::default(),
            default_capacity,
        }
    }

    fn in_range(num: SocketNum) -> bool {
        (SOCKET_MIN..=SOCKET_MAX).contains(&num)
    }

    fn get(&self, num: SocketNum) -> Option<Arc<Socket<T>>> {
        self.sockets.get(num as usize)?.lock().unwrap().clone()
    }

    /// Allocates the next unopened socket number, starting from `from`.
    /// Used when a caller needs a fresh reply socket rather than a fixed
    /// well-known number.
    pub fn allocate(&self, from: SocketNum, owner: AddressSpaceId) -> Option<SocketNum> {
        for num in from.max(SOCKET_MIN)..=SOCKET_MAX {
            if self.open(num, owner).is_ok() {
                return Some(num);
            }
        }
        None
    }

    pub fn open(&self, num: SocketNum, owner: AddressSpaceId) -> Result<(), OpenError> {
        if !Self::in_range(num) {
            return Err(OpenError::OutOfRange);
        }
        let mut slot = self.sockets[num as usize].lock().unwrap();
        if slot.is_some() {
            return Err(OpenError::AlreadyOpen);
        }
        let socket = Socket::new(self.default_capacity);
        *socket.owner.lock().unwrap() = Some(owner);
        *slot = Some(Arc::new(socket));
        self.owners.lock().unwrap().entry(owner).or_default().insert(num);
        Ok(())
    }

    pub fn close(&self, num: SocketNum) {
        let taken = self
            .sockets
            .get(num as usize)
            .and_then(|slot| slot.lock().unwrap().take());
        if let Some(socket) = taken {
            if let Some(owner) = *socket.owner.lock().unwrap() {
                if let Some(set) = self.owners.lock().unwrap().get_mut(&owner) {
                    set.remove(&num);
                }
            }
        }
    }

    /// Closes every socket owned by `owner`, mirroring automatic cleanup on
    /// process exit.
    pub fn close_all_for(&self, owner: AddressSpaceId) {
        let owned: Vec<SocketNum> = self
            .owners
            .lock()
            .unwrap()
            .remove(&owner)
            .map(|s| s.into_iter().collect())
            .unwrap_or_default();
        for num in owned {
            *self.sockets[num as usize].lock().unwrap() = None;
        }
    }

    pub fn is_owner(&self, num: SocketNum, owner: AddressSpaceId) -> bool {
        self.get(num)
            .map(|s| *s.owner.lock().unwrap() == Some(owner))
            .unwrap_or(false)
    }

    /// Enqueues onto `num`'s FIFO. Returns `Err(item)` if the socket is
    /// unopened or full so the caller can decide what to do (general
    /// sockets just drop; the `FILE` socket falls back to `OVERFLOW` via
    /// [`SocketTable::enqueue_file`]).
    pub fn enqueue(&self, num: SocketNum, item: T) -> Result<(), T> {
        match self.get(num) {
            Some(socket) => socket.try_enqueue(item),
            None => Err(item),
        }
    }

    pub fn dequeue(&self, num: SocketNum) -> Option<T> {
        self.get(num)?.try_dequeue()
    }

    /// Blocks until something is enqueued on `num` or `timeout` elapses,
    /// then dequeues it. The socket lookup is cloned out of the table
    /// before waiting so a concurrent `close` of a different socket, or of
    /// this one by its owner, is never blocked on this call.
    pub fn dequeue_blocking(&self, num: SocketNum, timeout: Duration) -> Option<T> {
        let socket = self.get(num)?;
        if let Some(item) = socket.try_dequeue() {
            return Some(item);
        }
        let since = socket.arrived.read();
        if socket.arrived.wait_until_advanced(since, timeout) == EcWaitResult::TimedOut {
            return socket.try_dequeue();
        }
        socket.try_dequeue()
    }

    /// Delivers a packet destined for the raw-file socket, spilling to the
    /// overflow socket when the primary is full and counting drops when
    /// both are saturated.
    pub fn enqueue_file(&self, item: T) {
        let item = match self.enqueue(SOCKET_FILE, item) {
            Ok(()) => return,
            Err(item) => item,
        };
        if self.enqueue(SOCKET_OVERFLOW, item).is_err() {
            *self.overflow_counters.overflow_overflow.lock().unwrap() += 1;
        } else {
            *self.overflow_counters.file_overflow.lock().unwrap() += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_rejects_out_of_range_and_double_open() {
        let t: SocketTable<u32> = SocketTable::new(4);
        assert_eq!(t.open(0, 1), Err(OpenError::OutOfRange));
        assert_eq!(t.open(225, 1), Err(OpenError::OutOfRange));
        assert!(t.open(10, 1).is_ok());
        assert_eq!(t.open(10, 1), Err(OpenError::AlreadyOpen));
    }

    #[test]
    fn fifo_order_is_preserved() {
        let t: SocketTable<u32> = SocketTable::new(4);
        t.open(20, 1).unwrap();
        t.enqueue(20, 1).unwrap();
        t.enqueue(20, 2).unwrap();
        t.enqueue(20, 3).unwrap();
        assert_eq!(t.dequeue(20), Some(1));
        assert_eq!(t.dequeue(20), Some(2));
        assert_eq!(t.dequeue(20), Some(3));
        assert_eq!(t.dequeue(20), None);
    }

    #[test]
    fn close_all_for_removes_every_owned_socket() {
        let t: SocketTable<u32> = SocketTable::new(4);
        t.open(20, 1).unwrap();
        t.open(21, 1).unwrap();
        t.open(22, 2).unwrap();
        t.close_all_for(1);
        assert!(t.enqueue(20, 0).is_err());
        assert!(t.enqueue(21, 0).is_err());
        assert!(t.enqueue(22, 0).is_ok());
    }

    #[test]
    fn file_socket_spills_to_overflow_then_counts_drops() {
        let t: SocketTable<u32> = SocketTable::new(1);
        t.open(SOCKET_FILE, 1).unwrap();
        t.open(SOCKET_OVERFLOW, 1).unwrap();

        t.enqueue_file(100);
        assert_eq!(*t.overflow_counters.file_overflow.lock().unwrap(), 0);

        t.enqueue_file(101);
        assert_eq!(*t.overflow_counters.file_overflow.lock().unwrap(), 1);

        t.enqueue_file(102);
        assert_eq!(*t.overflow_counters.overflow_overflow.lock().unwrap(), 1);

        assert_eq!(t.dequeue(SOCKET_FILE), Some(100));
        assert_eq!(t.dequeue(SOCKET_OVERFLOW), Some(101));
    }

    #[test]
    fn allocate_picks_the_first_free_number_from_a_floor() {
        let t: SocketTable<u32> = SocketTable::new(4);
        t.open(20, 1).unwrap();
        let got = t.allocate(20, 2).unwrap();
        assert_eq!(got, 21);
        assert!(t.is_owner(21, 2));
    }
}
