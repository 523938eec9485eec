use std::cell::RefCell;
use std::sync::{Mutex, MutexGuard};

/// The numbered locks that participate in the fixed acquisition order.
/// Taking them out of order is a programming error, not a recoverable
/// runtime condition; in debug builds it panics immediately rather than
/// risking a deadlock that only shows up under load.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug)]
pub struct LockId(pub u32);

impl LockId {
    pub const NETBUF: LockId = LockId(4);
    pub const SOCKET: LockId = LockId(5);
    pub const HINT: LockId = LockId(0x0D);
    pub const RIP: LockId = LockId(0x13);
    pub const DIR: LockId = LockId(0x14);
    pub const APP: LockId = LockId(0x18);
}

#[derive(Debug)]
pub struct LockOrderingViolation {
    pub held: LockId,
    pub attempted: LockId,
}

impl core::fmt::Display for LockOrderingViolation {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "attempted to acquire lock {:?} while holding {:?}, which violates the required increasing order",
            self.attempted, self.held
        )
    }
}

impl std::error::Error for LockOrderingViolation {}

thread_local! {
    static HELD: RefCell<Vec<LockId>> = RefCell::new(Vec::new());
}

/// A mutex tagged with its position in the numbered-lock order. Acquiring
/// one while already holding a lock with an equal or higher id panics in
/// debug builds; release order is unconstrained.
pub struct SpinLock<T> {
    id: LockId,
    inner: Mutex<T>,
}

pub struct LockGuard<'a, T> {
    id: LockId,
    inner: Option<MutexGuard<'a, T>>,
}

impl<T> SpinLock<T> {
    pub const fn new(id: LockId, value: T) -> Self {
        SpinLock {
            id,
            inner: Mutex::new(value),
        }
    }

    pub fn lock(&self) -> LockGuard<'_, T> {
        check_order(self.id);
        let guard = self.inner.lock().unwrap();
        HELD.with(|h| h.borrow_mut().push(self.id));
        LockGuard {
            id: self.id,
            inner: Some(guard),
        }
    }
}

#[cfg(debug_assertions)]
fn check_order(id: LockId) {
    HELD.with(|h| {
        if let Some(&held) = h.borrow().last() {
            if held.0 >= id.0 {
                panic!(
                    "{}",
                    LockOrderingViolation {
                        held,
                        attempted: id,
                    }
                );
            }
        }
    });
}

#[cfg(not(debug_assertions))]
fn check_order(_id: LockId) {}

impl<'a, T> Drop for LockGuard<'a, T> {
    fn drop(&mut self) {
        self.inner.take();
        HELD.with(|h| {
            let mut held = h.borrow_mut();
            if let Some(pos) = held.iter().rposition(|&x| x.0 == self.id.0) {
                held.remove(pos);
            }
        });
    }
}

impl<'a, T> core::ops::Deref for LockGuard<'a, T> {
    type Target = T;
    fn deref(&self) -> &T {
        self.inner.as_ref().unwrap()
    }
}

impl<'a, T> core::ops::DerefMut for LockGuard<'a, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.inner.as_mut().unwrap()
    }
}
