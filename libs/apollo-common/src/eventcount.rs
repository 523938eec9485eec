use std::sync::{Condvar, Mutex};
use std::time::Duration;

/// An `EC_$WAIT`-style monotonically advancing counter. Waiters capture a
/// value with [`EventCount::read`] before checking a condition, then block
/// on [`EventCount::wait_until_advanced`] past that value if the condition
/// wasn't met; a concurrent [`EventCount::advance`] wakes them to recheck.
pub struct EventCount {
    value: Mutex<u64>,
    changed: Condvar,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum EcWaitResult {
    Advanced,
    TimedOut,
}

impl EventCount {
    pub fn new() -> Self {
        EventCount {
            value: Mutex::new(0),
            changed: Condvar::new(),
        }
    }

    pub fn read(&self) -> u64 {
        *self.value.lock().unwrap()
    }

    pub fn advance(&self) -> u64 {
        let mut v = self.value.lock().unwrap();
        *v = v.wrapping_add(1);
        self.changed.notify_all();
        *v
    }

    /// Blocks until the counter advances past `since`, or `timeout` elapses.
    pub fn wait_until_advanced(&self, since: u64, timeout: Duration) -> EcWaitResult {
        let guard = self.value.lock().unwrap();
        if *guard != since {
            return EcWaitResult::Advanced;
        }
        let (guard, result) = self
            .changed
            .wait_timeout_while(guard, timeout, |v| *v == since)
            .unwrap();
        if result.timed_out() && *guard == since {
            EcWaitResult::TimedOut
        } else {
            EcWaitResult::Advanced
        }
    }
}

impl Default for EventCount {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn advance_wakes_a_waiter() {
        let ec = Arc::new(EventCount::new());
        let since = ec.read();
        let waiter = {
            let ec = Arc::clone(&ec);
            thread::spawn(move || ec.wait_until_advanced(since, Duration::from_secs(5)))
        };
        thread::sleep(Duration::from_millis(20));
        ec.advance();
        assert_eq!(waiter.join().unwrap(), EcWaitResult::Advanced);
    }

    #[test]
    fn wait_times_out_without_advance() {
        let ec = EventCount::new();
        let since = ec.read();
        assert_eq!(
            ec.wait_until_advanced(since, Duration::from_millis(10)),
            EcWaitResult::TimedOut
        );
    }
}
