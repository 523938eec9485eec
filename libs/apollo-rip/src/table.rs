//! The two parallel routing tables ("standard" and "non-standard"), each
//! keyed by network id with one entry per network. Split-horizon
//! distance-vector update rules live here; the server (`server.rs`) drives
//! them from incoming packets and the aging timer (`timer.rs`) drives them
//! from the clock.

use apollo_common::NodeId;
use apollo_pkt::Port;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum TableClass {
    Standard,
    NonStandard,
}

impl TableClass {
    pub fn infinity(self) -> u8 {
        match self {
            TableClass::Standard => 17,
            TableClass::NonStandard => 16,
        }
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum RouteState {
    Valid,
    Aging,
    Dead,
}

/// Ticks a valid entry survives without a refresh before it moves to
/// `Aging`, and an aging entry survives before it is reclaimed. The
/// original's "few seconds" is left unquantified; these are chosen to keep
/// unit tests driving the timer by hand fast and deterministic.
pub const AGE_TICKS_VALID: u32 = 3;
pub const AGE_TICKS_AGING: u32 = 3;

#[derive(Clone, Debug)]
pub struct RouteEntry {
    pub metric: u8,
    pub port: Port,
    pub next_hop: NodeId,
    pub state: RouteState,
    age: u32,
}

/// One routing table: network id -> entry, plus the recent-changes flag
/// that `send_updates` consults and clears.
pub struct RoutingTable {
    class: TableClass,
    entries: Mutex<HashMap<u32, RouteEntry>>,
    recent_changes: AtomicBool,
}

impl RoutingTable {
    pub fn new(class: TableClass) -> Self {
        RoutingTable { class, entries: Mutex::new(HashMap::new()), recent_changes: AtomicBool::new(false) }
    }

    pub fn class(&self) -> TableClass {
        self.class
    }

    pub fn recent_changes(&self) -> bool {
        self.recent_changes.load(Ordering::Acquire)
    }

    pub fn clear_recent_changes(&self) {
        self.recent_changes.store(false, Ordering::Release);
    }

    fn mark_changed(&self) {
        self.recent_changes.store(true, Ordering::Release);
    }

    pub fn lookup(&self, network: u32) -> Option<RouteEntry> {
        self.entries.lock().unwrap().get(&network).cloned()
    }

    pub fn entries_snapshot(&self) -> Vec<(u32, RouteEntry)> {
        self.entries.lock().unwrap().iter().map(|(k, v)| (*k, v.clone())).collect()
    }

    /// Standard split-horizon distance-vector update. `port` is the port the
    /// announcement arrived on; `next_hop` is the advertising node.
    ///
    /// - metric >= this class's infinity: mark the existing entry aging.
    /// - metric strictly better, or equal from the entry's own next-hop
    ///   port (poison-reverse refresh): install/refresh.
    /// - otherwise: ignored.
    pub fn update_int(&self, network: u32, next_hop: NodeId, metric: u8, port: Port) {
        let inf = self.class.infinity();
        let mut entries = self.entries.lock().unwrap();
        match entries.get_mut(&network) {
            Some(entry) => {
                if metric >= inf {
                    if entry.state != RouteState::Dead {
                        entry.state = RouteState::Aging;
                        drop(entries);
                        self.mark_changed();
                    }
                } else if metric < entry.metric || (metric == entry.metric && entry.port == port) {
                    entry.metric = metric;
                    entry.port = port;
                    entry.next_hop = next_hop;
                    entry.state = RouteState::Valid;
                    entry.age = AGE_TICKS_VALID;
                    drop(entries);
                    self.mark_changed();
                }
            }
            None => {
                if metric < inf {
                    entries.insert(
                        network,
                        RouteEntry { metric, port, next_hop, state: RouteState::Valid, age: AGE_TICKS_VALID },
                    );
                    drop(entries);
                    self.mark_changed();
                }
            }
        }
    }

    /// Retracts `network` by forcing it to the infinity metric, used when a
    /// response's source-network disagrees with the port's recorded
    /// network and the old one must be withdrawn first.
    pub fn retract(&self, network: u32, port: Port) {
        let inf = self.class.infinity();
        self.update_int(network, 0, inf, port);
    }

    /// One aging-timer tick: decrements age on `Valid`/`Aging` entries,
    /// transitions `Valid -> Aging -> Dead` on expiry, and reclaims `Dead`
    /// entries. Returns whether any transition happened (for logging).
    pub fn tick(&self) -> bool {
        let mut entries = self.entries.lock().unwrap();
        let mut changed = false;
        entries.retain(|_, entry| {
            match entry.state {
                RouteState::Valid => {
                    entry.age = entry.age.saturating_sub(1);
                    if entry.age == 0 {
                        entry.state = RouteState::Aging;
                        entry.age = AGE_TICKS_AGING;
                        changed = true;
                    }
                    true
                }
                RouteState::Aging => {
                    entry.age = entry.age.saturating_sub(1);
                    if entry.age == 0 {
                        entry.state = RouteState::Dead;
                        changed = true;
                        false
                    } else {
                        true
                    }
                }
                RouteState::Dead => false,
            }
        });
        if changed {
            drop(entries);
            self.mark_changed();
        }
        changed
    }

    /// Count of entries still carrying a usable route (not dead), used by
    /// the halt check's "last port" logic in `server.rs`.
    pub fn live_count(&self) -> usize {
        self.entries.lock().unwrap().values().filter(|e| e.state != RouteState::Dead).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn better_metric_installs_and_marks_changed() {
        let t = RoutingTable::new(TableClass::Standard);
        t.update_int(10, 100, 3, 1);
        let entry = t.lookup(10).unwrap();
        assert_eq!(entry.metric, 3);
        assert_eq!(entry.state, RouteState::Valid);
        assert!(t.recent_changes());
    }

    #[test]
    fn worse_metric_from_a_different_port_is_ignored() {
        let t = RoutingTable::new(TableClass::Standard);
        t.update_int(10, 100, 3, 1);
        t.clear_recent_changes();
        t.update_int(10, 200, 5, 2);
        let entry = t.lookup(10).unwrap();
        assert_eq!(entry.metric, 3);
        assert_eq!(entry.next_hop, 100);
        assert!(!t.recent_changes());
    }

    #[test]
    fn equal_metric_refresh_from_the_owning_port_is_accepted() {
        let t = RoutingTable::new(TableClass::Standard);
        t.update_int(10, 100, 3, 1);
        t.clear_recent_changes();
        t.update_int(10, 100, 3, 1);
        assert!(t.recent_changes());
    }

    #[test]
    fn infinity_metric_ages_an_existing_entry_without_removing_it() {
        let t = RoutingTable::new(TableClass::Standard);
        t.update_int(10, 100, 3, 1);
        t.update_int(10, 100, 17, 1);
        let entry = t.lookup(10).unwrap();
        assert_eq!(entry.state, RouteState::Aging);
    }

    #[test]
    fn tick_ages_then_kills_then_reclaims() {
        let t = RoutingTable::new(TableClass::Standard);
        t.update_int(10, 100, 3, 1);
        for _ in 0..AGE_TICKS_VALID {
            t.tick();
        }
        assert_eq!(t.lookup(10).unwrap().state, RouteState::Aging);
        for _ in 0..AGE_TICKS_AGING {
            t.tick();
        }
        assert!(t.lookup(10).is_none());
    }
}
