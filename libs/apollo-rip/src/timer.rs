//! The coarse aging timer: ticks both tables every interval, reclaiming
//! dead routes, and fires a broadcast whenever a tick (or anything else)
//! left a table's recent-changes flag set.

use crate::server::RipState;
use crate::table::TableClass;
use apollo_netbuf::NetbufPool;
use apollo_pkt::LinkLayer;
use std::time::Duration;

pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(5);

/// Drives the aging timer until `should_stop` reports true. Intended to run
/// on its own server process alongside [`crate::server::RipState::handle_packet`]
/// processing the same [`RipState`].
pub fn run_aging_timer(
    state: &RipState,
    netbuf: &NetbufPool,
    link: &dyn LinkLayer,
    interval: Duration,
    should_stop: impl Fn() -> bool,
) {
    while !should_stop() {
        std::thread::sleep(interval);
        state.standard().tick();
        state.non_standard().tick();
        if let Err(status) = state.send_updates(TableClass::Standard, netbuf, link) {
            log::warn!("rip timer: standard broadcast failed: {status}");
        }
        if let Err(status) = state.send_updates(TableClass::NonStandard, netbuf, link) {
            log::warn!("rip timer: non-standard broadcast failed: {status}");
        }
    }
}
