//! APP: the receive-side demultiplexer. `APP_$STD_OPEN` registers the
//! protocol channel the link layer calls back through; `APP_$RECEIVE`
//! decodes a packet descriptor into its fixed 44-byte result; `APP_$DEMUX`
//! is the callback itself, routing each arrival to its destination socket
//! with `FILE`/`OVERFLOW` spillover.

mod demux;
mod header;
mod open;

pub use demux::{app_demux, DemuxOutcome};
pub use header::{app_receive, AppHeader, INLINE_THRESHOLD, RESULT_LEN};
pub use open::{AppState, ChannelId, ChannelRegistry, APP_PROTOCOL};
