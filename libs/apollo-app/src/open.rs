//! `APP_$STD_OPEN`: one-time registration of the protocol channel the link
//! layer calls back into for every received packet.

use apollo_common::Status;
use std::sync::Mutex;

pub const APP_PROTOCOL: u16 = 0x0499;

/// A handle for whatever ID the link layer assigns the registered channel.
pub type ChannelId = u32;

/// Registers [`APP_PROTOCOL`] with the link layer, handing it the demux
/// entry point. A real link layer would be an IPC peer; tests use a plain
/// closure-backed stand-in.
pub trait ChannelRegistry: Send + Sync {
    fn register(&self, protocol: u16) -> Result<ChannelId, Status>;
}

/// Holds the channel id handed back by registration. `std_open` is
/// idempotent: calling it again after a successful open just returns the
/// stored id without registering a second time.
#[derive(Default)]
pub struct AppState {
    channel: Mutex<Option<ChannelId>>,
}

impl AppState {
    pub fn new() -> Self {
        AppState { channel: Mutex::new(None) }
    }

    pub fn channel(&self) -> Option<ChannelId> {
        *self.channel.lock().unwrap()
    }

    pub fn std_open(&self, registry: &dyn ChannelRegistry) -> Result<ChannelId, Status> {
        let mut slot = self.channel.lock().unwrap();
        if let Some(existing) = *slot {
            return Ok(existing);
        }
        let id = registry.register(APP_PROTOCOL)?;
        *slot = Some(id);
        Ok(id)
    }
}
