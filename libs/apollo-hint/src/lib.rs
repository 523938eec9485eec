//! The route-hint cache: a UID keeps an ordered list of (node, port) pairs
//! that have answered for it before, most-recently-successful first, plus
//! a coarser per-network list keyed by a UID's low-20-bit network-hint
//! index for UIDs the cache has never seen directly.

use apollo_common::{NodeId, Uid};
use std::collections::HashMap;
use std::sync::Mutex;

pub type Port = u8;

#[derive(Default)]
struct Inner {
    by_uid: HashMap<Uid, Vec<(NodeId, Port)>>,
    by_net: HashMap<u32, Vec<(NodeId, Port)>>,
}

pub struct HintCache {
    inner: Mutex<Inner>,
}

impl HintCache {
    pub fn new() -> Self {
        HintCache {
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Hints for `uid`, most-recently-successful first. UID-specific hints
    /// come before the broader net-level list so a direct hit always wins.
    pub fn get_hints(&self, uid: Uid) -> Vec<(NodeId, Port)> {
        let inner = self.inner.lock().unwrap();
        let mut hints = inner.by_uid.get(&uid).cloned().unwrap_or_default();
        if let Some(net_hints) = inner.by_net.get(&uid.net_hint_index()) {
            for &h in net_hints {
                if !hints.contains(&h) {
                    hints.push(h);
                }
            }
        }
        hints
    }

    /// Records that `(node, port)` answered for `uid`. If the pair is
    /// already present it is promoted to the head instead of duplicated.
    pub fn add_hint(&self, uid: Uid, node: NodeId, port: Port) {
        let mut inner = self.inner.lock().unwrap();
        let list = inner.by_uid.entry(uid).or_default();
        list.retain(|&h| h != (node, port));
        list.insert(0, (node, port));
    }

    /// Registers a (node, port) pair at the network-hint-index granularity,
    /// used for UIDs this cache has never resolved directly.
    pub fn add_net(&self, net_hint_index: u32, node: NodeId, port: Port) {
        let mut inner = self.inner.lock().unwrap();
        let list = inner.by_net.entry(net_hint_index).or_default();
        list.retain(|&h| h != (node, port));
        list.insert(0, (node, port));
    }
}

impl Default for HintCache {
    fn default() -> Self {
        Self::new()
    }
}
