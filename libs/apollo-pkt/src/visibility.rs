use apollo_common::NodeId;
use std::sync::Mutex;

pub const MAX_MISSING_NODES: usize = 10;

struct Entry {
    node_id: NodeId,
    seq: u64,
}

struct Inner {
    entries: Vec<Entry>,
    seq_counter: u64,
}

/// Tracks nodes that recently failed to answer, so retry logic can skip a
/// ping to a node already known to be unreachable. Bounded to
/// [`MAX_MISSING_NODES`] entries; eviction drops the lowest sequence
/// number, i.e. the least-recently-marked-missing entry.
pub struct MissingNodeTable {
    inner: Mutex<Inner>,
}

impl MissingNodeTable {
    pub fn new() -> Self {
        MissingNodeTable {
            inner: Mutex::new(Inner {
                entries: Vec::with_capacity(MAX_MISSING_NODES),
                seq_counter: 0,
            }),
        }
    }

    pub fn recently_missing(&self, node_id: NodeId) -> bool {
        let inner = self.inner.lock().unwrap();
        inner.entries.iter().any(|e| e.node_id == node_id)
    }

    /// `is_visible = true`: the node just answered, so bump or insert its
    /// entry. `is_visible = false`: the node is unreachable, so drop its
    /// entry if present (a no-op if it was never tracked).
    pub fn note_visible(&self, node_id: NodeId, is_visible: bool) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(pos) = inner.entries.iter().position(|e| e.node_id == node_id) {
            if is_visible {
                inner.seq_counter += 1;
                let seq = inner.seq_counter;
                inner.entries[pos].seq = seq;
            } else {
                inner.entries.swap_remove(pos);
            }
            return;
        }

        if !is_visible {
            return;
        }

        if inner.entries.len() >= MAX_MISSING_NODES {
            let oldest = inner
                .entries
                .iter()
                .enumerate()
                .min_by_key(|(_, e)| e.seq)
                .map(|(i, _)| i)
                .expect("capacity > 0 guarantees a minimum exists once full");
            inner.entries.remove(oldest);
        }

        inner.seq_counter += 1;
        let seq = inner.seq_counter;
        inner.entries.push(Entry { node_id, seq });
    }

    #[cfg(test)]
    fn contains(&self, node_id: NodeId) -> bool {
        self.recently_missing(node_id)
    }
}

impl Default for MissingNodeTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recently_missing_is_false_until_marked() {
        let t = MissingNodeTable::new();
        assert!(!t.recently_missing(7));
        t.note_visible(7, true);
        assert!(t.contains(7));
    }

    #[test]
    fn note_visible_false_removes_an_existing_entry() {
        let t = MissingNodeTable::new();
        t.note_visible(7, true);
        t.note_visible(7, false);
        assert!(!t.contains(7));
    }

    #[test]
    fn note_visible_false_on_unknown_node_is_a_no_op() {
        let t = MissingNodeTable::new();
        t.note_visible(99, false);
        assert!(!t.contains(99));
    }

    #[test]
    fn eleventh_insert_evicts_the_lowest_sequence_entry() {
        let t = MissingNodeTable::new();
        for n in 1..=11u32 {
            t.note_visible(n, true);
        }
        assert!(!t.contains(1));
        for n in 2..=11u32 {
            assert!(t.contains(n));
        }
    }
}
