use std::sync::Mutex;

pub const MAX_SHORT_ID: u16 = 64000;

struct Ids {
    short_id: u16,
    long_id: u32,
}

/// The packet-id allocator: one spin lock (independent of the numbered
/// lock-ordering set in `apollo_common::lock`) guarding a 16-bit id that
/// wraps `64000 -> 1` and a 32-bit id that never wraps. Both start at 1.
pub struct IdGenerator {
    state: Mutex<Ids>,
}

impl IdGenerator {
    pub fn new() -> Self {
        IdGenerator {
            state: Mutex::new(Ids { short_id: 1, long_id: 1 }),
        }
    }

    /// Returns the current short id and advances it, wrapping `64000` back
    /// to `1`.
    pub fn next_id(&self) -> u16 {
        let mut ids = self.state.lock().unwrap();
        let result = ids.short_id;
        ids.short_id = if ids.short_id >= MAX_SHORT_ID {
            1
        } else {
            ids.short_id + 1
        };
        result
    }

    /// Returns the current long id and advances it without wrapping.
    pub fn next_long_id(&self) -> u32 {
        let mut ids = self.state.lock().unwrap();
        let result = ids.long_id;
        ids.long_id = ids.long_id.wrapping_add(1);
        result
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_id_wraps_at_64000() {
        let gen = IdGenerator::new();
        for expected in 1..=MAX_SHORT_ID {
            assert_eq!(gen.next_id(), expected);
        }
        assert_eq!(gen.next_id(), 1);
    }

    #[test]
    fn long_id_does_not_wrap_on_the_same_schedule() {
        let gen = IdGenerator::new();
        assert_eq!(gen.next_long_id(), 1);
        assert_eq!(gen.next_long_id(), 2);
    }
}
