//! Priority holding area for outbound-to-server frames.

use bytes::Bytes;

struct Entry {
    raw: Bytes,
    priority: u8,
    seq: u64,
}

/// Orders by priority descending; within a priority class, FIFO by
/// insertion order (spec §3, §8 invariant 4).
#[derive(Default)]
pub struct PriorityQueue {
    entries: Vec<Entry>,
    next_seq: u64,
}

impl PriorityQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, raw: Bytes, priority: u8) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.push(Entry { raw, priority, seq });
    }

    /// Drains the queue, returning `(raw, priority)` pairs in
    /// priority-descending, insertion-ascending order. Priority travels with
    /// each entry so a caller that fails to forward a drained frame (e.g. a
    /// write failure right after reconnect) can re-push it at its original
    /// priority instead of demoting it.
    pub fn drain(&mut self) -> Vec<(Bytes, u8)> {
        let mut entries = std::mem::take(&mut self.entries);
        entries.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.seq.cmp(&b.seq)));
        entries.into_iter().map(|e| (e.raw, e.priority)).collect()
    }

    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
