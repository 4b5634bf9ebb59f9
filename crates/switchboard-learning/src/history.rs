use crate::types::SwitchRecord;
use std::collections::VecDeque;

/// Bounded ring buffer of switch records, oldest evicted first.
#[derive(Debug, Clone)]
pub struct SwitchHistory {
    entries: VecDeque<SwitchRecord>,
    capacity: usize,
}

impl SwitchHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    /// Append a record. Returns the evicted record when the buffer was full.
    pub fn push(&mut self, record: SwitchRecord) -> Option<SwitchRecord> {
        let evicted = if self.entries.len() >= self.capacity {
            self.entries.pop_front()
        } else {
            None
        };
        self.entries.push_back(record);
        evicted
    }

    /// The last `n` records in chronological order.
    pub fn recent(&self, n: usize) -> Vec<&SwitchRecord> {
        let skip = self.entries.len().saturating_sub(n);
        self.entries.iter().skip(skip).collect()
    }

    /// Fraction of successful switches among the last `window` records.
    pub fn success_rate(&self, window: usize) -> Option<f64> {
        let recent = self.recent(window);
        if recent.is_empty() {
            return None;
        }
        let ok = recent.iter().filter(|r| r.result.success).count();
        Some(ok as f64 / recent.len() as f64)
    }

    /// Mean switch duration over the last `window` records.
    pub fn average_duration_ms(&self, window: usize) -> Option<f64> {
        let recent = self.recent(window);
        if recent.is_empty() {
            return None;
        }
        let total: u64 = recent.iter().map(|r| r.result.duration_ms).sum();
        Some(total as f64 / recent.len() as f64)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
