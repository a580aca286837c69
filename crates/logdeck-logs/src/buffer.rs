use std::collections::VecDeque;
use std::sync::Arc;

use logdeck_types::{ArcLogEntry, LogEntry, LogLevel};

/// Counts per log level, maintained incrementally on push and eviction
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LevelCounts {
    pub trace: usize,
    pub debug: usize,
    pub info: usize,
    pub warn: usize,
    pub error: usize,
}

impl LevelCounts {
    fn slot(&mut self, level: LogLevel) -> &mut usize {
        match level {
            LogLevel::Trace => &mut self.trace,
            LogLevel::Debug => &mut self.debug,
            LogLevel::Info => &mut self.info,
            LogLevel::Warn => &mut self.warn,
            LogLevel::Error => &mut self.error,
        }
    }

    fn increment(&mut self, level: LogLevel) {
        *self.slot(level) += 1;
    }

    fn decrement(&mut self, level: LogLevel) {
        let slot = self.slot(level);
        *slot = slot.saturating_sub(1);
    }

    pub fn get(&self, level: LogLevel) -> usize {
        match level {
            LogLevel::Trace => self.trace,
            LogLevel::Debug => self.debug,
            LogLevel::Info => self.info,
            LogLevel::Warn => self.warn,
            LogLevel::Error => self.error,
        }
    }

    pub fn total(&self) -> usize {
        self.trace + self.debug + self.info + self.warn + self.error
    }
}

/// Bounded FIFO ring buffer for log entries.
///
/// When a push would exceed the capacity the oldest entry is evicted. Survivors
/// keep their arrival order.
#[derive(Clone, Debug)]
pub struct LogBuffer {
    /// Internal storage - Arc avoids deep clones when readers take snapshots
    entries: VecDeque<ArcLogEntry>,

    /// Maximum capacity (at least 1)
    capacity: usize,

    /// Level counts for the entries currently held
    level_counts: LevelCounts,

    /// Number of entries ever pushed; survives `clear`
    pushed_total: u64,

    /// Bumped on every change to the contents, keys filter caches
    revision: u64,
}

impl LogBuffer {
    /// Create a new log buffer with the given capacity
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity.min(4096)),
            capacity,
            level_counts: LevelCounts::default(),
            pushed_total: 0,
            revision: 0,
        }
    }

    /// Push a single entry, evicting the oldest if at capacity.
    /// Returns the number of evicted entries.
    pub fn push(&mut self, entry: LogEntry) -> usize {
        self.push_batch(std::iter::once(entry))
    }

    /// Push entries in order, evicting from the front as needed.
    /// Returns the number of evicted entries.
    pub fn push_batch<I>(&mut self, batch: I) -> usize
    where
        I: IntoIterator<Item = LogEntry>,
    {
        let mut evicted = 0;
        let mut pushed = false;

        for entry in batch {
            if self.entries.len() >= self.capacity {
                if let Some(old) = self.entries.pop_front() {
                    self.level_counts.decrement(old.level);
                    evicted += 1;
                }
            }
            self.level_counts.increment(entry.level);
            self.entries.push_back(Arc::new(entry));
            self.pushed_total += 1;
            pushed = true;
        }

        if pushed {
            self.revision += 1;
        }
        evicted
    }

    /// Change the capacity, evicting the oldest entries if it shrank.
    /// Returns the number of evicted entries.
    pub fn set_capacity(&mut self, capacity: usize) -> usize {
        self.capacity = capacity.max(1);

        let mut evicted = 0;
        while self.entries.len() > self.capacity {
            if let Some(old) = self.entries.pop_front() {
                self.level_counts.decrement(old.level);
                evicted += 1;
            }
        }

        if evicted > 0 {
            self.revision += 1;
        }
        evicted
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total entry count
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if buffer is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Number of entries ever pushed, including evicted and cleared ones
    pub fn pushed_total(&self) -> u64 {
        self.pushed_total
    }

    /// Sequence number of the oldest entry still held
    pub fn first_sequence(&self) -> u64 {
        self.pushed_total - self.entries.len() as u64
    }

    /// Get entry count per log level
    pub fn level_counts(&self) -> LevelCounts {
        self.level_counts
    }

    pub fn iter(&self) -> impl Iterator<Item = &ArcLogEntry> {
        self.entries.iter()
    }

    /// Get all entries (Arc clones are cheap)
    pub fn all(&self) -> Vec<ArcLogEntry> {
        self.entries.iter().cloned().collect()
    }

    /// Clear all entries
    pub fn clear(&mut self) {
        if self.entries.is_empty() {
            return;
        }
        self.entries.clear();
        self.level_counts = LevelCounts::default();
        self.revision += 1;
    }

    /// Get the last N entries
    pub fn tail(&self, n: usize) -> Vec<ArcLogEntry> {
        let start = self.entries.len().saturating_sub(n);
        self.entries.iter().skip(start).cloned().collect()
    }

    /// Get entries in a range (for virtual scrolling)
    pub fn range(&self, start: usize, count: usize) -> Vec<ArcLogEntry> {
        self.entries.iter().skip(start).take(count).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(n: i64) -> LogEntry {
        LogEntry::new(n, LogLevel::Info, format!("e{n}"))
    }

    fn messages(buffer: &LogBuffer) -> Vec<String> {
        buffer.iter().map(|e| e.message.clone()).collect()
    }

    #[test]
    fn test_evicts_oldest_one_at_a_time() {
        let mut buffer = LogBuffer::new(3);
        for n in 1..=4 {
            buffer.push(entry(n));
        }
        assert_eq!(messages(&buffer), vec!["e2", "e3", "e4"]);
    }

    #[test]
    fn test_batch_keeps_most_recent() {
        let mut buffer = LogBuffer::new(4);
        buffer.push_batch((1..=3).map(entry));
        let evicted = buffer.push_batch((4..=9).map(entry));

        assert_eq!(evicted, 5);
        assert_eq!(messages(&buffer), vec!["e6", "e7", "e8", "e9"]);
        assert_eq!(buffer.pushed_total(), 9);
        assert_eq!(buffer.first_sequence(), 5);
    }

    #[test]
    fn test_len_never_exceeds_capacity() {
        let mut buffer = LogBuffer::new(5);
        for batch_len in [0, 1, 7, 2, 11, 3] {
            buffer.push_batch((0..batch_len).map(entry));
            assert!(buffer.len() <= buffer.capacity());
        }
    }

    #[test]
    fn test_level_counts_track_eviction() {
        let mut buffer = LogBuffer::new(2);
        buffer.push(LogEntry::new(1, LogLevel::Error, "a"));
        buffer.push(LogEntry::new(2, LogLevel::Info, "b"));
        buffer.push(LogEntry::new(3, LogLevel::Warn, "c"));

        let counts = buffer.level_counts();
        assert_eq!(counts.error, 0);
        assert_eq!(counts.info, 1);
        assert_eq!(counts.warn, 1);
        assert_eq!(counts.total(), buffer.len());
    }

    #[test]
    fn test_shrinking_capacity_evicts() {
        let mut buffer = LogBuffer::new(10);
        buffer.push_batch((1..=6).map(entry));
        let revision = buffer.revision();

        assert_eq!(buffer.set_capacity(4), 2);
        assert_eq!(messages(&buffer), vec!["e3", "e4", "e5", "e6"]);
        assert!(buffer.revision() > revision);
    }

    #[test]
    fn test_clear_keeps_sequence() {
        let mut buffer = LogBuffer::new(10);
        buffer.push_batch((1..=3).map(entry));
        buffer.clear();

        assert!(buffer.is_empty());
        assert_eq!(buffer.level_counts().total(), 0);
        assert_eq!(buffer.pushed_total(), 3);
        assert_eq!(buffer.first_sequence(), 3);
    }

    #[test]
    fn test_tail_and_range() {
        let mut buffer = LogBuffer::new(10);
        buffer.push_batch((1..=5).map(entry));

        let tail: Vec<_> = buffer.tail(2).iter().map(|e| e.timestamp).collect();
        assert_eq!(tail, vec![4, 5]);
        let range: Vec<_> = buffer.range(1, 2).iter().map(|e| e.timestamp).collect();
        assert_eq!(range, vec![2, 3]);
    }
}
