use std::sync::atomic::{AtomicU64, Ordering};

/// Traffic counters for a ring.
///
/// Uses atomic counters with `Relaxed` ordering since these are purely
/// statistical - no control flow depends on exact values, and eventual
/// visibility is acceptable for observability.
#[derive(Debug)]
pub struct Metrics {
    messages_sent: AtomicU64,
    messages_received: AtomicU64,
    batches_sent: AtomicU64,
    batches_received: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            messages_sent: AtomicU64::new(0),
            messages_received: AtomicU64::new(0),
            batches_sent: AtomicU64::new(0),
            batches_received: AtomicU64::new(0),
        }
    }

    /// Increment messages sent counter.
    #[inline]
    pub fn add_messages_sent(&self, n: u64) {
        self.messages_sent.fetch_add(n, Ordering::Relaxed);
    }

    /// Increment batches sent counter.
    #[inline]
    pub fn add_batches_sent(&self, n: u64) {
        self.batches_sent.fetch_add(n, Ordering::Relaxed);
    }

    /// Increment messages received counter.
    #[inline]
    pub fn add_messages_received(&self, n: u64) {
        self.messages_received.fetch_add(n, Ordering::Relaxed);
    }

    /// Increment batches received counter.
    #[inline]
    pub fn add_batches_received(&self, n: u64) {
        self.batches_received.fetch_add(n, Ordering::Relaxed);
    }

    /// Take a snapshot of current metrics values.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            batches_sent: self.batches_sent.load(Ordering::Relaxed),
            batches_received: self.batches_received.load(Ordering::Relaxed),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// A point-in-time snapshot of traffic counters.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsSnapshot {
    pub messages_sent: u64,
    pub messages_received: u64,
    pub batches_sent: u64,
    pub batches_received: u64,
}

/// Hit counters for the reorderer.
///
/// `processed` counts every message drained from the source. Each drained
/// message that is eventually emitted shows up in exactly one of the three
/// hit counters: `direct_hits` (emitted on arrival), `fast_buffer_hits`
/// (staged in the fast buffer first), or `overflow_hits` (staged in the
/// overflow map first). Late duplicates are dropped and appear in none.
#[derive(Debug, Default)]
pub struct ReorderStats {
    processed: AtomicU64,
    direct_hits: AtomicU64,
    fast_buffer_hits: AtomicU64,
    overflow_hits: AtomicU64,
    max_disordered: AtomicU64,
}

impl ReorderStats {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub(crate) fn add_processed(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn add_direct_hit(&self) {
        self.direct_hits.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn add_fast_buffer_hit(&self) {
        self.fast_buffer_hits.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn add_overflow_hit(&self) {
        self.overflow_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Record the distance between an early arrival and the current
    /// expectation. Monotonically non-decreasing.
    #[inline]
    pub(crate) fn note_disordered(&self, distance: u64) {
        self.max_disordered.fetch_max(distance, Ordering::Relaxed);
    }

    /// Take a snapshot of current counter values.
    pub fn snapshot(&self) -> ReorderStatsSnapshot {
        ReorderStatsSnapshot {
            processed: self.processed.load(Ordering::Relaxed),
            direct_hits: self.direct_hits.load(Ordering::Relaxed),
            fast_buffer_hits: self.fast_buffer_hits.load(Ordering::Relaxed),
            overflow_hits: self.overflow_hits.load(Ordering::Relaxed),
            max_disordered: self.max_disordered.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time snapshot of reorderer counters.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReorderStatsSnapshot {
    /// Messages drained from the source.
    pub processed: u64,
    /// Messages emitted the moment they arrived.
    pub direct_hits: u64,
    /// Messages emitted out of the fast staging buffer.
    pub fast_buffer_hits: u64,
    /// Messages emitted out of the overflow map.
    pub overflow_hits: u64,
    /// Largest observed gap between an arrival and the expected sequence.
    pub max_disordered: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_snapshot() {
        let m = Metrics::new();
        m.add_messages_sent(10);
        m.add_batches_sent(1);
        m.add_messages_received(7);
        m.add_batches_received(2);

        let snap = m.snapshot();
        assert_eq!(snap.messages_sent, 10);
        assert_eq!(snap.batches_sent, 1);
        assert_eq!(snap.messages_received, 7);
        assert_eq!(snap.batches_received, 2);
    }

    #[test]
    fn test_reorder_stats_max_disordered_is_monotonic() {
        let stats = ReorderStats::new();
        stats.note_disordered(5);
        stats.note_disordered(3);
        assert_eq!(stats.snapshot().max_disordered, 5);
        stats.note_disordered(9);
        assert_eq!(stats.snapshot().max_disordered, 9);
    }
}
