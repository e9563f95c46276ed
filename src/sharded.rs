use crate::{Config, MetricsSnapshot, Reservation, Ring};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Items drained from one shard per bulk-pop round before moving on.
/// Caps how long a hot shard can starve the others.
const SHARD_DRAIN_LIMIT: usize = 32;

/// Error types for sharded queue operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum QueueError {
    /// Too many producers registered (exceeds max_producers config).
    #[error("too many producers registered (max: {max})")]
    TooManyProducers {
        /// The configured maximum number of producers.
        max: usize,
    },
    /// Queue is closed.
    #[error("queue is closed")]
    Closed,
}

/// Many-producer single-consumer queue built from per-producer SPSC rings.
///
/// Each producer registers once and receives a [`ShardProducer`] token bound
/// to a dedicated shard, eliminating producer-producer contention entirely.
/// Per-producer FIFO holds on each shard; there is no global order across
/// producers. The consumer drains shards round-robin.
///
/// Consumer-side methods (`pop`, `pop_bulk`, `consume_all`) must be called
/// from one thread at a time.
pub struct ShardedMpsc<T> {
    inner: Arc<SharedShards<T>>,
}

struct SharedShards<T> {
    shards: Vec<Ring<T>>,
    producer_count: AtomicUsize,
    round_robin: AtomicUsize,
    closed: AtomicBool,
    config: Config,
}

impl<T> ShardedMpsc<T> {
    /// Creates a new sharded queue with `config.max_producers` shards of
    /// `config.cells()` cells each.
    pub fn new(config: Config) -> Self {
        let mut shards = Vec::with_capacity(config.max_producers);
        for _ in 0..config.max_producers {
            shards.push(Ring::new(config));
        }

        Self {
            inner: Arc::new(SharedShards {
                shards,
                producer_count: AtomicUsize::new(0),
                round_robin: AtomicUsize::new(0),
                closed: AtomicBool::new(false),
                config,
            }),
        }
    }

    /// Register a new producer, claiming the next free shard.
    ///
    /// Fails with `TooManyProducers` once every shard is claimed: rejecting
    /// the overflow up front is what keeps each shard single-producer.
    pub fn register(&self) -> Result<ShardProducer<T>, QueueError> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(QueueError::Closed);
        }

        let id = self.inner.producer_count.fetch_add(1, Ordering::SeqCst);
        if id >= self.inner.config.max_producers {
            self.inner.producer_count.fetch_sub(1, Ordering::SeqCst);
            return Err(QueueError::TooManyProducers {
                max: self.inner.config.max_producers,
            });
        }

        debug!(shard = id, "producer registered");

        Ok(ShardProducer {
            shards: Arc::clone(&self.inner),
            id,
        })
    }

    /// Number of shards that currently have a registered producer.
    fn registered(&self) -> usize {
        self.inner
            .producer_count
            .load(Ordering::Acquire)
            .min(self.inner.config.max_producers)
    }

    /// Pop one item, scanning shards round-robin from the cursor.
    ///
    /// The first non-empty shard yields one item and the cursor advances to
    /// its successor. Returns None after a full idle sweep.
    pub fn pop(&self) -> Option<T> {
        let count = self.registered();
        let start = self.inner.round_robin.load(Ordering::Relaxed);

        for i in 0..count {
            let idx = (start + i) % count;
            if let Some(item) = self.inner.shards[idx].pop() {
                self.inner
                    .round_robin
                    .store((idx + 1) % count, Ordering::Relaxed);
                return Some(item);
            }
        }
        None
    }

    /// Pop up to `out.len()` items across shards.
    ///
    /// Each visited shard yields at most [`SHARD_DRAIN_LIMIT`] items per
    /// sweep so one busy shard cannot starve the rest.
    pub fn pop_bulk(&self, out: &mut [T]) -> usize
    where
        T: Copy,
    {
        let count = self.registered();
        if count == 0 || out.is_empty() {
            return 0;
        }

        let start = self.inner.round_robin.load(Ordering::Relaxed);
        let mut total = 0;

        for i in 0..count {
            if total >= out.len() {
                break;
            }
            let idx = (start + i) % count;
            let want = (out.len() - total).min(SHARD_DRAIN_LIMIT);
            let got = self.inner.shards[idx].pop_bulk(&mut out[total..total + want]);
            total += got;

            if got > 0 {
                self.inner
                    .round_robin
                    .store((idx + 1) % count, Ordering::Relaxed);
            }
        }

        total
    }

    /// Drain every visible item from every shard with one tail update per
    /// shard. Prefers lower shard ids; use `pop`/`pop_bulk` when fairness
    /// between shards matters.
    pub fn consume_all<F>(&self, mut handler: F) -> usize
    where
        F: FnMut(&T),
    {
        let count = self.registered();
        let mut total = 0;

        for shard in &self.inner.shards[..count] {
            total += shard.consume_batch(&mut handler);
        }

        total
    }

    /// Total items across all shards. Observational.
    pub fn len(&self) -> usize {
        let count = self.registered();
        self.inner.shards[..count].iter().map(Ring::len).sum()
    }

    /// Returns true if every shard is empty. Observational.
    pub fn is_empty(&self) -> bool {
        let count = self.registered();
        self.inner.shards[..count].iter().all(Ring::is_empty)
    }

    /// Total usable capacity across all shards.
    pub fn capacity(&self) -> usize {
        self.inner.config.max_producers * (self.inner.config.cells() - 1)
    }

    /// Close the queue and all shards.
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
        for shard in &self.inner.shards {
            shard.close();
        }
    }

    /// Returns true if the queue is closed.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Returns the number of registered producers.
    pub fn producer_count(&self) -> usize {
        self.registered()
    }

    /// Aggregated traffic counters across all shards, if enabled.
    pub fn metrics(&self) -> MetricsSnapshot {
        let mut total = MetricsSnapshot::default();
        let count = self.registered();

        for shard in &self.inner.shards[..count] {
            let m = shard.metrics();
            total.messages_sent += m.messages_sent;
            total.messages_received += m.messages_received;
            total.batches_sent += m.batches_sent;
            total.batches_received += m.batches_received;
        }

        total
    }
}

impl<T> Clone for ShardedMpsc<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Producer token for the sharded queue.
///
/// Owns exclusive write access to one shard; methods take `&mut self` so the
/// single-producer invariant of the underlying ring is enforced by the
/// borrow checker. Not `Clone` for the same reason.
pub struct ShardProducer<T> {
    shards: Arc<SharedShards<T>>,
    id: usize,
}

impl<T> ShardProducer<T> {
    /// Returns the shard index this producer is pinned to.
    #[inline]
    pub fn id(&self) -> usize {
        self.id
    }

    /// Push one item to the owned shard. Returns false if the shard is
    /// full; there is no spill-over to other shards.
    #[inline]
    pub fn push(&mut self, item: T) -> bool {
        self.shards.shards[self.id].push(item)
    }

    /// Write one item in place on the owned shard.
    #[inline]
    pub fn push_with<F>(&mut self, writer: F) -> bool
    where
        F: FnOnce(&mut std::mem::MaybeUninit<T>),
    {
        self.shards.shards[self.id].push_with(writer)
    }

    /// Copy up to `items.len()` items to the owned shard.
    #[inline]
    pub fn push_bulk(&mut self, items: &[T]) -> usize
    where
        T: Copy,
    {
        self.shards.shards[self.id].push_bulk(items)
    }

    /// Reserve cells on the owned shard for zero-copy writing.
    #[inline]
    pub fn reserve(&mut self, n: usize) -> Option<Reservation<'_, T>> {
        self.shards.shards[self.id].reserve(n)
    }

    /// Returns true if the owned shard is closed.
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.shards.shards[self.id].is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multi_producer_roundtrip() {
        let queue = ShardedMpsc::<u64>::new(Config::default());

        let mut p1 = queue.register().unwrap();
        let mut p2 = queue.register().unwrap();

        assert_eq!(p1.push_bulk(&[10, 11]), 2);
        assert_eq!(p2.push_bulk(&[20, 21]), 2);

        let mut out = [0u64; 10];
        assert_eq!(queue.pop_bulk(&mut out), 4);
    }

    #[test]
    fn test_round_robin_alternates_shards() {
        let queue = ShardedMpsc::<u64>::new(Config::new(4, 2, false));

        let mut p1 = queue.register().unwrap();
        let mut p2 = queue.register().unwrap();

        assert!(p1.push(100));
        assert!(p1.push(101));
        assert!(p2.push(200));
        assert!(p2.push(201));

        // The cursor moves past a shard after taking one item from it.
        assert_eq!(queue.pop(), Some(100));
        assert_eq!(queue.pop(), Some(200));
        assert_eq!(queue.pop(), Some(101));
        assert_eq!(queue.pop(), Some(201));
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn test_per_producer_fifo() {
        let queue = ShardedMpsc::<(usize, u64)>::new(Config::new(6, 2, false));

        let mut p1 = queue.register().unwrap();
        let mut p2 = queue.register().unwrap();

        for i in 0..10 {
            assert!(p1.push((1, i)));
            assert!(p2.push((2, i)));
        }

        let mut last = [None::<u64>, None];
        while let Some((owner, v)) = queue.pop() {
            let prev = &mut last[owner - 1];
            if let Some(p) = *prev {
                assert!(v > p, "producer {} went backwards: {} after {}", owner, v, p);
            }
            *prev = Some(v);
        }
        assert_eq!(last, [Some(9), Some(9)]);
    }

    #[test]
    fn test_full_shard_rejects_push() {
        let queue = ShardedMpsc::<u64>::new(Config::new(2, 2, false)); // 3 usable per shard

        let mut p1 = queue.register().unwrap();
        let _p2 = queue.register().unwrap();

        assert!(p1.push(1));
        assert!(p1.push(2));
        assert!(p1.push(3));
        // Shard 0 full; shard 1 empty, but there is no spill-over.
        assert!(!p1.push(4));
    }

    #[test]
    fn test_too_many_producers() {
        let config = Config::new(4, 2, false);
        let queue = ShardedMpsc::<u64>::new(config);

        let _p1 = queue.register().unwrap();
        let _p2 = queue.register().unwrap();

        assert!(matches!(
            queue.register(),
            Err(QueueError::TooManyProducers { max: 2 })
        ));
    }

    #[test]
    fn test_register_after_close() {
        let queue = ShardedMpsc::<u64>::new(Config::default());
        queue.close();
        assert!(matches!(queue.register(), Err(QueueError::Closed)));
    }

    #[test]
    fn test_consume_all() {
        let queue = ShardedMpsc::<u64>::new(Config::default());

        let mut p1 = queue.register().unwrap();
        let mut p2 = queue.register().unwrap();

        assert_eq!(p1.push_bulk(&[1, 2, 3]), 3);
        assert_eq!(p2.push_bulk(&[4, 5, 6]), 3);

        let mut sum = 0u64;
        let consumed = queue.consume_all(|item| sum += item);

        assert_eq!(consumed, 6);
        assert_eq!(sum, 21);
    }

    #[test]
    fn test_pop_empty() {
        let queue = ShardedMpsc::<u64>::new(Config::default());
        let _p = queue.register().unwrap();
        assert_eq!(queue.pop(), None);
        assert!(queue.is_empty());
        assert_eq!(queue.len(), 0);
    }
}
