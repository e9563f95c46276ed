use crate::invariants::{
    debug_assert_bounded_count, debug_assert_initialized_read, debug_assert_monotonic,
    debug_assert_tail_not_past_head,
};
use crate::{Config, Metrics, MetricsSnapshot, Reservation};
use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

// =============================================================================
// SYNCHRONIZATION PROTOCOL
// =============================================================================
//
// `head` is the producer's write counter, `tail` the consumer's read counter.
// Both are unbounded u64 sequence counters; the cell for counter `c` is
// `buffer[c & mask]`. Unbounded counters rule out ABA entirely (wrap takes
// decades at any realistic rate), and the buffer index is computed only at
// cell access.
//
// One cell is held in reserve: the ring is full at `head - tail == cells - 1`,
// so `head == tail` is unambiguously empty and `capacity() == cells - 1`.
//
// Producer: load `head` Relaxed (sole writer), check the cached `tail` view,
// refresh it with an Acquire load only when the cache says full, write the
// cells, publish with a Release store of `head`. Consumer mirrors this with
// `tail` and a cached `head` view. The Release store of `head` synchronizes
// with the consumer's Acquire load, ordering the cell writes before any read;
// the Release store of `tail` synchronizes with the producer's Acquire load,
// ordering cell reads before any overwrite.
//
// `cached_tail` and `cached_head` live in UnsafeCell without atomics: each
// has exactly one writer (the producer and the consumer respectively), which
// is the same thread that reads it.
//
// =============================================================================

/// SPSC ring - the core building block.
///
/// A bounded single-producer single-consumer ring with lock-free, wait-free
/// operations:
/// - 128-byte alignment of the two control records to prevent false sharing
/// - cached opposing counters to minimize cross-core traffic
/// - bulk operations that split at the ring boundary and publish once
///
/// The producer-side methods (`push`, `push_with`, `push_bulk`, `reserve`)
/// must only ever be called from one thread at a time, and likewise the
/// consumer-side methods (`pop`, `pop_with`, `pop_bulk`, `readable`,
/// `advance`, `consume_batch`). The `ShardProducer` token and the reorderer
/// worker uphold this by construction.
#[repr(C)]
pub struct Ring<T> {
    // === PRODUCER HOT === (128-byte aligned)
    /// Write counter (written by producer, read by consumer)
    head: CacheAligned<AtomicU64>,
    /// Producer's cached view of tail (avoids cross-core reads)
    cached_tail: CacheAligned<UnsafeCell<u64>>,

    // === CONSUMER HOT === (128-byte aligned)
    /// Read counter (written by consumer, read by producer)
    tail: CacheAligned<AtomicU64>,
    /// Consumer's cached view of head (avoids cross-core reads)
    cached_head: CacheAligned<UnsafeCell<u64>>,

    // === COLD STATE === (rarely accessed)
    /// Cooperative close flag, consulted by backoff loops
    closed: AtomicBool,
    /// Thread-safe traffic counters (atomics inside)
    metrics: Metrics,

    // === CONFIG ===
    config: Config,

    // === DATA BUFFER ===
    /// Fixed-size cell storage. `Box<[T]>` rather than `Vec<T>`: the size
    /// never changes after construction.
    buffer: UnsafeCell<Box<[MaybeUninit<T>]>>,
}

// Safety: the counter protocol above serializes all access to each cell.
unsafe impl<T: Send> Send for Ring<T> {}
unsafe impl<T: Send> Sync for Ring<T> {}

impl<T> Ring<T> {
    /// Creates a new ring with the given configuration.
    pub fn new(config: Config) -> Self {
        let cells = config.cells();
        let mut buffer = Vec::with_capacity(cells);
        buffer.resize_with(cells, MaybeUninit::uninit);

        Self {
            head: CacheAligned::new(AtomicU64::new(0)),
            cached_tail: CacheAligned::new(UnsafeCell::new(0)),
            tail: CacheAligned::new(AtomicU64::new(0)),
            cached_head: CacheAligned::new(UnsafeCell::new(0)),
            closed: AtomicBool::new(false),
            metrics: Metrics::new(),
            config,
            buffer: UnsafeCell::new(buffer.into_boxed_slice()),
        }
    }

    // ---------------------------------------------------------------------
    // CONSTANTS & STATUS
    // ---------------------------------------------------------------------

    /// Returns the usable capacity: one cell fewer than the ring size, held
    /// in reserve to distinguish full from empty.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.config.cells() - 1
    }

    #[inline]
    fn cells(&self) -> usize {
        self.config.cells()
    }

    /// Returns the index mask for wrapping.
    #[inline]
    fn mask(&self) -> usize {
        self.config.mask()
    }

    /// Returns the current number of items in the ring.
    ///
    /// Observational: not linearizable with concurrent pushes and pops.
    #[inline]
    pub fn len(&self) -> usize {
        let head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Relaxed);
        head.wrapping_sub(tail) as usize
    }

    /// Returns true if the ring is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.head.load(Ordering::Relaxed) == self.tail.load(Ordering::Relaxed)
    }

    /// Returns true if the ring is full.
    #[inline]
    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity()
    }

    /// Returns true if the ring is closed.
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Close the ring. Operations keep working; retry loops use this as
    /// their stop signal.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    // ---------------------------------------------------------------------
    // PRODUCER API
    // ---------------------------------------------------------------------

    /// Reserve n cells for zero-copy writing. Returns None if the space is
    /// not available.
    ///
    /// The returned `Reservation` may cover **fewer than n cells** when the
    /// span wraps the ring boundary: reservations are contiguous memory.
    /// Check `reservation.as_mut_slice().len()` for the actual count.
    #[allow(clippy::cast_possible_truncation)]
    pub fn reserve(&self, n: usize) -> Option<Reservation<'_, T>> {
        if n == 0 || n > self.capacity() {
            return None;
        }

        let head = self.head.load(Ordering::Relaxed);

        // Fast path: check cached tail.
        // SAFETY: cached_tail is only written by the producer (this code
        // path), which is the thread running now.
        let cached_tail = unsafe { *self.cached_tail.get() };
        let space = self
            .capacity()
            .saturating_sub(head.wrapping_sub(cached_tail) as usize);

        if space >= n {
            return Some(self.make_reservation(head, n));
        }

        // Slow path: refresh the cache.
        let tail = self.tail.load(Ordering::Acquire);
        // SAFETY: as above; the Acquire load synchronizes with the
        // consumer's Release store of tail.
        unsafe {
            *self.cached_tail.get() = tail;
        }

        let space = self
            .capacity()
            .saturating_sub(head.wrapping_sub(tail) as usize);
        if space < n {
            return None;
        }

        Some(self.make_reservation(head, n))
    }

    /// Internal: create a reservation starting at `head`.
    fn make_reservation(&self, head: u64, n: usize) -> Reservation<'_, T> {
        let idx = (head as usize) & self.mask();
        let contiguous = n.min(self.cells() - idx);

        // SAFETY: the cells in [head, head + contiguous) are outside the
        // consumer's readable range [tail, head), and only the producer
        // writes between reservation and commit.
        let slice = unsafe {
            let buffer = &mut *self.buffer.get();
            &mut buffer[idx..idx + contiguous]
        };

        Reservation::new(slice, self as *const Self)
    }

    /// Internal: publish n cells after writing. Called by `Reservation`.
    pub(crate) fn commit_internal(&self, n: usize) {
        let head = self.head.load(Ordering::Relaxed);
        let new_head = head.wrapping_add(n as u64);
        let tail = self.tail.load(Ordering::Relaxed);

        debug_assert_bounded_count!(new_head.wrapping_sub(tail) as usize, self.capacity());
        debug_assert_monotonic!("head", head, new_head);

        self.head.store(new_head, Ordering::Release);

        if self.config.enable_metrics {
            self.metrics.add_messages_sent(n as u64);
            self.metrics.add_batches_sent(1);
        }
    }

    /// Write a single item in place. Returns false if full.
    ///
    /// The writer closure is invoked with exclusive access to the cell; it
    /// must fully initialize it and must not block.
    #[inline]
    pub fn push_with<F>(&self, writer: F) -> bool
    where
        F: FnOnce(&mut MaybeUninit<T>),
    {
        self.reserve(1).is_some_and(|mut r| {
            writer(&mut r.as_mut_slice()[0]);
            r.commit();
            true
        })
    }

    /// Push a single item. Returns false if full.
    #[inline]
    pub fn push(&self, item: T) -> bool {
        self.push_with(|cell| {
            cell.write(item);
        })
    }

    /// Copy up to `items.len()` items into the ring.
    ///
    /// Splits the copy at the ring boundary and publishes once. Returns the
    /// number of items written - possibly 0, possibly fewer than requested.
    #[allow(clippy::cast_possible_truncation)]
    pub fn push_bulk(&self, items: &[T]) -> usize
    where
        T: Copy,
    {
        let head = self.head.load(Ordering::Relaxed);

        // SAFETY: cached_tail single-writer, see reserve().
        let mut tail = unsafe { *self.cached_tail.get() };
        let mut space = self
            .capacity()
            .saturating_sub(head.wrapping_sub(tail) as usize);

        if space < items.len() {
            tail = self.tail.load(Ordering::Acquire);
            // SAFETY: as above.
            unsafe {
                *self.cached_tail.get() = tail;
            }
            space = self
                .capacity()
                .saturating_sub(head.wrapping_sub(tail) as usize);
        }

        let to_write = items.len().min(space);
        if to_write == 0 {
            return 0;
        }

        let idx = (head as usize) & self.mask();
        let first = to_write.min(self.cells() - idx);

        // SAFETY: the target cells are outside the consumer's readable
        // range; T: Copy so raw byte copies are complete initializations.
        unsafe {
            let buffer = &mut *self.buffer.get();
            ptr::copy_nonoverlapping(
                items.as_ptr(),
                buffer[idx..].as_mut_ptr().cast::<T>(),
                first,
            );
            if first < to_write {
                ptr::copy_nonoverlapping(
                    items[first..].as_ptr(),
                    buffer.as_mut_ptr().cast::<T>(),
                    to_write - first,
                );
            }
        }

        self.head
            .store(head.wrapping_add(to_write as u64), Ordering::Release);

        if self.config.enable_metrics {
            self.metrics.add_messages_sent(to_write as u64);
            self.metrics.add_batches_sent(1);
        }

        to_write
    }

    // ---------------------------------------------------------------------
    // CONSUMER API
    // ---------------------------------------------------------------------

    /// Pop a single item. Returns None if empty.
    pub fn pop(&self) -> Option<T> {
        let tail = self.consume_ready()?;
        let idx = (tail as usize) & self.mask();

        // SAFETY: the cell at tail is inside the published range [tail,
        // head); assume_init_read moves the value out before the cell is
        // recycled by the Release store below.
        let item = unsafe {
            let buffer = &*self.buffer.get();
            buffer[idx].assume_init_read()
        };

        self.advance(1);
        Some(item)
    }

    /// Read a single item in place. Returns false if empty.
    ///
    /// The reader closure sees the cell before it is recycled; it must not
    /// retain the reference.
    pub fn pop_with<F>(&self, reader: F) -> bool
    where
        F: FnOnce(&T),
    {
        let Some(tail) = self.consume_ready() else {
            return false;
        };
        let idx = (tail as usize) & self.mask();

        // SAFETY: as in pop(); the value is moved out so T: Drop types are
        // cleaned up after the reader returns.
        let item = unsafe {
            let buffer = &*self.buffer.get();
            buffer[idx].assume_init_read()
        };
        reader(&item);

        self.advance(1);
        true
    }

    /// Internal: returns the current tail if at least one item is readable.
    #[allow(clippy::cast_possible_truncation)]
    fn consume_ready(&self) -> Option<u64> {
        let tail = self.tail.load(Ordering::Relaxed);

        // Fast path: check cached head.
        // SAFETY: cached_head is only written by the consumer (this code
        // path), which is the thread running now.
        let mut cached_head = unsafe { *self.cached_head.get() };
        if cached_head.wrapping_sub(tail) == 0 {
            // Slow path: refresh the cache.
            cached_head = self.head.load(Ordering::Acquire);
            // SAFETY: as above; the Acquire load synchronizes with the
            // producer's Release store of head.
            unsafe {
                *self.cached_head.get() = cached_head;
            }
            if cached_head.wrapping_sub(tail) == 0 {
                return None;
            }
        }
        Some(tail)
    }

    /// Get the readable contiguous span. Returns None if empty.
    #[allow(clippy::cast_possible_truncation)]
    pub fn readable(&self) -> Option<&[T]> {
        let tail = self.consume_ready()?;
        // SAFETY: consume_ready refreshed cached_head on this thread.
        let cached_head = unsafe { *self.cached_head.get() };
        let avail = cached_head.wrapping_sub(tail) as usize;

        let idx = (tail as usize) & self.mask();
        let contiguous = avail.min(self.cells() - idx);

        // SAFETY: cells in [tail, tail + contiguous) were published by the
        // producer's Release store and will not be overwritten until the
        // consumer advances tail past them.
        unsafe {
            let buffer = &*self.buffer.get();
            Some(std::slice::from_raw_parts(
                buffer[idx..].as_ptr().cast::<T>(),
                contiguous,
            ))
        }
    }

    /// Recycle n cells after reading them.
    #[inline]
    pub fn advance(&self, n: usize) {
        let tail = self.tail.load(Ordering::Relaxed);
        let new_tail = tail.wrapping_add(n as u64);
        let head = self.head.load(Ordering::Relaxed);

        debug_assert_tail_not_past_head!(new_tail, head);
        debug_assert_monotonic!("tail", tail, new_tail);

        self.tail.store(new_tail, Ordering::Release);

        if self.config.enable_metrics {
            self.metrics.add_messages_received(n as u64);
            self.metrics.add_batches_received(1);
        }
    }

    /// Copy up to `out.len()` items out of the ring.
    ///
    /// Splits the copy at the ring boundary and publishes once. Returns the
    /// number of items read.
    #[allow(clippy::cast_possible_truncation)]
    pub fn pop_bulk(&self, out: &mut [T]) -> usize
    where
        T: Copy,
    {
        let tail = self.tail.load(Ordering::Relaxed);

        // SAFETY: cached_head single-writer, see consume_ready().
        let mut head = unsafe { *self.cached_head.get() };
        let mut avail = head.wrapping_sub(tail) as usize;

        if avail < out.len() {
            head = self.head.load(Ordering::Acquire);
            // SAFETY: as above.
            unsafe {
                *self.cached_head.get() = head;
            }
            avail = head.wrapping_sub(tail) as usize;
        }

        let to_read = out.len().min(avail);
        if to_read == 0 {
            return 0;
        }

        let idx = (tail as usize) & self.mask();
        let first = to_read.min(self.cells() - idx);

        // SAFETY: cells in [tail, tail + to_read) are published; T: Copy so
        // the values stay valid in the ring until overwritten.
        unsafe {
            let buffer = &*self.buffer.get();
            ptr::copy_nonoverlapping(buffer[idx..].as_ptr().cast::<T>(), out.as_mut_ptr(), first);
            if first < to_read {
                ptr::copy_nonoverlapping(
                    buffer.as_ptr().cast::<T>(),
                    out[first..].as_mut_ptr(),
                    to_read - first,
                );
            }
        }

        self.tail
            .store(tail.wrapping_add(to_read as u64), Ordering::Release);

        if self.config.enable_metrics {
            self.metrics.add_messages_received(to_read as u64);
            self.metrics.add_batches_received(1);
        }

        to_read
    }

    // ---------------------------------------------------------------------
    // BATCH CONSUMPTION
    // ---------------------------------------------------------------------

    /// Process everything visible with a single tail update.
    ///
    /// Amortizes the atomic publish over the whole batch: no atomics inside
    /// the loop. Items are moved out and dropped after the handler returns.
    #[allow(clippy::cast_possible_truncation)]
    pub fn consume_batch<F>(&self, mut handler: F) -> usize
    where
        F: FnMut(&T),
    {
        let tail = self.tail.load(Ordering::Relaxed);
        let head = self.head.load(Ordering::Acquire);

        let avail = head.wrapping_sub(tail) as usize;
        if avail == 0 {
            return 0;
        }

        let mask = self.mask();
        let mut pos = tail;
        let mut count = 0;

        while pos != head {
            debug_assert_initialized_read!(pos, tail, head);

            let idx = (pos as usize) & mask;
            // SAFETY: [tail, head) is published; assume_init_read takes
            // ownership so T: Drop types are cleaned up after the handler.
            let item = unsafe {
                let buffer = &*self.buffer.get();
                buffer[idx].assume_init_read()
            };
            handler(&item);
            pos = pos.wrapping_add(1);
            count += 1;
        }

        self.tail.store(head, Ordering::Release);

        if self.config.enable_metrics {
            self.metrics.add_messages_received(count as u64);
            self.metrics.add_batches_received(1);
        }

        count
    }

    // ---------------------------------------------------------------------
    // OBSERVABILITY
    // ---------------------------------------------------------------------

    /// Get a snapshot of the traffic counters if metrics are enabled.
    pub fn metrics(&self) -> MetricsSnapshot {
        if self.config.enable_metrics {
            self.metrics.snapshot()
        } else {
            MetricsSnapshot::default()
        }
    }
}

impl<T> Drop for Ring<T> {
    fn drop(&mut self) {
        // Drop all still-initialized cells.
        let tail = self.tail.load(Ordering::Relaxed);
        let head = self.head.load(Ordering::Relaxed);
        let count = head.wrapping_sub(tail) as usize;

        if count > 0 {
            let mask = self.mask();
            let buffer = self.buffer.get_mut();

            for i in 0..count {
                let idx = ((tail as usize).wrapping_add(i)) & mask;
                unsafe {
                    ptr::drop_in_place(buffer[idx].as_mut_ptr());
                }
            }
        }
    }
}

// ---------------------------------------------------------------------
// HELPER: 128-byte cache-aligned wrapper
// ---------------------------------------------------------------------

/// Wrapper ensuring 128-byte alignment: adjacent-line prefetchers on x86
/// pull pairs of 64-byte lines, so 64-byte isolation is not enough.
#[repr(align(128))]
pub(crate) struct CacheAligned<T> {
    value: T,
}

impl<T> CacheAligned<T> {
    pub(crate) const fn new(value: T) -> Self {
        Self { value }
    }
}

impl<T> std::ops::Deref for CacheAligned<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small() -> Config {
        Config::new(3, 1, false) // 8 cells, 7 usable
    }

    #[test]
    fn test_fill_then_drain() {
        let ring = Ring::<u64>::new(small());

        for i in 0..7 {
            assert!(ring.push(i), "push {} should fit", i);
        }
        assert!(ring.is_full());
        assert!(!ring.push(7), "eighth push must fail");

        for i in 0..7 {
            assert_eq!(ring.pop(), Some(i));
        }
        assert_eq!(ring.pop(), None);
        assert!(ring.is_empty());
    }

    #[test]
    fn test_capacity_reserves_one_cell() {
        let ring = Ring::<u64>::new(small());
        assert_eq!(ring.capacity(), 7);
    }

    #[test]
    fn test_push_bulk_partial() {
        let ring = Ring::<u64>::new(small());

        let written = ring.push_bulk(&[10, 20, 30, 40, 50]);
        assert_eq!(written, 5);

        let mut out = [0u64; 5];
        assert_eq!(ring.pop_bulk(&mut out), 5);
        assert_eq!(out, [10, 20, 30, 40, 50]);

        // Now the span wraps: 10 requested, only 7 fit.
        let items: Vec<u64> = (1..=10).collect();
        assert_eq!(ring.push_bulk(&items), 7);

        let mut out = [0u64; 10];
        assert_eq!(ring.pop_bulk(&mut out), 7);
        assert_eq!(&out[..7], &[1, 2, 3, 4, 5, 6, 7]);
    }

    #[test]
    fn test_pop_bulk_empty() {
        let ring = Ring::<u64>::new(small());
        let mut out = [0u64; 4];
        assert_eq!(ring.pop_bulk(&mut out), 0);
    }

    #[test]
    fn test_reserve_commit_roundtrip() {
        let ring = Ring::<u64>::new(Config::default());

        if let Some(mut r) = ring.reserve(4) {
            let slice = r.as_mut_slice();
            slice[0].write(100);
            slice[1].write(200);
            slice[2].write(300);
            slice[3].write(400);
            r.commit();
        }

        assert_eq!(ring.len(), 4);

        if let Some(slice) = ring.readable() {
            assert_eq!(slice[0], 100);
            assert_eq!(slice[3], 400);
            ring.advance(4);
        }

        assert!(ring.is_empty());
    }

    #[test]
    fn test_reserve_too_large() {
        let ring = Ring::<u64>::new(small());
        assert!(ring.reserve(8).is_none()); // only 7 usable
        assert!(ring.reserve(0).is_none());
    }

    #[test]
    fn test_push_with_pop_with() {
        let ring = Ring::<u64>::new(small());

        assert!(ring.push_with(|cell| {
            cell.write(99);
        }));

        let mut seen = 0;
        assert!(ring.pop_with(|v| seen = *v));
        assert_eq!(seen, 99);
        assert!(!ring.pop_with(|_| {}));
    }

    #[test]
    fn test_consume_batch() {
        let ring = Ring::<u64>::new(Config::default());

        for i in 0..10 {
            assert!(ring.push(i * 10));
        }

        let mut sum = 0u64;
        let consumed = ring.consume_batch(|item| sum += item);

        assert_eq!(consumed, 10);
        assert_eq!(sum, 10 + 20 + 30 + 40 + 50 + 60 + 70 + 80 + 90);
        assert!(ring.is_empty());
    }

    #[test]
    fn test_wraparound_many_rounds() {
        let ring = Ring::<u64>::new(small());

        for i in 0..1000u64 {
            assert!(ring.push(i));
            assert_eq!(ring.pop(), Some(i));
        }
        assert!(ring.is_empty());
    }

    #[test]
    fn test_failed_push_leaves_state_untouched() {
        let ring = Ring::<u64>::new(small());
        for i in 0..7 {
            assert!(ring.push(i));
        }
        let len_before = ring.len();
        assert!(!ring.push(100));
        assert_eq!(ring.len(), len_before);
        assert_eq!(ring.pop(), Some(0));
    }

    #[test]
    fn test_metrics_enabled() {
        let ring = Ring::<u64>::new(Config::new(4, 1, true));
        assert_eq!(ring.push_bulk(&[1, 2, 3]), 3);
        let _ = ring.pop();

        let m = ring.metrics();
        assert_eq!(m.messages_sent, 3);
        assert_eq!(m.batches_sent, 1);
        assert_eq!(m.messages_received, 1);
    }

    #[test]
    fn test_close_flag() {
        let ring = Ring::<u64>::new(small());
        assert!(!ring.is_closed());
        ring.close();
        assert!(ring.is_closed());
        // Close is cooperative: operations still work.
        assert!(ring.push(1));
        assert_eq!(ring.pop(), Some(1));
    }
}
