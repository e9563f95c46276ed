use crate::invariants::debug_assert_ordered_emit;
use crate::{
    Backoff, Config, ReorderConfig, ReorderStats, ReorderStatsSnapshot, Ring, SeqMpsc, ShardedMpsc,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, trace};

/// A payload tagged with its position in the intended total order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeqMessage<T> {
    /// Monotonically increasing position in the intended total order.
    pub seq: u64,
    pub payload: T,
}

impl<T> SeqMessage<T> {
    pub fn new(seq: u64, payload: T) -> Self {
        Self { seq, payload }
    }
}

/// The seam the reorder worker drains from.
///
/// Implemented by the queues in this crate; `try_drain` is called only from
/// the worker thread, which is the implementor's single consumer.
pub trait DrainSource<T>: Send + Sync {
    /// Pop one message if available; must not block.
    fn try_drain(&self) -> Option<T>;
}

impl<T: Send> DrainSource<T> for ShardedMpsc<T> {
    fn try_drain(&self) -> Option<T> {
        self.pop()
    }
}

impl<T: Send> DrainSource<T> for SeqMpsc<T> {
    fn try_drain(&self) -> Option<T> {
        self.pop()
    }
}

impl<T: Send> DrainSource<T> for Ring<T> {
    fn try_drain(&self) -> Option<T> {
        self.pop()
    }
}

/// Restores per-sequence order over a best-effort sequenced stream.
///
/// A dedicated worker thread drains the source queue and republishes its
/// messages in strictly ascending sequence order on an internal SPSC ring.
/// Early arrivals are staged in a two-level buffer: a fixed array indexed by
/// `seq mod B` for the common light-reordering case, and an associative
/// overflow map for slot collisions and large gaps. Messages whose sequence
/// is already behind the expectation are dropped silently (observable via
/// [`stats`](Self::stats)).
///
/// The worker stops when the reorderer is dropped; undelivered output
/// remains readable via `get_next` until then. `get_next` must be called
/// from one thread at a time (it is the output ring's single consumer).
pub struct Reorderer<T: Copy + Send + 'static> {
    shared: Arc<ReorderShared<T>>,
    worker: Option<JoinHandle<()>>,
}

struct ReorderShared<T> {
    output: Ring<SeqMessage<T>>,
    stop: AtomicBool,
    stats: ReorderStats,
}

impl<T: Copy + Send + 'static> Reorderer<T> {
    /// Creates a reorderer draining `source`.
    ///
    /// Spawns the worker thread unless `config.enabled` is false, in which
    /// case the reorderer is inert and `get_next` never yields anything.
    pub fn new<S>(source: Arc<S>, config: ReorderConfig) -> Self
    where
        S: DrainSource<SeqMessage<T>> + 'static,
    {
        let shared = Arc::new(ReorderShared {
            output: Ring::new(Config::new(config.output_bits, 1, false)),
            stop: AtomicBool::new(false),
            stats: ReorderStats::new(),
        });

        let worker = if config.enabled {
            let worker_shared = Arc::clone(&shared);
            let handle = thread::Builder::new()
                .name("reorder-worker".into())
                .spawn(move || ReorderWorker::new(source, worker_shared, config).run())
                .expect("failed to spawn reorder worker");
            Some(handle)
        } else {
            None
        };

        Self { shared, worker }
    }

    /// Pop the next in-order message from the output ring.
    ///
    /// Sequences are consecutive: each yielded message's `seq` is exactly
    /// one greater than its predecessor's.
    pub fn get_next(&self) -> Option<SeqMessage<T>> {
        self.shared.output.pop()
    }

    /// Snapshot of the hit counters.
    pub fn stats(&self) -> ReorderStatsSnapshot {
        self.shared.stats.snapshot()
    }

    /// Returns true if the worker thread is running.
    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    /// Stop the worker and wait for it to exit. Idempotent; also runs at
    /// drop. Output already published stays readable.
    pub fn stop_and_join(&mut self) {
        self.shared.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }
}

impl<T: Copy + Send + 'static> Drop for Reorderer<T> {
    fn drop(&mut self) {
        self.stop_and_join();
    }
}

/// Worker-local reordering state. Lives entirely on the worker thread; only
/// the output ring, the stop flag, and the counters are shared.
struct ReorderWorker<T: Copy, S> {
    source: Arc<S>,
    shared: Arc<ReorderShared<T>>,
    /// Level-1 staging: early arrival for sequence `s` sits at `s & mask`.
    fast: Box<[Option<SeqMessage<T>>]>,
    fast_mask: u64,
    /// Level-2 staging for slot collisions and large gaps. Unbounded:
    /// capping it would discard a staged future sequence and stall the
    /// expectation forever.
    overflow: HashMap<u64, SeqMessage<T>>,
    next_expected: u64,
}

impl<T, S> ReorderWorker<T, S>
where
    T: Copy + Send,
    S: DrainSource<SeqMessage<T>>,
{
    fn new(source: Arc<S>, shared: Arc<ReorderShared<T>>, config: ReorderConfig) -> Self {
        let fast_slots = config.fast_slots();
        Self {
            source,
            shared,
            fast: vec![None; fast_slots].into_boxed_slice(),
            fast_mask: fast_slots as u64 - 1,
            overflow: HashMap::new(),
            next_expected: 0,
        }
    }

    fn run(mut self) {
        debug!("reorder worker started");

        let mut backoff = Backoff::new();
        while !self.shared.stop.load(Ordering::Relaxed) {
            match self.source.try_drain() {
                Some(msg) => {
                    backoff.reset();
                    self.shared.stats.add_processed();
                    if !self.accept(msg) {
                        // Stop observed while waiting on the output.
                        break;
                    }
                }
                None => {
                    backoff.snooze();
                    if backoff.is_completed() {
                        backoff.reset();
                    }
                }
            }
        }

        debug!(
            next_expected = self.next_expected,
            staged = self.overflow.len(),
            "reorder worker stopped"
        );
    }

    /// Route one drained message. Returns false if a stop request aborted
    /// an emission.
    fn accept(&mut self, msg: SeqMessage<T>) -> bool {
        use std::cmp::Ordering::{Equal, Greater, Less};

        match msg.seq.cmp(&self.next_expected) {
            Equal => {
                self.shared.stats.add_direct_hit();
                if !self.emit(msg) {
                    return false;
                }
                self.next_expected += 1;
                self.drain_ready()
            }
            Less => {
                // Late duplicate of an already-emitted sequence.
                trace!(seq = msg.seq, expected = self.next_expected, "dropping late message");
                true
            }
            Greater => {
                self.stage(msg);
                true
            }
        }
    }

    /// Stage an early arrival in the two-level buffer.
    fn stage(&mut self, msg: SeqMessage<T>) {
        self.shared
            .stats
            .note_disordered(msg.seq - self.next_expected);

        let idx = (msg.seq & self.fast_mask) as usize;
        match &mut self.fast[idx] {
            vacant @ None => *vacant = Some(msg),
            Some(held) if held.seq == msg.seq => {} // duplicate in flight
            Some(held) => {
                // Slot collision: the sequence closer to the expectation
                // keeps the fast slot, the other one is demoted.
                if msg.seq - self.next_expected < held.seq - self.next_expected {
                    let demoted = std::mem::replace(held, msg);
                    self.overflow.insert(demoted.seq, demoted);
                } else {
                    self.overflow.insert(msg.seq, msg);
                }
            }
        }
    }

    /// After an emission, flush every consecutively-ready staged message.
    /// Returns false if a stop request aborted an emission.
    fn drain_ready(&mut self) -> bool {
        loop {
            let idx = (self.next_expected & self.fast_mask) as usize;

            let msg = match self.fast[idx] {
                Some(staged) if staged.seq == self.next_expected => {
                    self.fast[idx] = None;
                    self.shared.stats.add_fast_buffer_hit();
                    staged
                }
                _ => match self.overflow.remove(&self.next_expected) {
                    Some(staged) => {
                        self.shared.stats.add_overflow_hit();
                        staged
                    }
                    None => return true,
                },
            };

            if !self.emit(msg) {
                return false;
            }
            self.next_expected += 1;
        }
    }

    /// Publish one message to the output ring, waiting out back-pressure.
    /// Returns false if stopped while waiting.
    fn emit(&self, msg: SeqMessage<T>) -> bool {
        debug_assert_ordered_emit!(msg.seq, self.next_expected);

        let mut backoff = Backoff::new();
        loop {
            if self.shared.output.push(msg) {
                return true;
            }
            if self.shared.stop.load(Ordering::Relaxed) {
                return false;
            }
            backoff.snooze();
            if backoff.is_completed() {
                backoff.reset();
            }
        }
    }
}
