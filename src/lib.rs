//! ringseq - Bounded Lock-Free Queues with Stream Reordering
//!
//! A family of bounded lock-free queues for in-process message passing on
//! shared-memory multiprocessors, plus a reorderer that restores
//! per-sequence order after parallel out-of-order processing:
//!
//! - [`Ring`]: single-producer single-consumer ring with cached opposing
//!   counters, 128-byte control-record isolation, and boundary-splitting
//!   bulk operations.
//! - [`ShardedMpsc`]: many-producer single-consumer queue built from one
//!   SPSC ring per registered producer, drained round-robin. Per-producer
//!   FIFO, no producer-producer contention.
//! - [`SeqMpsc`]: many-producer single-consumer queue over a single ring,
//!   coordinated by per-slot sequence tags. Implicit mode serializes
//!   producers through a counter race; explicit mode takes caller-supplied
//!   sequence numbers and delivers them gap-free in ascending order.
//! - [`Reorderer`]: a worker thread that drains a sequenced many-to-one
//!   stream and republishes it in exact sequence order through a two-level
//!   staging buffer.
//!
//! Full and empty conditions are boolean/`Option` returns; blocking policy
//! lives in the caller's retry loop (see [`Backoff`]). The two exceptions
//! are contractual waits: the explicit-sequence producer spins for its
//! slot, and the reorder worker spins on output back-pressure (watching its
//! stop flag).
//!
//! # Example
//!
//! ```
//! use ringseq::{Config, ReorderConfig, Reorderer, SeqMessage, ShardedMpsc};
//! use std::sync::Arc;
//!
//! let queue = Arc::new(ShardedMpsc::<SeqMessage<u64>>::new(Config::default()));
//! let mut producer = queue.register().unwrap();
//!
//! // Sequenced messages may arrive at the queue in any order...
//! producer.push(SeqMessage::new(1, 111));
//! producer.push(SeqMessage::new(0, 100));
//!
//! // ...the reorderer re-emits them in sequence order.
//! let reorderer = Reorderer::new(Arc::clone(&queue), ReorderConfig::default());
//! let first = loop {
//!     if let Some(msg) = reorderer.get_next() {
//!         break msg;
//!     }
//! };
//! assert_eq!((first.seq, first.payload), (0, 100));
//! ```

mod backoff;
mod config;
mod invariants;
mod metrics;
mod reorder;
mod reservation;
mod ring;
mod seq;
mod sharded;

pub use backoff::Backoff;
pub use config::{Config, ReorderConfig, HIGH_THROUGHPUT_CONFIG, LOW_LATENCY_CONFIG};
pub use metrics::{Metrics, MetricsSnapshot, ReorderStats, ReorderStatsSnapshot};
pub use reorder::{DrainSource, Reorderer, SeqMessage};
pub use reservation::{CommitError, Reservation};
pub use ring::Ring;
pub use seq::SeqMpsc;
pub use sharded::{QueueError, ShardProducer, ShardedMpsc};
