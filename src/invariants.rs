//! Debug assertion macros for queue invariants.
//!
//! Active only in debug builds, so there is zero overhead in release builds.
//! Used by `Ring<T>`, `SeqMpsc<T>`, and the reorderer worker.

/// Assert that the item count does not exceed the usable capacity.
///
/// Checked after a producer publishes (`0 <= head - tail <= capacity`).
macro_rules! debug_assert_bounded_count {
    ($count:expr, $capacity:expr) => {
        debug_assert!(
            $count <= $capacity,
            "bounded-count violated: count {} exceeds capacity {}",
            $count,
            $capacity
        )
    };
}

/// Assert that the consumer does not advance past the producer.
macro_rules! debug_assert_tail_not_past_head {
    ($new_tail:expr, $head:expr) => {
        debug_assert!(
            $new_tail <= $head,
            "bounded-count violated: advancing tail {} beyond head {}",
            $new_tail,
            $head
        )
    };
}

/// Assert that a counter only increases.
macro_rules! debug_assert_monotonic {
    ($name:literal, $old:expr, $new:expr) => {
        debug_assert!(
            $new >= $old,
            "monotonic-progress violated: {} decreased from {} to {}",
            $name,
            $old,
            $new
        )
    };
}

/// Assert that a read targets the initialized range `[tail, head)`.
///
/// Checked before `assume_init_read` in the batch drain.
macro_rules! debug_assert_initialized_read {
    ($pos:expr, $tail:expr, $head:expr) => {
        debug_assert!(
            $pos >= $tail && $pos < $head,
            "initialized-range violated: reading cell at counter {} outside [{}, {})",
            $pos,
            $tail,
            $head
        )
    };
}

/// Assert that a slot tag is in one of the two legal states for counter `c`
/// at the moment the consumer inspects it: unwritten (`<= c`) or published
/// (`c + 1`). Anything newer means a producer lapped the consumer.
macro_rules! debug_assert_slot_state {
    ($seq:expr, $counter:expr) => {
        debug_assert!(
            $seq <= $counter + 1,
            "slot-state violated: tag {} ahead of counter {} before consumption",
            $seq,
            $counter
        )
    };
}

/// Assert that the reorderer emits exactly the expected sequence.
macro_rules! debug_assert_ordered_emit {
    ($seq:expr, $expected:expr) => {
        debug_assert!(
            $seq == $expected,
            "in-order-emit violated: emitting seq {} while expecting {}",
            $seq,
            $expected
        )
    };
}

pub(crate) use debug_assert_bounded_count;
pub(crate) use debug_assert_initialized_read;
pub(crate) use debug_assert_monotonic;
pub(crate) use debug_assert_ordered_emit;
pub(crate) use debug_assert_slot_state;
pub(crate) use debug_assert_tail_not_past_head;
