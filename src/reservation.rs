use crate::Ring;
use std::mem::MaybeUninit;
use thiserror::Error;

/// Error returned when trying to commit more cells than were reserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("cannot commit {attempted} items, only {available} reserved")]
pub struct CommitError {
    /// Number of items attempted to commit.
    pub attempted: usize,
    /// Number of items actually reserved.
    pub available: usize,
}

/// Zero-copy reservation for writing directly into the ring.
///
/// The producer obtains a reservation, writes into the provided slice, then
/// commits to make the cells visible to the consumer. Dropping without
/// committing abandons the write (the cells are reused by the next reserve).
///
/// A `Reservation` may cover fewer cells than requested when the span wraps
/// the ring boundary; check `as_mut_slice().len()`.
pub struct Reservation<'a, T> {
    slice: &'a mut [MaybeUninit<T>],
    ring_ptr: *const Ring<T>,
    len: usize,
}

impl<'a, T> Reservation<'a, T> {
    pub(crate) fn new(slice: &'a mut [MaybeUninit<T>], ring_ptr: *const Ring<T>) -> Self {
        let len = slice.len();
        Self {
            slice,
            ring_ptr,
            len,
        }
    }

    /// Returns the mutable cell slice for writing.
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [MaybeUninit<T>] {
        self.slice
    }

    /// Returns the number of reserved cells.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the reservation is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Commits the whole reservation, publishing the cells to the consumer.
    pub fn commit(self) {
        let len = self.len;
        // SAFETY: len is the reservation's own length.
        unsafe { self.commit_n_unchecked(len) };
    }

    /// Commits exactly n cells, or fails if `n > len()`.
    pub fn try_commit_n(self, n: usize) -> Result<(), CommitError> {
        if n > self.len {
            return Err(CommitError {
                attempted: n,
                available: self.len,
            });
        }
        // SAFETY: just verified n <= self.len.
        unsafe { self.commit_n_unchecked(n) };
        Ok(())
    }

    /// Commits n cells, saturating at `len()`. Returns the committed count.
    pub fn commit_up_to(self, n: usize) -> usize {
        let to_commit = n.min(self.len);
        // SAFETY: to_commit <= self.len by construction.
        unsafe { self.commit_n_unchecked(to_commit) };
        to_commit
    }

    /// # Safety
    ///
    /// Caller must ensure `n <= self.len()`, and every committed cell must
    /// have been initialized.
    #[inline]
    unsafe fn commit_n_unchecked(self, n: usize) {
        let ring = &*self.ring_ptr;
        ring.commit_internal(n);
    }
}
