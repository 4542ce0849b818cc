//! Growth planning for [`IoBuffer`](crate::IoBuffer).
//!
//! Deciding how to make room is kept separate from doing it, so the
//! policy can be tested without touching storage.

/// Largest capacity any buffer may reach.
pub(crate) const MAX_CAPACITY: usize = isize::MAX as usize;

/// How a buffer makes room for more bytes.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum Growth {
    /// The request fits in the spare tail capacity as-is.
    Extend,
    /// Move the unread region to offset zero; the reclaimed prefix
    /// covers the request with at least half the capacity left free.
    Slide,
    /// Check out fresh storage of `new_capacity` bytes and migrate the
    /// unread region into it.
    Reallocate { new_capacity: usize },
}

/// Plans room for `requested` more bytes in a buffer of `capacity` whose
/// logical length is `len`, of which the trailing `unread` bytes are
/// still unconsumed.
///
/// Callers reset a fully drained buffer before planning, so a drained
/// buffer arrives here with `len == 0` and extends in place.
///
/// Sliding is only chosen when the unread region plus the request fit in
/// half the capacity. A laxer rule (anything up to the full capacity)
/// would also be correct, but it turns a run of small appends against a
/// nearly full buffer into a copy of the unread region per call.
/// Demanding half keeps compaction amortized against real growth.
///
/// # Panics
///
/// Panics if the request would push the reallocated capacity past
/// [`MAX_CAPACITY`].
pub(crate) fn plan(capacity: usize, len: usize, unread: usize, requested: usize) -> Growth {
    debug_assert!(unread <= len);
    debug_assert!(len <= capacity);

    // Subtraction instead of `len + requested <= capacity` so an absurd
    // request cannot wrap the comparison.
    if requested <= capacity - len {
        return Growth::Extend;
    }
    if requested <= (capacity / 2).saturating_sub(unread) {
        return Growth::Slide;
    }
    Growth::Reallocate {
        new_capacity: doubled(capacity, requested),
    }
}

/// The reallocation target for growing a buffer of `capacity` bytes by
/// `requested` more: double the capacity plus the request, so a burst
/// that outgrows the buffer once does not outgrow it again immediately.
///
/// # Panics
///
/// Panics if the result would exceed [`MAX_CAPACITY`].
pub(crate) fn doubled(capacity: usize, requested: usize) -> usize {
    capacity
        .checked_mul(2)
        .and_then(|doubled| doubled.checked_add(requested))
        .filter(|&new_capacity| new_capacity <= MAX_CAPACITY)
        .unwrap_or_else(|| too_large(capacity, requested))
}

fn too_large(capacity: usize, requested: usize) -> ! {
    panic!("cannot grow buffer of {capacity} bytes by {requested} more: capacity limit exceeded");
}
