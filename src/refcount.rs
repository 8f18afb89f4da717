// refcount.rs
//
// Shared refcount helpers with optional hardening.
//
// Increments are relaxed. Decrements are release; the caller that observes
// zero issues an acquire fence before tearing anything down. Hardening only
// bounds increments; underflow is always refused.

use core::sync::atomic::{AtomicU32, Ordering};

#[cfg(feature = "refcount-hardening")]
const MAX_REFCOUNT: u32 = i32::MAX as u32;

#[cold]
#[inline(never)]
fn refcount_violation(what: &str) -> ! {
    crate::trap::trap_with_message(file!(), line!(), format_args!("refcount violation: {}", what))
}

#[cfg(not(feature = "refcount-hardening"))]
#[inline]
pub(crate) fn add(ref_count: &AtomicU32) -> u32 {
    ref_count.fetch_add(1, Ordering::Relaxed) + 1
}

#[cfg(feature = "refcount-hardening")]
#[inline]
pub(crate) fn add(ref_count: &AtomicU32) -> u32 {
    match ref_count.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |curr| {
        if curr >= MAX_REFCOUNT {
            None
        } else {
            Some(curr + 1)
        }
    }) {
        Ok(prev) => prev + 1,
        Err(_) => refcount_violation("increment past the maximum count"),
    }
}

/// Decrements and returns the new count. Decrementing zero traps before the
/// count is touched, so the trace hook still sees zero.
#[inline]
pub(crate) fn sub(ref_count: &AtomicU32) -> u32 {
    match ref_count.fetch_update(Ordering::Release, Ordering::Relaxed, |curr| curr.checked_sub(1)) {
        Ok(prev) => prev - 1,
        Err(_) => refcount_violation("release of a zero count"),
    }
}

/// Increments only if the count is not zero, returning the new count.
///
/// A zero count is final: this never turns 0 into 1. Success is decided by the
/// compare-exchange itself, so a concurrent increment is never lost.
#[inline]
pub(crate) fn add_if_nonzero(ref_count: &AtomicU32) -> Option<u32> {
    let mut curr = ref_count.load(Ordering::Relaxed);
    loop {
        if curr == 0 {
            return None;
        }
        #[cfg(feature = "refcount-hardening")]
        {
            if curr >= MAX_REFCOUNT {
                refcount_violation("increment past the maximum count");
            }
        }
        match ref_count.compare_exchange_weak(curr, curr + 1, Ordering::Acquire, Ordering::Relaxed) {
            Ok(_) => return Some(curr + 1),
            Err(observed) => curr = observed,
        }
    }
}
