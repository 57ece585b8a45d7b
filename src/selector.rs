//! Stripe placement.
//!
//! Each OS thread is lazily handed a dense process-wide slot number the
//! first time it touches a pool; a pool maps that slot onto its stripe
//! array with a modulo. Placement is therefore stable for the lifetime of
//! the thread, and with one stripe per scheduler unit the steady-state
//! contention on any stripe lock is effectively zero.
//!
//! Borrow/return pairing does not depend on this being stable: a borrow
//! handle records the stripe it came from and always returns there.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

static NEXT_SLOT: AtomicUsize = AtomicUsize::new(0);

thread_local! {
    static THREAD_SLOT: usize = NEXT_SLOT.fetch_add(1, Ordering::Relaxed);
}

/// The calling thread's process-wide slot number.
pub(crate) fn current_thread_slot() -> usize {
    THREAD_SLOT.with(|slot| *slot)
}

/// Number of independent scheduler units the host reports.
///
/// Falls back to one when the platform cannot say.
pub(crate) fn scheduler_units() -> usize {
    thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}
