//! Per-stripe state and the mutex that serializes it.
//!
//! A stripe tracks three things: how much unborrowed capacity remains, a
//! LIFO cache of idle entries, and a FIFO of waiters to hand returning
//! resources to. All three are only ever touched under the owning
//! [`LocalPool`]'s mutex, and every critical section is a handful of moves
//! and integer updates. Resource constructors and destructors always run
//! outside the lock.

use std::mem;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::queue::WaiterQueue;

/// An idle resource and the moment it was last returned.
pub(crate) struct Entry<R> {
    pub(crate) value: R,
    pub(crate) last_used: Instant,
}

/// Mutable state of one stripe.
///
/// Invariants, preserved by every method on [`LocalPool`]:
/// - `available <= capacity`
/// - `cache.len() <= available`
/// - a non-empty cache implies no waiters
///
/// Waiters enqueue only when `available` is zero, but a destroyed borrow
/// re-credits capacity without waking anyone, so `available` can be
/// positive while waiters remain queued; they are served by the next
/// returning resource.
pub(crate) struct Stripe<R> {
    capacity: usize,
    /// Unborrowed capacity: `capacity` minus resources currently outside
    /// the pool. Not the number of cached entries.
    available: usize,
    /// Idle entries, most recently returned last.
    cache: Vec<Entry<R>>,
    waiters: WaiterQueue<oneshot::Sender<R>>,
}

impl<R> Stripe<R> {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            available: capacity,
            cache: Vec::new(),
            waiters: WaiterQueue::new(),
        }
    }

    fn check_invariants(&self) {
        debug_assert!(self.available <= self.capacity);
        debug_assert!(self.cache.len() <= self.available);
        if !self.waiters.is_empty() {
            debug_assert!(self.cache.is_empty());
        }
    }

    /// Pop waiters in FIFO order until one accepts the resource.
    ///
    /// Returns the resource when the queue runs out of live waiters.
    fn offer_to_waiters(&mut self, value: R) -> Option<R> {
        let mut value = value;
        while let Some(waiter) = self.waiters.pop() {
            match waiter.send(value) {
                Ok(()) => return None,
                Err(rejected) => value = rejected,
            }
        }
        Some(value)
    }
}

/// Outcome of the locked half of an acquisition.
pub(crate) enum TakeAttempt<R> {
    /// No capacity left; the caller was enqueued and must wait on the
    /// receiving end of its slot.
    Wait(oneshot::Receiver<R>),
    /// A cached entry was claimed. Carries the `available` count after the
    /// decrement.
    Cached(R, usize),
    /// Capacity was reserved but the cache was empty; the caller must run
    /// the constructor. Carries the `available` count after the decrement.
    Empty(usize),
}

/// Exclusive owner of one [`Stripe`], serialized by a mutex.
pub(crate) struct LocalPool<R> {
    stripe: Mutex<Stripe<R>>,
}

impl<R> LocalPool<R> {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            stripe: Mutex::new(Stripe::new(capacity)),
        }
    }

    /// The locked half of `take`: claim a cached entry, reserve capacity
    /// for a fresh creation, or enqueue as a waiter.
    pub(crate) fn begin_take(&self) -> TakeAttempt<R> {
        let mut stripe = self.stripe.lock();
        stripe.check_invariants();
        if stripe.available == 0 {
            let (sender, receiver) = oneshot::channel();
            stripe.waiters.push(sender);
            TakeAttempt::Wait(receiver)
        } else if let Some(entry) = stripe.cache.pop() {
            stripe.available -= 1;
            TakeAttempt::Cached(entry.value, stripe.available)
        } else {
            stripe.available -= 1;
            TakeAttempt::Empty(stripe.available)
        }
    }

    /// Return a resource to this stripe.
    ///
    /// Waiters are offered the resource in FIFO order; a waiter whose slot
    /// was tombstoned by cancellation rejects the send and is discarded. A
    /// successful handoff leaves `available` untouched; the resource is
    /// immediately outside the pool again, in the waiter's hands. With no
    /// live waiter the resource is cached at the LIFO head and the capacity
    /// counter re-incremented.
    pub(crate) fn put(&self, value: R) {
        let mut stripe = self.stripe.lock();
        if let Some(value) = stripe.offer_to_waiters(value) {
            stripe.available += 1;
            stripe.cache.push(Entry {
                value,
                last_used: Instant::now(),
            });
        }
        stripe.check_invariants();
    }

    /// Offer the resource to queued waiters without touching the cache.
    ///
    /// Hands back the resource when no live waiter claims it.
    pub(crate) fn try_handoff(&self, value: R) -> Option<R> {
        let mut stripe = self.stripe.lock();
        stripe.offer_to_waiters(value)
    }

    /// Re-credit one unit of capacity without supplying a resource.
    ///
    /// Used when a borrowed resource is destroyed instead of returned, and
    /// when a creation attempt fails after reserving capacity.
    pub(crate) fn restore_available(&self) {
        let mut stripe = self.stripe.lock();
        stripe.available += 1;
        debug_assert!(stripe.available <= stripe.capacity);
    }

    /// Remove and return every cached entry older than `idle_timeout`.
    ///
    /// Fresh entries keep their LIFO order. The caller owns the stale
    /// values and is responsible for destroying them outside the lock.
    pub(crate) fn evict_stale(&self, now: Instant, idle_timeout: Duration) -> Vec<R> {
        let mut stripe = self.stripe.lock();
        let cache = mem::take(&mut stripe.cache);
        let (stale, fresh): (Vec<_>, Vec<_>) = cache
            .into_iter()
            .partition(|entry| now.saturating_duration_since(entry.last_used) > idle_timeout);
        stripe.cache = fresh;
        stale.into_iter().map(|entry| entry.value).collect()
    }

    /// Swap the cache for an empty one and hand back the extracted values.
    ///
    /// `available` is left alone: it tracks borrowed resources, and cached
    /// entries are not borrowed.
    pub(crate) fn drain_cache(&self) -> Vec<R> {
        let mut stripe = self.stripe.lock();
        mem::take(&mut stripe.cache)
            .into_iter()
            .map(|entry| entry.value)
            .collect()
    }

    /// Point-in-time counters for this stripe.
    pub(crate) fn status(&self) -> StripeStatus {
        let stripe = self.stripe.lock();
        StripeStatus {
            capacity: stripe.capacity,
            available: stripe.available,
            idle: stripe.cache.len(),
            waiting: stripe.waiters.len(),
        }
    }
}

/// A snapshot of one stripe's counters.
///
/// Sampled under the stripe lock, so each snapshot is internally
/// consistent; snapshots of different stripes may be mutually stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StripeStatus {
    /// Capacity of this stripe.
    pub capacity: usize,
    /// Unborrowed capacity.
    pub available: usize,
    /// Idle entries in the cache.
    pub idle: usize,
    /// Waiters queued on this stripe.
    pub waiting: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_stripe_has_full_capacity_and_no_cache() {
        let local: LocalPool<u32> = LocalPool::new(3);
        let status = local.status();
        assert_eq!(status.available, 3);
        assert_eq!(status.idle, 0);
        assert_eq!(status.waiting, 0);
    }

    #[test]
    fn take_prefers_cache_and_is_lifo() {
        let local: LocalPool<u32> = LocalPool::new(2);
        match local.begin_take() {
            TakeAttempt::Empty(available) => assert_eq!(available, 1),
            _ => panic!("empty stripe should ask for a creation"),
        }
        local.put(7);
        local.put(8);
        match local.begin_take() {
            TakeAttempt::Cached(value, available) => {
                assert_eq!(value, 8);
                assert_eq!(available, 1);
            }
            _ => panic!("cached entry expected"),
        }
        match local.begin_take() {
            TakeAttempt::Cached(value, _) => assert_eq!(value, 7),
            _ => panic!("cached entry expected"),
        }
    }

    #[test]
    fn exhausted_stripe_enqueues_waiters() {
        let local: LocalPool<u32> = LocalPool::new(1);
        assert!(matches!(local.begin_take(), TakeAttempt::Empty(0)));
        let TakeAttempt::Wait(mut receiver) = local.begin_take() else {
            panic!("expected to wait");
        };
        assert_eq!(local.status().waiting, 1);

        local.put(42);
        assert_eq!(receiver.try_recv().unwrap(), 42);
        // The handoff bypassed the cache and kept available at zero.
        let status = local.status();
        assert_eq!(status.available, 0);
        assert_eq!(status.idle, 0);
        assert_eq!(status.waiting, 0);
    }

    #[test]
    fn put_skips_tombstoned_waiters() {
        let local: LocalPool<u32> = LocalPool::new(1);
        assert!(matches!(local.begin_take(), TakeAttempt::Empty(0)));

        let TakeAttempt::Wait(first) = local.begin_take() else {
            panic!("expected to wait");
        };
        let TakeAttempt::Wait(mut second) = local.begin_take() else {
            panic!("expected to wait");
        };
        drop(first);

        local.put(9);
        assert_eq!(second.try_recv().unwrap(), 9);
        assert_eq!(local.status().waiting, 0);
    }

    #[test]
    fn put_with_only_tombstones_falls_through_to_cache() {
        let local: LocalPool<u32> = LocalPool::new(1);
        assert!(matches!(local.begin_take(), TakeAttempt::Empty(0)));
        let TakeAttempt::Wait(receiver) = local.begin_take() else {
            panic!("expected to wait");
        };
        drop(receiver);

        local.put(5);
        let status = local.status();
        assert_eq!(status.available, 1);
        assert_eq!(status.idle, 1);
    }

    #[test]
    fn evict_stale_partitions_by_age() {
        let local: LocalPool<u32> = LocalPool::new(3);
        for _ in 0..3 {
            assert!(matches!(local.begin_take(), TakeAttempt::Empty(_)));
        }
        local.put(1);
        local.put(2);
        local.put(3);

        let idle_timeout = Duration::from_secs(1);
        let stale = local.evict_stale(Instant::now(), idle_timeout);
        assert!(stale.is_empty());
        assert_eq!(local.status().idle, 3);

        let far_future = Instant::now() + Duration::from_secs(600);
        let stale = local.evict_stale(far_future, idle_timeout);
        assert_eq!(stale, vec![1, 2, 3]);
        let status = local.status();
        assert_eq!(status.idle, 0);
        // Eviction releases cached resources, not borrowed ones.
        assert_eq!(status.available, 3);
    }

    #[test]
    fn drain_cache_leaves_available_untouched() {
        let local: LocalPool<u32> = LocalPool::new(2);
        assert!(matches!(local.begin_take(), TakeAttempt::Empty(_)));
        assert!(matches!(local.begin_take(), TakeAttempt::Empty(_)));
        local.put(1);

        let drained = local.drain_cache();
        assert_eq!(drained, vec![1]);
        let status = local.status();
        assert_eq!(status.idle, 0);
        assert_eq!(status.available, 1);
    }

    #[test]
    fn restore_available_recredit_capacity() {
        let local: LocalPool<u32> = LocalPool::new(2);
        assert!(matches!(local.begin_take(), TakeAttempt::Empty(1)));
        local.restore_available();
        assert_eq!(local.status().available, 2);
    }
}
