//! The pool itself: stripe ownership, the acquisition protocol, and
//! teardown.
//!
//! Acquisition is split into a locked half and an unlocked half. The locked
//! half ([`LocalPool::begin_take`]) claims a cached entry, reserves capacity
//! for a creation, or enqueues a waiter; it never blocks on anything but the
//! stripe mutex. The unlocked half runs the manager's constructor or awaits
//! a handoff slot, and is guarded so that cancellation at any await point
//! leaves the stripe's accounting exact:
//!
//! - While waiting on a slot, a drop guard closes the slot (the tombstone a
//!   returning borrower skips over) and re-publishes the resource if the
//!   handoff had already happened.
//! - While creating, a drop guard re-credits the reserved capacity if the
//!   constructor fails or the caller is cancelled.
//!
//! Returns need no guard: they run synchronously inside `Drop`, where
//! nothing can interrupt them.

mod builder;
mod reaper;
mod status;


pub use builder::PoolBuilder;
pub use status::PoolStatus;

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::{oneshot, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::pooled::{AcquireMethod, PooledResource};
use crate::selector;
use crate::stripe::{LocalPool, TakeAttempt};
use crate::ManageResource;

/// Shared pool state: the stripe array, the manager, and the reaper handle.
pub(crate) struct PoolInner<M: ManageResource> {
    pub(crate) manager: Arc<M>,
    pub(crate) stripes: Box<[LocalPool<M::Resource>]>,
    pub(crate) idle_timeout: Duration,
    pub(crate) closed: AtomicBool,
    pub(crate) shutdown: Arc<Notify>,
    reaper: Mutex<Option<JoinHandle<()>>>,
}

impl<M: ManageResource> PoolInner<M> {
    /// Route a returning resource. A shut-down pool still serves queued
    /// waiters, but with nobody waiting the resource is destroyed instead
    /// of cached: the reaper is gone, so a cached entry would be stranded.
    pub(crate) fn release(&self, stripe: usize, value: M::Resource) {
        let local = &self.stripes[stripe];
        if self.closed.load(Ordering::Acquire) {
            if let Some(value) = local.try_handoff(value) {
                local.restore_available();
                self.spawn_destroy(value);
            }
        } else {
            local.put(value);
        }
    }

    /// Hand a value to the manager's destructor on a background task.
    ///
    /// Used from `Drop` implementations, which cannot await. Without a
    /// runtime on the current thread the value falls back to its own
    /// `Drop`.
    pub(crate) fn spawn_destroy(&self, value: M::Resource) {
        match Handle::try_current() {
            Ok(handle) => {
                let manager = Arc::clone(&self.manager);
                let _ = handle.spawn(async move {
                    if manager.destroy(value).await.is_err() {
                        warn!("resource destructor failed");
                    }
                });
            }
            Err(_) => drop(value),
        }
    }
}

impl<M: ManageResource> Drop for PoolInner<M> {
    fn drop(&mut self) {
        self.shutdown.notify_one();
        if let Some(handle) = self.reaper.get_mut().take() {
            handle.abort();
        }
        let mut drained = Vec::new();
        for local in self.stripes.iter() {
            drained.extend(local.drain_cache());
        }
        if drained.is_empty() {
            return;
        }
        match Handle::try_current() {
            Ok(handle) => {
                let manager = Arc::clone(&self.manager);
                let _ = handle.spawn(async move {
                    for value in drained {
                        if manager.destroy(value).await.is_err() {
                            warn!("resource destructor failed");
                        }
                    }
                });
            }
            // No runtime here; the values get their own Drop only. Callers
            // that need the destructor observed use `shutdown`.
            Err(_) => drop(drained),
        }
    }
}

/// A striped resource pool.
///
/// Cloning is cheap and every clone refers to the same pool. The pool keeps
/// at most `max_resources` resources alive (rounded up to a multiple of the
/// stripe count), hands idle ones out most-recently-used first, queues
/// borrowers FIFO per stripe when capacity runs out, and evicts entries
/// that sit idle past the configured timeout.
///
/// See the crate documentation for a usage example.
pub struct Pool<M: ManageResource> {
    inner: Arc<PoolInner<M>>,
}

impl<M: ManageResource> Pool<M> {
    /// Start configuring a pool around `manager`.
    pub fn builder(manager: M) -> PoolBuilder<M> {
        PoolBuilder::new(manager)
    }

    pub(crate) fn from_inner(inner: Arc<PoolInner<M>>) -> Self {
        Self { inner }
    }

    pub(crate) fn set_reaper(&self, handle: JoinHandle<()>) {
        *self.inner.reaper.lock() = Some(handle);
    }

    /// Borrow a resource from the calling thread's stripe.
    ///
    /// Fast path: pop the most recently returned idle entry. Empty cache
    /// with spare capacity: run the manager's constructor (outside the
    /// stripe lock; a failure or cancellation restores the reserved
    /// capacity and the error propagates unchanged). Exhausted stripe:
    /// queue behind earlier borrowers and wait, indefinitely, for a
    /// returning resource.
    ///
    /// # Cancellation
    ///
    /// Dropping the returned future at any point is safe: a queued waiter
    /// withdraws by tombstoning its slot, and a handoff that races the
    /// cancellation is re-published to the pool rather than lost.
    pub async fn take(&self) -> Result<PooledResource<M>, M::Error> {
        let index = selector::current_thread_slot() % self.inner.stripes.len();
        self.take_at(index).await
    }

    /// `take` against an explicit stripe. Exposed for tests that need
    /// deterministic placement.
    pub(crate) async fn take_at(&self, index: usize) -> Result<PooledResource<M>, M::Error> {
        let started = Instant::now();
        let inner = &self.inner;
        match inner.stripes[index].begin_take() {
            TakeAttempt::Wait(receiver) => {
                trace!(stripe = index, "stripe exhausted, queueing");
                let mut wait = WaitGuard {
                    receiver: Some(receiver),
                    inner: Arc::clone(inner),
                    stripe: index,
                };
                let value = wait.recv().await;
                Ok(PooledResource::new(
                    value,
                    Arc::clone(inner),
                    index,
                    AcquireMethod::WaitedFor,
                    started.elapsed(),
                    0,
                ))
            }
            TakeAttempt::Cached(value, available_after) => {
                trace!(stripe = index, available_after, "cache hit");
                Ok(PooledResource::new(
                    value,
                    Arc::clone(inner),
                    index,
                    AcquireMethod::Taken,
                    started.elapsed(),
                    available_after,
                ))
            }
            TakeAttempt::Empty(available_after) => {
                let restore = RestoreOnDrop {
                    inner: Arc::clone(inner),
                    stripe: index,
                    armed: true,
                };
                let value = inner.manager.create().await?;
                restore.disarm();
                debug!(stripe = index, available_after, "created resource");
                Ok(PooledResource::new(
                    value,
                    Arc::clone(inner),
                    index,
                    AcquireMethod::Created,
                    started.elapsed(),
                    available_after,
                ))
            }
        }
    }

    /// Borrow a resource for the duration of one callback.
    ///
    /// On `Ok` the resource returns to the pool. On `Err`, panic, or
    /// cancellation it is destroyed instead: a callback that failed
    /// part-way is evidence the resource may be corrupted.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// # use striped_pool::{ManageResource, Pool};
    /// # async fn demo<M>(pool: &Pool<M>) -> Result<usize, std::io::Error>
    /// # where
    /// #     M: ManageResource<Resource = Vec<u8>, Error = std::io::Error>,
    /// # {
    /// let len = pool
    ///     .with_resource(|buffer: &mut Vec<u8>| {
    ///         Box::pin(async move {
    ///             buffer.push(1);
    ///             Ok::<_, std::io::Error>(buffer.len())
    ///         })
    ///     })
    ///     .await?;
    /// # Ok(len)
    /// # }
    /// ```
    pub async fn with_resource<T, E, F>(&self, f: F) -> Result<T, E>
    where
        E: From<M::Error>,
        F: for<'r> FnOnce(
            &'r mut M::Resource,
        ) -> Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'r>>,
    {
        let mut pooled = self.take().await.map_err(E::from)?;
        // Broken until proven otherwise, so an unwinding callback destroys
        // the resource instead of returning it.
        pooled.set_broken(true);
        match f(pooled.value_mut()).await {
            Ok(result) => {
                pooled.set_broken(false);
                Ok(result)
            }
            Err(error) => {
                pooled.destroy().await;
                Err(error)
            }
        }
    }

    /// Destroy every idle resource in every stripe.
    ///
    /// Each stripe's cache is swapped for an empty one under its lock; the
    /// destructors then run outside any lock, and their failures are
    /// swallowed so one bad teardown cannot stop the rest of the batch.
    /// Borrowed resources are untouched, as is `available`: the counter
    /// tracks borrowed capacity, not cached entries.
    ///
    /// This is the recovery path for a wholesale backend failure, such as a
    /// server restart invalidating every pooled connection at once.
    pub async fn destroy_all(&self) {
        for (index, local) in self.inner.stripes.iter().enumerate() {
            let drained = local.drain_cache();
            if drained.is_empty() {
                continue;
            }
            debug!(stripe = index, count = drained.len(), "destroying cached resources");
            for value in drained {
                if self.inner.manager.destroy(value).await.is_err() {
                    warn!(stripe = index, "resource destructor failed");
                }
            }
        }
    }

    /// Shut the pool down: stop the reaper, then destroy every cached
    /// resource.
    ///
    /// Outstanding borrows stay valid, and queued waiters are still served
    /// by returning borrowers; a return nobody is waiting for is destroyed
    /// rather than cached. A second call returns immediately.
    ///
    /// Dropping the last handle tears the pool down too, but `Drop` cannot
    /// await the destructors; call this for a teardown that observes them.
    pub async fn shutdown(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        debug!("pool shutting down");
        self.inner.shutdown.notify_one();
        let reaper = self.inner.reaper.lock().take();
        if let Some(handle) = reaper {
            let _ = handle.await;
        }
        self.destroy_all().await;
    }

    /// Per-stripe counters, sampled stripe by stripe.
    pub fn status(&self) -> PoolStatus {
        PoolStatus {
            stripes: self.inner.stripes.iter().map(LocalPool::status).collect(),
        }
    }
}

impl<M: ManageResource> Clone for Pool<M> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<M: ManageResource> fmt::Debug for Pool<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("stripes", &self.inner.stripes.len())
            .field("idle_timeout", &self.inner.idle_timeout)
            .field("closed", &self.inner.closed.load(Ordering::Acquire))
            .finish()
    }
}

/// Cleanup for a waiter cancelled while parked on its slot.
///
/// Dropping this guard with the receiver still armed runs the withdrawal
/// protocol: close the slot, then check whether a returning borrower filled
/// it in the meantime. If it did, the resource is re-published through the
/// normal return path; losing it here would leak capacity permanently. If
/// not, the closed slot is the tombstone that makes the producer skip this
/// waiter.
struct WaitGuard<M: ManageResource> {
    receiver: Option<oneshot::Receiver<M::Resource>>,
    inner: Arc<PoolInner<M>>,
    stripe: usize,
}

impl<M: ManageResource> WaitGuard<M> {
    async fn recv(&mut self) -> M::Resource {
        let receiver = self
            .receiver
            .as_mut()
            .expect("slot already consumed - this is a bug");
        let value = receiver
            .await
            .expect("slot sender dropped without a handoff - this is a bug");
        self.receiver = None;
        value
    }
}

impl<M: ManageResource> Drop for WaitGuard<M> {
    fn drop(&mut self) {
        if let Some(mut receiver) = self.receiver.take() {
            receiver.close();
            if let Ok(value) = receiver.try_recv() {
                trace!(stripe = self.stripe, "cancelled waiter re-publishing handoff");
                self.inner.release(self.stripe, value);
            }
        }
    }
}

/// Re-credits reserved capacity unless disarmed.
///
/// Armed across the manager's constructor: both a constructor error and a
/// cancelled caller land here, and the stripe counter must come back up in
/// either case. Taking the stripe lock inside `drop` is what makes the
/// restore itself immune to interruption.
struct RestoreOnDrop<M: ManageResource> {
    inner: Arc<PoolInner<M>>,
    stripe: usize,
    armed: bool,
}

impl<M: ManageResource> RestoreOnDrop<M> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl<M: ManageResource> Drop for RestoreOnDrop<M> {
    fn drop(&mut self) {
        if self.armed {
            self.inner.stripes[self.stripe].restore_available();
        }
    }
}
