//! RAII handle for a borrowed resource.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::Duration;

use crate::pool::PoolInner;
use crate::ManageResource;

/// How an acquisition was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireMethod {
    /// No idle entry existed; the manager constructed a fresh resource.
    Created,
    /// An idle entry was claimed from the stripe cache.
    Taken,
    /// The stripe was exhausted; the caller queued and a returning borrower
    /// handed its resource over directly.
    WaitedFor,
}

/// A resource borrowed from a [`Pool`](crate::Pool).
///
/// Dropping the handle returns the resource to its originating stripe:
/// directly into the hands of the oldest live waiter if one is queued,
/// otherwise into the idle cache. The return path is synchronous and runs
/// entirely inside `drop`, so it cannot be interrupted part-way; either
/// path leaves the stripe's accounting exact.
///
/// A resource that should not be reused (a broken connection, a poisoned
/// session) must be [`destroy`](Self::destroy)ed instead of dropped.
pub struct PooledResource<M: ManageResource> {
    value: Option<M::Resource>,
    pool: Arc<PoolInner<M>>,
    stripe: usize,
    method: AcquireMethod,
    latency: Duration,
    available_after: usize,
    broken: bool,
}

impl<M: ManageResource> PooledResource<M> {
    pub(crate) fn new(
        value: M::Resource,
        pool: Arc<PoolInner<M>>,
        stripe: usize,
        method: AcquireMethod,
        latency: Duration,
        available_after: usize,
    ) -> Self {
        Self {
            value: Some(value),
            pool,
            stripe,
            method,
            latency,
            available_after,
            broken: false,
        }
    }

    /// How this acquisition was satisfied.
    pub fn method(&self) -> AcquireMethod {
        self.method
    }

    /// Time spent inside `take`, from entry to the resource being in hand.
    pub fn acquisition_latency(&self) -> Duration {
        self.latency
    }

    /// The stripe's unborrowed capacity immediately after this acquisition.
    ///
    /// Zero for [`AcquireMethod::WaitedFor`]: a handoff moves the resource
    /// straight from one borrower to the next without freeing capacity.
    pub fn available_after(&self) -> usize {
        self.available_after
    }

    /// Index of the stripe this borrow is bound to.
    ///
    /// The resource returns to the same stripe regardless of which thread
    /// drops the handle.
    pub fn stripe_index(&self) -> usize {
        self.stripe
    }

    /// Tear the resource down instead of returning it to the pool.
    ///
    /// The stripe's capacity is re-credited before the destructor runs, so
    /// a concurrent acquirer can construct a replacement without waiting on
    /// a potentially slow teardown. Destructor failures are swallowed.
    pub async fn destroy(mut self) {
        let value = self.take_value();
        self.pool.stripes[self.stripe].restore_available();
        if self.pool.manager.destroy(value).await.is_err() {
            tracing::warn!(stripe = self.stripe, "resource destructor failed");
        }
    }

    pub(crate) fn set_broken(&mut self, broken: bool) {
        self.broken = broken;
    }

    pub(crate) fn value_mut(&mut self) -> &mut M::Resource {
        self.value
            .as_mut()
            .expect("resource should be present - this is a bug")
    }

    fn take_value(&mut self) -> M::Resource {
        self.value
            .take()
            .expect("resource should be present - this is a bug")
    }
}

impl<M: ManageResource> Deref for PooledResource<M> {
    type Target = M::Resource;

    fn deref(&self) -> &Self::Target {
        self.value
            .as_ref()
            .expect("resource should be present - this is a bug")
    }
}

impl<M: ManageResource> DerefMut for PooledResource<M> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.value_mut()
    }
}

impl<M: ManageResource> Drop for PooledResource<M> {
    fn drop(&mut self) {
        let Some(value) = self.value.take() else {
            return;
        };
        if self.broken {
            // A borrow abandoned mid-callback may be corrupted: re-credit
            // capacity and hand the value to a background destroy instead
            // of caching it.
            self.pool.stripes[self.stripe].restore_available();
            self.pool.spawn_destroy(value);
        } else {
            self.pool.release(self.stripe, value);
        }
    }
}

// Debug without requiring Debug of the resource itself.
impl<M: ManageResource> fmt::Debug for PooledResource<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledResource")
            .field("stripe", &self.stripe)
            .field("method", &self.method)
            .field("available_after", &self.available_after)
            .field("has_value", &self.value.is_some())
            .finish()
    }
}
