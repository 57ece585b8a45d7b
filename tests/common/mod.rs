//! Shared test support: a manager that counts and records every callback.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use striped_pool::{ManageResource, Pool, PoolStatus};

/// Error a scripted create or destroy call reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendError(pub usize);

#[derive(Default)]
pub struct Counters {
    create_calls: AtomicUsize,
    created: AtomicUsize,
    destroyed: AtomicUsize,
    destroyed_values: Mutex<Vec<usize>>,
}

impl Counters {
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    /// Destroy attempts, including ones scripted to fail.
    pub fn destroyed(&self) -> usize {
        self.destroyed.load(Ordering::SeqCst)
    }

    pub fn destroyed_values(&self) -> Vec<usize> {
        self.destroyed_values.lock().unwrap().clone()
    }
}

/// Hands out the create-call number as the resource itself, so tests can
/// check handoff identity, and records every value it is asked to destroy.
pub struct TrackingManager {
    counters: Arc<Counters>,
    fail_creates: HashSet<usize>,
    fail_destroys: bool,
}

impl TrackingManager {
    pub fn new() -> (Self, Arc<Counters>) {
        Self::build(&[], false)
    }

    pub fn failing_creates(calls: &[usize]) -> (Self, Arc<Counters>) {
        Self::build(calls, false)
    }

    pub fn failing_destroys() -> (Self, Arc<Counters>) {
        Self::build(&[], true)
    }

    fn build(fail_creates: &[usize], fail_destroys: bool) -> (Self, Arc<Counters>) {
        let counters = Arc::new(Counters::default());
        let manager = Self {
            counters: Arc::clone(&counters),
            fail_creates: fail_creates.iter().copied().collect(),
            fail_destroys,
        };
        (manager, counters)
    }
}

impl ManageResource for TrackingManager {
    type Resource = usize;
    type Error = BackendError;

    async fn create(&self) -> Result<usize, BackendError> {
        let call = self.counters.create_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_creates.contains(&call) {
            return Err(BackendError(call));
        }
        self.counters.created.fetch_add(1, Ordering::SeqCst);
        Ok(call)
    }

    async fn destroy(&self, value: usize) -> Result<(), BackendError> {
        self.counters.destroyed.fetch_add(1, Ordering::SeqCst);
        self.counters.destroyed_values.lock().unwrap().push(value);
        if self.fail_destroys {
            return Err(BackendError(value));
        }
        Ok(())
    }
}

/// A single-stripe pool with a long idle timeout, so tests control every
/// state transition themselves.
pub fn single_stripe_pool(max: usize) -> (Pool<TrackingManager>, Arc<Counters>) {
    let (manager, counters) = TrackingManager::new();
    let pool = Pool::builder(manager)
        .max_resources(max)
        .stripes(1)
        .idle_timeout(Duration::from_secs(600))
        .build()
        .unwrap();
    (pool, counters)
}

/// Yield enough times for spawned tasks and background destroys to run.
pub async fn settle() {
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
}

/// Yield until `condition` holds, panicking if it never does.
pub async fn wait_for<M, F>(pool: &Pool<M>, condition: F)
where
    M: ManageResource,
    F: Fn(&PoolStatus) -> bool,
{
    for _ in 0..1000 {
        if condition(&pool.status()) {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition not reached: {:?}", pool.status());
}
