//! Pool construction.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::debug;

use super::{reaper, Pool, PoolInner};
use crate::config::PoolConfig;
use crate::error::ConfigError;
use crate::stripe::LocalPool;
use crate::ManageResource;

/// Builder for a [`Pool`].
///
/// ```rust,no_run
/// # use std::time::Duration;
/// # use striped_pool::{ManageResource, Pool};
/// # fn demo<M: ManageResource>(manager: M) -> Result<Pool<M>, striped_pool::ConfigError> {
/// let pool = Pool::builder(manager)
///     .max_resources(32)
///     .idle_timeout(Duration::from_secs(60))
///     .build()?;
/// # Ok(pool)
/// # }
/// ```
#[derive(Debug)]
pub struct PoolBuilder<M: ManageResource> {
    manager: M,
    config: PoolConfig,
}

impl<M: ManageResource> PoolBuilder<M> {
    pub(crate) fn new(manager: M) -> Self {
        Self {
            manager,
            config: PoolConfig::default(),
        }
    }

    /// Upper bound on live resources across the whole pool.
    ///
    /// Capacity is split evenly across stripes by rounding up, so the
    /// effective bound is `ceil(max_resources / stripes) * stripes`.
    pub fn max_resources(mut self, max_resources: usize) -> Self {
        self.config.max_resources = max_resources;
        self
    }

    /// How long a resource may sit idle before the reaper evicts it.
    ///
    /// Must be at least [`MIN_IDLE_TIMEOUT`](crate::MIN_IDLE_TIMEOUT). The
    /// reaper polls once per second, so eviction lags staleness by at most
    /// a second.
    pub fn idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.config.idle_timeout = idle_timeout;
        self
    }

    /// Override the stripe count.
    ///
    /// Defaults to the number of scheduler units the host reports at build
    /// time; the count never adapts afterwards.
    pub fn stripes(mut self, stripes: usize) -> Self {
        self.config.stripes = Some(stripes);
        self
    }

    /// Replace the whole configuration at once.
    pub fn config(mut self, config: PoolConfig) -> Self {
        self.config = config;
        self
    }

    /// Validate the configuration, allocate the stripes, and start the
    /// reaper.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime; the reaper needs one to
    /// run on.
    pub fn build(self) -> Result<Pool<M>, ConfigError> {
        self.config.validate()?;
        let stripes = self.config.stripe_count();
        let capacity = self.config.per_stripe_capacity(stripes);

        let locals: Box<[LocalPool<M::Resource>]> =
            (0..stripes).map(|_| LocalPool::new(capacity)).collect();
        let inner = Arc::new(PoolInner {
            manager: Arc::new(self.manager),
            stripes: locals,
            idle_timeout: self.config.idle_timeout,
            closed: AtomicBool::new(false),
            shutdown: Arc::new(Notify::new()),
            reaper: Mutex::new(None),
        });

        let pool = Pool::from_inner(Arc::clone(&inner));
        pool.set_reaper(reaper::spawn(&inner));
        debug!(
            stripes,
            capacity_per_stripe = capacity,
            idle_timeout = ?self.config.idle_timeout,
            "pool started"
        );
        Ok(pool)
    }
}
