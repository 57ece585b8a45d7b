//! Pool configuration and validation.

use std::time::Duration;

use crate::error::ConfigError;
use crate::selector;

/// The shortest idle timeout a pool will accept.
///
/// The reaper runs on a one-second period, so shorter timeouts would only
/// pretend to offer a tighter eviction bound than the pool can deliver.
pub const MIN_IDLE_TIMEOUT: Duration = Duration::from_millis(500);

/// Configuration for a [`Pool`](crate::Pool).
///
/// Usually assembled through [`PoolBuilder`](crate::PoolBuilder) rather than
/// directly. The defaults are a starting point for connection-pool style
/// workloads: 16 resources, a 30 second idle timeout, and one stripe per
/// scheduler unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Upper bound on resources that exist at once, across all stripes.
    ///
    /// Capacity is divided evenly between stripes by rounding up, so the
    /// effective total can exceed this by up to `stripes - 1`.
    pub max_resources: usize,

    /// How long a returned resource may sit idle before the reaper evicts it.
    pub idle_timeout: Duration,

    /// Explicit stripe count. `None` means one stripe per scheduler unit,
    /// sampled at construction time.
    pub stripes: Option<usize>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_resources: 16,
            idle_timeout: Duration::from_secs(30),
            stripes: None,
        }
    }
}

impl PoolConfig {
    /// Check the configuration against the constructive preconditions.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.idle_timeout < MIN_IDLE_TIMEOUT {
            return Err(ConfigError::IdleTimeoutTooShort(self.idle_timeout));
        }
        if self.max_resources == 0 {
            return Err(ConfigError::NoCapacity);
        }
        if self.stripes == Some(0) {
            return Err(ConfigError::NoStripes);
        }
        Ok(())
    }

    /// Number of stripes this configuration resolves to.
    pub(crate) fn stripe_count(&self) -> usize {
        self.stripes.unwrap_or_else(selector::scheduler_units)
    }

    /// Per-stripe capacity: `ceil(max_resources / stripes)`.
    pub(crate) fn per_stripe_capacity(&self, stripes: usize) -> usize {
        self.max_resources.div_ceil(stripes)
    }
}
