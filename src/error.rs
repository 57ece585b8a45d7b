//! Error types for pool construction.
//!
//! Runtime failures are deliberately not represented here: a failed resource
//! creation propagates the manager's own error type unchanged, and destructor
//! failures are swallowed by the pool (see the crate documentation).

use std::time::Duration;

use thiserror::Error;

use crate::config::MIN_IDLE_TIMEOUT;

/// Error returned when a pool is built from an invalid configuration.
///
/// Construction is the only place the pool itself can fail; every variant is
/// fatal and surfaced to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// The idle timeout is below the supported minimum.
    ///
    /// The reaper polls on a fixed one-second period, so timeouts much
    /// shorter than that cannot be honored meaningfully.
    #[error("idle timeout must be at least {MIN_IDLE_TIMEOUT:?}, got {0:?}")]
    IdleTimeoutTooShort(Duration),

    /// `max_resources` was zero.
    #[error("pool must allow at least one resource")]
    NoCapacity,

    /// An explicit stripe count of zero was requested.
    #[error("pool must have at least one stripe")]
    NoStripes,
}
