//! # Striped Pool: a cancellation-safe resource pool for Rust
//!
//! A general-purpose pool for expensive, reusable resources: database
//! connections, cryptographic sessions, worker handles. The pool keeps a
//! bounded set of idle resources, hands them out most-recently-used first,
//! and reclaims the ones that sit idle too long.
//!
//! ## Guarantees
//!
//! - **Bounded resource count**: never more than `max_resources` live
//!   resources (rounded up to a multiple of the stripe count).
//! - **Fair waiting**: when a stripe is exhausted, borrowers queue FIFO and
//!   a returning resource goes to the oldest waiter directly, without
//!   touching the cache.
//! - **Striping**: capacity is split into one stripe per scheduler unit,
//!   each behind its own mutex, so unrelated borrowers never contend.
//! - **Timely reclamation**: a background reaper evicts entries idle past
//!   the configured timeout, with at most a second of lag.
//! - **Cancellation safety**: dropping a `take` future at any await point
//!   leaks neither the resource nor the capacity it accounts for.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::convert::Infallible;
//! use std::time::Duration;
//!
//! use striped_pool::{ManageResource, Pool};
//!
//! struct Crypto;
//!
//! struct CryptoManager;
//!
//! impl ManageResource for CryptoManager {
//!     type Resource = Crypto;
//!     type Error = Infallible;
//!
//!     async fn create(&self) -> Result<Crypto, Infallible> {
//!         Ok(Crypto)
//!     }
//!
//!     async fn destroy(&self, _session: Crypto) -> Result<(), Infallible> {
//!         Ok(())
//!     }
//! }
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = Pool::builder(CryptoManager)
//!     .max_resources(8)
//!     .idle_timeout(Duration::from_secs(30))
//!     .build()?;
//!
//! // Borrow; the resource returns to the pool when `session` drops.
//! let session = pool.take().await?;
//! println!("acquired via {:?}", session.method());
//! drop(session);
//!
//! // Tear down, observing every destructor.
//! pool.shutdown().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Borrow lifecycle
//!
//! [`Pool::take`] resolves against the calling thread's stripe in one of
//! three ways, reported by [`PooledResource::method`]:
//!
//! - [`Taken`](AcquireMethod::Taken): an idle entry was claimed from the
//!   cache (the common, warm case).
//! - [`Created`](AcquireMethod::Created): the cache was empty but capacity
//!   remained, so the manager constructed a fresh resource.
//! - [`WaitedFor`](AcquireMethod::WaitedFor): the stripe was exhausted; the
//!   borrower queued and received a resource directly from a returning
//!   borrower.
//!
//! Dropping the [`PooledResource`] returns the resource. A resource known
//! to be broken must be handed to [`PooledResource::destroy`] instead; the
//! pool performs no health checking of its own. For scoped use,
//! [`Pool::with_resource`] returns the resource on success and destroys it
//! when the callback fails or unwinds.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

mod config;
mod error;
mod manager;
mod pool;
mod pooled;
mod queue;
mod selector;
mod stripe;

pub use config::{PoolConfig, MIN_IDLE_TIMEOUT};
pub use error::ConfigError;
pub use manager::ManageResource;
pub use pool::{Pool, PoolBuilder, PoolStatus};
pub use pooled::{AcquireMethod, PooledResource};
pub use stripe::StripeStatus;
