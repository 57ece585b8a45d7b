//! Background eviction of stale idle entries.

use std::sync::atomic::Ordering;
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, warn};

use super::PoolInner;
use crate::ManageResource;

/// Fixed polling period, independent of the idle timeout. Eviction lag is
/// therefore bounded by `idle_timeout + REAP_PERIOD`.
pub(crate) const REAP_PERIOD: Duration = Duration::from_secs(1);

/// Spawn the reaper task for `inner`.
///
/// The task holds only a weak reference between ticks, so it never keeps a
/// dropped pool alive; it exits when the pool is gone or shut down.
pub(crate) fn spawn<M: ManageResource>(inner: &Arc<PoolInner<M>>) -> JoinHandle<()> {
    let weak = Arc::downgrade(inner);
    let shutdown = Arc::clone(&inner.shutdown);
    tokio::spawn(run(weak, shutdown))
}

async fn run<M: ManageResource>(weak: Weak<PoolInner<M>>, shutdown: Arc<tokio::sync::Notify>) {
    let mut ticks = time::interval(REAP_PERIOD);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = ticks.tick() => {}
            _ = shutdown.notified() => break,
        }
        let Some(inner) = weak.upgrade() else { break };
        if inner.closed.load(Ordering::Acquire) {
            break;
        }
        sweep(&inner).await;
    }
    debug!("reaper stopped");
}

/// One pass over every stripe: partition each cache by age under its lock,
/// then run the destructors outside any lock, swallowing their failures.
async fn sweep<M: ManageResource>(inner: &Arc<PoolInner<M>>) {
    let now = Instant::now();
    for (index, local) in inner.stripes.iter().enumerate() {
        let stale = local.evict_stale(now, inner.idle_timeout);
        if stale.is_empty() {
            continue;
        }
        debug!(stripe = index, count = stale.len(), "evicting idle resources");
        for value in stale {
            if inner.manager.destroy(value).await.is_err() {
                warn!(stripe = index, "resource destructor failed during eviction");
            }
        }
    }
}
