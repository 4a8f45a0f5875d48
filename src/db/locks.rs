//! Per-account async locks serializing ledger mutations.

use crate::domain::GainId;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

/// Entries are pruned once the map grows past this size.
const PRUNE_THRESHOLD: usize = 10_000;

/// Mutations on the same account run one at a time; different accounts
/// proceed in parallel.
#[derive(Debug, Clone, Default)]
pub struct AccountLocks {
    inner: Arc<DashMap<GainId, Arc<Mutex<()>>>>,
}

impl AccountLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `account`. Released when the guard drops.
    pub async fn acquire(&self, account: &GainId) -> OwnedMutexGuard<()> {
        if self.inner.len() > PRUNE_THRESHOLD {
            self.prune_idle();
        }
        let lock = Arc::clone(&*self.inner.entry(account.clone()).or_default());
        lock.lock_owned().await
    }

    /// Drop locks nobody holds or waits on.
    pub fn prune_idle(&self) {
        let before = self.inner.len();
        self.inner.retain(|_, lock| Arc::strong_count(lock) > 1);
        debug!(before, after = self.inner.len(), "Pruned idle account locks");
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
