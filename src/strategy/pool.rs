//! Stock pool: the set of instruments a strategy watches.
//!
//! Observers are told about every add/remove request *before* the pool is
//! changed, synchronously and in registration order. A removal notification
//! is sent even when the code was not in the pool, so listeners must not
//! treat it as proof of prior membership.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;

use crate::types::InstrumentCode;

/// Listener for stock pool changes.
pub trait PoolObserver: Send + Sync {
    fn on_instrument_added(&self, _code: &str) {}
    fn on_instrument_removed(&self, _code: &str) {}
}

#[derive(Default)]
pub struct StockPool {
    codes: RwLock<HashSet<InstrumentCode>>,
    /// Bumped under the write lock whenever membership changes
    version: AtomicU64,
    observers: RwLock<Vec<Arc<dyn PoolObserver>>>,
}

impl StockPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an observer. Delivery order follows registration order.
    pub async fn subscribe(&self, observer: Arc<dyn PoolObserver>) {
        self.observers.write().await.push(observer);
    }

    /// Notify observers, then insert `code` if it is not already present.
    ///
    /// Returns `true` if the pool changed.
    pub async fn add_instrument(&self, code: &str) -> bool {
        for observer in self.observers_snapshot().await {
            observer.on_instrument_added(code);
        }

        let mut codes = self.codes.write().await;
        let inserted = codes.insert(code.to_string());
        if inserted {
            self.version.fetch_add(1, Ordering::AcqRel);
            debug!(symbol = code, size = codes.len(), "Instrument added to pool");
        }
        inserted
    }

    /// Notify observers, then remove `code` if present.
    ///
    /// Returns `true` if the pool changed.
    pub async fn remove_instrument(&self, code: &str) -> bool {
        for observer in self.observers_snapshot().await {
            observer.on_instrument_removed(code);
        }

        let mut codes = self.codes.write().await;
        let removed = codes.remove(code);
        if removed {
            self.version.fetch_add(1, Ordering::AcqRel);
            debug!(symbol = code, size = codes.len(), "Instrument removed from pool");
        }
        removed
    }

    pub async fn contains(&self, code: &str) -> bool {
        self.codes.read().await.contains(code)
    }

    /// Pool members, sorted.
    pub async fn codes(&self) -> Vec<InstrumentCode> {
        self.snapshot().await.1
    }

    /// Membership version together with the sorted members, read atomically.
    pub async fn snapshot(&self) -> (u64, Vec<InstrumentCode>) {
        let codes = self.codes.read().await;
        let version = self.version.load(Ordering::Acquire);
        let mut members: Vec<InstrumentCode> = codes.iter().cloned().collect();
        members.sort();
        (version, members)
    }

    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    pub async fn len(&self) -> usize {
        self.codes.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    // Observers run without any pool lock held, so they may read the pool.
    async fn observers_snapshot(&self) -> Vec<Arc<dyn PoolObserver>> {
        self.observers.read().await.clone()
    }
}
