//! Per-strategy market view.
//!
//! The view is the registry filtered down to the strategy's stock pool. It is
//! built lazily and cached together with the pool and registry versions it
//! was built from; any pool mutation bumps the pool version, so the next
//! access rebuilds it.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;

use super::registry::{QuoteQueue, QuoteRegistry};
use crate::strategy::StockPool;
use crate::types::InstrumentCode;

/// Read-only `code -> queue` projection of the registry.
#[derive(Debug, Clone, Default)]
pub struct MarketView {
    queues: HashMap<InstrumentCode, Arc<QuoteQueue>>,
}

impl MarketView {
    pub fn get(&self, code: &str) -> Option<&Arc<QuoteQueue>> {
        self.queues.get(code)
    }

    pub fn contains(&self, code: &str) -> bool {
        self.queues.contains_key(code)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.queues.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }

    /// Codes in the view, sorted.
    pub fn codes(&self) -> Vec<InstrumentCode> {
        let mut codes: Vec<InstrumentCode> = self.queues.keys().cloned().collect();
        codes.sort();
        codes
    }

    pub fn iter(&self) -> impl Iterator<Item = (&InstrumentCode, &Arc<QuoteQueue>)> {
        self.queues.iter()
    }
}

/// Build a fresh view: every pool code that the registry knows about.
/// Pool codes missing from the registry are left out.
pub fn compute_view<'a, I>(pool: I, registry: &QuoteRegistry) -> MarketView
where
    I: IntoIterator<Item = &'a InstrumentCode>,
{
    let queues = pool
        .into_iter()
        .filter_map(|code| registry.get(code).map(|queue| (code.clone(), queue)))
        .collect();
    MarketView { queues }
}

#[derive(Debug)]
struct CachedView {
    pool_version: u64,
    registry_version: u64,
    view: Arc<MarketView>,
}

/// Lazily computed, version-checked market view.
///
/// Concurrent first accesses serialize on the write lock and re-check the
/// cache before computing, so all callers observe the same view.
#[derive(Debug, Default)]
pub struct MarketViewCache {
    cached: RwLock<Option<CachedView>>,
}

impl MarketViewCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current view for `pool`, rebuilding it if the pool or registry changed.
    pub async fn get(&self, pool: &StockPool, registry: &QuoteRegistry) -> Arc<MarketView> {
        {
            let cached = self.cached.read().await;
            if let Some(entry) = cached.as_ref() {
                if entry.pool_version == pool.version()
                    && entry.registry_version == registry.version()
                {
                    return Arc::clone(&entry.view);
                }
            }
        }

        let mut cached = self.cached.write().await;
        let (pool_version, codes) = pool.snapshot().await;
        // Read before computing: a concurrent insert then forces another rebuild
        let registry_version = registry.version();

        if let Some(entry) = cached.as_ref() {
            if entry.pool_version == pool_version && entry.registry_version == registry_version {
                return Arc::clone(&entry.view);
            }
        }

        let view = Arc::new(compute_view(&codes, registry));
        debug!(
            pool_version,
            registry_version,
            instruments = view.len(),
            "Market view rebuilt"
        );
        *cached = Some(CachedView {
            pool_version,
            registry_version,
            view: Arc::clone(&view),
        });
        view
    }

    /// Drop the cached view; the next `get` rebuilds it.
    pub async fn invalidate(&self) {
        *self.cached.write().await = None;
    }
}
