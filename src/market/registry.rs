//! Global quote registry.
//!
//! Maps instrument codes to their buffered quote queues. The market-data side
//! pushes into it; strategies only read. Backed by `DashMap` so lookups from
//! many strategies never contend on a single lock.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::RwLock;
use tracing::debug;

use crate::types::{InstrumentCode, Quote};

/// Default number of quotes kept per instrument.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// Bounded FIFO of recent quotes for one instrument.
///
/// When full, pushing evicts the oldest quote.
#[derive(Debug)]
pub struct QuoteQueue {
    code: InstrumentCode,
    capacity: usize,
    quotes: RwLock<VecDeque<Quote>>,
}

impl QuoteQueue {
    pub fn new(code: impl Into<InstrumentCode>, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            code: code.into(),
            capacity,
            quotes: RwLock::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub async fn push(&self, quote: Quote) {
        let mut quotes = self.quotes.write().await;
        if quotes.len() == self.capacity {
            quotes.pop_front();
        }
        quotes.push_back(quote);
    }

    /// Most recent quote, if any.
    pub async fn latest(&self) -> Option<Quote> {
        self.quotes.read().await.back().cloned()
    }

    /// All buffered quotes, oldest first.
    pub async fn snapshot(&self) -> Vec<Quote> {
        self.quotes.read().await.iter().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.quotes.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// Concurrent `code -> queue` registry.
///
/// `version()` changes after every insertion or removal of a queue, so
/// derived views can tell when they need rebuilding.
#[derive(Debug)]
pub struct QuoteRegistry {
    queues: DashMap<InstrumentCode, Arc<QuoteQueue>>,
    capacity: usize,
    version: AtomicU64,
}

impl Default for QuoteRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

impl QuoteRegistry {
    /// Create an empty registry whose queues hold `capacity` quotes each.
    pub fn new(capacity: usize) -> Self {
        Self {
            queues: DashMap::new(),
            capacity,
            version: AtomicU64::new(0),
        }
    }

    /// Queue for `code`, creating it if needed.
    pub fn queue(&self, code: &str) -> Arc<QuoteQueue> {
        if let Some(queue) = self.queues.get(code) {
            return Arc::clone(queue.value());
        }
        let mut created = false;
        let queue = self
            .queues
            .entry(code.to_string())
            .or_insert_with(|| {
                created = true;
                Arc::new(QuoteQueue::new(code, self.capacity))
            })
            .value()
            .clone();
        if created {
            self.version.fetch_add(1, Ordering::AcqRel);
            debug!(symbol = code, "Quote queue registered");
        }
        queue
    }

    /// Append a quote to the queue for `code`, creating the queue if needed.
    pub async fn push(&self, code: &str, quote: Quote) {
        self.queue(code).push(quote).await;
    }

    /// Drop the queue for `code`. Strategies holding a reference keep it alive.
    pub fn remove(&self, code: &str) -> Option<Arc<QuoteQueue>> {
        let removed = self.queues.remove(code).map(|(_, q)| q);
        if removed.is_some() {
            self.version.fetch_add(1, Ordering::AcqRel);
            debug!(symbol = code, "Quote queue removed");
        }
        removed
    }

    pub fn get(&self, code: &str) -> Option<Arc<QuoteQueue>> {
        self.queues.get(code).map(|q| Arc::clone(q.value()))
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

    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal::Decimal;

    fn quote(price: i64) -> Quote {
        Quote {
            price: Decimal::new(price, 2),
            volume: 100,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_queue_evicts_oldest() {
        let queue = QuoteQueue::new("600036", 2);
        queue.push(quote(1000)).await;
        queue.push(quote(1001)).await;
        queue.push(quote(1002)).await;

        let prices: Vec<Decimal> = queue.snapshot().await.into_iter().map(|q| q.price).collect();
        assert_eq!(prices, vec![Decimal::new(1001, 2), Decimal::new(1002, 2)]);
        assert_eq!(queue.latest().await.unwrap().price, Decimal::new(1002, 2));
    }

    #[tokio::test]
    async fn test_registry_push_creates_queue() {
        let registry = QuoteRegistry::new(8);
        assert!(registry.get("600036").is_none());

        registry.push("600036", quote(1000)).await;
        let queue = registry.get("600036").unwrap();
        assert_eq!(queue.len().await, 1);
        assert_eq!(queue.capacity(), 8);
    }

    #[test]
    fn test_version_tracks_membership_changes() {
        let registry = QuoteRegistry::default();
        let v0 = registry.version();

        let first = registry.queue("A");
        let v1 = registry.version();
        assert!(v1 > v0);

        // Existing queue is shared, version unchanged
        let again = registry.queue("A");
        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(registry.version(), v1);

        registry.remove("A");
        assert!(registry.version() > v1);
        assert!(registry.remove("A").is_none());
    }
}
