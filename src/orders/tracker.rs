//! Entrustment tracking.
//!
//! Keeps the table of outstanding orders for one strategy instance. Shared
//! between the strategy's own trading calls, market-data callbacks and the
//! reconciliation pass, so every access goes through a `RwLock`.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, error};

use super::types::{EntrustmentRecord, OrderId};
use crate::types::{Clock, SystemClock};

/// Errors that can occur during entrustment tracking.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TrackerError {
    /// The backend handed out an id that is already outstanding
    #[error("Order already tracked: {0}")]
    DuplicateOrder(OrderId),

    #[error("Order not tracked: {0}")]
    NotTracked(OrderId),
}

/// Thread-safe table of outstanding orders.
///
/// Cloning is cheap and yields a handle to the same table.
///
/// # Timestamps
///
/// Submission times come from the injected [`Clock`] so reconciliation
/// ages can be replayed in tests.
#[derive(Clone)]
pub struct EntrustmentTracker {
    entries: Arc<RwLock<HashMap<OrderId, EntrustmentRecord>>>,
    clock: Arc<dyn Clock>,
}

impl EntrustmentTracker {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            clock,
        }
    }

    /// Register a newly submitted order, stamped with the current time.
    ///
    /// Call this immediately after the backend returned the order id.
    pub async fn track(&self, id: OrderId) -> Result<EntrustmentRecord, TrackerError> {
        let mut entries = self.entries.write().await;
        if entries.contains_key(&id) {
            error!(order_id = %id, "Backend returned an order id that is already tracked");
            return Err(TrackerError::DuplicateOrder(id));
        }

        let record = EntrustmentRecord::new(id.clone(), self.clock.now());
        entries.insert(id.clone(), record.clone());
        debug!(order_id = %id, outstanding = entries.len(), "Entrustment tracked");
        Ok(record)
    }

    /// Remove an order after confirmed cancellation or fill.
    ///
    /// Removing an unknown id is a no-op and returns `None`.
    pub async fn untrack(&self, id: &OrderId) -> Option<EntrustmentRecord> {
        let mut entries = self.entries.write().await;
        let removed = entries.remove(id);
        if removed.is_some() {
            debug!(order_id = %id, outstanding = entries.len(), "Entrustment untracked");
        }
        removed
    }

    /// Age of a tracked order at `now`.
    pub async fn age_of(&self, id: &OrderId, now: DateTime<Utc>) -> Result<Duration, TrackerError> {
        let entries = self.entries.read().await;
        entries
            .get(id)
            .map(|record| record.age_at(now))
            .ok_or_else(|| TrackerError::NotTracked(id.clone()))
    }

    pub async fn get(&self, id: &OrderId) -> Option<EntrustmentRecord> {
        let entries = self.entries.read().await;
        entries.get(id).cloned()
    }

    pub async fn is_tracked(&self, id: &OrderId) -> bool {
        let entries = self.entries.read().await;
        entries.contains_key(id)
    }

    /// Point-in-time copy of every outstanding record, oldest first.
    pub async fn snapshot(&self) -> Vec<EntrustmentRecord> {
        let entries = self.entries.read().await;
        let mut records: Vec<EntrustmentRecord> = entries.values().cloned().collect();
        records.sort_by(|a, b| {
            a.submitted_at
                .cmp(&b.submitted_at)
                .then_with(|| a.order_id.cmp(&b.order_id))
        });
        records
    }

    #[must_use]
    pub async fn len(&self) -> usize {
        let entries = self.entries.read().await;
        entries.len()
    }

    #[must_use]
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// The clock used to stamp submissions.
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }
}

impl Default for EntrustmentTracker {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}
