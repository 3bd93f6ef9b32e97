//! Core types for entrustment tracking.
//!
//! Provides type-safe order identifiers and the outstanding-order record.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Entrustment number assigned by the trading backend.
///
/// Never generated locally: the runtime only learns ids from backend
/// responses. Serializes as a bare string.
///
/// ```
/// use trader_base::orders::OrderId;
///
/// let id = OrderId::new("E20240101-0001");
/// assert_eq!(id.as_str(), "E20240101-0001");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(String);

impl OrderId {
    /// Wrap a backend-assigned id. An empty id is accepted but logged,
    /// since it cannot be told apart from a missing one.
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        if id.is_empty() {
            tracing::warn!("Backend returned an empty order id");
        }
        Self(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl std::fmt::Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for OrderId {
    fn from(id: String) -> Self {
        Self::new(id)
    }
}

impl From<&str> for OrderId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// One outstanding (unconfirmed, unfilled) order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntrustmentRecord {
    /// Backend-assigned order id
    pub order_id: OrderId,
    /// When the order was registered with the tracker
    pub submitted_at: DateTime<Utc>,
}

impl EntrustmentRecord {
    #[must_use]
    pub fn new(order_id: OrderId, submitted_at: DateTime<Utc>) -> Self {
        Self {
            order_id,
            submitted_at,
        }
    }

    /// Age of the record at `now`. Negative if `now` precedes submission.
    #[must_use]
    pub fn age_at(&self, now: DateTime<Utc>) -> Duration {
        now - self.submitted_at
    }
}
