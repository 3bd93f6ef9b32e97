//! Trading Backend Abstraction
//!
//! The order-entry seam of the runtime. Concrete brokers implement
//! [`TradingBackend`]; strategies never talk to them directly but go through
//! the [`TradingDelegate`](crate::trading::TradingDelegate), which keeps the
//! entrustment table in step with every backend call.

pub mod paper;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::orders::OrderId;

pub use paper::PaperBackend;

/// Errors reported by a trading backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// The backend refused the request (bad price, insufficient funds, unknown order...)
    #[error("Order rejected: {0}")]
    Rejected(String),

    /// Transport or session failure; the request may be retried
    #[error("Network error: {0}")]
    Network(String),

    /// The trading session is not logged in or has expired
    #[error("Session unavailable: {0}")]
    Session(String),

    #[error("Backend error: {0}")]
    Other(String),
}

/// Account state as reported by the backend. Opaque to the runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradingAccountSnapshot {
    /// Backend account identifier
    pub account_id: String,
    /// Cash available for new orders
    pub available_cash: Decimal,
    /// Total account value (cash + holdings)
    pub total_assets: Decimal,
    /// When the backend produced the snapshot
    pub as_of: DateTime<Utc>,
}

/// Core trait for order entry - broker implementations must provide this.
///
/// Calls may block on the broker for an arbitrary time; the runtime never
/// assumes they complete quickly.
#[async_trait]
pub trait TradingBackend: Send + Sync {
    /// Submit a buy order. Returns the backend-assigned order id.
    async fn buy(
        &self,
        code: &str,
        price: Decimal,
        quantity: u64,
    ) -> Result<OrderId, BackendError>;

    /// Submit a sell order. Returns the backend-assigned order id.
    async fn sell(
        &self,
        code: &str,
        price: Decimal,
        quantity: u64,
    ) -> Result<OrderId, BackendError>;

    /// Cancel an outstanding order. `Ok` means the backend acknowledged it.
    async fn cancel(&self, order_id: &OrderId) -> Result<OrderId, BackendError>;

    /// Keep the trading session alive.
    async fn keep(&self) -> Result<(), BackendError>;

    /// Fetch the current account state.
    async fn account_snapshot(&self) -> Result<TradingAccountSnapshot, BackendError>;
}
