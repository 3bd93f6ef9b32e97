//! Order-entry delegate.
//!
//! Forwards buy/sell/cancel to the injected [`TradingBackend`] and keeps the
//! entrustment table consistent with what the backend acknowledged:
//! - a submitted order is tracked only once the backend returned its id
//! - an order is untracked only once the backend confirmed the cancel

use std::sync::Arc;

use rust_decimal::Decimal;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::exchange::{BackendError, TradingAccountSnapshot, TradingBackend};
use crate::orders::{EntrustmentRecord, EntrustmentTracker, OrderId, TrackerError};
use crate::types::OrderSide;

/// Fund-market venue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FundVenue {
    Shenzhen,
    Shanghai,
}

impl std::fmt::Display for FundVenue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FundVenue::Shenzhen => write!(f, "SZ"),
            FundVenue::Shanghai => write!(f, "SH"),
        }
    }
}

/// Fund-market operations. Declared for forward compatibility; none are
/// supported by this runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FundOperation {
    Purchase {
        venue: FundVenue,
        code: String,
        total: Decimal,
    },
    Redeem {
        venue: FundVenue,
        code: String,
        quantity: u64,
    },
    Merge {
        venue: FundVenue,
        code: String,
        quantity: u64,
    },
    Split {
        venue: FundVenue,
        code: String,
        quantity: u64,
    },
}

impl std::fmt::Display for FundOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (action, venue, code) = match self {
            FundOperation::Purchase { venue, code, .. } => ("purchase", venue, code),
            FundOperation::Redeem { venue, code, .. } => ("redeem", venue, code),
            FundOperation::Merge { venue, code, .. } => ("merge", venue, code),
            FundOperation::Split { venue, code, .. } => ("split", venue, code),
        };
        write!(f, "fund {} {}.{}", action, code, venue)
    }
}

/// Errors surfaced by the trading delegate.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TradingError {
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// The order was placed but its id collided with an outstanding entry
    #[error(transparent)]
    Tracking(#[from] TrackerError),

    #[error("Unsupported operation: {0}")]
    Unsupported(FundOperation),
}

pub struct TradingDelegate {
    backend: Arc<dyn TradingBackend>,
    tracker: EntrustmentTracker,
}

impl TradingDelegate {
    pub fn new(backend: Arc<dyn TradingBackend>, tracker: EntrustmentTracker) -> Self {
        Self { backend, tracker }
    }

    pub fn tracker(&self) -> &EntrustmentTracker {
        &self.tracker
    }

    /// Submit a buy order and track it.
    ///
    /// # Errors
    /// `Backend` if the backend rejected the order (nothing is tracked);
    /// `Tracking` if the returned id is already outstanding.
    pub async fn buy(
        &self,
        code: &str,
        price: Decimal,
        quantity: u64,
    ) -> Result<OrderId, TradingError> {
        self.submit(OrderSide::Buy, code, price, quantity).await
    }

    /// Submit a sell order and track it. See [`buy`](Self::buy).
    pub async fn sell(
        &self,
        code: &str,
        price: Decimal,
        quantity: u64,
    ) -> Result<OrderId, TradingError> {
        self.submit(OrderSide::Sell, code, price, quantity).await
    }

    #[instrument(skip(self))]
    async fn submit(
        &self,
        side: OrderSide,
        code: &str,
        price: Decimal,
        quantity: u64,
    ) -> Result<OrderId, TradingError> {
        let result = match side {
            OrderSide::Buy => self.backend.buy(code, price, quantity).await,
            OrderSide::Sell => self.backend.sell(code, price, quantity).await,
        };

        let order_id = match result {
            Ok(id) => id,
            Err(e) => {
                warn!(symbol = code, error = %e, "Order submission failed");
                return Err(e.into());
            }
        };

        self.tracker.track(order_id.clone()).await?;
        info!(order_id = %order_id, symbol = code, "Order submitted");
        Ok(order_id)
    }

    /// Cancel an order. The entry is untracked only after the backend
    /// acknowledged the cancel; on failure it stays tracked.
    #[instrument(skip(self, order_id), fields(order_id = %order_id))]
    pub async fn cancel(&self, order_id: &OrderId) -> Result<OrderId, TradingError> {
        let confirmed = match self.backend.cancel(order_id).await {
            Ok(confirmed) => confirmed,
            Err(e) => {
                warn!(error = %e, "Cancel failed, order remains tracked");
                return Err(e.into());
            }
        };

        if &confirmed != order_id {
            debug!(confirmed = %confirmed, "Backend confirmed cancel under a different id");
        }
        self.tracker.untrack(order_id).await;
        info!("Cancel confirmed");
        Ok(confirmed)
    }

    /// Record that the backend reported `order_id` fully filled.
    pub async fn confirm_filled(&self, order_id: &OrderId) -> Option<EntrustmentRecord> {
        let removed = self.tracker.untrack(order_id).await;
        if removed.is_some() {
            info!(order_id = %order_id, "Fill confirmed");
        }
        removed
    }

    /// Keep the backend session alive.
    pub async fn keep(&self) -> Result<(), TradingError> {
        debug!("Keeping trading session alive");
        self.backend.keep().await.map_err(Into::into)
    }

    pub async fn account_snapshot(&self) -> Result<TradingAccountSnapshot, TradingError> {
        self.backend.account_snapshot().await.map_err(Into::into)
    }

    /// Fund-market entry point. Always fails with `Unsupported`.
    pub fn fund(&self, operation: FundOperation) -> Result<OrderId, TradingError> {
        warn!(operation = %operation, "Fund-market operation requested but not supported");
        Err(TradingError::Unsupported(operation))
    }

    pub fn purchase_fund(
        &self,
        venue: FundVenue,
        code: &str,
        total: Decimal,
    ) -> Result<OrderId, TradingError> {
        self.fund(FundOperation::Purchase {
            venue,
            code: code.to_string(),
            total,
        })
    }

    pub fn redeem_fund(
        &self,
        venue: FundVenue,
        code: &str,
        quantity: u64,
    ) -> Result<OrderId, TradingError> {
        self.fund(FundOperation::Redeem {
            venue,
            code: code.to_string(),
            quantity,
        })
    }

    pub fn merge_fund(
        &self,
        venue: FundVenue,
        code: &str,
        quantity: u64,
    ) -> Result<OrderId, TradingError> {
        self.fund(FundOperation::Merge {
            venue,
            code: code.to_string(),
            quantity,
        })
    }

    pub fn split_fund(
        &self,
        venue: FundVenue,
        code: &str,
        quantity: u64,
    ) -> Result<OrderId, TradingError> {
        self.fund(FundOperation::Split {
            venue,
            code: code.to_string(),
            quantity,
        })
    }
}
