//! In-process paper trading backend.
//!
//! Assigns sequential order ids and keeps a book of open orders so cancels
//! can be acknowledged or rejected the way a real broker would.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::{BackendError, TradingAccountSnapshot, TradingBackend};
use crate::orders::OrderId;
use crate::types::OrderSide;

pub struct PaperBackend {
    account_id: String,
    cash: Decimal,
    next_id: AtomicU64,
    open_orders: RwLock<HashSet<OrderId>>,
    /// Orders whose cancel the backend will refuse (simulates a stuck order)
    sticky: RwLock<HashSet<OrderId>>,
}

impl PaperBackend {
    pub fn new(account_id: impl Into<String>, cash: Decimal) -> Self {
        Self {
            account_id: account_id.into(),
            cash,
            next_id: AtomicU64::new(1),
            open_orders: RwLock::new(HashSet::new()),
            sticky: RwLock::new(HashSet::new()),
        }
    }

    /// Make every future cancel of `order_id` fail with `Rejected`.
    pub async fn refuse_cancel(&self, order_id: &OrderId) {
        self.sticky.write().await.insert(order_id.clone());
    }

    /// Simulate a fill: the order leaves the book.
    pub async fn fill(&self, order_id: &OrderId) -> bool {
        self.open_orders.write().await.remove(order_id)
    }

    pub async fn open_order_count(&self) -> usize {
        self.open_orders.read().await.len()
    }

    async fn submit(
        &self,
        side: OrderSide,
        code: &str,
        price: Decimal,
        quantity: u64,
    ) -> Result<OrderId, BackendError> {
        if quantity == 0 {
            return Err(BackendError::Rejected("quantity must be positive".into()));
        }
        if price <= Decimal::ZERO {
            return Err(BackendError::Rejected(format!("invalid price {}", price)));
        }

        let seq = self.next_id.fetch_add(1, Ordering::SeqCst);
        let id = OrderId::new(format!("paper-{:06}", seq));
        self.open_orders.write().await.insert(id.clone());

        info!(
            order_id = %id,
            symbol = code,
            side = %side,
            price = %price,
            quantity = quantity,
            "Paper order accepted"
        );
        Ok(id)
    }
}

impl Default for PaperBackend {
    fn default() -> Self {
        Self::new("paper", Decimal::new(1_000_000, 0))
    }
}

#[async_trait]
impl TradingBackend for PaperBackend {
    async fn buy(
        &self,
        code: &str,
        price: Decimal,
        quantity: u64,
    ) -> Result<OrderId, BackendError> {
        self.submit(OrderSide::Buy, code, price, quantity).await
    }

    async fn sell(
        &self,
        code: &str,
        price: Decimal,
        quantity: u64,
    ) -> Result<OrderId, BackendError> {
        self.submit(OrderSide::Sell, code, price, quantity).await
    }

    async fn cancel(&self, order_id: &OrderId) -> Result<OrderId, BackendError> {
        if self.sticky.read().await.contains(order_id) {
            return Err(BackendError::Rejected(format!(
                "order {} cannot be cancelled",
                order_id
            )));
        }
        if !self.open_orders.write().await.remove(order_id) {
            return Err(BackendError::Rejected(format!(
                "order {} is not open",
                order_id
            )));
        }
        debug!(order_id = %order_id, "Paper order cancelled");
        Ok(order_id.clone())
    }

    async fn keep(&self) -> Result<(), BackendError> {
        Ok(())
    }

    async fn account_snapshot(&self) -> Result<TradingAccountSnapshot, BackendError> {
        Ok(TradingAccountSnapshot {
            account_id: self.account_id.clone(),
            available_cash: self.cash,
            total_assets: self.cash,
            as_of: Utc::now(),
        })
    }
}
