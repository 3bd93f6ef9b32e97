//! Strategy base.
//!
//! A strategy implements [`Strategy`] for its trading logic and, when it has
//! a user-facing side, [`ControlSurface`]. [`StrategyRuntime`] binds one to a
//! [`StrategyContext`] that owns the pool, market view, delegate and
//! reconciler.

pub mod pool;
mod runtime;

pub use pool::{PoolObserver, StockPool};
pub use runtime::{StrategyContext, StrategyRuntime};

use async_trait::async_trait;
use thiserror::Error;

use crate::orders::{ReconcileError, ReconciliationReport};
use crate::trading::TradingError;
use crate::types::{InstrumentCode, Quote};

/// Errors raised by strategy hooks.
#[derive(Debug, Error)]
pub enum StrategyError {
    #[error("Strategy initialization failed: {0}")]
    Init(String),

    #[error("Trading error: {0}")]
    Trading(#[from] TradingError),
}

/// Trading capability of a strategy.
///
/// Every hook receives the shared context. Only `name` and `description`
/// are required; `run` defaults to one reconciliation pass.
#[async_trait]
pub trait Strategy: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    async fn init(&self, _ctx: &StrategyContext) -> Result<(), StrategyError> {
        Ok(())
    }

    /// One run cycle.
    async fn run(&self, ctx: &StrategyContext) -> Result<ReconciliationReport, ReconcileError> {
        ctx.reconcile().await
    }

    async fn on_tick(&self, _ctx: &StrategyContext) {}

    /// Called for quote updates on pool members.
    async fn on_quote(&self, _ctx: &StrategyContext, _code: &str, _quote: &Quote) {}
}

/// User-facing capability of a strategy: setup, display and data import.
pub trait ControlSurface: Send + Sync {
    fn setup(&self) {}

    fn show_data(&self) {}

    /// Instrument codes to seed the stock pool with.
    fn import_pool(&self) -> Vec<InstrumentCode> {
        Vec::new()
    }

    /// Historical quotes to preload.
    fn load_data(&self) -> Vec<Quote> {
        Vec::new()
    }
}
