//! Order Management Module
//!
//! Tracks outstanding orders (entrustments) and reconciles them against
//! the configured cancellation window.
//!
//! # Architecture
//!
//! - `EntrustmentTracker` - Thread-safe table of outstanding orders
//! - `EntrustmentReconciler` - Cancels orders that outlived the threshold
//! - Core types - `OrderId`, `EntrustmentRecord`
//!
//! # Example
//!
//! ```ignore
//! use trader_base::orders::{EntrustmentTracker, OrderId};
//!
//! let tracker = EntrustmentTracker::default();
//! tracker.track(OrderId::new("E-1")).await?;
//! ```

mod reconciler;
mod tracker;
mod types;

pub use reconciler::{
    CancelAttempt, CancelResult, EntrustmentReconciler, ReconcileError, ReconciliationReport,
};
pub use tracker::{EntrustmentTracker, TrackerError};
pub use types::{EntrustmentRecord, OrderId};
