//! Common Types Module
//!
//! Shared types used across the codebase to avoid circular dependencies.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Opaque identifier of a tradable instrument (e.g., "600036").
pub type InstrumentCode = String;

/// Order side (buy or sell)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "buy"),
            OrderSide::Sell => write!(f, "sell"),
        }
    }
}

/// A single quote snapshot for one instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    /// Last traded price.
    pub price: Decimal,
    /// Volume at this update.
    pub volume: u64,
    /// When the market-data side received the update.
    pub timestamp: DateTime<Utc>,
}

// --- Time Abstraction ---

pub trait Clock: Send + Sync + std::fmt::Debug {
    fn now(&self) -> DateTime<Utc>;
    fn now_ts_millis(&self) -> i64 {
        self.now().timestamp_millis()
    }
}

#[derive(Debug, Clone)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to. Used to replay order ages deterministically.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now_millis: std::sync::Arc<std::sync::atomic::AtomicI64>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now_millis: std::sync::Arc::new(std::sync::atomic::AtomicI64::new(
                start.timestamp_millis(),
            )),
        }
    }

    pub fn advance(&self, by: std::time::Duration) {
        self.now_millis.fetch_add(
            by.as_millis() as i64,
            std::sync::atomic::Ordering::SeqCst,
        );
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        let millis = self.now_millis.load(std::sync::atomic::Ordering::SeqCst);
        DateTime::<Utc>::from_timestamp_millis(millis).unwrap_or_default()
    }
}
