//! Order entry.
//!
//! The [`TradingDelegate`] is the only path from a strategy to the trading
//! backend; it keeps the entrustment table in step with backend results.

mod delegate;

pub use delegate::{FundOperation, FundVenue, TradingDelegate, TradingError};
