//! Base runtime for automated trading strategies.
//!
//! Tracks the instruments a strategy watches, forwards orders to a trading
//! backend, remembers which orders are still outstanding and cancels the ones
//! that have been open too long.

pub mod cli;
pub mod commands;
pub mod config;
pub mod exchange;
pub mod market;
pub mod observability;
pub mod orders;
pub mod strategy;
pub mod trading;
pub mod types;
