//! Market data access for strategies.
//!
//! - `QuoteRegistry` - process-wide `code -> QuoteQueue` map fed by the market-data side
//! - `MarketView` - the registry filtered to one strategy's stock pool
//! - `MarketViewCache` - lazy, version-checked holder of the current view

mod registry;
mod view;

pub use registry::{QuoteQueue, QuoteRegistry, DEFAULT_QUEUE_CAPACITY};
pub use view::{compute_view, MarketView, MarketViewCache};
