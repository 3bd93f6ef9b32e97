//! CLI argument parsing using clap.

use clap::{Parser, Subcommand};

/// trader-base - strategy runtime with stale-order reconciliation
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// The subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Set the verbosity level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    pub verbose: String,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Run a demo strategy against the paper backend until Ctrl-C
    Run {
        /// Instrument codes to watch (comma-separated, e.g., "600036,000001")
        #[arg(long, value_delimiter = ',', required = true)]
        codes: Vec<String>,
        /// Seconds after which an unfilled order is cancelled.
        /// Falls back to CANCEL_TIME_SPAN from the environment.
        #[arg(long)]
        cancel_after: Option<u64>,
        /// Seconds between reconciliation passes.
        /// Falls back to RECONCILE_INTERVAL, then 5.
        #[arg(long)]
        interval: Option<u64>,
        /// Quantity of each demo order
        #[arg(long, default_value_t = 100)]
        quantity: u64,
        /// Limit price of each demo order
        #[arg(long, default_value = "10.00")]
        price: String,
        /// Leave the first demo order uncancellable to show retry behavior
        #[arg(long, default_value_t = false)]
        stuck: bool,
    },
}
