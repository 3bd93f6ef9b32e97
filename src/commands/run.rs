//! Run command handler.
//!
//! Wires a demo strategy to the paper backend, places one buy order per
//! instrument and keeps reconciling until Ctrl-C.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::{
    ConfigSource, EnvConfigSource, MapConfigSource, CANCEL_TIME_SPAN, RECONCILE_INTERVAL,
};
use crate::exchange::PaperBackend;
use crate::market::QuoteRegistry;
use crate::orders::ReconciliationReport;
use crate::strategy::{ControlSurface, Strategy, StrategyContext, StrategyRuntime};
use crate::types::{InstrumentCode, Quote};

/// Options for the `run` subcommand.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub codes: Vec<InstrumentCode>,
    pub cancel_after: Option<u64>,
    pub interval: Option<u64>,
    pub quantity: u64,
    pub price: Decimal,
    pub stuck: bool,
}

impl RunOptions {
    fn config_source(&self) -> LayeredSource {
        let mut overrides = MapConfigSource::new();
        if let Some(secs) = self.cancel_after {
            overrides = overrides.with(CANCEL_TIME_SPAN, secs.to_string());
        }
        if let Some(secs) = self.interval {
            overrides = overrides.with(RECONCILE_INTERVAL, secs.to_string());
        }
        LayeredSource {
            overrides,
            fallback: EnvConfigSource::load(),
        }
    }
}

/// Command-line flags first, then the environment.
struct LayeredSource {
    overrides: MapConfigSource,
    fallback: EnvConfigSource,
}

impl ConfigSource for LayeredSource {
    fn get(&self, key: &str) -> Option<String> {
        self.overrides.get(key).or_else(|| self.fallback.get(key))
    }
}

struct DemoStrategy {
    codes: Vec<InstrumentCode>,
}

#[async_trait]
impl Strategy for DemoStrategy {
    fn name(&self) -> &str {
        "demo"
    }

    fn description(&self) -> &str {
        "Places one order per instrument and lets reconciliation cancel it"
    }

    async fn on_quote(&self, _ctx: &StrategyContext, code: &str, quote: &Quote) {
        debug!(symbol = code, price = %quote.price, volume = quote.volume, "Quote received");
    }
}

impl ControlSurface for DemoStrategy {
    fn setup(&self) {
        info!(instruments = self.codes.len(), "Demo strategy configured");
    }

    fn show_data(&self) {
        println!("Watching: {}", self.codes.join(", "));
    }

    fn import_pool(&self) -> Vec<InstrumentCode> {
        self.codes.clone()
    }
}

/// Run the demo strategy until Ctrl-C.
///
/// # Errors
/// Returns error if the cancellation threshold is missing or invalid, or if
/// the paper backend cannot report the account.
pub async fn run_demo(options: RunOptions) -> Result<(), Box<dyn std::error::Error>> {
    let source = options.config_source();
    let backend = Arc::new(PaperBackend::default());
    let registry = Arc::new(QuoteRegistry::default());

    let runtime = Arc::new(StrategyRuntime::from_source(
        DemoStrategy {
            codes: options.codes.clone(),
        },
        backend.clone(),
        registry.clone(),
        &source,
    )?);
    let ctx = runtime.context().clone();
    let settings = ctx.reconciler().settings().clone();
    info!(
        strategy = runtime.name(),
        cancel_after_secs = settings.cancel_after.as_secs(),
        interval_secs = settings.interval.as_secs(),
        "Reconciliation configured"
    );

    runtime.strategy().setup();
    runtime.import_pool().await;
    runtime.init().await?;
    runtime.strategy().show_data();

    let account = ctx.account_snapshot().await?;
    println!("{}", serde_json::to_string_pretty(&account)?);

    for (i, code) in ctx.pool().codes().await.iter().enumerate() {
        match ctx.buy(code, options.price, options.quantity).await {
            Ok(id) if i == 0 && options.stuck => {
                backend.refuse_cancel(&id).await;
                warn!(order_id = %id, "Order marked uncancellable");
            }
            Ok(_) => {}
            Err(e) => error!(symbol = %code, error = %e, "Demo order rejected"),
        }
    }

    let reconciliation = runtime.clone().start_reconciliation();
    let mut ticker = tokio::time::interval(settings.interval);
    let mut tick: i64 = 0;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown requested");
                break;
            }
            _ = ticker.tick() => {
                tick += 1;
                for code in ctx.pool().codes().await {
                    let quote = Quote {
                        price: options.price + Decimal::new(tick % 10, 2),
                        volume: options.quantity,
                        timestamp: Utc::now(),
                    };
                    registry.push(&code, quote.clone()).await;
                    runtime.dispatch_quote(&code, &quote).await;
                }
                runtime.on_tick().await;

                let view = ctx.market_view().await;
                info!(
                    tracked = ctx.tracker().len().await,
                    instruments = view.len(),
                    "Tick"
                );
            }
        }
    }

    if let Some(report) = shutdown(&runtime, reconciliation).await {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    let outstanding = ctx.tracker().snapshot().await;
    println!("{}", serde_json::to_string_pretty(&outstanding)?);

    Ok(())
}

/// Stop the periodic loop, then run one last cycle.
async fn shutdown<S: Strategy>(
    runtime: &StrategyRuntime<S>,
    reconciliation: JoinHandle<()>,
) -> Option<ReconciliationReport> {
    // The aborted loop releases its in-flight guard only once it is dropped
    reconciliation.abort();
    if let Err(e) = reconciliation.await {
        if !e.is_cancelled() {
            error!(error = %e, "Reconciliation task failed");
        }
    }

    match runtime.run_cycle().await {
        Ok(Some(report)) => Some(report),
        Ok(None) => {
            info!("Strategy invalid, final pass skipped");
            None
        }
        Err(e) => {
            error!(error = %e, "Final reconciliation pass failed");
            None
        }
    }
}
