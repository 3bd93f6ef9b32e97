//! Strategy runtime.
//!
//! [`StrategyContext`] bundles the shared state every strategy gets: stock
//! pool, market view, trading delegate and reconciler. [`StrategyRuntime`]
//! pairs a context with a concrete [`Strategy`] and drives its hooks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rust_decimal::Decimal;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use super::pool::{PoolObserver, StockPool};
use super::{ControlSurface, Strategy, StrategyError};
use crate::config::{ConfigError, ConfigSource, ReconcileSettings};
use crate::exchange::{TradingAccountSnapshot, TradingBackend};
use crate::market::{MarketView, MarketViewCache, QuoteRegistry};
use crate::orders::{
    EntrustmentReconciler, EntrustmentTracker, OrderId, ReconcileError, ReconciliationReport,
};
use crate::trading::{TradingDelegate, TradingError};
use crate::types::{Clock, Quote, SystemClock};

/// Shared per-strategy state handed to every strategy hook.
pub struct StrategyContext {
    pool: StockPool,
    registry: Arc<QuoteRegistry>,
    view: MarketViewCache,
    delegate: Arc<TradingDelegate>,
    reconciler: Arc<EntrustmentReconciler>,
    valid: AtomicBool,
}

impl StrategyContext {
    /// Wire a context from its collaborators.
    ///
    /// # Errors
    /// Fails if the reconciliation settings are unusable.
    pub fn new(
        backend: Arc<dyn TradingBackend>,
        registry: Arc<QuoteRegistry>,
        settings: ReconcileSettings,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        let tracker = EntrustmentTracker::new(clock);
        let delegate = Arc::new(TradingDelegate::new(backend, tracker));
        let reconciler = Arc::new(EntrustmentReconciler::new(delegate.clone(), settings)?);

        Ok(Self {
            pool: StockPool::new(),
            registry,
            view: MarketViewCache::new(),
            delegate,
            reconciler,
            valid: AtomicBool::new(true),
        })
    }

    // --- Stock pool ---

    pub fn pool(&self) -> &StockPool {
        &self.pool
    }

    pub async fn add_instrument(&self, code: &str) -> bool {
        let changed = self.pool.add_instrument(code).await;
        if changed {
            self.view.invalidate().await;
        }
        changed
    }

    pub async fn remove_instrument(&self, code: &str) -> bool {
        let changed = self.pool.remove_instrument(code).await;
        if changed {
            self.view.invalidate().await;
        }
        changed
    }

    pub async fn subscribe(&self, observer: Arc<dyn PoolObserver>) {
        self.pool.subscribe(observer).await;
    }

    // --- Market data ---

    /// Quote queues for the instruments currently in the pool.
    pub async fn market_view(&self) -> Arc<MarketView> {
        self.view.get(&self.pool, &self.registry).await
    }

    pub fn registry(&self) -> &Arc<QuoteRegistry> {
        &self.registry
    }

    // --- Trading ---

    pub fn delegate(&self) -> &TradingDelegate {
        &self.delegate
    }

    pub fn tracker(&self) -> &EntrustmentTracker {
        self.delegate.tracker()
    }

    pub async fn buy(
        &self,
        code: &str,
        price: Decimal,
        quantity: u64,
    ) -> Result<OrderId, TradingError> {
        self.delegate.buy(code, price, quantity).await
    }

    pub async fn sell(
        &self,
        code: &str,
        price: Decimal,
        quantity: u64,
    ) -> Result<OrderId, TradingError> {
        self.delegate.sell(code, price, quantity).await
    }

    pub async fn cancel(&self, order_id: &OrderId) -> Result<OrderId, TradingError> {
        self.delegate.cancel(order_id).await
    }

    pub async fn keep(&self) -> Result<(), TradingError> {
        self.delegate.keep().await
    }

    pub async fn account_snapshot(&self) -> Result<TradingAccountSnapshot, TradingError> {
        self.delegate.account_snapshot().await
    }

    // --- Reconciliation ---

    pub fn reconciler(&self) -> &Arc<EntrustmentReconciler> {
        &self.reconciler
    }

    pub async fn reconcile(&self) -> Result<ReconciliationReport, ReconcileError> {
        self.reconciler.reconcile().await
    }

    // --- Validity ---

    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    pub fn set_valid(&self, valid: bool) {
        self.valid.store(valid, Ordering::Release);
    }
}

/// A concrete strategy bound to its context.
pub struct StrategyRuntime<S> {
    strategy: S,
    context: Arc<StrategyContext>,
}

impl<S: Strategy> StrategyRuntime<S> {
    pub fn new(strategy: S, context: StrategyContext) -> Self {
        Self {
            strategy,
            context: Arc::new(context),
        }
    }

    /// Build a runtime on the system clock, reading reconciliation
    /// settings from `source`.
    ///
    /// # Errors
    /// Missing or unparsable cancellation threshold.
    pub fn from_source(
        strategy: S,
        backend: Arc<dyn TradingBackend>,
        registry: Arc<QuoteRegistry>,
        source: &dyn ConfigSource,
    ) -> Result<Self, ConfigError> {
        let settings = ReconcileSettings::from_source(source)?;
        let context = StrategyContext::new(backend, registry, settings, Arc::new(SystemClock))?;
        Ok(Self::new(strategy, context))
    }

    pub fn strategy(&self) -> &S {
        &self.strategy
    }

    pub fn context(&self) -> &Arc<StrategyContext> {
        &self.context
    }

    pub fn name(&self) -> &str {
        self.strategy.name()
    }

    pub fn description(&self) -> &str {
        self.strategy.description()
    }

    pub fn is_valid(&self) -> bool {
        self.context.is_valid()
    }

    /// Mark the strategy valid or invalid. Invalid strategies skip run cycles
    /// and ticks.
    pub fn set_valid(&self, valid: bool) {
        info!(strategy = self.name(), valid, "Strategy validity changed");
        self.context.set_valid(valid);
    }

    pub async fn init(&self) -> Result<(), StrategyError> {
        info!(strategy = self.name(), "Initializing strategy");
        self.strategy.init(&self.context).await
    }

    /// One run cycle. Skipped while the strategy is marked invalid.
    pub async fn run_cycle(&self) -> Result<Option<ReconciliationReport>, ReconcileError> {
        if !self.context.is_valid() {
            debug!(strategy = self.name(), "Strategy invalid, run skipped");
            return Ok(None);
        }
        self.strategy.run(&self.context).await.map(Some)
    }

    pub async fn on_tick(&self) {
        if self.context.is_valid() {
            self.strategy.on_tick(&self.context).await;
        }
    }

    /// Forward a quote update to the strategy if `code` is in the pool.
    ///
    /// Returns `true` if the strategy saw the quote.
    pub async fn dispatch_quote(&self, code: &str, quote: &Quote) -> bool {
        if !self.context.pool().contains(code).await {
            return false;
        }
        self.strategy.on_quote(&self.context, code, quote).await;
        true
    }

    /// Spawn the periodic run loop: one [`run_cycle`](Self::run_cycle) per
    /// reconciliation interval.
    ///
    /// Invalid strategies are skipped tick by tick, and ticks missed while a
    /// slow cycle was running are dropped. Abort the returned handle to stop.
    pub fn start_reconciliation(self: Arc<Self>) -> tokio::task::JoinHandle<()>
    where
        S: 'static,
    {
        let interval = self.context.reconciler().settings().interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if let Err(e) = self.run_cycle().await {
                    debug!(strategy = self.name(), error = %e, "Periodic run skipped");
                }
            }
        })
    }
}

impl<S: Strategy + ControlSurface> StrategyRuntime<S> {
    /// Add every code the strategy's control surface imports.
    ///
    /// Returns how many codes were new to the pool.
    pub async fn import_pool(&self) -> usize {
        let mut added = 0;
        for code in self.strategy.import_pool() {
            if self.context.add_instrument(&code).await {
                added += 1;
            }
        }
        info!(strategy = self.name(), added, "Stock pool imported");
        added
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::PaperBackend;
    use crate::types::ManualClock;
    use async_trait::async_trait;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct Watcher {
        quotes: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Strategy for Watcher {
        fn name(&self) -> &str {
            "watcher"
        }

        fn description(&self) -> &str {
            "records quotes"
        }

        async fn init(&self, ctx: &StrategyContext) -> Result<(), StrategyError> {
            ctx.add_instrument("600036").await;
            Ok(())
        }

        async fn on_quote(&self, _ctx: &StrategyContext, code: &str, _quote: &Quote) {
            self.quotes.lock().unwrap().push(code.to_string());
        }
    }

    impl ControlSurface for Watcher {
        fn import_pool(&self) -> Vec<String> {
            vec!["600036".into(), "000001".into()]
        }
    }

    fn runtime(clock: ManualClock) -> (StrategyRuntime<Watcher>, Arc<PaperBackend>) {
        let backend = Arc::new(PaperBackend::default());
        let context = StrategyContext::new(
            backend.clone(),
            Arc::new(QuoteRegistry::default()),
            ReconcileSettings::new(Duration::from_secs(60), Duration::from_secs(5)),
            Arc::new(clock),
        )
        .unwrap();
        (StrategyRuntime::new(Watcher::default(), context), backend)
    }

    fn quote() -> Quote {
        Quote {
            price: dec!(10.5),
            volume: 100,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_dispatch_quote_only_for_pool_members() {
        let (runtime, _) = runtime(ManualClock::new(Utc::now()));
        runtime.init().await.unwrap();

        assert!(runtime.dispatch_quote("600036", &quote()).await);
        assert!(!runtime.dispatch_quote("600000", &quote()).await);
        assert_eq!(*runtime.strategy().quotes.lock().unwrap(), vec!["600036"]);
    }

    #[tokio::test]
    async fn test_market_view_follows_pool() {
        let (runtime, _) = runtime(ManualClock::new(Utc::now()));
        let ctx = runtime.context();
        ctx.registry().push("600036", quote()).await;
        ctx.registry().push("000001", quote()).await;

        runtime.init().await.unwrap();
        assert_eq!(ctx.market_view().await.codes(), vec!["600036".to_string()]);

        ctx.add_instrument("000001").await;
        assert_eq!(ctx.market_view().await.len(), 2);

        ctx.remove_instrument("600036").await;
        assert_eq!(ctx.market_view().await.codes(), vec!["000001".to_string()]);
    }

    #[tokio::test]
    async fn test_run_reconciles_stale_orders() {
        let clock = ManualClock::new(Utc::now());
        let (runtime, backend) = runtime(clock.clone());
        let ctx = runtime.context();

        let id = ctx.buy("600036", dec!(10.5), 100).await.unwrap();
        clock.advance(Duration::from_secs(61));

        let report = runtime.run_cycle().await.unwrap().unwrap();
        assert_eq!(report.confirmed(), 1);
        assert!(!ctx.tracker().is_tracked(&id).await);
        assert_eq!(backend.open_order_count().await, 0);
    }

    #[tokio::test]
    async fn test_invalid_strategy_skips_run() {
        let clock = ManualClock::new(Utc::now());
        let (runtime, _) = runtime(clock.clone());
        let ctx = runtime.context();

        ctx.buy("600036", dec!(10.5), 100).await.unwrap();
        clock.advance(Duration::from_secs(120));
        runtime.set_valid(false);

        assert!(runtime.run_cycle().await.unwrap().is_none());
        assert_eq!(ctx.tracker().len().await, 1);

        runtime.set_valid(true);
        assert_eq!(runtime.run_cycle().await.unwrap().unwrap().confirmed(), 1);
    }

    #[tokio::test]
    async fn test_import_pool_counts_new_codes() {
        let (runtime, _) = runtime(ManualClock::new(Utc::now()));
        runtime.init().await.unwrap();

        assert_eq!(runtime.import_pool().await, 1);
        assert_eq!(runtime.context().pool().len().await, 2);
    }

    /// Counts `run` calls before delegating to the default pass
    #[derive(Default)]
    struct Counting {
        runs: AtomicUsize,
    }

    #[async_trait]
    impl Strategy for Counting {
        fn name(&self) -> &str {
            "counting"
        }

        fn description(&self) -> &str {
            "counts run cycles"
        }

        async fn run(
            &self,
            ctx: &StrategyContext,
        ) -> Result<ReconciliationReport, ReconcileError> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            ctx.reconcile().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_loop_honors_validity_and_run_override() {
        let clock = ManualClock::new(Utc::now());
        let context = StrategyContext::new(
            Arc::new(PaperBackend::default()),
            Arc::new(QuoteRegistry::default()),
            ReconcileSettings::new(Duration::from_secs(60), Duration::from_secs(1)),
            Arc::new(clock.clone()),
        )
        .unwrap();
        let runtime = Arc::new(StrategyRuntime::new(Counting::default(), context));
        let ctx = runtime.context().clone();

        let id = ctx.buy("600036", dec!(10.5), 100).await.unwrap();
        clock.advance(Duration::from_secs(120));
        runtime.set_valid(false);

        let handle = runtime.clone().start_reconciliation();
        tokio::time::sleep(Duration::from_millis(2500)).await;

        // Invalid: no cycle reached the strategy, the stale order survives
        assert_eq!(runtime.strategy().runs.load(Ordering::SeqCst), 0);
        assert!(ctx.tracker().is_tracked(&id).await);

        runtime.set_valid(true);
        tokio::time::sleep(Duration::from_millis(1500)).await;

        assert!(runtime.strategy().runs.load(Ordering::SeqCst) >= 1);
        assert!(ctx.tracker().is_empty().await);
        handle.abort();
    }
}
