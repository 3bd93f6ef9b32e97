//! Stale-order reconciliation.
//!
//! Periodically scans the entrustment table and cancels orders that have
//! been outstanding longer than the configured threshold. Orders leave the
//! table only when the backend confirms the cancel, so a failed attempt is
//! simply retried on the next pass.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::types::OrderId;
use crate::config::{ConfigError, ConfigSource, ReconcileSettings, CANCEL_TIME_SPAN};
use crate::trading::TradingDelegate;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReconcileError {
    /// Another pass is still running
    #[error("Reconciliation pass already in flight")]
    InFlight,
}

/// Outcome of one cancel attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum CancelResult {
    /// Backend acknowledged; the order is no longer tracked
    Confirmed,
    /// Backend call failed; the order stays tracked for the next pass
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelAttempt {
    pub order_id: OrderId,
    /// Age of the order when the pass examined it (seconds)
    pub age_secs: i64,
    pub result: CancelResult,
}

/// Audit record of one reconciliation pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub started_at: DateTime<Utc>,
    /// Cancellation threshold in effect (seconds)
    pub threshold_secs: u64,
    /// Number of tracked orders in the snapshot
    pub examined: usize,
    /// One entry per overdue order
    pub attempts: Vec<CancelAttempt>,
}

impl ReconciliationReport {
    pub fn confirmed(&self) -> usize {
        self.attempts
            .iter()
            .filter(|a| a.result == CancelResult::Confirmed)
            .count()
    }

    pub fn failed(&self) -> usize {
        self.attempts.len() - self.confirmed()
    }

    pub fn has_failures(&self) -> bool {
        self.failed() > 0
    }
}

/// Cancels orders that outlived the configured threshold.
///
/// # Architecture
///
/// - The threshold is read and validated once, at construction
/// - Each pass works on a snapshot of the table; orders tracked during the
///   pass are picked up by the next one
/// - Only one pass runs at a time, so an order never receives two concurrent
///   cancel requests from the reconciler
pub struct EntrustmentReconciler {
    delegate: Arc<TradingDelegate>,
    settings: ReconcileSettings,
    threshold: chrono::Duration,
    in_flight: Mutex<()>,
}

impl EntrustmentReconciler {
    /// # Errors
    /// `ConfigError::Invalid` if the threshold does not fit a calendar duration.
    pub fn new(
        delegate: Arc<TradingDelegate>,
        settings: ReconcileSettings,
    ) -> Result<Self, ConfigError> {
        let threshold =
            chrono::Duration::from_std(settings.cancel_after).map_err(|e| ConfigError::Invalid {
                key: CANCEL_TIME_SPAN.to_string(),
                value: settings.cancel_after.as_secs().to_string(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            delegate,
            settings,
            threshold,
            in_flight: Mutex::new(()),
        })
    }

    /// Build from a configuration source.
    ///
    /// # Errors
    /// Missing or unparsable `CANCEL_TIME_SPAN`.
    pub fn from_source(
        delegate: Arc<TradingDelegate>,
        source: &dyn ConfigSource,
    ) -> Result<Self, ConfigError> {
        let settings = ReconcileSettings::from_source(source)?;
        Self::new(delegate, settings)
    }

    pub fn settings(&self) -> &ReconcileSettings {
        &self.settings
    }

    /// Run one reconciliation pass.
    ///
    /// Every tracked order whose age strictly exceeds the threshold gets a
    /// cancel request. Failures are recorded in the report and do not stop
    /// the remaining cancels.
    ///
    /// # Errors
    /// `ReconcileError::InFlight` if another pass has not finished yet.
    pub async fn reconcile(&self) -> Result<ReconciliationReport, ReconcileError> {
        let Ok(_guard) = self.in_flight.try_lock() else {
            debug!("Reconciliation pass skipped: previous pass still running");
            return Err(ReconcileError::InFlight);
        };

        let tracker = self.delegate.tracker();
        let now = tracker.clock().now();
        let snapshot = tracker.snapshot().await;

        let mut report = ReconciliationReport {
            started_at: now,
            threshold_secs: self.settings.cancel_after.as_secs(),
            examined: snapshot.len(),
            attempts: Vec::new(),
        };

        for record in snapshot {
            let age = record.age_at(now);
            if age <= self.threshold {
                continue;
            }

            let result = match self.delegate.cancel(&record.order_id).await {
                Ok(_) => CancelResult::Confirmed,
                Err(e) => {
                    warn!(
                        order_id = %record.order_id,
                        age_secs = age.num_seconds(),
                        error = %e,
                        "Stale order cancel failed, will retry next pass"
                    );
                    CancelResult::Failed(e.to_string())
                }
            };

            report.attempts.push(CancelAttempt {
                order_id: record.order_id,
                age_secs: age.num_seconds(),
                result,
            });
        }

        if !report.attempts.is_empty() {
            info!(
                examined = report.examined,
                cancelled = report.confirmed(),
                failed = report.failed(),
                threshold_secs = report.threshold_secs,
                "Reconciliation pass completed"
            );
        }

        Ok(report)
    }

    /// Start the periodic reconciliation background task.
    ///
    /// Ticks missed while a slow pass was running are skipped rather than
    /// replayed. Returns a `JoinHandle` that can be used to abort the task.
    pub fn start_periodic(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        let interval = self.settings.interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if let Err(e) = self.reconcile().await {
                    debug!(error = %e, "Periodic reconciliation skipped");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MapConfigSource;
    use crate::exchange::{BackendError, TradingAccountSnapshot, TradingBackend};
    use crate::orders::EntrustmentTracker;
    use crate::types::ManualClock;
    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::Duration;
    use tokio::sync::{Notify, RwLock};

    /// Mock backend: sequential ids, configurable cancel failures
    struct MockBackend {
        next_id: AtomicU64,
        failing: RwLock<HashSet<OrderId>>,
        cancel_calls: RwLock<Vec<OrderId>>,
        /// When set, cancels block until notified
        gate: Option<Arc<Notify>>,
    }

    impl MockBackend {
        fn new() -> Self {
            Self {
                next_id: AtomicU64::new(1),
                failing: RwLock::new(HashSet::new()),
                cancel_calls: RwLock::new(Vec::new()),
                gate: None,
            }
        }

        async fn fail_cancel(&self, id: &OrderId) {
            self.failing.write().await.insert(id.clone());
        }

        async fn cancel_calls(&self) -> Vec<OrderId> {
            self.cancel_calls.read().await.clone()
        }
    }

    #[async_trait]
    impl TradingBackend for MockBackend {
        async fn buy(&self, _: &str, _: Decimal, _: u64) -> Result<OrderId, BackendError> {
            let n = self.next_id.fetch_add(1, Ordering::SeqCst);
            Ok(OrderId::new(format!("O{}", n)))
        }

        async fn sell(
            &self,
            code: &str,
            price: Decimal,
            qty: u64,
        ) -> Result<OrderId, BackendError> {
            self.buy(code, price, qty).await
        }

        async fn cancel(&self, order_id: &OrderId) -> Result<OrderId, BackendError> {
            self.cancel_calls.write().await.push(order_id.clone());
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            if self.failing.read().await.contains(order_id) {
                return Err(BackendError::Network("Mock failure".to_string()));
            }
            Ok(order_id.clone())
        }

        async fn keep(&self) -> Result<(), BackendError> {
            Ok(())
        }

        async fn account_snapshot(&self) -> Result<TradingAccountSnapshot, BackendError> {
            Err(BackendError::Other("not used".into()))
        }
    }

    fn setup(
        backend: Arc<MockBackend>,
        threshold_secs: u64,
    ) -> (EntrustmentReconciler, Arc<TradingDelegate>, ManualClock) {
        let clock = ManualClock::new(Utc::now());
        let tracker = EntrustmentTracker::new(Arc::new(clock.clone()));
        let delegate = Arc::new(TradingDelegate::new(backend, tracker));
        let settings = ReconcileSettings::new(
            Duration::from_secs(threshold_secs),
            Duration::from_secs(1),
        );
        let reconciler = EntrustmentReconciler::new(delegate.clone(), settings).unwrap();
        (reconciler, delegate, clock)
    }

    #[tokio::test]
    async fn test_only_overdue_orders_cancelled() {
        let backend = Arc::new(MockBackend::new());
        let (reconciler, delegate, clock) = setup(backend.clone(), 60);

        let old = delegate.buy("600036", Decimal::ONE, 100).await.unwrap();
        clock.advance(Duration::from_secs(60));
        let young = delegate.buy("600036", Decimal::ONE, 100).await.unwrap();
        clock.advance(Duration::from_secs(30));

        // old is 90s, young is 30s
        let report = reconciler.reconcile().await.unwrap();
        assert_eq!(report.examined, 2);
        assert_eq!(report.attempts.len(), 1);
        assert_eq!(report.attempts[0].order_id, old);
        assert_eq!(report.attempts[0].age_secs, 90);
        assert_eq!(report.attempts[0].result, CancelResult::Confirmed);

        let tracker = delegate.tracker();
        assert!(!tracker.is_tracked(&old).await);
        assert!(tracker.is_tracked(&young).await);
        assert_eq!(backend.cancel_calls().await, vec![old]);
    }

    #[tokio::test]
    async fn test_age_equal_to_threshold_not_cancelled() {
        let backend = Arc::new(MockBackend::new());
        let (reconciler, delegate, clock) = setup(backend.clone(), 60);

        delegate.buy("600036", Decimal::ONE, 100).await.unwrap();
        clock.advance(Duration::from_secs(60));

        let report = reconciler.reconcile().await.unwrap();
        assert!(report.attempts.is_empty());
        assert!(backend.cancel_calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_failed_cancel_retained_and_retried() {
        let backend = Arc::new(MockBackend::new());
        let (reconciler, delegate, clock) = setup(backend.clone(), 60);

        let id = delegate.buy("600036", Decimal::ONE, 100).await.unwrap();
        backend.fail_cancel(&id).await;
        clock.advance(Duration::from_secs(90));

        let report = reconciler.reconcile().await.unwrap();
        assert!(report.has_failures());
        assert!(delegate.tracker().is_tracked(&id).await);

        // Backend recovers; next pass confirms
        backend.failing.write().await.clear();
        let report = reconciler.reconcile().await.unwrap();
        assert_eq!(report.confirmed(), 1);
        assert!(delegate.tracker().is_empty().await);
        assert_eq!(backend.cancel_calls().await.len(), 2);
    }

    #[tokio::test]
    async fn test_failure_isolation() {
        let backend = Arc::new(MockBackend::new());
        let (reconciler, delegate, clock) = setup(backend.clone(), 60);

        let first = delegate.buy("600036", Decimal::ONE, 100).await.unwrap();
        clock.advance(Duration::from_secs(1));
        let second = delegate.buy("600000", Decimal::ONE, 100).await.unwrap();
        backend.fail_cancel(&first).await;
        clock.advance(Duration::from_secs(120));

        let report = reconciler.reconcile().await.unwrap();
        assert_eq!(report.attempts.len(), 2);
        assert_eq!(report.confirmed(), 1);
        assert_eq!(report.failed(), 1);

        let tracker = delegate.tracker();
        assert!(tracker.is_tracked(&first).await);
        assert!(!tracker.is_tracked(&second).await);
        assert_eq!(backend.cancel_calls().await, vec![first, second]);
    }

    #[tokio::test]
    async fn test_concurrent_pass_rejected() {
        let gate = Arc::new(Notify::new());
        let mut backend = MockBackend::new();
        backend.gate = Some(gate.clone());
        let backend = Arc::new(backend);
        let (reconciler, delegate, clock) = setup(backend.clone(), 10);
        let reconciler = Arc::new(reconciler);

        delegate.buy("600036", Decimal::ONE, 100).await.unwrap();
        clock.advance(Duration::from_secs(11));

        let running = {
            let r = reconciler.clone();
            tokio::spawn(async move { r.reconcile().await })
        };
        // Wait until the first pass is blocked inside the backend
        while backend.cancel_calls().await.is_empty() {
            tokio::task::yield_now().await;
        }

        assert_eq!(reconciler.reconcile().await.unwrap_err(), ReconcileError::InFlight);

        gate.notify_one();
        let report = running.await.unwrap().unwrap();
        assert_eq!(report.confirmed(), 1);
        assert_eq!(backend.cancel_calls().await.len(), 1);
    }

    #[tokio::test]
    async fn test_from_source_requires_threshold() {
        let backend = Arc::new(MockBackend::new());
        let delegate = Arc::new(TradingDelegate::new(backend, EntrustmentTracker::default()));

        let err = EntrustmentReconciler::from_source(delegate.clone(), &MapConfigSource::new());
        assert!(matches!(err, Err(ConfigError::Missing(_))));

        let source = MapConfigSource::new().with(CANCEL_TIME_SPAN, "abc");
        assert!(matches!(
            EntrustmentReconciler::from_source(delegate, &source),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_task_cancels_overdue() {
        let backend = Arc::new(MockBackend::new());
        let (reconciler, delegate, clock) = setup(backend.clone(), 60);

        delegate.buy("600036", Decimal::ONE, 100).await.unwrap();
        clock.advance(Duration::from_secs(61));

        let handle = Arc::new(reconciler).start_periodic();
        tokio::time::sleep(Duration::from_millis(1500)).await;

        assert!(delegate.tracker().is_empty().await);
        handle.abort();
    }
}
