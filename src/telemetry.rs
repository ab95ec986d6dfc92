// 📡 Telemetry - Observational hooks for evaluation and batch processing
// Sinks only watch; nothing they do can change a result or a control path

use crate::batch::ValidationError;
use crate::calculator::{EvalError, Operator};
use crate::db::OperationRecord;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

// ============================================================================
// SINK TRAIT
// ============================================================================

/// Receives step-by-step observations from the evaluator and the batch
/// coordinator. Every method defaults to a no-op so sinks only override the
/// events they care about.
pub trait TelemetrySink: Send + Sync {
    fn evaluation_started(&self, _expression: &str) {}

    /// Called before a token is classified, with the stack as it stands.
    fn token_processed(&self, _token: &str, _stack: &[f64]) {}

    fn operand_pushed(&self, _value: f64) {}

    fn operation_applied(&self, _a: f64, _op: Operator, _b: f64, _result: f64) {}

    fn evaluation_failed(&self, _expression: &str, _error: &EvalError) {}

    fn evaluation_completed(&self, _expression: &str, _result: f64) {}

    fn batch_validation_failed(&self, _batch_id: Uuid, _error: &ValidationError) {}

    fn batch_scheduled(&self, _batch_id: Uuid, _count: usize) {}

    fn unit_completed(&self, _batch_id: Uuid, _record: &OperationRecord, _elapsed: Duration) {}

    /// A scheduled unit was abandoned. This is the only place such failures
    /// surface.
    fn unit_failed(&self, _batch_id: Uuid, _expression: &str, _reason: &str) {}
}

/// Discards every observation
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl TelemetrySink for NullSink {}

// ============================================================================
// TRACING SINK
// ============================================================================

/// Forwards observations to `tracing`: start/finish at INFO, individual
/// stack steps at DEBUG, failures at ERROR.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl TelemetrySink for TracingSink {
    fn evaluation_started(&self, expression: &str) {
        info!(expression, "starting evaluation");
    }

    fn token_processed(&self, token: &str, stack: &[f64]) {
        debug!(token, ?stack, "processing token");
    }

    fn operand_pushed(&self, value: f64) {
        debug!(value, "pushed operand");
    }

    fn operation_applied(&self, a: f64, op: Operator, b: f64, result: f64) {
        debug!("operation: {} {} {} = {}", a, op, b, result);
    }

    fn evaluation_failed(&self, expression: &str, error: &EvalError) {
        error!(expression, %error, "evaluation failed");
    }

    fn evaluation_completed(&self, expression: &str, result: f64) {
        info!(expression, result, "evaluation completed");
    }

    fn batch_validation_failed(&self, batch_id: Uuid, error: &ValidationError) {
        error!(%batch_id, expression = %error.expression, reason = %error.source, "batch rejected");
    }

    fn batch_scheduled(&self, batch_id: Uuid, count: usize) {
        info!(%batch_id, count, "batch scheduled");
    }

    fn unit_completed(&self, batch_id: Uuid, record: &OperationRecord, elapsed: Duration) {
        info!(
            %batch_id,
            id = record.id,
            expression = %record.expression,
            result = record.result,
            "batch calculation completed in {:.3}s",
            elapsed.as_secs_f64()
        );
    }

    fn unit_failed(&self, batch_id: Uuid, expression: &str, reason: &str) {
        error!(%batch_id, expression, reason, "error processing batch expression");
    }
}

// ============================================================================
// BATCH PROGRESS
// ============================================================================

/// How the scheduled units observed by a [`BatchProgress`] ended
#[derive(Debug, Default, Clone)]
pub struct BatchOutcome {
    pub completed: Vec<OperationRecord>,
    /// (expression, reason)
    pub failed: Vec<(String, String)>,
}

impl BatchOutcome {
    pub fn settled(&self) -> usize {
        self.completed.len() + self.failed.len()
    }
}

/// Wraps another sink and tallies unit outcomes so a caller can wait for its
/// own units to finish, successful or not. Rows written to the store by
/// anyone else are invisible here.
pub struct BatchProgress<S> {
    inner: S,
    outcome: Mutex<BatchOutcome>,
    notify: Notify,
}

impl<S: TelemetrySink> BatchProgress<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            outcome: Mutex::new(BatchOutcome::default()),
            notify: Notify::new(),
        }
    }

    fn outcome(&self) -> MutexGuard<'_, BatchOutcome> {
        // Only ever pushed to, so a poisoned tally is still usable
        self.outcome.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn snapshot(&self) -> BatchOutcome {
        self.outcome().clone()
    }

    /// Wait until at least `expected` units have settled. `None` on timeout.
    pub async fn wait_for(&self, expected: usize, timeout: Duration) -> Option<BatchOutcome> {
        let settle = async {
            loop {
                // Register before checking so a wakeup between the two is not lost
                let notified = self.notify.notified();
                if self.outcome().settled() >= expected {
                    return;
                }
                notified.await;
            }
        };

        tokio::time::timeout(timeout, settle)
            .await
            .ok()
            .map(|_| self.snapshot())
    }
}

impl<S: TelemetrySink> TelemetrySink for BatchProgress<S> {
    fn evaluation_started(&self, expression: &str) {
        self.inner.evaluation_started(expression);
    }

    fn token_processed(&self, token: &str, stack: &[f64]) {
        self.inner.token_processed(token, stack);
    }

    fn operand_pushed(&self, value: f64) {
        self.inner.operand_pushed(value);
    }

    fn operation_applied(&self, a: f64, op: Operator, b: f64, result: f64) {
        self.inner.operation_applied(a, op, b, result);
    }

    fn evaluation_failed(&self, expression: &str, error: &EvalError) {
        self.inner.evaluation_failed(expression, error);
    }

    fn evaluation_completed(&self, expression: &str, result: f64) {
        self.inner.evaluation_completed(expression, result);
    }

    fn batch_validation_failed(&self, batch_id: Uuid, error: &ValidationError) {
        self.inner.batch_validation_failed(batch_id, error);
    }

    fn batch_scheduled(&self, batch_id: Uuid, count: usize) {
        self.inner.batch_scheduled(batch_id, count);
    }

    fn unit_completed(&self, batch_id: Uuid, record: &OperationRecord, elapsed: Duration) {
        self.inner.unit_completed(batch_id, record, elapsed);
        self.outcome().completed.push(record.clone());
        self.notify.notify_waiters();
    }

    fn unit_failed(&self, batch_id: Uuid, expression: &str, reason: &str) {
        self.inner.unit_failed(batch_id, expression, reason);
        self.outcome()
            .failed
            .push((expression.to_string(), reason.to_string()));
        self.notify.notify_waiters();
    }
}

/// Install the global `fmt` subscriber. `RUST_LOG` wins over `default_level`.
/// Calling this twice is harmless; the second install is ignored.
pub fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::BatchCoordinator;
    use crate::db::{HistoryStore, SqliteHistoryStore};
    use anyhow::anyhow;
    use std::sync::Arc;

    /// Every append fails
    struct ReadOnlyStore;

    impl HistoryStore for ReadOnlyStore {
        fn append(&self, _expression: &str, _result: f64) -> anyhow::Result<OperationRecord> {
            Err(anyhow!("attempt to write a readonly database"))
        }

        fn list_all(&self) -> anyhow::Result<Vec<OperationRecord>> {
            Ok(Vec::new())
        }

        fn count(&self) -> anyhow::Result<i64> {
            Ok(0)
        }
    }

    fn exprs(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_progress_waits_for_completed_units() {
        let store = Arc::new(SqliteHistoryStore::open_in_memory().unwrap());
        let progress = Arc::new(BatchProgress::new(NullSink));
        let coordinator = BatchCoordinator::new(store.clone(), progress.clone());

        let scheduled = coordinator
            .submit_batch(&exprs(&["2 3 +", "4 3 *", "8 2 /"]))
            .unwrap();
        let outcome = progress
            .wait_for(scheduled, Duration::from_secs(5))
            .await
            .expect("units never settled");

        assert_eq!(outcome.completed.len(), 3);
        assert!(outcome.failed.is_empty());
        assert_eq!(store.count().unwrap(), 3);
    }

    #[tokio::test]
    async fn test_progress_reports_failed_units_without_timing_out() {
        let progress = Arc::new(BatchProgress::new(NullSink));
        let coordinator = BatchCoordinator::new(Arc::new(ReadOnlyStore), progress.clone());

        let started = std::time::Instant::now();
        let scheduled = coordinator.submit_batch(&exprs(&["1 1 +", "2 2 +"])).unwrap();
        let outcome = progress
            .wait_for(scheduled, Duration::from_secs(30))
            .await
            .expect("failures should settle the batch");

        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(outcome.completed.is_empty());
        assert_eq!(outcome.failed.len(), 2);
        assert!(outcome.failed.iter().all(|(_, reason)| reason.contains("readonly")));
    }

    #[tokio::test]
    async fn test_progress_ignores_rows_from_other_writers() {
        let store = Arc::new(SqliteHistoryStore::open_in_memory().unwrap());
        let progress = BatchProgress::new(NullSink);

        // Another process writing to the same history
        store.append("1 1 +", 2.0).unwrap();
        store.append("2 2 +", 4.0).unwrap();

        assert_eq!(progress.snapshot().settled(), 0);
        assert!(progress.wait_for(1, Duration::from_millis(50)).await.is_none());
    }

    #[tokio::test]
    async fn test_zero_units_settle_immediately() {
        let progress = BatchProgress::new(NullSink);
        let outcome = progress.wait_for(0, Duration::from_millis(10)).await.unwrap();
        assert_eq!(outcome.settled(), 0);
    }
}
