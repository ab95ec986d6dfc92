// 🧭 Calculator Service - The single entry point shared by the HTTP server and the CLI
// Single expressions run synchronously; batches go through the coordinator

use crate::batch::{BatchCoordinator, ValidationError};
use crate::calculator::{evaluate_with, EvalError};
use crate::db::{HistoryStore, OperationRecord};
use crate::export::history_csv_bytes;
use crate::telemetry::{TelemetrySink, TracingSink};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum CalculateError {
    #[error(transparent)]
    Eval(#[from] EvalError),

    #[error("failed to store result: {0:#}")]
    Store(anyhow::Error),
}

#[derive(Clone)]
pub struct Calculator {
    store: Arc<dyn HistoryStore>,
    sink: Arc<dyn TelemetrySink>,
    batches: BatchCoordinator,
}

impl Calculator {
    /// Build a calculator that logs through `tracing`
    pub fn new(store: Arc<dyn HistoryStore>) -> Self {
        Self::with_sink(store, Arc::new(TracingSink))
    }

    pub fn with_sink(store: Arc<dyn HistoryStore>, sink: Arc<dyn TelemetrySink>) -> Self {
        let batches = BatchCoordinator::new(Arc::clone(&store), Arc::clone(&sink));
        Self {
            store,
            sink,
            batches,
        }
    }

    /// Evaluate and persist one expression. Failed evaluations are never stored.
    pub fn calculate(&self, expression: &str) -> Result<OperationRecord, CalculateError> {
        let start = Instant::now();
        let result = evaluate_with(expression, self.sink.as_ref())?;
        info!(
            "calculation completed in {:.3}s: {} = {}",
            start.elapsed().as_secs_f64(),
            expression,
            result
        );

        self.store
            .append(expression, result)
            .map_err(CalculateError::Store)
    }

    /// See [`BatchCoordinator::submit_batch`]
    pub fn calculate_batch(&self, expressions: &[String]) -> Result<usize, ValidationError> {
        info!("starting batch processing of {} expressions", expressions.len());
        self.batches.submit_batch(expressions)
    }

    pub fn history(&self) -> anyhow::Result<Vec<OperationRecord>> {
        self.store.list_all()
    }

    pub fn export_csv(&self) -> anyhow::Result<Vec<u8>> {
        let records = self.store.list_all()?;
        let bytes = history_csv_bytes(&records)?;
        info!("CSV export completed with {} records", records.len());
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SqliteHistoryStore;
    use crate::telemetry::NullSink;

    fn calculator() -> Calculator {
        let store = Arc::new(SqliteHistoryStore::open_in_memory().unwrap());
        Calculator::with_sink(store, Arc::new(NullSink))
    }

    #[test]
    fn test_calculate_persists_record() {
        let calc = calculator();
        let record = calc.calculate("2 3 +").unwrap();

        assert_eq!(record.result, 5.0);
        assert_eq!(record.expression, "2 3 +");
        assert_eq!(calc.history().unwrap(), vec![record]);
    }

    #[test]
    fn test_failed_calculation_is_not_stored() {
        let calc = calculator();

        let err = calc.calculate("2 0 /").unwrap_err();
        assert!(matches!(err, CalculateError::Eval(EvalError::DivisionByZero)));
        assert_eq!(err.to_string(), "Division by zero");
        assert!(calc.history().unwrap().is_empty());
    }

    #[test]
    fn test_export_matches_history_order() {
        let calc = calculator();
        calc.calculate("1 1 +").unwrap();
        calc.calculate("2 2 +").unwrap();

        let csv = String::from_utf8(calc.export_csv().unwrap()).unwrap();
        let lines: Vec<&str> = csv.lines().collect();

        assert_eq!(lines[0], "id,expression,result,created_at");
        assert!(lines[1].starts_with("2,2 2 +,4,"));
        assert!(lines[2].starts_with("1,1 1 +,2,"));
    }
}
