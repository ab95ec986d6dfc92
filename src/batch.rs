// 📦 Batch Coordinator - Validate everything, then schedule each expression on its own
// All-or-nothing at the gate; after that every unit lives and dies alone

use crate::calculator::{evaluate_with, EvalError};
use crate::db::{HistoryStore, OperationRecord};
use crate::telemetry::TelemetrySink;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use uuid::Uuid;

/// First expression in a batch that failed validation
#[derive(Debug, Clone, PartialEq, Error)]
#[error("Invalid expression '{expression}': {source}")]
pub struct ValidationError {
    pub expression: String,
    pub source: EvalError,
}

/// Run every expression through the evaluator, stopping at the first failure.
/// Results are discarded; only validity matters here.
pub fn validate_all(expressions: &[String], sink: &dyn TelemetrySink) -> Result<(), ValidationError> {
    for expression in expressions {
        evaluate_with(expression, sink).map_err(|source| ValidationError {
            expression: expression.clone(),
            source,
        })?;
    }
    Ok(())
}

#[derive(Clone)]
pub struct BatchCoordinator {
    store: Arc<dyn HistoryStore>,
    sink: Arc<dyn TelemetrySink>,
}

impl BatchCoordinator {
    pub fn new(store: Arc<dyn HistoryStore>, sink: Arc<dyn TelemetrySink>) -> Self {
        Self { store, sink }
    }

    /// Validate the whole batch and, if it passes, schedule one background unit
    /// per expression. Returns the number of units scheduled without waiting
    /// for any of them.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn submit_batch(&self, expressions: &[String]) -> Result<usize, ValidationError> {
        let batch_id = Uuid::new_v4();

        if let Err(e) = validate_all(expressions, self.sink.as_ref()) {
            self.sink.batch_validation_failed(batch_id, &e);
            return Err(e);
        }

        for expression in expressions {
            self.schedule(batch_id, expression.clone());
        }

        self.sink.batch_scheduled(batch_id, expressions.len());
        Ok(expressions.len())
    }

    fn schedule(&self, batch_id: Uuid, expression: String) {
        let store = Arc::clone(&self.store);
        let sink = Arc::clone(&self.sink);

        tokio::spawn(async move {
            let started = Instant::now();

            // rusqlite blocks, so the unit itself runs on the blocking pool
            let unit = {
                let store = Arc::clone(&store);
                let sink = Arc::clone(&sink);
                let expression = expression.clone();
                tokio::task::spawn_blocking(move || {
                    execute_unit(&expression, store.as_ref(), sink.as_ref())
                })
            };

            match unit.await {
                Ok(Ok(record)) => sink.unit_completed(batch_id, &record, started.elapsed()),
                Ok(Err(reason)) => sink.unit_failed(batch_id, &expression, &reason),
                Err(join_error) => {
                    sink.unit_failed(batch_id, &expression, &format!("unit aborted: {}", join_error))
                }
            }
        });
    }
}

/// Re-evaluate from scratch and persist. Validation results are never reused.
fn execute_unit(
    expression: &str,
    store: &dyn HistoryStore,
    sink: &dyn TelemetrySink,
) -> Result<OperationRecord, String> {
    let result = evaluate_with(expression, sink).map_err(|e| e.to_string())?;
    store
        .append(expression, result)
        .map_err(|e| format!("{:#}", e))
}
