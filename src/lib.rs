// RPN Calculator - Core Library
// Exposes all modules for use in the CLI, the API server, and tests

pub mod calculator;
pub mod batch;
pub mod db;
pub mod export;
pub mod service;
pub mod telemetry;
pub mod config;

#[cfg(feature = "server")]
pub mod api;

// Re-export commonly used types
pub use calculator::{evaluate, evaluate_with, is_operator, EvalError, Operator};
pub use batch::{validate_all, BatchCoordinator, ValidationError};
pub use db::{
    HistoryStore, OperationRecord, SqliteHistoryStore,
    setup_database, insert_operation, get_all_operations, verify_count,
};
pub use export::{history_csv_bytes, write_history_csv};
pub use service::{CalculateError, Calculator};
pub use telemetry::{init_tracing, BatchOutcome, BatchProgress, NullSink, TelemetrySink, TracingSink};
pub use config::ServerConfig;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
