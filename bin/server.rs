// RPN Calculator - Web Server
// REST API with Axum

use anyhow::{Context, Result};
use clap::Parser;
use rpn_calculator::{api, init_tracing, Calculator, ServerConfig, SqliteHistoryStore};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let config = ServerConfig::parse();
    init_tracing(&config.log_level);

    info!("initializing database at {:?}", config.database);
    let store = SqliteHistoryStore::open(&config.database)?;
    info!("database initialized successfully");

    let calculator = Calculator::new(Arc::new(store));
    let app = api::router(calculator).layer(api::cors_layer(&config.cors_origins)?);

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("server running on http://{}", addr);

    axum::serve(listener, app)
        .await
        .context("Server terminated unexpectedly")?;

    Ok(())
}
