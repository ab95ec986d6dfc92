// 🌐 HTTP API - Axum routes over the calculator service

use crate::batch::ValidationError;
use crate::service::{CalculateError, Calculator};
use axum::{
    extract::State,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::task::JoinError;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub calculator: Calculator,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ExpressionIn {
    pub expression: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BatchExpressionIn {
    pub expressions: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BatchAccepted {
    pub message: String,
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug)]
pub enum ApiError {
    /// Client sent an expression that cannot be evaluated
    BadRequest(String),

    Internal(String),
}

impl From<CalculateError> for ApiError {
    fn from(err: CalculateError) -> Self {
        match err {
            CalculateError::Eval(e) => Self::BadRequest(e.to_string()),
            CalculateError::Store(e) => Self::Internal(format!("{:#}", e)),
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        Self::BadRequest(err.to_string())
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(format!("{:#}", err))
    }
}

impl From<JoinError> for ApiError {
    fn from(err: JoinError) -> Self {
        Self::Internal(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Internal(msg) => {
                error!("internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        (status, Json(json!({ "detail": detail }))).into_response()
    }
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /health - Liveness check
async fn health_check() -> impl IntoResponse {
    Json(json!({ "status": "ok", "version": crate::VERSION }))
}

/// POST /calculate - Evaluate one expression and store it
async fn calculate(
    State(state): State<AppState>,
    Json(body): Json<ExpressionIn>,
) -> Result<impl IntoResponse, ApiError> {
    info!("processing expression: {}", body.expression);

    let calculator = state.calculator.clone();
    let record = tokio::task::spawn_blocking(move || calculator.calculate(&body.expression))
        .await??;

    Ok(Json(record))
}

/// POST /calculate_batch - Validate all, then process in the background
async fn calculate_batch(
    State(state): State<AppState>,
    Json(body): Json<BatchExpressionIn>,
) -> Result<impl IntoResponse, ApiError> {
    let scheduled = state.calculator.calculate_batch(&body.expressions)?;

    Ok(Json(BatchAccepted {
        message: format!("Processing {} expressions", scheduled),
    }))
}

/// GET /history - All calculations, newest first
async fn history(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    info!("retrieving calculation history");

    let calculator = state.calculator.clone();
    let records = tokio::task::spawn_blocking(move || calculator.history()).await??;

    Ok(Json(records))
}

/// GET /export_csv - History as an attachment
async fn export_csv(State(state): State<AppState>) -> Result<Response, ApiError> {
    let calculator = state.calculator.clone();
    let bytes = tokio::task::spawn_blocking(move || calculator.export_csv()).await??;

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv"),
            (header::CONTENT_DISPOSITION, "attachment; filename=history.csv"),
        ],
        bytes,
    )
        .into_response())
}

// ============================================================================
// Router
// ============================================================================

/// CORS for the configured browser origins. Methods and headers are mirrored
/// from the preflight since credentials rule out wildcards.
pub fn cors_layer(origins: &[String]) -> anyhow::Result<CorsLayer> {
    let origins = origins
        .iter()
        .map(|o| {
            o.parse::<HeaderValue>()
                .map_err(|e| anyhow::anyhow!("invalid CORS origin {:?}: {}", o, e))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true))
}

pub fn router(calculator: Calculator) -> Router {
    let state = AppState { calculator };

    Router::new()
        .route("/health", get(health_check))
        .route("/calculate", post(calculate))
        .route("/calculate_batch", post(calculate_batch))
        .route("/history", get(history))
        .route("/export_csv", get(export_csv))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
