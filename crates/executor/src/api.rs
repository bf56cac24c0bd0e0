use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};

use common::models::Mode;

use crate::control::{ControlError, ControlSurface, TradeRequest};

pub const SERVICE_NAME: &str = "signal-trader";

impl IntoResponse for ControlError {
    fn into_response(self) -> Response {
        let status = match self.kind() {
            "mode_violation" => StatusCode::CONFLICT,
            "invalid_request" => StatusCode::BAD_REQUEST,
            "broker_transient" => StatusCode::SERVICE_UNAVAILABLE,
            "broker_permanent" => StatusCode::BAD_GATEWAY,
            "timeout" => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (
            status,
            Json(json!({"error": self.to_string(), "kind": self.kind()})),
        )
            .into_response()
    }
}

impl From<JsonRejection> for ControlError {
    fn from(rejection: JsonRejection) -> Self {
        Self::InvalidRequest(rejection.body_text())
    }
}

#[derive(Debug, Deserialize)]
pub struct ModeRequest {
    pub mode: String,
}

pub fn router(control: Arc<ControlSurface>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/account", get(account))
        .route("/positions", get(positions))
        .route("/trades", get(trades))
        .route("/signals", get(signals))
        .route("/mode", get(get_mode))
        .route("/set-mode", post(set_mode))
        .route("/manual-trade", post(manual_trade))
        .route("/programmatic-trade", post(programmatic_trade))
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .with_state(control)
}

/// GET / - Service info
async fn root(State(control): State<Arc<ControlSurface>>) -> impl IntoResponse {
    Json(json!({
        "name": SERVICE_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "trading_mode": control.mode().await,
        "status": "active",
    }))
}

/// GET /health - Stream state, broker reachability and mode
async fn health(State(control): State<Arc<ControlSurface>>) -> impl IntoResponse {
    Json(control.health().await)
}

async fn account(State(control): State<Arc<ControlSurface>>) -> Result<impl IntoResponse, ControlError> {
    Ok(Json(control.account().await?))
}

async fn positions(State(control): State<Arc<ControlSurface>>) -> Result<impl IntoResponse, ControlError> {
    Ok(Json(control.positions().await?))
}

/// GET /trades - Full trade history, oldest first
async fn trades(State(control): State<Arc<ControlSurface>>) -> impl IntoResponse {
    Json(control.trades().await)
}

async fn signals(State(control): State<Arc<ControlSurface>>) -> impl IntoResponse {
    Json(control.recent_signals().await)
}

async fn get_mode(State(control): State<Arc<ControlSurface>>) -> impl IntoResponse {
    Json(json!({"mode": control.mode().await}))
}

/// POST /set-mode - `{"mode": "auto" | "manual"}`
async fn set_mode(
    State(control): State<Arc<ControlSurface>>,
    body: Result<Json<ModeRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ControlError> {
    let Json(req) = body?;
    let mode: Mode = req.mode.parse().map_err(ControlError::InvalidRequest)?;
    let mode = control.set_mode(mode).await;
    Ok(Json(json!({"mode": mode, "message": format!("Trading mode set to {}", mode)})))
}

/// POST /manual-trade - Operator order, manual mode only
async fn manual_trade(
    State(control): State<Arc<ControlSurface>>,
    body: Result<Json<TradeRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ControlError> {
    let Json(req) = body?;
    Ok(Json(control.submit_manual_trade(req).await?))
}

/// POST /programmatic-trade - Order from an integration, any mode
async fn programmatic_trade(
    State(control): State<Arc<ControlSurface>>,
    body: Result<Json<TradeRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ControlError> {
    let Json(req) = body?;
    Ok(Json(control.submit_programmatic_trade(req).await?))
}
