// =============================================================================
// REST gateway — Axum 0.7
// =============================================================================
//
// Thin translators: validate the symbol, read cache-first, serialize. Errors
// are always `{error: {code, message}}` JSON envelopes. Handlers never block
// on the broker; everything they serve was produced by the engine tasks.
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::api::auth::AuthBearer;
use crate::app_state::AppState;
use crate::cache;
use crate::ingest::IngestCommand;
use crate::session::ist_now;
use crate::types::Symbol;

// =============================================================================
// Error envelope
// =============================================================================

pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    pub fn unknown_symbol(raw: &str) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            code: "UNKNOWN_SYMBOL",
            message: format!("unknown symbol: {raw}"),
        }
    }

    pub fn warming_up(symbol: Symbol) -> Self {
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE,
            code: "WARMING_UP",
            message: format!("no data yet for {symbol}; the feed is still warming up"),
        }
    }

    pub fn auth_failed(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            code: "TOKEN_EXCHANGE_FAILED",
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: "BAD_REQUEST",
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({
            "error": { "code": self.code, "message": self.message }
        });
        (self.status, Json(body)).into_response()
    }
}

fn parse_symbol(raw: &str) -> Result<Symbol, ApiError> {
    Symbol::parse(raw).ok_or_else(|| ApiError::unknown_symbol(raw))
}

// =============================================================================
// Router
// =============================================================================

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // ── Public ──────────────────────────────────────────────────
        .route("/health", get(health))
        .route("/api/analysis/analyze/{symbol}", get(analyze))
        .route("/api/analysis/market-outlook/all", get(outlook_all))
        .route("/api/analysis/market-outlook/{symbol}", get(outlook_one))
        .route("/api/analysis/trading-decision/all", get(decision_all))
        .route("/api/analysis/trading-decision/{symbol}", get(decision_one))
        .route("/api/diagnostics/connection-health", get(connection_health))
        .route("/api/auth/login-url", get(login_url))
        // ── Privileged ──────────────────────────────────────────────
        .route("/api/diagnostics/force-reconnect", post(force_reconnect))
        .route("/api/auth/set-token", post(set_token))
        // ── WebSocket ───────────────────────────────────────────────
        .route("/ws/market", get(crate::api::ws::ws_handler))
        .layer(cors)
        .with_state(state)
}

// =============================================================================
// Health
// =============================================================================

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "instance_id": state.instance_id,
        "session": state.session_info().state,
        "uptime_secs": state.uptime_secs(),
        "server_time": ist_now().timestamp_millis(),
    }))
}

// =============================================================================
// Analysis surface (cache-first)
// =============================================================================

/// Read a per-symbol artifact: cache first, then the last published copy.
fn cached_or_last<T: serde::Serialize>(
    state: &AppState,
    kind: &str,
    symbol: Symbol,
    last: &parking_lot::RwLock<std::collections::HashMap<Symbol, T>>,
) -> Option<Value> {
    if let Some(hit) = state.cache.get(&cache::key(kind, symbol)) {
        return Some(hit);
    }
    last.read()
        .get(&symbol)
        .and_then(|artifact| serde_json::to_value(artifact).ok())
}

async fn analyze(
    State(state): State<Arc<AppState>>,
    Path(raw): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let symbol = parse_symbol(&raw)?;
    let mut data = cached_or_last(&state, "snapshot", symbol, &state.last_analysis)
        .ok_or_else(|| ApiError::warming_up(symbol))?;
    // A snapshot that outlived its producer must not keep claiming liveness.
    if let Some(obj) = data.as_object_mut() {
        obj.insert(
            "is_live".to_string(),
            Value::Bool(state.ingest.is_live()),
        );
    }
    Ok(Json(data))
}

async fn outlook_one(
    State(state): State<Arc<AppState>>,
    Path(raw): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let symbol = parse_symbol(&raw)?;
    cached_or_last(&state, "outlook", symbol, &state.last_outlook)
        .map(Json)
        .ok_or_else(|| ApiError::warming_up(symbol))
}

async fn outlook_all(State(state): State<Arc<AppState>>) -> Json<Value> {
    let all: Vec<Value> = Symbol::ALL
        .into_iter()
        .filter_map(|s| cached_or_last(&state, "outlook", s, &state.last_outlook))
        .collect();
    Json(Value::Array(all))
}

async fn decision_one(
    State(state): State<Arc<AppState>>,
    Path(raw): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let symbol = parse_symbol(&raw)?;
    cached_or_last(&state, "decision", symbol, &state.last_decision)
        .map(Json)
        .ok_or_else(|| ApiError::warming_up(symbol))
}

async fn decision_all(State(state): State<Arc<AppState>>) -> Json<Value> {
    let all: Vec<Value> = Symbol::ALL
        .into_iter()
        .filter_map(|s| cached_or_last(&state, "decision", s, &state.last_decision))
        .collect();
    Json(Value::Array(all))
}

// =============================================================================
// Diagnostics
// =============================================================================

async fn connection_health(State(state): State<Arc<AppState>>) -> Json<Value> {
    let health = state.ingest.health();
    let session = state.session_info();
    let dropped_late: std::collections::HashMap<Symbol, u64> = Symbol::ALL
        .into_iter()
        .map(|s| (s, state.candles.dropped_late(s)))
        .collect();
    Json(json!({
        "ingest": health,
        "session": session,
        "is_live": state.ingest.is_live(),
        "cache_keys": state.cache.key_count(),
        "ws_clients": state.hub.client_count(),
        "dropped_late_ticks": dropped_late,
        "uptime_secs": state.uptime_secs(),
        "recent_errors": *state.recent_errors.read(),
    }))
}

async fn force_reconnect(
    _auth: AuthBearer,
    State(state): State<Arc<AppState>>,
) -> Json<Value> {
    warn!("force-reconnect requested via API");
    // Retained hub snapshots predate the reset; late joiners must not see
    // them.
    state.hub.clear_snapshots();
    state.ingest.send(IngestCommand::ForceReconnect);
    Json(json!({
        "status": "reconnecting",
        "requested_at": ist_now().timestamp_millis(),
    }))
}

// =============================================================================
// Auth bridge
// =============================================================================

async fn login_url(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({ "login_url": state.broker.login_url() }))
}

#[derive(Deserialize)]
struct SetTokenQuery {
    request_token: Option<String>,
}

async fn set_token(
    _auth: AuthBearer,
    State(state): State<Arc<AppState>>,
    Query(query): Query<SetTokenQuery>,
) -> Result<Json<Value>, ApiError> {
    let request_token = query
        .request_token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::bad_request("request_token query parameter is required"))?;

    let access_token = state
        .broker
        .exchange_request_token(&request_token)
        .await
        .map_err(|e| {
            state.push_error(format!("token exchange failed: {e}"), Some("AUTH".into()));
            ApiError::auth_failed(e.to_string())
        })?;

    state.broker.set_access_token(access_token);
    state.ingest.send(IngestCommand::TokenRefreshed);
    info!("access token exchanged and ingest notified");

    Ok(Json(json!({ "status": "ok" })))
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::test_state;
    use crate::types::SessionState;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), 1 << 20)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_is_public() {
        let app = router(test_state(SessionState::MarketOpen).await);
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["session"], "MARKET_OPEN");
    }

    #[tokio::test]
    async fn unknown_symbol_is_404_with_envelope() {
        let app = router(test_state(SessionState::MarketOpen).await);
        let response = app
            .oneshot(
                Request::get("/api/analysis/analyze/DOGE")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "UNKNOWN_SYMBOL");
        assert!(body["error"]["message"].as_str().unwrap().contains("DOGE"));
    }

    #[tokio::test]
    async fn symbol_is_case_insensitive() {
        let state = test_state(SessionState::MarketOpen).await;
        state.cache.set_with_ttl(
            &cache::key("snapshot", Symbol::Nifty),
            json!({"price": 24_500.0}),
            std::time::Duration::from_secs(5),
        );
        let app = router(state);
        let response = app
            .oneshot(
                Request::get("/api/analysis/analyze/nifty")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["price"], 24_500.0);
    }

    #[tokio::test]
    async fn cold_symbol_reports_warming_up() {
        let app = router(test_state(SessionState::MarketOpen).await);
        let response = app
            .oneshot(
                Request::get("/api/analysis/trading-decision/SENSEX")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "WARMING_UP");
    }

    #[tokio::test]
    async fn outlook_all_returns_cached_entries() {
        let state = test_state(SessionState::MarketOpen).await;
        state.cache.set_with_ttl(
            &cache::key("outlook", Symbol::Nifty),
            json!({"label": "BUY"}),
            std::time::Duration::from_secs(60),
        );
        let app = router(state);
        let response = app
            .oneshot(
                Request::get("/api/analysis/market-outlook/all")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body.as_array().unwrap().len(), 1);
        assert_eq!(body[0]["label"], "BUY");
    }

    #[tokio::test]
    async fn force_reconnect_requires_bearer() {
        let app = router(test_state(SessionState::MarketOpen).await);
        let response = app
            .oneshot(
                Request::post("/api/diagnostics/force-reconnect")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn force_reconnect_with_token_succeeds() {
        let app = router(test_state(SessionState::MarketOpen).await);
        let response = app
            .oneshot(
                Request::post("/api/diagnostics/force-reconnect")
                    .header("Authorization", "Bearer test-admin")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "reconnecting");
    }

    #[tokio::test]
    async fn connection_health_reports_ingest_state() {
        let app = router(test_state(SessionState::PreOpen).await);
        let response = app
            .oneshot(
                Request::get("/api/diagnostics/connection-health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["ingest"]["state"], "INIT");
        assert_eq!(body["session"]["state"], "PRE_OPEN");
        assert_eq!(body["ws_clients"], 0);
    }

    #[tokio::test]
    async fn login_url_is_exposed() {
        let app = router(test_state(SessionState::Closed).await);
        let response = app
            .oneshot(
                Request::get("/api/auth/login-url")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["login_url"], "stub://login");
    }

    #[tokio::test]
    async fn set_token_requires_request_token_param() {
        let app = router(test_state(SessionState::Closed).await);
        let response = app
            .oneshot(
                Request::post("/api/auth/set-token")
                    .header("Authorization", "Bearer test-admin")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn set_token_exchanges_and_acks() {
        let app = router(test_state(SessionState::Closed).await);
        let response = app
            .oneshot(
                Request::post("/api/auth/set-token?request_token=abc")
                    .header("Authorization", "Bearer test-admin")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "ok");
    }
}
