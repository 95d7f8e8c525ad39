// =============================================================================
// Bearer-token gate for the privileged routes
// =============================================================================
//
// Extracts and validates `Authorization: Bearer <token>` against the
// configured admin token. Comparison is constant time. Used only on the
// routes that can mutate the engine (force-reconnect, set-token); the
// read-only analysis surface stays open for dashboards.
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
};
use tracing::warn;

use crate::app_state::AppState;

/// Compare two byte slices in constant time. Every byte of equal-length
/// inputs is always examined.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut result: u8 = 0;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

/// Axum extractor that yields the validated bearer token, or short-circuits
/// with a 401 JSON error envelope.
pub struct AuthBearer(pub String);

pub struct AuthRejection {
    message: &'static str,
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": { "code": "UNAUTHORIZED", "message": self.message }
        });
        (StatusCode::UNAUTHORIZED, axum::Json(body)).into_response()
    }
}

impl FromRequestParts<Arc<AppState>> for AuthBearer {
    type Rejection = AuthRejection;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let expected = state.config.admin_token.as_str();
        if expected.is_empty() {
            warn!("ADMIN_TOKEN is not configured — privileged routes are disabled");
            return Err(AuthRejection {
                message: "server authentication not configured",
            });
        }

        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok());

        let token = match header {
            Some(value) if value.starts_with("Bearer ") => &value[7..],
            _ => {
                return Err(AuthRejection {
                    message: "missing or malformed authorization header",
                });
            }
        };

        if !constant_time_eq(token.as_bytes(), expected.as_bytes()) {
            warn!("invalid admin token presented");
            return Err(AuthRejection {
                message: "invalid authorization token",
            });
        }

        Ok(AuthBearer(token.to_string()))
    }
}
