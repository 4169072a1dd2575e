//! Middleware for traffic control and cross-origin access.

use std::time::Duration;

use axum::extract::{Request, State};
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderValue, Method};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::warn;

use crate::error::ApiError;
use crate::extract::ClientAddr;
use crate::state::AppState;

/// Counts every request under `/api` and `/ws` against the global gate.
pub async fn global_rate_limit(
    State(state): State<AppState>,
    ClientAddr(source): ClientAddr,
    request: Request,
    next: Next,
) -> Response {
    match state.services.global_gate.admit(&source) {
        Ok(()) => next.run(request).await,
        Err(err) => {
            state.metrics.rate_limited("global");
            ApiError(err).into_response()
        }
    }
}

/// An empty origin list allows any origin.
pub fn cors_policy(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .max_age(Duration::from_secs(3600));
    if origins.is_empty() {
        return layer.allow_origin(Any);
    }
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(%origin, "ignoring unparsable CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(allowed))
}
