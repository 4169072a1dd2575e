//! # api-adapters
//!
//! The web routing layer: JSON over HTTP for threads, categories and
//! moderation, and a WebSocket channel for live posting.
//!
//! # Developer Note
//! `/healthz` and `/metrics` sit outside the global rate limit so probes and
//! scrapers never eat into a client's budget.

pub mod metrics;

#[cfg(feature = "web-axum")]
pub mod error;
#[cfg(feature = "web-axum")]
pub mod extract;
#[cfg(feature = "web-axum")]
pub mod handlers;
#[cfg(feature = "web-axum")]
pub mod middleware;
#[cfg(feature = "web-axum")]
pub mod realtime;
#[cfg(feature = "web-axum")]
pub mod state;

pub use metrics::Metrics;
#[cfg(feature = "web-axum")]
pub use state::AppState;

#[cfg(feature = "web-axum")]
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
#[cfg(feature = "web-axum")]
use tower_http::trace::TraceLayer;

/// Slack on top of the image ceiling for the other form fields.
#[cfg(feature = "web-axum")]
const FORM_OVERHEAD: usize = 64 * 1024;

/// Builds the full application router.
#[cfg(feature = "web-axum")]
pub fn router(state: AppState, allowed_origins: &[String]) -> Router {
    let images = state.services.images.policy();
    // base64 inflates by 4/3.
    let json_limit = images.data_uri_max_bytes / 3 * 4 + FORM_OVERHEAD;
    // Twice the ceiling so an oversized file still reaches the image check
    // and is refused with the proper error.
    let multipart_limit = images.multipart_max_bytes * 2 + FORM_OVERHEAD;

    let api = Router::new()
        .route("/categories", get(handlers::list_categories))
        .route("/categories/{name}", get(handlers::get_category))
        .route("/categories/{name}/threads", get(handlers::category_threads))
        .route(
            "/threads",
            get(handlers::list_threads)
                .post(handlers::create_thread)
                .layer(DefaultBodyLimit::max(json_limit)),
        )
        .route(
            "/threads/{thread_id}",
            get(handlers::get_thread).delete(handlers::delete_thread),
        )
        .route(
            "/threads/{thread_id}/posts",
            get(handlers::list_posts)
                .post(handlers::create_post)
                .layer(DefaultBodyLimit::max(multipart_limit)),
        )
        .route(
            "/threads/{thread_id}/posts/{post_id}",
            axum::routing::delete(handlers::delete_post),
        )
        .route(
            "/threads/{thread_id}/posts/{post_id}/report",
            post(handlers::report_post),
        )
        .route("/threads/{thread_id}/like", post(handlers::like_thread))
        .route(
            "/threads/{thread_id}/checkNickname",
            post(handlers::check_nickname),
        );

    let limited = Router::new()
        .nest("/api", api)
        .route("/ws", get(realtime::ws_handler))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::global_rate_limit,
        ));

    let ops = Router::new()
        .route("/healthz", get(handlers::healthz))
        .route("/metrics", get(handlers::metrics));

    limited
        .merge(ops)
        .layer(TraceLayer::new_for_http())
        .layer(middleware::cors_policy(allowed_origins))
        .with_state(state)
}
