//! # modern-bbs
//!
//! The entry point that assembles the board from its adapters.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use api_adapters::{router, AppState, Metrics};
use auth_adapters::JwtAuthProvider;
use configs::{LimitSettings, LogFormat, Settings};
use domains::SystemClock;
use services::content_validator::parse_ng_words;
use services::image_ingest::parse_mime_list;
use services::{BoardPolicy, ContentPolicy, ImagePolicy, RatePolicy, RateRule, Services};
use storage_adapters::{InMemoryBoardRepo, LocalMediaStore};
use tokio::net::TcpListener;
use tower_http::services::ServeDir;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Fixed sections every board starts with.
const CATEGORIES: [&str; 4] = ["general", "news", "tech", "hobby"];

const RATE_PURGE_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load().context("loading settings")?;
    init_tracing(settings.log.format);
    settings.warn_on_insecure_defaults();

    // 1. Core policy from configuration
    let policy = board_policy(&settings);

    // 2. Adapters
    let repo = Arc::new(InMemoryBoardRepo::with_categories(CATEGORIES));
    let media = Arc::new(LocalMediaStore::new(
        settings.media.upload_dir.clone(),
        settings.media.url_prefix.clone(),
    ));
    let identity = Arc::new(JwtAuthProvider::new(settings.auth.jwt_secret));

    // 3. Services and transport state
    let services = Services::new(policy, repo, media, identity, Arc::new(SystemClock));
    spawn_rate_purge(services.clone());
    let state = AppState::new(services, Arc::new(Metrics::new()));

    let app = router(state, &settings.server.origins()).nest_service(
        &settings.media.url_prefix,
        ServeDir::new(&settings.media.upload_dir),
    );

    let address = settings.server.bind_address();
    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("binding {address}"))?;
    info!(%address, "modern-bbs listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("serving")?;

    info!("modern-bbs stopped");
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

fn rule(limits: LimitSettings) -> RateRule {
    RateRule::new(limits.limit, limits.window_ms)
}

fn board_policy(settings: &Settings) -> BoardPolicy {
    let content = &settings.content;
    let media = &settings.media;
    let mut allowed_mime_types = parse_mime_list(&media.allowed_mime_types);
    if allowed_mime_types.is_empty() {
        warn!("media.allowed_mime_types is empty, falling back to the built-in list");
        allowed_mime_types = ImagePolicy::default().allowed_mime_types;
    }
    BoardPolicy {
        content: ContentPolicy {
            title_min: content.title_min,
            title_max: content.title_max,
            name_max: content.name_max,
            default_name: content.default_name.clone(),
            ng_words: parse_ng_words(&content.ng_words),
        },
        images: ImagePolicy {
            data_uri_max_bytes: media.data_uri_max_bytes,
            multipart_max_bytes: media.multipart_max_bytes,
            allowed_mime_types,
        },
        rates: RatePolicy {
            global: rule(settings.rate_limits.global),
            post: rule(settings.rate_limits.post),
            auth: rule(settings.rate_limits.auth),
        },
    }
}

/// Elapsed rate windows would otherwise pile up for one-off sources.
fn spawn_rate_purge(services: Services) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(RATE_PURGE_INTERVAL);
        loop {
            ticker.tick().await;
            services.purge_rate_windows();
        }
    });
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(%err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!(%err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}
