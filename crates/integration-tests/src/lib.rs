//! Shared fixtures: a fully wired board on real adapters (in-memory store,
//! local media in a temp dir, HS256 tokens).

use std::sync::Arc;

use api_adapters::Metrics;
use auth_adapters::JwtAuthProvider;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{Duration, Utc};
use domains::{MediaStore, SystemClock, Thread, UserId, DEFAULT_CATEGORY};
use services::{BoardPolicy, Services};
use storage_adapters::{InMemoryBoardRepo, LocalMediaStore};
use tempfile::TempDir;

pub const TEST_SECRET: &str = "integration-test-secret";
pub const URL_PREFIX: &str = "/uploads";

const PNG_MAGIC: [u8; 8] = [0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1a, b'\n'];

pub struct TestBoard {
    pub services: Services,
    pub repo: Arc<InMemoryBoardRepo>,
    pub jwt: Arc<JwtAuthProvider>,
    pub metrics: Arc<Metrics>,
    pub media_dir: TempDir,
}

impl TestBoard {
    pub fn new() -> Self {
        Self::with_policy(BoardPolicy::default())
    }

    pub fn with_policy(policy: BoardPolicy) -> Self {
        let media_dir = tempfile::tempdir().expect("temp media dir");
        let media = Arc::new(LocalMediaStore::new(media_dir.path(), URL_PREFIX));
        Self::assemble(policy, media, media_dir)
    }

    /// Default policy over a caller-supplied media store.
    pub fn with_media(media: Arc<dyn MediaStore>) -> Self {
        let media_dir = tempfile::tempdir().expect("temp media dir");
        Self::assemble(BoardPolicy::default(), media, media_dir)
    }

    fn assemble(policy: BoardPolicy, media: Arc<dyn MediaStore>, media_dir: TempDir) -> Self {
        let repo = Arc::new(InMemoryBoardRepo::with_categories(["general", "news"]));
        let jwt = Arc::new(JwtAuthProvider::new(TEST_SECRET.to_owned().into()));
        let services = Services::new(policy, repo.clone(), media, jwt.clone(), Arc::new(SystemClock));
        Self {
            services,
            repo,
            jwt,
            metrics: Arc::new(Metrics::new()),
            media_dir,
        }
    }

    /// A thread with no posts, created a minute ago.
    pub fn seed_thread(&self, title: &str) -> Thread {
        let thread = Thread::new(
            title.into(),
            DEFAULT_CATEGORY.into(),
            Utc::now() - Duration::minutes(1),
        );
        self.repo.seed_thread(thread.clone());
        thread
    }

    pub fn token(&self, user: &str) -> String {
        self.jwt
            .issue(&UserId(user.into()), Duration::hours(1))
            .expect("issue token")
    }

    #[cfg(feature = "web-axum")]
    pub fn router(&self) -> axum::Router {
        let state = api_adapters::AppState::new(self.services.clone(), self.metrics.clone());
        api_adapters::router(state, &[])
    }

    /// Serves the router on an ephemeral local port.
    #[cfg(feature = "web-axum")]
    pub async fn spawn(&self) -> std::net::SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind ephemeral port");
        let addr = listener.local_addr().expect("local addr");
        let app = self
            .router()
            .into_make_service_with_connect_info::<std::net::SocketAddr>();
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("server");
        });
        addr
    }
}

impl Default for TestBoard {
    fn default() -> Self {
        Self::new()
    }
}

/// Bytes that sniff as PNG, padded to `len`.
pub fn png_bytes(len: usize) -> Vec<u8> {
    let mut bytes = PNG_MAGIC.to_vec();
    bytes.resize(len.max(PNG_MAGIC.len()), 0);
    bytes
}

pub fn png_data_uri(len: usize) -> String {
    format!("data:image/png;base64,{}", STANDARD.encode(png_bytes(len)))
}
