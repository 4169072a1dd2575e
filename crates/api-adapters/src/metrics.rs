//! Prometheus counters for the posting pipeline and the real-time channel.

use prometheus_client::encoding::text::encode;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;

use domains::AppError;

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ErrorLabels {
    pub kind: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct GateLabels {
    pub gate: String,
}

pub struct Metrics {
    registry: Registry,
    posts_accepted: Counter,
    post_errors: Family<ErrorLabels, Counter>,
    posts_deleted: Counter,
    threads_created: Counter,
    rate_limited: Family<GateLabels, Counter>,
    connections: Gauge,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let mut registry = Registry::with_prefix("bbs");
        let posts_accepted = Counter::default();
        let post_errors = Family::<ErrorLabels, Counter>::default();
        let posts_deleted = Counter::default();
        let threads_created = Counter::default();
        let rate_limited = Family::<GateLabels, Counter>::default();
        let connections = Gauge::default();

        registry.register("posts_accepted", "Posts committed and broadcast", posts_accepted.clone());
        registry.register("post_errors", "Rejected post submissions by error kind", post_errors.clone());
        registry.register("posts_deleted", "Posts removed by report or moderator", posts_deleted.clone());
        registry.register("threads_created", "Threads created", threads_created.clone());
        registry.register("rate_limited", "Requests refused by a rate gate", rate_limited.clone());
        registry.register("realtime_connections", "Open real-time connections", connections.clone());

        Self {
            registry,
            posts_accepted,
            post_errors,
            posts_deleted,
            threads_created,
            rate_limited,
            connections,
        }
    }

    pub fn post_accepted(&self) {
        self.posts_accepted.inc();
    }

    pub fn post_rejected(&self, err: &AppError) {
        self.post_errors
            .get_or_create(&ErrorLabels {
                kind: err.kind().to_owned(),
            })
            .inc();
    }

    pub fn post_deleted(&self) {
        self.posts_deleted.inc();
    }

    pub fn thread_created(&self) {
        self.threads_created.inc();
    }

    pub fn rate_limited(&self, gate: &str) {
        self.rate_limited
            .get_or_create(&GateLabels { gate: gate.to_owned() })
            .inc();
    }

    pub fn connection_opened(&self) {
        self.connections.inc();
    }

    pub fn connection_closed(&self) {
        self.connections.dec();
    }

    /// OpenMetrics text exposition.
    pub fn render(&self) -> Result<String, std::fmt::Error> {
        let mut body = String::new();
        encode(&mut body, &self.registry)?;
        Ok(body)
    }
}
