//! State shared across all axum handlers and WebSocket sessions.

use std::sync::Arc;

use services::Services;

use crate::metrics::Metrics;

#[derive(Clone)]
pub struct AppState {
    pub services: Services,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    pub fn new(services: Services, metrics: Arc<Metrics>) -> Self {
        Self { services, metrics }
    }
}
