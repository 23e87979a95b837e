//! Shared application state for the Axum server.

use std::sync::Arc;

use herald_common::config::AppConfig;
use herald_engine::dispatcher::Dispatcher;
use herald_engine::ingestion::IngestionService;
use herald_engine::registry::ConnectionRegistry;
use herald_engine::replay::ReplayPolicy;
use herald_engine::store::{DedupPolicy, NotificationStore};

use crate::middleware::auth::JwtVerifier;

/// Application state shared across all route handlers via Axum `State`.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn NotificationStore>,
    pub registry: Arc<ConnectionRegistry>,
    pub ingestion: IngestionService,
    pub verifier: JwtVerifier,
    pub replay: ReplayPolicy,
    pub config: AppConfig,
}

impl AppState {
    pub fn new(store: Arc<dyn NotificationStore>, config: AppConfig) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let send_timeout = config.delivery_send_timeout();
        let dispatcher = Dispatcher::new(registry.clone(), send_timeout);
        let ingestion = IngestionService::new(
            store.clone(),
            dispatcher,
            DedupPolicy::new(config.dedup_includes_responsible),
        );
        let replay = ReplayPolicy::new(config.replay_window_days, config.replay_limit, send_timeout);

        Self {
            store,
            registry,
            ingestion,
            verifier: JwtVerifier::new(&config.jwt_secret),
            replay,
            config,
        }
    }
}
