//! Dashboard HTTP server.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use axum::routing::{get, post};
use axum::Router;
use shopfunnel_core::config::DashboardConfig;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::cache::SnapshotCache;
use crate::rest::{self, AppState};

pub struct DashboardServer {
    config: DashboardConfig,
    cache: Arc<SnapshotCache>,
}

impl DashboardServer {
    pub fn new(config: DashboardConfig, raw_dir: impl Into<PathBuf>) -> Self {
        Self {
            config,
            cache: Arc::new(SnapshotCache::new(raw_dir)),
        }
    }

    pub fn router(&self) -> Router {
        let state = AppState {
            cache: self.cache.clone(),
            event_sample: self.config.event_sample,
            order_sample: self.config.order_sample,
            start_time: Instant::now(),
        };

        Router::new()
            .route("/", get(rest::dashboard))
            .route("/api/kpis", get(rest::kpis))
            .route("/api/events/sample", get(rest::event_sample))
            .route("/reload", post(rest::reload))
            // Operational endpoints
            .route("/health", get(rest::health_check))
            // Middleware
            .layer(CompressionLayer::new())
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    /// Serve until the process is stopped.
    pub async fn start(&self) -> anyhow::Result<()> {
        let addr = SocketAddr::new(self.config.host.parse()?, self.config.port);
        let app = self.router();

        info!(addr = %addr, raw_dir = %self.cache.raw_dir().display(), "Starting dashboard");

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app).await?;

        Ok(())
    }
}
