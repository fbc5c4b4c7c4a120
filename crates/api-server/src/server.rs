//! API server — router assembly and the metrics exporter.

use crate::rest::{self, AppState};
use axum::routing::{get, post};
use axum::Router;
use std::net::SocketAddr;
use streamcast_core::config::AppConfig;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

pub struct ApiServer {
    config: AppConfig,
    state: AppState,
}

impl ApiServer {
    pub fn new(config: AppConfig, state: AppState) -> Self {
        Self { config, state }
    }

    /// Start the HTTP server (blocks until shutdown).
    pub async fn start_http(&self) -> anyhow::Result<()> {
        let app = Router::new()
            // Media-server callbacks
            .route("/hooks/publish", post(rest::handle_publish))
            .route("/hooks/publish_done", post(rest::handle_publish_done))
            // Session lifecycle
            .route("/v1/sessions/heartbeat", post(rest::handle_heartbeat))
            .route(
                "/v1/streams/:stream_id/ingest-config",
                post(rest::handle_ingest_config),
            )
            // Ad scheduling
            .route("/v1/sessions/:id/ad-check", get(rest::handle_ad_check))
            .route("/v1/sessions/:id/ad-break", post(rest::handle_ad_break))
            .route("/v1/ad-events/:event_id/outcome", post(rest::handle_outcome))
            // Diagnostics
            .route("/v1/sessions/:id/status", get(rest::handle_session_status))
            .route(
                "/v1/campaigns/:id/stats",
                get(rest::handle_campaign_stats),
            )
            // Operational endpoints
            .route("/health", get(rest::health_check))
            .route("/ready", get(rest::readiness))
            .route("/live", get(rest::liveness))
            // Middleware
            .layer(CompressionLayer::new())
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone());

        let addr = SocketAddr::new(self.config.api.host.parse()?, self.config.api.http_port);

        info!(addr = %addr, "Starting HTTP server");

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app).await?;

        Ok(())
    }

    /// Start the Prometheus exporter on the metrics port.
    pub async fn start_metrics(&self) -> anyhow::Result<()> {
        let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
        let handle = builder
            .with_http_listener(SocketAddr::new(
                self.config.api.host.parse()?,
                self.config.metrics.port,
            ))
            .install_recorder()?;

        info!(port = self.config.metrics.port, "Metrics exporter started");

        // Keep the handle alive
        std::mem::forget(handle);
        Ok(())
    }
}
