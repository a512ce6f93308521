//! API server: the REST router and the Prometheus exporter.

use crate::alerts_rest;
use crate::rest::{self, AppState};
use axum::routing::{delete, get, patch, post};
use axum::Router;
use std::net::SocketAddr;
use storefront_core::config::AppConfig;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Full REST surface over `state`.
pub fn router(state: AppState) -> Router {
    Router::new()
        // Metrics queries
        .route("/v1/metrics", get(rest::get_metrics))
        .route("/v1/metrics/categories", get(rest::get_category_performance))
        .route("/v1/metrics/cache", delete(rest::invalidate_cache))
        // Alerts
        .route("/v1/alerts", get(alerts_rest::active))
        .route("/v1/alerts/evaluate", post(alerts_rest::evaluate))
        .route(
            "/v1/alerts/history",
            get(alerts_rest::history).delete(alerts_rest::clear_history),
        )
        .route("/v1/alerts/stats", get(alerts_rest::statistics))
        .route(
            "/v1/alerts/config",
            get(alerts_rest::get_config).patch(alerts_rest::update_config),
        )
        .route("/v1/alerts/:id/resolve", post(alerts_rest::resolve))
        .route(
            "/v1/alerts/rules",
            get(alerts_rest::list_rules).post(alerts_rest::create_rule),
        )
        .route(
            "/v1/alerts/rules/:id",
            patch(alerts_rest::update_rule).delete(alerts_rest::delete_rule),
        )
        // Operational endpoints
        .route("/health", get(rest::health_check))
        .route("/ready", get(rest::readiness))
        .route("/live", get(rest::liveness))
        // Middleware
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub struct ApiServer {
    config: AppConfig,
    state: AppState,
}

impl ApiServer {
    pub fn new(config: AppConfig, state: AppState) -> Self {
        Self { config, state }
    }

    /// Start the HTTP REST server.
    pub async fn start_http(&self) -> anyhow::Result<()> {
        let app = router(self.state.clone());

        let addr = SocketAddr::new(self.config.api.host.parse()?, self.config.api.http_port);
        info!(addr = %addr, "Starting HTTP server");

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app).await?;

        Ok(())
    }

    /// Start the metrics exporter on a separate port.
    pub fn start_metrics(&self) -> anyhow::Result<()> {
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(SocketAddr::new(
                self.config.api.host.parse()?,
                self.config.metrics.port,
            ))
            .install()?;

        info!(port = self.config.metrics.port, "Metrics exporter started");
        Ok(())
    }
}
