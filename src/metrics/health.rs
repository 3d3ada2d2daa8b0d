//! HTTP probes and Prometheus scrape endpoint
//!
//! Serves `/health`, `/ready`, `/alive`, `/metrics` and `/stats` with axum
//! until the shutdown channel fires.

use crate::metrics::collector::MetricsCollector;
use crate::service::health::{HealthCheck, HealthContext, HealthStatus};
use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

const SERVICE: &str = "ready-room";

/// Bind address of the probe server
#[derive(Debug, Clone)]
pub struct HealthServerConfig {
    pub port: u16,
    pub host: String,
}

impl Default for HealthServerConfig {
    fn default() -> Self {
        Self {
            port: 9090,
            host: "0.0.0.0".to_string(),
        }
    }
}

/// Handler state: the collector always, service components once wired
#[derive(Clone)]
pub struct HealthServerState {
    pub metrics_collector: Arc<MetricsCollector>,
    pub context: Option<HealthContext>,
}

pub struct HealthServer {
    config: HealthServerConfig,
    state: HealthServerState,
    shutdown_tx: broadcast::Sender<()>,
}

impl HealthServer {
    pub fn new(config: HealthServerConfig, metrics_collector: Arc<MetricsCollector>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            config,
            state: HealthServerState {
                metrics_collector,
                context: None,
            },
            shutdown_tx,
        }
    }

    /// Attach the lobby service components the probes inspect
    pub fn with_context(mut self, context: HealthContext) -> Self {
        self.state.context = Some(context);
        self
    }

    /// Bind and serve until [`HealthServer::stop`] is called
    pub async fn start(&self) -> Result<()> {
        let addr: SocketAddr = format!("{}:{}", self.config.host, self.config.port)
            .parse()
            .with_context(|| format!("Invalid probe address {}:{}", self.config.host, self.config.port))?;
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind probe server to {}", addr))?;
        info!("Probe server listening on http://{}", addr);

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
                debug!("Probe server received shutdown");
            })
            .await?;

        info!("Probe server on {} stopped", addr);
        Ok(())
    }

    fn router(&self) -> Router {
        Router::new()
            .route("/", get(index))
            .route("/health", get(health))
            .route("/ready", get(ready))
            .route("/alive", get(alive))
            .route("/metrics", get(metrics))
            .route("/stats", get(stats))
            .with_state(self.state.clone())
    }

    pub fn stop(&self) {
        if let Err(e) = self.shutdown_tx.send(()) {
            warn!("Probe server was not running: {}", e);
        }
    }
}

fn not_wired() -> Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({ "service": SERVICE, "status": "unhealthy", "error": "lobby service not wired" })),
    )
        .into_response()
}

fn status_code(status: HealthStatus, degraded_ok: bool) -> StatusCode {
    match status {
        HealthStatus::Healthy => StatusCode::OK,
        HealthStatus::Degraded if degraded_ok => StatusCode::OK,
        _ => StatusCode::SERVICE_UNAVAILABLE,
    }
}

async fn index() -> impl IntoResponse {
    Json(json!({
        "service": SERVICE,
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": ["/health", "/ready", "/alive", "/metrics", "/stats"]
    }))
}

async fn health(State(state): State<HealthServerState>) -> Response {
    let Some(ctx) = &state.context else {
        return not_wired();
    };
    let status = HealthCheck::liveness_check(ctx).await;
    (
        status_code(status, true),
        Json(json!({ "service": SERVICE, "status": status, "version": env!("CARGO_PKG_VERSION") })),
    )
        .into_response()
}

/// Ready once the service runs and the lobby manager answers
async fn ready(State(state): State<HealthServerState>) -> Response {
    let Some(ctx) = &state.context else {
        return not_wired();
    };
    let status = HealthCheck::readiness_check(ctx).await;
    (status_code(status, true), Json(json!({ "status": status }))).into_response()
}

async fn alive(State(state): State<HealthServerState>) -> Response {
    let Some(ctx) = &state.context else {
        return not_wired();
    };
    let status = HealthCheck::liveness_check(ctx).await;
    (status_code(status, false), Json(json!({ "status": status }))).into_response()
}

async fn metrics(State(state): State<HealthServerState>) -> Response {
    match state.metrics_collector.encode() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)],
            body,
        )
            .into_response(),
        Err(e) => {
            error!("Prometheus encoding failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics unavailable").into_response()
        }
    }
}

/// Lobby counters and component checks in one document
async fn stats(State(state): State<HealthServerState>) -> Response {
    let Some(ctx) = &state.context else {
        return not_wired();
    };
    match HealthCheck::check(ctx).await {
        Ok(report) => Json(json!({
            "service": {
                "name": report.service,
                "version": report.version,
                "status": report.status,
                "uptime_seconds": report.stats.uptime_seconds
            },
            "lobbies": {
                "active": report.stats.active_lobbies,
                "created": report.stats.lobbies_created,
                "games_started": report.stats.games_started,
                "ready_up_timeouts": report.stats.ready_up_timeouts
            },
            "components": report.checks,
            "timestamp": report.timestamp
        }))
        .into_response(),
        Err(e) => {
            error!("Stats report failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "service": SERVICE, "error": e.to_string() })),
            )
                .into_response()
        }
    }
}
