//! Health checks and monitoring
//!
//! This module provides health check functionality for the lobby service,
//! including readiness and liveness probes.

use crate::chat::ChatLogger;
use crate::lobby::LobbyManager;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tracing::debug;

/// Health check status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Degraded => write!(f, "degraded"),
            HealthStatus::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

/// Handles on the components a health check inspects
#[derive(Clone)]
pub struct HealthContext {
    pub service_name: String,
    pub lobby_manager: LobbyManager,
    pub chat_logger: Arc<ChatLogger>,
    pub is_running: Arc<RwLock<bool>>,
    pub started_at: Instant,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheck {
    /// Overall service status
    pub status: HealthStatus,
    /// Service name
    pub service: String,
    /// Crate version
    pub version: String,
    /// Current timestamp
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// Detailed component checks
    pub checks: Vec<ComponentCheck>,
    /// Service statistics
    pub stats: ServiceStats,
}

/// Individual component health check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentCheck {
    /// Component name
    pub name: String,
    /// Component status
    pub status: HealthStatus,
    /// Optional error message if not healthy
    pub message: Option<String>,
}

/// Service statistics for health reporting
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceStats {
    /// Lobbies that are not closed
    pub active_lobbies: usize,
    /// Total lobbies created since service start
    pub lobbies_created: u64,
    /// Total games started since service start
    pub games_started: u64,
    /// Ready-ups that expired since service start
    pub ready_up_timeouts: u64,
    /// Seconds since the service started
    pub uptime_seconds: u64,
}

impl HealthCheck {
    /// Perform a full health check of the service
    pub async fn check(ctx: &HealthContext) -> Result<Self> {
        let checks = vec![
            Self::check_service_running(ctx).await,
            Self::check_lobby_manager(ctx),
            Self::check_chat_logs(ctx).await,
        ];

        let status = if checks.iter().any(|c| c.status == HealthStatus::Unhealthy) {
            HealthStatus::Unhealthy
        } else if checks.iter().any(|c| c.status == HealthStatus::Degraded) {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };

        Ok(HealthCheck {
            status,
            service: ctx.service_name.clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: chrono::Utc::now(),
            checks,
            stats: Self::gather_service_stats(ctx),
        })
    }

    /// Simple liveness check - just verify service is running
    pub async fn liveness_check(ctx: &HealthContext) -> HealthStatus {
        if *ctx.is_running.read().await {
            HealthStatus::Healthy
        } else {
            HealthStatus::Unhealthy
        }
    }

    /// Readiness check - verify service can handle requests
    pub async fn readiness_check(ctx: &HealthContext) -> HealthStatus {
        if !*ctx.is_running.read().await {
            return HealthStatus::Unhealthy;
        }
        Self::check_lobby_manager(ctx).status
    }

    async fn check_service_running(ctx: &HealthContext) -> ComponentCheck {
        let (status, message) = if *ctx.is_running.read().await {
            (HealthStatus::Healthy, None)
        } else {
            (
                HealthStatus::Unhealthy,
                Some("Service is not running".to_string()),
            )
        };

        ComponentCheck {
            name: "service_running".to_string(),
            status,
            message,
        }
    }

    fn check_lobby_manager(ctx: &HealthContext) -> ComponentCheck {
        let (status, message) = match ctx.lobby_manager.get_stats() {
            Ok(_) => (HealthStatus::Healthy, None),
            Err(e) => (
                HealthStatus::Degraded,
                Some(format!("Stats check failed: {}", e)),
            ),
        };

        ComponentCheck {
            name: "lobby_manager".to_string(),
            status,
            message,
        }
    }

    /// The global log must be open whenever chat logging is enabled
    async fn check_chat_logs(ctx: &HealthContext) -> ComponentCheck {
        let (status, message) = if !ctx.chat_logger.is_enabled() {
            (HealthStatus::Healthy, Some("Chat logging disabled".to_string()))
        } else {
            match ctx.chat_logger.global() {
                Some(global) if global.current_path().await.is_some() => {
                    (HealthStatus::Healthy, None)
                }
                Some(_) => (
                    HealthStatus::Degraded,
                    Some("Global chat log has no open file".to_string()),
                ),
                None => (
                    HealthStatus::Degraded,
                    Some("Global chat log not started".to_string()),
                ),
            }
        };

        ComponentCheck {
            name: "chat_logs".to_string(),
            status,
            message,
        }
    }

    fn gather_service_stats(ctx: &HealthContext) -> ServiceStats {
        let uptime_seconds = ctx.started_at.elapsed().as_secs();
        match ctx.lobby_manager.get_stats() {
            Ok(stats) => ServiceStats {
                active_lobbies: stats.active_lobbies,
                lobbies_created: stats.lobbies_created,
                games_started: stats.games_started,
                ready_up_timeouts: stats.ready_up_timeouts,
                uptime_seconds,
            },
            Err(e) => {
                debug!("Failed to get lobby stats for health check: {}", e);
                ServiceStats {
                    uptime_seconds,
                    ..ServiceStats::default()
                }
            }
        }
    }

    /// Convert health check to a JSON string
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| anyhow::anyhow!("Failed to serialize health check: {}", e))
    }
}
