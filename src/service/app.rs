//! Main application state and service coordination
//!
//! This module contains the AppState that wires the lobby manager, chat
//! subsystem, room broadcaster and metrics together and owns their
//! background tasks.

use crate::broadcast::RoomBroadcaster;
use crate::chat::{ChatLogConfig, ChatLogger, ChatScrollback, ChatService};
use crate::config::AppConfig;
use crate::lobby::{InMemoryLobbyStore, LobbyManager, LobbyRegistry, LobbyStore};
use crate::metrics::{HealthServer, HealthServerConfig, MetricsCollector, MetricsService};
use crate::player::{InMemoryPlayerDirectory, PlayerDirectory};
use crate::service::health::{HealthCheck, HealthContext, HealthStatus};
use crate::utils::SystemClock;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::{error, info, warn};

/// Service-level errors
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Service initialization error: {message}")]
    Initialization { message: String },

    #[error("Background task error: {message}")]
    BackgroundTask { message: String },
}

/// Main application state containing all service components
pub struct AppState {
    /// Application configuration
    config: AppConfig,

    /// Lobby operations
    lobby_manager: LobbyManager,

    /// Chat sending
    chat_service: Arc<ChatService>,

    /// Chat log writers
    chat_logger: Arc<ChatLogger>,

    /// Room fan-out
    broadcaster: Arc<RoomBroadcaster>,

    /// Identity lookups
    players: Arc<dyn PlayerDirectory>,

    /// Metrics collector shared by every component
    metrics_collector: Arc<MetricsCollector>,

    /// Health endpoints, when enabled
    metrics_service: Option<Arc<MetricsService>>,

    /// Background task handles
    background_tasks: Vec<JoinHandle<()>>,

    /// Service status
    is_running: Arc<RwLock<bool>>,

    started_at: Instant,
}

impl AppState {
    /// Initialize the application with in-memory lobby and player stores
    pub async fn new(config: AppConfig) -> Result<Self, ServiceError> {
        Self::with_collaborators(
            config,
            Arc::new(InMemoryLobbyStore::new()),
            Arc::new(InMemoryPlayerDirectory::new()),
        )
        .await
    }

    /// Initialize the application around external lobby and player stores
    pub async fn with_collaborators(
        config: AppConfig,
        store: Arc<dyn LobbyStore>,
        players: Arc<dyn PlayerDirectory>,
    ) -> Result<Self, ServiceError> {
        info!("Initializing {} lobby service", config.service.name);
        crate::config::validate_config(&config).map_err(|e| ServiceError::Configuration {
            message: e.to_string(),
        })?;

        let metrics_collector =
            Arc::new(
                MetricsCollector::new().map_err(|e| ServiceError::Initialization {
                    message: format!("Failed to create metrics collector: {}", e),
                })?,
            );

        let broadcaster = Arc::new(RoomBroadcaster::new(metrics_collector.clone()));
        let scrollback = Arc::new(ChatScrollback::new(config.lobby.scrollback_capacity));
        let chat_logger = Arc::new(ChatLogger::new(
            ChatLogConfig::from(&config.chat),
            Arc::new(SystemClock),
            metrics_collector.clone(),
        ));
        let registry = Arc::new(LobbyRegistry::new(store));

        let lobby_manager = LobbyManager::new(
            registry.clone(),
            broadcaster.clone(),
            scrollback.clone(),
            chat_logger.clone(),
            players.clone(),
            metrics_collector.clone(),
        )
        .with_ready_up_timeout(config.ready_up_timeout());

        let chat_service = Arc::new(ChatService::new(
            broadcaster.clone(),
            scrollback,
            chat_logger.clone(),
            registry,
            players.clone(),
            metrics_collector.clone(),
        ));

        info!(
            "Configuration: ready-up {}s, scrollback {}, chat logs {} ({})",
            config.lobby.ready_up_timeout_seconds,
            config.lobby.scrollback_capacity,
            if config.chat.logs_enabled { "enabled" } else { "disabled" },
            config.chat.logs_dir
        );

        Ok(Self {
            config,
            lobby_manager,
            chat_service,
            chat_logger,
            broadcaster,
            players,
            metrics_collector,
            metrics_service: None,
            background_tasks: Vec::new(),
            is_running: Arc::new(RwLock::new(false)),
            started_at: Instant::now(),
        })
    }

    /// Open the global chat log and start background services
    pub async fn start(&mut self) -> Result<(), ServiceError> {
        info!("Starting {} lobby service", self.config.service.name);

        *self.is_running.write().await = true;

        if let Some(global) = self.chat_logger.start_global().await {
            match global.current_path().await {
                Some(path) => info!("Global chat log at {}", path.display()),
                None => warn!("Global chat log could not be opened, will retry at rotation"),
            }
        }

        if self.config.metrics.enabled {
            self.start_metrics_service();
        }
        self.start_health_metrics_task();

        info!("Lobby service started");
        Ok(())
    }

    /// Perform graceful shutdown
    pub async fn shutdown(&mut self) -> Result<(), ServiceError> {
        info!("Starting graceful shutdown of lobby service");

        *self.is_running.write().await = false;

        if let Some(metrics_service) = &self.metrics_service {
            metrics_service.stop();
        }
        for task in self.background_tasks.drain(..) {
            task.abort();
        }

        self.chat_logger.shutdown().await;

        let final_stats =
            self.lobby_manager
                .get_stats()
                .map_err(|e| ServiceError::BackgroundTask {
                    message: format!("Failed to get final stats: {}", e),
                })?;
        info!("Final service statistics: {:?}", final_stats);
        info!("Lobby service shutdown completed");

        Ok(())
    }

    /// Get service configuration
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Check if service is running
    pub async fn is_running(&self) -> bool {
        *self.is_running.read().await
    }

    pub fn lobby_manager(&self) -> &LobbyManager {
        &self.lobby_manager
    }

    pub fn chat_service(&self) -> Arc<ChatService> {
        self.chat_service.clone()
    }

    pub fn chat_logger(&self) -> Arc<ChatLogger> {
        self.chat_logger.clone()
    }

    pub fn broadcaster(&self) -> Arc<RoomBroadcaster> {
        self.broadcaster.clone()
    }

    pub fn players(&self) -> Arc<dyn PlayerDirectory> {
        self.players.clone()
    }

    pub fn metrics_collector(&self) -> Arc<MetricsCollector> {
        self.metrics_collector.clone()
    }

    /// Component handles for health checks
    pub fn health_context(&self) -> HealthContext {
        HealthContext {
            service_name: self.config.service.name.clone(),
            lobby_manager: self.lobby_manager.clone(),
            chat_logger: self.chat_logger.clone(),
            is_running: self.is_running.clone(),
            started_at: self.started_at,
        }
    }

    fn start_metrics_service(&mut self) {
        let health_config = HealthServerConfig {
            port: self.config.metrics.port,
            host: self.config.metrics.host.clone(),
        };
        let health_server = Arc::new(
            HealthServer::new(health_config, self.metrics_collector.clone())
                .with_context(self.health_context()),
        );
        let metrics_service = Arc::new(MetricsService::new(
            self.metrics_collector.clone(),
            health_server,
        ));
        self.metrics_service = Some(metrics_service.clone());

        info!(
            "Starting metrics and health endpoints on {}",
            self.config.metrics_addr()
        );
        let handle = tokio::spawn(async move {
            if let Err(e) = metrics_service.start().await {
                error!("Metrics service failed: {}", e);
            }
        });
        self.background_tasks.push(handle);
    }

    fn start_health_metrics_task(&mut self) {
        let ctx = self.health_context();
        let metrics_collector = self.metrics_collector.clone();

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(60));
            while *ctx.is_running.read().await {
                interval.tick().await;
                match HealthCheck::check(&ctx).await {
                    Ok(health) => {
                        let status = match health.status {
                            HealthStatus::Healthy => 2,
                            HealthStatus::Degraded => 1,
                            HealthStatus::Unhealthy => 0,
                        };
                        metrics_collector.update_health_status(status);
                    }
                    Err(e) => warn!("Health check failed: {}", e),
                }
            }
        });
        self.background_tasks.push(handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::ChannelConnection;
    use crate::types::{LobbyType, Player};

    fn test_config(dir: &std::path::Path) -> AppConfig {
        let mut config = AppConfig::default();
        config.metrics.enabled = false;
        config.chat.logs_dir = dir.join("logs").to_string_lossy().into_owned();
        config.chat.global_log_dir = dir.to_string_lossy().into_owned();
        config
    }

    #[tokio::test]
    async fn test_start_and_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = AppState::new(test_config(dir.path())).await.unwrap();
        assert!(!app.is_running().await);

        app.start().await.unwrap();
        assert!(app.is_running().await);
        assert_eq!(
            HealthCheck::readiness_check(&app.health_context()).await,
            HealthStatus::Healthy
        );
        assert!(app.chat_logger().global().is_some());

        app.shutdown().await.unwrap();
        assert!(!app.is_running().await);
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let mut config = AppConfig::default();
        config.lobby.scrollback_capacity = 0;
        assert!(matches!(
            AppState::new(config).await,
            Err(ServiceError::Configuration { .. })
        ));
    }

    #[tokio::test]
    async fn test_components_share_state() {
        let dir = tempfile::tempdir().unwrap();
        let directory = Arc::new(InMemoryPlayerDirectory::new());
        directory.insert(Player::new("76561198000000001", "sol"));
        let app = AppState::with_collaborators(
            test_config(dir.path()),
            Arc::new(InMemoryLobbyStore::new()),
            directory,
        )
        .await
        .unwrap();

        let steam_id = "76561198000000001".to_string();
        let (conn, _rx) = ChannelConnection::new();
        app.lobby_manager()
            .connect(Some(&steam_id), Arc::new(conn))
            .await
            .unwrap();
        let lobby = app
            .lobby_manager()
            .create_lobby(&steam_id, LobbyType::Ultiduo, "koth_ultiduo", "ugc")
            .await
            .unwrap();
        app.lobby_manager()
            .join(&steam_id, lobby.id, "red", "medic")
            .await
            .unwrap();

        // Chat service sees the lobby the manager created
        let sent = app
            .chat_service()
            .send(&steam_id, lobby.id, "hello")
            .await
            .unwrap();
        assert_eq!(sent.room, lobby.id);
        app.chat_logger().shutdown().await;
    }
}
