//! Metrics collection using Prometheus
//!
//! This module provides metrics collection for the lobby service: lobby
//! lifecycle counters, chat throughput and room broadcast delivery.

use crate::types::LobbyType;
use anyhow::Result;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use std::sync::Arc;
use std::time::Instant;

/// Main metrics collector for the lobby service
#[derive(Clone)]
pub struct MetricsCollector {
    /// Prometheus registry
    registry: Arc<Registry>,

    /// Service-level metrics
    service_metrics: ServiceMetrics,

    /// Lobby lifecycle metrics
    lobby_metrics: LobbyMetrics,

    /// Chat and broadcast metrics
    chat_metrics: ChatMetrics,

    started_at: Instant,
}

/// Service-level metrics
#[derive(Clone)]
pub struct ServiceMetrics {
    /// Service uptime in seconds
    pub uptime_seconds: IntGauge,

    /// Health check status (0=unhealthy, 1=degraded, 2=healthy)
    pub health_status: IntGauge,
}

/// Lobby lifecycle metrics
#[derive(Clone)]
pub struct LobbyMetrics {
    /// Number of lobbies that are not closed
    pub active_lobbies: IntGauge,

    /// Total lobbies created
    pub lobbies_created_total: IntCounterVec,

    /// Total lobbies closed, by manual or automatic closure
    pub lobbies_closed_total: IntCounterVec,

    /// Lobbies that filled and started a ready-up
    pub ready_ups_started_total: IntCounter,

    /// Ready-ups that expired before everyone confirmed
    pub ready_up_timeouts_total: IntCounter,

    /// Total games started
    pub games_started_total: IntCounter,

    /// Players that took a slot
    pub players_joined_total: IntCounter,

    /// Players that left, were kicked or timed out of a slot
    pub players_removed_total: IntCounter,
}

/// Chat and broadcast metrics
#[derive(Clone)]
pub struct ChatMetrics {
    /// Chat messages sent, by global or lobby room
    pub messages_total: IntCounterVec,

    /// Chat log open and write failures
    pub log_failures_total: IntCounter,

    /// Room broadcasts, by event name
    pub broadcasts_total: IntCounterVec,

    /// Emits to a connection that failed
    pub delivery_failures_total: IntCounter,
}

impl MetricsCollector {
    /// Create a new metrics collector with default registry
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());
        Self::with_registry(registry)
    }

    /// Create a new metrics collector with custom registry
    pub fn with_registry(registry: Arc<Registry>) -> Result<Self> {
        let service_metrics = ServiceMetrics::new(&registry)?;
        let lobby_metrics = LobbyMetrics::new(&registry)?;
        let chat_metrics = ChatMetrics::new(&registry)?;

        Ok(Self {
            registry,
            service_metrics,
            lobby_metrics,
            chat_metrics,
            started_at: Instant::now(),
        })
    }

    /// Get the Prometheus registry
    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    /// Get service metrics
    pub fn service(&self) -> &ServiceMetrics {
        &self.service_metrics
    }

    /// Get lobby metrics
    pub fn lobby(&self) -> &LobbyMetrics {
        &self.lobby_metrics
    }

    /// Get chat metrics
    pub fn chat(&self) -> &ChatMetrics {
        &self.chat_metrics
    }

    /// Record a lobby being created
    pub fn record_lobby_created(&self, lobby_type: LobbyType) {
        self.lobby_metrics
            .lobbies_created_total
            .with_label_values(&[&lobby_type.to_string()])
            .inc();
        self.lobby_metrics.active_lobbies.inc();
    }

    /// Record a lobby being closed
    pub fn record_lobby_closed(&self, manual: bool) {
        let reason = if manual { "manual" } else { "automatic" };
        self.lobby_metrics
            .lobbies_closed_total
            .with_label_values(&[reason])
            .inc();
        self.lobby_metrics.active_lobbies.dec();
    }

    pub fn record_ready_up_started(&self) {
        self.lobby_metrics.ready_ups_started_total.inc();
    }

    pub fn record_ready_up_timeout(&self) {
        self.lobby_metrics.ready_up_timeouts_total.inc();
    }

    /// Record a game starting
    pub fn record_game_started(&self) {
        self.lobby_metrics.games_started_total.inc();
    }

    pub fn record_player_joined(&self) {
        self.lobby_metrics.players_joined_total.inc();
    }

    pub fn record_player_removed(&self) {
        self.lobby_metrics.players_removed_total.inc();
    }

    /// Record a chat message sent to a room
    pub fn record_chat_message(&self, global: bool) {
        let room = if global { "global" } else { "lobby" };
        self.chat_metrics
            .messages_total
            .with_label_values(&[room])
            .inc();
    }

    /// Record a failed chat log open or write
    pub fn record_chat_log_failure(&self) {
        self.chat_metrics.log_failures_total.inc();
    }

    /// Record a broadcast of `event` to a room
    pub fn record_broadcast(&self, event: &str) {
        self.chat_metrics
            .broadcasts_total
            .with_label_values(&[event])
            .inc();
    }

    /// Record a failed emit to a single connection
    pub fn record_delivery_failure(&self) {
        self.chat_metrics.delivery_failures_total.inc();
    }

    /// Update health status
    pub fn update_health_status(&self, status: u8) {
        self.service_metrics.health_status.set(status as i64);
    }

    /// Render every registered metric in the Prometheus text format
    pub fn encode(&self) -> Result<String> {
        self.service_metrics
            .uptime_seconds
            .set(self.started_at.elapsed().as_secs() as i64);

        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

impl ServiceMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let uptime_seconds =
            IntGauge::new("ready_room_uptime_seconds", "Service uptime in seconds")?;
        registry.register(Box::new(uptime_seconds.clone()))?;

        let health_status = IntGauge::new(
            "ready_room_health_status",
            "Health status (0=unhealthy, 1=degraded, 2=healthy)",
        )?;
        registry.register(Box::new(health_status.clone()))?;

        Ok(Self {
            uptime_seconds,
            health_status,
        })
    }
}

impl LobbyMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let active_lobbies =
            IntGauge::new("ready_room_active_lobbies", "Number of open lobbies")?;
        registry.register(Box::new(active_lobbies.clone()))?;

        let lobbies_created_total = IntCounterVec::new(
            Opts::new("ready_room_lobbies_created_total", "Total lobbies created"),
            &["lobby_type"],
        )?;
        registry.register(Box::new(lobbies_created_total.clone()))?;

        let lobbies_closed_total = IntCounterVec::new(
            Opts::new("ready_room_lobbies_closed_total", "Total lobbies closed"),
            &["reason"],
        )?;
        registry.register(Box::new(lobbies_closed_total.clone()))?;

        let ready_ups_started_total = IntCounter::new(
            "ready_room_ready_ups_started_total",
            "Lobbies that filled and started a ready-up",
        )?;
        registry.register(Box::new(ready_ups_started_total.clone()))?;

        let ready_up_timeouts_total = IntCounter::new(
            "ready_room_ready_up_timeouts_total",
            "Ready-ups that expired before every player was ready",
        )?;
        registry.register(Box::new(ready_up_timeouts_total.clone()))?;

        let games_started_total =
            IntCounter::new("ready_room_games_started_total", "Total games started")?;
        registry.register(Box::new(games_started_total.clone()))?;

        let players_joined_total = IntCounter::new(
            "ready_room_players_joined_total",
            "Players that took a lobby slot",
        )?;
        registry.register(Box::new(players_joined_total.clone()))?;

        let players_removed_total = IntCounter::new(
            "ready_room_players_removed_total",
            "Players removed from a lobby slot",
        )?;
        registry.register(Box::new(players_removed_total.clone()))?;

        Ok(Self {
            active_lobbies,
            lobbies_created_total,
            lobbies_closed_total,
            ready_ups_started_total,
            ready_up_timeouts_total,
            games_started_total,
            players_joined_total,
            players_removed_total,
        })
    }
}

impl ChatMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let messages_total = IntCounterVec::new(
            Opts::new("ready_room_chat_messages_total", "Chat messages sent"),
            &["room"],
        )?;
        registry.register(Box::new(messages_total.clone()))?;

        let log_failures_total = IntCounter::new(
            "ready_room_chat_log_failures_total",
            "Chat log open or write failures",
        )?;
        registry.register(Box::new(log_failures_total.clone()))?;

        let broadcasts_total = IntCounterVec::new(
            Opts::new("ready_room_broadcasts_total", "Room broadcasts sent"),
            &["event"],
        )?;
        registry.register(Box::new(broadcasts_total.clone()))?;

        let delivery_failures_total = IntCounter::new(
            "ready_room_delivery_failures_total",
            "Failed emits to a connection",
        )?;
        registry.register(Box::new(delivery_failures_total.clone()))?;

        Ok(Self {
            messages_total,
            log_failures_total,
            broadcasts_total,
            delivery_failures_total,
        })
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new().expect("Failed to create default metrics collector")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_collector_creation() {
        let collector = MetricsCollector::new().expect("Failed to create metrics collector");

        let _service = collector.service();
        let _lobby = collector.lobby();
        let _chat = collector.chat();
    }

    #[test]
    fn test_lobby_lifecycle_recording() {
        let collector = MetricsCollector::new().expect("Failed to create metrics collector");

        collector.record_lobby_created(LobbyType::Sixes);
        collector.record_lobby_created(LobbyType::Highlander);
        collector.record_ready_up_started();
        collector.record_game_started();
        collector.record_lobby_closed(true);

        let lobby = collector.lobby();
        assert_eq!(lobby.active_lobbies.get(), 1);
        assert_eq!(
            lobby
                .lobbies_created_total
                .with_label_values(&["6s"])
                .get(),
            1
        );
        assert_eq!(lobby.ready_ups_started_total.get(), 1);
        assert_eq!(lobby.games_started_total.get(), 1);
    }

    #[test]
    fn test_chat_recording() {
        let collector = MetricsCollector::new().expect("Failed to create metrics collector");

        collector.record_chat_message(true);
        collector.record_chat_message(false);
        collector.record_chat_message(false);
        collector.record_chat_log_failure();
        collector.record_broadcast("chatReceive");

        let chat = collector.chat();
        assert_eq!(chat.messages_total.with_label_values(&["lobby"]).get(), 2);
        assert_eq!(chat.log_failures_total.get(), 1);
        assert_eq!(
            chat.broadcasts_total.with_label_values(&["chatReceive"]).get(),
            1
        );
    }

    #[test]
    fn test_encode_exposes_metrics() {
        let collector = MetricsCollector::new().expect("Failed to create metrics collector");
        collector.record_ready_up_timeout();

        let text = collector.encode().unwrap();
        assert!(text.contains("ready_room_ready_up_timeouts_total 1"));
        assert!(text.contains("ready_room_uptime_seconds"));
    }
}
