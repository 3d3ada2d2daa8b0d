//! Durable per-room chat logging
//!
//! Every lobby room gets one writer task that owns the room's log file and
//! drains a bounded queue of formatted lines, so writes for a room are
//! totally ordered without a file lock. Rooms are created on their first
//! message and torn down by [`ChatLogger::stop_logger`] when the lobby
//! closes. Room 0 is delegated to the rotating [`GlobalChatLog`].
//!
//! Logging is best effort: failures are reported through tracing and
//! metrics and never propagate to the chat sender.

use crate::chat::global::GlobalChatLog;
use crate::config::ChatSettings;
use crate::metrics::MetricsCollector;
use crate::types::{RoomId, GLOBAL_ROOM};
use crate::utils::{date_label, Clock};
use chrono::{DateTime, Local};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, OnceCell};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Settings the chat logger needs
#[derive(Debug, Clone)]
pub struct ChatLogConfig {
    pub enabled: bool,
    /// Root of the per-day directories of lobby room logs
    pub logs_dir: PathBuf,
    /// Directory of the rotating global log
    pub global_dir: PathBuf,
    /// Bound of each room's line queue
    pub queue_capacity: usize,
}

impl Default for ChatLogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            logs_dir: PathBuf::from("chatlogs"),
            global_dir: PathBuf::from("."),
            queue_capacity: 18,
        }
    }
}

impl From<&ChatSettings> for ChatLogConfig {
    fn from(settings: &ChatSettings) -> Self {
        Self {
            enabled: settings.logs_enabled,
            logs_dir: PathBuf::from(&settings.logs_dir),
            global_dir: PathBuf::from(&settings.global_log_dir),
            queue_capacity: settings.log_queue_capacity,
        }
    }
}

/// Format one log line as `[HH:MM] <player>: message`
pub fn format_line(at: DateTime<Local>, player: &str, message: &str) -> String {
    format!("[{}] <{}>: {}\n", at.format("%H:%M"), player, message)
}

struct RoomWriter {
    sender: mpsc::Sender<String>,
    task: JoinHandle<()>,
}

/// Registry of live room loggers plus the global log
pub struct ChatLogger {
    config: ChatLogConfig,
    clock: Arc<dyn Clock>,
    rooms: Mutex<HashMap<RoomId, RoomWriter>>,
    global: OnceCell<Arc<GlobalChatLog>>,
    metrics: Arc<MetricsCollector>,
}

impl ChatLogger {
    pub fn new(
        config: ChatLogConfig,
        clock: Arc<dyn Clock>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            config,
            clock,
            rooms: Mutex::new(HashMap::new()),
            global: OnceCell::new(),
            metrics,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Open the global log and start its midnight rotation
    pub async fn start_global(&self) -> Option<Arc<GlobalChatLog>> {
        if !self.config.enabled {
            return None;
        }
        let global = self
            .global
            .get_or_init(|| async {
                let log = Arc::new(
                    GlobalChatLog::open(
                        self.config.global_dir.clone(),
                        self.clock.clone(),
                        self.config.queue_capacity,
                        self.metrics.clone(),
                    )
                    .await,
                );
                log.spawn_rotation();
                log
            })
            .await;
        Some(global.clone())
    }

    /// The global log, once started
    pub fn global(&self) -> Option<Arc<GlobalChatLog>> {
        self.global.get().cloned()
    }

    /// Record a chat line for `room`
    ///
    /// Waits only when the room's queue is full.
    pub async fn log_chat(&self, room: RoomId, player: &str, message: &str) {
        if !self.config.enabled {
            return;
        }
        let line = format_line(self.clock.now(), player, message);

        if room == GLOBAL_ROOM {
            if let Some(global) = self.start_global().await {
                global.write(line).await;
            }
            return;
        }

        let Some(sender) = self.sender_for(room).await else {
            return;
        };
        if sender.send(line).await.is_err() {
            warn!("Chat log writer for #{} has stopped, dropping line", room);
            self.metrics.record_chat_log_failure();
        }
    }

    fn live_sender(&self, room: RoomId) -> Option<mpsc::Sender<String>> {
        let rooms = self.rooms.lock().ok()?;
        rooms.get(&room).map(|w| w.sender.clone())
    }

    async fn sender_for(&self, room: RoomId) -> Option<mpsc::Sender<String>> {
        if let Some(sender) = self.live_sender(room) {
            return Some(sender);
        }

        let file = match self.open_room_file(room).await {
            Ok(file) => file,
            Err(e) => {
                error!("Failed to open chat log for #{}: {}", room, e);
                self.metrics.record_chat_log_failure();
                return None;
            }
        };

        let mut rooms = self.rooms.lock().ok()?;
        if let Some(existing) = rooms.get(&room) {
            // Another message opened the room first; ours closes on drop.
            return Some(existing.sender.clone());
        }

        let (sender, receiver) = mpsc::channel(self.config.queue_capacity.max(1));
        let task = tokio::spawn(write_loop(receiver, file, room, self.metrics.clone()));
        rooms.insert(
            room,
            RoomWriter {
                sender: sender.clone(),
                task,
            },
        );
        debug!("Started chat log listener for #{}", room);
        Some(sender)
    }

    /// Path of a room's log file for the clock's current day
    pub fn room_log_path(&self, room: RoomId) -> PathBuf {
        self.config
            .logs_dir
            .join(date_label(self.clock.now()))
            .join(format!("room#{}", room))
    }

    async fn open_room_file(&self, room: RoomId) -> std::io::Result<File> {
        let path = self.room_log_path(room);
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
    }

    /// Whether a writer task is live for `room`
    pub fn is_logging(&self, room: RoomId) -> bool {
        self.live_sender(room).is_some()
    }

    /// Close a room's queue and wait for its writer to flush and close the file
    ///
    /// Returns false when the room had no live logger.
    pub async fn stop_logger(&self, room: RoomId) -> bool {
        let writer = self.rooms.lock().ok().and_then(|mut rooms| rooms.remove(&room));
        let Some(RoomWriter { sender, task }) = writer else {
            debug!("No chat log listener for #{} to stop", room);
            return false;
        };

        drop(sender);
        if let Err(e) = task.await {
            error!("Chat log writer for #{} failed: {}", room, e);
        }
        true
    }

    /// Stop every room logger and close the global log
    pub async fn shutdown(&self) {
        let rooms: Vec<RoomId> = self
            .rooms
            .lock()
            .map(|rooms| rooms.keys().copied().collect())
            .unwrap_or_default();
        for room in rooms {
            self.stop_logger(room).await;
        }
        if let Some(global) = self.global.get() {
            global.shutdown().await;
        }
        info!("Chat logger shut down");
    }
}

async fn write_loop(
    mut receiver: mpsc::Receiver<String>,
    mut file: File,
    room: RoomId,
    metrics: Arc<MetricsCollector>,
) {
    while let Some(line) = receiver.recv().await {
        let result = async {
            file.write_all(line.as_bytes()).await?;
            file.flush().await
        }
        .await;
        if let Err(e) = result {
            error!("Failed to write chat log for #{}: {}", room, e);
            metrics.record_chat_log_failure();
        }
    }

    if let Err(e) = file.flush().await {
        error!("Failed to flush chat log for #{}: {}", room, e);
    }
    debug!("Stopping listener for #{}", room);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::ManualClock;

    fn logger(dir: &std::path::Path, clock: ManualClock) -> ChatLogger {
        ChatLogger::new(
            ChatLogConfig {
                enabled: true,
                logs_dir: dir.join("logs"),
                global_dir: dir.to_path_buf(),
                queue_capacity: 18,
            },
            Arc::new(clock),
            Arc::new(MetricsCollector::default()),
        )
    }

    #[test]
    fn test_format_line() {
        let clock = ManualClock::at(2016, 2, 9, 7, 5);
        assert_eq!(format_line(clock.now(), "sol", "hi"), "[07:05] <sol>: hi\n");
    }

    #[tokio::test]
    async fn test_room_log_lands_in_dated_directory() {
        let dir = tempfile::tempdir().unwrap();
        let logger = logger(dir.path(), ManualClock::at(2016, 2, 9, 20, 15));

        logger.log_chat(5, "medic", "gl hf").await;
        assert!(logger.is_logging(5));
        assert!(logger.stop_logger(5).await);
        assert!(!logger.is_logging(5));

        let path = dir.path().join("logs").join("9-February-2016").join("room#5");
        assert_eq!(std::fs::read_to_string(path).unwrap(), "[20:15] <medic>: gl hf\n");
    }

    #[tokio::test]
    async fn test_stop_twice_is_harmless() {
        let dir = tempfile::tempdir().unwrap();
        let logger = logger(dir.path(), ManualClock::at(2016, 2, 9, 20, 15));

        logger.log_chat(1, "a", "x").await;
        logger.log_chat(2, "b", "y").await;
        assert!(logger.stop_logger(1).await);
        assert!(!logger.stop_logger(1).await);
        assert!(logger.is_logging(2));
        logger.shutdown().await;
    }

    #[tokio::test]
    async fn test_disabled_logger_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let logger = ChatLogger::new(
            ChatLogConfig {
                enabled: false,
                logs_dir: dir.path().join("logs"),
                global_dir: dir.path().to_path_buf(),
                queue_capacity: 18,
            },
            Arc::new(ManualClock::at(2016, 2, 9, 20, 15)),
            Arc::new(MetricsCollector::default()),
        );

        logger.log_chat(3, "a", "x").await;
        assert!(!logger.is_logging(3));
        assert!(!dir.path().join("logs").exists());
    }

    #[tokio::test]
    async fn test_unwritable_directory_does_not_fail_caller() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("logs");
        std::fs::write(&blocker, "not a directory").unwrap();
        let logger = logger(dir.path(), ManualClock::at(2016, 2, 9, 20, 15));

        logger.log_chat(9, "a", "x").await;
        assert!(!logger.is_logging(9));
    }
}
