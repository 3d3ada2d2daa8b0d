//! Rotating log for the global lobby-list chat (room 0)
//!
//! Unlike lobby rooms, the global room is never closed. One writer task
//! drains its queue into the current dated file and a ticker swaps that file
//! at every local midnight. Writes and rotation take the same file lock, so a
//! line is always written whole into exactly one file.

use crate::metrics::MetricsCollector;
use crate::utils::{date_label, until_next_midnight, Clock};
use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, oneshot, Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

enum GlobalEntry {
    Line(String),
    Sync(oneshot::Sender<()>),
}

struct OpenLog {
    path: PathBuf,
    file: File,
}

/// File name of the global log for a given day
pub fn global_log_name(at: DateTime<Local>) -> String {
    format!("room#0-{}", date_label(at))
}

async fn open_global(dir: &Path, at: DateTime<Local>) -> std::io::Result<OpenLog> {
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(global_log_name(at));
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .await?;
    Ok(OpenLog { path, file })
}

/// The global chat log with midnight rotation
pub struct GlobalChatLog {
    dir: PathBuf,
    clock: Arc<dyn Clock>,
    current: Arc<Mutex<Option<OpenLog>>>,
    sender: StdMutex<Option<mpsc::Sender<GlobalEntry>>>,
    writer: StdMutex<Option<JoinHandle<()>>>,
    rotation: StdMutex<Option<JoinHandle<()>>>,
    stop_rotation: Arc<Notify>,
    metrics: Arc<MetricsCollector>,
}

impl GlobalChatLog {
    /// Open today's file and start the writer task
    ///
    /// A file that cannot be opened is logged and leaves the log without a
    /// target until the next successful rotation.
    pub async fn open(
        dir: impl Into<PathBuf>,
        clock: Arc<dyn Clock>,
        queue_capacity: usize,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        let dir = dir.into();
        let initial = match open_global(&dir, clock.now()).await {
            Ok(log) => {
                info!("Global chat log opened at {}", log.path.display());
                Some(log)
            }
            Err(e) => {
                error!("Failed to open global chat log in {}: {}", dir.display(), e);
                metrics.record_chat_log_failure();
                None
            }
        };

        let current = Arc::new(Mutex::new(initial));
        let (sender, receiver) = mpsc::channel(queue_capacity.max(1));
        let writer = tokio::spawn(write_loop(receiver, current.clone(), metrics.clone()));

        Self {
            dir,
            clock,
            current,
            sender: StdMutex::new(Some(sender)),
            writer: StdMutex::new(Some(writer)),
            rotation: StdMutex::new(None),
            stop_rotation: Arc::new(Notify::new()),
            metrics,
        }
    }

    fn sender(&self) -> Option<mpsc::Sender<GlobalEntry>> {
        self.sender.lock().ok().and_then(|s| s.clone())
    }

    /// Queue a formatted line, waiting for room in the queue if it is full
    pub async fn write(&self, line: String) {
        let Some(sender) = self.sender() else {
            warn!("Global chat log is shut down, dropping line");
            return;
        };
        if sender.send(GlobalEntry::Line(line)).await.is_err() {
            warn!("Global chat log writer has stopped, dropping line");
        }
    }

    /// Wait until every line queued before this call has been written
    pub async fn sync(&self) {
        let Some(sender) = self.sender() else {
            return;
        };
        let (tx, rx) = oneshot::channel();
        if sender.send(GlobalEntry::Sync(tx)).await.is_ok() {
            let _ = rx.await;
        }
    }

    /// Path of the file currently receiving writes
    pub async fn current_path(&self) -> Option<PathBuf> {
        self.current.lock().await.as_ref().map(|log| log.path.clone())
    }

    /// Reopen the log for the clock's current day
    pub async fn rotate(&self) -> std::io::Result<PathBuf> {
        self.rotate_at(self.clock.now()).await
    }

    /// Swap the writer onto the file for `at`'s day and close the previous one
    pub async fn rotate_at(&self, at: DateTime<Local>) -> std::io::Result<PathBuf> {
        let mut current = self.current.lock().await;

        let next = match open_global(&self.dir, at).await {
            Ok(log) => log,
            Err(e) => {
                error!("Failed to rotate global chat log: {}", e);
                self.metrics.record_chat_log_failure();
                return Err(e);
            }
        };
        let path = next.path.clone();

        if let Some(mut previous) = current.replace(next) {
            if let Err(e) = previous.file.flush().await {
                error!(
                    "Failed to flush global chat log {}: {}",
                    previous.path.display(),
                    e
                );
            }
            debug!("Closed global chat log {}", previous.path.display());
        }

        info!("Global chat log rotated to {}", path.display());
        Ok(path)
    }

    /// Start the midnight ticker
    pub fn spawn_rotation(self: &Arc<Self>) {
        let log = Arc::clone(self);
        let stop = self.stop_rotation.clone();

        let handle = tokio::spawn(async move {
            loop {
                let now = log.clock.now();
                let wait = until_next_midnight(now);
                let midnight = now
                    + chrono::Duration::from_std(wait).unwrap_or_else(|_| chrono::Duration::days(1));
                debug!("Next global chat log rotation in {:?}", wait);

                tokio::select! {
                    _ = tokio::time::sleep(wait) => {
                        // Errors are logged inside; keep the old file and retry tomorrow.
                        let _ = log.rotate_at(midnight).await;
                    }
                    _ = stop.notified() => {
                        debug!("Global chat log rotation stopped");
                        return;
                    }
                }
            }
        });

        if let Ok(mut rotation) = self.rotation.lock() {
            if let Some(previous) = rotation.replace(handle) {
                previous.abort();
            }
        }
    }

    /// Stop rotating, drain the queue and close the file
    pub async fn shutdown(&self) {
        self.stop_rotation.notify_one();
        let rotation = self.rotation.lock().ok().and_then(|mut r| r.take());
        if let Some(rotation) = rotation {
            let _ = rotation.await;
        }

        let sender = self.sender.lock().ok().and_then(|mut s| s.take());
        drop(sender);

        let writer = self.writer.lock().ok().and_then(|mut w| w.take());
        if let Some(writer) = writer {
            if let Err(e) = writer.await {
                error!("Global chat log writer failed: {}", e);
            }
        }

        if let Some(mut log) = self.current.lock().await.take() {
            let _ = log.file.flush().await;
            info!("Global chat log {} closed", log.path.display());
        }
    }
}

async fn write_loop(
    mut receiver: mpsc::Receiver<GlobalEntry>,
    current: Arc<Mutex<Option<OpenLog>>>,
    metrics: Arc<MetricsCollector>,
) {
    while let Some(entry) = receiver.recv().await {
        match entry {
            GlobalEntry::Line(line) => {
                let mut current = current.lock().await;
                let Some(log) = current.as_mut() else {
                    warn!("No global chat log file open, dropping line");
                    metrics.record_chat_log_failure();
                    continue;
                };
                let result = async {
                    log.file.write_all(line.as_bytes()).await?;
                    log.file.flush().await
                }
                .await;
                if let Err(e) = result {
                    error!("Failed to write global chat log {}: {}", log.path.display(), e);
                    metrics.record_chat_log_failure();
                }
            }
            GlobalEntry::Sync(done) => {
                let _ = done.send(());
            }
        }
    }
    debug!("Stopping listener for #0");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::ManualClock;

    #[test]
    fn test_global_log_name() {
        let clock = ManualClock::at(2016, 1, 2, 10, 0);
        assert_eq!(global_log_name(clock.now()), "room#0-2-January-2016");
    }

    #[tokio::test]
    async fn test_rotation_moves_writes_to_new_file() {
        let dir = tempfile::tempdir().unwrap();
        let clock = ManualClock::at(2016, 1, 2, 23, 59);
        let log = GlobalChatLog::open(
            dir.path(),
            Arc::new(clock.clone()),
            18,
            Arc::new(MetricsCollector::default()),
        )
        .await;

        log.write("before\n".to_string()).await;
        log.sync().await;

        clock.advance(chrono::Duration::minutes(2));
        let new_path = log.rotate().await.unwrap();
        assert!(new_path.ends_with("room#0-3-January-2016"));

        log.write("after\n".to_string()).await;
        log.shutdown().await;

        let old = std::fs::read_to_string(dir.path().join("room#0-2-January-2016")).unwrap();
        let new = std::fs::read_to_string(new_path).unwrap();
        assert_eq!(old, "before\n");
        assert_eq!(new, "after\n");
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticker_rotates_at_midnight() {
        let dir = tempfile::tempdir().unwrap();
        let clock = ManualClock::at(2016, 1, 2, 23, 59);
        let log = Arc::new(
            GlobalChatLog::open(
                dir.path(),
                Arc::new(clock.clone()),
                18,
                Arc::new(MetricsCollector::default()),
            )
            .await,
        );
        log.write("before\n".to_string()).await;
        log.sync().await;
        let old_path = log.current_path().await.unwrap();
        assert!(old_path.ends_with("room#0-2-January-2016"));

        log.spawn_rotation();
        tokio::time::sleep(std::time::Duration::from_secs(61)).await;
        clock.advance(chrono::Duration::seconds(61));

        let new_path = log.current_path().await.unwrap();
        assert!(new_path.ends_with("room#0-3-January-2016"));

        log.write("after\n".to_string()).await;
        log.shutdown().await;

        assert_eq!(std::fs::read_to_string(&old_path).unwrap(), "before\n");
        assert_eq!(std::fs::read_to_string(&new_path).unwrap(), "after\n");
    }

    #[tokio::test]
    async fn test_write_after_shutdown_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let clock = ManualClock::at(2016, 1, 2, 12, 0);
        let log = GlobalChatLog::open(
            dir.path(),
            Arc::new(clock),
            18,
            Arc::new(MetricsCollector::default()),
        )
        .await;

        log.shutdown().await;
        log.write("late\n".to_string()).await;
        assert!(log.current_path().await.is_none());
    }
}
