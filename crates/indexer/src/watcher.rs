use crate::error::{IndexerError, Result};
use crate::scanner::is_relevant_path;
use crate::traits::{FileWatcher, WatchBatchEvent};
use async_trait::async_trait;
use log::warn;
use notify::{Config as NotifyConfig, Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc};
use tokio::time;

#[derive(Debug, Clone)]
pub struct WorkspaceWatcherConfig {
    pub debounce: Duration,
    pub max_batch_wait: Duration,
    pub notify_poll_interval: Duration,
}

impl Default for WorkspaceWatcherConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(750),
            max_batch_wait: Duration::from_secs(3),
            notify_poll_interval: Duration::from_secs(2),
        }
    }
}

enum WatcherCommand {
    Shutdown,
}

/// Notify-backed [`FileWatcher`] that coalesces raw filesystem events into
/// debounced batches and emits them as [`WatchBatchEvent`]s.
pub struct WorkspaceWatcher {
    root: PathBuf,
    config: WorkspaceWatcherConfig,
    event_tx: broadcast::Sender<WatchBatchEvent>,
    command_tx: tokio::sync::Mutex<Option<mpsc::Sender<WatcherCommand>>>,
    watcher: std::sync::Mutex<Option<RecommendedWatcher>>,
    disposed: AtomicBool,
}

impl WorkspaceWatcher {
    #[must_use]
    pub fn new(root: impl AsRef<Path>, config: WorkspaceWatcherConfig) -> Self {
        let (event_tx, _) = broadcast::channel(64);
        Self {
            root: root.as_ref().to_path_buf(),
            config,
            event_tx,
            command_tx: tokio::sync::Mutex::new(None),
            watcher: std::sync::Mutex::new(None),
            disposed: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl FileWatcher for WorkspaceWatcher {
    async fn initialize(&self) -> Result<()> {
        let (fs_tx, fs_rx) = mpsc::channel(1024);
        let (command_tx, command_rx) = mpsc::channel(4);

        let watcher = create_fs_watcher(&self.root, fs_tx, self.config.notify_poll_interval)?;
        *self.watcher.lock().expect("watcher mutex poisoned") = Some(watcher);
        *self.command_tx.lock().await = Some(command_tx);
        self.disposed.store(false, Ordering::SeqCst);

        spawn_batch_loop(
            self.root.clone(),
            self.config.clone(),
            fs_rx,
            command_rx,
            self.event_tx.clone(),
        );
        log::info!("Watching {} for changes", self.root.display());
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<WatchBatchEvent> {
        self.event_tx.subscribe()
    }

    async fn dispose(&self) {
        // Idempotent: a second call (or one before initialize) is a no-op.
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        drop(self.watcher.lock().expect("watcher mutex poisoned").take());
        if let Some(command_tx) = self.command_tx.lock().await.take() {
            let _ = command_tx.send(WatcherCommand::Shutdown).await;
        }
        log::info!("Stopped watching {}", self.root.display());
    }
}

fn create_fs_watcher(
    root: &Path,
    sender: mpsc::Sender<notify::Result<Event>>,
    poll_interval: Duration,
) -> Result<RecommendedWatcher> {
    let mut watcher = RecommendedWatcher::new(
        move |res| {
            let _ = sender.blocking_send(res);
        },
        NotifyConfig::default().with_poll_interval(poll_interval),
    )
    .map_err(|e| IndexerError::WatcherError(format!("watcher init failed: {e}")))?;
    watcher
        .watch(root, RecursiveMode::Recursive)
        .map_err(|e| IndexerError::WatcherError(format!("failed to watch {}: {e}", root.display())))?;
    Ok(watcher)
}

fn spawn_batch_loop(
    root: PathBuf,
    config: WorkspaceWatcherConfig,
    mut fs_rx: mpsc::Receiver<notify::Result<Event>>,
    mut command_rx: mpsc::Receiver<WatcherCommand>,
    event_tx: broadcast::Sender<WatchBatchEvent>,
) {
    tokio::spawn(async move {
        let mut state = BatchState::new(config.debounce, config.max_batch_wait);

        loop {
            let next_deadline = state.next_deadline();

            tokio::select! {
                Some(event) = fs_rx.recv() => {
                    handle_event(&root, event, &mut state);
                }
                Some(WatcherCommand::Shutdown) = command_rx.recv() => break,
                () = async {
                    if let Some(deadline) = next_deadline {
                        time::sleep_until(deadline).await;
                    }
                }, if next_deadline.is_some() => {
                    emit_batch(&event_tx, state.take_batch());
                }
                else => break,
            }
        }

        // Flush whatever was pending when the shutdown arrived.
        let remaining = state.take_batch();
        if !remaining.is_empty() {
            emit_batch(&event_tx, remaining);
        }
    });
}

fn handle_event(root: &Path, event: notify::Result<Event>, state: &mut BatchState) {
    match event {
        Ok(evt) => {
            for path in evt.paths {
                if is_relevant_path(root, &path) {
                    state.record_path(&path);
                }
            }
        }
        Err(err) => warn!("Watcher error: {err}"),
    }
}

fn emit_batch(event_tx: &broadcast::Sender<WatchBatchEvent>, paths: Vec<String>) {
    if paths.is_empty() {
        return;
    }
    let total = paths.len();
    let _ = event_tx.send(WatchBatchEvent::BatchStart { total_files: total });
    for (i, path) in paths.iter().enumerate() {
        let _ = event_tx.send(WatchBatchEvent::BatchProgress {
            processed_in_batch: i + 1,
            total_in_batch: total,
            current_file: path.clone(),
        });
    }
    let _ = event_tx.send(WatchBatchEvent::BatchFinish {
        processed_files: paths,
        batch_error: None,
    });
}

/// Debounce/coalesce bookkeeping for filesystem events: wait for `debounce`
/// of quiet after the last event, but never hold a batch longer than
/// `max_batch` after its first event.
struct BatchState {
    debounce: Duration,
    max_batch: Duration,
    paths: Vec<String>,
    last_event: Option<Instant>,
    first_event: Option<Instant>,
}

impl BatchState {
    const fn new(debounce: Duration, max_batch: Duration) -> Self {
        Self {
            debounce,
            max_batch,
            paths: Vec::new(),
            last_event: None,
            first_event: None,
        }
    }

    fn record_path(&mut self, path: &Path) {
        let key = path.to_string_lossy().to_string();
        if !self.paths.contains(&key) {
            self.paths.push(key);
        }
        self.last_event = Some(Instant::now());
        self.first_event.get_or_insert_with(Instant::now);
    }

    fn next_deadline(&self) -> Option<time::Instant> {
        if self.paths.is_empty() {
            return None;
        }

        let mut deadline = self.last_event.map(|last| last + self.debounce);
        if let Some(first) = self.first_event {
            let forced = first + self.max_batch;
            deadline = Some(match deadline {
                Some(current) if forced < current => forced,
                Some(current) => current,
                None => forced,
            });
        }
        deadline.map(time::Instant::from_std)
    }

    fn take_batch(&mut self) -> Vec<String> {
        self.last_event = None;
        self.first_event = None;
        std::mem::take(&mut self.paths)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn batch_state_dedups_paths() {
        let mut state = BatchState::new(Duration::from_millis(100), Duration::from_secs(1));
        state.record_path(Path::new("/p/a.rs"));
        state.record_path(Path::new("/p/a.rs"));
        state.record_path(Path::new("/p/b.rs"));
        assert_eq!(state.take_batch().len(), 2);
    }

    #[test]
    fn empty_state_has_no_deadline() {
        let state = BatchState::new(Duration::from_millis(100), Duration::from_secs(1));
        assert!(state.next_deadline().is_none());
    }

    #[test]
    fn recorded_event_produces_deadline() {
        let mut state = BatchState::new(Duration::from_millis(100), Duration::from_secs(1));
        state.record_path(Path::new("/p/a.rs"));
        assert!(state.next_deadline().is_some());
    }

    #[test]
    fn take_batch_resets_state() {
        let mut state = BatchState::new(Duration::from_millis(100), Duration::from_secs(1));
        state.record_path(Path::new("/p/a.rs"));
        let _ = state.take_batch();
        assert!(state.next_deadline().is_none());
        assert!(state.take_batch().is_empty());
    }

    #[tokio::test]
    async fn dispose_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let watcher = WorkspaceWatcher::new(tmp.path(), WorkspaceWatcherConfig::default());
        watcher.initialize().await.unwrap();

        watcher.dispose().await;
        watcher.dispose().await;
    }

    #[tokio::test]
    async fn dispose_before_initialize_is_safe() {
        let tmp = TempDir::new().unwrap();
        let watcher = WorkspaceWatcher::new(tmp.path(), WorkspaceWatcherConfig::default());
        watcher.dispose().await;
    }

    #[tokio::test]
    async fn file_change_emits_a_batch() {
        let tmp = TempDir::new().unwrap();
        let watcher = WorkspaceWatcher::new(
            tmp.path(),
            WorkspaceWatcherConfig {
                debounce: Duration::from_millis(50),
                max_batch_wait: Duration::from_millis(500),
                notify_poll_interval: Duration::from_millis(50),
            },
        );
        watcher.initialize().await.unwrap();
        let mut events = watcher.subscribe();

        tokio::fs::write(tmp.path().join("changed.rs"), "fn main() {}")
            .await
            .unwrap();

        let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("expected a batch event")
            .unwrap();
        assert!(matches!(event, WatchBatchEvent::BatchStart { total_files } if total_files >= 1));

        watcher.dispose().await;
    }
}
