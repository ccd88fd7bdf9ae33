use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Cooperative cancellation flag handed to long-running collaborators.
///
/// Scanners must check [`CancelToken::is_cancelled`] at least once per batch
/// so a stop request never waits on a full scan.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Whether a scan may rely on the local cache to skip unchanged files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanMode {
    Full,
    Incremental,
}

/// Aggregate result of a completed scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanStats {
    pub processed_files: u64,
    pub skipped_files: u64,
    pub total_blocks: u64,
}

/// Progress sinks invoked by the scanner while it runs. Batch errors are
/// collected rather than thrown so the orchestrator can judge the whole scan
/// against its failure-rate policy afterwards.
#[derive(Clone)]
pub struct ScanCallbacks {
    pub on_batch_error: Arc<dyn Fn(String) + Send + Sync>,
    pub on_blocks_indexed: Arc<dyn Fn(u64) + Send + Sync>,
    pub on_blocks_found: Arc<dyn Fn(u64) + Send + Sync>,
}

impl ScanCallbacks {
    /// Callbacks that discard everything; useful for probing scans and tests.
    #[must_use]
    pub fn noop() -> Self {
        Self {
            on_batch_error: Arc::new(|_| {}),
            on_blocks_indexed: Arc::new(|_| {}),
            on_blocks_found: Arc::new(|_| {}),
        }
    }
}

impl std::fmt::Debug for ScanCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanCallbacks").finish_non_exhaustive()
    }
}

/// Directory scanner + chunker + embedder pipeline, treated as opaque.
///
/// Returns `Ok(None)` when the scanner was never initialized; the
/// orchestrator treats that as an internal failure.
#[async_trait]
pub trait Scanner: Send + Sync {
    async fn scan(
        &self,
        root: &Path,
        mode: ScanMode,
        callbacks: ScanCallbacks,
        cancel: CancelToken,
    ) -> Result<Option<ScanStats>>;
}

/// Events delivered by a running file watcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchBatchEvent {
    BatchStart {
        total_files: usize,
    },
    BatchProgress {
        processed_in_batch: usize,
        total_in_batch: usize,
        current_file: String,
    },
    BatchFinish {
        processed_files: Vec<String>,
        batch_error: Option<String>,
    },
}

/// File-change watcher started after a successful scan.
///
/// Events may interleave with a later `stop_indexing`/`clear_index_data`, so
/// `dispose` must be idempotent and safe to call from any state.
#[async_trait]
pub trait FileWatcher: Send + Sync {
    async fn initialize(&self) -> Result<()>;

    fn subscribe(&self) -> broadcast::Receiver<WatchBatchEvent>;

    async fn dispose(&self);
}

/// Local per-file fingerprint cache consumed by incremental scans.
///
/// Invariant: the cache must never describe files the vector store does not
/// actually hold. Whenever the two could diverge the orchestrator clears it.
#[async_trait]
pub trait CacheManager: Send + Sync {
    async fn clear_cache_file(&self) -> Result<()>;

    async fn flush(&self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_token_flips_once() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        token.cancel();
        assert!(token.is_cancelled());

        let clone = token.clone();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn noop_callbacks_do_not_panic() {
        let callbacks = ScanCallbacks::noop();
        (callbacks.on_batch_error)("boom".to_string());
        (callbacks.on_blocks_indexed)(3);
        (callbacks.on_blocks_found)(5);
    }
}
