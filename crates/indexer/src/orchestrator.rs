use crate::config::ConfigState;
use crate::error::{IndexerError, Result};
use crate::estimator::SizeEstimator;
use crate::state::{IndexProgress, IndexStatus, IndexingState};
use crate::traits::{
    CacheManager, CancelToken, FileWatcher, ScanCallbacks, ScanMode, Scanner, WatchBatchEvent,
};
use semindex_vector_store::{
    validate_storage_config, CollectionMetadata, SizableVectorStore, SizeSignal, StorageTuner,
    VectorStore,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex as TokioMutex, RwLock};

/// Scans with more than this share of found-but-unindexed blocks are treated
/// as failed when any batch error occurred.
const MAX_PARTIAL_FAILURE_RATE: f64 = 0.10;

/// External collaborators the orchestrator drives. Implementations of the
/// scanner/embedder pipeline and the vector database client live elsewhere.
pub struct Collaborators {
    pub vector_store: Arc<dyn VectorStore>,
    /// Present when the store supports pre-sizing a brand-new collection.
    pub sizable_store: Option<Arc<dyn SizableVectorStore>>,
    pub scanner: Arc<dyn Scanner>,
    pub watcher: Arc<dyn FileWatcher>,
    pub cache: Arc<dyn CacheManager>,
}

/// Top-level coordinator for one workspace's semantic code index.
///
/// Owns the indexing state machine, decides between full / incremental /
/// fast-start cycles, starts and stops the change watcher, and applies the
/// cache-preservation policy on failure.
pub struct IndexOrchestrator {
    workspace: Option<PathBuf>,
    config: Arc<RwLock<ConfigState>>,
    collaborators: Collaborators,
    estimator: SizeEstimator,
    tuner: StorageTuner,
    status_tx: Arc<watch::Sender<IndexStatus>>,
    status_rx: watch::Receiver<IndexStatus>,
    /// Reentrancy guard: flipped with compare-and-swap so two concurrent
    /// `start_indexing` calls cannot both pass.
    processing: AtomicBool,
    cancel: TokioMutex<Option<CancelToken>>,
    watcher_running: AtomicBool,
}

impl IndexOrchestrator {
    #[must_use]
    pub fn new(
        workspace: Option<PathBuf>,
        config: Arc<RwLock<ConfigState>>,
        collaborators: Collaborators,
        estimator: SizeEstimator,
        tuner: StorageTuner,
    ) -> Self {
        let (status_tx, status_rx) = watch::channel(IndexStatus::standby("Ready"));
        Self {
            workspace,
            config,
            collaborators,
            estimator,
            tuner,
            status_tx: Arc::new(status_tx),
            status_rx,
            processing: AtomicBool::new(false),
            cancel: TokioMutex::new(None),
            watcher_running: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn status(&self) -> IndexStatus {
        self.status_rx.borrow().clone()
    }

    #[must_use]
    pub fn state(&self) -> IndexingState {
        self.status_rx.borrow().state
    }

    /// Observe state transitions and progress updates.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<IndexStatus> {
        self.status_tx.subscribe()
    }

    /// Start an indexing cycle. Not-ready conditions (no workspace, not
    /// configured, project not allow-listed) route to Standby with a
    /// message; they are not errors. Returns Ok(()) without doing anything
    /// when a cycle is already running.
    pub async fn start_indexing(&self, is_retry_after_error: bool) -> Result<()> {
        // 1. Readiness checks: not failures, just not-ready states.
        let Some(workspace) = self.workspace.clone() else {
            self.publish(IndexStatus::standby("No workspace open"));
            return Ok(());
        };
        {
            let config = self.config.read().await;
            if !config.is_enabled() || !config.is_configured() {
                self.publish(IndexStatus::standby(
                    "Code index is disabled or not configured",
                ));
                return Ok(());
            }
            if !config.is_project_allowed(&workspace) {
                self.publish(IndexStatus::standby(format!(
                    "Project {} is not on the indexing allow-list",
                    workspace.display()
                )));
                return Ok(());
            }
        }

        // 2. Reentrancy + legal-source-state guard.
        if self
            .processing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            log::debug!("start_indexing ignored: a cycle is already running");
            return Ok(());
        }
        if !self.state().accepts_start() {
            self.processing.store(false, Ordering::SeqCst);
            log::debug!(
                "start_indexing ignored from state {}",
                self.state().as_str()
            );
            return Ok(());
        }

        let result = self.run_cycle(&workspace, is_retry_after_error).await;
        self.processing.store(false, Ordering::SeqCst);
        result
    }

    async fn run_cycle(&self, workspace: &Path, is_retry_after_error: bool) -> Result<()> {
        let store = &self.collaborators.vector_store;

        // 3. Fast start: reuse the existing index when its metadata proves
        // it was finished under the current embedding space.
        match self.try_fast_start().await {
            Ok(true) => {
                log::info!("Fast start: existing index matches current config");
                self.start_watcher_if_enabled().await?;
                self.publish(IndexStatus::indexed("Index reused without rescanning"));
                return Ok(());
            }
            Ok(false) => {}
            Err(err) if is_retry_after_error => {
                // 4. On retry, a failed probe means the store is still
                // unreachable; cache stays intact for a later incremental run.
                let err = IndexerError::ConnectionFailed(err.to_string());
                self.publish(IndexStatus::error(&err));
                return Err(err);
            }
            Err(err) => {
                log::warn!("Fast start probe failed, falling through to a full cycle: {err}");
            }
        }

        // 5. Connect and ensure the collection exists.
        let collection_created = match store.initialize().await {
            Ok(created) => created,
            Err(err) => {
                // Connection never succeeded: preserve the cache so a later
                // retry can still scan incrementally.
                let err = IndexerError::ConnectionFailed(err.to_string());
                self.publish(IndexStatus::error(&err));
                return Err(err);
            }
        };

        // From here on the store connection has succeeded; any failure must
        // clear the cache so it never claims coverage the store lost.
        if collection_created {
            if let Err(err) = self.collaborators.cache.clear_cache_file().await {
                self.publish(IndexStatus::error(&err));
                return Err(err);
            }
            self.size_new_collection(workspace).await;
        }

        // 6. Incremental only when the collection already held data and was
        // not just created; otherwise full.
        let had_data = match store.has_indexed_data().await {
            Ok(had_data) => had_data,
            Err(err) => {
                log::warn!("Could not read existing point data, assuming empty: {err}");
                false
            }
        };
        let mode = if had_data && !collection_created {
            ScanMode::Incremental
        } else {
            ScanMode::Full
        };
        log::info!(
            "Starting {} scan of {}",
            match mode {
                ScanMode::Full => "full",
                ScanMode::Incremental => "incremental",
            },
            workspace.display()
        );

        match self.run_scan(workspace, mode).await {
            Ok(ScanOutcome::Completed) => match self.finish_cycle().await {
                Ok(()) => {
                    self.publish(IndexStatus::indexed("Workspace index is up to date"));
                    Ok(())
                }
                Err(err) => Err(self.fail_after_connection(err, false).await),
            },
            Ok(ScanOutcome::Aborted) => {
                // A user abort is a clean stop, never an error.
                match self.collaborators.cache.flush().await {
                    Ok(()) => {
                        self.publish(IndexStatus::standby("Indexing stopped"));
                        Ok(())
                    }
                    Err(err) => Err(self.fail_after_connection(err, false).await),
                }
            }
            Err(err) => Err(self.fail_after_connection(err, true).await),
        }
    }

    /// 8. Stamp completion metadata and hand off to the watcher.
    async fn finish_cycle(&self) -> Result<()> {
        let metadata = self.current_metadata(true).await;
        self.collaborators
            .vector_store
            .mark_indexing_complete(metadata)
            .await?;
        self.collaborators.cache.flush().await?;
        self.start_watcher_if_enabled().await?;
        Ok(())
    }

    /// 9. Failure handler for everything past a successful store connection:
    /// the cache can no longer be trusted, and the state machine must land in
    /// Error so a later `start_indexing` is accepted again.
    async fn fail_after_connection(
        &self,
        err: IndexerError,
        clear_collection: bool,
    ) -> IndexerError {
        if let Err(cache_err) = self.collaborators.cache.clear_cache_file().await {
            log::warn!("Failed to clear cache after indexing failure: {cache_err}");
        }
        if clear_collection {
            if let Err(clear_err) = self.collaborators.vector_store.clear_collection().await {
                log::warn!("Failed to clear partial collection: {clear_err}");
            }
        }
        self.publish(IndexStatus::error(&err));
        err
    }

    /// Returns true when scanning can be skipped entirely.
    async fn try_fast_start(&self) -> Result<bool> {
        let store = &self.collaborators.vector_store;
        if !store.collection_exists().await? {
            return Ok(false);
        }
        let Some(metadata) = store.get_index_metadata().await? else {
            return Ok(false);
        };

        let config = self.config.read().await;
        let dimension = config.resolved_dimension().unwrap_or(0);
        let provider = config.snapshot().embedder_provider.as_str();
        Ok(metadata.allows_fast_start(dimension, provider))
    }

    /// Estimate the corpus and apply storage tuning to a brand-new
    /// collection, when the store supports pre-sizing.
    async fn size_new_collection(&self, workspace: &Path) {
        let Some(sizable) = self.collaborators.sizable_store.as_ref() else {
            return;
        };

        let estimate = match self.estimator.estimate(workspace).await {
            Ok(estimate) => estimate,
            Err(err) => {
                log::warn!("Size estimation failed, using default tuning: {err}");
                return;
            }
        };

        let mode = self.config.read().await.settings().vector_storage_mode;
        let storage_config = match self
            .tuner
            .config_for(mode, SizeSignal::EstimatedVectorCount(estimate.estimated_vector_count))
        {
            Ok(config) => config,
            Err(err) => {
                log::warn!("Storage tuning rejected, keeping store defaults: {err}");
                return;
            }
        };

        let violations = validate_storage_config(&storage_config);
        if !violations.is_empty() {
            log::warn!(
                "Storage config rejected, keeping store defaults: {}",
                violations.join("; ")
            );
            return;
        }

        if let Err(err) = sizable.set_collection_config(&estimate, &storage_config).await {
            log::warn!("Failed to apply storage config to new collection: {err}");
        }
    }

    async fn run_scan(&self, workspace: &Path, mode: ScanMode) -> Result<ScanOutcome> {
        let store = &self.collaborators.vector_store;

        // Metadata goes incomplete before any scan so a crash mid-scan can
        // never be read as a finished index.
        let metadata = self.current_metadata(false).await;
        store.mark_indexing_incomplete(metadata).await?;

        let cancel = CancelToken::new();
        *self.cancel.lock().await = Some(cancel.clone());

        let accumulator = Arc::new(ScanAccumulator::default());
        let callbacks = self.scan_callbacks(&accumulator);
        self.publish(IndexStatus::indexing(
            "Indexing workspace",
            IndexProgress::default(),
        ));

        let scan_result = self
            .collaborators
            .scanner
            .scan(workspace, mode, callbacks, cancel.clone())
            .await;
        *self.cancel.lock().await = None;

        if cancel.is_cancelled() {
            return Ok(ScanOutcome::Aborted);
        }

        let stats = match scan_result {
            Ok(Some(stats)) => stats,
            Ok(None) => {
                return Err(IndexerError::ScanFailed(
                    "scanner was never initialized".to_string(),
                ));
            }
            Err(err) => return Err(IndexerError::ScanFailed(err.to_string())),
        };

        let found = accumulator.blocks_found.load(Ordering::SeqCst);
        let indexed = accumulator.blocks_indexed.load(Ordering::SeqCst);
        let errors = accumulator
            .errors
            .lock()
            .expect("error list mutex poisoned")
            .clone();
        log::info!(
            "Scan finished: {} files processed, {indexed}/{found} blocks indexed, {} batch errors",
            stats.processed_files,
            errors.len()
        );

        classify_scan_result(found, indexed, &errors)?;

        self.publish(IndexStatus::indexing(
            "Finalizing index",
            IndexProgress {
                processed_files: stats.processed_files,
                total_files: stats.processed_files + stats.skipped_files,
                blocks_indexed: indexed,
                blocks_found: found,
            },
        ));
        Ok(ScanOutcome::Completed)
    }

    fn scan_callbacks(&self, accumulator: &Arc<ScanAccumulator>) -> ScanCallbacks {
        let status_tx = Arc::clone(&self.status_tx);
        let publish_progress = {
            let accumulator = Arc::clone(accumulator);
            move || {
                let progress = IndexProgress {
                    processed_files: accumulator.files_parsed.load(Ordering::SeqCst),
                    total_files: 0,
                    blocks_indexed: accumulator.blocks_indexed.load(Ordering::SeqCst),
                    blocks_found: accumulator.blocks_found.load(Ordering::SeqCst),
                };
                let _ = status_tx.send(IndexStatus::indexing("Indexing workspace", progress));
            }
        };

        let on_error = {
            let accumulator = Arc::clone(accumulator);
            Arc::new(move |message: String| {
                log::warn!("Batch error during scan: {message}");
                accumulator
                    .errors
                    .lock()
                    .expect("error list mutex poisoned")
                    .push(message);
            })
        };
        let on_indexed = {
            let accumulator = Arc::clone(accumulator);
            let publish = publish_progress.clone();
            Arc::new(move |count: u64| {
                accumulator.blocks_indexed.fetch_add(count, Ordering::SeqCst);
                publish();
            })
        };
        let on_found = {
            let accumulator = Arc::clone(accumulator);
            Arc::new(move |count: u64| {
                accumulator.blocks_found.fetch_add(count, Ordering::SeqCst);
                accumulator.files_parsed.fetch_add(1, Ordering::SeqCst);
                publish_progress();
            })
        };

        ScanCallbacks {
            on_batch_error: on_error,
            on_blocks_indexed: on_indexed,
            on_blocks_found: on_found,
        }
    }

    async fn current_metadata(&self, complete: bool) -> CollectionMetadata {
        let config = self.config.read().await;
        let dimension = config.resolved_dimension().unwrap_or(0);
        let provider = config.snapshot().embedder_provider.as_str();
        let model_id = config.snapshot().model_id.clone();
        if complete {
            CollectionMetadata::completed(dimension, provider, model_id)
        } else {
            CollectionMetadata::incomplete(dimension, provider, model_id)
        }
    }

    async fn start_watcher_if_enabled(&self) -> Result<()> {
        if !self.config.read().await.settings().auto_update_index {
            log::info!("Automatic index updates disabled; watcher not started");
            return Ok(());
        }
        if self.watcher_running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        self.collaborators.watcher.initialize().await?;
        let events = self.collaborators.watcher.subscribe();
        spawn_watch_event_forwarder(events, Arc::clone(&self.status_tx));
        Ok(())
    }

    /// Abort the in-flight scan, stop the watcher, and return to Standby
    /// (unless an error already landed).
    pub async fn stop_indexing(&self) {
        let was_error = self.state() == IndexingState::Error;
        if let Some(cancel) = self.cancel.lock().await.take() {
            cancel.cancel();
        }
        if !was_error {
            self.publish(IndexStatus::stopping());
        }

        self.collaborators.watcher.dispose().await;
        self.watcher_running.store(false, Ordering::SeqCst);
        self.processing.store(false, Ordering::SeqCst);

        if !was_error {
            self.publish(IndexStatus::standby("Indexing stopped"));
        }
    }

    /// Drop the remote collection and the local cache, returning the
    /// workspace to a blank Standby state.
    pub async fn clear_index_data(&self) -> Result<()> {
        if let Some(cancel) = self.cancel.lock().await.take() {
            cancel.cancel();
        }
        self.collaborators.watcher.dispose().await;
        self.watcher_running.store(false, Ordering::SeqCst);
        self.processing.store(false, Ordering::SeqCst);

        let configured = self.config.read().await.is_configured();
        if configured {
            if let Err(err) = self.collaborators.vector_store.delete_collection().await {
                let err = IndexerError::Other(format!("failed to delete collection: {err}"));
                self.publish(IndexStatus::error(&err));
                return Err(err);
            }
        }

        self.collaborators.cache.clear_cache_file().await?;
        self.publish(IndexStatus::standby("Index data cleared"));
        Ok(())
    }

    /// Reload configuration and react: reindex from scratch, bounce the
    /// service, or do nothing.
    pub async fn handle_config_change(&self) -> Result<crate::config::ConfigChangeResult> {
        let change = self.config.write().await.load().await?;

        if change.requires_reindex {
            self.clear_index_data().await?;
        } else if change.requires_restart {
            self.stop_indexing().await;
        }

        let manual_only = self.config.read().await.settings().manual_indexing_only;
        if change.requires_restart && !manual_only {
            self.start_indexing(false).await?;
        }
        Ok(change)
    }

    fn publish(&self, status: IndexStatus) {
        log::debug!("Index state -> {}: {}", status.state.as_str(), status.message);
        let _ = self.status_tx.send(status);
    }
}

enum ScanOutcome {
    Completed,
    Aborted,
}

#[derive(Default)]
struct ScanAccumulator {
    blocks_indexed: AtomicU64,
    blocks_found: AtomicU64,
    files_parsed: AtomicU64,
    errors: std::sync::Mutex<Vec<String>>,
}

/// Judge a finished scan against the failure policy, in order:
/// zero-indexed with findings, excessive failure rate, the zero-indexed hard
/// override, then silent total failure.
fn classify_scan_result(found: u64, indexed: u64, errors: &[String]) -> Result<()> {
    if found > 0 && indexed == 0 {
        if let Some(first) = errors.first() {
            return Err(IndexerError::ScanFailed(format!(
                "Indexing failed completely: {first}"
            )));
        }
    }

    let failure_rate = if found > 0 {
        (found.saturating_sub(indexed)) as f64 / found as f64
    } else {
        0.0
    };
    if failure_rate > MAX_PARTIAL_FAILURE_RATE && !errors.is_empty() {
        return Err(IndexerError::ScanFailed(format!(
            "Indexing partially failed: {indexed} of {found} blocks indexed; first error: {}",
            errors[0]
        )));
    }

    // The rate formula degenerates when `found` is tiny, so zero progress
    // with recorded errors always fails outright.
    if !errors.is_empty() && indexed == 0 {
        return Err(IndexerError::ScanFailed(format!(
            "Indexing failed completely: {}",
            errors[0]
        )));
    }

    // Silent total failure is still a failure.
    if found > 0 && indexed == 0 {
        return Err(IndexerError::ScanFailed(
            "no blocks were indexed".to_string(),
        ));
    }

    Ok(())
}

fn spawn_watch_event_forwarder(
    mut events: tokio::sync::broadcast::Receiver<WatchBatchEvent>,
    status_tx: Arc<watch::Sender<IndexStatus>>,
) {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(WatchBatchEvent::BatchProgress {
                    processed_in_batch,
                    total_in_batch,
                    current_file,
                }) => {
                    let _ = status_tx.send(IndexStatus {
                        state: IndexingState::Indexed,
                        message: format!(
                            "Updating index ({processed_in_batch}/{total_in_batch}): {current_file}"
                        ),
                        progress: None,
                    });
                }
                Ok(WatchBatchEvent::BatchFinish {
                    processed_files,
                    batch_error,
                }) => {
                    if let Some(err) = batch_error {
                        log::warn!("Watcher batch finished with error: {err}");
                    }
                    let _ = status_tx.send(IndexStatus::indexed(format!(
                        "Index updated ({} files)",
                        processed_files.len()
                    )));
                }
                Ok(WatchBatchEvent::BatchStart { .. }) => {}
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    log::debug!("Watch event stream lagged by {skipped} events");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}
