//! # Semindex Indexer
//!
//! Orchestration for a workspace's semantic code index.
//!
//! ## Pipeline
//!
//! ```text
//! Workspace
//!     │
//!     ├──> ConfigState (enabled? configured? allowed?)
//!     │
//!     ├──> SizeEstimator ──> StorageTuner (new collections only)
//!     │
//!     ├──> Scanner (full / incremental / fast start)
//!     │      └─> Vector Store (embedded blocks + collection metadata)
//!     │
//!     └──> FileWatcher (incremental updates after a successful scan)
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use semindex_indexer::{ConfigState, JsonSettingsStore, MemorySecretStore};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Arc::new(JsonSettingsStore::new("/path/to/settings.json"));
//!     let secrets = Arc::new(MemorySecretStore::new());
//!     let mut config = ConfigState::new(settings, secrets);
//!     let change = config.load().await?;
//!
//!     println!("reindex required: {}", change.requires_reindex);
//!     Ok(())
//! }
//! ```

mod cache;
mod config;
mod error;
mod estimator;
mod orchestrator;
mod scanner;
mod state;
mod traits;
mod watcher;

pub use cache::FileCacheManager;
pub use config::{
    builtin_model_dimension, classify_config_change, CodeIndexSettings, ConfigChangeResult,
    ConfigSnapshot, ConfigState, EmbedderProvider, JsonSettingsStore, MemorySecretStore,
    SecretStore, SettingsStore, SECRET_GEMINI_API_KEY, SECRET_OPENAI_API_KEY,
    SECRET_OPENAI_COMPATIBLE_API_KEY, SECRET_QDRANT_API_KEY,
};
pub use error::{IndexerError, Result};
pub use estimator::{
    SizeEstimator, DEFAULT_AVG_TOKENS_PER_VECTOR, DEFAULT_CHARS_PER_TOKEN, DEFAULT_CODE_MULTIPLIER,
};
pub use orchestrator::{Collaborators, IndexOrchestrator};
pub use scanner::{is_relevant_path, FileScanner, ALLOWED_EXTENSIONS};
pub use state::{IndexProgress, IndexStatus, IndexingState};
pub use traits::{
    CacheManager, CancelToken, FileWatcher, ScanCallbacks, ScanMode, ScanStats, Scanner,
    WatchBatchEvent,
};
pub use watcher::{WorkspaceWatcher, WorkspaceWatcherConfig};
