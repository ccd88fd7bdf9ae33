use crate::error::Result;
use async_trait::async_trait;
use semindex_vector_store::VectorStorageMode;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const SECRET_OPENAI_API_KEY: &str = "openai_api_key";
pub const SECRET_OPENAI_COMPATIBLE_API_KEY: &str = "openai_compatible_api_key";
pub const SECRET_GEMINI_API_KEY: &str = "gemini_api_key";
pub const SECRET_QDRANT_API_KEY: &str = "qdrant_api_key";

/// Embedding providers the index can be configured against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum EmbedderProvider {
    #[default]
    Openai,
    OpenaiCompatible,
    Gemini,
}

impl EmbedderProvider {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Openai => "openai",
            Self::OpenaiCompatible => "openai-compatible",
            Self::Gemini => "gemini",
        }
    }
}

/// Built-in vector dimension for known models. OpenAI-compatible endpoints
/// serve arbitrary models, so they always need an explicit override.
#[must_use]
pub fn builtin_model_dimension(provider: EmbedderProvider, model_id: &str) -> Option<u64> {
    match provider {
        EmbedderProvider::Openai => match model_id {
            "text-embedding-3-small" | "text-embedding-ada-002" => Some(1536),
            "text-embedding-3-large" => Some(3072),
            _ => None,
        },
        EmbedderProvider::Gemini => match model_id {
            "text-embedding-004" => Some(768),
            "gemini-embedding-001" => Some(3072),
            _ => None,
        },
        EmbedderProvider::OpenaiCompatible => None,
    }
}

/// Workspace-side settings, persisted as a flat JSON record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CodeIndexSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub embedder_provider: EmbedderProvider,
    #[serde(default = "default_model_id")]
    pub model_id: String,
    /// Explicit dimension override; required for openai-compatible models.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_dimension: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub openai_compatible_base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qdrant_url: Option<String>,
    #[serde(default)]
    pub vector_storage_mode: VectorStorageMode,
    /// Empty means every project is allowed.
    #[serde(default)]
    pub allowed_projects: Vec<String>,
    #[serde(default)]
    pub manual_indexing_only: bool,
    #[serde(default = "default_true")]
    pub auto_update_index: bool,
}

fn default_model_id() -> String {
    "text-embedding-3-small".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for CodeIndexSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            embedder_provider: EmbedderProvider::default(),
            model_id: default_model_id(),
            model_dimension: None,
            openai_compatible_base_url: None,
            qdrant_url: None,
            vector_storage_mode: VectorStorageMode::default(),
            allowed_projects: Vec::new(),
            manual_indexing_only: false,
            auto_update_index: true,
        }
    }
}

/// Key-value persistence for settings.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn load_settings(&self) -> Result<CodeIndexSettings>;

    async fn save_settings(&self, settings: &CodeIndexSettings) -> Result<()>;
}

/// Credential storage. `refresh_secrets` is called before every reload so a
/// snapshot never diffs against stale credentials.
#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn refresh_secrets(&self) -> Result<()>;

    async fn get_secret(&self, key: &str) -> Option<String>;
}

/// Immutable point-in-time capture of everything a config change can touch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigSnapshot {
    pub enabled: bool,
    pub configured: bool,
    pub embedder_provider: EmbedderProvider,
    pub model_id: String,
    /// Explicit override, or the model's built-in dimension.
    pub resolved_dimension: Option<u64>,
    pub openai_key: Option<String>,
    pub openai_compatible_base_url: Option<String>,
    pub openai_compatible_key: Option<String>,
    pub gemini_key: Option<String>,
    pub qdrant_url: Option<String>,
    pub qdrant_api_key: Option<String>,
    pub vector_storage_mode: VectorStorageMode,
}

/// Outcome of diffing two snapshots. `requires_reindex` implies
/// `requires_restart`; the inverse does not hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigChangeResult {
    pub requires_restart: bool,
    pub requires_reindex: bool,
    pub requires_service_restart: bool,
    pub reason: String,
}

impl ConfigChangeResult {
    #[must_use]
    pub fn none(reason: impl Into<String>) -> Self {
        Self {
            requires_restart: false,
            requires_reindex: false,
            requires_service_restart: false,
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn service_restart(reason: impl Into<String>) -> Self {
        Self {
            requires_restart: true,
            requires_reindex: false,
            requires_service_restart: true,
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn full_reindex(reason: impl Into<String>) -> Self {
        Self {
            requires_restart: true,
            requires_reindex: true,
            requires_service_restart: true,
            reason: reason.into(),
        }
    }
}

/// Classify two snapshots. Rules are evaluated in priority order; the first
/// match wins.
#[must_use]
pub fn classify_config_change(prev: &ConfigSnapshot, next: &ConfigSnapshot) -> ConfigChangeResult {
    let was_ready = prev.enabled && prev.configured;
    let is_ready = next.enabled && next.configured;

    // 1. Feature just became usable.
    if !was_ready && is_ready {
        return ConfigChangeResult::service_restart("enabled");
    }

    // 2. Feature was switched off.
    if prev.enabled && !next.enabled {
        return ConfigChangeResult::service_restart("disabled");
    }

    // 3. Was not ready and still is not.
    if !was_ready && !is_ready {
        return ConfigChangeResult::none("not ready");
    }

    // 4. Remaining disabled cases.
    if !next.enabled {
        return ConfigChangeResult::none("disabled");
    }

    // 5. Embeddings from different providers are not comparable.
    if prev.embedder_provider != next.embedder_provider {
        return ConfigChangeResult::full_reindex(format!(
            "embedder provider changed from {} to {}",
            prev.embedder_provider.as_str(),
            next.embedder_provider.as_str()
        ));
    }

    // 6. A different vector dimension invalidates every stored point.
    if prev.resolved_dimension != next.resolved_dimension {
        return ConfigChangeResult::full_reindex("vector dimension changed");
    }

    // 7. Same embedding space; the clients just need to reconnect.
    let connection_changed = prev.openai_key != next.openai_key
        || prev.openai_compatible_base_url != next.openai_compatible_base_url
        || prev.openai_compatible_key != next.openai_compatible_key
        || prev.gemini_key != next.gemini_key
        || prev.qdrant_url != next.qdrant_url
        || prev.qdrant_api_key != next.qdrant_api_key;
    if connection_changed {
        return ConfigChangeResult::service_restart("connection settings changed");
    }

    // 8. Storage-mode-only changes affect only newly created collections.
    ConfigChangeResult::none("no relevant change")
}

/// Loads persisted settings and decides what a configuration change demands:
/// nothing, a service restart, or a full reindex.
pub struct ConfigState {
    settings_store: Arc<dyn SettingsStore>,
    secret_store: Arc<dyn SecretStore>,
    settings: CodeIndexSettings,
    snapshot: ConfigSnapshot,
}

impl ConfigState {
    /// Create with an empty (disabled, unconfigured) baseline snapshot.
    /// Call [`ConfigState::load`] to pull the persisted settings in.
    #[must_use]
    pub fn new(settings_store: Arc<dyn SettingsStore>, secret_store: Arc<dyn SecretStore>) -> Self {
        Self {
            settings_store,
            secret_store,
            settings: CodeIndexSettings::default(),
            snapshot: ConfigSnapshot::default(),
        }
    }

    /// Refresh secrets, re-parse persisted settings, and classify the change
    /// against the pre-load snapshot.
    pub async fn load(&mut self) -> Result<ConfigChangeResult> {
        let previous = self.snapshot.clone();

        self.secret_store.refresh_secrets().await?;
        self.settings = self.settings_store.load_settings().await?;
        self.snapshot = self.build_snapshot().await;

        let change = classify_config_change(&previous, &self.snapshot);
        log::info!(
            "Config reloaded: restart={} reindex={} service_restart={} ({})",
            change.requires_restart,
            change.requires_reindex,
            change.requires_service_restart,
            change.reason
        );
        Ok(change)
    }

    async fn build_snapshot(&self) -> ConfigSnapshot {
        let settings = &self.settings;
        let openai_key = self.secret_store.get_secret(SECRET_OPENAI_API_KEY).await;
        let openai_compatible_key = self
            .secret_store
            .get_secret(SECRET_OPENAI_COMPATIBLE_API_KEY)
            .await;
        let gemini_key = self.secret_store.get_secret(SECRET_GEMINI_API_KEY).await;
        let qdrant_api_key = self.secret_store.get_secret(SECRET_QDRANT_API_KEY).await;

        let mut snapshot = ConfigSnapshot {
            enabled: settings.enabled,
            configured: false,
            embedder_provider: settings.embedder_provider,
            model_id: settings.model_id.clone(),
            resolved_dimension: settings.model_dimension.or_else(|| {
                builtin_model_dimension(settings.embedder_provider, &settings.model_id)
            }),
            openai_key,
            openai_compatible_base_url: settings.openai_compatible_base_url.clone(),
            openai_compatible_key,
            gemini_key,
            qdrant_url: settings.qdrant_url.clone(),
            qdrant_api_key,
            vector_storage_mode: settings.vector_storage_mode,
        };
        snapshot.configured = is_snapshot_configured(&snapshot);
        snapshot
    }

    #[must_use]
    pub fn settings(&self) -> &CodeIndexSettings {
        &self.settings
    }

    #[must_use]
    pub fn snapshot(&self) -> &ConfigSnapshot {
        &self.snapshot
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.snapshot.enabled
    }

    /// Provider-specific readiness: each provider needs its credentials plus
    /// a reachable vector store URL.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.snapshot.configured
    }

    /// Effective vector dimension for the current config.
    #[must_use]
    pub fn resolved_dimension(&self) -> Option<u64> {
        self.snapshot.resolved_dimension
    }

    /// True when the allow-list is empty (all projects allowed) or contains
    /// `path`.
    #[must_use]
    pub fn is_project_allowed(&self, path: &Path) -> bool {
        if self.settings.allowed_projects.is_empty() {
            return true;
        }
        let path = path.to_string_lossy();
        self.settings
            .allowed_projects
            .iter()
            .any(|allowed| allowed.as_str() == path)
    }
}

fn is_snapshot_configured(snapshot: &ConfigSnapshot) -> bool {
    let has = |value: &Option<String>| value.as_deref().is_some_and(|v| !v.is_empty());
    match snapshot.embedder_provider {
        EmbedderProvider::Openai => has(&snapshot.openai_key) && has(&snapshot.qdrant_url),
        EmbedderProvider::OpenaiCompatible => {
            has(&snapshot.openai_compatible_base_url)
                && has(&snapshot.openai_compatible_key)
                && has(&snapshot.qdrant_url)
        }
        EmbedderProvider::Gemini => has(&snapshot.gemini_key) && has(&snapshot.qdrant_url),
    }
}

/// JSON-file settings store with atomic writes (temp file + rename).
pub struct JsonSettingsStore {
    path: PathBuf,
}

impl JsonSettingsStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl SettingsStore for JsonSettingsStore {
    async fn load_settings(&self) -> Result<CodeIndexSettings> {
        if !self.path.exists() {
            return Ok(CodeIndexSettings::default());
        }
        let bytes = tokio::fs::read(&self.path).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn save_settings(&self, settings: &CodeIndexSettings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let bytes = serde_json::to_vec_pretty(settings)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

/// In-memory secret store, used in tests and single-process setups.
#[derive(Default)]
pub struct MemorySecretStore {
    secrets: tokio::sync::RwLock<std::collections::HashMap<String, String>>,
}

impl MemorySecretStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_secret(&self, key: impl Into<String>, value: impl Into<String>) {
        self.secrets.write().await.insert(key.into(), value.into());
    }

    pub async fn remove_secret(&self, key: &str) {
        self.secrets.write().await.remove(key);
    }
}

#[async_trait]
impl SecretStore for MemorySecretStore {
    async fn refresh_secrets(&self) -> Result<()> {
        Ok(())
    }

    async fn get_secret(&self, key: &str) -> Option<String> {
        self.secrets.read().await.get(key).cloned()
    }
}

impl std::fmt::Debug for ConfigState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigState")
            .field("enabled", &self.snapshot.enabled)
            .field("configured", &self.snapshot.configured)
            .field("provider", &self.snapshot.embedder_provider)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ready_snapshot() -> ConfigSnapshot {
        ConfigSnapshot {
            enabled: true,
            configured: true,
            embedder_provider: EmbedderProvider::Openai,
            model_id: "text-embedding-3-small".to_string(),
            resolved_dimension: Some(1536),
            openai_key: Some("sk-one".to_string()),
            qdrant_url: Some("http://localhost:6333".to_string()),
            ..ConfigSnapshot::default()
        }
    }

    #[test]
    fn becoming_ready_requires_service_restart() {
        let prev = ConfigSnapshot::default();
        let next = ready_snapshot();
        let change = classify_config_change(&prev, &next);
        assert_eq!(change, ConfigChangeResult::service_restart("enabled"));
    }

    #[test]
    fn disabling_requires_service_restart() {
        let prev = ready_snapshot();
        let next = ConfigSnapshot {
            enabled: false,
            ..ready_snapshot()
        };
        let change = classify_config_change(&prev, &next);
        assert_eq!(change, ConfigChangeResult::service_restart("disabled"));
    }

    #[test]
    fn still_not_ready_is_a_no_op() {
        let prev = ConfigSnapshot::default();
        let next = ConfigSnapshot {
            qdrant_url: Some("http://localhost:6333".to_string()),
            ..ConfigSnapshot::default()
        };
        let change = classify_config_change(&prev, &next);
        assert!(!change.requires_restart);
        assert!(!change.requires_reindex);
    }

    #[test]
    fn provider_change_always_wins_over_credential_change() {
        let prev = ready_snapshot();
        // Provider, credentials, and endpoint all change at once; rule
        // priority must still yield a reindex.
        let next = ConfigSnapshot {
            embedder_provider: EmbedderProvider::Gemini,
            gemini_key: Some("g-key".to_string()),
            openai_key: None,
            qdrant_url: Some("http://other:6333".to_string()),
            ..ready_snapshot()
        };
        let change = classify_config_change(&prev, &next);
        assert!(change.requires_reindex);
        assert!(change.requires_restart);
    }

    #[test]
    fn dimension_override_change_requires_reindex() {
        let prev = ready_snapshot();
        let next = ConfigSnapshot {
            resolved_dimension: Some(3072),
            ..ready_snapshot()
        };
        let change = classify_config_change(&prev, &next);
        assert_eq!(change, ConfigChangeResult::full_reindex("vector dimension changed"));
    }

    #[test]
    fn credential_change_restarts_service_without_reindex() {
        let prev = ready_snapshot();
        let next = ConfigSnapshot {
            openai_key: Some("sk-two".to_string()),
            ..ready_snapshot()
        };
        let change = classify_config_change(&prev, &next);
        assert!(change.requires_service_restart);
        assert!(change.requires_restart);
        assert!(!change.requires_reindex);
    }

    #[test]
    fn qdrant_url_change_restarts_service_without_reindex() {
        let prev = ready_snapshot();
        let next = ConfigSnapshot {
            qdrant_url: Some("http://other:6333".to_string()),
            ..ready_snapshot()
        };
        let change = classify_config_change(&prev, &next);
        assert!(change.requires_service_restart);
        assert!(!change.requires_reindex);
    }

    #[test]
    fn storage_mode_only_change_is_a_no_op() {
        let prev = ready_snapshot();
        let next = ConfigSnapshot {
            vector_storage_mode: VectorStorageMode::Large,
            ..ready_snapshot()
        };
        let change = classify_config_change(&prev, &next);
        assert_eq!(change, ConfigChangeResult::none("no relevant change"));
    }

    #[test]
    fn reindex_implies_restart() {
        let change = ConfigChangeResult::full_reindex("x");
        assert!(change.requires_restart);
    }

    #[test]
    fn builtin_dimensions_resolve_known_models() {
        assert_eq!(
            builtin_model_dimension(EmbedderProvider::Openai, "text-embedding-3-large"),
            Some(3072)
        );
        assert_eq!(
            builtin_model_dimension(EmbedderProvider::Gemini, "text-embedding-004"),
            Some(768)
        );
        assert_eq!(
            builtin_model_dimension(EmbedderProvider::OpenaiCompatible, "anything"),
            None
        );
    }

    #[tokio::test]
    async fn load_classifies_against_previous_snapshot() {
        let tmp = tempfile::TempDir::new().unwrap();
        let settings_store = Arc::new(JsonSettingsStore::new(tmp.path().join("settings.json")));
        let secret_store = Arc::new(MemorySecretStore::new());
        secret_store.set_secret(SECRET_OPENAI_API_KEY, "sk-test").await;

        let mut state = ConfigState::new(settings_store.clone(), secret_store.clone());

        // First load: defaults, disabled, not ready.
        let change = state.load().await.unwrap();
        assert!(!change.requires_restart);
        assert!(!state.is_configured());

        // Enable and configure, then reload.
        let settings = CodeIndexSettings {
            enabled: true,
            qdrant_url: Some("http://localhost:6333".to_string()),
            ..CodeIndexSettings::default()
        };
        settings_store.save_settings(&settings).await.unwrap();

        let change = state.load().await.unwrap();
        assert_eq!(change, ConfigChangeResult::service_restart("enabled"));
        assert!(state.is_enabled());
        assert!(state.is_configured());
        assert_eq!(state.resolved_dimension(), Some(1536));
    }

    #[tokio::test]
    async fn provider_specific_configuration_requirements() {
        let tmp = tempfile::TempDir::new().unwrap();
        let settings_store = Arc::new(JsonSettingsStore::new(tmp.path().join("settings.json")));
        let secret_store = Arc::new(MemorySecretStore::new());

        let settings = CodeIndexSettings {
            enabled: true,
            embedder_provider: EmbedderProvider::OpenaiCompatible,
            qdrant_url: Some("http://localhost:6333".to_string()),
            ..CodeIndexSettings::default()
        };
        settings_store.save_settings(&settings).await.unwrap();
        secret_store
            .set_secret(SECRET_OPENAI_COMPATIBLE_API_KEY, "key")
            .await;

        let mut state = ConfigState::new(settings_store.clone(), secret_store.clone());
        state.load().await.unwrap();
        // Missing base URL: not configured yet.
        assert!(!state.is_configured());

        let settings = CodeIndexSettings {
            openai_compatible_base_url: Some("https://embeddings.example".to_string()),
            ..settings
        };
        settings_store.save_settings(&settings).await.unwrap();
        state.load().await.unwrap();
        assert!(state.is_configured());
    }

    #[tokio::test]
    async fn allow_list_defaults_to_everything() {
        let tmp = tempfile::TempDir::new().unwrap();
        let settings_store = Arc::new(JsonSettingsStore::new(tmp.path().join("settings.json")));
        let secret_store = Arc::new(MemorySecretStore::new());
        let mut state = ConfigState::new(settings_store.clone(), secret_store);
        state.load().await.unwrap();

        assert!(state.is_project_allowed(Path::new("/any/project")));

        let settings = CodeIndexSettings {
            allowed_projects: vec!["/work/allowed".to_string()],
            ..CodeIndexSettings::default()
        };
        settings_store.save_settings(&settings).await.unwrap();
        state.load().await.unwrap();

        assert!(state.is_project_allowed(Path::new("/work/allowed")));
        assert!(!state.is_project_allowed(Path::new("/work/other")));
    }

    #[tokio::test]
    async fn settings_survive_an_atomic_save_load_cycle() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = JsonSettingsStore::new(tmp.path().join("nested").join("settings.json"));
        let settings = CodeIndexSettings {
            enabled: true,
            model_dimension: Some(1024),
            allowed_projects: vec!["/a".to_string(), "/b".to_string()],
            manual_indexing_only: true,
            ..CodeIndexSettings::default()
        };
        store.save_settings(&settings).await.unwrap();
        let loaded = store.load_settings().await.unwrap();
        assert_eq!(loaded, settings);
    }
}
