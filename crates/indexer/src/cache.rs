use crate::error::Result;
use crate::traits::CacheManager;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::Mutex;

/// JSON-file cache of per-file fingerprints, used by the scanner to skip
/// unchanged files on incremental runs.
///
/// Kept deliberately dumb: the orchestrator only ever clears or flushes it,
/// the scanner owns the entries.
pub struct FileCacheManager {
    path: PathBuf,
    entries: Mutex<HashMap<String, String>>,
}

impl FileCacheManager {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub async fn load(&self) -> Result<()> {
        if !self.path.exists() {
            return Ok(());
        }
        let bytes = tokio::fs::read(&self.path).await?;
        let loaded: HashMap<String, String> = serde_json::from_slice(&bytes)?;
        *self.entries.lock().await = loaded;
        Ok(())
    }

    pub async fn get_fingerprint(&self, file: &str) -> Option<String> {
        self.entries.lock().await.get(file).cloned()
    }

    pub async fn set_fingerprint(&self, file: impl Into<String>, fingerprint: impl Into<String>) {
        self.entries
            .lock()
            .await
            .insert(file.into(), fingerprint.into());
    }

    pub async fn remove_fingerprint(&self, file: &str) {
        self.entries.lock().await.remove(file);
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

#[async_trait]
impl CacheManager for FileCacheManager {
    async fn clear_cache_file(&self) -> Result<()> {
        self.entries.lock().await.clear();
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }
        log::debug!("Cleared index cache at {}", self.path.display());
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let entries = self.entries.lock().await;
        let bytes = serde_json::to_vec_pretty(&*entries)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[tokio::test]
    async fn flush_then_load_round_trips_entries() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("cache.json");

        let cache = FileCacheManager::new(&path);
        cache.set_fingerprint("src/lib.rs", "abc123").await;
        cache.flush().await.unwrap();

        let reloaded = FileCacheManager::new(&path);
        reloaded.load().await.unwrap();
        assert_eq!(
            reloaded.get_fingerprint("src/lib.rs").await,
            Some("abc123".to_string())
        );
    }

    #[tokio::test]
    async fn clear_removes_file_and_entries() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("cache.json");

        let cache = FileCacheManager::new(&path);
        cache.set_fingerprint("a.rs", "f1").await;
        cache.flush().await.unwrap();
        assert!(path.exists());

        cache.clear_cache_file().await.unwrap();
        assert!(!path.exists());
        assert!(cache.is_empty().await);

        // Clearing an already-missing file is fine.
        cache.clear_cache_file().await.unwrap();
    }
}
