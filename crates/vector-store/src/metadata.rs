use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

pub const COLLECTION_METADATA_SCHEMA_VERSION: u32 = 1;

/// Small record persisted inside the vector store alongside the collection.
///
/// Lifecycle: absent (no collection) → incomplete (scan running) → complete
/// (scan finished) → incomplete again when the next scan begins. The
/// orchestrator marks the record incomplete *before* any scan starts so a
/// crash mid-scan can never be mistaken for a finished index.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CollectionMetadata {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub vector_dimension: u64,
    pub embedder_provider: String,
    pub model_id: String,
    pub indexing_complete: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at_unix_ms: Option<u64>,
}

fn default_schema_version() -> u32 {
    COLLECTION_METADATA_SCHEMA_VERSION
}

impl CollectionMetadata {
    /// Metadata stamped at the start of a scan cycle.
    #[must_use]
    pub fn incomplete(
        vector_dimension: u64,
        embedder_provider: impl Into<String>,
        model_id: impl Into<String>,
    ) -> Self {
        Self {
            schema_version: COLLECTION_METADATA_SCHEMA_VERSION,
            vector_dimension,
            embedder_provider: embedder_provider.into(),
            model_id: model_id.into(),
            indexing_complete: false,
            completed_at_unix_ms: None,
        }
    }

    /// Metadata stamped after a successful scan.
    #[must_use]
    pub fn completed(
        vector_dimension: u64,
        embedder_provider: impl Into<String>,
        model_id: impl Into<String>,
    ) -> Self {
        Self {
            schema_version: COLLECTION_METADATA_SCHEMA_VERSION,
            vector_dimension,
            embedder_provider: embedder_provider.into(),
            model_id: model_id.into(),
            indexing_complete: true,
            completed_at_unix_ms: Some(unix_now_ms()),
        }
    }

    /// True when a fast start may skip scanning: the stored index was
    /// finished under the same embedding space as the current config.
    #[must_use]
    pub fn allows_fast_start(&self, vector_dimension: u64, embedder_provider: &str) -> bool {
        self.indexing_complete
            && self.vector_dimension == vector_dimension
            && self.embedder_provider == embedder_provider
    }
}

fn unix_now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn incomplete_has_no_completion_timestamp() {
        let meta = CollectionMetadata::incomplete(1536, "openai", "text-embedding-3-small");
        assert_eq!(meta.indexing_complete, false);
        assert_eq!(meta.completed_at_unix_ms, None);
    }

    #[test]
    fn completed_is_fast_start_eligible_for_same_space() {
        let meta = CollectionMetadata::completed(1536, "openai", "text-embedding-3-small");
        assert!(meta.indexing_complete);
        assert!(meta.allows_fast_start(1536, "openai"));
    }

    #[test]
    fn fast_start_rejected_on_dimension_mismatch() {
        let meta = CollectionMetadata::completed(1536, "openai", "text-embedding-3-small");
        assert!(!meta.allows_fast_start(3072, "openai"));
    }

    #[test]
    fn fast_start_rejected_on_provider_mismatch() {
        let meta = CollectionMetadata::completed(1536, "openai", "text-embedding-3-small");
        assert!(!meta.allows_fast_start(1536, "gemini"));
    }

    #[test]
    fn fast_start_rejected_while_scan_in_progress() {
        let meta = CollectionMetadata::incomplete(1536, "openai", "text-embedding-3-small");
        assert!(!meta.allows_fast_start(1536, "openai"));
    }
}
