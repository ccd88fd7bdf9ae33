use crate::error::Result;
use crate::metadata::CollectionMetadata;
use crate::tuning::CustomStorageConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Pre-index corpus sizing produced once per brand-new collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeEstimate {
    pub estimated_vector_count: u64,
    pub estimated_token_count: u64,
    pub file_count: u64,
    pub total_file_size: u64,
}

/// Abstract vector database holding one workspace's embedded chunks.
///
/// Implementations are out of scope for this crate; the orchestrator only
/// depends on this surface.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Connect and ensure the collection exists. Returns true when a
    /// brand-new collection was created by this call.
    async fn initialize(&self) -> Result<bool>;

    async fn collection_exists(&self) -> Result<bool>;

    /// Whether the collection currently holds any points.
    async fn has_indexed_data(&self) -> Result<bool>;

    /// Live point count, used to re-tune storage for an existing collection.
    async fn point_count(&self) -> Result<u64>;

    /// Stamp the collection metadata as in-progress. Called before any scan
    /// so a crash mid-scan is never read as a finished index.
    async fn mark_indexing_incomplete(&self, metadata: CollectionMetadata) -> Result<()>;

    /// Stamp the collection metadata as finished, recording the embedding
    /// space for future fast-start comparisons.
    async fn mark_indexing_complete(&self, metadata: CollectionMetadata) -> Result<()>;

    /// Read back the persisted metadata, if any.
    async fn get_index_metadata(&self) -> Result<Option<CollectionMetadata>>;

    /// Remove all points but keep the collection.
    async fn clear_collection(&self) -> Result<()>;

    /// Drop the collection entirely.
    async fn delete_collection(&self) -> Result<()>;
}

/// Capability interface for stores whose collection can be sized ahead of
/// time, before any data is written. Kept separate from [`VectorStore`] so
/// support is a compile-time fact rather than a runtime probe.
#[async_trait]
pub trait SizableVectorStore: VectorStore {
    async fn set_collection_config(
        &self,
        estimate: &SizeEstimate,
        config: &CustomStorageConfig,
    ) -> Result<()>;
}
