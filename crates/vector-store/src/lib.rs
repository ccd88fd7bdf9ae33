//! # Semindex Vector Store
//!
//! Storage-side types for the code index: collection metadata, storage
//! tuning (HNSW / quantization / WAL presets), and the abstract
//! [`VectorStore`] surface the orchestrator drives.
//!
//! The concrete database client lives elsewhere; this crate only defines
//! what the index orchestration layer needs from it.

mod error;
mod metadata;
mod store;
mod tuning;

pub use error::{Result, VectorStoreError};
pub use metadata::{CollectionMetadata, COLLECTION_METADATA_SCHEMA_VERSION};
pub use store::{SizableVectorStore, SizeEstimate, VectorStore};
pub use tuning::{
    validate_storage_config, CustomStorageConfig, HnswConfig, QuantizationConfig, QuantizationKind,
    SizeSignal, SizeThresholds, StorageTuner, VectorStorageMode, WalConfig,
    HNSW_EF_CONSTRUCT_MAX, HNSW_EF_CONSTRUCT_MIN, HNSW_M_MAX, HNSW_M_MIN, QUANTIZATION_BITS_MAX,
    QUANTIZATION_BITS_MIN,
};
