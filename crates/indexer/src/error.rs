use thiserror::Error;

pub type Result<T> = std::result::Result<T, IndexerError>;

#[derive(Error, Debug)]
pub enum IndexerError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Vector store error: {0}")]
    VectorStoreError(#[from] semindex_vector_store::VectorStoreError),

    #[error("Vector store connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Scan failed: {0}")]
    ScanFailed(String),

    #[error("Watcher error: {0}")]
    WatcherError(String),

    #[error("{0}")]
    Other(String),
}
