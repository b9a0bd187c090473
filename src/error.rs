use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Usage error: {0}")]
    Usage(String),

    #[error("Invalid entity name: {0}")]
    InvalidName(String),

    #[error("Invalid block id: {0}")]
    InvalidBlockId(String),

    #[error("Invalid dataset status: {0}")]
    InvalidStatus(String),

    #[error("Unknown dataset: {0}")]
    UnknownDataset(String),

    #[error("Unknown site: {0}")]
    UnknownSite(String),

    #[error("Snapshot data corrupted: {0}")]
    Corrupted(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Snapshot encoding error: {0}")]
    SnapshotEncoding(#[from] bincode::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;
