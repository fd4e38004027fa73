use crate::model::{Owner, RecordId};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VitrineError {
    #[error("Invalid image filename: {0:?}")]
    InvalidFilename(String),

    #[error("Invalid owner: {0}")]
    InvalidOwner(String),

    #[error("Image record not found: {0}")]
    RecordNotFound(RecordId),

    #[error("Record {id} cannot belong to {owner}")]
    OwnerMismatch { id: RecordId, owner: Owner },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] confique::Error),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Reconciliation already running (lock held at {})", path.display())]
    LockHeld { path: PathBuf },

    #[error("Api Error: {0}")]
    Api(String),
}

pub type Result<T> = std::result::Result<T, VitrineError>;
