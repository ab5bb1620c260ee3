//! Durable file stores: the append-only staging log, the master store, and the merge between them.

pub mod master;
pub mod merge;
pub mod staging;

pub use master::MasterStore;
pub use merge::{merge, MergeReport};
pub use staging::StagingLog;

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize records: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Master store {path} is unreadable: {reason}")]
    Corrupt { path: PathBuf, reason: String },
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }
}
