//! Append-only newline-delimited JSON log of freshly observed transactions.

use crate::models::TxRecord;
use crate::store::StoreError;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct StagingLog {
    path: PathBuf,
}

/// Records parsed from the log, plus the number of lines that did not parse.
#[derive(Debug, Default)]
pub struct StagedRecords {
    pub records: Vec<TxRecord>,
    pub malformed: usize,
}

impl StagingLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn exists(&self) -> bool {
        tokio::fs::try_exists(&self.path).await.unwrap_or(false)
    }

    /// Append one record as a single line.
    ///
    /// The file is opened, written and closed per record, so an interrupted
    /// write can only damage the last line.
    pub async fn append(&self, record: &TxRecord) -> Result<(), StoreError> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| StoreError::io(&self.path, e))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| StoreError::io(&self.path, e))?;
        file.flush().await.map_err(|e| StoreError::io(&self.path, e))?;

        Ok(())
    }

    /// Parse every line independently. Malformed or truncated lines are
    /// counted and skipped; a missing file reads as empty.
    pub async fn read_records(&self) -> Result<StagedRecords, StoreError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(StagedRecords::default()),
            Err(e) => return Err(StoreError::io(&self.path, e)),
        };

        let mut staged = StagedRecords::default();
        for (index, line) in bytes.split(|b| *b == b'\n').enumerate() {
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            match serde_json::from_slice::<TxRecord>(line) {
                Ok(record) => staged.records.push(record),
                Err(e) => {
                    debug!("Skipping malformed staging line {}: {}", index + 1, e);
                    staged.malformed += 1;
                }
            }
        }

        Ok(staged)
    }

    /// Delete the log. Already absent is not an error.
    pub async fn remove(&self) -> Result<(), StoreError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::io(&self.path, e)),
        }
    }
}
