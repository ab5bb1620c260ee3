//! The master store: a single JSON array of canonical records, always rewritten whole.

use crate::config::CorruptMasterPolicy;
use crate::models::TxRecord;
use crate::store::StoreError;
use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct MasterStore {
    path: PathBuf,
    on_corrupt: CorruptMasterPolicy,
}

impl MasterStore {
    pub fn new(path: impl Into<PathBuf>, on_corrupt: CorruptMasterPolicy) -> Self {
        Self {
            path: path.into(),
            on_corrupt,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load every record. A missing or blank file is an empty store; an
    /// unreadable one is handled according to the configured policy.
    pub async fn load(&self) -> Result<Vec<TxRecord>, StoreError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return self.unreadable(e.to_string()),
        };

        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }

        match serde_json::from_slice::<Vec<TxRecord>>(&bytes) {
            Ok(records) => Ok(records),
            Err(e) => self.unreadable(e.to_string()),
        }
    }

    fn unreadable(&self, reason: String) -> Result<Vec<TxRecord>, StoreError> {
        match self.on_corrupt {
            CorruptMasterPolicy::Fail => Err(StoreError::Corrupt {
                path: self.path.clone(),
                reason,
            }),
            CorruptMasterPolicy::TreatAsEmpty => {
                warn!(
                    "Master store {} is unreadable ({}); continuing with an empty store, existing content will be replaced on the next write",
                    self.path.display(),
                    reason
                );
                Ok(Vec::new())
            }
        }
    }

    /// Replace the whole store with `records`.
    ///
    /// The new content is serialized in memory and written to a sibling temp
    /// file, which is then renamed over the store. A failure at any step
    /// leaves the previous file untouched.
    pub async fn rewrite(&self, records: &[TxRecord]) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(records)?;
        let tmp_path = self.tmp_path();

        if let Err(e) = write_synced(&tmp_path, &bytes).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(StoreError::io(&tmp_path, e));
        }

        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .map_err(|e| StoreError::io(&self.path, e))?;

        info!("Wrote {} transactions to {}", records.len(), self.path.display());
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| OsString::from("master"));
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

async fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = tokio::fs::File::create(path).await?;
    file.write_all(bytes).await?;
    file.sync_all().await?;
    Ok(())
}
