//! Folds the staging log into the master store.

use crate::store::{MasterStore, StagingLog, StoreError};
use serde::Serialize;
use std::collections::HashSet;
use tracing::info;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MergeReport {
    /// Records appended to the master store.
    pub merged: usize,
    /// Staged records whose txid was already known.
    pub duplicates: usize,
    /// Staging lines that failed to parse.
    pub malformed: usize,
    /// Master store size after the merge.
    pub master_total: usize,
    /// Whether the staging log was deleted.
    pub staging_removed: bool,
}

/// Append every staged record with an unseen txid to the master store.
///
/// The master store is rewritten and the staging log deleted only when at
/// least one new record was found; otherwise both files are left as they are,
/// so re-running a merge is a no-op.
pub async fn merge(staging: &StagingLog, master: &MasterStore) -> Result<MergeReport, StoreError> {
    let mut records = master.load().await?;
    let mut known: HashSet<String> = records.iter().map(|r| r.txid.clone()).collect();

    let staged = staging.read_records().await?;
    let mut report = MergeReport {
        malformed: staged.malformed,
        ..Default::default()
    };

    let mut batch = Vec::new();
    for record in staged.records {
        // Also catches repeats within the staging log itself
        if known.insert(record.txid.clone()) {
            batch.push(record);
        } else {
            report.duplicates += 1;
        }
    }

    if batch.is_empty() {
        info!("No new transactions to merge");
        report.master_total = records.len();
        return Ok(report);
    }

    report.merged = batch.len();
    records.extend(batch);
    master.rewrite(&records).await?;
    staging.remove().await?;

    report.master_total = records.len();
    report.staging_removed = true;
    info!(
        "Merged {} new transactions into {} ({} duplicates, {} malformed lines skipped)",
        report.merged,
        master.path().display(),
        report.duplicates,
        report.malformed
    );

    Ok(report)
}
