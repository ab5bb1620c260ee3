//! Confirmation status reconciliation of the master store against the ledger.

use crate::blockchain::client::{LedgerClient, LookupError};
use crate::cache::LookupCache;
use crate::models::TxRecord;
use crate::store::{MasterStore, StoreError};
use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::time::Instant;
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Copy)]
pub struct ReconcileOptions {
    /// Lookups in flight at once.
    pub concurrency: usize,
    /// Records per chunk; progress is reported after each chunk.
    pub chunk_size: usize,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            concurrency: 10,
            chunk_size: 100,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReconcileSummary {
    /// Records flipped to confirmed in this run.
    pub updated: usize,
    /// Unconfirmed records found before the run.
    pub unconfirmed_before: usize,
    /// The full master store after the run, in its original order.
    pub records: Vec<TxRecord>,
}

/// Look up every unconfirmed record and replace those now confirmed.
///
/// Replacements happen in place at the record's original index, so the
/// store keeps its order regardless of lookup completion order. The master
/// store is rewritten only if something changed.
pub async fn reconcile(
    master: &MasterStore,
    client: &LedgerClient,
    cache: &LookupCache,
    options: ReconcileOptions,
) -> Result<ReconcileSummary, ReconcileError> {
    let started = Instant::now();
    let mut records = master.load().await?;
    info!("Loaded {} transactions from {}", records.len(), master.path().display());

    let txid_to_index: HashMap<String, usize> = records
        .iter()
        .enumerate()
        .map(|(index, record)| (record.txid.clone(), index))
        .collect();

    let unconfirmed: Vec<String> = records
        .iter()
        .filter(|record| !record.is_confirmed())
        .map(|record| record.txid.clone())
        .collect();
    let total = unconfirmed.len();
    info!("Found {} unconfirmed transactions", total);

    let mut updated = 0;
    let mut checked = 0;
    for chunk in unconfirmed.chunks(options.chunk_size.max(1)) {
        // Owned txids: a closure over `&String` breaks the `Send` bound axum handlers need
        let results: Vec<(String, Result<TxRecord, LookupError>)> = stream::iter(chunk.iter().cloned())
            .map(|txid: String| async move {
                let result = cache.get_or_fetch(&txid, client.fetch_transaction(&txid)).await;
                (txid, result)
            })
            .buffer_unordered(options.concurrency.max(1))
            .collect()
            .await;

        for (txid, result) in results {
            match result {
                Ok(fresh) if fresh.is_confirmed() => {
                    // Index lookup never misses: txids come from `records` itself
                    if let Some(&index) = txid_to_index.get(&txid) {
                        records[index] = fresh;
                        updated += 1;
                    }
                }
                Ok(_) => {}
                Err(LookupError::NotFound(_)) => {
                    info!("Transaction {} not found on ledger, leaving unconfirmed", txid);
                }
                Err(e) => warn!("Status check failed for {}: {}", txid, e),
            }
        }

        checked += chunk.len();
        info!(
            "Status check: {}% complete ({}/{})",
            checked * 100 / total,
            checked,
            total
        );
    }

    if updated > 0 {
        if let Err(e) = master.rewrite(&records).await {
            error!("Failed to write reconciled master store: {}", e);
            return Err(e.into());
        }
        info!("Updated {} transactions in {}", updated, master.path().display());
    } else {
        info!("No transactions needed updating");
    }

    info!(
        "Status reconciliation completed in {:.2} seconds",
        started.elapsed().as_secs_f64()
    );

    Ok(ReconcileSummary {
        updated,
        unconfirmed_before: total,
        records,
    })
}
