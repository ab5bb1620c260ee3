//! Batch pipeline: confirmation reconciliation followed by a full graph re-materialization.

use crate::blockchain::client::LedgerClient;
use crate::blockchain::reconciler::{reconcile, ReconcileError, ReconcileOptions};
use crate::cache;
use crate::config::Config;
use crate::db::graph::{graph_stats, GraphStats};
use crate::db::materialize::{bulk_upsert, BulkUpsertReport};
use crate::store::MasterStore;
use serde::Serialize;
use sqlx::SqlitePool;
use std::time::Instant;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum BackfillError {
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),

    #[error("Failed to build ledger client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("Graph store error: {0}")]
    Graph(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Serialize)]
pub struct BackfillReport {
    pub updated: usize,
    pub unconfirmed_before: usize,
    pub upsert: BulkUpsertReport,
    pub graph: GraphStats,
    pub elapsed_secs: f64,
}

/// Reconcile confirmation status in the master store, then upsert every
/// record into the graph to repair anything the live path missed.
pub async fn run_backfill(config: &Config, pool: &SqlitePool) -> Result<BackfillReport, BackfillError> {
    let started = Instant::now();
    info!("Starting transaction verification process");

    let master = MasterStore::new(&config.master_path, config.master_on_corrupt);
    let client = LedgerClient::new(config)?;
    let lookup_cache = cache::init_cache(config);
    let options = ReconcileOptions {
        concurrency: config.lookup_concurrency,
        chunk_size: config.lookup_chunk_size,
    };

    let summary = reconcile(&master, &client, &lookup_cache, options).await?;
    info!(
        "Updated {} out of {} unconfirmed transactions",
        summary.updated, summary.unconfirmed_before
    );

    let upsert = if summary.records.is_empty() {
        info!("No transactions to insert");
        BulkUpsertReport::default()
    } else {
        bulk_upsert(pool, &summary.records, config.upsert_batch_size).await
    };

    let graph = graph_stats(pool).await?;
    let elapsed_secs = started.elapsed().as_secs_f64();
    info!(
        "Graph holds {} transactions, {} wallets, {} blocks; total execution time: {:.2} seconds",
        graph.transactions, graph.wallets, graph.blocks, elapsed_secs
    );

    Ok(BackfillReport {
        updated: summary.updated,
        unconfirmed_before: summary.unconfirmed_before,
        upsert,
        graph,
        elapsed_secs,
    })
}
