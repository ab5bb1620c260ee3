//! Projects canonical records into the graph store.

use crate::db::{graph, GraphError};
use crate::models::TxRecord;
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::{debug, info, warn};

/// Percent-complete marks logged during a bulk upsert.
const MILESTONES: [u8; 7] = [10, 30, 50, 70, 80, 90, 100];

/// Upsert one record: Transaction node, its Block, then SENT and RECEIVED
/// relationships for every input/output with a known address and value.
///
/// Runs in a single store transaction, so a record is either fully applied or not at all.
pub async fn upsert_transaction(pool: &SqlitePool, record: &TxRecord) -> Result<(), GraphError> {
    let status_json = serde_json::to_string(&record.status)?;
    let mut tx = pool.begin().await?;

    graph::upsert_transaction_node(
        &mut tx,
        &record.txid,
        record.total_input_value(),
        record.fee(),
        &status_json,
    )
    .await?;

    if let Some(height) = record.status.block_height {
        graph::upsert_block_node(&mut tx, height, record.status.block_hash.as_deref()).await?;
        graph::link_included_in(&mut tx, &record.txid, height).await?;
    }

    for (address, value) in record.senders() {
        graph::upsert_wallet_node(&mut tx, address).await?;
        graph::upsert_sent(&mut tx, address, &record.txid, value).await?;
    }

    for (address, value) in record.receivers() {
        graph::upsert_wallet_node(&mut tx, address).await?;
        graph::upsert_received(&mut tx, &record.txid, address, value).await?;
    }

    tx.commit().await?;
    debug!("Materialized transaction {}", record.txid);

    Ok(())
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BulkUpsertReport {
    pub total: usize,
    pub upserted: usize,
    pub failed: usize,
}

/// Tracks which percent-complete milestones have already been reported.
#[derive(Debug, Default)]
pub struct MilestoneTracker {
    next: usize,
}

impl MilestoneTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Highest milestone newly crossed after `done` of `total` items, if any.
    pub fn advance(&mut self, done: usize, total: usize) -> Option<u8> {
        if total == 0 {
            return None;
        }
        let percent = (done * 100 / total) as u8;
        let mut reached = None;
        while self.next < MILESTONES.len() && percent >= MILESTONES[self.next] {
            reached = Some(MILESTONES[self.next]);
            self.next += 1;
        }
        reached
    }
}

/// Upsert `records` in batches of `batch_size`, logging only at milestones.
///
/// A record that fails is logged and counted; the rest of the run continues.
pub async fn bulk_upsert(
    pool: &SqlitePool,
    records: &[TxRecord],
    batch_size: usize,
) -> BulkUpsertReport {
    let total = records.len();
    let mut report = BulkUpsertReport { total, ..Default::default() };
    let mut milestones = MilestoneTracker::new();

    info!("Inserting {} transactions into the graph store", total);

    let mut done = 0;
    for batch in records.chunks(batch_size.max(1)) {
        for record in batch {
            match upsert_transaction(pool, record).await {
                Ok(()) => report.upserted += 1,
                Err(e) => {
                    warn!("Failed to materialize transaction {}: {}", record.txid, e);
                    report.failed += 1;
                }
            }

            done += 1;
            if let Some(mark) = milestones.advance(done, total) {
                info!("Graph insertion: {}% complete ({}/{})", mark, done, total);
            }
        }
    }

    info!(
        "Graph insertion finished: {} upserted, {} failed",
        report.upserted, report.failed
    );
    report
}
