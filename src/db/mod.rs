pub mod connection;
pub mod graph;
pub mod materialize;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum GraphError {
    #[error("Graph store error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Failed to encode transaction status: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Property-graph schema: one table per node label, one per relationship type.
///
/// Relationship tables are keyed by their endpoints so re-applying the same
/// record updates the existing relationship instead of adding another.
pub const INIT_SCHEMA: &str = r#"
-- Node labels
CREATE TABLE IF NOT EXISTS tx_nodes (
    txid TEXT PRIMARY KEY,
    value INTEGER NOT NULL,
    fee INTEGER NOT NULL,
    status TEXT NOT NULL,
    name TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS block_nodes (
    height INTEGER PRIMARY KEY,
    hash TEXT,
    name TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS wallet_nodes (
    address TEXT PRIMARY KEY
);

-- Relationship types
CREATE TABLE IF NOT EXISTS sent_edges (
    address TEXT NOT NULL REFERENCES wallet_nodes(address),
    txid TEXT NOT NULL REFERENCES tx_nodes(txid),
    value INTEGER NOT NULL,
    PRIMARY KEY (address, txid)
);

CREATE TABLE IF NOT EXISTS received_edges (
    txid TEXT NOT NULL REFERENCES tx_nodes(txid),
    address TEXT NOT NULL REFERENCES wallet_nodes(address),
    value INTEGER NOT NULL,
    PRIMARY KEY (txid, address)
);

CREATE TABLE IF NOT EXISTS included_in_edges (
    txid TEXT NOT NULL REFERENCES tx_nodes(txid),
    height INTEGER NOT NULL REFERENCES block_nodes(height),
    PRIMARY KEY (txid, height)
);

-- Reverse lookups for wallet-centric queries
CREATE INDEX IF NOT EXISTS idx_sent_edges_txid ON sent_edges(txid);
CREATE INDEX IF NOT EXISTS idx_received_edges_address ON received_edges(address);
CREATE INDEX IF NOT EXISTS idx_included_in_height ON included_in_edges(height);
"#;
