// Parameterized upsert statements over the fixed graph schema.
// Every write is create-if-absent followed by a property overwrite, so
// applying the same statement twice leaves the store unchanged.

use serde::Serialize;
use sqlx::{Row, SqliteConnection, SqlitePool};

pub async fn upsert_transaction_node(
    conn: &mut SqliteConnection,
    txid: &str,
    value: i64,
    fee: i64,
    status_json: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO tx_nodes (txid, value, fee, status, name)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(txid) DO UPDATE SET
            value = excluded.value,
            fee = excluded.fee,
            status = excluded.status,
            name = excluded.name
        "#,
    )
    .bind(txid)
    .bind(value)
    .bind(fee)
    .bind(status_json)
    .bind(txid)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

pub async fn upsert_block_node(
    conn: &mut SqliteConnection,
    height: i64,
    hash: Option<&str>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO block_nodes (height, hash, name)
        VALUES (?, ?, ?)
        ON CONFLICT(height) DO UPDATE SET
            hash = excluded.hash,
            name = excluded.name
        "#,
    )
    .bind(height)
    .bind(hash)
    .bind(height.to_string())
    .execute(&mut *conn)
    .await?;

    Ok(())
}

pub async fn link_included_in(
    conn: &mut SqliteConnection,
    txid: &str,
    height: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO included_in_edges (txid, height) VALUES (?, ?)
         ON CONFLICT(txid, height) DO NOTHING",
    )
    .bind(txid)
    .bind(height)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

pub async fn upsert_wallet_node(conn: &mut SqliteConnection, address: &str) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO wallet_nodes (address) VALUES (?)
         ON CONFLICT(address) DO NOTHING",
    )
    .bind(address)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Wallet -SENT(value)-> Transaction
pub async fn upsert_sent(
    conn: &mut SqliteConnection,
    address: &str,
    txid: &str,
    value: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO sent_edges (address, txid, value) VALUES (?, ?, ?)
        ON CONFLICT(address, txid) DO UPDATE SET value = excluded.value
        "#,
    )
    .bind(address)
    .bind(txid)
    .bind(value)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Transaction -RECEIVED(value)-> Wallet
pub async fn upsert_received(
    conn: &mut SqliteConnection,
    txid: &str,
    address: &str,
    value: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO received_edges (txid, address, value) VALUES (?, ?, ?)
        ON CONFLICT(txid, address) DO UPDATE SET value = excluded.value
        "#,
    )
    .bind(txid)
    .bind(address)
    .bind(value)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionNode {
    pub txid: String,
    pub value: i64,
    pub fee: i64,
    pub status: String,
}

pub async fn get_transaction_node(
    pool: &SqlitePool,
    txid: &str,
) -> Result<Option<TransactionNode>, sqlx::Error> {
    let row = sqlx::query("SELECT txid, value, fee, status FROM tx_nodes WHERE txid = ?")
        .bind(txid)
        .fetch_optional(pool)
        .await?;

    Ok(row.map(|row| TransactionNode {
        txid: row.get("txid"),
        value: row.get("value"),
        fee: row.get("fee"),
        status: row.get("status"),
    }))
}

/// `(address, value)` of every SENT relationship into `txid`, ordered by address.
pub async fn senders_of(pool: &SqlitePool, txid: &str) -> Result<Vec<(String, i64)>, sqlx::Error> {
    let rows = sqlx::query("SELECT address, value FROM sent_edges WHERE txid = ? ORDER BY address")
        .bind(txid)
        .fetch_all(pool)
        .await?;

    Ok(rows.iter().map(|row| (row.get("address"), row.get("value"))).collect())
}

/// `(address, value)` of every RECEIVED relationship out of `txid`, ordered by address.
pub async fn receivers_of(pool: &SqlitePool, txid: &str) -> Result<Vec<(String, i64)>, sqlx::Error> {
    let rows = sqlx::query("SELECT address, value FROM received_edges WHERE txid = ? ORDER BY address")
        .bind(txid)
        .fetch_all(pool)
        .await?;

    Ok(rows.iter().map(|row| (row.get("address"), row.get("value"))).collect())
}

/// Height and hash of the block `txid` is INCLUDED_IN, if any.
pub async fn block_of(
    pool: &SqlitePool,
    txid: &str,
) -> Result<Option<(i64, Option<String>)>, sqlx::Error> {
    let row = sqlx::query(
        "SELECT b.height, b.hash FROM included_in_edges e
         JOIN block_nodes b ON b.height = e.height
         WHERE e.txid = ?",
    )
    .bind(txid)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|row| (row.get("height"), row.get("hash"))))
}

/// Number of nodes per label and relationships per type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GraphStats {
    pub transactions: i64,
    pub blocks: i64,
    pub wallets: i64,
    pub sent: i64,
    pub received: i64,
    pub included_in: i64,
}

pub async fn graph_stats(pool: &SqlitePool) -> Result<GraphStats, sqlx::Error> {
    let row = sqlx::query(
        r#"SELECT
            (SELECT COUNT(*) FROM tx_nodes) AS transactions,
            (SELECT COUNT(*) FROM block_nodes) AS blocks,
            (SELECT COUNT(*) FROM wallet_nodes) AS wallets,
            (SELECT COUNT(*) FROM sent_edges) AS sent,
            (SELECT COUNT(*) FROM received_edges) AS received,
            (SELECT COUNT(*) FROM included_in_edges) AS included_in"#,
    )
    .fetch_one(pool)
    .await?;

    Ok(GraphStats {
        transactions: row.get("transactions"),
        blocks: row.get("blocks"),
        wallets: row.get("wallets"),
        sent: row.get("sent"),
        received: row.get("received"),
        included_in: row.get("included_in"),
    })
}
