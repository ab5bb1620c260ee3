//! Upstream payload shapes and their normalization into `TxRecord`.
//!
//! The push feed and the ledger lookup service each use their own layout;
//! nothing outside this module sees either.

use serde::Deserialize;
use thiserror::Error;
use crate::models::{Prevout, TxInput, TxOutput, TxRecord, TxStatus};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("Invalid feed message: {0}")]
    InvalidJson(String),

    #[error("Feed message has no transaction payload")]
    MissingPayload,

    #[error("Feed transaction has no hash")]
    MissingTxid,
}

/// Envelope of a push feed message, e.g. `{"op": "utx", "x": {...}}`.
#[derive(Debug, Deserialize)]
pub struct FeedEnvelope {
    #[serde(default)]
    pub x: Option<RawFeedTx>,
}

#[derive(Debug, Deserialize)]
pub struct RawFeedTx {
    #[serde(default)]
    pub hash: Option<String>,
    #[serde(default)]
    pub inputs: Option<Vec<RawFeedInput>>,
    #[serde(default)]
    pub out: Option<Vec<RawFeedOutput>>,
}

#[derive(Debug, Deserialize)]
pub struct RawFeedInput {
    #[serde(default)]
    pub prev_out: Option<RawFeedOutput>,
}

#[derive(Debug, Deserialize)]
pub struct RawFeedOutput {
    #[serde(default)]
    pub addr: Option<String>,
    #[serde(default)]
    pub value: Option<i64>,
}

/// Parse a feed message and normalize its transaction.
///
/// Feed transactions are unconfirmed by definition: the status is always
/// `confirmed = false` with no block fields.
pub fn parse_feed_message(text: &str) -> Result<TxRecord, NormalizeError> {
    let envelope: FeedEnvelope =
        serde_json::from_str(text).map_err(|e| NormalizeError::InvalidJson(e.to_string()))?;
    let raw = envelope.x.ok_or(NormalizeError::MissingPayload)?;
    normalize_feed_tx(raw)
}

pub fn normalize_feed_tx(raw: RawFeedTx) -> Result<TxRecord, NormalizeError> {
    let txid = raw
        .hash
        .filter(|hash| !hash.is_empty())
        .ok_or(NormalizeError::MissingTxid)?;

    let vin = raw
        .inputs
        .unwrap_or_default()
        .into_iter()
        .map(|input| TxInput {
            prevout: input
                .prev_out
                .map(|prev| Prevout {
                    scriptpubkey_address: prev.addr,
                    value: prev.value,
                })
                .unwrap_or_default(),
        })
        .collect();

    let vout = raw
        .out
        .unwrap_or_default()
        .into_iter()
        .map(|output| TxOutput {
            scriptpubkey_address: output.addr,
            value: output.value,
        })
        .collect();

    Ok(TxRecord {
        txid,
        status: TxStatus::unconfirmed(),
        vin,
        vout,
    })
}

/// A ledger lookup response. Carries many more fields than we keep; unknown
/// ones are ignored and `prevout` is null for coinbase inputs.
#[derive(Debug, Deserialize)]
pub struct LedgerTx {
    pub txid: String,
    #[serde(default)]
    pub status: TxStatus,
    #[serde(default)]
    pub vin: Vec<LedgerInput>,
    #[serde(default)]
    pub vout: Vec<TxOutput>,
}

#[derive(Debug, Deserialize)]
pub struct LedgerInput {
    #[serde(default)]
    pub prevout: Option<Prevout>,
}

impl From<LedgerTx> for TxRecord {
    fn from(tx: LedgerTx) -> Self {
        TxRecord {
            txid: tx.txid,
            status: tx.status,
            vin: tx
                .vin
                .into_iter()
                .map(|input| TxInput {
                    prevout: input.prevout.unwrap_or_default(),
                })
                .collect(),
            vout: tx.vout,
        }
    }
}
