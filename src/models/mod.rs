//! Canonical transaction record shared by the listener, the stores and the graph.
//!
//! Every component reads and writes this shape; provider-specific payloads are
//! normalized into it at the edges (`blockchain::models`).

use serde::{Deserialize, Serialize};

/// Confirmation status of a transaction.
///
/// Unconfirmed transactions carry no block fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxStatus {
    #[serde(default)]
    pub confirmed: bool,
    #[serde(default)]
    pub block_height: Option<i64>,
    #[serde(default)]
    pub block_hash: Option<String>,
    #[serde(default)]
    pub block_time: Option<i64>,
}

impl TxStatus {
    pub fn unconfirmed() -> Self {
        Self::default()
    }
}

/// The output an input spends. Both fields may be unknown.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prevout {
    #[serde(default)]
    pub scriptpubkey_address: Option<String>,
    #[serde(default)]
    pub value: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxInput {
    #[serde(default)]
    pub prevout: Prevout,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
    #[serde(default)]
    pub scriptpubkey_address: Option<String>,
    #[serde(default)]
    pub value: Option<i64>,
}

/// A normalized transaction. `txid` is unique across the master store and the graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxRecord {
    pub txid: String,
    #[serde(default)]
    pub status: TxStatus,
    #[serde(default)]
    pub vin: Vec<TxInput>,
    #[serde(default)]
    pub vout: Vec<TxOutput>,
}

impl TxRecord {
    /// Sum of known input values, in satoshi. Unknown values count as zero.
    /// Saturates instead of overflowing on hostile feed values.
    pub fn total_input_value(&self) -> i64 {
        self.vin
            .iter()
            .filter_map(|input| input.prevout.value)
            .fold(0i64, i64::saturating_add)
    }

    /// Sum of known output values, in satoshi. Unknown values count as zero.
    pub fn total_output_value(&self) -> i64 {
        self.vout
            .iter()
            .filter_map(|output| output.value)
            .fold(0i64, i64::saturating_add)
    }

    pub fn fee(&self) -> i64 {
        self.total_input_value().saturating_sub(self.total_output_value())
    }

    pub fn is_confirmed(&self) -> bool {
        self.status.confirmed
    }

    /// Inputs with both an address and a value, as `(address, value)`.
    pub fn senders(&self) -> impl Iterator<Item = (&str, i64)> {
        self.vin.iter().filter_map(|input| {
            match (&input.prevout.scriptpubkey_address, input.prevout.value) {
                (Some(address), Some(value)) if !address.is_empty() => Some((address.as_str(), value)),
                _ => None,
            }
        })
    }

    /// Outputs with both an address and a value, as `(address, value)`.
    pub fn receivers(&self) -> impl Iterator<Item = (&str, i64)> {
        self.vout.iter().filter_map(|output| {
            match (&output.scriptpubkey_address, output.value) {
                (Some(address), Some(value)) if !address.is_empty() => Some((address.as_str(), value)),
                _ => None,
            }
        })
    }
}
