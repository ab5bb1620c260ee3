//! Bounded memoization of ledger lookups using Moka

use std::future::Future;
use std::time::Duration;
use moka::future::Cache;
use crate::blockchain::client::LookupError;
use crate::models::TxRecord;
use tracing::debug;

/// Caches successful lookups by txid.
///
/// Capacity-bounded with TTL expiry. Failed lookups are never cached, and
/// concurrent lookups of the same txid share a single fetch.
#[derive(Clone)]
pub struct LookupCache {
    cache: Cache<String, TxRecord>,
}

impl LookupCache {
    pub fn new(capacity: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(capacity)
            .time_to_live(ttl)
            .build();

        Self { cache }
    }

    pub async fn get(&self, txid: &str) -> Option<TxRecord> {
        self.cache.get(txid).await
    }

    /// Return the cached record for `txid`, or run `fetch` and cache its success.
    pub async fn get_or_fetch<F>(&self, txid: &str, fetch: F) -> Result<TxRecord, LookupError>
    where
        F: Future<Output = Result<TxRecord, LookupError>>,
    {
        if let Some(record) = self.cache.get(txid).await {
            debug!("Cache hit for txid: {}", txid);
            return Ok(record);
        }

        debug!("Cache miss for txid: {}", txid);
        self.cache
            .try_get_with(txid.to_string(), fetch)
            .await
            .map_err(|e| (*e).clone())
    }

    /// Approximate number of cached entries, after pending maintenance runs.
    pub async fn entry_count(&self) -> u64 {
        self.cache.run_pending_tasks().await;
        self.cache.entry_count()
    }
}
