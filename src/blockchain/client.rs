use crate::blockchain::models::LedgerTx;
use crate::config::Config;
use crate::models::TxRecord;
use backon::{ExponentialBuilder, Retryable};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::StatusCode;
use std::num::NonZeroU32;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    #[error("Transaction not found: {0}")]
    NotFound(String),

    #[error("Transient failure looking up {txid}: {reason}")]
    Transient { txid: String, reason: String },

    #[error("Lookup of {txid} rejected with status {status}")]
    Client { txid: String, status: u16 },

    #[error("Invalid lookup response for {txid}: {reason}")]
    Decode { txid: String, reason: String },
}

impl LookupError {
    /// Only transient failures are worth another attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, LookupError::Transient { .. })
    }
}

/// Retry schedule for transient failures: the wait before retry `k` is
/// `backoff_factor * 2^(k-1)`, for at most `max_retries` retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: usize,
    pub backoff_factor: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: usize, backoff_factor: Duration) -> Self {
        Self {
            max_retries,
            backoff_factor,
        }
    }

    /// Wait before the `k`-th retry, 1-based.
    pub fn delay_before_retry(&self, k: usize) -> Duration {
        let exponent = k.saturating_sub(1).min(31) as u32;
        self.backoff_factor.saturating_mul(2u32.saturating_pow(exponent))
    }

    /// The whole schedule, one entry per allowed retry.
    pub fn delays(&self) -> Vec<Duration> {
        (1..=self.max_retries).map(|k| self.delay_before_retry(k)).collect()
    }

    fn backoff(&self) -> ExponentialBuilder {
        // Cap at the last scheduled delay so backon never clamps earlier ones
        ExponentialBuilder::default()
            .with_min_delay(self.backoff_factor)
            .with_factor(2.0)
            .with_max_delay(self.delay_before_retry(self.max_retries.max(1)))
            .with_max_times(self.max_retries)
    }
}

/// HTTP client for the external ledger lookup service.
pub struct LedgerClient {
    http: reqwest::Client,
    base_url: String,
    retry: RetryPolicy,
    limiter: Option<DefaultDirectRateLimiter>,
}

impl LedgerClient {
    pub fn new(config: &Config) -> Result<Self, reqwest::Error> {
        Self::with_settings(
            &config.ledger_api_url,
            Duration::from_secs(config.lookup_timeout_secs),
            RetryPolicy::new(config.lookup_max_retries, config.lookup_backoff),
            config.lookup_rate_limit,
        )
    }

    pub fn with_settings(
        base_url: &str,
        timeout: Duration,
        retry: RetryPolicy,
        rate_limit: Option<u32>,
    ) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        let limiter = rate_limit
            .and_then(NonZeroU32::new)
            .map(|per_second| RateLimiter::direct(Quota::per_second(per_second)));

        info!(
            "Initializing ledger client with endpoint: {}, max retries: {}, backoff: {:?}",
            base_url, retry.max_retries, retry.backoff_factor
        );

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            retry,
            limiter,
        })
    }

    /// Look up `txid`, retrying transient failures on the configured schedule.
    ///
    /// Not-found and other client errors return immediately.
    pub async fn fetch_transaction(&self, txid: &str) -> Result<TxRecord, LookupError> {
        (|| self.fetch_once(txid))
            .retry(self.retry.backoff())
            .sleep(tokio::time::sleep)
            .when(LookupError::is_transient)
            .notify(|err: &LookupError, wait: Duration| {
                warn!("{}; retrying in {:?}", err, wait);
            })
            .await
    }

    /// A single lookup attempt.
    pub async fn fetch_once(&self, txid: &str) -> Result<TxRecord, LookupError> {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }

        let url = format!("{}/tx/{}", self.base_url, txid);
        let response = self.http.get(&url).send().await.map_err(|e| LookupError::Transient {
            txid: txid.to_string(),
            reason: e.to_string(),
        })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            debug!("Transaction {} not found on ledger", txid);
            return Err(LookupError::NotFound(txid.to_string()));
        }
        if status.is_server_error() {
            return Err(LookupError::Transient {
                txid: txid.to_string(),
                reason: format!("server error {}", status.as_u16()),
            });
        }
        if !status.is_success() {
            return Err(LookupError::Client {
                txid: txid.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(|e| LookupError::Transient {
            txid: txid.to_string(),
            reason: e.to_string(),
        })?;
        let tx: LedgerTx = serde_json::from_slice(&body).map_err(|e| LookupError::Decode {
            txid: txid.to_string(),
            reason: e.to_string(),
        })?;

        Ok(tx.into())
    }
}
