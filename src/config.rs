// Configuration for the ingestion pipeline:
// - feed and ledger endpoints
// - file locations (master store, staging log, tracking record)
// - graph store connection string
// - reconciler pool, retry and cache settings
// - supervisor grace period

use dotenv::dotenv;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// What to do when the master store exists but cannot be parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorruptMasterPolicy {
    /// Surface the error and abort the run.
    Fail,
    /// Log a warning and continue with an empty store. The next rewrite discards the old content.
    TreatAsEmpty,
}

impl FromStr for CorruptMasterPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fail" => Ok(Self::Fail),
            "empty" => Ok(Self::TreatAsEmpty),
            other => Err(format!("unknown master store policy: {}", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub server_host: String,
    pub server_port: u16,
    pub feed_ws_url: String,
    pub feed_subscribe_op: String,
    pub ledger_api_url: String,
    pub master_path: PathBuf,
    pub staging_path: PathBuf,
    pub tracking_path: PathBuf,
    pub listener_log_path: PathBuf,
    pub lookup_concurrency: usize,
    pub lookup_chunk_size: usize,
    pub lookup_max_retries: usize,
    pub lookup_backoff: Duration,
    pub lookup_timeout_secs: u64,
    pub lookup_rate_limit: Option<u32>,
    pub cache_ttl: Duration,
    pub cache_max_capacity: u64,
    pub upsert_batch_size: usize,
    pub stop_grace_period: Duration,
    pub master_on_corrupt: CorruptMasterPolicy,
}

fn parse_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        let database_url = env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:graph.db".to_string());
        let server_host = env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let server_port = parse_or("SERVER_PORT", 8080);
        let feed_ws_url = env::var("FEED_WS_URL")
            .unwrap_or_else(|_| "wss://ws.blockchain.info/inv".to_string());
        let feed_subscribe_op = env::var("FEED_SUBSCRIBE_OP")
            .unwrap_or_else(|_| "unconfirmed_sub".to_string());
        let ledger_api_url = env::var("LEDGER_API_URL")
            .unwrap_or_else(|_| "https://blockstream.info/api".to_string());

        let master_path = env::var("MASTER_PATH")
            .unwrap_or_else(|_| "bitcoin_transactions_backup.json".to_string());
        let staging_path = env::var("STAGING_PATH")
            .unwrap_or_else(|_| "bitcoin_transactions_realtime_tmp.jsonl".to_string());
        let tracking_path = env::var("TRACKING_PATH")
            .unwrap_or_else(|_| ".realtime_ingestion_pid".to_string());
        let listener_log_path = env::var("LISTENER_LOG_PATH")
            .unwrap_or_else(|_| "listener.log".to_string());

        // A zero-sized pool or chunk would never make progress
        let lookup_concurrency = parse_or("LOOKUP_CONCURRENCY", 10usize).max(1);
        let lookup_chunk_size = parse_or("LOOKUP_CHUNK_SIZE", 100usize).max(1);
        let lookup_max_retries = parse_or("LOOKUP_MAX_RETRIES", 2usize);
        let lookup_backoff = Duration::from_millis(parse_or("LOOKUP_BACKOFF_MS", 1000u64));
        let lookup_timeout_secs = parse_or("LOOKUP_TIMEOUT_SECS", 10u64);
        let lookup_rate_limit = env::var("LOOKUP_RATE_LIMIT")
            .map(|v| v.parse().ok())
            .unwrap_or(None);

        let cache_ttl = Duration::from_secs(parse_or("CACHE_TTL", 3600u64));
        let cache_max_capacity = parse_or("CACHE_MAX_CAPACITY", 1024u64);
        let upsert_batch_size = parse_or("UPSERT_BATCH_SIZE", 100usize).max(1);
        let stop_grace_period = Duration::from_millis(parse_or("STOP_GRACE_MS", 1000u64));
        let master_on_corrupt = parse_or("MASTER_ON_CORRUPT", CorruptMasterPolicy::Fail);

        Self {
            database_url,
            server_host,
            server_port,
            feed_ws_url,
            feed_subscribe_op,
            ledger_api_url,
            master_path: PathBuf::from(master_path),
            staging_path: PathBuf::from(staging_path),
            tracking_path: PathBuf::from(tracking_path),
            listener_log_path: PathBuf::from(listener_log_path),
            lookup_concurrency,
            lookup_chunk_size,
            lookup_max_retries,
            lookup_backoff,
            lookup_timeout_secs,
            lookup_rate_limit,
            cache_ttl,
            cache_max_capacity,
            upsert_batch_size,
            stop_grace_period,
            master_on_corrupt,
        }
    }
}
