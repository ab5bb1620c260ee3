use crate::blockchain::models::{parse_feed_message, NormalizeError};
use crate::config::Config;
use crate::db::materialize;
use crate::models::TxRecord;
use crate::store::{StagingLog, StoreError};
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use sqlx::SqlitePool;
use thiserror::Error;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Error, Debug)]
pub enum FeedError {
    #[error(transparent)]
    Malformed(#[from] NormalizeError),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    #[error("Failed to stage transaction: {0}")]
    Staging(#[from] StoreError),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ListenerStats {
    pub received: usize,
    pub staged: usize,
    pub skipped: usize,
    pub live_upsert_failures: usize,
}

/// Outcome of one successfully staged message.
#[derive(Debug)]
pub struct Ingested {
    pub record: TxRecord,
    pub live_upserted: bool,
}

/// Holds one subscription to the push feed and stages every transaction it delivers.
///
/// There is no reconnect: when the connection ends, `run` returns and the
/// supervisor decides whether to launch a new worker.
pub struct FeedListener {
    url: String,
    subscribe_op: String,
    staging: StagingLog,
    graph: SqlitePool,
}

impl FeedListener {
    pub fn new(url: &str, subscribe_op: &str, staging: StagingLog, graph: SqlitePool) -> Self {
        Self {
            url: url.to_string(),
            subscribe_op: subscribe_op.to_string(),
            staging,
            graph,
        }
    }

    pub fn from_config(config: &Config, graph: SqlitePool) -> Self {
        Self::new(
            &config.feed_ws_url,
            &config.feed_subscribe_op,
            StagingLog::new(&config.staging_path),
            graph,
        )
    }

    pub async fn run(&self, shutdown: CancellationToken) -> Result<ListenerStats, FeedError> {
        info!("Connecting to feed {}", self.url);
        let (stream, _) = connect_async(self.url.as_str()).await?;
        let (mut write, mut read) = stream.split();

        let subscribe = serde_json::json!({ "op": self.subscribe_op }).to_string();
        write.send(Message::Text(subscribe)).await?;
        info!("Subscribed to unconfirmed transactions");

        let mut stats = ListenerStats::default();
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Shutting down feed listener");
                    let _ = write.send(Message::Close(None)).await;
                    break;
                }
                message = read.next() => {
                    let text = match message {
                        Some(Ok(Message::Text(text))) => text,
                        Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                            Ok(text) => text,
                            Err(_) => {
                                warn!("Skipping non UTF-8 binary feed message");
                                stats.received += 1;
                                stats.skipped += 1;
                                continue;
                            }
                        },
                        Some(Ok(Message::Close(frame))) => {
                            info!("Feed closed the connection: {:?}", frame);
                            break;
                        }
                        // Ping/pong are answered by tungstenite itself
                        Some(Ok(_)) => continue,
                        Some(Err(e)) => {
                            error!("WebSocket error: {}", e);
                            return Err(e.into());
                        }
                        None => {
                            info!("WebSocket closed");
                            break;
                        }
                    };

                    stats.received += 1;
                    match self.handle_message(&text).await {
                        Ok(ingested) => {
                            stats.staged += 1;
                            if !ingested.live_upserted {
                                stats.live_upsert_failures += 1;
                            }
                        }
                        Err(e) => {
                            warn!("Error processing message: {}", e);
                            stats.skipped += 1;
                        }
                    }
                }
            }
        }

        info!(
            "Feed listener stopped: {} received, {} staged, {} skipped",
            stats.received, stats.staged, stats.skipped
        );
        Ok(stats)
    }

    /// Normalize one message, append it to the staging log, then try a live graph upsert.
    ///
    /// The staging log is authoritative; a failed live upsert is only logged
    /// and the record reaches the graph on the next bulk materialization.
    pub async fn handle_message(&self, text: &str) -> Result<Ingested, FeedError> {
        let record = parse_feed_message(text)?;
        self.staging.append(&record).await?;

        let live_upserted = match materialize::upsert_transaction(&self.graph, &record).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Live graph upsert failed for {}: {}", record.txid, e);
                false
            }
        };

        debug!(
            "Ingested TX: {} | Confirmed: {}",
            record.txid, record.status.confirmed
        );
        Ok(Ingested {
            record,
            live_upserted,
        })
    }
}
