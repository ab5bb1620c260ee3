#[cfg(test)]
mod tests {
    use crate::api::create_router;
    use crate::config::{Config, CorruptMasterPolicy};
    use crate::db::{connection, graph};
    use crate::pipeline::{run_backfill, BackfillError};
    use crate::state::AppState;
    use crate::store::MasterStore;
    use crate::supervisor::{Supervisor, WorkerCommand};
    use crate::tests::fixtures::{confirmed, unconfirmed};
    use axum::{
        body::Body,
        http::{Request, StatusCode},
        Router,
    };
    use serde_json::{json, Value};
    use sqlx::SqlitePool;
    use std::path::Path;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::sync::Mutex;
    use tower::util::ServiceExt;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const BLOCK_HASH: &str = "0000000000000000000311aa";

    fn test_config(dir: &Path, ledger_url: &str) -> Config {
        Config {
            database_url: "sqlite::memory:".to_string(),
            server_host: "127.0.0.1".to_string(),
            server_port: 0,
            feed_ws_url: "ws://127.0.0.1:1".to_string(),
            feed_subscribe_op: "unconfirmed_sub".to_string(),
            ledger_api_url: ledger_url.to_string(),
            master_path: dir.join("master.json"),
            staging_path: dir.join("staging.jsonl"),
            tracking_path: dir.join("listener.pid.json"),
            listener_log_path: dir.join("listener.log"),
            lookup_concurrency: 4,
            lookup_chunk_size: 10,
            lookup_max_retries: 0,
            lookup_backoff: Duration::from_millis(10),
            lookup_timeout_secs: 5,
            lookup_rate_limit: None,
            cache_ttl: Duration::from_secs(60),
            cache_max_capacity: 100,
            upsert_batch_size: 10,
            stop_grace_period: Duration::from_secs(1),
            master_on_corrupt: CorruptMasterPolicy::Fail,
        }
    }

    async fn mock_confirmation(server: &MockServer, txid: &str, height: i64) {
        Mock::given(method("GET"))
            .and(path(format!("/tx/{}", txid)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "txid": txid,
                "status": {
                    "confirmed": true,
                    "block_height": height,
                    "block_hash": BLOCK_HASH,
                    "block_time": 1_731_000_000
                },
                "vin": [{ "prevout": { "scriptpubkey_address": "bc1qsender", "value": 1000 } }],
                "vout": [{ "scriptpubkey_address": "bc1qreceiver", "value": 900 }]
            })))
            .expect(1)
            .mount(server)
            .await;
    }

    /// Master store with one pending and one settled transaction.
    async fn seed_master(config: &Config) {
        let master = MasterStore::new(&config.master_path, config.master_on_corrupt);
        master
            .rewrite(&[unconfirmed("pending"), confirmed("settled", 870_000)])
            .await
            .unwrap();
    }

    async fn setup() -> (TempDir, MockServer, Config, SqlitePool) {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let server = MockServer::start().await;
        let config = test_config(dir.path(), &server.uri());
        let pool = connection::in_memory().await.expect("Failed to open graph store");
        (dir, server, config, pool)
    }

    fn app(config: Config, pool: SqlitePool) -> Router {
        let supervisor = Supervisor::new(
            WorkerCommand::new("sleep", &["30"]),
            &config.tracking_path,
            &config.listener_log_path,
            config.stop_grace_period,
            crate::store::StagingLog::new(&config.staging_path),
            MasterStore::new(&config.master_path, config.master_on_corrupt),
        );

        create_router(Arc::new(AppState {
            config,
            db_pool: pool,
            supervisor: Arc::new(Mutex::new(supervisor)),
        }))
    }

    fn request(method: &str, uri: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    async fn body_json(body: Body) -> Value {
        let bytes = axum::body::to_bytes(body, usize::MAX)
            .await
            .expect("Should read body");
        serde_json::from_slice(&bytes).expect("Should parse JSON")
    }

    #[tokio::test]
    async fn test_backfill_confirms_and_materializes_everything() {
        let (_dir, server, config, pool) = setup().await;
        mock_confirmation(&server, "pending", 870_500).await;
        seed_master(&config).await;

        let report = run_backfill(&config, &pool).await.unwrap();

        assert_eq!(report.updated, 1);
        assert_eq!(report.unconfirmed_before, 1);
        assert_eq!(report.upsert.total, 2);
        assert_eq!(report.upsert.upserted, 2);
        assert_eq!(report.upsert.failed, 0);

        assert_eq!(report.graph.transactions, 2);
        assert_eq!(report.graph.blocks, 2);
        assert_eq!(report.graph.included_in, 2);
        assert_eq!(
            graph::block_of(&pool, "pending").await.unwrap(),
            Some((870_500, Some(BLOCK_HASH.to_string())))
        );

        let master = MasterStore::new(&config.master_path, config.master_on_corrupt);
        let stored = master.load().await.unwrap();
        assert_eq!(stored[0].txid, "pending");
        assert!(stored[0].status.confirmed);
    }

    #[tokio::test]
    async fn test_backfill_repairs_graph_without_updates() {
        let (_dir, _server, config, pool) = setup().await;
        MasterStore::new(&config.master_path, config.master_on_corrupt)
            .rewrite(&[confirmed("a", 1), confirmed("b", 2)])
            .await
            .unwrap();

        let report = run_backfill(&config, &pool).await.unwrap();

        assert_eq!(report.updated, 0);
        assert_eq!(report.upsert.upserted, 2);
        assert_eq!(graph::graph_stats(&pool).await.unwrap().transactions, 2);
    }

    #[tokio::test]
    async fn test_backfill_rejects_corrupt_master() {
        let (_dir, _server, config, pool) = setup().await;
        std::fs::write(&config.master_path, "[{\"txid\":").unwrap();

        let result = run_backfill(&config, &pool).await;

        assert!(matches!(result, Err(BackfillError::Reconcile(_))));
        assert_eq!(graph::graph_stats(&pool).await.unwrap().transactions, 0);
    }

    #[tokio::test]
    async fn test_reconcile_route_runs_backfill() {
        let (_dir, server, config, pool) = setup().await;
        mock_confirmation(&server, "pending", 870_500).await;
        seed_master(&config).await;
        let app = app(config, pool.clone());

        let response = app.oneshot(request("POST", "/reconcile")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response.into_body()).await;
        assert_eq!(body["data"]["updated"], 1);
        assert_eq!(body["data"]["upsert"]["upserted"], 2);
        assert_eq!(graph::graph_stats(&pool).await.unwrap().included_in, 2);
    }

    #[tokio::test]
    async fn test_reconcile_route_reports_corrupt_master_as_conflict() {
        let (_dir, _server, config, pool) = setup().await;
        std::fs::write(&config.master_path, "not json").unwrap();
        let app = app(config, pool);

        let response = app.oneshot(request("POST", "/reconcile")).await.unwrap();

        assert_eq!(response.status(), StatusCode::CONFLICT);
        let body = body_json(response.into_body()).await;
        assert!(body["error"].as_str().unwrap().contains("unreadable"));
    }

    #[tokio::test]
    async fn test_status_route_without_worker() {
        let (_dir, _server, config, pool) = setup().await;
        let app = app(config, pool);

        let response = app.oneshot(request("GET", "/ingestion/status")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response.into_body()).await;
        assert_eq!(body["data"], json!({ "state": "stopped", "worker": null }));
    }

    #[tokio::test]
    async fn test_graph_stats_route() {
        let (_dir, _server, config, pool) = setup().await;
        crate::db::materialize::upsert_transaction(&pool, &confirmed("x", 7)).await.unwrap();
        let app = app(config, pool);

        let response = app.oneshot(request("GET", "/graph/stats")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response.into_body()).await;
        assert_eq!(body["data"]["transactions"], 1);
        assert_eq!(body["data"]["wallets"], 2);
        assert_eq!(body["data"]["included_in"], 1);
    }
}
