#[cfg(test)]
mod tests {
    use crate::blockchain::client::{LedgerClient, LookupError, RetryPolicy};
    use crate::blockchain::reconciler::{reconcile, ReconcileOptions};
    use crate::cache::LookupCache;
    use crate::config::CorruptMasterPolicy;
    use crate::models::TxRecord;
    use crate::store::MasterStore;
    use crate::tests::fixtures::{confirmed, unconfirmed};
    use serde_json::{json, Value};
    use std::time::Duration;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const FAST_BACKOFF: Duration = Duration::from_millis(10);

    fn client(server: &MockServer, max_retries: usize) -> LedgerClient {
        LedgerClient::with_settings(
            &server.uri(),
            Duration::from_secs(5),
            RetryPolicy::new(max_retries, FAST_BACKOFF),
            None,
        )
        .expect("Failed to build ledger client")
    }

    fn cache() -> LookupCache {
        LookupCache::new(1024, Duration::from_secs(60))
    }

    async fn master_with(records: &[TxRecord]) -> (TempDir, MasterStore) {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let master = MasterStore::new(dir.path().join("master.json"), CorruptMasterPolicy::Fail);
        master.rewrite(records).await.unwrap();
        (dir, master)
    }

    /// A ledger response in the provider's layout, with fields we do not keep.
    fn ledger_tx(txid: &str, confirmed: bool) -> Value {
        let status = if confirmed {
            json!({
                "confirmed": true,
                "block_height": 870_123,
                "block_hash": "00000000000000000001a2b3",
                "block_time": 1_730_000_000
            })
        } else {
            json!({ "confirmed": false })
        };

        json!({
            "txid": txid,
            "version": 2,
            "locktime": 0,
            "size": 222,
            "weight": 561,
            "fee": 100,
            "status": status,
            "vin": [
                {
                    "txid": "prev",
                    "vout": 0,
                    "is_coinbase": false,
                    "prevout": {
                        "scriptpubkey": "0014abcd",
                        "scriptpubkey_type": "v0_p2wpkh",
                        "scriptpubkey_address": "bc1qsender",
                        "value": 1000
                    }
                }
            ],
            "vout": [
                {
                    "scriptpubkey": "0014ef01",
                    "scriptpubkey_address": "bc1qreceiver",
                    "value": 900
                }
            ]
        })
    }

    async fn mock_tx(server: &MockServer, txid: &str, confirmed: bool, expected_calls: u64) {
        Mock::given(method("GET"))
            .and(path(format!("/tx/{}", txid)))
            .respond_with(ResponseTemplate::new(200).set_body_json(ledger_tx(txid, confirmed)))
            .expect(expected_calls)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_confirmed_record_replaced_in_place() {
        let server = MockServer::start().await;
        mock_tx(&server, "c3", true, 1).await;

        let mut records: Vec<TxRecord> = (0..10).map(|i| confirmed(&format!("tx{}", i), i)).collect();
        records[5] = unconfirmed("c3");
        let (_dir, master) = master_with(&records).await;

        let summary = reconcile(&master, &client(&server, 2), &cache(), ReconcileOptions::default())
            .await
            .unwrap();

        assert_eq!(summary.updated, 1);
        assert_eq!(summary.unconfirmed_before, 1);

        let stored = master.load().await.unwrap();
        assert_eq!(stored.len(), 10);
        assert_eq!(stored[5].txid, "c3");
        assert!(stored[5].status.confirmed);
        assert_eq!(stored[5].status.block_height, Some(870_123));
        for (index, record) in stored.iter().enumerate().filter(|(i, _)| *i != 5) {
            assert_eq!(record, &records[index]);
        }
        assert_eq!(summary.records, stored);
    }

    #[tokio::test]
    async fn test_order_independent_of_completion_order() {
        let server = MockServer::start().await;
        // Slowest lookup first so completions arrive out of order
        for (txid, delay_ms) in [("u0", 150), ("u1", 60), ("u2", 0)] {
            Mock::given(method("GET"))
                .and(path(format!("/tx/{}", txid)))
                .respond_with(
                    ResponseTemplate::new(200)
                        .set_body_json(ledger_tx(txid, true))
                        .set_delay(Duration::from_millis(delay_ms)),
                )
                .mount(&server)
                .await;
        }

        let records = vec![
            unconfirmed("u0"),
            confirmed("k1", 1),
            unconfirmed("u1"),
            confirmed("k2", 2),
            unconfirmed("u2"),
        ];
        let (_dir, master) = master_with(&records).await;
        let options = ReconcileOptions {
            concurrency: 3,
            chunk_size: 2,
        };

        let summary = reconcile(&master, &client(&server, 0), &cache(), options).await.unwrap();

        assert_eq!(summary.updated, 3);
        let stored = master.load().await.unwrap();
        let order: Vec<&str> = stored.iter().map(|r| r.txid.as_str()).collect();
        assert_eq!(order, vec!["u0", "k1", "u1", "k2", "u2"]);
        assert!(stored.iter().all(|r| r.status.confirmed));
    }

    #[tokio::test]
    async fn test_still_unconfirmed_leaves_store_untouched() {
        let server = MockServer::start().await;
        mock_tx(&server, "pending", false, 1).await;

        let (_dir, master) = master_with(&[unconfirmed("pending"), confirmed("done", 3)]).await;
        let before = std::fs::read(master.path()).unwrap();

        let summary = reconcile(&master, &client(&server, 2), &cache(), ReconcileOptions::default())
            .await
            .unwrap();

        assert_eq!(summary.updated, 0);
        assert_eq!(summary.unconfirmed_before, 1);
        assert_eq!(std::fs::read(master.path()).unwrap(), before);
    }

    #[tokio::test]
    async fn test_not_found_keeps_record_unconfirmed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tx/gone"))
            .respond_with(ResponseTemplate::new(404))
            .expect(2)
            .mount(&server)
            .await;

        let ledger = client(&server, 3);
        assert_eq!(
            ledger.fetch_transaction("gone").await,
            Err(LookupError::NotFound("gone".to_string()))
        );

        let (_dir, master) = master_with(&[unconfirmed("gone")]).await;
        let summary = reconcile(&master, &ledger, &cache(), ReconcileOptions::default())
            .await
            .unwrap();

        assert_eq!(summary.updated, 0);
        assert!(!summary.records[0].status.confirmed);
    }

    #[tokio::test]
    async fn test_server_errors_retried_up_to_limit() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tx/flaky"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&server)
            .await;

        let result = client(&server, 2).fetch_transaction("flaky").await;

        assert!(matches!(result, Err(LookupError::Transient { .. })));
    }

    #[tokio::test]
    async fn test_transient_failure_then_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tx/recovers"))
            .respond_with(ResponseTemplate::new(502))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        mock_tx(&server, "recovers", true, 1).await;

        let record = client(&server, 2).fetch_transaction("recovers").await.unwrap();

        assert!(record.status.confirmed);
        assert_eq!(record.vin[0].prevout.scriptpubkey_address.as_deref(), Some("bc1qsender"));
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tx/bad"))
            .respond_with(ResponseTemplate::new(400))
            .expect(1)
            .mount(&server)
            .await;

        let result = client(&server, 3).fetch_transaction("bad").await;

        assert_eq!(
            result,
            Err(LookupError::Client {
                txid: "bad".to_string(),
                status: 400
            })
        );
    }

    #[tokio::test]
    async fn test_cache_makes_one_round_trip_per_txid() {
        let server = MockServer::start().await;
        mock_tx(&server, "memo", true, 1).await;

        let ledger = client(&server, 0);
        let lookups = cache();

        let (first, second) = tokio::join!(
            lookups.get_or_fetch("memo", ledger.fetch_transaction("memo")),
            lookups.get_or_fetch("memo", ledger.fetch_transaction("memo")),
        );
        let third = lookups.get_or_fetch("memo", ledger.fetch_transaction("memo")).await;

        assert_eq!(first.unwrap().txid, "memo");
        assert_eq!(second.unwrap().txid, "memo");
        assert_eq!(third.unwrap().txid, "memo");
        assert_eq!(lookups.entry_count().await, 1);
    }

    #[tokio::test]
    async fn test_failed_lookups_are_not_cached() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tx/missing"))
            .respond_with(ResponseTemplate::new(404))
            .expect(2)
            .mount(&server)
            .await;

        let ledger = client(&server, 0);
        let lookups = cache();

        for _ in 0..2 {
            let result = lookups.get_or_fetch("missing", ledger.fetch_transaction("missing")).await;
            assert!(matches!(result, Err(LookupError::NotFound(_))));
        }
        assert!(lookups.get("missing").await.is_none());
    }

    #[tokio::test]
    async fn test_cache_capacity_is_bounded() {
        let lookups = LookupCache::new(2, Duration::from_secs(60));
        for i in 0..20 {
            let txid = format!("cap{}", i);
            let record = unconfirmed(&txid);
            lookups.get_or_fetch(&txid, async move { Ok(record) }).await.unwrap();
        }

        assert!(lookups.entry_count().await <= 2);
    }

    #[test]
    fn test_backoff_doubles_per_retry() {
        let policy = RetryPolicy::new(5, Duration::from_millis(100));

        assert_eq!(
            policy.delays(),
            vec![
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(400),
                Duration::from_millis(800),
                Duration::from_millis(1600),
            ]
        );
        assert!(policy.delays().windows(2).all(|pair| pair[0] <= pair[1]));
        assert_eq!(policy.delay_before_retry(1), policy.backoff_factor);
    }

    #[test]
    fn test_no_retries_means_empty_schedule() {
        assert!(RetryPolicy::new(0, Duration::from_secs(1)).delays().is_empty());
    }

    #[test]
    fn test_ledger_response_normalizes_coinbase_input() {
        let raw = json!({
            "txid": "coinbase",
            "status": { "confirmed": true, "block_height": 1, "block_hash": "h", "block_time": 2 },
            "vin": [{ "is_coinbase": true, "prevout": null }],
            "vout": [{ "scriptpubkey_address": "bc1qminer", "value": 625_000_000 }]
        });

        let tx: crate::blockchain::models::LedgerTx = serde_json::from_value(raw).unwrap();
        let record: TxRecord = tx.into();

        assert_eq!(record.vin.len(), 1);
        assert_eq!(record.vin[0].prevout.scriptpubkey_address, None);
        assert_eq!(record.vin[0].prevout.value, None);
        assert_eq!(record.senders().count(), 0);
        assert_eq!(record.receivers().collect::<Vec<_>>(), vec![("bc1qminer", 625_000_000)]);
    }
}
