use aeroclient::ClusterClient;
use aeroclient::command::BatchOutcome;
use aeroclient::config::ClientConfig;
use aeroclient::error::ErrorCode;
use aeroclient::record::{BinValue, Key, bins};
use aeroclient::transport::memory::MemoryCluster;
use std::sync::Arc;

async fn seeded(keys: &[Key]) -> (Arc<MemoryCluster>, ClusterClient) {
    let cluster = Arc::new(MemoryCluster::default());
    let client = ClusterClient::connect(ClientConfig::development(), cluster.clone())
        .await
        .expect("connect");
    for (i, key) in keys.iter().enumerate() {
        client
            .put(
                key,
                bins([
                    ("number", BinValue::Integer(i as i64)),
                    ("name", BinValue::from(format!("user-{i}"))),
                ]),
            )
            .await
            .expect("seed");
    }
    (cluster, client)
}

#[tokio::test]
async fn exists_reports_found_and_missing_in_input_order() {
    let present = [Key::new("test", "demo", 1), Key::new("test", "demo", 2)];
    let (_cluster, client) = seeded(&present).await;

    let keys = vec![
        Key::new("test", "demo", 1),
        Key::new("test", "demo", 100),
        Key::new("test", "demo", 2),
        Key::new("test", "demo", 200),
    ];
    let result = client.batch_exists(&keys).await.expect("batch exists");

    assert_eq!(result.len(), keys.len());
    assert_eq!(result.found_count(), 2);
    assert_eq!(result.not_found_count(), 2);
    let pattern: Vec<bool> = result.iter().map(|e| e.is_found()).collect();
    assert_eq!(pattern, vec![true, false, true, false]);
    for (entry, key) in result.iter().zip(&keys) {
        assert_eq!(&entry.key, key);
        if let Some(record) = entry.record() {
            assert!(record.is_header_only());
            assert_eq!(record.generation, 1);
        }
    }
}

#[tokio::test]
async fn get_applies_projection_and_ignores_unknown_bins() {
    let keys: Vec<Key> = (0..4).map(|i| Key::new("test", "demo", i)).collect();
    let (_cluster, client) = seeded(&keys).await;

    let all = client.batch_get(&keys, None).await.expect("all bins");
    for entry in &all {
        assert_eq!(entry.record().expect("found").bins.len(), 2);
    }

    let empty_projection = client.batch_get(&keys, Some(&[])).await.expect("empty projection");
    assert_eq!(empty_projection.entries()[0].record().expect("found").bins.len(), 2);

    let projected = client
        .batch_get(&keys, Some(&["number", "no_such_bin"]))
        .await
        .expect("projected");
    for (i, entry) in projected.iter().enumerate() {
        let record = entry.record().expect("found");
        assert_eq!(record.bins.len(), 1);
        assert_eq!(record.bin("number"), Some(&BinValue::Integer(i as i64)));
        assert!(record.bin("no_such_bin").is_none());
    }
}

#[tokio::test]
async fn unreachable_node_only_affects_its_keys() {
    let keys: Vec<Key> = (0..32).map(|i| Key::new("test", "demo", i)).collect();
    let (cluster, client) = seeded(&keys).await;
    let down = cluster.node_for(&keys[0]);
    cluster.set_node_online(down, false);

    let result = client.batch_get(&keys, None).await.expect("batch survives");
    assert_eq!(result.len(), keys.len());
    for (entry, key) in result.iter().zip(&keys) {
        assert_eq!(&entry.key, key);
        if cluster.node_for(key) == down {
            let err = entry.error().expect("per-key error");
            assert_eq!(err.code(), ErrorCode::TransportError);
        } else {
            assert!(entry.is_found(), "key {key} should be readable");
        }
    }
    assert!(result.error_count() >= 1);
    assert!(matches!(result.entries()[0].outcome, BatchOutcome::Error(_)));
}

#[tokio::test]
async fn client_level_faults_fail_whole_call() {
    let (_cluster, client) = seeded(&[]).await;

    let empty = client.batch_get(&[], None).await.expect("empty batch");
    assert!(empty.is_empty());

    let bad = vec![Key::new("test", "demo", 1), Key::new("", "demo", 2)];
    let err = client.batch_exists(&bad).await.expect_err("malformed key");
    assert_eq!(err.code(), ErrorCode::InvalidArgument);

    let too_many: Vec<Key> = (0..5_001).map(|i| Key::new("test", "demo", i)).collect();
    let err = client.batch_exists(&too_many).await.expect_err("over limit");
    assert_eq!(err.code(), ErrorCode::InvalidArgument);

    client.close().await.expect("close");
    let err = client
        .batch_exists(&[Key::new("test", "demo", 1)])
        .await
        .expect_err("closed");
    assert_eq!(err.code(), ErrorCode::Closed);
}
