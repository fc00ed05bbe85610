use aeroclient::ClusterClient;
use aeroclient::config::ClientConfig;
use aeroclient::error::{ClientError, ErrorCode, ServerErrorKind};
use aeroclient::record::{BinValue, Key, bins};
use aeroclient::transport::memory::{MemoryCluster, MemoryClusterConfig, UdfFunction};
use aeroclient::udf::{RegistrationState, content_hash};
use std::sync::Arc;
use std::time::{Duration, Instant};

const MODULE_SOURCE: &str = "function count(s) return s : map(function() return 1 end) end";

async fn connect(propagation: Duration) -> (Arc<MemoryCluster>, ClusterClient) {
    let cluster = Arc::new(MemoryCluster::new(MemoryClusterConfig {
        module_propagation: propagation,
        ..MemoryClusterConfig::default()
    }));
    let client = ClusterClient::connect(ClientConfig::development(), cluster.clone())
        .await
        .expect("connect");
    (cluster, client)
}

#[tokio::test]
async fn upload_from_file_then_wait_list_and_remove() {
    let (_cluster, client) = connect(Duration::from_millis(5)).await;
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("count.lua");
    std::fs::write(&path, MODULE_SOURCE).expect("write module");

    let uploaded = client.udf().put(&path).await.expect("put");
    assert_eq!(uploaded.filename, "count.lua");
    assert_eq!(uploaded.state, RegistrationState::Uploading);
    assert_eq!(uploaded.content_hash, content_hash(MODULE_SOURCE.as_bytes()));

    let active = client
        .udf()
        .wait("count.lua", Duration::from_secs(2))
        .await
        .expect("active");
    assert_eq!(active.state, RegistrationState::Active);
    assert_eq!(active.content_hash, uploaded.content_hash);

    let names = client.udf().list().await.expect("list");
    assert!(names.contains("count.lua"));
    assert_eq!(
        client.udf().get("count.lua").await.expect("get").state,
        RegistrationState::Active
    );

    client.udf().remove("count.lua").await.expect("remove");
    assert!(!client.udf().list().await.expect("list").contains("count.lua"));
    let err = client.udf().get("count.lua").await.expect_err("gone");
    assert!(matches!(
        err,
        ClientError::Server {
            kind: ServerErrorKind::ModuleNotFound,
            ..
        }
    ));
}

#[tokio::test]
async fn wait_times_out_when_a_node_never_loads() {
    let (cluster, client) = connect(Duration::from_millis(5)).await;
    cluster.stall_node(cluster.node_count() - 1, true);
    client
        .udf()
        .put_bytes("stuck.lua", MODULE_SOURCE.as_bytes().to_vec())
        .await
        .expect("put");

    let started = Instant::now();
    let err = client
        .udf()
        .wait("stuck.lua", Duration::from_millis(150))
        .await
        .expect_err("never active");
    let elapsed = started.elapsed();
    assert_eq!(err.code(), ErrorCode::Timeout);
    assert!(elapsed >= Duration::from_millis(150));
    assert!(elapsed < Duration::from_secs(2), "took {elapsed:?}");

    let listed = client.udf().get("stuck.lua").await.expect("still listed");
    assert_eq!(listed.state, RegistrationState::Uploading);

    cluster.stall_node(cluster.node_count() - 1, false);
    client
        .udf()
        .wait("stuck.lua", Duration::from_secs(2))
        .await
        .expect("active once the node recovers");
}

#[tokio::test]
async fn apply_before_activation_is_rejected() {
    let (cluster, client) = connect(Duration::from_millis(200)).await;
    client
        .put(
            &Key::new("test", "demo", 1),
            bins([("number", BinValue::Integer(1))]),
        )
        .await
        .expect("seed");
    cluster.register_function(
        "count.lua",
        "count",
        UdfFunction::aggregate(|records, _| BinValue::Integer(records.len() as i64)),
    );
    client
        .udf()
        .put_bytes("count.lua", MODULE_SOURCE.as_bytes().to_vec())
        .await
        .expect("put");

    let err = client
        .scan("test", "demo")
        .apply("count.lua", "count", Vec::new())
        .exec()
        .await
        .expect_err("not active yet");
    assert!(matches!(
        err,
        ClientError::Server {
            kind: ServerErrorKind::ModuleNotActive,
            ..
        }
    ));

    client
        .udf()
        .wait("count.lua", Duration::from_secs(3))
        .await
        .expect("active");
    let values = client
        .scan("test", "demo")
        .apply("count.lua", "count", Vec::new())
        .exec()
        .await
        .expect("exec")
        .into_rows()
        .expect("rows")
        .values();
    assert_eq!(values, vec![BinValue::Integer(1)]);
}

#[tokio::test]
async fn reupload_restarts_propagation() {
    let (_cluster, client) = connect(Duration::from_millis(100)).await;
    client
        .udf()
        .put_bytes("count.lua", MODULE_SOURCE.as_bytes().to_vec())
        .await
        .expect("put");
    client
        .udf()
        .wait("count.lua", Duration::from_secs(3))
        .await
        .expect("active");

    let replaced = client
        .udf()
        .put_bytes("count.lua", b"function count(s) return 0 end".to_vec())
        .await
        .expect("re-upload");
    assert_eq!(replaced.state, RegistrationState::Uploading);
    let listed = client.udf().get("count.lua").await.expect("get");
    assert_eq!(listed.state, RegistrationState::Uploading);
    assert_eq!(listed.content_hash, replaced.content_hash);
}

#[tokio::test]
async fn malformed_uploads_are_rejected() {
    let (_cluster, client) = connect(Duration::from_millis(5)).await;
    let limit = client.config().max_udf_module_bytes;

    let err = client
        .udf()
        .put_bytes("big.lua", vec![b'-'; limit + 1])
        .await
        .expect_err("too large");
    assert_eq!(err.code(), ErrorCode::InvalidArgument);

    let err = client
        .udf()
        .put_bytes("empty.lua", Vec::new())
        .await
        .expect_err("empty");
    assert_eq!(err.code(), ErrorCode::InvalidArgument);

    let err = client
        .udf()
        .put("/definitely/not/here.lua")
        .await
        .expect_err("missing file");
    assert_eq!(err.code(), ErrorCode::Io);

    let err = client.udf().remove("nope.lua").await.expect_err("missing");
    assert_eq!(err.code(), ErrorCode::ServerError);
    assert!(client.udf().list().await.expect("list").is_empty());
}
