use aeroclient::ClusterClient;
use aeroclient::config::ClientConfig;
use aeroclient::error::{ClientError, ErrorCode};
use aeroclient::job::{Job, JobKind, JobStatus};
use aeroclient::record::{BinValue, Key, bins};
use aeroclient::transport::memory::{MemoryCluster, MemoryClusterConfig, UdfFunction};
use std::sync::Arc;
use std::time::Duration;

const NS: &str = "test";
const SET: &str = "jobs";

async fn cluster_with_transform(
    config: MemoryClusterConfig,
) -> (Arc<MemoryCluster>, ClusterClient) {
    let cluster = Arc::new(MemoryCluster::new(config));
    let client = ClusterClient::connect(ClientConfig::development(), cluster.clone())
        .await
        .expect("connect");
    for i in 0..10_i64 {
        client
            .put(&Key::new(NS, SET, i), bins([("number", BinValue::Integer(i))]))
            .await
            .expect("seed");
    }
    cluster.register_function(
        "scale.lua",
        "scale",
        UdfFunction::transform(|record_bins, args| {
            let factor = args.first().and_then(BinValue::as_i64).unwrap_or(1);
            if let Some(n) = record_bins.get("number").and_then(BinValue::as_i64) {
                record_bins.insert("number".to_string(), BinValue::Integer(n * factor));
            }
        }),
    );
    client
        .udf()
        .put_bytes("scale.lua", b"function scale(rec, f) end".to_vec())
        .await
        .expect("upload");
    client
        .udf()
        .wait("scale.lua", Duration::from_secs(2))
        .await
        .expect("module active");
    (cluster, client)
}

fn fast_cluster() -> MemoryClusterConfig {
    MemoryClusterConfig {
        module_propagation: Duration::from_millis(5),
        ..MemoryClusterConfig::default()
    }
}

async fn submit_scale(client: &ClusterClient) -> Job {
    client
        .scan(NS, SET)
        .apply("scale.lua", "scale", vec![BinValue::Integer(10)])
        .set_background(true)
        .exec()
        .await
        .expect("submit")
        .into_job()
        .expect("job handle")
}

#[tokio::test]
async fn status_moves_forward_until_completed() {
    let (_cluster, client) = cluster_with_transform(fast_cluster()).await;
    let job = submit_scale(&client).await;
    assert_eq!(job.kind, JobKind::Scan);

    let jobs = client.jobs();
    assert_eq!(
        jobs.last_observed(&job.id).expect("tracked").status,
        JobStatus::Pending
    );

    let err = jobs.poll(&job.id).await.expect_err("not indexed yet");
    assert_eq!(err.code(), ErrorCode::JobNotFound);
    assert!(err.is_retryable());

    let pending = jobs.poll(&job.id).await.expect("visible");
    assert_eq!(pending.status, JobStatus::Pending);

    let running = jobs.poll(&job.id).await.expect("running");
    assert_eq!(running.status, JobStatus::InProgress);
    assert_eq!(running.progress_percent, 50);
    assert_eq!(running.records_scanned, 5);

    let done = jobs.poll(&job.id).await.expect("done");
    assert_eq!(done.status, JobStatus::Completed);
    assert_eq!(done.progress_percent, 100);
    assert_eq!(done.records_scanned, 10);

    let again = jobs.poll(&job.id).await.expect("terminal is sticky");
    assert_eq!(again, done);

    let record = client.get(&Key::new(NS, SET, 3), None).await.expect("get");
    assert_eq!(record.bin("number"), Some(&BinValue::Integer(30)));
    assert_eq!(record.generation, 2);
}

#[tokio::test]
async fn backwards_status_is_reported_as_regression() {
    let (cluster, client) = cluster_with_transform(fast_cluster()).await;
    let job = submit_scale(&client).await;
    let jobs = client.jobs();

    let _ = jobs.poll(&job.id).await;
    jobs.poll(&job.id).await.expect("pending");
    let running = jobs.poll(&job.id).await.expect("running");
    assert_eq!(running.status, JobStatus::InProgress);

    assert!(cluster.set_job_status(&job.id, JobStatus::Pending, 10));
    let err = jobs.poll(&job.id).await.expect_err("regression");
    assert!(matches!(
        err,
        ClientError::JobStateRegression {
            from: JobStatus::InProgress,
            to: JobStatus::Pending,
            ..
        }
    ));

    let last = jobs.last_observed(&job.id).expect("tracked");
    assert_eq!(last.status, JobStatus::InProgress);
    assert_eq!(last.progress_percent, 50);
}

#[tokio::test]
async fn wait_for_completion_tolerates_late_visibility() {
    let (_cluster, client) = cluster_with_transform(MemoryClusterConfig {
        job_visibility_polls: 3,
        job_progress_step: 25,
        ..fast_cluster()
    })
    .await;
    let job = submit_scale(&client).await;

    let info = client
        .jobs()
        .wait(&job.id, Duration::from_secs(5))
        .await
        .expect("completes");
    assert_eq!(info.status, JobStatus::Completed);
    assert_eq!(info.progress_percent, 100);

    let record = client.get(&Key::new(NS, SET, 9), None).await.expect("get");
    assert_eq!(record.bin("number"), Some(&BinValue::Integer(90)));
}

#[tokio::test]
async fn failed_job_is_a_terminal_snapshot() {
    let (cluster, client) = cluster_with_transform(fast_cluster()).await;
    let job = submit_scale(&client).await;
    assert!(cluster.fail_job(&job.id));

    let info = client
        .jobs()
        .wait_for_completion(&job.id, Duration::from_millis(5), Duration::from_secs(2))
        .await
        .expect("terminal");
    assert_eq!(info.status, JobStatus::Failed);
    assert!(info.is_terminal());

    let record = client.get(&Key::new(NS, SET, 4), None).await.expect("get");
    assert_eq!(record.bin("number"), Some(&BinValue::Integer(4)));
}

#[tokio::test]
async fn job_never_visible_fails_after_grace() {
    let (_cluster, client) = cluster_with_transform(MemoryClusterConfig {
        job_visibility_polls: u32::MAX,
        ..fast_cluster()
    })
    .await;
    let job = submit_scale(&client).await;

    let started = std::time::Instant::now();
    let err = client
        .jobs()
        .wait(&job.id, Duration::from_secs(10))
        .await
        .expect_err("never visible");
    assert_eq!(err.code(), ErrorCode::JobNotFound);
    assert!(started.elapsed() >= client.config().job_not_found_grace());
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[tokio::test]
async fn background_requires_a_record_udf() {
    let (_cluster, client) = cluster_with_transform(fast_cluster()).await;
    let err = client
        .scan(NS, SET)
        .set_background(true)
        .exec()
        .await
        .expect_err("no udf");
    assert_eq!(err.code(), ErrorCode::InvalidArgument);

    let err = client
        .scan(NS, SET)
        .apply("missing.lua", "scale", Vec::new())
        .set_background(true)
        .exec()
        .await
        .expect_err("unknown module");
    assert_eq!(err.code(), ErrorCode::ServerError);

    let forgotten = submit_scale(&client).await;
    assert!(client.jobs().forget(&forgotten.id).is_some());
    assert!(client.jobs().last_observed(&forgotten.id).is_none());
}

#[tokio::test]
async fn finished_jobs_beyond_retention_are_forgotten() {
    let (cluster, client) = cluster_with_transform(MemoryClusterConfig {
        finished_job_retention: 1,
        ..fast_cluster()
    })
    .await;
    let first = submit_scale(&client).await;
    let second = submit_scale(&client).await;
    assert!(cluster.fail_job(&first.id));
    assert!(cluster.fail_job(&second.id));

    let err = client.jobs().poll(&first.id).await.expect_err("expired");
    assert_eq!(err.code(), ErrorCode::JobNotFound);

    let info = client
        .jobs()
        .wait(&second.id, Duration::from_secs(2))
        .await
        .expect("kept");
    assert_eq!(info.status, JobStatus::Failed);
}

#[tokio::test]
async fn client_keeps_a_bounded_number_of_finished_snapshots() {
    let cluster = Arc::new(MemoryCluster::new(fast_cluster()));
    let config = ClientConfig {
        max_finished_jobs: 1,
        ..ClientConfig::development()
    };
    let client = ClusterClient::connect(config, cluster.clone())
        .await
        .expect("connect");
    cluster.register_function("scale.lua", "scale", UdfFunction::transform(|_, _| {}));
    client
        .udf()
        .put_bytes("scale.lua", b"function scale(rec) end".to_vec())
        .await
        .expect("upload");
    client
        .udf()
        .wait("scale.lua", Duration::from_secs(2))
        .await
        .expect("module active");

    let first = submit_scale(&client).await;
    let second = submit_scale(&client).await;
    let jobs = client.jobs();
    for job in [&first, &second] {
        let info = jobs.wait(&job.id, Duration::from_secs(2)).await.expect("done");
        assert_eq!(info.status, JobStatus::Completed);
    }

    assert!(jobs.last_observed(&first.id).is_none());
    assert_eq!(
        jobs.last_observed(&second.id).map(|info| info.status),
        Some(JobStatus::Completed)
    );
}
