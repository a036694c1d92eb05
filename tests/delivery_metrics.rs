use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use metrics_util::debugging::{DebugValue, DebuggingRecorder};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use voicegen::application::delivery::{DeliveryError, DeliveryWorker, LimitedAttempts};
use voicegen::application::jobs::work_queue;
use voicegen::config::DeliverySettings;
use voicegen::domain::job_id::JobId;
use voicegen::domain::types::Job;
use voicegen::infra::transport::TcpConnector;
use voicegen_api_types::GenerationInput;

fn job(name: &str) -> Job {
    Job::new(
        JobId::derive(name, "000000000000"),
        GenerationInput {
            message: name.to_string(),
            use_ssml: false,
            voice_id: "pda".to_string(),
        },
    )
    .expect("job")
}

#[tokio::test]
async fn delivery_paths_emit_expected_metric_keys() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");

    // Renderer answers the first job, then hangs up on the second.
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        let (socket, _) = listener.accept().await.expect("accept");
        let (read, mut write) = socket.into_split();
        let mut lines = BufReader::new(read).lines();
        lines.next_line().await.expect("read").expect("line");
        write.write_all(b"ok\n").await.expect("reply");
        lines.next_line().await.expect("read").expect("line");
        drop(listener);
    });

    let settings = DeliverySettings {
        endpoint: addr.to_string(),
        retry_delay: Duration::ZERO,
        connect_timeout: Duration::from_secs(1),
        response_timeout: Duration::from_secs(1),
        max_response_bytes: NonZeroUsize::new(64).expect("non-zero"),
    };

    let (queue, jobs) = work_queue();
    queue.enqueue(job("delivered"));
    queue.enqueue(job("stranded"));

    let worker = DeliveryWorker::new(
        TcpConnector::new(&settings),
        Arc::new(LimitedAttempts::new(Duration::ZERO, 3)),
        &queue,
        jobs,
    );
    let result = tokio::time::timeout(Duration::from_secs(5), worker.run())
        .await
        .expect("worker should give up in time");
    assert!(matches!(result, Err(DeliveryError::RetriesExhausted { .. })));
    assert_eq!(queue.depth(), 1, "undelivered job stays queued");

    let snapshot = snapshotter.snapshot().into_vec();
    let names: HashSet<String> = snapshot
        .iter()
        .map(|(composite_key, _, _, _)| composite_key.key().name().to_string())
        .collect();

    let expected = [
        "voicegen_queue_depth",
        "voicegen_delivery_attempts_total",
        "voicegen_delivery_failures_total",
        "voicegen_jobs_requeued_total",
        "voicegen_connect_failures_total",
        "voicegen_delivery_ms",
    ];

    for metric in expected {
        assert!(names.contains(metric), "missing metric: {metric}");
    }

    let requeued = snapshot
        .iter()
        .find(|(key, _, _, _)| key.key().name() == "voicegen_jobs_requeued_total")
        .map(|(_, _, _, value)| value.clone());
    assert!(matches!(requeued, Some(DebugValue::Counter(n)) if *n >= 1));
}
