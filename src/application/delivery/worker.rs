use std::{sync::Arc, time::Instant};

use bytes::Bytes;
use metrics::{counter, histogram};
use thiserror::Error;
use time::OffsetDateTime;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::{
    application::jobs::{JobReceiver, WeakWorkQueue, WorkQueue},
    domain::types::Job,
};

use super::{
    retry::RetryPolicy,
    transport::{Connection, Connector, TransportError},
};

const SOURCE: &str = "voicegen::delivery::worker";

/// Whether the worker currently holds an open connection to the rendering
/// service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Disconnected,
    Connected,
}

impl WorkerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connected => "connected",
        }
    }
}

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("giving up after {failures} consecutive failures: {last}")]
    RetriesExhausted {
        failures: u32,
        #[source]
        last: TransportError,
    },
}

/// Sole consumer of the work queue. Holds at most one connection, delivers one
/// job at a time, and puts a job it failed to deliver back at the tail.
pub struct DeliveryWorker<C: Connector> {
    connector: C,
    retry: Arc<dyn RetryPolicy>,
    requeue: WeakWorkQueue,
    jobs: JobReceiver,
    state: watch::Sender<WorkerState>,
}

impl<C: Connector> DeliveryWorker<C> {
    pub fn new(
        connector: C,
        retry: Arc<dyn RetryPolicy>,
        queue: &WorkQueue,
        jobs: JobReceiver,
    ) -> Self {
        let (state, _) = watch::channel(WorkerState::Disconnected);
        Self {
            connector,
            retry,
            requeue: queue.downgrade(),
            jobs,
            state,
        }
    }

    /// Observe connection state changes.
    pub fn subscribe(&self) -> watch::Receiver<WorkerState> {
        self.state.subscribe()
    }

    /// Run until every producer handle is gone and the queue is drained, or
    /// until the retry policy gives up.
    pub async fn run(mut self) -> Result<(), DeliveryError> {
        let mut failures: u32 = 0;
        let mut connection: Option<C::Connection> = None;

        info!(
            target = SOURCE,
            endpoint = self.connector.endpoint(),
            "delivery worker started"
        );

        loop {
            let mut conn = match connection.take() {
                Some(conn) => conn,
                None => match self.connector.connect().await {
                    Ok(conn) => {
                        self.set_state(WorkerState::Connected);
                        info!(
                            target = SOURCE,
                            endpoint = self.connector.endpoint(),
                            "connected to rendering service"
                        );
                        conn
                    }
                    Err(err) => {
                        failures = failures.saturating_add(1);
                        counter!("voicegen_connect_failures_total").increment(1);
                        warn!(
                            target = SOURCE,
                            endpoint = self.connector.endpoint(),
                            failures,
                            error = %err,
                            "connect to rendering service failed"
                        );
                        self.pause(failures, err).await?;
                        continue;
                    }
                },
            };

            let Some(job) = self.jobs.dequeue().await else {
                self.set_state(WorkerState::Disconnected);
                info!(target = SOURCE, "work queue closed; delivery worker stopping");
                return Ok(());
            };

            match deliver(&mut conn, &job).await {
                Ok(ack) => {
                    failures = 0;
                    connection = Some(conn);
                    debug!(
                        target = SOURCE,
                        job_id = %job.id(),
                        queued_ms = (OffsetDateTime::now_utc() - job.enqueued_at())
                            .whole_milliseconds() as i64,
                        response = %String::from_utf8_lossy(&ack).trim_end(),
                        "job delivered"
                    );
                }
                Err(err) => {
                    drop(conn);
                    self.set_state(WorkerState::Disconnected);
                    failures = failures.saturating_add(1);
                    counter!("voicegen_delivery_failures_total").increment(1);
                    warn!(
                        target = SOURCE,
                        job_id = %job.id(),
                        failures,
                        error = %err,
                        "delivery failed; requeueing job"
                    );
                    self.requeue(job);
                    self.pause(failures, err).await?;
                }
            }
        }
    }

    fn requeue(&self, job: Job) {
        match self.requeue.upgrade() {
            Some(queue) => {
                counter!("voicegen_jobs_requeued_total").increment(1);
                queue.enqueue(job);
            }
            None => {
                counter!("voicegen_jobs_dropped_total").increment(1);
                warn!(
                    target = SOURCE,
                    job_id = %job.id(),
                    "no producers left; dropping undelivered job"
                );
            }
        }
    }

    async fn pause(&self, failures: u32, last: TransportError) -> Result<(), DeliveryError> {
        match self.retry.next_delay(failures) {
            Some(delay) if delay.is_zero() => {
                tokio::task::yield_now().await;
                Ok(())
            }
            Some(delay) => {
                tokio::time::sleep(delay).await;
                Ok(())
            }
            None => {
                self.set_state(WorkerState::Disconnected);
                Err(DeliveryError::RetriesExhausted { failures, last })
            }
        }
    }

    fn set_state(&self, next: WorkerState) {
        self.state.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });
    }
}

async fn deliver<T: Connection>(conn: &mut T, job: &Job) -> Result<Bytes, TransportError> {
    counter!("voicegen_delivery_attempts_total").increment(1);
    let started = Instant::now();

    conn.send(job.line()).await?;
    let ack = conn.receive().await?;

    histogram!("voicegen_delivery_ms").record(started.elapsed().as_secs_f64() * 1_000.0);
    Ok(ack)
}

#[cfg(test)]
mod tests {
    use std::{
        collections::VecDeque,
        io,
        sync::Mutex,
        time::Duration,
    };

    use async_trait::async_trait;
    use voicegen_api_types::GenerationInput;

    use super::*;
    use crate::{
        application::{
            delivery::{FixedDelay, LimitedAttempts},
            jobs::work_queue,
        },
        domain::job_id::JobId,
    };

    #[derive(Debug, Clone, Copy)]
    enum Reply {
        Ack,
        Reset,
    }

    #[derive(Default)]
    struct Script {
        connect_failures: usize,
        replies: VecDeque<Reply>,
        connects: usize,
        sent: Vec<Vec<u8>>,
        acked: Vec<String>,
    }

    #[derive(Clone, Default)]
    struct ScriptedConnector {
        script: Arc<Mutex<Script>>,
    }

    impl ScriptedConnector {
        fn failing_connects(count: usize) -> Self {
            let connector = Self::default();
            connector.script.lock().unwrap().connect_failures = count;
            connector
        }

        fn with_replies(replies: impl IntoIterator<Item = Reply>) -> Self {
            let connector = Self::default();
            connector.script.lock().unwrap().replies = replies.into_iter().collect();
            connector
        }

        fn acked(&self) -> Vec<String> {
            self.script.lock().unwrap().acked.clone()
        }

        fn sent_ids(&self) -> Vec<String> {
            self.script
                .lock()
                .unwrap()
                .sent
                .iter()
                .map(|line| job_id_of(line))
                .collect()
        }

        fn connects(&self) -> usize {
            self.script.lock().unwrap().connects
        }
    }

    struct ScriptedConnection {
        script: Arc<Mutex<Script>>,
        last_sent: Option<Vec<u8>>,
    }

    #[async_trait]
    impl Connector for ScriptedConnector {
        type Connection = ScriptedConnection;

        async fn connect(&self) -> Result<Self::Connection, TransportError> {
            let mut script = self.script.lock().unwrap();
            script.connects += 1;
            if script.connect_failures > 0 {
                script.connect_failures -= 1;
                return Err(TransportError::Connect {
                    endpoint: self.endpoint().to_string(),
                    source: io::Error::from(io::ErrorKind::ConnectionRefused),
                });
            }
            Ok(ScriptedConnection {
                script: self.script.clone(),
                last_sent: None,
            })
        }

        fn endpoint(&self) -> &str {
            "scripted"
        }
    }

    #[async_trait]
    impl Connection for ScriptedConnection {
        async fn send(&mut self, record: &[u8]) -> Result<(), TransportError> {
            self.script.lock().unwrap().sent.push(record.to_vec());
            self.last_sent = Some(record.to_vec());
            Ok(())
        }

        async fn receive(&mut self) -> Result<Bytes, TransportError> {
            let mut script = self.script.lock().unwrap();
            match script.replies.pop_front().unwrap_or(Reply::Ack) {
                Reply::Ack => {
                    let line = self.last_sent.take().expect("receive follows send");
                    script.acked.push(job_id_of(&line));
                    Ok(Bytes::from_static(b"ok\n"))
                }
                Reply::Reset => Err(TransportError::Closed),
            }
        }
    }

    fn job_id_of(line: &[u8]) -> String {
        let value: serde_json::Value = serde_json::from_slice(line).expect("json line");
        value["job_id"].as_str().expect("job_id").to_string()
    }

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

    fn id(name: &str) -> String {
        format!("{name}-000000000000")
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    fn no_wait() -> Arc<dyn RetryPolicy> {
        Arc::new(FixedDelay::new(Duration::ZERO))
    }

    #[tokio::test]
    async fn delivers_in_order_over_a_single_connection() {
        let connector = ScriptedConnector::default();
        let (queue, jobs) = work_queue();
        let worker = DeliveryWorker::new(connector.clone(), no_wait(), &queue, jobs);
        let handle = tokio::spawn(worker.run());

        for name in ["a", "b", "c"] {
            queue.enqueue(job(name));
        }

        wait_until(|| connector.acked().len() == 3).await;
        assert_eq!(connector.acked(), vec![id("a"), id("b"), id("c")]);
        assert_eq!(connector.connects(), 1);

        drop(queue);
        handle.await.expect("join").expect("clean stop");
    }

    #[tokio::test]
    async fn failed_job_is_requeued_behind_later_arrivals() {
        let connector = ScriptedConnector::with_replies([Reply::Reset]);
        let (queue, jobs) = work_queue();
        queue.enqueue(job("a"));
        queue.enqueue(job("b"));

        let worker = DeliveryWorker::new(connector.clone(), no_wait(), &queue, jobs);
        let handle = tokio::spawn(worker.run());

        wait_until(|| connector.acked().len() == 2).await;
        assert_eq!(connector.sent_ids(), vec![id("a"), id("b"), id("a")]);
        assert_eq!(connector.acked(), vec![id("b"), id("a")]);
        assert_eq!(connector.connects(), 2);

        let sent = connector.script.lock().unwrap().sent.clone();
        assert_eq!(sent[0], sent[2], "retry must resend the identical record");

        drop(queue);
        handle.await.expect("join").expect("clean stop");
    }

    #[tokio::test]
    async fn connect_failures_are_retried_until_the_service_appears() {
        let connector = ScriptedConnector::failing_connects(3);
        let (queue, jobs) = work_queue();
        queue.enqueue(job("a"));

        let worker = DeliveryWorker::new(connector.clone(), no_wait(), &queue, jobs);
        let handle = tokio::spawn(worker.run());

        wait_until(|| connector.acked().len() == 1).await;
        assert_eq!(connector.connects(), 4);

        drop(queue);
        handle.await.expect("join").expect("clean stop");
    }

    #[tokio::test]
    async fn limited_policy_stops_when_the_service_never_appears() {
        let connector = ScriptedConnector::failing_connects(usize::MAX);
        let (queue, jobs) = work_queue();
        let retry: Arc<dyn RetryPolicy> = Arc::new(LimitedAttempts::new(Duration::ZERO, 3));

        let err = DeliveryWorker::new(connector.clone(), retry, &queue, jobs)
            .run()
            .await
            .expect_err("worker should give up");

        match err {
            DeliveryError::RetriesExhausted { failures, last } => {
                assert_eq!(failures, 3);
                assert!(matches!(last, TransportError::Connect { .. }));
            }
        }
        assert_eq!(connector.connects(), 3);
    }

    #[tokio::test]
    async fn giving_up_mid_delivery_leaves_the_job_queued() {
        let connector = ScriptedConnector::with_replies([Reply::Reset, Reply::Reset]);
        let (queue, jobs) = work_queue();
        queue.enqueue(job("a"));
        let retry: Arc<dyn RetryPolicy> = Arc::new(LimitedAttempts::new(Duration::ZERO, 2));

        let err = DeliveryWorker::new(connector.clone(), retry, &queue, jobs)
            .run()
            .await
            .expect_err("worker should give up");

        assert!(matches!(
            err,
            DeliveryError::RetriesExhausted {
                failures: 2,
                last: TransportError::Closed
            }
        ));
        assert!(connector.acked().is_empty());
        assert_eq!(queue.depth(), 1);
    }

    #[tokio::test]
    async fn publishes_connection_state() {
        let connector = ScriptedConnector::default();
        let (queue, jobs) = work_queue();
        let worker = DeliveryWorker::new(connector, no_wait(), &queue, jobs);
        let mut state = worker.subscribe();
        assert_eq!(*state.borrow(), WorkerState::Disconnected);

        let handle = tokio::spawn(worker.run());
        tokio::time::timeout(
            Duration::from_secs(2),
            state.wait_for(|s| *s == WorkerState::Connected),
        )
        .await
        .expect("timely")
        .expect("sender alive");

        drop(queue);
        handle.await.expect("join").expect("clean stop");
        assert_eq!(*state.borrow(), WorkerState::Disconnected);
    }

    #[tokio::test]
    async fn drains_remaining_jobs_after_producers_are_gone() {
        let connector = ScriptedConnector::default();
        let (queue, jobs) = work_queue();
        queue.enqueue(job("last"));
        let worker = DeliveryWorker::new(connector.clone(), no_wait(), &queue, jobs);
        drop(queue);

        worker.run().await.expect("clean stop");
        assert_eq!(connector.acked(), vec![id("last")]);
    }

    #[test]
    fn state_labels() {
        assert_eq!(WorkerState::Connected.as_str(), "connected");
        assert_eq!(WorkerState::Disconnected.as_str(), "disconnected");
    }
}
