use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use metrics::{counter, gauge};
use tokio::sync::mpsc;
use tracing::error;

use crate::domain::types::Job;

const SOURCE: &str = "voicegen::jobs::queue";

/// Create the hand-off between producers and the single delivery worker.
pub fn work_queue() -> (WorkQueue, JobReceiver) {
    let (sender, receiver) = mpsc::unbounded_channel();
    let depth = Arc::new(AtomicUsize::new(0));

    (
        WorkQueue {
            sender,
            depth: depth.clone(),
        },
        JobReceiver { receiver, depth },
    )
}

/// Producer side of the work queue. Cheap to clone; every clone appends to the
/// same FIFO.
#[derive(Debug, Clone)]
pub struct WorkQueue {
    sender: mpsc::UnboundedSender<Job>,
    depth: Arc<AtomicUsize>,
}

impl WorkQueue {
    /// Append `job` to the tail. Never blocks.
    ///
    /// A job enqueued after the consumer is gone cannot be delivered; it is
    /// dropped and logged rather than reported to the caller.
    pub fn enqueue(&self, job: Job) {
        // Counted before the send so a fast consumer never decrements first.
        self.depth.fetch_add(1, Ordering::SeqCst);

        if let Err(mpsc::error::SendError(job)) = self.sender.send(job) {
            self.depth.fetch_sub(1, Ordering::SeqCst);
            publish_depth(&self.depth);
            counter!("voicegen_jobs_dropped_total").increment(1);
            error!(
                target = SOURCE,
                job_id = %job.id(),
                "work queue has no consumer; dropping job"
            );
            return;
        }

        publish_depth(&self.depth);
    }

    /// Jobs currently waiting to be picked up.
    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::SeqCst)
    }

    /// A handle that does not keep the queue open on its own.
    pub fn downgrade(&self) -> WeakWorkQueue {
        WeakWorkQueue {
            sender: self.sender.downgrade(),
            depth: self.depth.clone(),
        }
    }
}

/// Non-owning producer handle, used by the delivery worker to requeue jobs
/// without preventing the queue from closing once every real producer is gone.
#[derive(Debug, Clone)]
pub struct WeakWorkQueue {
    sender: mpsc::WeakUnboundedSender<Job>,
    depth: Arc<AtomicUsize>,
}

impl WeakWorkQueue {
    pub fn upgrade(&self) -> Option<WorkQueue> {
        self.sender.upgrade().map(|sender| WorkQueue {
            sender,
            depth: self.depth.clone(),
        })
    }
}

/// Consumer side of the work queue. There is exactly one.
#[derive(Debug)]
pub struct JobReceiver {
    receiver: mpsc::UnboundedReceiver<Job>,
    depth: Arc<AtomicUsize>,
}

impl JobReceiver {
    /// Wait for the next job in FIFO order. Returns `None` once every
    /// [`WorkQueue`] handle has been dropped and the queue is drained.
    pub async fn dequeue(&mut self) -> Option<Job> {
        let job = self.receiver.recv().await?;
        self.depth.fetch_sub(1, Ordering::SeqCst);
        publish_depth(&self.depth);
        Some(job)
    }
}

/// Mirror the counter into the gauge. Read after the update rather than
/// reusing the value returned by it, so a racing producer or consumer cannot
/// leave an older count behind.
fn publish_depth(depth: &AtomicUsize) {
    gauge!("voicegen_queue_depth").set(depth.load(Ordering::SeqCst) as f64);
}
