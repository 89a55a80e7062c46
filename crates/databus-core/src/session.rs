//! [`SubscriptionSession`] – the per-`START` bundle of delivery queue and
//! dispatch worker.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use databus_types::TopicDescriptor;
use tracing::info;
use uuid::Uuid;

use crate::callback::MessageCallback;
use crate::queue::{DeliverySink, delivery_queue};
use crate::worker::{DispatchWorker, WorkerStats};

/// One live subscription: its topics, the sink handed to the transport and
/// the worker draining that sink's queue.
pub struct SubscriptionSession {
    id: Uuid,
    topics: Vec<TopicDescriptor>,
    sink: DeliverySink,
    worker: DispatchWorker,
    started_at: DateTime<Utc>,
}

impl SubscriptionSession {
    /// Create the queue and spawn the worker bound to `callback`.
    ///
    /// The transport is not contacted here; hand [`sink`][Self::sink] to it
    /// afterwards.
    pub fn start(
        topics: Vec<TopicDescriptor>,
        callback: Arc<dyn MessageCallback>,
        queue_capacity: usize,
        poll_interval: Duration,
    ) -> Self {
        let id = Uuid::new_v4();
        let (sink, queue) = delivery_queue(id, queue_capacity);
        let worker = DispatchWorker::spawn(id, queue, callback, poll_interval);
        info!(session = %id, topics = topics.len(), "subscription session started");
        Self {
            id,
            topics,
            sink,
            worker,
            started_at: Utc::now(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn topics(&self) -> &[TopicDescriptor] {
        &self.topics
    }

    pub fn sink(&self) -> &DeliverySink {
        &self.sink
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Prevent any further callback from starting.
    pub fn request_stop(&self) {
        self.worker.request_stop();
    }

    /// Stop the worker and wait for it to exit.  From inside the session's
    /// own callback the worker exits after that callback returns instead.
    pub async fn stop(self) -> WorkerStats {
        let stats = self.worker.stop().await;
        info!(
            session = %self.id,
            delivered = stats.delivered,
            failed = stats.failed,
            discarded = stats.discarded,
            dropped = self.sink.dropped(),
            "subscription session stopped"
        );
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callback::CallbackResult;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::{Instant, sleep};

    #[tokio::test]
    async fn session_wires_sink_to_callback() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let callback: Arc<dyn MessageCallback> =
            Arc::new(move |_: &str, _: &str| -> CallbackResult {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
        let topics = vec![TopicDescriptor::new("NS", "t1", "string")];
        let session = SubscriptionSession::start(topics, callback, 8, Duration::from_millis(20));

        assert_eq!(session.sink().session_id(), session.id());
        assert_eq!(session.topics().len(), 1);
        assert!(session.started_at() <= Utc::now());

        session.sink().deliver(b"t1", b"hello");
        let deadline = Instant::now() + Duration::from_secs(5);
        while count.load(Ordering::SeqCst) == 0 {
            assert!(Instant::now() < deadline);
            sleep(Duration::from_millis(5)).await;
        }

        let sink = session.sink().clone();
        let stats = session.stop().await;
        assert_eq!(stats.delivered, 1);
        assert!(sink.is_closed());
    }
}
