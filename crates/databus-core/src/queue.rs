//! Bounded delivery queue between a transport's receive path and the
//! [`DispatchWorker`][crate::worker::DispatchWorker].
//!
//! The producer half, [`DeliverySink`], is what a transport holds on to for
//! the lifetime of a subscription.  It never blocks: a full queue drops the
//! incoming message and logs it, so a slow user callback can never stall the
//! transport's own receive thread.  The sink is safe to call from threads
//! that are not part of the Tokio runtime (native callback threads).
//!
//! Each sink is bound to exactly one subscription session and carries that
//! session's id, which a transport uses to route a later STOP to the right
//! stream.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use databus_types::DeliveryMessage;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{trace, warn};
use uuid::Uuid;

use crate::decode::{decode_payload, decode_topic};

/// Default number of messages buffered before new arrivals are dropped.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Result of handing one message to a [`DeliverySink`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// The message is waiting for the dispatch worker.
    Queued,
    /// The queue was at capacity; the message was dropped.
    QueueFull,
    /// The session has been stopped; the message was discarded.
    Closed,
}

/// Create a bounded queue for the session `session_id`.
///
/// # Panics
///
/// Panics if `capacity` is zero.
pub fn delivery_queue(session_id: Uuid, capacity: usize) -> (DeliverySink, DeliveryQueue) {
    let (sender, receiver) = mpsc::channel(capacity);
    let sink = DeliverySink {
        session_id,
        sender,
        dropped: Arc::new(AtomicU64::new(0)),
    };
    (sink, DeliveryQueue { receiver })
}

/// Producer half of the delivery queue. Clone it cheaply.
#[derive(Clone, Debug)]
pub struct DeliverySink {
    session_id: Uuid,
    sender: mpsc::Sender<DeliveryMessage>,
    dropped: Arc<AtomicU64>,
}

impl DeliverySink {
    /// Id of the subscription session this sink feeds.
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Decode raw transport buffers and enqueue them.
    ///
    /// This is the entry point for a transport's receive callback.
    pub fn deliver(&self, topic: &[u8], payload: &[u8]) -> EnqueueOutcome {
        self.enqueue(DeliveryMessage::new(decode_topic(topic), decode_payload(payload)))
    }

    /// Enqueue an already decoded message without blocking.
    pub fn enqueue(&self, message: DeliveryMessage) -> EnqueueOutcome {
        match self.sender.try_send(message) {
            Ok(()) => EnqueueOutcome::Queued,
            Err(TrySendError::Full(message)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(
                    session = %self.session_id,
                    topic = %message.topic,
                    dropped,
                    "delivery queue full; message dropped"
                );
                EnqueueOutcome::QueueFull
            }
            Err(TrySendError::Closed(message)) => {
                trace!(session = %self.session_id, topic = %message.topic, "delivery after stop discarded");
                EnqueueOutcome::Closed
            }
        }
    }

    /// Number of messages dropped because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// `true` once the consuming worker has gone away.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// Consumer half of the delivery queue, owned by the dispatch worker.
#[derive(Debug)]
pub struct DeliveryQueue {
    receiver: mpsc::Receiver<DeliveryMessage>,
}

impl DeliveryQueue {
    /// Wait for the next message.
    ///
    /// Returns `None` once every sink has been dropped and the queue is empty.
    pub async fn recv(&mut self) -> Option<DeliveryMessage> {
        self.receiver.recv().await
    }

    /// Refuse further messages and discard what is still buffered, returning
    /// the number of discarded messages.
    pub fn close_and_drain(&mut self) -> u64 {
        self.receiver.close();
        let mut discarded = 0;
        while self.receiver.try_recv().is_ok() {
            discarded += 1;
        }
        discarded
    }
}
