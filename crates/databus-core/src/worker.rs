//! [`DispatchWorker`] – drains a [`DeliveryQueue`] into a user callback.
//!
//! One worker runs per subscription session as a Tokio task.  It waits for
//! the next message with a bounded timeout so that it notices a stop request
//! even when the queue is idle; a stop request also wakes it immediately.
//!
//! Stopping is cooperative: a callback already running completes, but no new
//! callback starts once stop has been requested.  Messages still queued at
//! that point are discarded and counted in [`WorkerStats::discarded`].

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::FutureExt;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::callback::MessageCallback;
use crate::queue::DeliveryQueue;

// ─────────────────────────────────────────────────────────────────────────────
// Worker handle
// ─────────────────────────────────────────────────────────────────────────────

/// How long the worker waits for a message before rechecking the stop flag.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Counters reported when a worker terminates.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WorkerStats {
    /// Callback invocations that returned `Ok`.
    pub delivered: u64,
    /// Callback invocations that returned an error or panicked.
    pub failed: u64,
    /// Messages still queued when the worker stopped.
    pub discarded: u64,
}

#[derive(Default)]
struct StopSignal {
    requested: AtomicBool,
    wake: Notify,
}

impl StopSignal {
    fn request(&self) {
        self.requested.store(true, Ordering::SeqCst);
        self.wake.notify_one();
    }

    fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }
}

/// Handle to a running dispatch task.
///
/// Dropping the handle requests a stop without waiting for it.
pub struct DispatchWorker {
    session_id: Uuid,
    signal: Arc<StopSignal>,
    handle: Option<JoinHandle<WorkerStats>>,
}

impl DispatchWorker {
    /// Spawn a worker on the current Tokio runtime.
    pub fn spawn(
        session_id: Uuid,
        queue: DeliveryQueue,
        callback: Arc<dyn MessageCallback>,
        poll_interval: Duration,
    ) -> Self {
        let signal = Arc::new(StopSignal::default());
        let handle = tokio::spawn(run(
            session_id,
            queue,
            callback,
            Arc::clone(&signal),
            poll_interval,
        ));
        debug!(session = %session_id, ?poll_interval, "dispatch worker started");
        Self {
            session_id,
            signal,
            handle: Some(handle),
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Ask the worker to stop without waiting for it.
    pub fn request_stop(&self) {
        self.signal.request();
    }

    /// `true` once the task has exited.
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Request a stop and wait for the task to exit.
    ///
    /// Called from inside the worker's own callback this only requests the
    /// stop: the worker exits once that callback returns, and the returned
    /// stats are empty.
    pub async fn stop(mut self) -> WorkerStats {
        self.signal.request();
        let Some(handle) = self.handle.take() else {
            return WorkerStats::default();
        };
        if tokio::task::try_id() == Some(handle.id()) {
            debug!(session = %self.session_id, "stop requested from the worker's own callback");
            return WorkerStats::default();
        }
        match handle.await {
            Ok(stats) => {
                debug!(
                    session = %self.session_id,
                    delivered = stats.delivered,
                    failed = stats.failed,
                    discarded = stats.discarded,
                    "dispatch worker stopped"
                );
                stats
            }
            Err(e) => {
                error!(session = %self.session_id, error = %e, "dispatch worker aborted");
                WorkerStats::default()
            }
        }
    }
}

impl Drop for DispatchWorker {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.signal.request();
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Dispatch loop
// ─────────────────────────────────────────────────────────────────────────────

async fn run(
    session_id: Uuid,
    mut queue: DeliveryQueue,
    callback: Arc<dyn MessageCallback>,
    signal: Arc<StopSignal>,
    poll_interval: Duration,
) -> WorkerStats {
    let mut stats = WorkerStats::default();

    loop {
        if signal.is_requested() {
            break;
        }

        let next = tokio::select! {
            biased;
            () = signal.wake.notified() => continue,
            next = tokio::time::timeout(poll_interval, queue.recv()) => next,
        };

        let message = match next {
            Ok(Some(message)) => message,
            Ok(None) => {
                debug!(session = %session_id, "delivery queue closed");
                break;
            }
            // Poll interval elapsed with nothing to deliver.
            Err(_) => continue,
        };

        if signal.is_requested() {
            stats.discarded += 1;
            break;
        }

        let outcome = AssertUnwindSafe(callback.on_message(&message.topic, &message.payload))
            .catch_unwind()
            .await;
        match outcome {
            Ok(Ok(())) => stats.delivered += 1,
            Ok(Err(e)) => {
                stats.failed += 1;
                warn!(session = %session_id, topic = %message.topic, error = %e, "subscription callback failed");
            }
            Err(panic) => {
                stats.failed += 1;
                error!(
                    session = %session_id,
                    topic = %message.topic,
                    panic = panic_message(panic.as_ref()),
                    "subscription callback panicked"
                );
            }
        }
    }

    stats.discarded += queue.close_and_drain();
    stats
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}
