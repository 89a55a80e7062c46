//! User callback seam for subscriptions.

use async_trait::async_trait;

/// Error type a callback may return. It is logged and discarded.
pub type CallbackError = Box<dyn std::error::Error + Send + Sync>;

pub type CallbackResult = Result<(), CallbackError>;

/// Receives every message of a subscription, one at a time, in arrival order.
///
/// Invoked from the dispatch worker, never from the transport's receive
/// path.  A slow implementation delays later messages of the same
/// subscription but does not block the transport.  Errors and panics are
/// caught by the worker.
///
/// Any `Fn(&str, &str) -> CallbackResult` closure is a `MessageCallback`.
#[async_trait]
pub trait MessageCallback: Send + Sync {
    async fn on_message(&self, topic: &str, payload: &str) -> CallbackResult;
}

#[async_trait]
impl<F> MessageCallback for F
where
    F: Fn(&str, &str) -> CallbackResult + Send + Sync,
{
    async fn on_message(&self, topic: &str, payload: &str) -> CallbackResult {
        (self)(topic, payload)
    }
}
