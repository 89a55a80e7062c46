//! [`BusContext`] – the single publisher-or-subscriber context of a data bus
//! instance.
//!
//! # Lifecycle
//!
//! ```text
//!          create(PUB)            destroy
//!   NONE ─────────────▶ PUB ─────────────▶ NONE
//!     │                                      ▲
//!     │    create(SUB)            destroy    │
//!     └───────────────▶ SUB ─────────────────┘
//! ```
//!
//! # Locking
//!
//! All state sits behind one [`RwLock`].  `create`, `subscribe` and
//! `destroy` change it exclusively; `publish` holds it shared for the whole
//! transport send, so publishes may overlap each other but a `destroy` only
//! takes the transport away once every in-flight send has returned.
//!
//! The lock is never held while waiting for a dispatch worker to exit.  A
//! subscription callback may therefore read its own context, and may even
//! `STOP` or `destroy` it; the worker then exits after that callback
//! returns.  While a `destroy` is waiting for the worker the context reports
//! `NONE`, and a concurrent `create` waits until the teardown has finished.

use std::sync::Arc;

use databus_types::{
    BusKind, ContextConfig, DataBusError, Direction, Endpoint, MAX_PUBLISH_PAYLOAD_BYTES, Payload,
    TopicDescriptor, Trigger,
};
use tokio::sync::{Notify, RwLock};
use tracing::{debug, info, warn};

use crate::callback::MessageCallback;
use crate::config::DeliverySettings;
use crate::registry::TransportRegistry;
use crate::session::SubscriptionSession;
use crate::status::TransportOp;
use crate::transport::Transport;

// ─────────────────────────────────────────────────────────────────────────────
// Context state
// ─────────────────────────────────────────────────────────────────────────────

/// State of a context between a successful `create` and `destroy`.
struct LiveContext {
    /// Always `Pub` or `Sub`.
    direction: Direction,
    kind: BusKind,
    transport: Arc<dyn Transport>,
    session: Option<SubscriptionSession>,
}

enum Phase {
    Idle,
    Live(LiveContext),
    /// `destroy` owns the transport and is shutting it down.
    Closing,
}

impl Phase {
    fn live(&self) -> Option<&LiveContext> {
        match self {
            Phase::Live(live) => Some(live),
            Phase::Idle | Phase::Closing => None,
        }
    }

    fn live_mut(&mut self) -> Option<&mut LiveContext> {
        match self {
            Phase::Live(live) => Some(live),
            Phase::Idle | Phase::Closing => None,
        }
    }

    fn direction(&self) -> Direction {
        self.live().map_or(Direction::None, |live| live.direction)
    }
}

/// Puts a closing context back to `Idle` if `destroy` is cancelled part-way.
struct CloseGuard<'a> {
    state: &'a RwLock<Phase>,
    closed: &'a Notify,
    armed: bool,
}

impl Drop for CloseGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match self.state.try_write() {
            Ok(mut state) => *state = Phase::Idle,
            Err(_) => warn!("context state busy while abandoning destroy"),
        }
        self.closed.notify_waiters();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Public API
// ─────────────────────────────────────────────────────────────────────────────

/// A data bus context.
///
/// Construct with a [`TransportRegistry`], then `create` it as a publisher or
/// a subscriber.  Share it across tasks behind an `Arc`.
pub struct BusContext {
    registry: TransportRegistry,
    settings: DeliverySettings,
    state: RwLock<Phase>,
    closed: Notify,
}

impl BusContext {
    /// Create an uninitialised context with default delivery settings.
    pub fn new(registry: TransportRegistry) -> Self {
        Self::with_settings(registry, DeliverySettings::default())
    }

    pub fn with_settings(registry: TransportRegistry, settings: DeliverySettings) -> Self {
        Self {
            registry,
            settings: settings.normalized(),
            state: RwLock::new(Phase::Idle),
            closed: Notify::new(),
        }
    }

    /// Current direction; [`Direction::None`] when not created.
    pub async fn direction(&self) -> Direction {
        self.state.read().await.direction()
    }

    pub async fn bus_kind(&self) -> Option<BusKind> {
        self.state.read().await.live().map(|live| live.kind)
    }

    pub async fn has_active_subscription(&self) -> bool {
        self.state
            .read()
            .await
            .live()
            .is_some_and(|live| live.session.is_some())
    }

    /// Open the context as a publisher or a subscriber.
    ///
    /// Waits for a `destroy` that is still shutting the previous transport
    /// down.
    ///
    /// # Errors
    ///
    /// * [`DataBusError::AlreadyInitialized`] – the context is already live.
    /// * [`DataBusError::UnsupportedBusDirection`] – `direction` is `NONE`.
    /// * [`DataBusError::UnsupportedBusKind`] /
    ///   [`DataBusError::InvalidEndpoint`] – the endpoint cannot be served.
    /// * [`DataBusError::TransportCreateFailed`] – the transport refused; the
    ///   context stays in `NONE`.
    pub async fn create(&self, config: &ContextConfig) -> Result<(), DataBusError> {
        let mut state = loop {
            let closed = self.closed.notified();
            let state = self.state.write().await;
            if let Phase::Live(live) = &*state {
                return Err(DataBusError::AlreadyInitialized(live.direction));
            }
            if matches!(*state, Phase::Idle) {
                break state;
            }
            drop(state);
            debug!("create waiting for destroy to finish");
            closed.await;
        };

        let direction = match config.direction {
            Direction::Pub | Direction::Sub => config.direction,
            Direction::None => {
                return Err(DataBusError::UnsupportedBusDirection(
                    config.direction.to_string(),
                ));
            }
        };
        let endpoint = Endpoint::parse(&config.endpoint)?;
        let transport = self.registry.open(endpoint.kind())?;

        transport
            .create_context(&endpoint, direction, &config.security())
            .await
            .into_result(TransportOp::CreateContext)?;

        *state = Phase::Live(LiveContext {
            direction,
            kind: endpoint.kind(),
            transport,
            session: None,
        });
        info!(
            endpoint = %endpoint,
            direction = %direction,
            dev_mode = config.is_dev_mode(),
            "DataBus context created"
        );
        Ok(())
    }

    /// Publish a text payload on `topic`.
    ///
    /// Blocks until the transport accepts the write; nothing is buffered.
    ///
    /// # Errors
    ///
    /// * [`DataBusError::WrongDirection`] – the context is not `PUB`.
    /// * [`DataBusError::UnsupportedPayloadType`] – `payload` is not text, or
    ///   `topic` declares a non-string type.
    /// * [`DataBusError::PayloadTooLarge`] – the text exceeds
    ///   [`MAX_PUBLISH_PAYLOAD_BYTES`].
    /// * [`DataBusError::TransportSendFailed`] – the transport refused.
    pub async fn publish(
        &self,
        topic: &TopicDescriptor,
        payload: impl Into<Payload>,
    ) -> Result<(), DataBusError> {
        let payload = payload.into();
        let state = self.state.read().await;
        let live = match state.live() {
            Some(live) if live.direction == Direction::Pub => live,
            other => {
                return Err(DataBusError::WrongDirection {
                    expected: Direction::Pub,
                    actual: other.map_or(Direction::None, |live| live.direction),
                });
            }
        };

        let text = publishable_text(topic, &payload)?;
        live.transport
            .send(topic, text)
            .await
            .into_result(TransportOp::Send)?;
        debug!(topic = %topic, bytes = text.len(), "published");
        Ok(())
    }

    /// Start or stop the subscription of this context.
    ///
    /// With [`Trigger::Start`] a delivery queue and dispatch worker bound to
    /// `callback` are created before the transport is asked to deliver
    /// `topics`.  With [`Trigger::Stop`] the worker is told to stop, the
    /// transport is asked to stop delivering the session's topics, and the
    /// call returns once the worker has exited; `topics` and `callback` are
    /// ignored.  Stopping without an active subscription is a no-op.
    ///
    /// # Errors
    ///
    /// * [`DataBusError::WrongDirection`] – the context is not `SUB`.
    /// * [`DataBusError::MissingCallback`] / [`DataBusError::EmptyTopicSet`]
    ///   – invalid `START` arguments.
    /// * [`DataBusError::SubscriptionAlreadyActive`] – `START` while a
    ///   subscription is live.
    /// * [`DataBusError::TransportSubscribeFailed`] – the transport refused.
    ///   On `START` the worker that was already spawned is stopped first.
    pub async fn subscribe(
        &self,
        topics: &[TopicDescriptor],
        trigger: Trigger,
        callback: Option<Arc<dyn MessageCallback>>,
    ) -> Result<(), DataBusError> {
        let mut state = self.state.write().await;
        let live = match state.live_mut() {
            Some(live) if live.direction == Direction::Sub => live,
            other => {
                return Err(DataBusError::WrongDirection {
                    expected: Direction::Sub,
                    actual: other.map_or(Direction::None, |live| live.direction),
                });
            }
        };

        match trigger {
            Trigger::Start => {
                let callback = callback.ok_or(DataBusError::MissingCallback)?;
                if topics.is_empty() {
                    return Err(DataBusError::EmptyTopicSet);
                }
                if live.session.is_some() {
                    return Err(DataBusError::SubscriptionAlreadyActive);
                }

                let session = SubscriptionSession::start(
                    topics.to_vec(),
                    callback,
                    self.settings.queue_capacity,
                    self.settings.poll_interval,
                );
                let status = live
                    .transport
                    .subscribe(topics, Trigger::Start, session.sink())
                    .await;
                if let Err(e) = status.into_result(TransportOp::Subscribe) {
                    drop(state);
                    session.stop().await;
                    return Err(e);
                }
                live.session = Some(session);
                Ok(())
            }
            Trigger::Stop => {
                let Some(session) = live.session.take() else {
                    debug!("subscription STOP without an active subscription");
                    return Ok(());
                };
                session.request_stop();
                let status = live
                    .transport
                    .subscribe(session.topics(), Trigger::Stop, session.sink())
                    .await;
                drop(state);
                session.stop().await;
                status.into_result(TransportOp::Unsubscribe)
            }
        }
    }

    /// Tear the context down and return it to `NONE`.
    ///
    /// Waits for in-flight publishes, then stops an active subscription and
    /// waits for a callback that is still running before the transport is
    /// destroyed.  The context is back in `NONE` when this returns, even if
    /// the transport reports a failure.
    ///
    /// # Errors
    ///
    /// * [`DataBusError::NotInitialized`] – no successful `create` since the
    ///   last `destroy`, or another `destroy` is already running.
    /// * [`DataBusError::TransportDestroyFailed`] – the transport reported a
    ///   failure while tearing down.
    pub async fn destroy(&self) -> Result<(), DataBusError> {
        let mut live = {
            let mut state = self.state.write().await;
            match std::mem::replace(&mut *state, Phase::Closing) {
                Phase::Live(live) => live,
                other => {
                    *state = other;
                    return Err(DataBusError::NotInitialized);
                }
            }
        };
        let mut guard = CloseGuard {
            state: &self.state,
            closed: &self.closed,
            armed: true,
        };

        if let Some(session) = live.session.take() {
            session.request_stop();
            let unsubscribed = live
                .transport
                .subscribe(session.topics(), Trigger::Stop, session.sink())
                .await
                .into_result(TransportOp::Unsubscribe);
            if let Err(e) = unsubscribed {
                warn!(session = %session.id(), error = %e, "unsubscribe failed during destroy");
            }
            session.stop().await;
        }

        let result = live
            .transport
            .destroy_context()
            .await
            .into_result(TransportOp::DestroyContext);

        *self.state.write().await = Phase::Idle;
        guard.armed = false;
        self.closed.notify_waiters();
        info!(direction = %live.direction, "DataBus context terminated");
        result
    }
}

impl Drop for BusContext {
    fn drop(&mut self) {
        if let Phase::Live(live) = self.state.get_mut() {
            warn!(direction = %live.direction, "DataBus context dropped without destroy");
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Internal helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Validate `payload` for `topic` and return the text to send.
fn publishable_text<'a>(
    topic: &TopicDescriptor,
    payload: &'a Payload,
) -> Result<&'a str, DataBusError> {
    let Some(text) = payload.as_text() else {
        return Err(DataBusError::UnsupportedPayloadType(format!(
            "{} payloads cannot be published, only text",
            payload.kind()
        )));
    };
    if !topic.data_type.is_empty() && !topic.data_type.eq_ignore_ascii_case("string") {
        return Err(DataBusError::UnsupportedPayloadType(format!(
            "topic {topic} declares type '{}', only 'string' is supported",
            topic.data_type
        )));
    }
    if text.len() > MAX_PUBLISH_PAYLOAD_BYTES {
        return Err(DataBusError::PayloadTooLarge {
            size: text.len(),
            limit: MAX_PUBLISH_PAYLOAD_BYTES,
        });
    }
    Ok(text)
}
