//! The transport seam.
//!
//! The data bus never speaks a wire protocol itself.  A [`BusContext`]
//! delegates every network-facing step to a [`Transport`], which wraps the
//! concrete messaging stack (for OPC UA, the native pub/sub binding).
//!
//! # Overview
//!
//! - [`Transport`] – the trait every transport must implement.
//! - [`TransportFactory`] – opens a fresh transport handle for each
//!   successful `create`.
//! - [`LoopbackTransport`][crate::loopback::LoopbackTransport] – in-process
//!   implementation for development and tests.
//!
//! [`BusContext`]: crate::context::BusContext

use std::sync::Arc;

use async_trait::async_trait;
use databus_types::{Direction, Endpoint, SecurityMode, TopicDescriptor, Trigger};

use crate::queue::DeliverySink;
use crate::status::TransportStatus;

/// Every messaging transport must implement this trait.
///
/// # Contract
///
/// * Each method reports its outcome as a [`TransportStatus`]; `"0"` is
///   success, anything else is an opaque failure message that is surfaced
///   to the caller verbatim.
///
/// * `create_context` – open a publisher (server) or subscriber (client)
///   endpoint.  [`SecurityMode::Insecure`] selects dev mode.
///
/// * `send` – write `payload` to `topic`.  Called only on `PUB` contexts and
///   may block until the stack accepts the write.
///
/// * `subscribe` – with [`Trigger::Start`], begin delivering every update of
///   `topics` into `sink` via [`DeliverySink::deliver`] until told otherwise.
///   With [`Trigger::Stop`], stop delivering into the stream identified by
///   `sink.session_id()`.  The sink is the only routing state a transport
///   needs; two sessions never share one.
///
/// * `destroy_context` – tear the endpoint down and stop every delivery.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn create_context(
        &self,
        endpoint: &Endpoint,
        direction: Direction,
        security: &SecurityMode,
    ) -> TransportStatus;

    async fn send(&self, topic: &TopicDescriptor, payload: &str) -> TransportStatus;

    async fn subscribe(
        &self,
        topics: &[TopicDescriptor],
        trigger: Trigger,
        sink: &DeliverySink,
    ) -> TransportStatus;

    async fn destroy_context(&self) -> TransportStatus;
}

/// Opens transport handles.  Any `Fn() -> Arc<dyn Transport>` closure is a
/// factory.
pub trait TransportFactory: Send + Sync {
    fn open(&self) -> Arc<dyn Transport>;
}

impl<F> TransportFactory for F
where
    F: Fn() -> Arc<dyn Transport> + Send + Sync,
{
    fn open(&self) -> Arc<dyn Transport> {
        (self)()
    }
}
