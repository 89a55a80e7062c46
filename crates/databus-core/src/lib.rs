//! `databus-core` – a transport-agnostic publish/subscribe data bus.
//!
//! A [`BusContext`] is opened once as either a publisher or a subscriber on
//! a scheme-prefixed endpoint (`opcua://host:port`).  Publishers push text
//! payloads to named topics; subscribers register a [`MessageCallback`] that
//! is driven by a dedicated worker task, decoupled from the transport's own
//! receive path by a bounded queue.
//!
//! # Modules
//!
//! - [`context`] – the PUB/SUB lifecycle state machine.
//! - [`transport`] – the seam to a concrete messaging stack, plus
//!   [`registry`] mapping endpoint schemes to transport factories.
//! - [`queue`], [`worker`], [`session`] – the subscription delivery
//!   pipeline.
//! - [`loopback`] – in-process transport for development and tests.
//! - [`config`] – TOML configuration with `DATABUS_*` overrides.

pub mod callback;
pub mod config;
pub mod context;
pub mod decode;
pub mod loopback;
pub mod queue;
pub mod registry;
pub mod session;
pub mod status;
pub mod transport;
pub mod worker;

pub use callback::{CallbackError, CallbackResult, MessageCallback};
pub use config::{DataBusConfig, DeliveryConfig, DeliverySettings};
pub use context::BusContext;
pub use loopback::{LoopbackFactory, LoopbackHub, LoopbackTransport};
pub use queue::{DeliverySink, EnqueueOutcome};
pub use registry::TransportRegistry;
pub use status::{TransportOp, TransportStatus};
pub use transport::{Transport, TransportFactory};
pub use worker::WorkerStats;

pub use databus_types::{
    BusKind, ContextConfig, DataBusError, Direction, Endpoint, Payload, SecurityMode,
    TopicDescriptor, Trigger,
};
