//! `databus-telemetry` – process-wide logging and trace export for data bus
//! hosts.
//!
//! The data bus libraries only emit `tracing` events and never install a
//! subscriber themselves.  A host process calls
//! [`telemetry::init_tracing`] once at startup and keeps the returned guard
//! alive until exit.

pub mod telemetry;

pub use telemetry::{TracerProviderGuard, init_tracing};
