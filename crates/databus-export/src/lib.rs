//! `databus-export` – republishes an upstream message stream to OPC UA
//! clients through a publisher [`BusContext`][databus_core::BusContext].
//!
//! Every upstream message is fanned out to each configured export topic in
//! the `StreamManager` namespace as the text `"<topic> <message>"`.  In
//! secured mode the base64 certificate material from the configuration is
//! decoded to DER files only for as long as the context creation needs them.
//!
//! # Modules
//!
//! - [`config`] – `~/.databus/export.toml` with `DATABUS_EXPORT_*` overrides.
//! - [`certs`] – short-lived certificate files.
//! - [`source`] – the upstream [`MessageSource`] seam.
//! - [`exporter`] – [`OpcuaExporter`], the fan-out loop.

pub mod certs;
pub mod config;
pub mod exporter;
pub mod source;

use databus_types::DataBusError;
use thiserror::Error;

pub use certs::{CertificateFiles, CertificateMaterial};
pub use config::ExportConfig;
pub use exporter::{ExportStats, OpcuaExporter, STREAM_MANAGER_NAMESPACE};
pub use source::{LineSource, MessageSource, SourceEvent};

#[derive(Debug, Error)]
pub enum ExportError {
    #[error(transparent)]
    Bus(#[from] DataBusError),

    #[error("Invalid certificate material '{key}': {reason}")]
    InvalidCertificate { key: &'static str, reason: String },

    #[error("Failed to write certificate file {path}: {reason}")]
    CertificateIo { path: String, reason: String },

    #[error("Export configuration error: {0}")]
    Config(String),
}
