//! `databus-export` – forwards an upstream message stream to OPC UA clients.
//!
//! Reads newline-delimited messages from stdin and publishes each one on
//! every configured export topic until stdin closes or Ctrl-C is pressed,
//! then destroys the publisher context.

use std::process::ExitCode;

use databus_core::{BusKind, LoopbackHub, TransportRegistry};
use databus_export::{LineSource, OpcuaExporter, config};
use tokio::io::BufReader;
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    let _telemetry = databus_telemetry::init_tracing("databus-export");

    let cfg = match config::load() {
        Ok(Some(cfg)) => cfg,
        Ok(None) => {
            error!(path = %config::config_path().display(), "export configuration not found");
            return ExitCode::FAILURE;
        }
        Err(e) => {
            error!(error = %e, "failed to load export configuration");
            return ExitCode::FAILURE;
        }
    };
    info!(config = ?cfg, "export configuration loaded");

    // ── Transport ─────────────────────────────────────────────────────────
    // Only the in-process loopback transport is linked into this binary, so
    // clients must share the process (or replace this registry).
    let hub = LoopbackHub::default();
    let registry = TransportRegistry::new().with(BusKind::Opcua, hub.factory());

    let exporter = match OpcuaExporter::start(registry, &cfg).await {
        Ok(exporter) => exporter,
        Err(e) => {
            error!(error = %e, "failed to start OPC UA export");
            return ExitCode::FAILURE;
        }
    };

    // ── Forward until stdin closes or Ctrl-C ──────────────────────────────
    let mut source = LineSource::new(BufReader::new(tokio::io::stdin()));
    tokio::select! {
        stats = exporter.run(&mut source) => info!(?stats, "export finished"),
        _ = tokio::signal::ctrl_c() => info!("Ctrl-C received, shutting down"),
    }

    match exporter.shutdown().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "failed to destroy the export context");
            ExitCode::FAILURE
        }
    }
}
