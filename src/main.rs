// src/main.rs
//! Flowbridge Control Plane
//!
//! Long-running side process of an HTTP/HTTPS interception engine. Reads
//! one JSON command per line from stdin, emits one JSON flow event per
//! line on stdout, and logs diagnostics to stderr.
//!
//! When launched standalone (no engine embedding the library), a no-op
//! engine adapter is used so the protocol surface can still be exercised.

use anyhow::Result;
use flowbridge_core::bridge::reader;
use flowbridge_core::engine::NullEngine;
use flowbridge_core::{ControlPlane, CoreConfig, StdoutSink};
use std::sync::Arc;
use tokio::io::BufReader;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Diagnostics go to stderr; stdout is reserved for the event protocol
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    info!("Starting flowbridge control plane v{}", env!("CARGO_PKG_VERSION"));

    let config = CoreConfig::load()?;
    info!("Configuration loaded: {:?}", config);

    let control = ControlPlane::new(config, Arc::new(NullEngine), Arc::new(StdoutSink));

    let stdin = BufReader::new(tokio::io::stdin());
    let reader_loop = reader::run(Arc::clone(&control), stdin);

    tokio::select! {
        _ = reader_loop => {
            info!("Command stream ended, shutting down");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal, cleaning up...");
        }
    }

    Ok(())
}
