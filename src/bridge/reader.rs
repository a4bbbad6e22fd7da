// src/bridge/reader.rs
//! Command reader task
//!
//! Consumes the controller's stream one line at a time and dispatches
//! synchronously into the control plane. A malformed line is logged and
//! skipped; nothing here may stall on a suspended exchange.

use crate::bridge::command::parse_command;
use crate::bridge::control::ControlPlane;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, error, info};

/// Run the command loop until the stream ends or fails
pub async fn run<R>(control: Arc<ControlPlane>, reader: R)
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match parse_command(line) {
                    Ok(command) => {
                        debug!(?command, "command received");
                        control.handle_command(command);
                    }
                    Err(e) => {
                        error!(error = %e, "discarding malformed command line");
                        metrics::counter!("flowbridge_protocol_errors_total").increment(1);
                    }
                }
            }
            Ok(None) => {
                info!("command stream closed");
                return;
            }
            Err(e) => {
                error!(error = %e, "command stream read error");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::event::{CaptureSink, EventSink};
    use crate::engine::{EngineHandle, RecordingEngine};
    use crate::utils::config::CoreConfig;

    fn control_with_sink() -> (Arc<ControlPlane>, Arc<CaptureSink>) {
        let engine = Arc::new(RecordingEngine::new());
        let sink = Arc::new(CaptureSink::new());
        let control = ControlPlane::new(
            CoreConfig::default(),
            engine as Arc<dyn EngineHandle>,
            Arc::clone(&sink) as Arc<dyn EventSink>,
        );
        (control, sink)
    }

    #[tokio::test]
    async fn test_reader_applies_commands_and_skips_garbage() {
        let (control, _sink) = control_with_sink();
        let input = concat!(
            "not json\n",
            "\n",
            "{\"type\":\"breakpoint_rule\",\"key\":\"api.example.com/a\",\"request\":true,\"response\":false}\n",
            "{\"type\":\"traffic_profile\",\"profile\":{\"id\":\"edge\",\"name\":\"Edge\"}}\n",
        );

        run(Arc::clone(&control), input.as_bytes()).await;

        assert!(control.breakpoints().rule_for("api.example.com/a").is_some());
        assert_eq!(control.shaper().active_profile().id, "edge");
    }

    #[tokio::test]
    async fn test_reader_stops_at_eof() {
        let (control, _sink) = control_with_sink();
        run(control, "".as_bytes()).await;
    }
}
