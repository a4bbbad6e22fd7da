// src/bridge/event.rs
//! Core → controller event grammar
//!
//! One JSON object per line on stdout. Diagnostic logging goes to stderr,
//! keeping the event stream parseable by strict protocol readers.

use crate::breakpoint::controller::Phase;
use crate::codec;
use crate::flow::exchange::{ClientAddr, Exchange, Headers};
use serde::Serialize;
use std::io::Write;
use tracing::error;

/// Lifecycle point an event reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Request,
    Response,
}

/// Breakpoint state carried on an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BreakpointState {
    Waiting,
    Released,
}

/// Breakpoint annotation attached to an event
#[derive(Debug, Clone, Serialize)]
pub struct BreakpointMeta {
    pub phase: Phase,
    pub state: BreakpointState,
    pub key: String,
}

/// Request half as seen on the wire
#[derive(Debug, Clone, Serialize)]
pub struct RequestView {
    pub method: String,
    pub url: String,
    pub headers: Headers,
    pub body: String,
}

/// Response half as seen on the wire; body uses the codec's
/// text / data-URL encoding
#[derive(Debug, Clone, Serialize)]
pub struct ResponseView {
    pub status: u16,
    pub headers: Headers,
    pub body: String,
}

/// One flow lifecycle event
#[derive(Debug, Clone, Serialize)]
pub struct FlowEvent {
    pub event: EventKind,
    pub id: String,

    /// Fractional seconds since the Unix epoch
    pub timestamp: f64,

    pub client: Option<ClientAddr>,
    pub request: RequestView,
    pub response: Option<ResponseView>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub breakpoint: Option<BreakpointMeta>,
}

impl FlowEvent {
    /// Snapshot an exchange into a wire event
    pub fn from_exchange(kind: EventKind, exchange: &Exchange, breakpoint: Option<BreakpointMeta>) -> Self {
        let request = RequestView {
            method: exchange.request.method.clone(),
            url: exchange.request.url.clone(),
            headers: exchange.request.headers.clone(),
            body: exchange.request.body_text(),
        };

        let response = exchange.response.as_ref().map(|r| ResponseView {
            status: r.status,
            headers: r.headers.clone(),
            body: codec::serialize_body(&r.headers, &r.body),
        });

        Self {
            event: kind,
            id: exchange.id.clone(),
            timestamp: chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0,
            client: exchange.client.clone(),
            request,
            response,
            breakpoint,
        }
    }
}

/// Destination for flow events
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &FlowEvent);
}

/// Writes one JSON event per line to stdout, locking per line so
/// concurrent exchanges never interleave partial frames
pub struct StdoutSink;

impl EventSink for StdoutSink {
    fn emit(&self, event: &FlowEvent) {
        let line = match serde_json::to_string(event) {
            Ok(line) => line,
            Err(e) => {
                error!(error = %e, "failed to serialize flow event");
                return;
            }
        };

        let mut out = std::io::stdout().lock();
        if let Err(e) = out.write_all(line.as_bytes()).and_then(|_| out.write_all(b"\n")) {
            error!(error = %e, "failed to write flow event");
        }
        let _ = out.flush();
    }
}

/// Capturing sink for tests
#[cfg(test)]
pub struct CaptureSink {
    events: parking_lot::Mutex<Vec<FlowEvent>>,
}

#[cfg(test)]
impl CaptureSink {
    pub fn new() -> Self {
        Self {
            events: parking_lot::Mutex::new(Vec::new()),
        }
    }

    pub fn events(&self) -> Vec<FlowEvent> {
        self.events.lock().clone()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

#[cfg(test)]
impl EventSink for CaptureSink {
    fn emit(&self, event: &FlowEvent) {
        self.events.lock().push(event.clone());
    }
}
