// src/lib.rs
//! Flowbridge Control Plane Library
//!
//! This library sits between an HTTP/HTTPS interception engine and an
//! external controller process, turning raw request/response arrivals into
//! a structured, bidirectional line-delimited JSON protocol.
//!
//! # Architecture
//!
//! - **codec**: binary-safe body serialization (text / data-URL)
//! - **flow**: exchange data model and the by-id/by-key registry
//! - **mock**: map-local override engine (canned response substitution)
//! - **breakpoint**: per-key pause/resume rules and state machine
//! - **shaping**: simulated network conditions (latency, jitter,
//!   bandwidth, loss)
//! - **replay**: clone-and-resubmit orchestration
//! - **bridge**: the command/event protocol and control-plane dispatch
//! - **engine**: capability boundary to the interception engine
//! - **utils**: errors and configuration
//!
//! ```text
//! Engine hooks ──► ControlPlane ──► events (stdout, one JSON per line)
//!                      ▲
//! Controller ──► command reader (stdin, one JSON per line)
//! ```

// Public module exports
pub mod breakpoint;
pub mod bridge;
pub mod codec;
pub mod engine;
pub mod flow;
pub mod mock;
pub mod replay;
pub mod shaping;
pub mod utils;

// Re-export commonly used types
pub use bridge::control::ControlPlane;
pub use bridge::event::{EventSink, StdoutSink};
pub use engine::EngineHandle;
pub use flow::exchange::{Exchange, FlowHandle, HttpRequest, HttpResponse};
pub use utils::config::CoreConfig;
pub use utils::errors::{CoreError, Result};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
