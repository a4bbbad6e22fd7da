// src/bridge/mod.rs
//! Command bridge: the line-delimited JSON protocol
//!
//! One JSON command per line flows controller → core; one JSON event per
//! line flows core → controller for every request/response lifecycle
//! point. Engine hooks enter through [`control::ControlPlane`]; controller
//! commands enter through [`reader::run`].

pub mod command;
pub mod control;
pub mod event;
pub mod reader;

pub use command::{parse_command, Command};
pub use control::ControlPlane;
pub use event::{EventKind, EventSink, FlowEvent, StdoutSink};
