// src/breakpoint/mod.rs
//! Breakpoint rules and the pause/resume state machine
//!
//! Per (exchange, phase) states: **Flowing** (default) → **Waiting**
//! (suspended inside the engine) → **Released** (terminal for that phase).
//! A suspended phase leaves either released-with-edits or
//! released-unmodified; it is never double-released or silently dropped.

pub mod controller;

pub use controller::{BreakpointController, BreakpointRule, Phase};
