// src/replay/mod.rs
//! Retry/replay orchestration
//!
//! Clones a terminated exchange, applies edits, and resubmits it through
//! the engine as a brand-new client request.

pub mod orchestrator;

pub use orchestrator::{RetryOrchestrator, RetryOverrides};
