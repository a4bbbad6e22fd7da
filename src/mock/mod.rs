// src/mock/mod.rs
//! Map-local override engine
//!
//! A key → canned-response table. Matching requests are answered locally
//! before they ever reach the upstream, every time, until the rule is
//! removed.

pub mod engine;

pub use engine::{MapLocalEngine, OverrideRule, OVERRIDE_MARKER_HEADER};
