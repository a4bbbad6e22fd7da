// src/utils/mod.rs
//! Common utilities shared across the control plane
//!
//! - **errors**: Error taxonomy and the crate-wide `Result` alias
//! - **config**: Runtime configuration with environment overrides

pub mod config;
pub mod errors;

pub use config::CoreConfig;
pub use errors::{CoreError, Result};
