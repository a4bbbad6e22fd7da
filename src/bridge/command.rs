// src/bridge/command.rs
//! Controller → core command grammar

use crate::flow::exchange::{Headers, RequestEdit, ResponseEdit};
use crate::replay::orchestrator::RetryOverrides;
use crate::shaping::profile::TrafficProfile;
use crate::utils::errors::{CoreError, Result};
use serde::Deserialize;

/// One controller command, tagged by its `type` field
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    /// Set an override rule keyed by the named exchange's current key,
    /// and re-apply it to that exchange immediately
    MockResponse {
        id: String,
        #[serde(default)]
        body: String,
        status: Option<u16>,
        headers: Option<Headers>,
    },

    /// Set (or, with `enabled=false`, remove) an override rule by key
    MockRule {
        key: String,
        #[serde(default)]
        body: String,
        #[serde(default = "default_status")]
        status: u16,
        #[serde(default)]
        headers: Headers,
        #[serde(default = "default_enabled")]
        enabled: bool,
    },

    /// Remove an override rule and clear any live response under its key
    DeleteRule { key: String },

    /// Rewrite a live exchange's request body/headers, no persistent rule
    MockRequest {
        id: String,
        #[serde(default)]
        body: String,
        headers: Option<Headers>,
    },

    /// Set or clear breakpoint flags for a key
    BreakpointRule {
        key: String,
        #[serde(default)]
        request: bool,
        #[serde(default)]
        response: bool,
    },

    /// Release a suspended exchange, with optional edits.
    /// `phase` stays a free string so unknown phases can fail open.
    BreakpointContinue {
        id: String,
        phase: String,
        request: Option<RequestEdit>,
        response: Option<ResponseEdit>,
    },

    /// Clone and resubmit an exchange
    RetryFlow {
        id: String,
        #[serde(flatten)]
        overrides: RetryOverrides,
    },

    /// Replace the active shaping profile
    TrafficProfile { profile: TrafficProfile },
}

fn default_status() -> u16 {
    200
}

fn default_enabled() -> bool {
    true
}

/// Parse one protocol line into a command
pub fn parse_command(line: &str) -> Result<Command> {
    serde_json::from_str(line).map_err(|e| CoreError::Protocol(e.to_string()))
}
