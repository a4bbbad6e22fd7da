// src/breakpoint/controller.rs
//! Per-key breakpoint rules and the per-(flow, phase) waiting set

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info};

/// Exchange phase a breakpoint can apply to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Request,
    Response,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Request => "request",
            Phase::Response => "response",
        }
    }

    /// Parse a wire phase name. Deliberately open: an unknown phase maps to
    /// `None` so the caller can fail open instead of rejecting the command.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "request" => Some(Phase::Request),
            "response" => Some(Phase::Response),
            _ => None,
        }
    }
}

/// Per-key breakpoint flags. A rule with both flags cleared is removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakpointRule {
    #[serde(default)]
    pub request: bool,

    #[serde(default)]
    pub response: bool,
}

impl BreakpointRule {
    pub fn breaks_on(&self, phase: Phase) -> bool {
        match phase {
            Phase::Request => self.request,
            Phase::Response => self.response,
        }
    }

    pub fn is_empty(&self) -> bool {
        !self.request && !self.response
    }
}

/// Rule table plus waiting-set half of the breakpoint state machine.
///
/// Suspension itself lives in the engine; this tracks which (flow, phase)
/// pairs are currently parked so a release happens exactly once.
pub struct BreakpointController {
    rules: DashMap<String, BreakpointRule>,
    waiting: DashMap<(String, Phase), Instant>,
}

impl BreakpointController {
    pub fn new() -> Self {
        Self {
            rules: DashMap::new(),
            waiting: DashMap::new(),
        }
    }

    /// Set or clear the rule for a key. Both flags false removes the rule.
    pub fn set_rule(&self, key: impl Into<String>, rule: BreakpointRule) {
        let key = key.into();
        if rule.is_empty() {
            if self.rules.remove(&key).is_some() {
                info!(key = %key, "breakpoint rule removed");
            }
        } else {
            info!(key = %key, request = rule.request, response = rule.response, "breakpoint rule set");
            self.rules.insert(key, rule);
        }
    }

    pub fn rule_for(&self, key: &str) -> Option<BreakpointRule> {
        self.rules.get(key).map(|entry| *entry.value())
    }

    /// Whether a phase arriving under this key should suspend
    pub fn should_break(&self, key: &str, phase: Phase) -> bool {
        self.rule_for(key)
            .map(|rule| rule.breaks_on(phase))
            .unwrap_or(false)
    }

    /// Transition (flow, phase) from Flowing to Waiting
    pub fn mark_waiting(&self, id: &str, phase: Phase) {
        debug!(id = %id, phase = phase.as_str(), "breakpoint waiting");
        self.waiting.insert((id.to_string(), phase), Instant::now());
        metrics::counter!("flowbridge_breakpoint_suspensions_total").increment(1);
    }

    /// Transition (flow, phase) from Waiting to Released.
    /// Returns whether the pair was actually waiting, so a release fires
    /// at most once even when a timeout races a `breakpoint_continue`.
    pub fn take_waiting(&self, id: &str, phase: Phase) -> bool {
        self.waiting.remove(&(id.to_string(), phase)).is_some()
    }

    pub fn is_waiting(&self, id: &str, phase: Phase) -> bool {
        self.waiting.contains_key(&(id.to_string(), phase))
    }

    pub fn waiting_count(&self) -> usize {
        self.waiting.len()
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }
}

impl Default for BreakpointController {
    fn default() -> Self {
        Self::new()
    }
}
