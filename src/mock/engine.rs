// src/mock/engine.rs
//! Override rule table and response synthesis

use crate::flow::exchange::{FlowHandle, Headers, HttpResponse};
use bytes::Bytes;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Marker header identifying a response as a local override
pub const OVERRIDE_MARKER_HEADER: &str = "X-Map-Local";

/// Canned response substituted for real upstream traffic matching a key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverrideRule {
    #[serde(default)]
    pub body: String,

    #[serde(default)]
    pub headers: Headers,

    #[serde(default = "default_status")]
    pub status: u16,
}

fn default_status() -> u16 {
    200
}

impl Default for OverrideRule {
    fn default() -> Self {
        Self {
            body: String::new(),
            headers: Headers::new(),
            status: default_status(),
        }
    }
}

/// Key → override rule table
pub struct MapLocalEngine {
    rules: DashMap<String, OverrideRule>,
}

impl MapLocalEngine {
    pub fn new() -> Self {
        Self {
            rules: DashMap::new(),
        }
    }

    /// Create or update the rule for a key
    pub fn set_rule(&self, key: impl Into<String>, rule: OverrideRule) {
        let key = key.into();
        info!(key = %key, status = rule.status, "map-local rule set");
        self.rules.insert(key, rule);
    }

    /// Remove the rule for a key, returning it if present
    pub fn remove_rule(&self, key: &str) -> Option<OverrideRule> {
        let removed = self.rules.remove(key).map(|(_, rule)| rule);
        if removed.is_some() {
            info!(key = %key, "map-local rule removed");
        }
        removed
    }

    pub fn rule_for(&self, key: &str) -> Option<OverrideRule> {
        self.rules.get(key).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Synthesize the rule's response onto an exchange.
    ///
    /// A `Content-Type: application/json` is injected when the rule carries
    /// none, and the override marker header is always added.
    pub fn apply(&self, handle: &FlowHandle, rule: &OverrideRule) {
        let mut headers = rule.headers.clone();
        if !headers.contains("content-type") {
            headers.set("Content-Type", "application/json");
        }
        headers.set(OVERRIDE_MARKER_HEADER, "true");

        let mut exchange = handle.write();
        exchange.response = Some(HttpResponse {
            status: rule.status,
            headers,
            body: Bytes::from(rule.body.clone().into_bytes()),
        });
        debug!(id = %exchange.id, status = rule.status, "map-local response applied");
        metrics::counter!("flowbridge_map_local_applied_total").increment(1);
    }

    /// Apply the matching rule for this exchange's key, if any.
    /// Returns whether the request was short-circuited.
    pub fn apply_if_matched(&self, handle: &FlowHandle) -> bool {
        let key = handle.read().key();
        match self.rule_for(&key) {
            Some(rule) => {
                debug!(key = %key, "map-local rule matched");
                self.apply(handle, &rule);
                true
            }
            None => false,
        }
    }
}

impl Default for MapLocalEngine {
    fn default() -> Self {
        Self::new()
    }
}
