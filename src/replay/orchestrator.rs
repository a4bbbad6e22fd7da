// src/replay/orchestrator.rs
//! Clone-and-resubmit orchestration

use crate::engine::EngineHandle;
use crate::flow::exchange::{FlowHandle, Headers};
use crate::flow::registry::FlowRegistry;
use crate::utils::errors::{CoreError, Result};
use bytes::Bytes;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};
use ulid::Ulid;

/// Optional edits applied to a retried exchange. Omitted fields keep the
/// clone's values, except the body, which is always set (default empty).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RetryOverrides {
    pub method: Option<String>,
    pub url: Option<String>,
    pub headers: Option<Headers>,
    #[serde(default)]
    pub body: String,
}

/// Clones finished exchanges and hands them back to the engine
pub struct RetryOrchestrator {
    registry: Arc<FlowRegistry>,
    engine: Arc<dyn EngineHandle>,
}

impl RetryOrchestrator {
    pub fn new(registry: Arc<FlowRegistry>, engine: Arc<dyn EngineHandle>) -> Self {
        Self { registry, engine }
    }

    /// Clone the named exchange, apply overrides, register the clone under
    /// a fresh id and its (possibly changed) key, and resubmit it.
    ///
    /// The original exchange is never modified. Engine rejection is
    /// reported as an error; the clone stays registered either way so the
    /// controller can inspect what was attempted.
    pub fn retry(&self, original_id: &str, overrides: &RetryOverrides) -> Result<FlowHandle> {
        let Some(original) = self.registry.lookup_by_id(original_id) else {
            warn!(id = %original_id, "retry for unknown flow");
            return Err(CoreError::UnknownFlow(original_id.to_string()));
        };

        let mut clone = original.read().clone();
        clone.id = Ulid::new().to_string();
        clone.response = None;

        let method = overrides
            .method
            .clone()
            .unwrap_or_else(|| clone.request.method.clone());
        clone.request.method = if method.is_empty() {
            "GET".to_string()
        } else {
            method.to_ascii_uppercase()
        };

        if let Some(url) = &overrides.url {
            if !url.is_empty() {
                clone.request.url = url.clone();
            }
        }
        clone.request.body = Bytes::from(overrides.body.clone().into_bytes());
        if let Some(headers) = &overrides.headers {
            if !headers.is_empty() {
                clone.request.headers = headers.clone();
            }
        }

        let handle = clone.into_handle();
        self.registry.register(&handle);

        let (new_id, key) = {
            let exchange = handle.read();
            (exchange.id.clone(), exchange.key())
        };

        match self.engine.replay_as_client(Arc::clone(&handle)) {
            Ok(()) => {
                info!(original_id = %original_id, new_id = %new_id, key = %key, "retry resubmitted");
                metrics::counter!("flowbridge_replays_total").increment(1);
                Ok(handle)
            }
            Err(err) => {
                warn!(original_id = %original_id, new_id = %new_id, error = %err, "retry rejected by engine");
                metrics::counter!("flowbridge_replay_failures_total").increment(1);
                Err(CoreError::ReplayFailed(err.to_string()))
            }
        }
    }
}
