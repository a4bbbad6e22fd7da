// src/engine.rs
//! Engine capability boundary
//!
//! The interception engine terminates TLS, parses HTTP, and owns the
//! low-level pause/resume primitive. The control plane only *calls* these
//! capabilities; it never implements blocking itself beyond waiting on
//! this interface.

use crate::flow::exchange::FlowHandle;
use crate::utils::errors::Result;
use tracing::debug;

/// Capabilities the interception engine exposes to the control plane
pub trait EngineHandle: Send + Sync {
    /// Park the exchange inside the engine until resumed.
    /// Blocks only the task handling that exchange, never the caller.
    fn suspend(&self, id: &str);

    /// Lift a previous suspension
    fn resume(&self, id: &str);

    /// Resubmit a cloned exchange as a new client request
    fn replay_as_client(&self, handle: FlowHandle) -> Result<()>;
}

/// Engine adapter that performs no interception.
///
/// Used when the binary runs standalone (protocol development, controller
/// testing) without a live engine behind it.
pub struct NullEngine;

impl EngineHandle for NullEngine {
    fn suspend(&self, id: &str) {
        debug!(id = %id, "suspend (no engine attached)");
    }

    fn resume(&self, id: &str) {
        debug!(id = %id, "resume (no engine attached)");
    }

    fn replay_as_client(&self, handle: FlowHandle) -> Result<()> {
        debug!(id = %handle.read().id, "replay (no engine attached)");
        Ok(())
    }
}

/// Engine double recording every capability call, for tests
#[cfg(test)]
pub struct RecordingEngine {
    pub suspended: parking_lot::Mutex<Vec<String>>,
    pub resumed: parking_lot::Mutex<Vec<String>>,
    pub replayed: parking_lot::Mutex<Vec<FlowHandle>>,
    pub fail_replay: std::sync::atomic::AtomicBool,
}

#[cfg(test)]
impl RecordingEngine {
    pub fn new() -> Self {
        Self {
            suspended: parking_lot::Mutex::new(Vec::new()),
            resumed: parking_lot::Mutex::new(Vec::new()),
            replayed: parking_lot::Mutex::new(Vec::new()),
            fail_replay: std::sync::atomic::AtomicBool::new(false),
        }
    }
}

#[cfg(test)]
impl EngineHandle for RecordingEngine {
    fn suspend(&self, id: &str) {
        self.suspended.lock().push(id.to_string());
    }

    fn resume(&self, id: &str) {
        self.resumed.lock().push(id.to_string());
    }

    fn replay_as_client(&self, handle: FlowHandle) -> Result<()> {
        if self.fail_replay.load(std::sync::atomic::Ordering::Relaxed) {
            return Err(crate::utils::errors::CoreError::ReplayFailed(
                "engine rejected resubmission".to_string(),
            ));
        }
        self.replayed.lock().push(handle);
        Ok(())
    }
}
