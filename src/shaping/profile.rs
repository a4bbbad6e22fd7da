// src/shaping/profile.rs
//! Shaping profile: a named bundle of latency/jitter/bandwidth/loss

use serde::{Deserialize, Serialize};

/// Sentinel profile id that disables all shaping
pub const DISABLED_PROFILE_ID: &str = "disabled";

/// Simulated network conditions applied to every non-loopback exchange
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrafficProfile {
    pub id: String,
    pub name: String,
    pub description: String,

    /// Fixed one-way delay per phase (milliseconds)
    pub latency_ms: f64,

    /// Uniform jitter amplitude around the latency (milliseconds)
    pub jitter_ms: f64,

    /// Downlink throughput cap (kbit/s); 0 means unlimited
    pub downstream_kbps: f64,

    /// Uplink throughput cap (kbit/s); 0 means unlimited
    pub upstream_kbps: f64,

    /// Probability in [0, 1] of substituting a response with simulated loss
    pub packet_loss: f64,
}

impl Default for TrafficProfile {
    fn default() -> Self {
        Self::disabled()
    }
}

impl TrafficProfile {
    /// The all-zero "off" profile
    pub fn disabled() -> Self {
        Self {
            id: DISABLED_PROFILE_ID.to_string(),
            name: "Disabled".to_string(),
            description: "No traffic shaping".to_string(),
            latency_ms: 0.0,
            jitter_ms: 0.0,
            downstream_kbps: 0.0,
            upstream_kbps: 0.0,
            packet_loss: 0.0,
        }
    }

    pub fn is_disabled(&self) -> bool {
        self.id == DISABLED_PROFILE_ID
    }

    /// Clamp fields into their documented domains.
    ///
    /// Missing numeric fields already default to 0 on deserialization;
    /// here negative and non-finite values are floored to 0 and
    /// `packet_loss` is clamped to [0, 1].
    pub fn sanitize(mut self) -> Self {
        self.latency_ms = non_negative(self.latency_ms);
        self.jitter_ms = non_negative(self.jitter_ms);
        self.downstream_kbps = non_negative(self.downstream_kbps);
        self.upstream_kbps = non_negative(self.upstream_kbps);
        self.packet_loss = non_negative(self.packet_loss).min(1.0);
        self
    }
}

fn non_negative(value: f64) -> f64 {
    if value.is_finite() {
        value.max(0.0)
    } else {
        0.0
    }
}
