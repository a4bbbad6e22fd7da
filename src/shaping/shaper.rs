// src/shaping/shaper.rs
//! Hot-path traffic simulation
//!
//! All sleeps run on the per-exchange task; the shaper itself holds no
//! lock across an await. Bandwidth model: kbps × 125 = bytes/sec
//! (1000 bits/sec ÷ 8), delay = bytes / bytes-per-second.

use crate::shaping::profile::TrafficProfile;
use parking_lot::{Mutex, RwLock};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Status code of a loss-substituted response
pub const LOSS_STATUS: u16 = 598;

/// Fixed plaintext body of a loss-substituted response
pub const LOSS_BODY: &str = "Simulated packet loss (flowbridge traffic shaping)";

/// Header naming the profile that shaped a response
pub const PROFILE_HEADER: &str = "X-Traffic-Profile";

/// Outcome of downlink shaping for one response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Downlink {
    /// Shaping disabled, response untouched
    Untouched,

    /// Delays applied; response should be tagged with the profile id
    Shaped { profile_id: String },

    /// Simulated loss; response must be replaced with the synthetic 598
    Dropped { profile_id: String },
}

/// Applies the active profile's delays and loss on the hot path
pub struct TrafficShaper {
    /// Whole-object atomic swap; readers clone the Arc once per phase
    profile: RwLock<Arc<TrafficProfile>>,

    /// Loss RNG, seedable for deterministic tests
    rng: Mutex<StdRng>,
}

impl TrafficShaper {
    pub fn new() -> Self {
        Self {
            profile: RwLock::new(Arc::new(TrafficProfile::disabled())),
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    pub fn with_seed(seed: u64) -> Self {
        Self {
            profile: RwLock::new(Arc::new(TrafficProfile::disabled())),
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Replace the active profile (sanitized on the way in)
    pub fn set_profile(&self, profile: TrafficProfile) {
        let profile = profile.sanitize();
        info!(
            id = %profile.id,
            name = %profile.name,
            latency_ms = profile.latency_ms,
            packet_loss = profile.packet_loss,
            "traffic profile activated"
        );
        *self.profile.write() = Arc::new(profile);
    }

    /// Snapshot of the active profile
    pub fn active_profile(&self) -> Arc<TrafficProfile> {
        Arc::clone(&self.profile.read())
    }

    /// Uplink insertion point: delay before the request leaves
    pub async fn shape_upstream(&self, request_bytes: usize) {
        let profile = self.active_profile();
        if profile.is_disabled() {
            return;
        }

        self.sleep_latency(&profile).await;
        let delay = bandwidth_delay(request_bytes, profile.upstream_kbps);
        if !delay.is_zero() {
            debug!(bytes = request_bytes, ?delay, "uplink bandwidth delay");
            tokio::time::sleep(delay).await;
        }
    }

    /// Downlink insertion point: delay, maybe drop, before the response
    /// is released
    pub async fn shape_downstream(&self, response_bytes: usize) -> Downlink {
        let profile = self.active_profile();
        if profile.is_disabled() {
            return Downlink::Untouched;
        }

        self.sleep_latency(&profile).await;

        if profile.packet_loss > 0.0 && self.roll() < profile.packet_loss {
            debug!(profile = %profile.id, "simulated packet loss");
            metrics::counter!("flowbridge_simulated_losses_total").increment(1);
            return Downlink::Dropped {
                profile_id: profile.id.clone(),
            };
        }

        let delay = bandwidth_delay(response_bytes, profile.downstream_kbps);
        if !delay.is_zero() {
            debug!(bytes = response_bytes, ?delay, "downlink bandwidth delay");
            tokio::time::sleep(delay).await;
        }

        Downlink::Shaped {
            profile_id: profile.id.clone(),
        }
    }

    async fn sleep_latency(&self, profile: &TrafficProfile) {
        let delay = self.latency_delay(profile);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    /// Latency ± uniform jitter, floored at zero
    fn latency_delay(&self, profile: &TrafficProfile) -> Duration {
        let jitter = if profile.jitter_ms > 0.0 {
            self.rng.lock().gen_range(-profile.jitter_ms..=profile.jitter_ms)
        } else {
            0.0
        };
        let ms = (profile.latency_ms + jitter).max(0.0);
        Duration::from_secs_f64(ms / 1000.0)
    }

    /// Uniform sample in [0, 1) for the loss decision
    pub(crate) fn roll(&self) -> f64 {
        self.rng.lock().gen::<f64>()
    }
}

impl Default for TrafficShaper {
    fn default() -> Self {
        Self::new()
    }
}

/// Transfer delay for `bytes` at `kbps`. Zero bytes or a non-positive
/// rate means no delay (unlimited), not an error.
pub(crate) fn bandwidth_delay(bytes: usize, kbps: f64) -> Duration {
    if bytes == 0 || kbps <= 0.0 || !kbps.is_finite() {
        return Duration::ZERO;
    }
    let bytes_per_sec = kbps * 125.0;
    Duration::from_secs_f64(bytes as f64 / bytes_per_sec)
}
