// src/shaping/mod.rs
//! Traffic shaping: simulated network conditions
//!
//! Exactly one profile is active process-wide. The sentinel "disabled"
//! profile turns all shaping off. Each exchange reads the active profile
//! once per phase, so a profile swap never tears mid-measurement.

pub mod profile;
pub mod shaper;

pub use profile::{TrafficProfile, DISABLED_PROFILE_ID};
pub use shaper::{Downlink, TrafficShaper, LOSS_BODY, LOSS_STATUS, PROFILE_HEADER};
