// src/utils/config.rs
//! Control-plane configuration
//!
//! Defaults are usable out of the box; every field can be overridden via
//! `FLOWBRIDGE_*` environment variables (e.g. `FLOWBRIDGE_REGISTRY_CAPACITY`).

use crate::utils::errors::Result;
use config::{Config, Environment};
use serde::{Deserialize, Serialize};

/// Runtime configuration for the control plane
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Maximum number of live exchanges kept in the flow registry.
    /// Oldest entries are evicted first once the cap is reached.
    pub registry_capacity: usize,

    /// Optional timeout for a suspended breakpoint (milliseconds).
    /// Unset means a suspended exchange waits indefinitely for a
    /// `breakpoint_continue`, matching the documented protocol behavior.
    /// When set, a phase not continued in time is auto-released unmodified.
    pub breakpoint_timeout_ms: Option<u64>,

    /// Optional seed for the packet-loss RNG, for reproducible shaping runs
    pub shaper_seed: Option<u64>,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            registry_capacity: 4096,
            breakpoint_timeout_ms: None,
            shaper_seed: None,
        }
    }
}

impl CoreConfig {
    /// Load configuration from defaults plus environment overrides
    pub fn load() -> Result<Self> {
        let cfg = Config::builder()
            .set_default("registry_capacity", 4096_i64)?
            .add_source(Environment::with_prefix("FLOWBRIDGE").try_parsing(true))
            .build()?;

        Ok(cfg.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CoreConfig::default();
        assert_eq!(config.registry_capacity, 4096);
        assert!(config.breakpoint_timeout_ms.is_none());
        assert!(config.shaper_seed.is_none());
    }

    #[test]
    fn test_load_without_env() {
        let config = CoreConfig::load().unwrap();
        assert_eq!(config.registry_capacity, 4096);
    }
}
