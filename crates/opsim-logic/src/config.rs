//! Mission configuration shared by every mission built in a session.
//!
//! ```
//! use opsim_logic::config::{validate_config, MissionConfig};
//!
//! let config = MissionConfig::default();
//! assert!(validate_config(&config).is_empty());
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::action::ActionDraft;

/// Knobs that are not part of a mission document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MissionConfig {
    /// RNG seed used when a document does not carry its own.
    pub seed: u64,
    /// Reject a second `execute()` while any completion is pending.
    pub exclusive_execution: bool,
    /// Upper bound on pre-rolled outcomes per action. Also the attempt count
    /// for zero-cost actions, which would otherwise be unbounded.
    pub pre_roll_cap: u32,
    /// Action synthesized when a node with no actions becomes executable.
    pub default_action: ActionDraft,
}

impl Default for MissionConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            exclusive_execution: true,
            pre_roll_cap: 100,
            default_action: ActionDraft::default(),
        }
    }
}

impl MissionConfig {
    /// Parse a config from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Configuration validation error.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("pre-roll cap must be at least 1")]
    ZeroPreRollCap,
    #[error("default action success chance {0} is outside [0, 1]")]
    DefaultSuccessChance(f64),
    #[error("default action resource cost {0} is negative or not finite")]
    DefaultResourceCost(f64),
    #[error("default action name is empty")]
    EmptyDefaultName,
}

/// Validate a mission configuration, returning all errors found.
pub fn validate_config(config: &MissionConfig) -> Vec<ConfigError> {
    let mut errors = Vec::new();

    if config.pre_roll_cap == 0 {
        errors.push(ConfigError::ZeroPreRollCap);
    }

    let action = &config.default_action;
    if !(0.0..=1.0).contains(&action.success_chance) {
        errors.push(ConfigError::DefaultSuccessChance(action.success_chance));
    }
    if !action.resource_cost.is_finite() || action.resource_cost < 0.0 {
        errors.push(ConfigError::DefaultResourceCost(action.resource_cost));
    }
    if action.name.trim().is_empty() {
        errors.push(ConfigError::EmptyDefaultName);
    }

    errors
}
