//! Configuration for the registrar.
//!
//! The objection window and the registration fee are protocol constants and
//! deliberately not part of [`RegistrarConfig`].

use chain_id::Address;
use chrono::Duration;
use serde::{Deserialize, Serialize};

use chain_registry::events::DEFAULT_EVENT_CAPACITY;

/// Base units per native currency unit.
pub const NATIVE_UNIT: u128 = 1_000_000_000_000_000_000;

/// Minimum fee escrowed with a registration request (10 native units).
pub const REGISTRATION_FEE: u128 = 10 * NATIVE_UNIT;

/// Seconds a request must wait before it can be executed (7 days).
pub const OBJECTION_WINDOW_SECS: i64 = 7 * 24 * 60 * 60;

/// The objection window as a duration.
pub fn objection_window() -> Duration {
    Duration::seconds(OBJECTION_WINDOW_SECS)
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// YAML could not be parsed or produced
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A required address is null
    #[error("{0} must not be the null address")]
    NullAddress(&'static str),
}

/// Registrar configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrarConfig {
    /// Global authority: withdraws fees, rotates the operator, owns stores
    pub root_authority: Address,
    /// Executes and rejects requests
    pub operator: Address,
    /// The registrar's own identity; must be the registry operator
    pub controller_address: Address,
    /// Parent of every external name, e.g. `cid.eth`
    #[serde(default = "default_parent_domain")]
    pub parent_domain: String,
    /// Capacity of the shared event log
    #[serde(default = "default_event_capacity")]
    pub event_log_capacity: usize,
}

fn default_parent_domain() -> String {
    "cid.eth".to_string()
}

fn default_event_capacity() -> usize {
    DEFAULT_EVENT_CAPACITY
}

impl Default for RegistrarConfig {
    fn default() -> Self {
        Self {
            root_authority: Address::ZERO,
            operator: Address::ZERO,
            controller_address: Address::ZERO,
            parent_domain: default_parent_domain(),
            event_log_capacity: default_event_capacity(),
        }
    }
}

impl RegistrarConfig {
    /// Create a config with the three authorities set.
    pub fn new(root_authority: Address, operator: Address, controller_address: Address) -> Self {
        Self {
            root_authority,
            operator,
            controller_address,
            ..Default::default()
        }
    }

    /// Load config from YAML.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to YAML.
    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Check that every authority is set.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.root_authority.is_zero() {
            return Err(ConfigError::NullAddress("root_authority"));
        }
        if self.operator.is_zero() {
            return Err(ConfigError::NullAddress("operator"));
        }
        if self.controller_address.is_zero() {
            return Err(ConfigError::NullAddress("controller_address"));
        }
        Ok(())
    }
}
