use serde::{Deserialize, Serialize};

use crate::error::{Result, UiError};

/// Engine configuration.
///
/// All fields have defaults, so a partial TOML document (or none at all)
/// is enough to construct a working settings value.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UiSettings {
    /// How many idle instances the pool retains per template key.
    /// Zero disables pooling for every key: each closed instance is
    /// destroyed immediately.
    pub pool_capacity_per_key: usize,

    /// Minimum capacity added when the navigation stack outgrows its
    /// backing storage. Must be at least 1.
    pub stack_min_growth: usize,

    /// Close every view and drop all cached templates when the host
    /// signals teardown (see `UiManager::on_host_teardown`).
    pub auto_clear_on_teardown: bool,
}

impl Default for UiSettings {
    fn default() -> Self {
        Self {
            pool_capacity_per_key: 5,
            stack_min_growth: 5,
            auto_clear_on_teardown: true,
        }
    }
}

impl UiSettings {
    /// Parse settings from a TOML document and validate them.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let settings: UiSettings = toml::from_str(raw).map_err(|err| UiError::InvalidSettings {
            reason: err.to_string(),
        })?;
        settings.validate()?;
        Ok(settings)
    }

    /// Check invariants that the type system cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.stack_min_growth == 0 {
            return Err(UiError::InvalidSettings {
                reason: "stack_min_growth must be at least 1".into(),
            });
        }
        Ok(())
    }
}
