//! Run configuration and static ceilings.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::model::Surface;

/// Maximum nesting of action calls inside one execution context.
pub const MAX_CALL_DEPTH: usize = 100;

/// Maximum depth of cascaded creations and raised-event dispatch.
pub const MAX_CASCADE_DEPTH: usize = 20;

/// Random draws tried before falling back to enumerating index values.
pub const INDEX_VALUE_ATTEMPTS: usize = 100;

/// Settings for one simulation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Upper bound on top-level steps.
    pub max_steps: usize,
    /// PRNG seed; a run is reproducible from (model, seed, max_steps).
    pub seed: u64,
    /// Stop at the end of the first step that recorded a violation.
    pub stop_on_violation: bool,
    /// Optional restriction of the model to a subset of classes.
    pub surface: Option<Surface>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            max_steps: 100,
            seed: 42,
            stop_on_violation: false,
            surface: None,
        }
    }
}

impl SimulationConfig {
    /// Validate the configuration.
    ///
    /// This must be called before constructing a `SimulationEngine`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_steps == 0 {
            return Err(ConfigError::InvalidConfig {
                reason: "max_steps must be > 0".to_string(),
            });
        }
        if let Some(surface) = &self.surface {
            if surface.classes.is_empty() {
                return Err(ConfigError::InvalidConfig {
                    reason: "surface must name at least one class".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Parses a JSON config; missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json).map_err(|e| ConfigError::InvalidConfig {
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    #[must_use]
    pub const fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    #[must_use]
    pub const fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    #[must_use]
    pub const fn with_stop_on_violation(mut self, stop: bool) -> Self {
        self.stop_on_violation = stop;
        self
    }

    #[must_use]
    pub fn with_surface(mut self, surface: Surface) -> Self {
        self.surface = Some(surface);
        self
    }
}
