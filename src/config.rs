//! Query configuration.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::backend::BackendConfig;
use crate::candidates::validate_max_distance;
use crate::error::{Result, SkymaskError};
use crate::index::DistancePolicy;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SkymaskConfig {
    /// Candidate search radius. `None` considers every line.
    pub max_distance: Option<f64>,
    pub distance_policy: DistancePolicy,
    /// Lines with `|cross| <= degeneracy_epsilon` about the observer are
    /// treated as collinear with it.
    pub degeneracy_epsilon: f64,
    pub backend: BackendConfig,
    /// Size of a dedicated worker pool. `None` uses the global rayon pool.
    pub threads: Option<usize>,
    /// Stop a batch at the first failing position.
    pub fail_fast: bool,
}

impl Default for SkymaskConfig {
    fn default() -> Self {
        Self {
            max_distance: None,
            distance_policy: DistancePolicy::Midpoint,
            degeneracy_epsilon: 0.0,
            backend: BackendConfig::default(),
            threads: None,
            fail_fast: false,
        }
    }
}

impl SkymaskConfig {
    pub fn with_max_distance(mut self, max_distance: f64) -> Self {
        self.max_distance = Some(max_distance);
        self
    }

    pub fn with_backend(mut self, backend: BackendConfig) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_distance_policy(mut self, policy: DistancePolicy) -> Self {
        self.distance_policy = policy;
        self
    }

    pub fn max_distance(&self) -> f64 {
        self.max_distance.unwrap_or(f64::INFINITY)
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(d) = self.max_distance {
            validate_max_distance(d).map_err(|e| SkymaskError::Config(e.to_string()))?;
        }
        if !(self.degeneracy_epsilon >= 0.0 && self.degeneracy_epsilon.is_finite()) {
            return Err(SkymaskError::Config(format!(
                "degeneracy_epsilon must be finite and non-negative, got {}",
                self.degeneracy_epsilon
            )));
        }
        if self.threads == Some(0) {
            return Err(SkymaskError::Config("threads must be at least 1".to_string()));
        }
        self.backend.validate()
    }
}

/// Read a JSON configuration file. Missing fields take their defaults.
pub fn load_config(path: &Path) -> Result<SkymaskConfig> {
    let data = fs::read_to_string(path).map_err(|e| {
        SkymaskError::Config(format!("failed to read config {}: {e}", path.display()))
    })?;
    let config: SkymaskConfig = serde_json::from_str(&data).map_err(|e| {
        SkymaskError::Config(format!("failed to parse config {}: {e}", path.display()))
    })?;
    config.validate()?;
    Ok(config)
}
