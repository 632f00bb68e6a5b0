//! Engine Configuration
//!
//! Tunables for the execution coordinator and the analytics aggregator.
//! Every field has a default, so a config file only needs the values it
//! overrides.
//!
//! ```yaml
//! completionDelayMs: 500
//! analytics:
//!   bottleneckDelaySecs: 1800
//!   bottleneckMinOccurrences: 1
//! ```

use std::fs;
use std::path::Path;
use std::time::Duration;

use log::info;
use serde::{Deserialize, Serialize};

use crate::workflow::LoadError;

/// Default turnaround simulated for an executed step.
pub const DEFAULT_COMPLETION_DELAY_MS: u64 = 2000;

/// Top-level engine configuration.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Delay before an executed step is completed in the background
    pub completion_delay_ms: u64,

    pub analytics: AnalyticsConfig,
}

impl EngineConfig {
    pub fn completion_delay(&self) -> Duration {
        Duration::from_millis(self.completion_delay_ms)
    }

    /// Sets the completion delay.
    pub fn with_completion_delay(mut self, delay: Duration) -> Self {
        self.completion_delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Loads configuration from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, LoadError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let config: EngineConfig = serde_yaml::from_str(&content)?;
        info!("Loaded engine configuration from {}", path.display());
        Ok(config)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            completion_delay_ms: DEFAULT_COMPLETION_DELAY_MS,
            analytics: AnalyticsConfig::default(),
        }
    }
}

/// Bottleneck detection thresholds.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct AnalyticsConfig {
    /// A module is a bottleneck candidate when its average in-progress
    /// time exceeds this many seconds
    pub bottleneck_delay_secs: f64,

    /// ...and its steps completed last in more than this many workflows
    pub bottleneck_min_occurrences: usize,

    /// Delay / threshold ratio from which impact is `medium`
    pub medium_impact_ratio: f64,

    /// Delay / threshold ratio from which impact is `high`
    pub high_impact_ratio: f64,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            bottleneck_delay_secs: 3600.0,
            bottleneck_min_occurrences: 0,
            medium_impact_ratio: 2.0,
            high_impact_ratio: 3.0,
        }
    }
}
