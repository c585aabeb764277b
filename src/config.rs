//! Run configuration.
//!
//! Settings are read from an optional JSON file; every field has a default:
//! ```json
//! {
//!   "base_url": "https://firms.modaps.eosdis.nasa.gov",
//!   "sources": [
//!     { "feed_id": "MODIS_NRT", "label": "MODIS" },
//!     { "feed_id": "VIIRS_SNPP_NRT", "label": "VIIRS S-NPP" }
//!   ],
//!   "window": "24h",
//!   "default_days": 1,
//!   "scope": "world",
//!   "timeout_secs": 60,
//!   "max_concurrency": 8,
//!   "region": "regions/brazil.geojson"
//! }
//! ```
//! The access key never lives in the file; it comes from `FIRMS_MAP_KEY`.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;
use crate::pipeline::{FeedScope, PipelineOptions};
use crate::source::{FIRMS_BASE_URL, SensorSource, default_sources};
use crate::window::{MAX_FEED_DAYS, TimeWindow};

pub const MAP_KEY_ENV: &str = "FIRMS_MAP_KEY";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    pub base_url: String,
    pub sources: Vec<SensorSource>,
    pub window: TimeWindow,
    pub default_days: u32,
    pub scope: FeedScope,
    /// Per-fetch deadline; `0` disables it.
    pub timeout_secs: u64,
    pub max_concurrency: usize,
    /// GeoJSON region of interest. `None` means the whole globe.
    pub region: Option<PathBuf>,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            base_url: FIRMS_BASE_URL.to_string(),
            sources: default_sources(),
            window: TimeWindow::All,
            default_days: 1,
            scope: FeedScope::World,
            timeout_secs: 60,
            max_concurrency: 8,
            region: None,
        }
    }
}

impl AggregatorConfig {
    /// Loads and validates the config from a JSON file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&content)
    }

    pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |message: String| Err(ConfigError::Invalid { message });

        if self.sources.is_empty() {
            return invalid("no sources configured".to_string());
        }

        let mut labels = HashSet::new();
        for source in &self.sources {
            if source.feed_id.trim().is_empty() {
                return invalid(format!("source '{}' has an empty feed_id", source.label));
            }
            if source.label.trim().is_empty() {
                return invalid(format!("source '{}' has an empty label", source.feed_id));
            }
            if !labels.insert(source.label.as_str()) {
                return invalid(format!("duplicate source label '{}'", source.label));
            }
        }

        if !(1..=MAX_FEED_DAYS).contains(&self.default_days) {
            return invalid(format!(
                "default_days must be between 1 and {MAX_FEED_DAYS}, got {}",
                self.default_days
            ));
        }

        if self.max_concurrency == 0 {
            return invalid("max_concurrency must be at least 1".to_string());
        }

        Ok(())
    }

    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }

    pub fn pipeline_options(&self, map_key: String) -> PipelineOptions {
        PipelineOptions {
            base_url: self.base_url.clone(),
            map_key,
            scope: self.scope,
            default_days: self.default_days,
            timeout: self.timeout(),
            max_concurrency: self.max_concurrency,
        }
    }
}

/// Reads the FIRMS access key from the environment.
pub fn map_key_from_env() -> Result<String, ConfigError> {
    match std::env::var(MAP_KEY_ENV) {
        Ok(key) if !key.trim().is_empty() => Ok(key.trim().to_string()),
        _ => Err(ConfigError::Invalid {
            message: format!("{MAP_KEY_ENV} must be set"),
        }),
    }
}
