//! Sensor feed descriptors and endpoint rendering.

use serde::{Deserialize, Serialize};

pub const FIRMS_BASE_URL: &str = "https://firms.modaps.eosdis.nasa.gov";

/// FIRMS area API, CSV flavour.
pub const AREA_CSV_TEMPLATE: &str = "{base}/api/area/csv/{key}/{source}/{area}/{days}";

/// Area parameter selecting the whole globe.
pub const WORLD_AREA: &str = "world";

/// One configured feed: what to request and how to label its detections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorSource {
    /// Feed identifier sent to the API (e.g. `VIIRS_SNPP_NRT`).
    pub feed_id: String,
    /// Label written into every observation's `sensor` field.
    pub label: String,
    /// URL template with `{base}`, `{key}`, `{source}`, `{area}` and `{days}`
    /// placeholders.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
}

fn default_endpoint() -> String {
    AREA_CSV_TEMPLATE.to_string()
}

/// Values substituted into an endpoint template.
#[derive(Debug, Clone)]
pub struct EndpointParams<'a> {
    pub base_url: &'a str,
    pub map_key: &'a str,
    pub area: &'a str,
    pub days: u32,
}

impl SensorSource {
    pub fn new(feed_id: &str, label: &str) -> Self {
        Self {
            feed_id: feed_id.to_string(),
            label: label.to_string(),
            endpoint: default_endpoint(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = endpoint.to_string();
        self
    }

    pub fn endpoint_url(&self, params: &EndpointParams<'_>) -> String {
        self.endpoint
            .replace("{base}", params.base_url.trim_end_matches('/'))
            .replace("{key}", params.map_key)
            .replace("{source}", &self.feed_id)
            .replace("{area}", params.area)
            .replace("{days}", &params.days.to_string())
    }
}

/// The near-real-time FIRMS feeds queried when no sources are configured.
pub fn default_sources() -> Vec<SensorSource> {
    vec![
        SensorSource::new("MODIS_NRT", "MODIS"),
        SensorSource::new("VIIRS_SNPP_NRT", "VIIRS S-NPP"),
        SensorSource::new("VIIRS_NOAA20_NRT", "VIIRS NOAA-20"),
        SensorSource::new("VIIRS_NOAA21_NRT", "VIIRS NOAA-21"),
    ]
}
