use serde::Serialize;

/// Row accounting for one source during a pipeline run.
///
/// `rows = invalid_coordinates + outside_region + outside_window + retained`.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct SourceStats {
    pub sensor: String,
    pub feed_id: Option<String>,
    pub payload_bytes: usize,
    pub rows: usize,
    pub invalid_coordinates: usize,
    pub outside_region: usize,
    pub outside_window: usize,
    pub retained: usize,
}

impl SourceStats {
    pub fn new(sensor: &str) -> Self {
        Self {
            sensor: sensor.to_string(),
            ..Self::default()
        }
    }

    pub fn with_feed_id(mut self, feed_id: &str) -> Self {
        self.feed_id = Some(feed_id.to_string());
        self
    }

    /// Rows dropped for any reason.
    pub fn dropped(&self) -> usize {
        self.invalid_coordinates + self.outside_region + self.outside_window
    }
}
