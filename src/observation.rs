//! Normalized fire detections and the merged pipeline output.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::parser::FeedRecord;
use crate::stats::SourceStats;

pub const LATITUDE: &str = "latitude";
pub const LONGITUDE: &str = "longitude";
pub const ACQ_DATE: &str = "acq_date";
pub const ACQ_TIME: &str = "acq_time";

/// A single detection, tagged with the sensor it came from.
///
/// `acq_date` (`YYYY-MM-DD`) and `acq_time` (`HHMM`) are kept as the feed
/// sent them; [`crate::window`] interprets them. All other columns land in
/// `attributes` untouched.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Observation {
    pub latitude: f64,
    pub longitude: f64,
    pub acq_date: Option<String>,
    pub acq_time: Option<String>,
    pub sensor: String,
    pub attributes: BTreeMap<String, String>,
}

impl Observation {
    /// Coerces a parsed row into an observation tagged with `sensor`.
    ///
    /// Returns `None` when latitude or longitude is missing, not a finite
    /// number, or outside the WGS84 range. The label is always the one
    /// passed in, never a column of the feed.
    pub fn from_record(record: &FeedRecord, sensor: &str) -> Option<Self> {
        let latitude = parse_coordinate(record.get(LATITUDE)?, 90.0)?;
        let longitude = parse_coordinate(record.get(LONGITUDE)?, 180.0)?;

        let acq_date = non_empty(record.get(ACQ_DATE));
        let acq_time = non_empty(record.get(ACQ_TIME));

        let attributes = record
            .fields()
            .filter(|(key, _)| !matches!(*key, LATITUDE | LONGITUDE | ACQ_DATE | ACQ_TIME))
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        Some(Self {
            latitude,
            longitude,
            acq_date,
            acq_time,
            sensor: sensor.to_string(),
            attributes,
        })
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}

fn parse_coordinate(raw: &str, limit: f64) -> Option<f64> {
    let value: f64 = raw.trim().parse().ok()?;
    (value.is_finite() && value.abs() <= limit).then_some(value)
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Output of one pipeline run.
///
/// Observations are ordered by source configuration order, then by feed row
/// order. `stats` holds one entry per source in the same order.
#[derive(Debug, Default, Serialize)]
pub struct MergedCollection {
    pub observations: Vec<Observation>,
    pub stats: Vec<SourceStats>,
}

impl MergedCollection {
    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Observation> {
        self.observations.iter()
    }

    /// Number of retained observations for `sensor`.
    pub fn count_for(&self, sensor: &str) -> usize {
        self.observations.iter().filter(|o| o.sensor == sensor).count()
    }
}

impl IntoIterator for MergedCollection {
    type Item = Observation;
    type IntoIter = std::vec::IntoIter<Observation>;

    fn into_iter(self) -> Self::IntoIter {
        self.observations.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(pairs: &[(&str, &str)]) -> FeedRecord {
        FeedRecord::new(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn test_from_record_tags_and_splits_fields() {
        let rec = record(&[
            ("latitude", "-9.6145"),
            ("longitude", "31.2486"),
            ("brightness", "318.4"),
            ("acq_date", "2024-01-09"),
            ("acq_time", "0750"),
            ("satellite", "Terra"),
        ]);
        let obs = Observation::from_record(&rec, "MODIS").unwrap();

        assert_eq!(obs.latitude, -9.6145);
        assert_eq!(obs.longitude, 31.2486);
        assert_eq!(obs.sensor, "MODIS");
        assert_eq!(obs.acq_date.as_deref(), Some("2024-01-09"));
        assert_eq!(obs.acq_time.as_deref(), Some("0750"));
        assert_eq!(obs.attribute("brightness"), Some("318.4"));
        assert_eq!(obs.attribute("satellite"), Some("Terra"));
        assert!(obs.attribute("latitude").is_none());
    }

    #[test]
    fn test_sensor_column_in_feed_is_not_used_as_label() {
        let rec = record(&[
            ("latitude", "1"),
            ("longitude", "2"),
            ("sensor", "spoofed"),
        ]);
        let obs = Observation::from_record(&rec, "VIIRS").unwrap();
        assert_eq!(obs.sensor, "VIIRS");
        assert_eq!(obs.attribute("sensor"), Some("spoofed"));
    }

    #[test]
    fn test_from_record_rejects_bad_coordinates() {
        for (lat, lon) in [
            ("", "20"),
            ("10", ""),
            ("abc", "20"),
            ("NaN", "20"),
            ("10", "inf"),
            ("91", "20"),
            ("10", "-180.5"),
        ] {
            let rec = record(&[("latitude", lat), ("longitude", lon)]);
            assert!(
                Observation::from_record(&rec, "MODIS").is_none(),
                "{lat},{lon} should be rejected"
            );
        }

        let rec = record(&[("latitude", "10")]);
        assert!(Observation::from_record(&rec, "MODIS").is_none());
    }

    #[test]
    fn test_from_record_missing_time_is_none() {
        let rec = record(&[("latitude", "1"), ("longitude", "2"), ("acq_time", " ")]);
        let obs = Observation::from_record(&rec, "MODIS").unwrap();
        assert!(obs.acq_time.is_none());
        assert!(obs.acq_date.is_none());
    }

    #[test]
    fn test_merged_collection_counts() {
        let rec = record(&[("latitude", "1"), ("longitude", "2")]);
        let collection = MergedCollection {
            observations: vec![
                Observation::from_record(&rec, "A").unwrap(),
                Observation::from_record(&rec, "B").unwrap(),
                Observation::from_record(&rec, "A").unwrap(),
            ],
            stats: Vec::new(),
        };
        assert_eq!(collection.len(), 3);
        assert_eq!(collection.count_for("A"), 2);
        assert_eq!(collection.count_for("C"), 0);
        assert_eq!(collection.into_iter().count(), 3);
    }
}
