//! CSV parser for FIRMS area feeds.
//!
//! A feed payload is a header line followed by one detection per line. The
//! parser is deliberately lenient: it never fails, it only yields fewer
//! records. Numeric coercion happens later in
//! [`Observation::from_record`](crate::observation::Observation::from_record).

use csv::{ReaderBuilder, Trim};
use tracing::debug;

/// One data row, keyed by the header names of the payload.
///
/// Fields keep the header order. A row shorter than the header simply lacks
/// the trailing fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedRecord {
    fields: Vec<(String, String)>,
}

impl FeedRecord {
    pub fn new(fields: Vec<(String, String)>) -> Self {
        Self { fields }
    }

    /// Returns the raw value of `name`, if the row has that field.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Parses a delimited-text payload into records.
///
/// Empty input and header-only payloads yield an empty vector. Blank lines
/// and rows made only of empty cells (`,,`) are skipped. Cells past the
/// header width are dropped.
pub fn parse(raw: &str) -> Vec<FeedRecord> {
    let raw = raw.strip_prefix('\u{feff}').unwrap_or(raw);

    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(Trim::Headers)
        .from_reader(raw.as_bytes());

    let headers = match rdr.headers() {
        Ok(headers) => headers.clone(),
        Err(e) => {
            debug!(error = %e, "Unreadable header line, treating payload as empty");
            return Vec::new();
        }
    };

    if headers.iter().all(str::is_empty) {
        return Vec::new();
    }

    let mut records = Vec::new();

    for (row, result) in rdr.records().enumerate() {
        let row_data = match result {
            Ok(r) => r,
            Err(e) => {
                debug!(row, error = %e, "Skipping unreadable row");
                continue;
            }
        };

        if row_data.iter().all(|cell| cell.trim().is_empty()) {
            continue;
        }

        let fields = headers
            .iter()
            .zip(row_data.iter())
            .map(|(h, v)| (h.to_string(), v.to_string()))
            .collect();

        records.push(FeedRecord::new(fields));
    }

    records
}
