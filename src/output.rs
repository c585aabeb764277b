//! Serialization of merged observations for downstream consumers.
//!
//! Supports JSON, GeoJSON (one point feature per observation) and CSV.

use anyhow::Result;
use csv::WriterBuilder;
use serde_json::{Map, Value, json};
use std::collections::BTreeSet;
use std::io::Write;
use tracing::debug;

use crate::observation::{ACQ_DATE, ACQ_TIME, LATITUDE, LONGITUDE, MergedCollection, Observation};

/// Writes the collection, including per-source stats, as pretty JSON.
pub fn write_json<W: Write>(writer: W, collection: &MergedCollection) -> Result<()> {
    serde_json::to_writer_pretty(writer, collection)?;
    Ok(())
}

/// Builds a GeoJSON `FeatureCollection` of point features.
///
/// Feed attributes become properties; `sensor`, `acq_date` and `acq_time`
/// are always set from the observation itself.
pub fn to_geojson(observations: &[Observation]) -> Value {
    let features: Vec<Value> = observations
        .iter()
        .map(|o| {
            let mut properties: Map<String, Value> = o
                .attributes
                .iter()
                .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                .collect();
            properties.insert(ACQ_DATE.to_string(), json!(o.acq_date));
            properties.insert(ACQ_TIME.to_string(), json!(o.acq_time));
            properties.insert("sensor".to_string(), json!(o.sensor));

            json!({
                "type": "Feature",
                "geometry": {
                    "type": "Point",
                    "coordinates": [o.longitude, o.latitude],
                },
                "properties": properties,
            })
        })
        .collect();

    json!({
        "type": "FeatureCollection",
        "features": features,
    })
}

pub fn write_geojson<W: Write>(writer: W, collection: &MergedCollection) -> Result<()> {
    serde_json::to_writer_pretty(writer, &to_geojson(&collection.observations))?;
    Ok(())
}

/// Writes one CSV row per observation.
///
/// Columns are the core fields followed by the sorted union of all
/// attribute names; absent attributes are left empty.
pub fn write_csv<W: Write>(writer: W, collection: &MergedCollection) -> Result<()> {
    let attribute_names: BTreeSet<&str> = collection
        .iter()
        .flat_map(|o| o.attributes.keys().map(String::as_str))
        .collect();
    debug!(
        rows = collection.len(),
        attributes = attribute_names.len(),
        "Writing CSV"
    );

    let mut writer = WriterBuilder::new().from_writer(writer);

    let mut header = vec![LATITUDE, LONGITUDE, ACQ_DATE, ACQ_TIME, "sensor"];
    header.extend(attribute_names.iter().copied());
    writer.write_record(&header)?;

    for o in collection.iter() {
        let mut row = vec![
            o.latitude.to_string(),
            o.longitude.to_string(),
            o.acq_date.clone().unwrap_or_default(),
            o.acq_time.clone().unwrap_or_default(),
            o.sensor.clone(),
        ];
        row.extend(
            attribute_names
                .iter()
                .map(|name| o.attribute(name).unwrap_or_default().to_string()),
        );
        writer.write_record(&row)?;
    }

    writer.flush()?;
    Ok(())
}
