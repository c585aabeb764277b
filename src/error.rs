//! Error types for feed retrieval, region loading and configuration.

use std::path::PathBuf;
use thiserror::Error;

/// A single feed could not be retrieved.
///
/// Every variant carries the label of the sensor whose fetch failed.
#[derive(Error, Debug)]
pub enum FetchError {
    /// Connection, DNS, TLS, body read, timeout or malformed endpoint.
    #[error("{sensor}: transport failure: {reason}")]
    Transport { sensor: String, reason: String },

    #[error("{sensor}: feed returned HTTP {status}")]
    Status {
        sensor: String,
        status: reqwest::StatusCode,
    },

    /// The task driving the fetch panicked or was cancelled.
    #[error("{sensor}: fetch task did not complete: {reason}")]
    Task { sensor: String, reason: String },

    /// The source was rejected before any request was made. `sensor` holds
    /// the feed id when the label itself is unusable.
    #[error("{sensor}: invalid source: {reason}")]
    InvalidSource { sensor: String, reason: String },
}

impl FetchError {
    pub fn sensor(&self) -> &str {
        match self {
            FetchError::Transport { sensor, .. }
            | FetchError::Status { sensor, .. }
            | FetchError::Task { sensor, .. }
            | FetchError::InvalidSource { sensor, .. } => sensor,
        }
    }
}

/// The pipeline failed as a whole because one of its sources failed.
#[derive(Error, Debug)]
#[error("feed aggregation failed: {0}")]
pub struct AggregateFailure(#[from] pub FetchError);

impl AggregateFailure {
    pub fn fetch_error(&self) -> &FetchError {
        &self.0
    }
}

#[derive(Error, Debug)]
pub enum RegionError {
    #[error("IO error reading region {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid GeoJSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid region geometry: {reason}")]
    InvalidGeometry { reason: String },

    #[error("Region contains no polygon geometry")]
    Empty,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error reading config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    Invalid { message: String },
}
