//! Feed retrieval over HTTP.

mod basic;
mod client;

pub use basic::BasicClient;
pub use client::HttpClient;

use std::time::Duration;
use tracing::debug;

use crate::error::FetchError;

/// Performs one GET against `url` and returns the body as text.
///
/// Transport errors, an unparseable URL and an expired `timeout` all map to
/// [`FetchError::Transport`]; a non-2xx status maps to
/// [`FetchError::Status`]. There is no retry.
#[tracing::instrument(skip_all, fields(sensor = %sensor))]
pub async fn fetch_text<C: HttpClient + ?Sized>(
    client: &C,
    sensor: &str,
    url: &str,
    timeout: Option<Duration>,
) -> Result<String, FetchError> {
    let transport = |reason: String| FetchError::Transport {
        sensor: sensor.to_string(),
        reason,
    };

    let url = reqwest::Url::parse(url).map_err(|e| transport(format!("invalid endpoint: {e}")))?;

    let request = async {
        let req = reqwest::Request::new(reqwest::Method::GET, url);
        let resp = client
            .execute(req)
            .await
            .map_err(|e| transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                sensor: sensor.to_string(),
                status,
            });
        }

        let body = resp.text().await.map_err(|e| transport(e.to_string()))?;
        debug!(bytes = body.len(), "Feed body received");
        Ok(body)
    };

    match timeout {
        Some(limit) => tokio::time::timeout(limit, request)
            .await
            .map_err(|_| transport(format!("timed out after {:?}", limit)))?,
        None => request.await,
    }
}
