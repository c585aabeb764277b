//! Concurrent fetch, filter and merge of all configured feeds.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{Instrument, debug, info, warn};

use crate::error::{AggregateFailure, FetchError};
use crate::fetch::{BasicClient, HttpClient, fetch_text};
use crate::observation::{MergedCollection, Observation};
use crate::parser::parse;
use crate::region::Region;
use crate::source::{EndpointParams, FIRMS_BASE_URL, SensorSource, WORLD_AREA};
use crate::stats::SourceStats;
use crate::window::{MAX_FEED_DAYS, TimeWindow, within_window};

/// Fetches slower than this are logged as a warning.
const SLOW_FETCH: Duration = Duration::from_secs(15);

/// Spatial extent requested from the feed API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedScope {
    /// Request the whole globe and filter locally.
    #[default]
    World,
    /// Request only the region's bounding box, then filter locally.
    Region,
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub base_url: String,
    pub map_key: String,
    pub scope: FeedScope,
    /// Day range requested when the window is [`TimeWindow::All`].
    pub default_days: u32,
    /// Deadline applied to each fetch individually.
    pub timeout: Option<Duration>,
    pub max_concurrency: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            base_url: FIRMS_BASE_URL.to_string(),
            map_key: String::new(),
            scope: FeedScope::World,
            default_days: 1,
            timeout: Some(Duration::from_secs(60)),
            max_concurrency: 8,
        }
    }
}

/// Runs every configured source concurrently and merges the results.
///
/// Failure policy is all-or-nothing: the first source to fail aborts the
/// remaining fetches and fails the whole run.
pub struct AggregationPipeline<C = BasicClient> {
    client: Arc<C>,
    options: PipelineOptions,
}

impl<C: HttpClient + 'static> AggregationPipeline<C> {
    pub fn new(client: C, options: PipelineOptions) -> Self {
        Self::from_shared(Arc::new(client), options)
    }

    pub fn from_shared(client: Arc<C>, options: PipelineOptions) -> Self {
        Self { client, options }
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Same as [`AggregationPipeline::run`] with `now` taken from the clock.
    pub async fn run_now(
        &self,
        sources: &[SensorSource],
        region: Arc<Region>,
        window: TimeWindow,
    ) -> Result<MergedCollection, AggregateFailure> {
        self.run(sources, region, window, Utc::now()).await
    }

    /// Fetches, parses, tags and filters every source, then concatenates
    /// the survivors in `sources` order.
    ///
    /// The output order never depends on which fetch finishes first. A
    /// source with a blank label fails the run before anything is fetched.
    #[tracing::instrument(skip_all, fields(sources = sources.len(), window = %window))]
    pub async fn run(
        &self,
        sources: &[SensorSource],
        region: Arc<Region>,
        window: TimeWindow,
        now: DateTime<Utc>,
    ) -> Result<MergedCollection, AggregateFailure> {
        if let Some(source) = sources.iter().find(|s| s.label.trim().is_empty()) {
            return Err(AggregateFailure(FetchError::InvalidSource {
                sensor: source.feed_id.clone(),
                reason: "empty sensor label".to_string(),
            }));
        }

        let area = self.request_area(&region);
        let days = window
            .days()
            .unwrap_or(self.options.default_days)
            .clamp(1, MAX_FEED_DAYS);

        debug!(area = %area, days, "Starting feed round");

        let semaphore = Arc::new(Semaphore::new(self.options.max_concurrency.max(1)));
        let mut tasks = JoinSet::new();
        let mut labels = HashMap::new();

        for (index, source) in sources.iter().enumerate() {
            let url = source.endpoint_url(&EndpointParams {
                base_url: &self.options.base_url,
                map_key: &self.options.map_key,
                area: &area,
                days,
            });

            let client = Arc::clone(&self.client);
            let region = Arc::clone(&region);
            let sem = Arc::clone(&semaphore);
            let source = source.clone();
            let timeout = self.options.timeout;

            let feed_span = tracing::info_span!(
                "process_feed",
                feed_id = %source.feed_id,
                sensor = %source.label,
            );

            let label = source.label.clone();
            let handle = tasks.spawn(
                async move {
                    let result =
                        process_source(&*client, &source, &url, timeout, sem, &region, window, now)
                            .await;
                    (index, result)
                }
                .instrument(feed_span),
            );
            labels.insert(handle.id(), label);
        }

        let mut slots: Vec<Option<(Vec<Observation>, SourceStats)>> =
            (0..sources.len()).map(|_| None).collect();

        while let Some(joined) = tasks.join_next_with_id().await {
            let outcome = match joined {
                Ok((_, (index, result))) => result.map(|done| (index, done)),
                Err(e) => Err(FetchError::Task {
                    sensor: labels.get(&e.id()).cloned().unwrap_or_default(),
                    reason: e.to_string(),
                }),
            };

            match outcome {
                Ok((index, done)) => slots[index] = Some(done),
                Err(err) => {
                    warn!(sensor = err.sensor(), error = %err, "Feed failed, aborting round");
                    tasks.abort_all();
                    return Err(AggregateFailure(err));
                }
            }
        }

        let mut merged = MergedCollection::default();
        for (observations, stats) in slots.into_iter().flatten() {
            merged.observations.extend(observations);
            merged.stats.push(stats);
        }

        info!(observations = merged.len(), "Feed round merged");
        Ok(merged)
    }

    fn request_area(&self, region: &Region) -> String {
        match self.options.scope {
            FeedScope::World => WORLD_AREA.to_string(),
            FeedScope::Region => region
                .bounding_box()
                .map(|b| b.to_area_param())
                .unwrap_or_else(|| WORLD_AREA.to_string()),
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn process_source<C: HttpClient + ?Sized>(
    client: &C,
    source: &SensorSource,
    url: &str,
    timeout: Option<Duration>,
    semaphore: Arc<Semaphore>,
    region: &Region,
    window: TimeWindow,
    now: DateTime<Utc>,
) -> Result<(Vec<Observation>, SourceStats), FetchError> {
    let _permit = semaphore
        .acquire_owned()
        .await
        .map_err(|e| FetchError::Task {
            sensor: source.label.clone(),
            reason: e.to_string(),
        })?;

    let fetch_start = Instant::now();
    let raw = fetch_text(client, &source.label, url, timeout).await?;
    let elapsed = fetch_start.elapsed();
    if elapsed > SLOW_FETCH {
        warn!(elapsed_secs = elapsed.as_secs(), "Feed fetch was slow");
    }

    let (observations, stats) = process_payload(&source.label, &raw, region, window, now);
    Ok((observations, stats.with_feed_id(&source.feed_id)))
}

/// Parses one feed payload and keeps the rows that have valid coordinates,
/// fall inside `region` and pass `window`.
///
/// Every returned observation carries `sensor` as its label.
pub fn process_payload(
    sensor: &str,
    raw: &str,
    region: &Region,
    window: TimeWindow,
    now: DateTime<Utc>,
) -> (Vec<Observation>, SourceStats) {
    let records = parse(raw);

    let mut stats = SourceStats::new(sensor);
    stats.payload_bytes = raw.len();
    stats.rows = records.len();

    let mut observations = Vec::with_capacity(records.len());
    for record in &records {
        let Some(observation) = Observation::from_record(record, sensor) else {
            stats.invalid_coordinates += 1;
            continue;
        };
        if !region.contains(observation.latitude, observation.longitude) {
            stats.outside_region += 1;
            continue;
        }
        if !within_window(&observation, window, now) {
            stats.outside_window += 1;
            continue;
        }
        observations.push(observation);
    }
    stats.retained = observations.len();

    info!(
        rows = stats.rows,
        retained = stats.retained,
        invalid_coordinates = stats.invalid_coordinates,
        outside_region = stats.outside_region,
        outside_window = stats.outside_window,
        "Feed processed"
    );

    (observations, stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Serves canned payloads keyed by feed id and records requested URLs.
    #[derive(Default)]
    struct StubFeeds {
        feeds: HashMap<&'static str, (u16, &'static str, Duration)>,
        requested: Mutex<Vec<String>>,
    }

    impl StubFeeds {
        fn with(
            mut self,
            feed_id: &'static str,
            status: u16,
            body: &'static str,
            delay_ms: u64,
        ) -> Self {
            self.feeds
                .insert(feed_id, (status, body, Duration::from_millis(delay_ms)));
            self
        }
    }

    #[async_trait]
    impl HttpClient for StubFeeds {
        async fn execute(&self, req: reqwest::Request) -> reqwest::Result<reqwest::Response> {
            let url = req.url().to_string();
            self.requested.lock().unwrap().push(url.clone());

            let (status, body, delay) = self
                .feeds
                .iter()
                .find(|(id, _)| url.contains(&format!("/{id}/")))
                .map(|(_, v)| *v)
                .unwrap_or((404, "", Duration::ZERO));

            tokio::time::sleep(delay).await;
            let resp = http::Response::builder().status(status).body(body).unwrap();
            Ok(reqwest::Response::from(resp))
        }
    }

    const FEED_A: &str = "latitude,longitude,acq_date,acq_time,satellite\n\
        1.0,1.0,2024-01-09,1200,Terra\n\
        2.0,2.0,2024-01-09,1300,Aqua\n";
    const FEED_B: &str = "latitude,longitude,acq_date,acq_time,satellite\n\
        3.0,3.0,2024-01-09,1400,N\n";

    fn now() -> DateTime<Utc> {
        "2024-01-10T00:00:00Z".parse().unwrap()
    }

    fn sources() -> Vec<SensorSource> {
        vec![SensorSource::new("FEED_A", "A"), SensorSource::new("FEED_B", "B")]
    }

    fn options() -> PipelineOptions {
        PipelineOptions {
            base_url: "https://firms.test".to_string(),
            map_key: "KEY".to_string(),
            ..PipelineOptions::default()
        }
    }

    #[tokio::test]
    async fn test_merge_order_follows_configuration_not_completion() {
        let stub = StubFeeds::default()
            .with("FEED_A", 200, FEED_A, 150)
            .with("FEED_B", 200, FEED_B, 0);
        let pipeline = AggregationPipeline::new(stub, options());

        let merged = pipeline
            .run(&sources(), Arc::new(Region::world()), TimeWindow::All, now())
            .await
            .unwrap();

        let sensors: Vec<_> = merged.iter().map(|o| o.sensor.as_str()).collect();
        assert_eq!(sensors, vec!["A", "A", "B"]);
        let lats: Vec<_> = merged.iter().map(|o| o.latitude).collect();
        assert_eq!(lats, vec![1.0, 2.0, 3.0]);
        assert_eq!(merged.stats[0].sensor, "A");
        assert_eq!(merged.stats[1].sensor, "B");
        assert_eq!(merged.stats[0].feed_id.as_deref(), Some("FEED_A"));
    }

    #[tokio::test]
    async fn test_any_failure_fails_the_run() {
        let stub = StubFeeds::default()
            .with("FEED_A", 200, FEED_A, 0)
            .with("FEED_B", 500, "boom", 0);
        let pipeline = AggregationPipeline::new(stub, options());

        let err = pipeline
            .run(&sources(), Arc::new(Region::world()), TimeWindow::All, now())
            .await
            .unwrap_err();

        assert_eq!(err.fetch_error().sensor(), "B");
        assert!(matches!(err.fetch_error(), FetchError::Status { .. }));
    }

    #[tokio::test]
    async fn test_failure_does_not_wait_for_slow_sources() {
        let stub = StubFeeds::default()
            .with("FEED_A", 200, FEED_A, 30_000)
            .with("FEED_B", 404, "", 0);
        let pipeline = AggregationPipeline::new(stub, options());

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            pipeline.run(&sources(), Arc::new(Region::world()), TimeWindow::All, now()),
        )
        .await
        .expect("run should abort as soon as B fails");

        assert_eq!(result.unwrap_err().fetch_error().sensor(), "B");
    }

    #[tokio::test]
    async fn test_empty_success_is_not_an_error() {
        let stub = StubFeeds::default()
            .with("FEED_A", 200, "latitude,longitude,acq_date,acq_time\n", 0)
            .with("FEED_B", 200, "", 0);
        let pipeline = AggregationPipeline::new(stub, options());

        let merged = pipeline
            .run(&sources(), Arc::new(Region::world()), TimeWindow::LAST_24H, now())
            .await
            .unwrap();

        assert!(merged.is_empty());
        assert_eq!(merged.stats.len(), 2);
    }

    #[tokio::test]
    async fn test_no_sources_yields_empty_collection() {
        let pipeline = AggregationPipeline::new(StubFeeds::default(), options());
        let merged = pipeline
            .run(&[], Arc::new(Region::world()), TimeWindow::All, now())
            .await
            .unwrap();
        assert!(merged.is_empty());
        assert!(merged.stats.is_empty());
    }

    #[tokio::test]
    async fn test_request_url_uses_days_and_scope() {
        let region = Region::from_geojson_str(
            r#"{"type":"Polygon","coordinates":[[[0,0],[2,0],[2,2],[0,2],[0,0]]]}"#,
        )
        .unwrap();
        let stub = Arc::new(StubFeeds::default().with("FEED_A", 200, FEED_A, 0));
        let pipeline = AggregationPipeline::from_shared(
            Arc::clone(&stub),
            PipelineOptions {
                scope: FeedScope::Region,
                ..options()
            },
        );

        pipeline
            .run(
                &[SensorSource::new("FEED_A", "A")],
                Arc::new(region),
                TimeWindow::LAST_48H,
                now(),
            )
            .await
            .unwrap();

        let requested = stub.requested.lock().unwrap().clone();
        assert_eq!(
            requested,
            vec!["https://firms.test/api/area/csv/KEY/FEED_A/0,0,2,2/2".to_string()]
        );
    }

    /// Succeeds with an empty payload except for one feed, where it panics.
    struct PanicsOn(&'static str);

    #[async_trait]
    impl HttpClient for PanicsOn {
        async fn execute(&self, req: reqwest::Request) -> reqwest::Result<reqwest::Response> {
            if req.url().path().contains(&format!("/{}/", self.0)) {
                panic!("client blew up for {}", self.0);
            }
            let resp = http::Response::builder().status(200).body("").unwrap();
            Ok(reqwest::Response::from(resp))
        }
    }

    #[tokio::test]
    async fn test_panicked_task_reports_its_sensor() {
        let pipeline = AggregationPipeline::new(PanicsOn("FEED_B"), options());

        let err = pipeline
            .run(&sources(), Arc::new(Region::world()), TimeWindow::All, now())
            .await
            .unwrap_err();

        match err.fetch_error() {
            FetchError::Task { sensor, .. } => assert_eq!(sensor, "B"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_blank_label_is_rejected_before_fetching() {
        let stub = Arc::new(StubFeeds::default().with("FEED_A", 200, FEED_A, 0));
        let pipeline = AggregationPipeline::from_shared(Arc::clone(&stub), options());
        let sources = vec![
            SensorSource::new("FEED_A", "A"),
            SensorSource::new("FEED_B", "  "),
        ];

        let err = pipeline
            .run(&sources, Arc::new(Region::world()), TimeWindow::All, now())
            .await
            .unwrap_err();

        assert!(matches!(err.fetch_error(), FetchError::InvalidSource { .. }));
        assert_eq!(err.fetch_error().sensor(), "FEED_B");
        assert!(stub.requested.lock().unwrap().is_empty());
    }

    #[test]
    fn test_process_payload_filters_and_counts() {
        let raw = "latitude,longitude,acq_date,acq_time,sensor\n\
            1.0,1.0,2024-01-09,1200,spoofed\n\
            abc,1.0,2024-01-09,1200,x\n\
            ,,,,\n\
            50.0,50.0,2024-01-09,1200,x\n\
            1.5,1.5,2024-01-01,1200,x\n\
            1.2,1.2,2024-01-01,,x\n";
        let region = Region::from_geojson_str(
            r#"{"type":"Polygon","coordinates":[[[0,0],[2,0],[2,2],[0,2],[0,0]]]}"#,
        )
        .unwrap();

        let (observations, stats) =
            process_payload("MODIS", raw, &region, TimeWindow::LAST_24H, now());

        assert_eq!(observations.len(), 2);
        assert!(observations.iter().all(|o| o.sensor == "MODIS"));
        assert_eq!(observations[0].latitude, 1.0);
        // missing acq_time is kept regardless of window
        assert_eq!(observations[1].latitude, 1.2);

        assert_eq!(stats.rows, 5);
        assert_eq!(stats.invalid_coordinates, 1);
        assert_eq!(stats.outside_region, 1);
        assert_eq!(stats.outside_window, 1);
        assert_eq!(stats.retained, 2);
    }
}
