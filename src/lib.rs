pub mod config;
pub mod error;
pub mod fetch;
pub mod observation;
pub mod output;
pub mod parser;
pub mod pipeline;
pub mod region;
pub mod source;
pub mod stats;
pub mod window;

pub use error::{AggregateFailure, FetchError};
pub use observation::{MergedCollection, Observation};
pub use pipeline::{AggregationPipeline, PipelineOptions};
pub use region::{Region, is_inside};
pub use source::SensorSource;
pub use window::{TimeWindow, within_window};
