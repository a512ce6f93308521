#![warn(clippy::unwrap_used)]

pub mod clock;
pub mod config;
pub mod error;
pub mod metrics;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::AppConfig;
pub use error::{InsightsError, InsightsResult};
pub use metrics::AnalyticsMetrics;
pub use types::{Granularity, MetricsQueryParams, NormalizedEvent, RawEvent};
