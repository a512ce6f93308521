#![warn(clippy::unwrap_used)]

pub mod calculator;
pub mod insights;
pub mod normalize;
pub mod service;
pub mod session;
pub mod store;

pub use calculator::MetricsCalculator;
pub use service::{granularity_for, MetricsService};
pub use session::hash_session_id;
pub use store::{ClickHouseEventStore, EventQuery, EventStore, InMemoryEventStore};
