#![warn(clippy::unwrap_used)]

pub mod backend;
pub mod client;
pub mod guard;
pub mod keys;
pub mod local;
pub mod metrics_cache;
pub mod pattern;

pub use backend::{DistributedBackend, MemoryBackend};
pub use client::RedisBackend;
pub use guard::{BoundedBackend, Timeouts};
pub use local::{CacheEntry, LocalCache};
pub use metrics_cache::MetricsCache;
pub use pattern::GlobPattern;
