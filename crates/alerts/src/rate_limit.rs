//! Hourly cap on fired alerts.
//!
//! Counts live in process memory, so the cap is per instance. A shared
//! counter can be plugged in through [`RateLimiter`].

use dashmap::DashMap;

const HOUR_MS: i64 = 60 * 60 * 1000;

/// `floor(now / 1h)`.
pub fn hour_bucket(now_ms: i64) -> i64 {
    now_ms.div_euclid(HOUR_MS)
}

pub trait RateLimiter: Send + Sync {
    /// Alerts already recorded in the hour containing `now_ms`.
    fn count(&self, now_ms: i64) -> u32;

    fn record(&self, now_ms: i64);

    fn allows(&self, now_ms: i64, max_per_hour: u32) -> bool {
        self.count(now_ms) < max_per_hour
    }
}

#[derive(Debug, Default)]
pub struct HourlyRateLimiter {
    buckets: DashMap<i64, u32>,
}

impl HourlyRateLimiter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RateLimiter for HourlyRateLimiter {
    fn count(&self, now_ms: i64) -> u32 {
        self.buckets
            .get(&hour_bucket(now_ms))
            .map(|c| *c)
            .unwrap_or(0)
    }

    fn record(&self, now_ms: i64) {
        let bucket = hour_bucket(now_ms);
        *self.buckets.entry(bucket).or_insert(0) += 1;
        self.buckets.retain(|b, _| *b >= bucket);
    }
}
