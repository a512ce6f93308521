//! Cache-aside composition of [`MetricsCache`] and [`MetricsCalculator`].

use crate::calculator::MetricsCalculator;
use chrono::Duration;
use std::sync::Arc;
use storefront_cache::MetricsCache;
use storefront_core::metrics::CategoryPerformance;
use storefront_core::{AnalyticsMetrics, Granularity, MetricsQueryParams};
use tracing::debug;

const ADVANCED_SUFFIX: &str = ":advanced";

/// Granularity implied by the length of the query window.
pub fn granularity_for(params: &MetricsQueryParams) -> Granularity {
    let span = params.end_date - params.start_date;
    if span <= Duration::days(1) {
        Granularity::Realtime
    } else if span <= Duration::days(7) {
        Granularity::Daily
    } else if span <= Duration::days(31) {
        Granularity::Weekly
    } else {
        Granularity::Monthly
    }
}

pub struct MetricsService {
    calculator: MetricsCalculator,
    cache: Arc<MetricsCache>,
}

impl MetricsService {
    pub fn new(calculator: MetricsCalculator, cache: Arc<MetricsCache>) -> Self {
        Self { calculator, cache }
    }

    pub fn cache(&self) -> &Arc<MetricsCache> {
        &self.cache
    }

    /// Cached metrics for a window, computing and storing them on a miss.
    pub async fn get_metrics(
        &self,
        params: &MetricsQueryParams,
        advanced: bool,
        granularity: Option<Granularity>,
    ) -> AnalyticsMetrics {
        let granularity = granularity.unwrap_or_else(|| granularity_for(params));
        let mut key = self.cache.generate_key(params, granularity);
        if advanced {
            key.push_str(ADVANCED_SUFFIX);
        }

        if let Some(cached) = self.cache.get(&key).await {
            debug!(key = %key, "Serving metrics from cache");
            return cached;
        }

        let metrics = if advanced {
            self.calculator.calculate_advanced_metrics(params).await
        } else {
            self.calculator.calculate_metrics(params).await
        };
        self.cache
            .set(&key, &metrics, self.cache.get_ttl(granularity.as_str()))
            .await;
        metrics
    }

    pub async fn category_performance(&self, params: &MetricsQueryParams) -> Vec<CategoryPerformance> {
        self.calculator.calculate_category_performance(params).await
    }

    pub async fn invalidate_pattern(&self, pattern: &str) {
        self.cache.invalidate_pattern(pattern).await;
    }
}
