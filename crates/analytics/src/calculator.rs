//! Reduces a window of normalized events into [`AnalyticsMetrics`].
//!
//! Aggregations are pure functions over a chronologically sorted slice;
//! [`MetricsCalculator`] only adds the event-store read in front of them.

use crate::insights;
use crate::normalize::normalize_all;
use crate::store::{EventQuery, EventStore};
use chrono::{DateTime, Timelike};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use storefront_core::metrics::{
    percentage, round2, BehaviorAnalysis, BrowserShare, CategoryAnalysis, CategoryPerformance,
    CategoryRevenue, CategoryShare, DailyCount, DeviceAnalysis, DeviceShare, EcommerceMetrics,
    EngagementMetrics, FlowCount, HourlyCount, PageTime, PageViews, ProductViews,
    RetentionAnalysis, TrendsData,
};
use storefront_core::{AnalyticsMetrics, MetricsQueryParams, NormalizedEvent};
use tracing::{debug, warn};

const TOP_PAGES: usize = 10;
const TOP_PRODUCTS: usize = 10;
const TOP_FLOWS: usize = 10;

pub struct MetricsCalculator {
    store: Arc<dyn EventStore>,
}

impl MetricsCalculator {
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self { store }
    }

    /// Read and normalize the events of a window. A failed read is logged
    /// and yields an empty window.
    pub async fn fetch_events(&self, params: &MetricsQueryParams) -> Vec<NormalizedEvent> {
        let query = EventQuery::from_params(params);
        match self.store.fetch(&query).await {
            Ok(raw) => {
                debug!(events = raw.len(), "Analytics events loaded");
                normalize_all(&raw)
            }
            Err(e) => {
                metrics::counter!("analytics.fetch_errors").increment(1);
                warn!(error = %e, start_ms = query.start_ms, end_ms = query.end_ms, "Event fetch failed, using empty window");
                Vec::new()
            }
        }
    }

    /// E-commerce, engagement and trends.
    pub async fn calculate_metrics(&self, params: &MetricsQueryParams) -> AnalyticsMetrics {
        let events = self.fetch_events(params).await;
        basic_metrics(&events)
    }

    /// Basic metrics plus every breakdown.
    pub async fn calculate_advanced_metrics(&self, params: &MetricsQueryParams) -> AnalyticsMetrics {
        let events = self.fetch_events(params).await;
        advanced_metrics(&events)
    }

    pub async fn calculate_category_performance(
        &self,
        params: &MetricsQueryParams,
    ) -> Vec<CategoryPerformance> {
        let events = self.fetch_events(params).await;
        insights::category_performance(&events)
    }
}

pub fn basic_metrics(events: &[NormalizedEvent]) -> AnalyticsMetrics {
    AnalyticsMetrics {
        ecommerce: ecommerce(events),
        engagement: engagement(events),
        trends: trends(events),
        ..Default::default()
    }
}

pub fn advanced_metrics(events: &[NormalizedEvent]) -> AnalyticsMetrics {
    let mut metrics = basic_metrics(events);
    metrics.devices = Some(devices(events));
    metrics.categories = Some(categories(events));
    metrics.behavior = Some(behavior(events, metrics.engagement.unique_sessions));
    metrics.retention = Some(retention(events));
    metrics.products = Some(insights::products(events));
    metrics.funnel = Some(insights::funnel(events));
    metrics.interactions = Some(insights::interactions(events));
    metrics.search = Some(insights::search(events));
    metrics
}

/// Sort counted keys by count descending, key ascending, and keep `limit`.
pub(crate) fn top_counts(counts: HashMap<String, u64>, limit: usize) -> Vec<(String, u64)> {
    let mut ranked: Vec<(String, u64)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.truncate(limit);
    ranked
}

/// Page used for grouping; events without a page group under `unknown`.
pub(crate) fn page_or_unknown(event: &NormalizedEvent) -> &str {
    if event.page.is_empty() {
        "unknown"
    } else {
        &event.page
    }
}

/// `(prev page → page)` transitions within each session.
pub(crate) fn page_flows(events: &[NormalizedEvent]) -> HashMap<String, u64> {
    let mut previous: HashMap<&str, &str> = HashMap::new();
    let mut flows: HashMap<String, u64> = HashMap::new();
    for event in events {
        let page = page_or_unknown(event);
        if let Some(prev) = previous.insert(event.session_id.as_str(), page) {
            *flows.entry(format!("{prev} → {page}")).or_default() += 1;
        }
    }
    flows
}

pub(crate) fn group_by_session(events: &[NormalizedEvent]) -> HashMap<&str, Vec<&NormalizedEvent>> {
    let mut sessions: HashMap<&str, Vec<&NormalizedEvent>> = HashMap::new();
    for event in events {
        sessions.entry(event.session_id.as_str()).or_default().push(event);
    }
    sessions
}

fn ecommerce(events: &[NormalizedEvent]) -> EcommerceMetrics {
    let mut m = EcommerceMetrics::default();
    let mut purchases = 0u64;

    for e in events {
        if e.is_ecommerce() {
            if e.is_cart_addition() {
                m.cart_additions += 1;
            }
            if e.is_cart_removal() {
                m.cart_removals += 1;
            }
            if e.action == "begin_checkout" {
                m.checkout_starts += 1;
            }
            if e.is_purchase() {
                m.checkout_completions += 1;
                purchases += 1;
                m.total_revenue += e.value.unwrap_or(0.0);
            }
        }
        if e.is_product_view() {
            m.product_views += 1;
        }
        if e.page.contains("/category/") || e.action == "view_category" || e.event_name == "view_category" {
            m.category_views += 1;
        }
        let search_action = e.action == "search" || e.action == "search_query";
        if (e.category == "search" && search_action)
            || e.event_name == "search"
            || e.event_name == "search_query"
        {
            m.search_queries += 1;
        }
    }

    m.conversion_rate = percentage(m.checkout_completions as f64, m.checkout_starts as f64);
    m.cart_abandonment_rate = percentage(
        m.cart_additions as f64 - m.checkout_completions as f64,
        m.cart_additions as f64,
    );
    m.product_to_cart_rate = percentage(m.cart_additions as f64, m.product_views as f64);
    m.average_order_value = if purchases > 0 {
        round2(m.total_revenue / purchases as f64)
    } else {
        0.0
    };
    m
}

fn engagement(events: &[NormalizedEvent]) -> EngagementMetrics {
    let sessions = group_by_session(events);
    let unique_sessions = sessions.len() as u64;
    let unique_users = events
        .iter()
        .filter_map(NormalizedEvent::identity)
        .collect::<HashSet<_>>()
        .len() as u64;

    let average_events_per_session = if unique_sessions > 0 {
        round2(events.len() as f64 / unique_sessions as f64)
    } else {
        0.0
    };

    // Events are chronological, so each session's span is last - first.
    let total_duration_ms: i64 = sessions
        .values()
        .map(|s| match (s.first(), s.last()) {
            (Some(first), Some(last)) if s.len() > 1 => last.created_at_ms - first.created_at_ms,
            _ => 0,
        })
        .sum();
    let average_session_duration = if unique_sessions > 0 {
        let avg_secs = total_duration_ms as f64 / unique_sessions as f64 / 1000.0;
        (avg_secs + 0.5).floor().max(0.0) as u64
    } else {
        0
    };

    let mut page_counts: HashMap<String, u64> = HashMap::new();
    for e in events.iter().filter(|e| e.action == "view" || e.event_name == "page_view") {
        *page_counts.entry(page_or_unknown(e).to_string()).or_default() += 1;
    }
    let top_pages = top_counts(page_counts, TOP_PAGES)
        .into_iter()
        .map(|(page, views)| PageViews { page, views })
        .collect();

    let mut product_counts: HashMap<String, u64> = HashMap::new();
    let mut product_names: HashMap<String, String> = HashMap::new();
    for e in events.iter().filter(|e| e.action == "view_item") {
        let product_id = e
            .product
            .product_id
            .clone()
            .or_else(|| e.label.clone())
            .unwrap_or_else(|| "unknown".to_string());
        if let Some(name) = e.product.product_name.as_ref().or(e.label.as_ref()) {
            product_names.insert(product_id.clone(), name.clone());
        }
        *product_counts.entry(product_id).or_default() += 1;
    }
    let top_products = top_counts(product_counts, TOP_PRODUCTS)
        .into_iter()
        .map(|(product_id, views)| ProductViews {
            product_name: product_names
                .remove(&product_id)
                .unwrap_or_else(|| "Unknown Product".to_string()),
            product_id,
            views,
        })
        .collect();

    EngagementMetrics {
        unique_sessions,
        unique_users,
        average_events_per_session,
        average_session_duration,
        top_pages,
        top_products,
    }
}

fn trends(events: &[NormalizedEvent]) -> TrendsData {
    let mut daily: BTreeMap<String, u64> = BTreeMap::new();
    let mut hourly = [0u64; 24];

    for e in events {
        let Some(at) = DateTime::from_timestamp_millis(e.created_at_ms) else {
            continue;
        };
        *daily.entry(at.format("%Y-%m-%d").to_string()).or_default() += 1;
        hourly[at.hour() as usize] += 1;
    }

    TrendsData {
        daily_events: daily
            .into_iter()
            .map(|(date, count)| DailyCount { date, count })
            .collect(),
        hourly_events: hourly
            .iter()
            .enumerate()
            .map(|(hour, &count)| HourlyCount {
                hour: hour as u32,
                count,
            })
            .collect(),
    }
}

fn classify_device(user_agent: &str) -> &'static str {
    if user_agent.contains("Mobile") || user_agent.contains("Android") || user_agent.contains("iPhone") {
        "Mobile"
    } else if user_agent.contains("Tablet") || user_agent.contains("iPad") {
        "Tablet"
    } else {
        "Desktop"
    }
}

fn classify_browser(user_agent: &str) -> &'static str {
    if user_agent.contains("Edg") {
        "Edge"
    } else if user_agent.contains("Chrome") {
        "Chrome"
    } else if user_agent.contains("Firefox") {
        "Firefox"
    } else if user_agent.contains("Safari") {
        "Safari"
    } else {
        "Other"
    }
}

fn capitalize(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn devices(events: &[NormalizedEvent]) -> DeviceAnalysis {
    let mut device_counts: HashMap<String, u64> = HashMap::new();
    let mut browser_counts: HashMap<String, u64> = HashMap::new();

    for e in events {
        let device = match (&e.device_type, &e.user_agent) {
            (Some(device_type), _) => capitalize(device_type),
            (None, Some(ua)) => classify_device(ua).to_string(),
            (None, None) => "Unknown".to_string(),
        };
        let browser = e.user_agent.as_deref().map_or("Unknown", classify_browser);
        *device_counts.entry(device).or_default() += 1;
        *browser_counts.entry(browser.to_string()).or_default() += 1;
    }

    let total = events.len() as f64;
    DeviceAnalysis {
        devices: top_counts(device_counts, usize::MAX)
            .into_iter()
            .map(|(device, count)| DeviceShare {
                device,
                count,
                percentage: percentage(count as f64, total),
            })
            .collect(),
        browsers: top_counts(browser_counts, usize::MAX)
            .into_iter()
            .map(|(browser, count)| BrowserShare {
                browser,
                count,
                percentage: percentage(count as f64, total),
            })
            .collect(),
    }
}

fn categories(events: &[NormalizedEvent]) -> CategoryAnalysis {
    let mut counts: HashMap<String, u64> = HashMap::new();
    let mut revenue: BTreeMap<String, f64> = BTreeMap::new();

    for e in events {
        *counts.entry(e.category.clone()).or_default() += 1;
        if let Some(value) = e.value.filter(|v| e.is_purchase() && *v != 0.0) {
            *revenue.entry(e.category.clone()).or_default() += value;
        }
    }

    let total = events.len() as f64;
    let mut revenue: Vec<CategoryRevenue> = revenue
        .into_iter()
        .map(|(category, revenue)| CategoryRevenue { category, revenue })
        .collect();
    revenue.sort_by(|a, b| b.revenue.total_cmp(&a.revenue).then_with(|| a.category.cmp(&b.category)));

    CategoryAnalysis {
        distribution: top_counts(counts, usize::MAX)
            .into_iter()
            .map(|(category, count)| CategoryShare {
                category,
                count,
                percentage: percentage(count as f64, total),
            })
            .collect(),
        revenue,
    }
}

fn behavior(events: &[NormalizedEvent], unique_sessions: u64) -> BehaviorAnalysis {
    let top_flows = top_counts(page_flows(events), TOP_FLOWS)
        .into_iter()
        .map(|(flow, count)| FlowCount { flow, count })
        .collect();

    // Time on a page is the gap to the next event of the same session.
    let sessions = group_by_session(events);
    let mut page_times: BTreeMap<&str, (i64, u64)> = BTreeMap::new();
    for session in sessions.values() {
        for pair in session.windows(2) {
            let slot = page_times.entry(page_or_unknown(pair[0])).or_default();
            slot.0 += pair[1].created_at_ms - pair[0].created_at_ms;
            slot.1 += 1;
        }
    }
    let average_page_times = page_times
        .into_iter()
        .map(|(page, (total_ms, n))| PageTime {
            page: page.to_string(),
            average_time: round2(total_ms as f64 / n as f64 / 1000.0),
        })
        .collect();

    let bounces = sessions.values().filter(|s| s.len() == 1).count();

    BehaviorAnalysis {
        top_flows,
        average_page_times,
        bounce_rate: percentage(bounces as f64, unique_sessions as f64),
    }
}

fn retention(events: &[NormalizedEvent]) -> RetentionAnalysis {
    let mut user_sessions: HashMap<&str, HashSet<&str>> = HashMap::new();
    for e in events {
        if let Some(identity) = e.identity() {
            user_sessions
                .entry(identity)
                .or_default()
                .insert(e.session_id.as_str());
        }
    }

    let total_users = user_sessions.len() as u64;
    let returning_users = user_sessions.values().filter(|s| s.len() > 1).count() as u64;
    let total_sessions: usize = user_sessions.values().map(HashSet::len).sum();

    RetentionAnalysis {
        returning_users,
        new_users: total_users - returning_users,
        retention_rate: percentage(returning_users as f64, total_users as f64),
        average_sessions_per_user: if total_users > 0 {
            round2(total_sessions as f64 / total_users as f64)
        } else {
            0.0
        },
    }
}
