//! Aggregated e-commerce KPIs computed from a window of events.
//!
//! Serialized in camelCase, which is also the shape alert rule paths
//! (`ecommerce.conversionRate`, ...) are resolved against.

use serde::{Deserialize, Serialize};

/// Round to two decimals, half up.
pub fn round2(value: f64) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    (value * 100.0 + 0.5).floor() / 100.0
}

/// `numerator / denominator * 100`, or 0 for an empty denominator.
pub fn percentage(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        0.0
    } else {
        round2(numerator / denominator * 100.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsMetrics {
    pub ecommerce: EcommerceMetrics,
    pub engagement: EngagementMetrics,
    pub trends: TrendsData,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub devices: Option<DeviceAnalysis>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub categories: Option<CategoryAnalysis>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub behavior: Option<BehaviorAnalysis>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retention: Option<RetentionAnalysis>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub products: Option<ProductAnalytics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub funnel: Option<FunnelAnalysis>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interactions: Option<InteractionMetrics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<SearchAnalytics>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EcommerceMetrics {
    pub cart_additions: u64,
    pub cart_removals: u64,
    pub checkout_starts: u64,
    pub checkout_completions: u64,
    pub product_views: u64,
    pub category_views: u64,
    pub search_queries: u64,
    pub conversion_rate: f64,
    pub cart_abandonment_rate: f64,
    pub product_to_cart_rate: f64,
    pub average_order_value: f64,
    pub total_revenue: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngagementMetrics {
    pub unique_sessions: u64,
    pub unique_users: u64,
    pub average_events_per_session: f64,
    /// Seconds.
    pub average_session_duration: u64,
    pub top_pages: Vec<PageViews>,
    pub top_products: Vec<ProductViews>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageViews {
    pub page: String,
    pub views: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductViews {
    pub product_id: String,
    pub product_name: String,
    pub views: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendsData {
    pub daily_events: Vec<DailyCount>,
    pub hourly_events: Vec<HourlyCount>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DailyCount {
    pub date: String,
    pub count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HourlyCount {
    pub hour: u32,
    pub count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceAnalysis {
    pub devices: Vec<DeviceShare>,
    pub browsers: Vec<BrowserShare>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceShare {
    pub device: String,
    pub count: u64,
    pub percentage: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BrowserShare {
    pub browser: String,
    pub count: u64,
    pub percentage: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryAnalysis {
    pub distribution: Vec<CategoryShare>,
    pub revenue: Vec<CategoryRevenue>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryShare {
    pub category: String,
    pub count: u64,
    pub percentage: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryRevenue {
    pub category: String,
    pub revenue: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BehaviorAnalysis {
    pub top_flows: Vec<FlowCount>,
    pub average_page_times: Vec<PageTime>,
    pub bounce_rate: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowCount {
    pub flow: String,
    pub count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageTime {
    pub page: String,
    /// Seconds.
    pub average_time: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetentionAnalysis {
    pub returning_users: u64,
    pub new_users: u64,
    pub retention_rate: f64,
    pub average_sessions_per_user: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductAnalytics {
    pub top_products_added_to_cart: Vec<ProductCartStats>,
    pub top_products_viewed: Vec<ProductViewStats>,
    pub products_by_category: Vec<CategoryProductStats>,
    pub cart_value_distribution: Vec<RangeCount>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductCartStats {
    pub product_id: String,
    pub product_name: String,
    pub category: String,
    pub total_additions: f64,
    pub total_revenue: f64,
    pub average_price: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductViewStats {
    pub product_id: String,
    pub product_name: String,
    pub category: String,
    pub views: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryProductStats {
    pub category: String,
    pub count: u64,
    pub revenue: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RangeCount {
    pub range: String,
    pub count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunnelAnalysis {
    pub steps: Vec<FunnelStep>,
    pub drop_off_points: Vec<DropOffPoint>,
    pub total_conversion_rate: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunnelStep {
    pub step: String,
    pub count: u64,
    pub conversion_rate: f64,
    /// Seconds from the previous step.
    pub average_time: f64,
    pub drop_off_rate: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DropOffPoint {
    pub from_step: String,
    pub to_step: String,
    pub drop_off_count: u64,
    pub drop_off_rate: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionMetrics {
    pub top_interactions: Vec<InteractionShare>,
    pub page_interactions: Vec<PageInteractions>,
    pub user_journey: Vec<FlowCount>,
    pub exit_pages: Vec<PageShare>,
    pub entry_pages: Vec<PageShare>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InteractionShare {
    #[serde(rename = "type")]
    pub kind: String,
    pub count: u64,
    pub percentage: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInteractions {
    pub page: String,
    pub clicks: u64,
    pub hovers: u64,
    pub scrolls: u64,
    pub average_time: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageShare {
    pub page: String,
    pub count: u64,
    pub percentage: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchAnalytics {
    pub top_queries: Vec<QueryStats>,
    pub no_results: Vec<QueryCount>,
    pub conversion_rate: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryStats {
    pub query: String,
    pub count: u64,
    pub conversion_rate: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryCount {
    pub query: String,
    pub count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryPerformance {
    pub category: String,
    pub total_events: u64,
    pub unique_sessions: u64,
    pub unique_users: u64,
    pub views: u64,
    pub cart_additions: u64,
    pub purchases: u64,
    pub total_revenue: f64,
    pub conversion_rate: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round2_half_up() {
        assert_eq!(round2(33.333_333), 33.33);
        assert_eq!(round2(66.666_666), 66.67);
        assert_eq!(round2(0.125), 0.13);
        assert_eq!(round2(-2.505), -2.5);
        assert_eq!(round2(f64::NAN), 0.0);
    }

    #[test]
    fn test_percentage_zero_denominator() {
        assert_eq!(percentage(5.0, 0.0), 0.0);
        assert_eq!(percentage(1.0, 3.0), 33.33);
    }

    #[test]
    fn test_basic_metrics_omit_advanced_sections() {
        let json = serde_json::to_value(AnalyticsMetrics::default()).expect("serializable");
        assert!(json.get("ecommerce").is_some());
        assert!(json.get("devices").is_none());
        assert!(json["ecommerce"].get("conversionRate").is_some());
    }
}
