//! Storefront UI health snapshot the default rules are written against,
//! and dot-path lookup over any serialized snapshot.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryMetrics {
    pub performance: PerformanceMetrics,
    pub accessibility: AccessibilityMetrics,
    pub user_experience: UserExperienceMetrics,
    pub business: BusinessMetrics,
    pub metadata: SnapshotMetadata,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceMetrics {
    /// ms
    pub render_time: f64,
    /// ms
    pub interaction_time: f64,
    /// MB
    pub memory_usage: f64,
    /// KB
    pub bundle_size: f64,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessibilityMetrics {
    /// Percentage of WCAG checks passed.
    pub wcag_compliance: f64,
    pub violations: u32,
    pub keyboard_nav_success: f64,
    pub screen_reader_score: f64,
    pub focus_management_score: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserExperienceMetrics {
    pub interaction_rate: f64,
    /// Percentage.
    pub error_rate: f64,
    pub task_completion_rate: f64,
    /// 1-10.
    pub satisfaction_score: f64,
    pub session_duration: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusinessMetrics {
    /// Percentage.
    pub conversion_rate: f64,
    pub revenue_per_interaction: f64,
    pub page_load_impact: f64,
    pub seo_impact: f64,
    pub mobile_usage: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotMetadata {
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub timestamp: i64,
    pub version: String,
}

/// Numeric value at a dot path such as `performance.renderTime`.
/// Missing segments and non-numeric leaves resolve to 0.
pub fn resolve_path(snapshot: &Value, path: &str) -> f64 {
    path.split('.')
        .try_fold(snapshot, |node, segment| node.get(segment))
        .and_then(Value::as_f64)
        .unwrap_or(0.0)
}
