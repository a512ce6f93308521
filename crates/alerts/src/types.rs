use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use storefront_core::config::{AlertChannelsConfig, AlertsConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

impl AlertSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSeverity::Info => "info",
            AlertSeverity::Warning => "warning",
            AlertSeverity::Error => "error",
            AlertSeverity::Critical => "critical",
        }
    }
}

impl fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    PerformanceDegradation,
    AccessibilityViolation,
    ErrorRateSpike,
    ConversionDrop,
    MemoryLeak,
    RenderTimeout,
    UserSatisfactionDrop,
}

impl AlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::PerformanceDegradation => "performance_degradation",
            AlertType::AccessibilityViolation => "accessibility_violation",
            AlertType::ErrorRateSpike => "error_rate_spike",
            AlertType::ConversionDrop => "conversion_drop",
            AlertType::MemoryLeak => "memory_leak",
            AlertType::RenderTimeout => "render_timeout",
            AlertType::UserSatisfactionDrop => "user_satisfaction_drop",
        }
    }
}

impl fmt::Display for AlertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Comparison between a metric value and a rule threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    Gt,
    Lt,
    Eq,
    Gte,
    Lte,
}

impl Operator {
    pub fn evaluate(&self, value: f64, threshold: f64) -> bool {
        match self {
            Operator::Gt => value > threshold,
            Operator::Lt => value < threshold,
            Operator::Eq => value == threshold,
            Operator::Gte => value >= threshold,
            Operator::Lte => value <= threshold,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Gt => "gt",
            Operator::Lt => "lt",
            Operator::Eq => "eq",
            Operator::Gte => "gte",
            Operator::Lte => "lte",
        }
    }

    /// Wording used in alert descriptions.
    pub fn phrase(&self) -> &'static str {
        match self {
            Operator::Gt => "greater than",
            Operator::Lt => "less than",
            Operator::Eq => "equal to",
            Operator::Gte => "greater than or equal to",
            Operator::Lte => "less than or equal to",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertMetadata {
    pub rule_id: String,
    pub metric_path: String,
    /// Absent for rules with a custom evaluator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator: Option<Operator>,
}

/// A firing of a rule. Only `resolved`/`resolved_at` change after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryAlert {
    pub id: String,
    #[serde(rename = "type")]
    pub alert_type: AlertType,
    pub severity: AlertSeverity,
    pub title: String,
    pub description: String,
    pub value: f64,
    pub threshold: f64,
    /// Epoch ms.
    pub timestamp: i64,
    pub resolved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<i64>,
    pub metadata: AlertMetadata,
}

/// Runtime settings of the alerting engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertConfig {
    pub enabled: bool,
    pub default_cooldown_ms: u64,
    pub max_alerts_per_hour: u32,
    pub channels: AlertChannelsConfig,
    pub debug: bool,
}

impl AlertConfig {
    pub fn from_settings(settings: &AlertsConfig) -> Self {
        Self {
            enabled: settings.enabled,
            default_cooldown_ms: settings.default_cooldown_ms,
            max_alerts_per_hour: settings.max_alerts_per_hour,
            channels: settings.channels,
            debug: settings.debug,
        }
    }
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self::from_settings(&AlertsConfig::default())
    }
}

/// Partial update of [`AlertConfig`]; absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertConfigUpdate {
    pub enabled: Option<bool>,
    pub default_cooldown_ms: Option<u64>,
    pub max_alerts_per_hour: Option<u32>,
    pub channels: Option<AlertChannelsConfig>,
    pub debug: Option<bool>,
}

impl AlertConfigUpdate {
    pub fn apply(self, config: &mut AlertConfig) {
        if let Some(v) = self.enabled {
            config.enabled = v;
        }
        if let Some(v) = self.default_cooldown_ms {
            config.default_cooldown_ms = v;
        }
        if let Some(v) = self.max_alerts_per_hour {
            config.max_alerts_per_hour = v;
        }
        if let Some(v) = self.channels {
            config.channels = v;
        }
        if let Some(v) = self.debug {
            config.debug = v;
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertStatistics {
    pub active_alerts: usize,
    pub total_alerts: usize,
    pub alerts_by_type: BTreeMap<String, u64>,
    pub alerts_by_severity: BTreeMap<String, u64>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_operators() {
        assert!(Operator::Gt.evaluate(101.0, 100.0));
        assert!(!Operator::Gt.evaluate(100.0, 100.0));
        assert!(Operator::Gte.evaluate(100.0, 100.0));
        assert!(Operator::Lt.evaluate(8.0, 10.0));
        assert!(!Operator::Lt.evaluate(12.0, 10.0));
        assert!(Operator::Lte.evaluate(10.0, 10.0));
        assert!(Operator::Eq.evaluate(0.0, 0.0));
    }

    #[test]
    fn test_wire_names() {
        assert_eq!(
            serde_json::to_value(AlertType::PerformanceDegradation).unwrap(),
            "performance_degradation"
        );
        assert_eq!(serde_json::to_value(AlertSeverity::Critical).unwrap(), "critical");
        let op: Operator = serde_json::from_str("\"gte\"").unwrap();
        assert_eq!(op, Operator::Gte);
    }

    #[test]
    fn test_config_update_is_partial() {
        let mut config = AlertConfig::default();
        let update: AlertConfigUpdate =
            serde_json::from_str(r#"{"maxAlertsPerHour": 3, "debug": true}"#).unwrap();
        update.apply(&mut config);
        assert_eq!(config.max_alerts_per_hour, 3);
        assert!(config.debug);
        assert!(config.enabled);
        assert_eq!(config.default_cooldown_ms, 300_000);
    }
}
