//! Alert rules: declarative threshold conditions or custom predicates.

use crate::snapshot::resolve_path;
use crate::types::{AlertSeverity, AlertType, Operator};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Predicate over the serialized metrics snapshot.
pub type Evaluator = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

#[derive(Clone)]
pub enum RuleCondition {
    /// Fires when the value at `metric_path` satisfies `operator` against
    /// `threshold`.
    Threshold {
        metric_path: String,
        operator: Operator,
        threshold: f64,
    },
    /// Fires when `evaluator` returns true. `metric_path` and `threshold`
    /// are only reported on the alert.
    Custom {
        metric_path: String,
        threshold: f64,
        evaluator: Evaluator,
    },
}

impl RuleCondition {
    pub fn is_met(&self, snapshot: &Value) -> bool {
        match self {
            RuleCondition::Threshold {
                metric_path,
                operator,
                threshold,
            } => operator.evaluate(resolve_path(snapshot, metric_path), *threshold),
            RuleCondition::Custom { evaluator, .. } => evaluator(snapshot),
        }
    }

    pub fn metric_path(&self) -> &str {
        match self {
            RuleCondition::Threshold { metric_path, .. } | RuleCondition::Custom { metric_path, .. } => {
                metric_path
            }
        }
    }

    pub fn threshold(&self) -> f64 {
        match self {
            RuleCondition::Threshold { threshold, .. } | RuleCondition::Custom { threshold, .. } => {
                *threshold
            }
        }
    }

    pub fn operator(&self) -> Option<Operator> {
        match self {
            RuleCondition::Threshold { operator, .. } => Some(*operator),
            RuleCondition::Custom { .. } => None,
        }
    }
}

impl fmt::Debug for RuleCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleCondition::Threshold {
                metric_path,
                operator,
                threshold,
            } => f
                .debug_struct("Threshold")
                .field("metric_path", metric_path)
                .field("operator", operator)
                .field("threshold", threshold)
                .finish(),
            RuleCondition::Custom {
                metric_path,
                threshold,
                ..
            } => f
                .debug_struct("Custom")
                .field("metric_path", metric_path)
                .field("threshold", threshold)
                .finish_non_exhaustive(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AlertRule {
    pub id: String,
    pub name: String,
    pub alert_type: AlertType,
    pub severity: AlertSeverity,
    pub enabled: bool,
    pub cooldown_ms: u64,
    pub condition: RuleCondition,
}

impl AlertRule {
    /// Starts an enabled rule; finish it with [`RuleBuilder::when`] for a
    /// threshold comparison or [`RuleBuilder::custom`] for an evaluator.
    pub fn builder(
        id: impl Into<String>,
        name: impl Into<String>,
        alert_type: AlertType,
        severity: AlertSeverity,
    ) -> RuleBuilder {
        RuleBuilder {
            id: id.into(),
            name: name.into(),
            alert_type,
            severity,
        }
    }

    pub fn view(&self) -> RuleView {
        RuleView {
            id: self.id.clone(),
            name: self.name.clone(),
            alert_type: self.alert_type,
            severity: self.severity,
            metric_path: self.condition.metric_path().to_string(),
            operator: self.condition.operator(),
            threshold: self.condition.threshold(),
            enabled: self.enabled,
            cooldown: self.cooldown_ms,
            custom: matches!(self.condition, RuleCondition::Custom { .. }),
        }
    }
}

pub struct RuleBuilder {
    id: String,
    name: String,
    alert_type: AlertType,
    severity: AlertSeverity,
}

impl RuleBuilder {
    pub fn when(self, metric_path: &str, operator: Operator, threshold: f64, cooldown_ms: u64) -> AlertRule {
        self.finish(
            RuleCondition::Threshold {
                metric_path: metric_path.to_string(),
                operator,
                threshold,
            },
            cooldown_ms,
        )
    }

    pub fn custom<F>(self, metric_path: &str, threshold: f64, cooldown_ms: u64, evaluator: F) -> AlertRule
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        self.finish(
            RuleCondition::Custom {
                metric_path: metric_path.to_string(),
                threshold,
                evaluator: Arc::new(evaluator),
            },
            cooldown_ms,
        )
    }

    fn finish(self, condition: RuleCondition, cooldown_ms: u64) -> AlertRule {
        AlertRule {
            id: self.id,
            name: self.name,
            alert_type: self.alert_type,
            severity: self.severity,
            enabled: true,
            cooldown_ms,
            condition,
        }
    }
}

/// Serializable description of a rule.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleView {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub alert_type: AlertType,
    pub severity: AlertSeverity,
    pub metric_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operator: Option<Operator>,
    pub threshold: f64,
    pub enabled: bool,
    /// ms
    pub cooldown: u64,
    pub custom: bool,
}

/// Threshold rule as submitted by an operator.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleDefinition {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub alert_type: AlertType,
    pub severity: AlertSeverity,
    pub metric_path: String,
    pub operator: Operator,
    pub threshold: f64,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// ms; the engine default when absent.
    #[serde(default)]
    pub cooldown: Option<u64>,
}

fn default_enabled() -> bool {
    true
}

impl RuleDefinition {
    pub fn into_rule(self, default_cooldown_ms: u64) -> AlertRule {
        let mut rule = AlertRule::builder(self.id, self.name, self.alert_type, self.severity).when(
            &self.metric_path,
            self.operator,
            self.threshold,
            self.cooldown.unwrap_or(default_cooldown_ms),
        );
        rule.enabled = self.enabled;
        rule
    }
}

/// Partial rule update; absent fields are left unchanged. `operator` has no
/// effect on custom rules.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleUpdate {
    pub name: Option<String>,
    pub severity: Option<AlertSeverity>,
    pub metric_path: Option<String>,
    pub operator: Option<Operator>,
    pub threshold: Option<f64>,
    pub enabled: Option<bool>,
    /// ms
    pub cooldown: Option<u64>,
}

impl RuleUpdate {
    pub fn apply(self, rule: &mut AlertRule) {
        if let Some(name) = self.name {
            rule.name = name;
        }
        if let Some(severity) = self.severity {
            rule.severity = severity;
        }
        if let Some(enabled) = self.enabled {
            rule.enabled = enabled;
        }
        if let Some(cooldown) = self.cooldown {
            rule.cooldown_ms = cooldown;
        }
        match &mut rule.condition {
            RuleCondition::Threshold {
                metric_path,
                operator,
                threshold,
            } => {
                if let Some(p) = self.metric_path {
                    *metric_path = p;
                }
                if let Some(o) = self.operator {
                    *operator = o;
                }
                if let Some(t) = self.threshold {
                    *threshold = t;
                }
            }
            RuleCondition::Custom {
                metric_path,
                threshold,
                ..
            } => {
                if let Some(p) = self.metric_path {
                    *metric_path = p;
                }
                if let Some(t) = self.threshold {
                    *threshold = t;
                }
            }
        }
    }
}

const MINUTE_MS: u64 = 60 * 1000;

/// Rules registered at start-up, over [`crate::snapshot::CategoryMetrics`].
pub fn default_rules() -> Vec<AlertRule> {
    use AlertSeverity::*;
    use AlertType::*;

    vec![
        AlertRule::builder("render-time-high", "High Render Time", PerformanceDegradation, Warning)
            .when("performance.renderTime", Operator::Gt, 100.0, 5 * MINUTE_MS),
        AlertRule::builder("render-time-critical", "Critical Render Time", RenderTimeout, Critical)
            .when("performance.renderTime", Operator::Gt, 200.0, 2 * MINUTE_MS),
        AlertRule::builder("memory-usage-high", "High Memory Usage", MemoryLeak, Warning)
            .when("performance.memoryUsage", Operator::Gt, 50.0, 10 * MINUTE_MS),
        AlertRule::builder(
            "accessibility-violations",
            "Accessibility Violations",
            AccessibilityViolation,
            Error,
        )
        .when("accessibility.violations", Operator::Gt, 0.0, MINUTE_MS),
        AlertRule::builder(
            "wcag-compliance-low",
            "WCAG Compliance Below Target",
            AccessibilityViolation,
            Warning,
        )
        .when("accessibility.wcagCompliance", Operator::Lt, 95.0, 15 * MINUTE_MS),
        AlertRule::builder("error-rate-spike", "Error Rate Spike", ErrorRateSpike, Error)
            .when("userExperience.errorRate", Operator::Gt, 1.0, 3 * MINUTE_MS),
        AlertRule::builder("conversion-rate-drop", "Conversion Rate Drop", ConversionDrop, Warning)
            .when("business.conversionRate", Operator::Lt, 10.0, 30 * MINUTE_MS),
        AlertRule::builder(
            "user-satisfaction-low",
            "User Satisfaction Below Target",
            UserSatisfactionDrop,
            Warning,
        )
        .when("userExperience.satisfactionScore", Operator::Lt, 7.0, 60 * MINUTE_MS),
    ]
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_rule_set() {
        let rules = default_rules();
        assert_eq!(rules.len(), 8);
        let critical = rules.iter().find(|r| r.id == "render-time-critical").unwrap();
        assert_eq!(critical.severity, AlertSeverity::Critical);
        assert_eq!(critical.cooldown_ms, 120_000);
        assert_eq!(critical.condition.metric_path(), "performance.renderTime");
        assert!(rules.iter().all(|r| r.enabled));
    }

    #[test]
    fn test_threshold_condition() {
        let rule = AlertRule::builder("conv", "Conversion", AlertType::ConversionDrop, AlertSeverity::Warning)
            .when("business.conversionRate", Operator::Lt, 10.0, 0);
        assert!(rule.condition.is_met(&json!({"business": {"conversionRate": 8}})));
        assert!(!rule.condition.is_met(&json!({"business": {"conversionRate": 12}})));
    }

    #[test]
    fn test_custom_condition() {
        let rule = AlertRule::builder("combo", "Combo", AlertType::ErrorRateSpike, AlertSeverity::Error)
            .custom("userExperience.errorRate", 1.0, 0, |m| {
                m["userExperience"]["errorRate"].as_f64().unwrap_or(0.0) > 1.0
                    && m["business"]["conversionRate"].as_f64().unwrap_or(0.0) < 5.0
            });
        assert!(rule
            .condition
            .is_met(&json!({"userExperience": {"errorRate": 2}, "business": {"conversionRate": 1}})));
        assert!(!rule
            .condition
            .is_met(&json!({"userExperience": {"errorRate": 2}, "business": {"conversionRate": 9}})));
        assert!(rule.view().custom);
        assert_eq!(rule.view().operator, None);
    }

    #[test]
    fn test_rule_update_applies_present_fields() {
        let mut rule = default_rules().remove(0);
        let update: RuleUpdate =
            serde_json::from_str(r#"{"threshold": 150, "operator": "gte", "enabled": false}"#).unwrap();
        update.apply(&mut rule);
        assert!(!rule.enabled);
        assert_eq!(rule.condition.threshold(), 150.0);
        assert_eq!(rule.condition.operator(), Some(Operator::Gte));
        assert_eq!(rule.name, "High Render Time");
    }

    #[test]
    fn test_definition_uses_default_cooldown() {
        let def: RuleDefinition = serde_json::from_str(
            r#"{"id":"aov-low","name":"AOV low","type":"conversion_drop","severity":"info",
                "metricPath":"ecommerce.averageOrderValue","operator":"lt","threshold":50}"#,
        )
        .unwrap();
        let rule = def.into_rule(300_000);
        assert_eq!(rule.cooldown_ms, 300_000);
        assert!(rule.enabled);
        let view = serde_json::to_value(rule.view()).unwrap();
        assert_eq!(view["metricPath"], "ecommerce.averageOrderValue");
        assert_eq!(view["type"], "conversion_drop");
    }
}
