//! Rule evaluation, alert lifecycle and rule management.

use crate::notify::Notifier;
use crate::rate_limit::{HourlyRateLimiter, RateLimiter};
use crate::rules::{default_rules, AlertRule, RuleCondition, RuleUpdate, RuleView};
use crate::snapshot::resolve_path;
use crate::types::{
    AlertConfig, AlertConfigUpdate, AlertMetadata, AlertStatistics, CategoryAlert,
};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use storefront_core::clock::Clock;
use storefront_core::config::AlertsConfig;
use storefront_core::error::{InsightsError, InsightsResult};
use tracing::{debug, info, warn};

pub const DEFAULT_HISTORY_LIMIT: usize = 100;

/// Alerting engine. One instance is built by the composition root and
/// shared behind an `Arc`.
pub struct AlertsManager {
    config: RwLock<AlertConfig>,
    rules: RwLock<Vec<AlertRule>>,
    active: DashMap<String, CategoryAlert>,
    history: Mutex<Vec<CategoryAlert>>,
    last_fired: DashMap<String, i64>,
    /// Serializes the eligibility check and claim of concurrent evaluations.
    fire_gate: Mutex<()>,
    limiter: Arc<dyn RateLimiter>,
    notifier: Notifier,
    clock: Arc<dyn Clock>,
}

impl AlertsManager {
    pub fn new(
        config: AlertConfig,
        rules: Vec<AlertRule>,
        notifier: Notifier,
        limiter: Arc<dyn RateLimiter>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config: RwLock::new(config),
            rules: RwLock::new(rules),
            active: DashMap::new(),
            history: Mutex::new(Vec::new()),
            last_fired: DashMap::new(),
            fire_gate: Mutex::new(()),
            limiter,
            notifier,
            clock,
        }
    }

    /// Default rule set, configured channels and a per-process hourly limiter.
    pub fn from_settings(settings: &AlertsConfig, clock: Arc<dyn Clock>) -> Self {
        let notifier = Notifier::from_config(settings, clock.clone());
        let manager = Self::new(
            AlertConfig::from_settings(settings),
            default_rules(),
            notifier,
            Arc::new(HourlyRateLimiter::new()),
            clock,
        );
        info!(
            rules = manager.rules.read().len(),
            enabled = settings.enabled,
            max_per_hour = settings.max_alerts_per_hour,
            "Alerts manager initialized"
        );
        manager
    }

    /// Evaluates any serializable snapshot; rule paths address its JSON form.
    pub async fn evaluate_metrics<M: Serialize>(&self, metrics: &M) -> Vec<CategoryAlert> {
        match serde_json::to_value(metrics) {
            Ok(snapshot) => self.evaluate_value(&snapshot).await,
            Err(e) => {
                warn!(error = %e, "Metrics snapshot could not be serialized, skipping evaluation");
                Vec::new()
            }
        }
    }

    pub async fn evaluate_value(&self, snapshot: &Value) -> Vec<CategoryAlert> {
        let config = self.config.read().clone();
        if !config.enabled {
            return Vec::new();
        }
        let fired = self.fire_eligible(&config, snapshot);
        if !fired.is_empty() {
            self.notifier.dispatch(&fired, config.channels).await;
        }
        fired
    }

    /// Checks the hourly cap and cooldown, evaluates and records each
    /// firing rule while holding `fire_gate`.
    fn fire_eligible(&self, config: &AlertConfig, snapshot: &Value) -> Vec<CategoryAlert> {
        let rules = self.rules.read().clone();
        let _gate = self.fire_gate.lock();
        let now = self.clock.now_ms();
        let mut fired = Vec::new();

        for rule in rules.iter().filter(|r| r.enabled) {
            if !self.limiter.allows(now, config.max_alerts_per_hour) {
                metrics::counter!("alerts.rate_limited").increment(1);
                if config.debug {
                    warn!(
                        max_per_hour = config.max_alerts_per_hour,
                        "Alert rate limit reached for current hour"
                    );
                }
                break;
            }

            if let Some(last) = self.last_fired.get(&rule.id).map(|t| *t) {
                let cooldown = i64::try_from(rule.cooldown_ms).unwrap_or(i64::MAX);
                if now.saturating_sub(last) < cooldown {
                    continue;
                }
            }

            if !rule.condition.is_met(snapshot) {
                continue;
            }

            let alert = build_alert(rule, snapshot, now);
            self.last_fired.insert(rule.id.clone(), now);
            self.limiter.record(now);
            self.active.insert(alert.id.clone(), alert.clone());
            self.history.lock().push(alert.clone());
            metrics::counter!("alerts.fired", "severity" => alert.severity.as_str()).increment(1);
            if config.debug {
                debug!(alert_id = %alert.id, rule_id = %rule.id, "Alert fired");
            }
            fired.push(alert);
        }
        fired
    }

    /// Marks an active alert resolved. Returns false when `id` is not active.
    pub fn resolve_alert(&self, id: &str) -> bool {
        if self.active.remove(id).is_none() {
            return false;
        }
        let now = self.clock.now_ms();

        let mut history = self.history.lock();
        if let Some(entry) = history.iter_mut().rev().find(|a| a.id == id && !a.resolved) {
            entry.resolved = true;
            entry.resolved_at = Some(now);
        }
        if self.config.read().debug {
            debug!(alert_id = %id, "Alert resolved");
        }
        true
    }

    /// Active alerts, oldest first.
    pub fn active_alerts(&self) -> Vec<CategoryAlert> {
        let mut alerts: Vec<CategoryAlert> = self.active.iter().map(|e| e.value().clone()).collect();
        alerts.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
        alerts
    }

    /// The most recent `limit` alerts, oldest first.
    pub fn alert_history(&self, limit: usize) -> Vec<CategoryAlert> {
        let history = self.history.lock();
        let start = history.len().saturating_sub(limit);
        history[start..].to_vec()
    }

    pub fn clear_history(&self) {
        self.history.lock().clear();
    }

    pub fn statistics(&self) -> AlertStatistics {
        let history = self.history.lock();
        let mut stats = AlertStatistics {
            active_alerts: self.active.len(),
            total_alerts: history.len(),
            ..Default::default()
        };
        for alert in history.iter() {
            *stats
                .alerts_by_type
                .entry(alert.alert_type.as_str().to_string())
                .or_insert(0) += 1;
            *stats
                .alerts_by_severity
                .entry(alert.severity.as_str().to_string())
                .or_insert(0) += 1;
        }
        stats
    }

    pub fn add_rule(&self, rule: AlertRule) -> InsightsResult<()> {
        let mut rules = self.rules.write();
        if rules.iter().any(|r| r.id == rule.id) {
            return Err(InsightsError::Validation(format!(
                "rule '{}' already exists",
                rule.id
            )));
        }
        info!(rule_id = %rule.id, "Alert rule added");
        rules.push(rule);
        Ok(())
    }

    pub fn remove_rule(&self, id: &str) -> bool {
        let mut rules = self.rules.write();
        let before = rules.len();
        rules.retain(|r| r.id != id);
        let removed = rules.len() != before;
        if removed {
            self.last_fired.remove(id);
            info!(rule_id = %id, "Alert rule removed");
        }
        removed
    }

    pub fn update_rule(&self, id: &str, update: RuleUpdate) -> Option<RuleView> {
        let mut rules = self.rules.write();
        let rule = rules.iter_mut().find(|r| r.id == id)?;
        update.apply(rule);
        Some(rule.view())
    }

    pub fn rules(&self) -> Vec<RuleView> {
        self.rules.read().iter().map(AlertRule::view).collect()
    }

    pub fn default_cooldown_ms(&self) -> u64 {
        self.config.read().default_cooldown_ms
    }

    pub fn config(&self) -> AlertConfig {
        self.config.read().clone()
    }

    pub fn update_config(&self, update: AlertConfigUpdate) -> AlertConfig {
        let mut config = self.config.write();
        update.apply(&mut config);
        config.clone()
    }
}

fn build_alert(rule: &AlertRule, snapshot: &Value, now: i64) -> CategoryAlert {
    let metric_path = rule.condition.metric_path();
    let value = resolve_path(snapshot, metric_path);
    let threshold = rule.condition.threshold();
    let phrase = match &rule.condition {
        RuleCondition::Threshold { operator, .. } => operator.phrase(),
        RuleCondition::Custom { .. } => "compared with",
    };

    CategoryAlert {
        id: format!("{}_{}", rule.id, now),
        alert_type: rule.alert_type,
        severity: rule.severity,
        title: rule.name.clone(),
        description: format!("current value ({value}) is {phrase} the threshold ({threshold})"),
        value,
        threshold,
        timestamp: now,
        resolved: false,
        resolved_at: None,
        metadata: AlertMetadata {
            rule_id: rule.id.clone(),
            metric_path: metric_path.to_string(),
            operator: rule.condition.operator(),
        },
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::notify::tests::CaptureChannel;
    use crate::notify::{ChannelKind, NotificationChannel};
    use crate::snapshot::CategoryMetrics;
    use crate::types::{AlertSeverity, AlertType, Operator};
    use serde_json::json;
    use storefront_core::clock::{manual_clock, ManualClock};

    const T0: i64 = 1_768_435_200_000;

    fn manager(config: AlertConfig, rules: Vec<AlertRule>) -> (AlertsManager, Arc<ManualClock>) {
        let clock = manual_clock(T0);
        let manager = AlertsManager::new(
            config,
            rules,
            Notifier::with_channels(Vec::new()),
            Arc::new(HourlyRateLimiter::new()),
            clock.clone(),
        );
        (manager, clock)
    }

    fn always(id: &str, cooldown_ms: u64) -> AlertRule {
        AlertRule::builder(id, id, AlertType::ErrorRateSpike, AlertSeverity::Error)
            .custom("userExperience.errorRate", 1.0, cooldown_ms, |_| true)
    }

    fn render_rule(cooldown_ms: u64) -> AlertRule {
        AlertRule::builder(
            "render-time-high",
            "High Render Time",
            AlertType::PerformanceDegradation,
            AlertSeverity::Warning,
        )
        .when("performance.renderTime", Operator::Gt, 100.0, cooldown_ms)
    }

    fn slow_render() -> CategoryMetrics {
        let mut m = CategoryMetrics::default();
        m.performance.render_time = 150.0;
        m
    }

    #[tokio::test]
    async fn test_cooldown_suppresses_second_fire() {
        let (manager, clock) = manager(AlertConfig::default(), vec![render_rule(60_000)]);

        assert_eq!(manager.evaluate_metrics(&slow_render()).await.len(), 1);
        clock.advance_ms(30_000);
        assert!(manager.evaluate_metrics(&slow_render()).await.is_empty());
        clock.advance_ms(30_000);
        assert_eq!(manager.evaluate_metrics(&slow_render()).await.len(), 1);
        assert_eq!(manager.alert_history(DEFAULT_HISTORY_LIMIT).len(), 2);
    }

    #[tokio::test]
    async fn test_hourly_cap_stops_evaluation() {
        let config = AlertConfig {
            max_alerts_per_hour: 1,
            ..AlertConfig::default()
        };
        let (manager, clock) = manager(config, vec![always("a", 0), always("b", 0)]);

        let fired = manager.evaluate_value(&json!({})).await;
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].metadata.rule_id, "a");

        clock.advance_ms(1_000);
        assert!(manager.evaluate_value(&json!({})).await.is_empty());

        clock.set_ms(T0 + 60 * 60 * 1000);
        assert_eq!(manager.evaluate_value(&json!({})).await.len(), 1);
    }

    #[tokio::test]
    async fn test_conversion_rate_threshold() {
        let conversion = default_rules()
            .into_iter()
            .find(|r| r.id == "conversion-rate-drop")
            .unwrap();
        let (manager, clock) = manager(AlertConfig::default(), vec![conversion]);

        assert!(manager
            .evaluate_value(&json!({"business": {"conversionRate": 12}}))
            .await
            .is_empty());

        let fired = manager
            .evaluate_value(&json!({"business": {"conversionRate": 8}}))
            .await;
        assert_eq!(fired.len(), 1);
        let alert = &fired[0];
        assert_eq!(alert.id, format!("conversion-rate-drop_{T0}"));
        assert_eq!(alert.title, "Conversion Rate Drop");
        assert_eq!(alert.value, 8.0);
        assert_eq!(alert.threshold, 10.0);
        assert_eq!(alert.description, "current value (8) is less than the threshold (10)");
        assert_eq!(alert.metadata.operator, Some(Operator::Lt));
        assert_eq!(alert.timestamp, clock.now_ms());
    }

    #[tokio::test]
    async fn test_resolve_is_one_way() {
        let (manager, clock) = manager(AlertConfig::default(), vec![render_rule(0)]);
        let id = manager.evaluate_metrics(&slow_render()).await[0].id.clone();

        clock.advance_ms(500);
        assert!(manager.resolve_alert(&id));
        assert!(!manager.resolve_alert(&id));
        assert!(!manager.resolve_alert("missing"));
        assert!(manager.active_alerts().is_empty());

        let history = manager.alert_history(10);
        assert!(history[0].resolved);
        assert_eq!(history[0].resolved_at, Some(T0 + 500));
        assert_eq!(manager.statistics().active_alerts, 0);
        assert_eq!(manager.statistics().total_alerts, 1);
    }

    #[tokio::test]
    async fn test_channel_failure_keeps_alert_state() {
        let failing = CaptureChannel::new(ChannelKind::Webhook, true);
        let console = CaptureChannel::new(ChannelKind::Console, false);
        let clock = manual_clock(T0);
        let manager = AlertsManager::new(
            AlertConfig::default(),
            vec![render_rule(0)],
            Notifier::with_channels(vec![failing as Arc<dyn NotificationChannel>, console.clone()]),
            Arc::new(HourlyRateLimiter::new()),
            clock,
        );

        let fired = manager.evaluate_metrics(&slow_render()).await;
        assert_eq!(fired.len(), 1);
        assert_eq!(manager.active_alerts().len(), 1);
        assert_eq!(*console.sent.lock(), vec![fired[0].id.clone()]);
    }

    #[tokio::test]
    async fn test_disabled_engine_evaluates_nothing() {
        let config = AlertConfig {
            enabled: false,
            ..AlertConfig::default()
        };
        let (manager, _) = manager(config, default_rules());
        assert!(manager.evaluate_metrics(&CategoryMetrics::default()).await.is_empty());

        manager.update_config(AlertConfigUpdate {
            enabled: Some(true),
            ..Default::default()
        });
        // wcag, conversion and satisfaction are below target on an all-zero snapshot
        assert_eq!(manager.evaluate_metrics(&CategoryMetrics::default()).await.len(), 3);
    }

    #[tokio::test]
    async fn test_custom_evaluator_description() {
        let (manager, _) = manager(AlertConfig::default(), vec![always("combo", 0)]);
        let fired = manager
            .evaluate_value(&json!({"userExperience": {"errorRate": 3.5}}))
            .await;
        assert_eq!(fired[0].value, 3.5);
        assert_eq!(
            fired[0].description,
            "current value (3.5) is compared with the threshold (1)"
        );
        assert_eq!(fired[0].metadata.operator, None);
    }

    #[tokio::test]
    async fn test_statistics_and_history_limit() {
        let (manager, clock) = manager(
            AlertConfig::default(),
            vec![always("a", 0), render_rule(0)],
        );
        for _ in 0..3 {
            manager.evaluate_metrics(&slow_render()).await;
            clock.advance_ms(1);
        }

        let stats = manager.statistics();
        assert_eq!(stats.total_alerts, 6);
        assert_eq!(stats.alerts_by_type["error_rate_spike"], 3);
        assert_eq!(stats.alerts_by_severity["warning"], 3);

        let recent = manager.alert_history(2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[1].timestamp, T0 + 2);

        manager.clear_history();
        assert_eq!(manager.statistics().total_alerts, 0);
        assert_eq!(manager.statistics().active_alerts, 6);
    }

    fn slow(id: &str, cooldown_ms: u64) -> AlertRule {
        AlertRule::builder(id, id, AlertType::ErrorRateSpike, AlertSeverity::Error).custom(
            "userExperience.errorRate",
            1.0,
            cooldown_ms,
            |_| {
                std::thread::sleep(std::time::Duration::from_millis(50));
                true
            },
        )
    }

    async fn evaluate_concurrently(manager: AlertsManager, callers: usize) -> (usize, usize) {
        let manager = Arc::new(manager);
        let handles: Vec<_> = (0..callers)
            .map(|_| {
                let manager = manager.clone();
                tokio::spawn(async move { manager.evaluate_value(&json!({})).await.len() })
            })
            .collect();
        let mut fired = 0;
        for handle in handles {
            fired += handle.await.unwrap();
        }
        (fired, manager.alert_history(DEFAULT_HISTORY_LIMIT).len())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_evaluations_fire_once_per_cooldown() {
        let (manager, _) = manager(AlertConfig::default(), vec![slow("slow", 60_000)]);
        assert_eq!(evaluate_concurrently(manager, 4).await, (1, 1));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_evaluations_respect_hourly_cap() {
        let config = AlertConfig {
            max_alerts_per_hour: 2,
            ..AlertConfig::default()
        };
        let rules = vec![slow("a", 0), slow("b", 0), slow("c", 0)];
        let (manager, _) = manager(config, rules);
        assert_eq!(evaluate_concurrently(manager, 4).await, (2, 2));
    }

    #[test]
    fn test_rule_management() {
        let (manager, _) = manager(AlertConfig::default(), default_rules());
        assert!(manager.add_rule(render_rule(0)).is_err());
        manager.add_rule(always("extra", 0)).unwrap();
        assert_eq!(manager.rules().len(), 9);

        let view = manager
            .update_rule(
                "memory-usage-high",
                RuleUpdate {
                    threshold: Some(80.0),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(view.threshold, 80.0);
        assert!(manager.update_rule("missing", RuleUpdate::default()).is_none());

        assert!(manager.remove_rule("extra"));
        assert!(!manager.remove_rule("extra"));
        assert_eq!(manager.rules().len(), 8);
    }
}
