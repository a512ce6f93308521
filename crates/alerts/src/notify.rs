//! Notification fan-out for fired alerts.
//!
//! Every enabled channel receives every alert. A failing channel is logged
//! and counted; it never affects the other channels or the caller.

use crate::types::CategoryAlert;
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use storefront_core::clock::Clock;
use storefront_core::config::{AlertChannelsConfig, AlertsConfig};
use storefront_core::error::{InsightsError, InsightsResult};
use tracing::warn;

/// Value of `source` in webhook payloads.
pub const WEBHOOK_SOURCE: &str = "categories_component";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    Console,
    Webhook,
    Email,
    Slack,
}

impl ChannelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelKind::Console => "console",
            ChannelKind::Webhook => "webhook",
            ChannelKind::Email => "email",
            ChannelKind::Slack => "slack",
        }
    }

    pub fn is_enabled(&self, channels: &AlertChannelsConfig) -> bool {
        match self {
            ChannelKind::Console => channels.console,
            ChannelKind::Webhook => channels.webhook,
            ChannelKind::Email => channels.email,
            ChannelKind::Slack => channels.slack,
        }
    }
}

#[async_trait]
pub trait NotificationChannel: Send + Sync {
    fn kind(&self) -> ChannelKind;

    async fn send(&self, alert: &CategoryAlert) -> InsightsResult<()>;
}

fn iso_time(ms: i64) -> String {
    Utc.timestamp_millis_opt(ms)
        .single()
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| ms.to_string())
}

/// Writes alerts to the structured log.
#[derive(Debug, Default)]
pub struct LogChannel;

#[async_trait]
impl NotificationChannel for LogChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Console
    }

    async fn send(&self, alert: &CategoryAlert) -> InsightsResult<()> {
        warn!(
            alert_id = %alert.id,
            severity = %alert.severity,
            description = %alert.description,
            value = alert.value,
            threshold = alert.threshold,
            time = %iso_time(alert.timestamp),
            "[CATEGORY ALERT] {}",
            alert.title
        );
        Ok(())
    }
}

fn http_client(timeout_ms: u64) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_millis(timeout_ms))
        .build()
        .unwrap_or_else(|e| {
            warn!(error = %e, "Failed to build notification HTTP client, using defaults");
            reqwest::Client::new()
        })
}

async fn post_json<T: Serialize + ?Sized>(
    client: &reqwest::Client,
    url: &str,
    body: &T,
) -> InsightsResult<()> {
    let response = client
        .post(url)
        .json(body)
        .send()
        .await
        .map_err(|e| InsightsError::Notification(format!("POST {url}: {e}")))?;
    if !response.status().is_success() {
        return Err(InsightsError::Notification(format!(
            "POST {url} returned {}",
            response.status()
        )));
    }
    Ok(())
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    alert: &'a CategoryAlert,
    source: &'static str,
    timestamp: i64,
}

/// POSTs `{alert, source, timestamp}` to a webhook endpoint.
pub struct WebhookChannel {
    client: reqwest::Client,
    url: String,
    clock: Arc<dyn Clock>,
}

impl WebhookChannel {
    pub fn new(url: impl Into<String>, timeout_ms: u64, clock: Arc<dyn Clock>) -> Self {
        Self {
            client: http_client(timeout_ms),
            url: url.into(),
            clock,
        }
    }
}

#[async_trait]
impl NotificationChannel for WebhookChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Webhook
    }

    async fn send(&self, alert: &CategoryAlert) -> InsightsResult<()> {
        let payload = WebhookPayload {
            alert,
            source: WEBHOOK_SOURCE,
            timestamp: self.clock.now_ms(),
        };
        post_json(&self.client, &self.url, &payload).await
    }
}

/// Slack incoming-webhook message.
pub struct SlackChannel {
    client: reqwest::Client,
    url: String,
}

impl SlackChannel {
    pub fn new(url: impl Into<String>, timeout_ms: u64) -> Self {
        Self {
            client: http_client(timeout_ms),
            url: url.into(),
        }
    }

    pub fn message(alert: &CategoryAlert) -> String {
        format!(
            "[{}] {}\n{}",
            alert.severity.as_str().to_uppercase(),
            alert.title,
            alert.description
        )
    }
}

#[async_trait]
impl NotificationChannel for SlackChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Slack
    }

    async fn send(&self, alert: &CategoryAlert) -> InsightsResult<()> {
        let body = serde_json::json!({ "text": Self::message(alert) });
        post_json(&self.client, &self.url, &body).await
    }
}

#[derive(Serialize)]
struct EmailRequest<'a> {
    to: &'a [String],
    subject: String,
    body: String,
}

/// Hands alerts to an HTTP mail relay.
pub struct EmailChannel {
    client: reqwest::Client,
    relay_url: String,
    recipients: Vec<String>,
}

impl EmailChannel {
    pub fn new(relay_url: impl Into<String>, recipients: Vec<String>, timeout_ms: u64) -> Self {
        Self {
            client: http_client(timeout_ms),
            relay_url: relay_url.into(),
            recipients,
        }
    }
}

#[async_trait]
impl NotificationChannel for EmailChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Email
    }

    async fn send(&self, alert: &CategoryAlert) -> InsightsResult<()> {
        if self.recipients.is_empty() {
            return Err(InsightsError::Notification(
                "email channel has no recipients".to_string(),
            ));
        }
        let request = EmailRequest {
            to: &self.recipients,
            subject: format!("[{}] {}", alert.severity, alert.title),
            body: format!(
                "{}\n\nValue: {}\nThreshold: {}\nTime: {}",
                alert.description,
                alert.value,
                alert.threshold,
                iso_time(alert.timestamp)
            ),
        };
        post_json(&self.client, &self.relay_url, &request).await
    }
}

pub struct Notifier {
    channels: Vec<Arc<dyn NotificationChannel>>,
}

impl Notifier {
    /// Console plus every HTTP channel that has an endpoint configured.
    pub fn from_config(settings: &AlertsConfig, clock: Arc<dyn Clock>) -> Self {
        let timeout = settings.notify_timeout_ms;
        let mut channels: Vec<Arc<dyn NotificationChannel>> = vec![Arc::new(LogChannel)];

        match &settings.webhook_url {
            Some(url) => channels.push(Arc::new(WebhookChannel::new(url.clone(), timeout, clock))),
            None if settings.channels.webhook => {
                warn!("Webhook channel enabled without alerts.webhook_url, skipping")
            }
            None => {}
        }
        match &settings.slack_webhook_url {
            Some(url) => channels.push(Arc::new(SlackChannel::new(url.clone(), timeout))),
            None if settings.channels.slack => {
                warn!("Slack channel enabled without alerts.slack_webhook_url, skipping")
            }
            None => {}
        }
        match &settings.email_relay_url {
            Some(url) => channels.push(Arc::new(EmailChannel::new(
                url.clone(),
                settings.email_recipients.clone(),
                timeout,
            ))),
            None if settings.channels.email => {
                warn!("Email channel enabled without alerts.email_relay_url, skipping")
            }
            None => {}
        }

        Self { channels }
    }

    pub fn with_channels(channels: Vec<Arc<dyn NotificationChannel>>) -> Self {
        Self { channels }
    }

    pub fn channel_kinds(&self) -> Vec<ChannelKind> {
        self.channels.iter().map(|c| c.kind()).collect()
    }

    /// Sends each alert to every channel enabled in `enabled`. Returns the
    /// number of failed deliveries.
    pub async fn dispatch(&self, alerts: &[CategoryAlert], enabled: AlertChannelsConfig) -> usize {
        let active: Vec<&Arc<dyn NotificationChannel>> = self
            .channels
            .iter()
            .filter(|c| c.kind().is_enabled(&enabled))
            .collect();
        if active.is_empty() || alerts.is_empty() {
            return 0;
        }

        let sends = alerts.iter().flat_map(|alert| {
            active.iter().map(move |channel| async move {
                let result = channel.send(alert).await;
                (channel.kind(), alert, result)
            })
        });

        let mut failures = 0;
        for (kind, alert, result) in join_all(sends).await {
            if let Err(e) = result {
                failures += 1;
                metrics::counter!("alerts.notification_failures", "channel" => kind.as_str())
                    .increment(1);
                warn!(
                    alert_id = %alert.id,
                    channel = kind.as_str(),
                    error = %e,
                    "Failed to deliver alert notification"
                );
            }
        }
        failures
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use super::*;
    use crate::types::{AlertMetadata, AlertSeverity, AlertType};
    use parking_lot::Mutex;

    /// Records delivered alert ids, or fails every send.
    pub(crate) struct CaptureChannel {
        pub kind: ChannelKind,
        pub fail: bool,
        pub sent: Mutex<Vec<String>>,
    }

    impl CaptureChannel {
        pub fn new(kind: ChannelKind, fail: bool) -> Arc<Self> {
            Arc::new(Self {
                kind,
                fail,
                sent: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl NotificationChannel for CaptureChannel {
        fn kind(&self) -> ChannelKind {
            self.kind
        }

        async fn send(&self, alert: &CategoryAlert) -> InsightsResult<()> {
            if self.fail {
                return Err(InsightsError::Notification("unreachable".to_string()));
            }
            self.sent.lock().push(alert.id.clone());
            Ok(())
        }
    }

    pub(crate) fn alert(id: &str) -> CategoryAlert {
        CategoryAlert {
            id: id.to_string(),
            alert_type: AlertType::RenderTimeout,
            severity: AlertSeverity::Critical,
            title: "Critical Render Time".to_string(),
            description: "current value (250) is greater than the threshold (200)".to_string(),
            value: 250.0,
            threshold: 200.0,
            timestamp: 1_700_000_000_000,
            resolved: false,
            resolved_at: None,
            metadata: AlertMetadata {
                rule_id: "render-time-critical".to_string(),
                metric_path: "performance.renderTime".to_string(),
                operator: None,
            },
        }
    }

    fn all_channels() -> AlertChannelsConfig {
        AlertChannelsConfig {
            console: true,
            webhook: true,
            email: true,
            slack: true,
        }
    }

    #[tokio::test]
    async fn test_failing_channel_does_not_block_others() {
        let failing = CaptureChannel::new(ChannelKind::Webhook, true);
        let ok = CaptureChannel::new(ChannelKind::Console, false);
        let notifier = Notifier::with_channels(vec![
            failing.clone() as Arc<dyn NotificationChannel>,
            ok.clone(),
        ]);

        let failures = notifier
            .dispatch(&[alert("a_1"), alert("b_1")], all_channels())
            .await;

        assert_eq!(failures, 2);
        assert_eq!(*ok.sent.lock(), vec!["a_1".to_string(), "b_1".to_string()]);
    }

    #[tokio::test]
    async fn test_disabled_channel_is_skipped() {
        let slack = CaptureChannel::new(ChannelKind::Slack, false);
        let notifier = Notifier::with_channels(vec![slack.clone() as Arc<dyn NotificationChannel>]);
        let mut enabled = all_channels();
        enabled.slack = false;

        notifier.dispatch(&[alert("a_1")], enabled).await;
        assert!(slack.sent.lock().is_empty());
    }

    #[test]
    fn test_from_config_skips_channels_without_endpoint() {
        let mut settings = AlertsConfig::default();
        settings.channels = all_channels();
        settings.slack_webhook_url = Some("http://localhost:9/slack".to_string());
        let notifier = Notifier::from_config(&settings, storefront_core::clock::system_clock());
        assert_eq!(
            notifier.channel_kinds(),
            vec![ChannelKind::Console, ChannelKind::Slack]
        );
    }

    #[test]
    fn test_webhook_payload_shape() {
        let a = alert("a_1");
        let payload = WebhookPayload {
            alert: &a,
            source: WEBHOOK_SOURCE,
            timestamp: 42,
        };
        let v = serde_json::to_value(&payload).unwrap();
        assert_eq!(v["source"], "categories_component");
        assert_eq!(v["timestamp"], 42);
        assert_eq!(v["alert"]["type"], "render_timeout");
        assert_eq!(v["alert"]["metadata"]["ruleId"], "render-time-critical");
    }

    #[test]
    fn test_slack_message() {
        let text = SlackChannel::message(&alert("a_1"));
        assert!(text.starts_with("[CRITICAL] Critical Render Time"));
    }
}
