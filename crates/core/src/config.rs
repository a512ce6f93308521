use serde::{Deserialize, Serialize};

/// Root application configuration. Loaded from environment variables
/// with the prefix `STOREFRONT_INSIGHTS__`.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_node_id")]
    pub node_id: String,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub clickhouse: ClickHouseConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub alerts: AlertsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

/// Distributed cache tier. Every call against it is bounded by the
/// timeouts below.
#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    #[serde(default = "default_redis_urls")]
    pub urls: Vec<String>,
    #[serde(default = "default_redis_enabled")]
    pub enabled: bool,
    #[serde(default = "default_op_timeout_ms")]
    pub op_timeout_ms: u64,
    #[serde(default = "default_scan_timeout_ms")]
    pub scan_timeout_ms: u64,
    #[serde(default = "default_delete_timeout_ms")]
    pub delete_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClickHouseConfig {
    #[serde(default = "default_clickhouse_url")]
    pub url: String,
    #[serde(default = "default_clickhouse_db")]
    pub database: String,
    #[serde(default = "default_events_table")]
    pub events_table: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    #[serde(default = "default_local_max_entries")]
    pub local_max_entries: usize,
}

// Default functions
fn default_node_id() -> String {
    "insights-01".to_string()
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_http_port() -> u16 {
    8080
}
fn default_metrics_port() -> u16 {
    9091
}
fn default_redis_urls() -> Vec<String> {
    vec!["redis://localhost:6379".to_string()]
}
fn default_redis_enabled() -> bool {
    true
}
fn default_op_timeout_ms() -> u64 {
    1000
}
fn default_scan_timeout_ms() -> u64 {
    2000
}
fn default_delete_timeout_ms() -> u64 {
    1000
}
fn default_clickhouse_url() -> String {
    "http://localhost:8123".to_string()
}
fn default_clickhouse_db() -> String {
    "storefront".to_string()
}
fn default_events_table() -> String {
    "analytics_events_optimized".to_string()
}
fn default_key_prefix() -> String {
    "analytics".to_string()
}
fn default_local_max_entries() -> usize {
    100
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            http_port: default_http_port(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            port: default_metrics_port(),
        }
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            urls: default_redis_urls(),
            enabled: default_redis_enabled(),
            op_timeout_ms: default_op_timeout_ms(),
            scan_timeout_ms: default_scan_timeout_ms(),
            delete_timeout_ms: default_delete_timeout_ms(),
        }
    }
}

impl Default for ClickHouseConfig {
    fn default() -> Self {
        Self {
            url: default_clickhouse_url(),
            database: default_clickhouse_db(),
            events_table: default_events_table(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            key_prefix: default_key_prefix(),
            local_max_entries: default_local_max_entries(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            node_id: default_node_id(),
            api: ApiConfig::default(),
            metrics: MetricsConfig::default(),
            redis: RedisConfig::default(),
            clickhouse: ClickHouseConfig::default(),
            cache: CacheConfig::default(),
            alerts: AlertsConfig::default(),
        }
    }
}

// ─── Alerts Config ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct AlertsConfig {
    #[serde(default = "default_alerts_enabled")]
    pub enabled: bool,
    #[serde(default = "default_cooldown_ms")]
    pub default_cooldown_ms: u64,
    #[serde(default = "default_max_alerts_per_hour")]
    pub max_alerts_per_hour: u32,
    #[serde(default)]
    pub debug: bool,
    #[serde(default)]
    pub channels: AlertChannelsConfig,
    #[serde(default)]
    pub webhook_url: Option<String>,
    #[serde(default)]
    pub slack_webhook_url: Option<String>,
    #[serde(default)]
    pub email_relay_url: Option<String>,
    #[serde(default)]
    pub email_recipients: Vec<String>,
    #[serde(default = "default_notify_timeout_ms")]
    pub notify_timeout_ms: u64,
}

/// Independently toggleable notification channels.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct AlertChannelsConfig {
    #[serde(default = "default_channel_console")]
    pub console: bool,
    #[serde(default = "default_channel_webhook")]
    pub webhook: bool,
    #[serde(default)]
    pub email: bool,
    #[serde(default)]
    pub slack: bool,
}

fn default_alerts_enabled() -> bool { true }
fn default_cooldown_ms() -> u64 { 5 * 60 * 1000 }
fn default_max_alerts_per_hour() -> u32 { 20 }
fn default_notify_timeout_ms() -> u64 { 5000 }
fn default_channel_console() -> bool { true }
fn default_channel_webhook() -> bool { true }

impl Default for AlertChannelsConfig {
    fn default() -> Self {
        Self {
            console: default_channel_console(),
            webhook: default_channel_webhook(),
            email: false,
            slack: false,
        }
    }
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            enabled: default_alerts_enabled(),
            default_cooldown_ms: default_cooldown_ms(),
            max_alerts_per_hour: default_max_alerts_per_hour(),
            debug: false,
            channels: AlertChannelsConfig::default(),
            webhook_url: None,
            slack_webhook_url: None,
            email_relay_url: None,
            email_recipients: Vec::new(),
            notify_timeout_ms: default_notify_timeout_ms(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder().add_source(
            config::Environment::with_prefix("STOREFRONT_INSIGHTS")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("redis.urls")
                .with_list_parse_key("alerts.email_recipients"),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let config = AppConfig::default();
        assert_eq!(config.cache.local_max_entries, 100);
        assert_eq!(config.cache.key_prefix, "analytics");
        assert_eq!(config.redis.scan_timeout_ms, 2000);
        assert_eq!(config.alerts.max_alerts_per_hour, 20);
        assert_eq!(config.alerts.default_cooldown_ms, 300_000);
        assert!(config.alerts.channels.console);
        assert!(config.alerts.channels.webhook);
        assert!(!config.alerts.channels.email);
        assert!(!config.alerts.channels.slack);
    }

    #[test]
    fn test_partial_section_uses_field_defaults() {
        let alerts: AlertsConfig =
            serde_json::from_str(r#"{"max_alerts_per_hour": 3}"#).expect("valid json");
        assert_eq!(alerts.max_alerts_per_hour, 3);
        assert!(alerts.enabled);
        assert_eq!(alerts.notify_timeout_ms, 5000);
    }
}
