#![warn(clippy::unwrap_used)]

pub mod engine;
pub mod notify;
pub mod rate_limit;
pub mod rules;
pub mod snapshot;
pub mod types;

pub use engine::{AlertsManager, DEFAULT_HISTORY_LIMIT};
pub use notify::{ChannelKind, NotificationChannel, Notifier};
pub use rate_limit::{HourlyRateLimiter, RateLimiter};
pub use rules::{default_rules, AlertRule, RuleCondition, RuleDefinition, RuleUpdate, RuleView};
pub use snapshot::CategoryMetrics;
pub use types::{
    AlertConfig, AlertConfigUpdate, AlertSeverity, AlertStatistics, AlertType, CategoryAlert,
    Operator,
};
