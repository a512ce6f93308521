//! Read access to the raw analytics event table.

use crate::session::hash_session_id;
use async_trait::async_trait;
use clickhouse::Row;
use parking_lot::RwLock;
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, Ordering};
use storefront_core::config::ClickHouseConfig;
use storefront_core::types::{EventTimestamp, NameRef, PathRef};
use storefront_core::{InsightsError, InsightsResult, MetricsQueryParams, RawEvent};
use tracing::debug;

/// Filter applied by an [`EventStore`]. Bounds are inclusive, epoch ms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventQuery {
    pub start_ms: i64,
    pub end_ms: i64,
    pub user_id: Option<String>,
    pub session_hash: Option<i64>,
}

impl EventQuery {
    pub fn from_params(params: &MetricsQueryParams) -> Self {
        Self {
            start_ms: params.start_date.timestamp_millis(),
            end_ms: params.end_date.timestamp_millis(),
            user_id: params.user_id.clone(),
            session_hash: params
                .session_id
                .as_deref()
                .map(|id| i64::from(hash_session_id(id))),
        }
    }

    fn matches(&self, event: &RawEvent) -> bool {
        let ts = event.created_at.to_millis();
        if ts < self.start_ms || ts > self.end_ms {
            return false;
        }
        if let Some(user_id) = &self.user_id {
            if event.user_id.as_ref() != Some(user_id) {
                return false;
            }
        }
        if let Some(hash) = self.session_hash {
            if event.session_hash != Some(hash) {
                return false;
            }
        }
        true
    }
}

#[async_trait]
pub trait EventStore: Send + Sync {
    async fn fetch(&self, query: &EventQuery) -> InsightsResult<Vec<RawEvent>>;
}

/// One row of the optimized events table with its lookup joins resolved.
/// Column order must match [`ClickHouseEventStore::select_sql`].
#[derive(Debug, Row, Deserialize)]
struct EventRow {
    id: String,
    label: Option<String>,
    value: Option<f64>,
    user_id: Option<String>,
    session_hash: Option<i64>,
    visitor_hash: Option<String>,
    created_at: i64,
    product_id: Option<i64>,
    product_name: Option<String>,
    category_name: Option<String>,
    price: Option<f64>,
    quantity: Option<f64>,
    device_type: Option<String>,
    user_agent: Option<String>,
    // LEFT JOIN fills missing lookups with ''.
    event_type_ref: String,
    category_ref: String,
    action_ref: String,
    page_ref: String,
}

fn name_ref(name: String) -> Option<NameRef> {
    (!name.is_empty()).then_some(NameRef { name })
}

impl From<EventRow> for RawEvent {
    fn from(row: EventRow) -> Self {
        RawEvent {
            id: row.id,
            label: row.label,
            value: row.value,
            user_id: row.user_id,
            session_hash: row.session_hash,
            visitor_hash: row.visitor_hash,
            created_at: EventTimestamp::Epoch(row.created_at),
            product_id: row.product_id,
            product_name: row.product_name,
            category_name: row.category_name,
            price: row.price,
            quantity: row.quantity,
            device_type: row.device_type,
            user_agent: row.user_agent,
            analytics_event_types: name_ref(row.event_type_ref),
            analytics_categories: name_ref(row.category_ref),
            analytics_actions: name_ref(row.action_ref),
            analytics_pages: (!row.page_ref.is_empty()).then_some(PathRef { path: row.page_ref }),
            ..Default::default()
        }
    }
}

/// Event store backed by the ClickHouse events table. `created_at` is
/// stored as epoch seconds.
pub struct ClickHouseEventStore {
    client: clickhouse::Client,
    table: String,
}

impl ClickHouseEventStore {
    pub fn new(config: &ClickHouseConfig) -> Self {
        let client = clickhouse::Client::default()
            .with_url(&config.url)
            .with_database(&config.database);
        Self {
            client,
            table: config.events_table.clone(),
        }
    }

    fn select_sql(&self, query: &EventQuery) -> String {
        let mut sql = format!(
            "SELECT e.id, e.label, e.value, e.user_id, e.session_hash, e.visitor_hash, \
             toInt64(e.created_at), e.product_id, e.product_name, e.category_name, e.price, \
             e.quantity, e.device_type, e.user_agent, \
             t.name, c.name, a.name, p.path \
             FROM {} AS e \
             LEFT JOIN analytics_event_types AS t ON t.id = e.event_type \
             LEFT JOIN analytics_categories AS c ON c.id = e.category_id \
             LEFT JOIN analytics_actions AS a ON a.id = e.action_id \
             LEFT JOIN analytics_pages AS p ON p.id = e.page_id \
             WHERE e.created_at >= ? AND e.created_at <= ?",
            self.table
        );
        if query.user_id.is_some() {
            sql.push_str(" AND e.user_id = ?");
        }
        if query.session_hash.is_some() {
            sql.push_str(" AND e.session_hash = ?");
        }
        sql.push_str(" ORDER BY e.created_at ASC");
        sql
    }
}

#[async_trait]
impl EventStore for ClickHouseEventStore {
    async fn fetch(&self, query: &EventQuery) -> InsightsResult<Vec<RawEvent>> {
        let sql = self.select_sql(query);
        let mut q = self
            .client
            .query(&sql)
            .bind(query.start_ms.div_euclid(1000))
            .bind(query.end_ms.div_euclid(1000));
        if let Some(user_id) = &query.user_id {
            q = q.bind(user_id.as_str());
        }
        if let Some(hash) = query.session_hash {
            q = q.bind(hash);
        }

        let rows = q
            .fetch_all::<EventRow>()
            .await
            .map_err(|e| InsightsError::EventStore(e.to_string()))?;
        debug!(rows = rows.len(), table = %self.table, "Fetched analytics events");
        Ok(rows.into_iter().map(RawEvent::from).collect())
    }
}

/// Process-local event store for tests and offline runs.
#[derive(Default)]
pub struct InMemoryEventStore {
    events: RwLock<Vec<RawEvent>>,
    failing: AtomicBool,
}

impl InMemoryEventStore {
    pub fn new(events: Vec<RawEvent>) -> Self {
        Self {
            events: RwLock::new(events),
            failing: AtomicBool::new(false),
        }
    }

    pub fn push(&self, event: RawEvent) {
        self.events.write().push(event);
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn fetch(&self, query: &EventQuery) -> InsightsResult<Vec<RawEvent>> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(InsightsError::EventStore("in-memory store unavailable".into()));
        }
        Ok(self
            .events
            .read()
            .iter()
            .filter(|e| query.matches(e))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn event(id: &str, secs: i64) -> RawEvent {
        RawEvent {
            id: id.into(),
            created_at: EventTimestamp::Epoch(secs),
            ..Default::default()
        }
    }

    fn params() -> MetricsQueryParams {
        MetricsQueryParams::new(
            Utc.timestamp_opt(1_000, 0).unwrap(),
            Utc.timestamp_opt(2_000, 0).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_range_is_inclusive() {
        let store = InMemoryEventStore::new(vec![
            event("before", 999),
            event("start", 1_000),
            event("end", 2_000),
            event("after", 2_001),
        ]);
        let rows = store.fetch(&EventQuery::from_params(&params())).await.unwrap();
        let ids: Vec<_> = rows.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["start", "end"]);
    }

    #[tokio::test]
    async fn test_user_and_session_filters() {
        let mut mine = event("mine", 1_500);
        mine.user_id = Some("u1".into());
        mine.session_hash = Some(i64::from(hash_session_id("abc")));
        let mut other_session = mine.clone();
        other_session.id = "other-session".into();
        other_session.session_hash = Some(1);
        let mut other_user = mine.clone();
        other_user.id = "other-user".into();
        other_user.user_id = Some("u2".into());

        let store = InMemoryEventStore::new(vec![mine, other_session, other_user]);
        let query = EventQuery::from_params(&params().with_user("u1").with_session("abc"));
        assert_eq!(query.session_hash, Some(96354));

        let rows = store.fetch(&query).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, "mine");
    }

    #[tokio::test]
    async fn test_failing_store_errors() {
        let store = InMemoryEventStore::default();
        store.set_failing(true);
        let err = store.fetch(&EventQuery::from_params(&params())).await;
        assert!(matches!(err, Err(InsightsError::EventStore(_))));
    }

    #[test]
    fn test_select_sql_adds_optional_filters() {
        let store = ClickHouseEventStore::new(&ClickHouseConfig::default());
        let base = EventQuery::from_params(&params());
        let sql = store.select_sql(&base);
        assert!(sql.contains("FROM analytics_events_optimized AS e"));
        assert!(!sql.contains("e.user_id = ?"));

        let scoped = EventQuery::from_params(&params().with_user("u").with_session("s"));
        let sql = store.select_sql(&scoped);
        assert!(sql.contains("AND e.user_id = ? AND e.session_hash = ?"));
    }

    #[test]
    fn test_row_maps_empty_joins_to_none() {
        let row = EventRow {
            id: "r1".into(),
            label: None,
            value: Some(10.0),
            user_id: None,
            session_hash: Some(7),
            visitor_hash: None,
            created_at: 1_768_788_256,
            product_id: None,
            product_name: None,
            category_name: None,
            price: None,
            quantity: None,
            device_type: None,
            user_agent: None,
            event_type_ref: String::new(),
            category_ref: "shop".into(),
            action_ref: "purchase".into(),
            page_ref: String::new(),
        };
        let raw = RawEvent::from(row);
        assert!(raw.analytics_event_types.is_none());
        assert_eq!(raw.analytics_categories.unwrap().name, "shop");
        assert!(raw.analytics_pages.is_none());
        assert_eq!(raw.created_at.to_millis(), 1_768_788_256_000);
    }
}
