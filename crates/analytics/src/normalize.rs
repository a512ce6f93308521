//! Resolves joined and legacy event rows into [`NormalizedEvent`].
//!
//! Every name is taken from the joined lookup first, then the legacy inline
//! column, then a fixed fallback. Empty strings count as absent at each step.

use storefront_core::types::ProductMeta;
use storefront_core::{NormalizedEvent, RawEvent};

const UNKNOWN: &str = "unknown";

fn first_present<'a>(candidates: impl IntoIterator<Item = Option<&'a str>>) -> Option<&'a str> {
    candidates.into_iter().flatten().find(|s| !s.is_empty())
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_deref().filter(|s| !s.is_empty()).map(str::to_string)
}

pub fn normalize(raw: &RawEvent) -> NormalizedEvent {
    let event_name = first_present([
        raw.analytics_event_types.as_ref().map(|r| r.name.as_str()),
        raw.event_name.as_deref(),
    ])
    .unwrap_or(UNKNOWN);
    let category = first_present([
        raw.analytics_categories.as_ref().map(|r| r.name.as_str()),
        raw.category.as_deref(),
    ])
    .unwrap_or(UNKNOWN);
    let action = first_present([
        raw.analytics_actions.as_ref().map(|r| r.name.as_str()),
        raw.action.as_deref(),
    ])
    .unwrap_or(UNKNOWN);
    let page = first_present([
        raw.analytics_pages.as_ref().map(|r| r.path.as_str()),
        raw.page.as_deref(),
    ])
    .unwrap_or_default();

    let session_id = match raw.session_hash {
        Some(hash) => hash.to_string(),
        None => raw.session_id.clone().unwrap_or_default(),
    };

    NormalizedEvent {
        event_name: event_name.to_string(),
        category: category.to_string(),
        action: action.to_string(),
        label: raw.label.clone(),
        value: raw.value,
        user_id: non_empty(&raw.user_id),
        visitor_id: non_empty(&raw.visitor_hash),
        session_id,
        page: page.to_string(),
        created_at_ms: raw.created_at.to_millis(),
        device_type: non_empty(&raw.device_type),
        user_agent: non_empty(&raw.user_agent),
        product: ProductMeta {
            product_id: raw.product_id.map(|id| id.to_string()),
            product_name: non_empty(&raw.product_name),
            category: non_empty(&raw.category_name),
            price: raw.price,
            quantity: raw.quantity,
        },
    }
}

/// Normalize a batch and order it chronologically. Equal timestamps keep
/// their store order.
pub fn normalize_all(raw: &[RawEvent]) -> Vec<NormalizedEvent> {
    let mut events: Vec<NormalizedEvent> = raw.iter().map(normalize).collect();
    events.sort_by_key(|e| e.created_at_ms);
    events
}
