//! Cache key scheme: `<prefix>:<granularity>:<bucket>[:user:<id>][:session:<id>]`.
//!
//! A calendar bucket label (day, ISO week, month) is only used on its own
//! when the window spans exactly that bucket. Any other window keeps the
//! label and appends its exact bounds.

use chrono::{DateTime, Datelike, Duration, NaiveDate, SecondsFormat, TimeZone, Utc};
use storefront_core::{Granularity, MetricsQueryParams};

/// TTL for a granularity name that is not one of the known buckets.
pub const DEFAULT_TTL_SECS: u64 = 300;

fn exact_range(params: &MetricsQueryParams) -> String {
    format!(
        "{}:{}",
        params.start_date.to_rfc3339_opts(SecondsFormat::Millis, true),
        params.end_date.to_rfc3339_opts(SecondsFormat::Millis, true)
    )
}

/// `[start, next)` of the calendar bucket containing `at`.
fn bucket_bounds(at: DateTime<Utc>, granularity: Granularity) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let day = at.date_naive();
    let (first, next) = match granularity {
        Granularity::Realtime => return None,
        Granularity::Daily => (day, day.succ_opt()?),
        Granularity::Weekly => {
            let monday = day - Duration::days(i64::from(day.weekday().num_days_from_monday()));
            (monday, monday + Duration::days(7))
        }
        Granularity::Monthly => {
            let first = NaiveDate::from_ymd_opt(day.year(), day.month(), 1)?;
            let next = if day.month() == 12 {
                NaiveDate::from_ymd_opt(day.year() + 1, 1, 1)?
            } else {
                NaiveDate::from_ymd_opt(day.year(), day.month() + 1, 1)?
            };
            (first, next)
        }
    };
    Some((
        Utc.from_utc_datetime(&first.and_hms_opt(0, 0, 0)?),
        Utc.from_utc_datetime(&next.and_hms_opt(0, 0, 0)?),
    ))
}

/// True when the window starts at its bucket's first instant and ends
/// within the bucket's last second.
fn spans_bucket(params: &MetricsQueryParams, granularity: Granularity) -> bool {
    match bucket_bounds(params.start_date, granularity) {
        Some((first, next)) => {
            params.start_date == first
                && params.end_date < next
                && params.end_date >= next - Duration::seconds(1)
        }
        None => false,
    }
}

pub fn generate_key(prefix: &str, params: &MetricsQueryParams, granularity: Granularity) -> String {
    let label = match granularity {
        Granularity::Realtime => None,
        Granularity::Daily => Some(params.start_date.format("%Y-%m-%d").to_string()),
        Granularity::Weekly => {
            let week = params.start_date.iso_week();
            Some(format!("{}-W{:02}", week.year(), week.week()))
        }
        Granularity::Monthly => Some(params.start_date.format("%Y-%m").to_string()),
    };
    let bucket = match label {
        None => exact_range(params),
        Some(label) if spans_bucket(params, granularity) => label,
        Some(label) => format!("{label}:{}", exact_range(params)),
    };

    let mut key = format!("{prefix}:{granularity}:{bucket}");
    if let Some(user_id) = &params.user_id {
        key.push_str(":user:");
        key.push_str(user_id);
    }
    if let Some(session_id) = &params.session_id {
        key.push_str(":session:");
        key.push_str(session_id);
    }
    key
}

/// TTL by granularity name; unknown names get [`DEFAULT_TTL_SECS`].
pub fn ttl_for(granularity: &str) -> u64 {
    granularity
        .parse::<Granularity>()
        .map(|g| g.ttl_secs())
        .unwrap_or(DEFAULT_TTL_SECS)
}
