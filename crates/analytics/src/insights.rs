//! Product, funnel, interaction, search and per-category breakdowns.

use crate::calculator::{group_by_session, page_flows, page_or_unknown, top_counts};
use std::collections::{BTreeMap, HashMap, HashSet};
use storefront_core::metrics::{
    percentage, round2, CategoryPerformance, CategoryProductStats, DropOffPoint, FlowCount,
    FunnelAnalysis, FunnelStep, InteractionMetrics, InteractionShare, PageInteractions, PageShare,
    ProductAnalytics, ProductCartStats, ProductViewStats, QueryCount, QueryStats, RangeCount,
    SearchAnalytics,
};
use storefront_core::NormalizedEvent;

const TOP_PRODUCTS: usize = 20;
const TOP_JOURNEYS: usize = 20;
const TOP_QUERIES: usize = 20;
const TOP_ENTRY_EXIT: usize = 10;
const INTERACTION_KINDS: [&str; 5] = ["click", "hover", "scroll", "focus", "input"];

/// Product id: explicit id, else the first digit run of the label, else the
/// whole label, else `unknown`.
fn resolve_product_id(event: &NormalizedEvent) -> String {
    if let Some(id) = event.product.product_id.as_deref().filter(|id| !id.is_empty()) {
        return id.to_string();
    }
    match event.label.as_deref().filter(|l| !l.is_empty()) {
        Some(label) => label
            .split(|c: char| !c.is_ascii_digit())
            .find(|run| !run.is_empty())
            .unwrap_or(label)
            .to_string(),
        None => "unknown".to_string(),
    }
}

fn resolve_product_name(event: &NormalizedEvent, product_id: &str) -> String {
    if let Some(name) = &event.product.product_name {
        return name.clone();
    }
    if product_id == "unknown" {
        "Unknown Product".to_string()
    } else if product_id.parse::<f64>().is_ok() {
        format!("Product #{product_id}")
    } else {
        product_id.to_string()
    }
}

fn product_category(event: &NormalizedEvent) -> String {
    event
        .product
        .category
        .clone()
        .unwrap_or_else(|| "Unknown".to_string())
}

#[derive(Default)]
struct CartTally {
    product_id: String,
    product_name: String,
    category: String,
    additions: f64,
    revenue: f64,
    price_sum: f64,
    price_count: u64,
}

pub fn products(events: &[NormalizedEvent]) -> ProductAnalytics {
    let additions: Vec<&NormalizedEvent> = events.iter().filter(|e| e.is_cart_addition()).collect();

    let mut cart: HashMap<String, CartTally> = HashMap::new();
    for e in &additions {
        let product_id = resolve_product_id(e);
        let product_name = resolve_product_name(e, &product_id);
        let price = e.product.price.or(e.value).unwrap_or(0.0);
        let quantity = e.product.quantity.unwrap_or(1.0);

        let tally = cart
            .entry(format!("{product_id}:{product_name}"))
            .or_insert_with(|| CartTally {
                category: product_category(e),
                product_id,
                product_name,
                ..Default::default()
            });
        tally.additions += quantity;
        tally.revenue += price * quantity;
        tally.price_sum += price;
        tally.price_count += 1;
    }
    let mut top_products_added_to_cart: Vec<ProductCartStats> = cart
        .into_values()
        .map(|t| ProductCartStats {
            average_price: if t.price_count > 0 {
                round2(t.price_sum / t.price_count as f64)
            } else {
                0.0
            },
            product_id: t.product_id,
            product_name: t.product_name,
            category: t.category,
            total_additions: t.additions,
            total_revenue: round2(t.revenue),
        })
        .collect();
    top_products_added_to_cart.sort_by(|a, b| {
        b.total_additions
            .total_cmp(&a.total_additions)
            .then_with(|| a.product_id.cmp(&b.product_id))
            .then_with(|| a.product_name.cmp(&b.product_name))
    });
    top_products_added_to_cart.truncate(TOP_PRODUCTS);

    let mut viewed: HashMap<String, ProductViewStats> = HashMap::new();
    for e in events.iter().filter(|e| e.is_product_view()) {
        let product_id = resolve_product_id(e);
        let product_name = resolve_product_name(e, &product_id);
        viewed
            .entry(format!("{product_id}:{product_name}"))
            .or_insert_with(|| ProductViewStats {
                category: product_category(e),
                product_id,
                product_name,
                views: 0,
            })
            .views += 1;
    }
    let mut top_products_viewed: Vec<ProductViewStats> = viewed.into_values().collect();
    top_products_viewed.sort_by(|a, b| {
        b.views
            .cmp(&a.views)
            .then_with(|| a.product_id.cmp(&b.product_id))
            .then_with(|| a.product_name.cmp(&b.product_name))
    });
    top_products_viewed.truncate(TOP_PRODUCTS);

    let mut by_category: BTreeMap<String, (u64, f64)> = BTreeMap::new();
    for e in events {
        let slot = by_category.entry(product_category(e)).or_default();
        slot.0 += 1;
        if e.is_purchase() {
            slot.1 += e.value.unwrap_or(0.0);
        }
    }
    let mut products_by_category: Vec<CategoryProductStats> = by_category
        .into_iter()
        .map(|(category, (count, revenue))| CategoryProductStats {
            category,
            count,
            revenue,
        })
        .collect();
    products_by_category.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.category.cmp(&b.category)));

    let mut buckets = [0u64; 4];
    for value in additions.iter().filter_map(|e| e.value).filter(|v| *v > 0.0) {
        let idx = match value {
            v if v <= 100.0 => 0,
            v if v <= 500.0 => 1,
            v if v <= 1000.0 => 2,
            _ => 3,
        };
        buckets[idx] += 1;
    }
    let cart_value_distribution = ["0-100", "101-500", "501-1000", "1000+"]
        .iter()
        .zip(buckets)
        .map(|(range, count)| RangeCount {
            range: (*range).to_string(),
            count,
        })
        .collect();

    ProductAnalytics {
        top_products_added_to_cart,
        top_products_viewed,
        products_by_category,
        cart_value_distribution,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum FunnelStage {
    ProductView,
    AddToCart,
    BeginCheckout,
    Purchase,
}

impl FunnelStage {
    const ALL: [FunnelStage; 4] = [
        FunnelStage::ProductView,
        FunnelStage::AddToCart,
        FunnelStage::BeginCheckout,
        FunnelStage::Purchase,
    ];

    fn name(self) -> &'static str {
        match self {
            FunnelStage::ProductView => "product_view",
            FunnelStage::AddToCart => "add_to_cart",
            FunnelStage::BeginCheckout => "begin_checkout",
            FunnelStage::Purchase => "purchase",
        }
    }

    /// First matching stage wins.
    fn of(event: &NormalizedEvent) -> Option<Self> {
        if event.event_name == "product_view"
            || event.is_product_view()
            || event.product.product_id.is_some()
        {
            Some(FunnelStage::ProductView)
        } else if event.is_cart_addition() {
            Some(FunnelStage::AddToCart)
        } else if event.action == "begin_checkout" || event.event_name == "begin_checkout" {
            Some(FunnelStage::BeginCheckout)
        } else if event.is_purchase() {
            Some(FunnelStage::Purchase)
        } else {
            None
        }
    }
}

fn clamped_rate(numerator: u64, denominator: u64) -> f64 {
    percentage(numerator as f64, denominator as f64).clamp(0.0, 100.0)
}

fn drop_off_rate(current: u64, previous: u64) -> f64 {
    if previous == 0 {
        0.0
    } else {
        percentage(previous as f64 - current as f64, previous as f64).clamp(0.0, 100.0)
    }
}

pub fn funnel(events: &[NormalizedEvent]) -> FunnelAnalysis {
    let mut sessions_at: HashMap<FunnelStage, HashSet<&str>> = HashMap::new();
    for e in events.iter().filter(|e| !e.session_id.is_empty()) {
        if let Some(stage) = FunnelStage::of(e) {
            sessions_at.entry(stage).or_default().insert(e.session_id.as_str());
        }
    }
    let counts: Vec<u64> = FunnelStage::ALL
        .iter()
        .map(|s| sessions_at.get(s).map_or(0, |set| set.len() as u64))
        .collect();

    // Gap between consecutive staged events of a session, keyed by transition.
    let mut gaps: HashMap<(FunnelStage, FunnelStage), (i64, u64)> = HashMap::new();
    for session in group_by_session(events).values() {
        let staged: Vec<(FunnelStage, i64)> = session
            .iter()
            .filter_map(|e| FunnelStage::of(e).map(|s| (s, e.created_at_ms)))
            .collect();
        for pair in staged.windows(2) {
            let slot = gaps.entry((pair[0].0, pair[1].0)).or_default();
            slot.0 += pair[1].1 - pair[0].1;
            slot.1 += 1;
        }
    }
    let average_gap = |from: FunnelStage, to: FunnelStage| -> f64 {
        gaps.get(&(from, to))
            .map_or(0.0, |(total, n)| round2(*total as f64 / *n as f64 / 1000.0))
    };

    let mut steps = Vec::with_capacity(FunnelStage::ALL.len());
    let mut drop_off_points = Vec::with_capacity(FunnelStage::ALL.len() - 1);
    for (i, stage) in FunnelStage::ALL.iter().enumerate() {
        let count = counts[i];
        let next = counts.get(i + 1).copied();
        steps.push(FunnelStep {
            step: stage.name().to_string(),
            count,
            conversion_rate: next.map_or(100.0, |n| clamped_rate(n, count)),
            average_time: if i == 0 {
                0.0
            } else {
                average_gap(FunnelStage::ALL[i - 1], *stage)
            },
            drop_off_rate: next.map_or(0.0, |n| drop_off_rate(n, count)),
        });
        if let Some(n) = next {
            drop_off_points.push(DropOffPoint {
                from_step: stage.name().to_string(),
                to_step: FunnelStage::ALL[i + 1].name().to_string(),
                drop_off_count: count.saturating_sub(n),
                drop_off_rate: drop_off_rate(n, count),
            });
        }
    }

    FunnelAnalysis {
        steps,
        drop_off_points,
        total_conversion_rate: clamped_rate(counts[3], counts[0]),
    }
}

/// Interaction kind of an event, if it is one.
fn interaction_kind(event: &NormalizedEvent) -> Option<&str> {
    let kind = if event.action == "unknown" {
        event.event_name.as_str()
    } else {
        event.action.as_str()
    };
    INTERACTION_KINDS.contains(&kind).then_some(kind)
}

#[derive(Default)]
struct PageTally {
    clicks: u64,
    hovers: u64,
    scrolls: u64,
    events: u64,
    first_ms: i64,
    last_ms: i64,
}

fn page_shares(counts: HashMap<String, u64>, total: u64) -> Vec<PageShare> {
    top_counts(counts, TOP_ENTRY_EXIT)
        .into_iter()
        .map(|(page, count)| PageShare {
            percentage: percentage(count as f64, total as f64),
            page,
            count,
        })
        .collect()
}

pub fn interactions(events: &[NormalizedEvent]) -> InteractionMetrics {
    let mut kind_counts: HashMap<String, u64> = HashMap::new();
    let mut pages: HashMap<&str, PageTally> = HashMap::new();

    for e in events {
        let kind = interaction_kind(e);
        if let Some(kind) = kind {
            *kind_counts.entry(kind.to_string()).or_default() += 1;
        }

        let tally = pages.entry(page_or_unknown(e)).or_insert_with(|| PageTally {
            first_ms: e.created_at_ms,
            ..Default::default()
        });
        match kind {
            Some("click") => tally.clicks += 1,
            Some("hover") => tally.hovers += 1,
            Some("scroll") => tally.scrolls += 1,
            _ => {}
        }
        tally.events += 1;
        tally.last_ms = e.created_at_ms;
    }

    let total_interactions: u64 = kind_counts.values().sum();
    let top_interactions = top_counts(kind_counts, usize::MAX)
        .into_iter()
        .map(|(kind, count)| InteractionShare {
            percentage: percentage(count as f64, total_interactions as f64),
            kind,
            count,
        })
        .collect();

    let mut page_interactions: Vec<PageInteractions> = pages
        .into_iter()
        .map(|(page, t)| PageInteractions {
            page: page.to_string(),
            clicks: t.clicks,
            hovers: t.hovers,
            scrolls: t.scrolls,
            average_time: if t.events > 1 {
                round2((t.last_ms - t.first_ms) as f64 / 1000.0 / t.events as f64)
            } else {
                0.0
            },
        })
        .collect();
    page_interactions.sort_by(|a, b| {
        let total = |p: &PageInteractions| p.clicks + p.hovers + p.scrolls;
        total(b).cmp(&total(a)).then_with(|| a.page.cmp(&b.page))
    });

    let user_journey = top_counts(page_flows(events), TOP_JOURNEYS)
        .into_iter()
        .map(|(flow, count)| FlowCount { flow, count })
        .collect();

    let sessions = group_by_session(events);
    let mut entries: HashMap<String, u64> = HashMap::new();
    let mut exits: HashMap<String, u64> = HashMap::new();
    for session in sessions.values() {
        if let (Some(first), Some(last)) = (session.first(), session.last()) {
            *entries.entry(page_or_unknown(first).to_string()).or_default() += 1;
            *exits.entry(page_or_unknown(last).to_string()).or_default() += 1;
        }
    }
    let total_sessions = sessions.len() as u64;

    InteractionMetrics {
        top_interactions,
        page_interactions,
        user_journey,
        exit_pages: page_shares(exits, total_sessions),
        entry_pages: page_shares(entries, total_sessions),
    }
}

fn is_search(event: &NormalizedEvent) -> bool {
    matches!(event.action.as_str(), "search" | "search_query")
        || matches!(event.event_name.as_str(), "search" | "search_query")
}

pub fn search(events: &[NormalizedEvent]) -> SearchAnalytics {
    // Latest add-to-cart or purchase per session.
    let mut last_conversion: HashMap<&str, i64> = HashMap::new();
    for e in events.iter().filter(|e| e.action == "add_to_cart" || e.is_purchase()) {
        let slot = last_conversion.entry(e.session_id.as_str()).or_insert(e.created_at_ms);
        *slot = (*slot).max(e.created_at_ms);
    }

    let mut query_counts: HashMap<String, u64> = HashMap::new();
    let mut query_conversions: HashMap<String, u64> = HashMap::new();
    let mut total_searches = 0u64;
    let mut total_conversions = 0u64;
    for e in events.iter().filter(|e| is_search(e)) {
        let query = e.label.clone().unwrap_or_else(|| "unknown".to_string());
        total_searches += 1;
        let converted = last_conversion
            .get(e.session_id.as_str())
            .is_some_and(|&t| t > e.created_at_ms);
        if converted {
            total_conversions += 1;
            *query_conversions.entry(query.clone()).or_default() += 1;
        }
        *query_counts.entry(query).or_default() += 1;
    }

    let top_queries: Vec<QueryStats> = top_counts(query_counts, TOP_QUERIES)
        .into_iter()
        .map(|(query, count)| QueryStats {
            conversion_rate: percentage(
                query_conversions.get(&query).copied().unwrap_or(0) as f64,
                count as f64,
            ),
            query,
            count,
        })
        .collect();
    let no_results = top_queries
        .iter()
        .filter(|q| q.count <= 1 && q.conversion_rate == 0.0)
        .map(|q| QueryCount {
            query: q.query.clone(),
            count: q.count,
        })
        .collect();

    SearchAnalytics {
        top_queries,
        no_results,
        conversion_rate: percentage(total_conversions as f64, total_searches as f64),
    }
}

#[derive(Default)]
struct CategoryTally<'a> {
    total_events: u64,
    sessions: HashSet<&'a str>,
    users: HashSet<&'a str>,
    views: u64,
    cart_additions: u64,
    purchases: u64,
    revenue: f64,
}

/// Totals per product category, over events that carry both a product id
/// and a product category.
pub fn category_performance(events: &[NormalizedEvent]) -> Vec<CategoryPerformance> {
    let mut tallies: HashMap<&str, CategoryTally> = HashMap::new();

    for e in events.iter().filter(|e| e.product.product_id.is_some()) {
        let Some(category) = e.product.category.as_deref() else {
            continue;
        };
        let t = tallies.entry(category).or_default();
        t.total_events += 1;
        if !e.session_id.is_empty() {
            t.sessions.insert(e.session_id.as_str());
        }
        if let Some(identity) = e.identity() {
            t.users.insert(identity);
        }
        if e.event_name == "product_view"
            || e.action == "view_item"
            || e.action == "view"
            || e.event_name == "page_view"
        {
            t.views += 1;
        }
        if e.is_cart_addition() {
            t.cart_additions += 1;
        }
        if e.is_purchase() {
            t.purchases += 1;
            let price = e.product.price.or(e.value).unwrap_or(0.0);
            t.revenue += price * e.product.quantity.unwrap_or(1.0);
        }
    }

    let mut performance: Vec<CategoryPerformance> = tallies
        .into_iter()
        .map(|(category, t)| CategoryPerformance {
            category: category.to_string(),
            total_events: t.total_events,
            unique_sessions: t.sessions.len() as u64,
            unique_users: t.users.len() as u64,
            views: t.views,
            cart_additions: t.cart_additions,
            purchases: t.purchases,
            total_revenue: round2(t.revenue),
            conversion_rate: percentage(t.purchases as f64, t.views as f64),
        })
        .collect();
    performance.sort_by(|a, b| {
        b.total_events
            .cmp(&a.total_events)
            .then_with(|| a.category.cmp(&b.category))
    });
    performance
}
