//! Analytics-ready summary tables: per-session activity, per-order totals and
//! per-user revenue. Computed independently of the funnel tables.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use shopfunnel_core::types::{round2, Event, Order, Product, User};
use shopfunnel_core::{read_table, write_table, FunnelResult, Table};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub user_id: String,
    pub events_count: u64,
    pub first_ts: NaiveDateTime,
    pub last_ts: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderSummary {
    pub order_id: String,
    pub user_id: String,
    pub total: f64,
    pub n_items: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserMetrics {
    pub user_id: String,
    pub total_revenue: f64,
    pub orders: u64,
}

impl Table for SessionSummary {
    const FILE_NAME: &'static str = "sessions.csv";
    const COLUMNS: &'static [&'static str] =
        &["session_id", "user_id", "events_count", "first_ts", "last_ts"];
}

impl Table for OrderSummary {
    const FILE_NAME: &'static str = "orders_summary.csv";
    const COLUMNS: &'static [&'static str] = &["order_id", "user_id", "total", "n_items"];
}

impl Table for UserMetrics {
    const FILE_NAME: &'static str = "user_metrics.csv";
    const COLUMNS: &'static [&'static str] = &["user_id", "total_revenue", "orders"];
}

#[derive(Debug, Clone, Default)]
pub struct AnalyticsTables {
    pub sessions: Vec<SessionSummary>,
    pub orders: Vec<OrderSummary>,
    pub users: Vec<UserMetrics>,
}

/// One row per distinct (session_id, user_id) pair, ordered by that pair.
pub fn summarize_sessions(events: &[Event]) -> Vec<SessionSummary> {
    let mut sessions: BTreeMap<(&str, &str), SessionSummary> = BTreeMap::new();
    for event in events {
        sessions
            .entry((event.session_id.as_str(), event.user_id.as_str()))
            .and_modify(|s| {
                s.events_count += 1;
                s.first_ts = s.first_ts.min(event.timestamp);
                s.last_ts = s.last_ts.max(event.timestamp);
            })
            .or_insert_with(|| SessionSummary {
                session_id: event.session_id.clone(),
                user_id: event.user_id.clone(),
                events_count: 1,
                first_ts: event.timestamp,
                last_ts: event.timestamp,
            });
    }
    sessions.into_values().collect()
}

/// One row per (order_id, user_id) with summed totals and quantities.
pub fn summarize_orders(orders: &[Order]) -> Vec<OrderSummary> {
    let mut summaries: BTreeMap<(&str, &str), (f64, u64)> = BTreeMap::new();
    for order in orders {
        let entry = summaries
            .entry((order.order_id.as_str(), order.user_id.as_str()))
            .or_default();
        entry.0 += order.total;
        entry.1 += u64::from(order.quantity);
    }
    summaries
        .into_iter()
        .map(|((order_id, user_id), (total, n_items))| OrderSummary {
            order_id: order_id.to_string(),
            user_id: user_id.to_string(),
            total: round2(total),
            n_items,
        })
        .collect()
}

/// Revenue and distinct order count per user who ordered.
pub fn summarize_users(orders: &[OrderSummary]) -> Vec<UserMetrics> {
    let mut users: BTreeMap<&str, (f64, BTreeSet<&str>)> = BTreeMap::new();
    for order in orders {
        let entry = users.entry(order.user_id.as_str()).or_default();
        entry.0 += order.total;
        entry.1.insert(order.order_id.as_str());
    }
    users
        .into_iter()
        .map(|(user_id, (revenue, order_ids))| UserMetrics {
            user_id: user_id.to_string(),
            total_revenue: round2(revenue),
            orders: order_ids.len() as u64,
        })
        .collect()
}

/// Read the raw tables from `raw_dir` and write `sessions.csv`,
/// `orders_summary.csv` and `user_metrics.csv` into `out_dir`.
pub fn build_analytics_tables(raw_dir: &Path, out_dir: &Path) -> FunnelResult<AnalyticsTables> {
    // Users and products are not aggregated but must be present.
    let users = read_table::<User>(raw_dir)?;
    let products = read_table::<Product>(raw_dir)?;
    let events = read_table::<Event>(raw_dir)?;
    let orders = read_table::<Order>(raw_dir)?;
    debug!(
        users = users.len(),
        products = products.len(),
        events = events.len(),
        orders = orders.len(),
        "Loaded raw tables"
    );

    let sessions = summarize_sessions(&events);
    let order_summaries = summarize_orders(&orders);
    let user_metrics = summarize_users(&order_summaries);

    write_table(out_dir, &sessions)?;
    write_table(out_dir, &order_summaries)?;
    write_table(out_dir, &user_metrics)?;

    info!(dir = %out_dir.display(), "Wrote analytics tables");
    Ok(AnalyticsTables {
        sessions,
        orders: order_summaries,
        users: user_metrics,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts(hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 5)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    fn event(id: &str, session: &str, user: &str, at: NaiveDateTime) -> Event {
        Event {
            event_id: id.into(),
            event_type: "view_product".into(),
            timestamp: at,
            user_id: user.into(),
            session_id: session.into(),
            product_id: "P00001".into(),
        }
    }

    fn order(id: &str, user: &str, quantity: u32, total: f64) -> Order {
        Order {
            order_id: id.into(),
            user_id: user.into(),
            timestamp: ts(12, 0),
            product_id: "P00001".into(),
            quantity,
            total,
            payment_success: true,
        }
    }

    #[test]
    fn test_session_bounds() {
        let events = vec![
            event("E1", "s2", "U1", ts(10, 5)),
            event("E2", "s1", "U2", ts(9, 0)),
            event("E3", "s2", "U1", ts(10, 0)),
            event("E4", "s2", "U1", ts(10, 30)),
        ];
        let sessions = summarize_sessions(&events);
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].session_id, "s1");
        let s2 = &sessions[1];
        assert_eq!(s2.events_count, 3);
        assert_eq!(s2.first_ts, ts(10, 0));
        assert_eq!(s2.last_ts, ts(10, 30));
    }

    #[test]
    fn test_order_and_user_rollups() {
        let orders = vec![
            order("O1", "U1", 2, 10.10),
            order("O2", "U1", 1, 5.05),
            order("O3", "U2", 3, 30.0),
        ];
        let summaries = summarize_orders(&orders);
        assert_eq!(summaries.len(), 3);
        assert_eq!(summaries[0].n_items, 2);

        let users = summarize_users(&summaries);
        assert_eq!(
            users,
            vec![
                UserMetrics {
                    user_id: "U1".into(),
                    total_revenue: 15.15,
                    orders: 2
                },
                UserMetrics {
                    user_id: "U2".into(),
                    total_revenue: 30.0,
                    orders: 1
                },
            ]
        );
    }

    #[test]
    fn test_empty_orders_write_headers() {
        let raw = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        write_table::<User>(raw.path(), &[]).unwrap();
        write_table::<Product>(raw.path(), &[]).unwrap();
        write_table(raw.path(), &[event("E1", "s1", "U1", ts(8, 0))]).unwrap();
        write_table::<Order>(raw.path(), &[]).unwrap();

        let tables = build_analytics_tables(raw.path(), out.path()).unwrap();
        assert_eq!(tables.sessions.len(), 1);
        assert!(tables.orders.is_empty());
        let content = std::fs::read_to_string(out.path().join("orders_summary.csv")).unwrap();
        assert_eq!(content, "order_id,user_id,total,n_items\n");
        let content = std::fs::read_to_string(out.path().join("user_metrics.csv")).unwrap();
        assert_eq!(content, "user_id,total_revenue,orders\n");
    }

    #[test]
    fn test_missing_raw_table_is_fatal() {
        let raw = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        write_table::<User>(raw.path(), &[]).unwrap();
        let err = build_analytics_tables(raw.path(), out.path()).unwrap_err();
        assert!(matches!(err, shopfunnel_core::FunnelError::MissingInput(_)));
    }
}
