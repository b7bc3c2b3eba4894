//! HTML rendering of the dashboard page.

use std::fmt::Write as _;

use shopfunnel_core::markup::escape_html;
use shopfunnel_core::types::{Event, Order};
use shopfunnel_core::Table;

use crate::cache::Kpis;

pub const NO_ORDERS_MESSAGE: &str =
    "No orders found yet. Generate data first using the data generator.";

/// Everything the page shows for one request.
pub struct DashboardView<'a> {
    pub kpis: Kpis,
    pub orders: &'a [Order],
    pub events: &'a [Event],
}

fn table(out: &mut String, headers: &[&str], rows: impl Iterator<Item = Vec<String>>) {
    out.push_str("<table>\n<thead><tr>");
    for header in headers {
        let _ = write!(out, "<th>{}</th>", escape_html(header));
    }
    out.push_str("</tr></thead>\n<tbody>\n");
    for row in rows {
        out.push_str("<tr>");
        for cell in row {
            let _ = write!(out, "<td>{}</td>", escape_html(&cell));
        }
        out.push_str("</tr>\n");
    }
    out.push_str("</tbody>\n</table>\n");
}

pub fn render(view: &DashboardView<'_>) -> String {
    let mut body = String::new();

    body.push_str("<h2>Quick KPIs</h2>\n<div class=\"kpis\">\n");
    for (label, value) in [
        ("Users", view.kpis.users),
        ("Sessions", view.kpis.sessions),
        ("Events", view.kpis.events),
        ("Orders", view.kpis.orders),
    ] {
        let _ = writeln!(
            body,
            "<div class=\"kpi\"><span class=\"kpi-label\">{label}</span><span class=\"kpi-value\">{value}</span></div>"
        );
    }
    body.push_str("</div>\n");

    body.push_str("<h2>Orders (sample)</h2>\n");
    if view.orders.is_empty() {
        let _ = writeln!(body, "<p class=\"empty\">{NO_ORDERS_MESSAGE}</p>");
    } else {
        table(
            &mut body,
            Order::COLUMNS,
            view.orders.iter().map(|o| {
                vec![
                    o.order_id.clone(),
                    o.user_id.clone(),
                    o.timestamp.to_string(),
                    o.product_id.clone(),
                    o.quantity.to_string(),
                    format!("{:.2}", o.total),
                    o.payment_success.to_string(),
                ]
            }),
        );
    }

    let _ = writeln!(body, "<h2>Event sample ({} rows)</h2>", view.events.len());
    table(
        &mut body,
        Event::COLUMNS,
        view.events.iter().map(|e| {
            vec![
                e.event_id.clone(),
                e.event_type.clone(),
                e.timestamp.to_string(),
                e.user_id.clone(),
                e.session_id.clone(),
                e.product_id.clone(),
            ]
        }),
    );

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <title>E-commerce Growth Analysis (Demo)</title>
  <style>
    body {{ font-family: sans-serif; margin: 2rem; }}
    .kpis {{ display: flex; gap: 2rem; }}
    .kpi {{ display: flex; flex-direction: column; }}
    .kpi-value {{ font-size: 2rem; font-weight: bold; }}
    table {{ border-collapse: collapse; font-size: 0.85rem; }}
    th, td {{ border: 1px solid #ddd; padding: 0.25rem 0.5rem; }}
  </style>
</head>
<body>
<h1>E-commerce Growth Analysis: Demo Dashboard</h1>
<form method="post" action="/reload"><button type="submit">Reload data</button></form>
{body}</body>
</html>
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kpis(orders: usize) -> Kpis {
        Kpis {
            users: 3,
            sessions: 7,
            events: 12,
            orders,
        }
    }

    #[test]
    fn test_placeholder_without_orders() {
        let html = render(&DashboardView {
            kpis: kpis(0),
            orders: &[],
            events: &[],
        });
        assert!(html.contains(NO_ORDERS_MESSAGE));
        assert!(html.contains("<span class=\"kpi-value\">7</span>"));
        assert!(html.contains("Event sample (0 rows)"));
    }

    #[test]
    fn test_cells_are_escaped() {
        let event = Event {
            event_id: "E00000001".into(),
            event_type: "<script>".into(),
            timestamp: chrono::NaiveDate::from_ymd_opt(2024, 1, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
            user_id: "U1".into(),
            session_id: "s1".into(),
            product_id: "P1".into(),
        };
        let events = [event];
        let html = render(&DashboardView {
            kpis: kpis(0),
            orders: &[],
            events: &events,
        });
        assert!(html.contains("<td>&lt;script&gt;</td>"));
        assert!(!html.contains("<td><script>"));
    }
}
