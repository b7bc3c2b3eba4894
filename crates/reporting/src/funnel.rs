//! Funnel analysis: sessionizes the event log, flags the stages each session
//! reached, reconciles purchases against orders and counts sessions per stage
//! overall and per breakdown dimension.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use shopfunnel_core::table::open_reader;
use shopfunnel_core::types::{Event, Order};
use shopfunnel_core::{FunnelError, FunnelResult, Table};
use tracing::{debug, info};

use crate::schema::{self, field, ColumnAliases, HeaderIndex};

pub const VIEW_EVENTS: &[&str] = &["view", "product_view", "page_view", "view_product"];
pub const ADD_TO_CART_EVENTS: &[&str] = &["add_to_cart", "cart"];
pub const PURCHASE_EVENTS: &[&str] = &["purchase", "order"];

/// Placeholder for a channel or device nothing could resolve.
pub const UNKNOWN: &str = "unknown";

// ─── Types ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FunnelStep {
    Sessions,
    View,
    AddToCart,
    Purchase,
}

impl FunnelStep {
    pub const ALL: [FunnelStep; 4] = [
        FunnelStep::Sessions,
        FunnelStep::View,
        FunnelStep::AddToCart,
        FunnelStep::Purchase,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FunnelStep::Sessions => "sessions",
            FunnelStep::View => "view",
            FunnelStep::AddToCart => "add_to_cart",
            FunnelStep::Purchase => "purchase",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum UserType {
    New,
    Returning,
}

impl UserType {
    /// A user with more than one order on record is returning.
    pub fn from_order_count(orders: u64) -> Self {
        if orders > 1 {
            UserType::Returning
        } else {
            UserType::New
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UserType::New => "new",
            UserType::Returning => "returning",
        }
    }
}

/// A breakdown axis of the funnel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dimension {
    Channel,
    Device,
    UserType,
}

impl Dimension {
    pub const ALL: [Dimension; 3] = [Dimension::Channel, Dimension::Device, Dimension::UserType];

    pub fn column(&self) -> &'static str {
        self.aliases().canonical
    }

    pub fn file_name(&self) -> &'static str {
        match self {
            Dimension::Channel => "funnel_by_channel.csv",
            Dimension::Device => "funnel_by_device.csv",
            Dimension::UserType => "funnel_by_user_type.csv",
        }
    }

    pub(crate) fn aliases(&self) -> ColumnAliases {
        match self {
            Dimension::Channel => schema::CHANNEL,
            Dimension::Device => schema::DEVICE,
            Dimension::UserType => schema::USER_TYPE,
        }
    }
}

pub const OVERALL_FILE_NAME: &str = "funnel_overall.csv";

/// One event row after column normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct RawEvent {
    pub session_id: String,
    pub user_id: Option<String>,
    pub event_type: String,
    pub timestamp: Option<String>,
    pub channel: Option<String>,
    pub device: Option<String>,
}

/// What the orders table contributes to the funnel.
#[derive(Debug, Clone, Default)]
pub struct OrderFacts {
    pub orders_per_user: HashMap<String, u64>,
    /// Sessions with an order; only populated when orders carry a session id.
    pub purchased_sessions: HashSet<String>,
}

impl OrderFacts {
    pub fn order_count(&self, user_id: &str) -> u64 {
        self.orders_per_user.get(user_id).copied().unwrap_or(0)
    }
}

/// Per-session stage flags and breakdown attributes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionFunnel {
    pub session_id: String,
    pub user_id: String,
    pub channel: String,
    pub device: String,
    pub started_at: Option<String>,
    pub has_view: bool,
    pub has_add_to_cart: bool,
    pub has_purchase: bool,
    pub user_type: UserType,
}

impl SessionFunnel {
    pub fn dimension_value(&self, dimension: Dimension) -> &str {
        match dimension {
            Dimension::Channel => &self.channel,
            Dimension::Device => &self.device,
            Dimension::UserType => self.user_type.as_str(),
        }
    }
}

/// Session counts for the four funnel steps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FunnelCounts {
    pub sessions: u64,
    pub view: u64,
    pub add_to_cart: u64,
    pub purchase: u64,
}

impl FunnelCounts {
    fn record(&mut self, session: &SessionFunnel) {
        self.sessions += 1;
        self.view += u64::from(session.has_view);
        self.add_to_cart += u64::from(session.has_add_to_cart);
        self.purchase += u64::from(session.has_purchase);
    }

    pub fn count(&self, step: FunnelStep) -> u64 {
        match step {
            FunnelStep::Sessions => self.sessions,
            FunnelStep::View => self.view,
            FunnelStep::AddToCart => self.add_to_cart,
            FunnelStep::Purchase => self.purchase,
        }
    }

    pub fn steps(&self) -> [(FunnelStep, u64); 4] {
        FunnelStep::ALL.map(|step| (step, self.count(step)))
    }

    /// True when no step counts more sessions than the step before it.
    pub fn is_non_increasing(&self) -> bool {
        let counts = self.steps();
        counts.windows(2).all(|pair| pair[0].1 >= pair[1].1)
    }

    /// Share of all sessions that reached `step`.
    pub fn conversion_rate(&self, step: FunnelStep) -> f64 {
        if self.sessions == 0 {
            0.0
        } else {
            self.count(step) as f64 / self.sessions as f64
        }
    }
}

/// The four funnel summary tables.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FunnelReport {
    pub overall: FunnelCounts,
    pub by_channel: BTreeMap<String, FunnelCounts>,
    pub by_device: BTreeMap<String, FunnelCounts>,
    pub by_user_type: BTreeMap<String, FunnelCounts>,
}

// ─── Loading ────────────────────────────────────────────────────────────────

fn table_label(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Read an event log whose headers may use any of the accepted aliases.
///
/// Channel and device come from their own columns; when a column is absent
/// the `user_agent` column stands in for it.
/// Rows without a session id are dropped.
pub fn read_events(path: &Path) -> FunnelResult<Vec<RawEvent>> {
    let mut reader = open_reader(path)?;
    let headers = reader.headers()?.clone();
    let label = table_label(path);
    let index = HeaderIndex::new(&label, &headers);

    let event_type = index.require(&schema::EVENT_TYPE)?;
    let session_id = index.require(&schema::SESSION_ID)?;
    let user_id = index.require(&schema::USER_ID)?;
    let timestamp = index.find(&schema::TIMESTAMP);
    let user_agent = index.find(&schema::USER_AGENT);
    let channel = index.find(&schema::CHANNEL).or(user_agent);
    let device = index.find(&schema::DEVICE).or(user_agent);

    let mut events = Vec::new();
    let mut skipped = 0usize;
    for record in reader.records() {
        let record = record?;
        let Some(session) = field(&record, Some(session_id)) else {
            skipped += 1;
            continue;
        };
        events.push(RawEvent {
            session_id: session.to_string(),
            user_id: field(&record, Some(user_id)).map(str::to_string),
            event_type: field(&record, Some(event_type)).unwrap_or_default().to_string(),
            timestamp: field(&record, timestamp).map(str::to_string),
            channel: field(&record, channel).map(str::to_string),
            device: field(&record, device).map(str::to_string),
        });
    }

    debug!(path = %path.display(), events = events.len(), skipped, "Read event log");
    Ok(events)
}

/// Count orders per user and collect the sessions that placed an order.
pub fn read_order_facts(path: &Path) -> FunnelResult<OrderFacts> {
    let mut reader = open_reader(path)?;
    let headers = reader.headers()?.clone();
    let label = table_label(path);
    let index = HeaderIndex::new(&label, &headers);

    let user_id = index.require(&schema::USER_ID)?;
    let session_id = index.find(&schema::SESSION_ID);

    let mut facts = OrderFacts::default();
    for record in reader.records() {
        let record = record?;
        if let Some(user) = field(&record, Some(user_id)) {
            *facts.orders_per_user.entry(user.to_string()).or_default() += 1;
        }
        if let Some(session) = field(&record, session_id) {
            facts.purchased_sessions.insert(session.to_string());
        }
    }
    Ok(facts)
}

// ─── Sessionization ─────────────────────────────────────────────────────────

#[derive(Default)]
struct SessionAccumulator<'a> {
    user_id: Option<&'a str>,
    channel: Option<&'a str>,
    device: Option<&'a str>,
    started_at: Option<&'a str>,
    has_view: bool,
    has_add_to_cart: bool,
    has_purchase: bool,
}

impl<'a> SessionAccumulator<'a> {
    fn observe(&mut self, event: &'a RawEvent) {
        self.user_id = self.user_id.or(event.user_id.as_deref());
        self.channel = self.channel.or(event.channel.as_deref());
        self.device = self.device.or(event.device.as_deref());
        // ISO-8601 strings order chronologically.
        if let Some(ts) = event.timestamp.as_deref() {
            if self.started_at.map_or(true, |current| ts < current) {
                self.started_at = Some(ts);
            }
        }

        let kind = event.event_type.as_str();
        self.has_view |= VIEW_EVENTS.contains(&kind);
        self.has_add_to_cart |= ADD_TO_CART_EVENTS.contains(&kind);
        self.has_purchase |= PURCHASE_EVENTS.contains(&kind);
    }

    fn finish(self, session_id: &str, orders: &OrderFacts) -> SessionFunnel {
        let user_id = self.user_id.unwrap_or_default();
        let channel = self.channel.unwrap_or(UNKNOWN);
        let device = self.device.unwrap_or(UNKNOWN);

        SessionFunnel {
            session_id: session_id.to_string(),
            user_id: user_id.to_string(),
            channel: channel.to_string(),
            device: device.to_string(),
            started_at: self.started_at.map(str::to_string),
            has_view: self.has_view,
            has_add_to_cart: self.has_add_to_cart,
            // Orders are ground truth for purchases the event log missed.
            has_purchase: self.has_purchase || orders.purchased_sessions.contains(session_id),
            user_type: UserType::from_order_count(orders.order_count(user_id)),
        }
    }
}

/// Group events by session id and derive each session's funnel flags.
/// Sessions come back ordered by session id.
pub fn sessionize(events: &[RawEvent], orders: &OrderFacts) -> Vec<SessionFunnel> {
    let mut sessions: BTreeMap<&str, SessionAccumulator<'_>> = BTreeMap::new();
    for event in events {
        sessions
            .entry(event.session_id.as_str())
            .or_default()
            .observe(event);
    }
    sessions
        .into_iter()
        .map(|(session_id, acc)| acc.finish(session_id, orders))
        .collect()
}

// ─── Aggregation ────────────────────────────────────────────────────────────

impl FunnelReport {
    pub fn from_sessions(sessions: &[SessionFunnel]) -> Self {
        let mut report = FunnelReport::default();
        for session in sessions {
            report.overall.record(session);
            for dimension in Dimension::ALL {
                report
                    .breakdown_mut(dimension)
                    .entry(session.dimension_value(dimension).to_string())
                    .or_default()
                    .record(session);
            }
        }
        report
    }

    pub fn breakdown(&self, dimension: Dimension) -> &BTreeMap<String, FunnelCounts> {
        match dimension {
            Dimension::Channel => &self.by_channel,
            Dimension::Device => &self.by_device,
            Dimension::UserType => &self.by_user_type,
        }
    }

    fn breakdown_mut(&mut self, dimension: Dimension) -> &mut BTreeMap<String, FunnelCounts> {
        match dimension {
            Dimension::Channel => &mut self.by_channel,
            Dimension::Device => &mut self.by_device,
            Dimension::UserType => &mut self.by_user_type,
        }
    }

    /// Write `funnel_overall.csv` and one `funnel_by_<dimension>.csv` per breakdown.
    pub fn write_to(&self, dir: &Path) -> FunnelResult<Vec<PathBuf>> {
        fs::create_dir_all(dir)?;
        let mut written = Vec::with_capacity(1 + Dimension::ALL.len());

        let path = dir.join(OVERALL_FILE_NAME);
        let mut writer = csv::Writer::from_path(&path)?;
        writer.write_record(["step", "count"])?;
        for (step, count) in self.overall.steps() {
            let count = count.to_string();
            writer.write_record([step.as_str(), count.as_str()])?;
        }
        writer.flush()?;
        info!(path = %path.display(), "Wrote overall funnel");
        written.push(path);

        for dimension in Dimension::ALL {
            let path = dir.join(dimension.file_name());
            let mut writer = csv::Writer::from_path(&path)?;
            writer.write_record(["step", "count", dimension.column()])?;
            let groups = self.breakdown(dimension);
            for (group, counts) in groups {
                for (step, count) in counts.steps() {
                    let count = count.to_string();
                    writer.write_record([step.as_str(), count.as_str(), group.as_str()])?;
                }
            }
            writer.flush()?;
            info!(path = %path.display(), groups = groups.len(), "Wrote funnel breakdown");
            written.push(path);
        }

        Ok(written)
    }
}

/// One row of a written funnel table.
#[derive(Debug, Clone, PartialEq)]
pub struct FunnelRow {
    pub step: String,
    pub count: u64,
    pub group: Option<String>,
}

/// Read a funnel table back; `dimension` selects the grouping column, if any.
pub fn read_funnel_table(path: &Path, dimension: Option<Dimension>) -> FunnelResult<Vec<FunnelRow>> {
    let mut reader = open_reader(path)?;
    let headers = reader.headers()?.clone();
    let label = table_label(path);
    let index = HeaderIndex::new(&label, &headers);

    let step = index.require(&schema::STEP)?;
    let count = index.require(&schema::COUNT)?;
    let group = dimension
        .map(|d| index.require(&d.aliases()))
        .transpose()?;

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let Some(step) = field(&record, Some(step)) else {
            continue;
        };
        let raw_count = field(&record, Some(count)).unwrap_or_default();
        let count = raw_count
            .parse::<u64>()
            .map_err(|_| FunnelError::InvalidValue {
                table: label.clone(),
                column: schema::COUNT.canonical.to_string(),
                value: raw_count.to_string(),
            })?;
        rows.push(FunnelRow {
            step: step.to_string(),
            count,
            group: field(&record, group).map(str::to_string),
        });
    }
    Ok(rows)
}

/// Build the four funnel tables from `raw_dir` into `out_dir`.
pub fn build_funnel_tables(raw_dir: &Path, out_dir: &Path) -> FunnelResult<FunnelReport> {
    let events = read_events(&Event::path_in(raw_dir))?;
    let orders = read_order_facts(&Order::path_in(raw_dir))?;

    let sessions = sessionize(&events, &orders);
    let report = FunnelReport::from_sessions(&sessions);
    report.write_to(out_dir)?;

    info!(
        sessions = report.overall.sessions,
        view = report.overall.view,
        add_to_cart = report.overall.add_to_cart,
        purchase = report.overall.purchase,
        "Funnel summaries built"
    );
    Ok(report)
}
