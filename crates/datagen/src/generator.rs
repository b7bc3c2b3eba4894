//! Dataset generator: draws users, products and per-session browsing
//! behaviour from fixed categorical and parametric distributions.

use std::path::Path;

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use fake::faker::address::en::CountryCode;
use fake::faker::lorem::en::Sentence;
use fake::Fake;
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_distr::{LogNormal, Poisson};
use shopfunnel_core::config::GeneratorConfig;
use shopfunnel_core::types::{round2, Event, EventType, Order, Product, User};
use shopfunnel_core::{write_table, FunnelError, FunnelResult};
use tracing::info;

const CATEGORIES: &[(&str, f64)] = &[
    ("Electronics", 0.18),
    ("Home", 0.18),
    ("Clothing", 0.20),
    ("Sports", 0.12),
    ("Beauty", 0.12),
    ("Toys", 0.10),
    ("Books", 0.10),
];

const CHANNELS: &[(&str, f64)] = &[
    ("organic", 0.45),
    ("paid_search", 0.20),
    ("social", 0.15),
    ("email", 0.12),
    ("referral", 0.08),
];

const DEVICES: &[(&str, f64)] = &[("desktop", 0.40), ("mobile", 0.55), ("tablet", 0.05)];

const QUANTITIES: &[(u32, f64)] = &[(1, 0.80), (2, 0.15), (3, 0.05)];

const MEAN_SESSIONS_PER_USER: f64 = 3.0;
const PRICE_LOG_MEAN: f64 = 3.0;
const PRICE_LOG_SIGMA: f64 = 0.8;
const MAX_VIEWS_PER_SESSION: usize = 5;
const ADD_TO_CART_PROBABILITY: f64 = 0.25;
const CHECKOUT_PROBABILITY: f64 = 0.40;
const PAYMENT_FAILURE_PROBABILITY: f64 = 0.02;
const SECONDS_PER_DAY: i64 = 86_400;

/// Inputs for one generation run.
#[derive(Debug, Clone)]
pub struct GeneratorParams {
    pub n_users: usize,
    pub n_products: usize,
    pub start_date: NaiveDate,
    pub days: u32,
    pub seed: Option<u64>,
}

impl GeneratorParams {
    pub fn from_config(config: &GeneratorConfig) -> FunnelResult<Self> {
        let start_date = NaiveDate::parse_from_str(&config.start_date, "%Y-%m-%d").map_err(|e| {
            FunnelError::InvalidParameter(format!(
                "start_date '{}' is not YYYY-MM-DD: {e}",
                config.start_date
            ))
        })?;
        Ok(Self {
            n_users: config.n_users,
            n_products: config.n_products,
            start_date,
            days: config.days,
            seed: config.seed,
        })
    }

    fn validate(&self) -> FunnelResult<()> {
        if self.days == 0 {
            return Err(FunnelError::InvalidParameter(
                "days must be at least 1".to_string(),
            ));
        }
        if self.n_products == 0 {
            return Err(FunnelError::InvalidParameter(
                "n_products must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// The four raw tables of one run.
#[derive(Debug, Clone)]
pub struct GeneratedDataset {
    pub users: Vec<User>,
    pub products: Vec<Product>,
    pub events: Vec<Event>,
    pub orders: Vec<Order>,
}

impl GeneratedDataset {
    /// Write `users.csv`, `products.csv`, `events.csv` and `orders.csv` into `dir`.
    pub fn write_to(&self, dir: &Path) -> FunnelResult<()> {
        write_table(dir, &self.users)?;
        write_table(dir, &self.products)?;
        write_table(dir, &self.events)?;
        write_table(dir, &self.orders)?;
        Ok(())
    }
}

struct Categorical<T: Copy + 'static> {
    values: Vec<T>,
    index: WeightedIndex<f64>,
}

impl<T: Copy + 'static> Categorical<T> {
    fn new(table: &'static [(T, f64)]) -> FunnelResult<Self> {
        let index = WeightedIndex::new(table.iter().map(|(_, weight)| *weight))
            .map_err(|e| FunnelError::InvalidParameter(e.to_string()))?;
        Ok(Self {
            values: table.iter().map(|(value, _)| *value).collect(),
            index,
        })
    }

    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> T {
        self.values[self.index.sample(rng)]
    }
}

/// Seedable generator; one instance produces one dataset.
pub struct DatasetGenerator {
    params: GeneratorParams,
    rng: StdRng,
    categories: Categorical<&'static str>,
    channels: Categorical<&'static str>,
    devices: Categorical<&'static str>,
    quantities: Categorical<u32>,
    sessions_per_user: Poisson<f64>,
    price: LogNormal<f64>,
}

impl DatasetGenerator {
    pub fn new(params: GeneratorParams) -> FunnelResult<Self> {
        params.validate()?;
        let rng = match params.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let sessions_per_user = Poisson::new(MEAN_SESSIONS_PER_USER)
            .map_err(|e| FunnelError::InvalidParameter(e.to_string()))?;
        let price = LogNormal::new(PRICE_LOG_MEAN, PRICE_LOG_SIGMA)
            .map_err(|e| FunnelError::InvalidParameter(e.to_string()))?;

        Ok(Self {
            params,
            rng,
            categories: Categorical::new(CATEGORIES)?,
            channels: Categorical::new(CHANNELS)?,
            devices: Categorical::new(DEVICES)?,
            quantities: Categorical::new(QUANTITIES)?,
            sessions_per_user,
            price,
        })
    }

    /// Draw a complete dataset. Users, then products, then the event log.
    pub fn generate(&mut self) -> GeneratedDataset {
        let users = self.users();
        let products = self.products();
        let (events, orders) = self.events(&users, &products);
        GeneratedDataset {
            users,
            products,
            events,
            orders,
        }
    }

    fn products(&mut self) -> Vec<Product> {
        (1..=self.params.n_products)
            .map(|i| {
                let price = round2(self.price.sample(&mut self.rng));
                let category = self.categories.sample(&mut self.rng).to_string();
                let title: String = Sentence(3..4).fake_with_rng(&mut self.rng);
                Product {
                    product_id: format!("P{i:05}"),
                    category,
                    price,
                    title,
                }
            })
            .collect()
    }

    fn users(&mut self) -> Vec<User> {
        let start = self.params.start_date;
        (1..=self.params.n_users)
            .map(|i| {
                let signup_offset = self.rng.gen_range(0..self.params.days);
                let channel = self.channels.sample(&mut self.rng).to_string();
                let device = self.devices.sample(&mut self.rng).to_string();
                let country: String = CountryCode().fake_with_rng(&mut self.rng);
                User {
                    user_id: format!("U{i:06}"),
                    signup_date: start + Duration::days(i64::from(signup_offset)),
                    channel,
                    device,
                    country,
                }
            })
            .collect()
    }

    fn events(&mut self, users: &[User], products: &[Product]) -> (Vec<Event>, Vec<Order>) {
        let start = self.params.start_date.and_time(NaiveTime::MIN);
        let mut log = EventLog::default();

        for user in users {
            let drawn = self.sessions_per_user.sample(&mut self.rng) as usize;
            let n_sessions = drawn.max(1);

            for _ in 0..n_sessions {
                let day_offset = self.rng.gen_range(0..self.params.days);
                let second_offset = self.rng.gen_range(0..SECONDS_PER_DAY);
                let session_start = start
                    + Duration::days(i64::from(day_offset))
                    + Duration::seconds(second_offset);
                let session_id =
                    uuid::Builder::from_random_bytes(self.rng.gen()).into_uuid().to_string();

                let n_views = self
                    .rng
                    .gen_range(1..=MAX_VIEWS_PER_SESSION)
                    .min(products.len());
                let viewed: Vec<&Product> =
                    products.choose_multiple(&mut self.rng, n_views).collect();
                for product in &viewed {
                    log.push_event(
                        EventType::ViewProduct,
                        session_start,
                        &user.user_id,
                        &session_id,
                        &product.product_id,
                    );
                }

                if !self.rng.gen_bool(ADD_TO_CART_PROBABILITY) {
                    continue;
                }
                let Some(product) = viewed.choose(&mut self.rng).copied() else {
                    continue;
                };
                log.push_event(
                    EventType::AddToCart,
                    session_start + Duration::seconds(30),
                    &user.user_id,
                    &session_id,
                    &product.product_id,
                );

                if !self.rng.gen_bool(CHECKOUT_PROBABILITY) {
                    continue;
                }
                let quantity = self.quantities.sample(&mut self.rng);
                let checkout_at = session_start + Duration::minutes(5);
                // A failed payment still leaves its purchase event in the log.
                let payment_success = !self.rng.gen_bool(PAYMENT_FAILURE_PROBABILITY);
                log.push_order(Order {
                    order_id: String::new(),
                    user_id: user.user_id.clone(),
                    timestamp: checkout_at,
                    product_id: product.product_id.clone(),
                    quantity,
                    total: round2(product.price * f64::from(quantity)),
                    payment_success,
                });
                log.push_event(
                    EventType::Purchase,
                    checkout_at,
                    &user.user_id,
                    &session_id,
                    &product.product_id,
                );
            }
        }

        (log.events, log.orders)
    }
}

/// Accumulates events and orders, assigning sequential ids.
#[derive(Default)]
struct EventLog {
    events: Vec<Event>,
    orders: Vec<Order>,
}

impl EventLog {
    fn push_event(
        &mut self,
        event_type: EventType,
        timestamp: NaiveDateTime,
        user_id: &str,
        session_id: &str,
        product_id: &str,
    ) {
        self.events.push(Event {
            event_id: format!("E{:08}", self.events.len() + 1),
            event_type: event_type.as_str().to_string(),
            timestamp,
            user_id: user_id.to_string(),
            session_id: session_id.to_string(),
            product_id: product_id.to_string(),
        });
    }

    fn push_order(&mut self, mut order: Order) {
        order.order_id = format!("O{:07}", self.orders.len() + 1);
        self.orders.push(order);
    }
}

/// Generate a dataset and save it to `output_dir`.
pub fn generate_data(params: GeneratorParams, output_dir: &Path) -> FunnelResult<GeneratedDataset> {
    let dataset = DatasetGenerator::new(params)?.generate();
    dataset.write_to(output_dir)?;

    info!(
        dir = %output_dir.display(),
        users = dataset.users.len(),
        products = dataset.products.len(),
        events = dataset.events.len(),
        orders = dataset.orders.len(),
        "Generated raw dataset"
    );
    Ok(dataset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, HashSet};

    fn params(n_users: usize, n_products: usize, days: u32, seed: u64) -> GeneratorParams {
        GeneratorParams {
            n_users,
            n_products,
            start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            days,
            seed: Some(seed),
        }
    }

    fn generate(n_users: usize, n_products: usize, days: u32, seed: u64) -> GeneratedDataset {
        DatasetGenerator::new(params(n_users, n_products, days, seed))
            .unwrap()
            .generate()
    }

    #[test]
    fn test_row_counts_match_parameters() {
        let data = generate(50, 20, 14, 42);
        assert_eq!(data.users.len(), 50);
        assert_eq!(data.products.len(), 20);
        // Every user has at least one session with at least one view.
        assert!(data.events.len() >= 50);
    }

    #[test]
    fn test_referential_integrity() {
        let data = generate(80, 25, 30, 7);
        let users: HashSet<_> = data.users.iter().map(|u| u.user_id.as_str()).collect();
        let products: HashSet<_> = data.products.iter().map(|p| p.product_id.as_str()).collect();

        for event in &data.events {
            assert!(users.contains(event.user_id.as_str()));
            assert!(products.contains(event.product_id.as_str()));
        }
        for order in &data.orders {
            assert!(users.contains(order.user_id.as_str()));
            assert!(products.contains(order.product_id.as_str()));
        }
    }

    #[test]
    fn test_session_belongs_to_one_user() {
        let data = generate(80, 25, 30, 11);
        let mut owners: HashMap<&str, &str> = HashMap::new();
        for event in &data.events {
            let owner = owners
                .entry(event.session_id.as_str())
                .or_insert(event.user_id.as_str());
            assert_eq!(*owner, event.user_id.as_str());
        }
    }

    #[test]
    fn test_session_shape() {
        let data = generate(200, 30, 30, 3);
        let mut views: HashMap<&str, HashSet<&str>> = HashMap::new();
        let mut view_events: HashMap<&str, usize> = HashMap::new();
        for event in data.events.iter().filter(|e| e.event_type == "view_product") {
            views
                .entry(event.session_id.as_str())
                .or_default()
                .insert(event.product_id.as_str());
            *view_events.entry(event.session_id.as_str()).or_default() += 1;
        }
        for (session, products) in &views {
            assert!((1..=MAX_VIEWS_PER_SESSION).contains(&products.len()));
            // Views within a session are unique products.
            assert_eq!(view_events[session], products.len());
        }

        let carts: HashSet<_> = data
            .events
            .iter()
            .filter(|e| e.event_type == "add_to_cart")
            .map(|e| e.session_id.as_str())
            .collect();
        let purchases: Vec<_> = data
            .events
            .iter()
            .filter(|e| e.event_type == "purchase")
            .collect();
        assert_eq!(purchases.len(), data.orders.len());
        for purchase in purchases {
            assert!(carts.contains(purchase.session_id.as_str()));
        }
    }

    #[test]
    fn test_orders_priced_from_catalogue() {
        let data = generate(300, 20, 30, 5);
        let prices: HashMap<_, _> = data
            .products
            .iter()
            .map(|p| (p.product_id.as_str(), p.price))
            .collect();
        assert!(!data.orders.is_empty());
        for order in &data.orders {
            assert!((1..=3).contains(&order.quantity));
            let expected = round2(prices[order.product_id.as_str()] * f64::from(order.quantity));
            assert!((order.total - expected).abs() < 1e-9);
        }
    }

    #[test]
    fn test_fixed_seed_is_reproducible() {
        let a = generate(40, 15, 10, 123);
        let b = generate(40, 15, 10, 123);
        assert_eq!(a.users, b.users);
        assert_eq!(a.products, b.products);
        assert_eq!(a.events, b.events);
        assert_eq!(a.orders, b.orders);
    }

    #[test]
    fn test_timestamps_within_window() {
        let data = generate(60, 10, 14, 9);
        let start = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_time(NaiveTime::MIN);
        let end = start + Duration::days(14) + Duration::minutes(5);
        for event in &data.events {
            assert!(event.timestamp >= start && event.timestamp < end);
        }
        for user in &data.users {
            assert!(user.signup_date < NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());
        }
    }

    #[test]
    fn test_small_catalogue_caps_views() {
        let data = generate(30, 2, 5, 1);
        assert!(data.events.iter().all(|e| e.product_id == "P00001" || e.product_id == "P00002"));
    }

    #[test]
    fn test_rejects_degenerate_parameters() {
        assert!(matches!(
            DatasetGenerator::new(params(10, 10, 0, 1)),
            Err(FunnelError::InvalidParameter(_))
        ));
        assert!(matches!(
            DatasetGenerator::new(params(10, 0, 10, 1)),
            Err(FunnelError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_generate_data_writes_tables() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("raw");
        generate_data(params(50, 20, 14, 42), &out).unwrap();
        for name in ["users.csv", "products.csv", "events.csv", "orders.csv"] {
            let content = std::fs::read_to_string(out.join(name)).unwrap();
            assert!(content.lines().count() > 1, "{name} has no rows");
        }
    }
}
