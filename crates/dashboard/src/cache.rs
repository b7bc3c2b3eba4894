//! Process-local cache of the raw tables. Loaded on first use and held until
//! [`SnapshotCache::invalidate`] is called.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;
use shopfunnel_core::table::read_table_or_empty;
use shopfunnel_core::types::{Event, Order, Product, User};
use shopfunnel_core::{read_table, FunnelResult};
use tracing::info;

/// Row counts shown at the top of the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Kpis {
    pub users: usize,
    pub sessions: usize,
    pub events: usize,
    pub orders: usize,
}

/// The raw tables as of one load.
#[derive(Debug, Clone)]
pub struct RawSnapshot {
    pub products: Vec<Product>,
    pub users: Vec<User>,
    pub events: Vec<Event>,
    pub orders: Vec<Order>,
    pub loaded_at: DateTime<Utc>,
}

impl RawSnapshot {
    /// Products, users and events are required; orders may not exist yet.
    pub fn load(raw_dir: &Path) -> FunnelResult<Self> {
        let snapshot = Self {
            products: read_table(raw_dir)?,
            users: read_table(raw_dir)?,
            events: read_table(raw_dir)?,
            orders: read_table_or_empty(raw_dir)?,
            loaded_at: Utc::now(),
        };
        info!(
            dir = %raw_dir.display(),
            products = snapshot.products.len(),
            users = snapshot.users.len(),
            events = snapshot.events.len(),
            orders = snapshot.orders.len(),
            "Loaded raw tables"
        );
        Ok(snapshot)
    }

    /// Sessions are counted as distinct session ids in the event log.
    pub fn kpis(&self) -> Kpis {
        let sessions: HashSet<&str> = self.events.iter().map(|e| e.session_id.as_str()).collect();
        Kpis {
            users: self.users.len(),
            sessions: sessions.len(),
            events: self.events.len(),
            orders: self.orders.len(),
        }
    }

    pub fn order_head(&self, n: usize) -> &[Order] {
        &self.orders[..n.min(self.orders.len())]
    }

    /// Up to `n` events drawn without replacement, in log order.
    pub fn event_sample<R: Rng + ?Sized>(&self, n: usize, rng: &mut R) -> Vec<Event> {
        let mut indices: Vec<usize> = (0..self.events.len()).collect();
        indices.shuffle(rng);
        indices.truncate(n);
        indices.sort_unstable();
        indices.into_iter().map(|i| self.events[i].clone()).collect()
    }
}

pub struct SnapshotCache {
    raw_dir: PathBuf,
    slot: RwLock<Option<Arc<RawSnapshot>>>,
}

impl SnapshotCache {
    pub fn new(raw_dir: impl Into<PathBuf>) -> Self {
        Self {
            raw_dir: raw_dir.into(),
            slot: RwLock::new(None),
        }
    }

    pub fn raw_dir(&self) -> &Path {
        &self.raw_dir
    }

    /// Cached snapshot, loading it from disk on first use. Blocking.
    pub fn get_or_load(&self) -> FunnelResult<Arc<RawSnapshot>> {
        if let Some(snapshot) = self.slot.read().as_ref() {
            return Ok(snapshot.clone());
        }

        let loaded = Arc::new(RawSnapshot::load(&self.raw_dir)?);
        let mut slot = self.slot.write();
        // Another caller may have filled the slot while this one was loading.
        Ok(slot.get_or_insert(loaded).clone())
    }

    pub fn invalidate(&self) {
        *self.slot.write() = None;
        info!(dir = %self.raw_dir.display(), "Raw table cache cleared");
    }

    pub fn is_loaded(&self) -> bool {
        self.slot.read().is_some()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use shopfunnel_core::write_table;

    pub(crate) fn write_raw(dir: &Path, with_orders: bool) {
        let at = NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap();
        let users = vec![User {
            user_id: "U000001".into(),
            signup_date: at.date(),
            channel: "organic".into(),
            device: "mobile".into(),
            country: "NL".into(),
        }];
        let products = vec![Product {
            product_id: "P00001".into(),
            category: "Books".into(),
            price: 12.5,
            title: "a quiet book.".into(),
        }];
        let events: Vec<Event> = (1..=6)
            .map(|i| Event {
                event_id: format!("E{i:08}"),
                event_type: "view_product".into(),
                timestamp: at,
                user_id: "U000001".into(),
                session_id: format!("s{}", i % 2),
                product_id: "P00001".into(),
            })
            .collect();
        write_table(dir, &users).unwrap();
        write_table(dir, &products).unwrap();
        write_table(dir, &events).unwrap();
        if with_orders {
            let orders = vec![Order {
                order_id: "O0000001".into(),
                user_id: "U000001".into(),
                timestamp: at,
                product_id: "P00001".into(),
                quantity: 2,
                total: 25.0,
                payment_success: true,
            }];
            write_table(dir, &orders).unwrap();
        }
    }

    #[test]
    fn test_kpis_count_distinct_sessions() {
        let dir = tempfile::tempdir().unwrap();
        write_raw(dir.path(), true);
        let snapshot = RawSnapshot::load(dir.path()).unwrap();
        assert_eq!(
            snapshot.kpis(),
            Kpis {
                users: 1,
                sessions: 2,
                events: 6,
                orders: 1
            }
        );
        assert_eq!(snapshot.order_head(5).len(), 1);
    }

    #[test]
    fn test_orders_are_optional() {
        let dir = tempfile::tempdir().unwrap();
        write_raw(dir.path(), false);
        let snapshot = RawSnapshot::load(dir.path()).unwrap();
        assert!(snapshot.orders.is_empty());
    }

    #[test]
    fn test_event_sample_is_bounded_and_unique() {
        let dir = tempfile::tempdir().unwrap();
        write_raw(dir.path(), true);
        let snapshot = RawSnapshot::load(dir.path()).unwrap();
        let mut rng = StdRng::seed_from_u64(4);

        let sample = snapshot.event_sample(4, &mut rng);
        assert_eq!(sample.len(), 4);
        let ids: HashSet<_> = sample.iter().map(|e| e.event_id.clone()).collect();
        assert_eq!(ids.len(), 4);

        assert_eq!(snapshot.event_sample(100, &mut rng).len(), 6);
    }

    #[test]
    fn test_cache_holds_until_invalidated() {
        let dir = tempfile::tempdir().unwrap();
        write_raw(dir.path(), false);
        let cache = SnapshotCache::new(dir.path());
        assert!(!cache.is_loaded());

        let first = cache.get_or_load().unwrap();
        assert_eq!(first.kpis().orders, 0);

        // New data on disk is not visible until the cache is cleared.
        write_raw(dir.path(), true);
        let cached = cache.get_or_load().unwrap();
        assert!(Arc::ptr_eq(&first, &cached));
        assert_eq!(cached.kpis().orders, 0);

        cache.invalidate();
        assert!(!cache.is_loaded());
        assert_eq!(cache.get_or_load().unwrap().kpis().orders, 1);
    }

    #[test]
    fn test_missing_events_fail_the_load() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SnapshotCache::new(dir.path());
        assert!(cache.get_or_load().is_err());
        assert!(!cache.is_loaded());
    }
}
