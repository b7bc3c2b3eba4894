#![warn(clippy::unwrap_used)]

//! Read-only dashboard over the raw tables: row-count KPIs, an orders
//! preview and a random event sample.

pub mod cache;
pub mod page;
pub mod rest;
pub mod server;

pub use cache::{Kpis, RawSnapshot, SnapshotCache};
pub use server::DashboardServer;
