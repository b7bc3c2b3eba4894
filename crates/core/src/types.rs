use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize};

use crate::table::Table;

/// A registered shopper. Immutable once generated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub user_id: String,
    pub signup_date: NaiveDate,
    pub channel: String,
    pub device: String,
    pub country: String,
}

/// A catalogue entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub product_id: String,
    pub category: String,
    pub price: f64,
    pub title: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    ViewProduct,
    AddToCart,
    Purchase,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::ViewProduct => "view_product",
            EventType::AddToCart => "add_to_cart",
            EventType::Purchase => "purchase",
        }
    }
}

/// One clickstream log entry.
///
/// `event_type` stays a plain string: the log is read back by consumers
/// that accept event names outside [`EventType`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub event_id: String,
    pub event_type: String,
    pub timestamp: NaiveDateTime,
    pub user_id: String,
    pub session_id: String,
    pub product_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub order_id: String,
    pub user_id: String,
    pub timestamp: NaiveDateTime,
    pub product_id: String,
    pub quantity: u32,
    pub total: f64,
    #[serde(deserialize_with = "lenient_bool")]
    pub payment_success: bool,
}

impl Table for User {
    const FILE_NAME: &'static str = "users.csv";
    const COLUMNS: &'static [&'static str] =
        &["user_id", "signup_date", "channel", "device", "country"];
}

impl Table for Product {
    const FILE_NAME: &'static str = "products.csv";
    const COLUMNS: &'static [&'static str] = &["product_id", "category", "price", "title"];
}

impl Table for Event {
    const FILE_NAME: &'static str = "events.csv";
    const COLUMNS: &'static [&'static str] = &[
        "event_id",
        "event_type",
        "timestamp",
        "user_id",
        "session_id",
        "product_id",
    ];
}

impl Table for Order {
    const FILE_NAME: &'static str = "orders.csv";
    const COLUMNS: &'static [&'static str] = &[
        "order_id",
        "user_id",
        "timestamp",
        "product_id",
        "quantity",
        "total",
        "payment_success",
    ];
}

/// Round a currency amount to cents.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Accepts `true`/`false` in any case as well as `1`/`0`.
fn lenient_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        other => Err(serde::de::Error::custom(format!(
            "invalid boolean value: {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_names() {
        assert_eq!(EventType::ViewProduct.as_str(), "view_product");
        assert_eq!(EventType::AddToCart.as_str(), "add_to_cart");
        assert_eq!(EventType::Purchase.as_str(), "purchase");
    }

    #[test]
    fn test_round2() {
        assert_eq!(round2(12.345_6), 12.35);
        assert_eq!(round2(3.0), 3.0);
    }

    #[test]
    fn test_order_accepts_capitalized_bool() {
        let data = "order_id,user_id,timestamp,product_id,quantity,total,payment_success\n\
                    O0000001,U000001,2024-01-02T10:00:00,P00001,2,19.98,False\n";
        let mut reader = csv::Reader::from_reader(data.as_bytes());
        let order: Order = reader.deserialize().next().unwrap().unwrap();
        assert!(!order.payment_success);
        assert_eq!(order.quantity, 2);
    }
}
