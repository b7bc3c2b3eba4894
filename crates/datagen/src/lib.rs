//! Synthetic e-commerce dataset generator: users, products, a clickstream
//! event log and the orders it produces.

pub mod generator;

pub use generator::{generate_data, DatasetGenerator, GeneratedDataset, GeneratorParams};
