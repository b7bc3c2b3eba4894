pub mod config;
pub mod error;
pub mod markup;
pub mod table;
pub mod types;

pub use config::AppConfig;
pub use error::{FunnelError, FunnelResult};
pub use table::{read_table, write_table, Table};
