use std::path::PathBuf;
use thiserror::Error;

pub type FunnelResult<T> = Result<T, FunnelError>;

#[derive(Error, Debug)]
pub enum FunnelError {
    #[error("Missing input table: {}", .0.display())]
    MissingInput(PathBuf),

    #[error("Table {table} has no column matching {column}")]
    MissingColumn { table: String, column: String },

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Table {table} has an invalid {column} value: {value:?}")]
    InvalidValue {
        table: String,
        column: String,
        value: String,
    },

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Chart rendering error: {0}")]
    Render(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
