use config::builder::DefaultState;
use config::ConfigBuilder;
use serde::Deserialize;

use crate::error::FunnelResult;

/// Root application configuration. Loaded from an optional `shopfunnel.toml`
/// and environment variables with the prefix `SHOPFUNNEL__`.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub log_json: bool,
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub generator: GeneratorConfig,
    #[serde(default)]
    pub figures: FiguresConfig,
    #[serde(default)]
    pub dashboard: DashboardConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DataConfig {
    #[serde(default = "default_raw_dir")]
    pub raw_dir: String,
    #[serde(default = "default_processed_dir")]
    pub processed_dir: String,
    #[serde(default = "default_figures_dir")]
    pub figures_dir: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeneratorConfig {
    #[serde(default = "default_n_users")]
    pub n_users: usize,
    #[serde(default = "default_n_products")]
    pub n_products: usize,
    #[serde(default = "default_start_date")]
    pub start_date: String,
    #[serde(default = "default_days")]
    pub days: u32,
    #[serde(default)]
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FiguresConfig {
    /// Breakdown groups charted per dimension, ranked by session count.
    #[serde(default = "default_top_groups")]
    pub top_groups: usize,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DashboardConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_event_sample")]
    pub event_sample: usize,
    #[serde(default = "default_order_sample")]
    pub order_sample: usize,
}

// Default functions
fn default_raw_dir() -> String {
    "data/raw".to_string()
}
fn default_processed_dir() -> String {
    "data/processed".to_string()
}
fn default_figures_dir() -> String {
    "reports/figures".to_string()
}
fn default_n_users() -> usize {
    500
}
fn default_n_products() -> usize {
    100
}
fn default_start_date() -> String {
    "2024-01-01".to_string()
}
fn default_days() -> u32 {
    60
}
fn default_top_groups() -> usize {
    5
}
fn default_width() -> u32 {
    900
}
fn default_height() -> u32 {
    540
}
fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    8501
}
fn default_event_sample() -> usize {
    100
}
fn default_order_sample() -> usize {
    5
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            raw_dir: default_raw_dir(),
            processed_dir: default_processed_dir(),
            figures_dir: default_figures_dir(),
        }
    }
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            n_users: default_n_users(),
            n_products: default_n_products(),
            start_date: default_start_date(),
            days: default_days(),
            seed: None,
        }
    }
}

impl Default for FiguresConfig {
    fn default() -> Self {
        Self {
            top_groups: default_top_groups(),
            width: default_width(),
            height: default_height(),
        }
    }
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            event_sample: default_event_sample(),
            order_sample: default_order_sample(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_json: false,
            data: DataConfig::default(),
            generator: GeneratorConfig::default(),
            figures: FiguresConfig::default(),
            dashboard: DashboardConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from an optional config file and environment variables.
    pub fn load() -> FunnelResult<Self> {
        let builder = config::Config::builder()
            .add_source(config::File::with_name("shopfunnel").required(false))
            .add_source(
                config::Environment::with_prefix("SHOPFUNNEL")
                    .separator("__")
                    .try_parsing(true),
            );
        Self::from_builder(builder)
    }

    fn from_builder(builder: ConfigBuilder<DefaultState>) -> FunnelResult<Self> {
        Ok(builder.build()?.try_deserialize()?)
    }
}
