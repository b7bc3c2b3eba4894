//! shopfunnel: synthetic e-commerce data, purchase funnels and a demo dashboard.
//!
//! Each batch stage reads and writes flat CSV tables on disk; `pipeline`
//! chains them and `dashboard` serves the raw tables over HTTP.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use shopfunnel_core::config::AppConfig;
use shopfunnel_dashboard::DashboardServer;
use shopfunnel_datagen::{generate_data, GeneratorParams};
use shopfunnel_reporting::{build_analytics_tables, build_funnel_tables, FigureRenderer};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "shopfunnel")]
#[command(about = "Synthetic e-commerce funnel analysis")]
#[command(version)]
struct Cli {
    /// Emit JSON logs (overrides config)
    #[arg(long, global = true, env = "SHOPFUNNEL__LOG_JSON")]
    log_json: Option<bool>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate the raw users, products, events and orders tables
    Generate(GenerateArgs),
    /// Build the overall and per-dimension funnel tables
    Funnel(DirArgs),
    /// Build the session, order and user summary tables
    Etl(DirArgs),
    /// Chart the funnel tables
    Render(RenderArgs),
    /// Serve the dashboard over the raw tables
    Dashboard(DashboardArgs),
    /// Run generate, funnel, etl and render in order
    Pipeline(GenerateArgs),
}

#[derive(Args, Debug)]
struct GenerateArgs {
    /// Number of users (overrides config)
    #[arg(long, env = "SHOPFUNNEL__GENERATOR__N_USERS")]
    n_users: Option<usize>,

    /// Number of products (overrides config)
    #[arg(long, env = "SHOPFUNNEL__GENERATOR__N_PRODUCTS")]
    n_products: Option<usize>,

    /// First day of the simulated window, YYYY-MM-DD (overrides config)
    #[arg(long, env = "SHOPFUNNEL__GENERATOR__START_DATE")]
    start_date: Option<String>,

    /// Length of the simulated window in days (overrides config)
    #[arg(long, env = "SHOPFUNNEL__GENERATOR__DAYS")]
    days: Option<u32>,

    /// RNG seed for a reproducible dataset (overrides config)
    #[arg(long, env = "SHOPFUNNEL__GENERATOR__SEED")]
    seed: Option<u64>,

    #[command(flatten)]
    dirs: DirArgs,
}

#[derive(Args, Debug)]
struct DirArgs {
    /// Raw table directory (overrides config)
    #[arg(long, env = "SHOPFUNNEL__DATA__RAW_DIR")]
    raw_dir: Option<String>,

    /// Processed table directory (overrides config)
    #[arg(long, env = "SHOPFUNNEL__DATA__PROCESSED_DIR")]
    processed_dir: Option<String>,

    /// Figure output directory (overrides config)
    #[arg(long, env = "SHOPFUNNEL__DATA__FIGURES_DIR")]
    figures_dir: Option<String>,
}

#[derive(Args, Debug)]
struct RenderArgs {
    /// Breakdown groups charted per dimension (overrides config)
    #[arg(long, env = "SHOPFUNNEL__FIGURES__TOP_GROUPS")]
    top_groups: Option<usize>,

    #[command(flatten)]
    dirs: DirArgs,
}

#[derive(Args, Debug)]
struct DashboardArgs {
    /// Bind address (overrides config)
    #[arg(long, env = "SHOPFUNNEL__DASHBOARD__HOST")]
    host: Option<String>,

    /// HTTP port (overrides config)
    #[arg(long, env = "SHOPFUNNEL__DASHBOARD__PORT")]
    port: Option<u16>,

    #[command(flatten)]
    dirs: DirArgs,
}

impl DirArgs {
    fn apply(&self, config: &mut AppConfig) {
        if let Some(dir) = &self.raw_dir {
            config.data.raw_dir = dir.clone();
        }
        if let Some(dir) = &self.processed_dir {
            config.data.processed_dir = dir.clone();
        }
        if let Some(dir) = &self.figures_dir {
            config.data.figures_dir = dir.clone();
        }
    }
}

impl GenerateArgs {
    fn apply(&self, config: &mut AppConfig) {
        self.dirs.apply(config);
        if let Some(n) = self.n_users {
            config.generator.n_users = n;
        }
        if let Some(n) = self.n_products {
            config.generator.n_products = n;
        }
        if let Some(date) = &self.start_date {
            config.generator.start_date = date.clone();
        }
        if let Some(days) = self.days {
            config.generator.days = days;
        }
        if self.seed.is_some() {
            config.generator.seed = self.seed;
        }
    }
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "shopfunnel=info,tower_http=info".into());
    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn run_generate(config: &AppConfig) -> anyhow::Result<()> {
    let params = GeneratorParams::from_config(&config.generator)?;
    generate_data(params, &PathBuf::from(&config.data.raw_dir))?;
    Ok(())
}

fn run_funnel(config: &AppConfig) -> anyhow::Result<()> {
    build_funnel_tables(
        &PathBuf::from(&config.data.raw_dir),
        &PathBuf::from(&config.data.processed_dir),
    )?;
    Ok(())
}

fn run_etl(config: &AppConfig) -> anyhow::Result<()> {
    let tables = build_analytics_tables(
        &PathBuf::from(&config.data.raw_dir),
        &PathBuf::from(&config.data.processed_dir),
    )?;
    info!(
        sessions = tables.sessions.len(),
        orders = tables.orders.len(),
        users = tables.users.len(),
        "Analytics tables built"
    );
    Ok(())
}

fn run_render(config: &AppConfig) -> anyhow::Result<()> {
    let renderer = FigureRenderer::new(&config.data.figures_dir, &config.figures);
    let summary = renderer.render_all(&PathBuf::from(&config.data.processed_dir))?;
    if !summary.failed.is_empty() {
        warn!(failed = ?summary.failed, "Some figures could not be exported");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let loaded = AppConfig::load();
    let mut config = loaded.as_ref().cloned().unwrap_or_default();
    if let Some(json) = cli.log_json {
        config.log_json = json;
    }

    init_tracing(config.log_json);
    if let Err(e) = &loaded {
        warn!(error = %e, "Failed to load config, using defaults");
    }

    match cli.command {
        Command::Generate(args) => {
            args.apply(&mut config);
            run_generate(&config)?;
        }
        Command::Funnel(args) => {
            args.apply(&mut config);
            run_funnel(&config)?;
        }
        Command::Etl(args) => {
            args.apply(&mut config);
            run_etl(&config)?;
        }
        Command::Render(args) => {
            args.dirs.apply(&mut config);
            if let Some(n) = args.top_groups {
                config.figures.top_groups = n;
            }
            run_render(&config)?;
        }
        Command::Dashboard(args) => {
            args.dirs.apply(&mut config);
            if let Some(host) = args.host {
                config.dashboard.host = host;
            }
            if let Some(port) = args.port {
                config.dashboard.port = port;
            }
            let server = DashboardServer::new(config.dashboard.clone(), &config.data.raw_dir);
            server.start().await?;
        }
        Command::Pipeline(args) => {
            args.apply(&mut config);
            info!(
                raw_dir = %config.data.raw_dir,
                processed_dir = %config.data.processed_dir,
                figures_dir = %config.data.figures_dir,
                "Running full pipeline"
            );
            run_generate(&config)?;
            run_funnel(&config)?;
            run_etl(&config)?;
            run_render(&config)?;
        }
    }

    Ok(())
}
