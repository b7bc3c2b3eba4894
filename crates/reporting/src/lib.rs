//! Funnel and analytics reporting: sessionized purchase funnels, summary
//! tables and funnel charts derived from the raw clickstream tables.

pub mod analytics;
pub mod figures;
pub mod funnel;
pub mod schema;

pub use analytics::{build_analytics_tables, AnalyticsTables};
pub use figures::{FigureRenderer, RenderSummary};
pub use funnel::{build_funnel_tables, Dimension, FunnelCounts, FunnelReport, FunnelStep};
