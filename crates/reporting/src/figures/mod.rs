//! Funnel chart rendering.
//!
//! Each chart is offered to a chain of [`ChartBackend`]s in order: the raster
//! backend writes a PNG, the HTML backend is the fallback. A chart no backend
//! can write is logged and skipped.

pub mod html;
pub mod raster;

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use shopfunnel_core::config::FiguresConfig;
use shopfunnel_core::{FunnelError, FunnelResult};
use tracing::{error, info, warn};

use crate::funnel::{read_funnel_table, Dimension, FunnelRow, FunnelStep, OVERALL_FILE_NAME};

pub use html::HtmlBackend;
pub use raster::RasterBackend;

const MAX_SAFE_NAME_LEN: usize = 50;

/// A writer for one chart file format.
pub trait ChartBackend: Send + Sync {
    /// File extension, without the dot.
    fn extension(&self) -> &'static str;

    fn render(&self, chart: &FunnelChart, path: &Path) -> FunnelResult<()>;

    fn backend_name(&self) -> &str;
}

/// One funnel stage as drawn.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartStage {
    pub label: String,
    pub count: u64,
}

/// A single funnel chart: ordered stages plus the file stem it is saved under.
#[derive(Debug, Clone, PartialEq)]
pub struct FunnelChart {
    pub file_stem: String,
    pub title: String,
    pub stages: Vec<ChartStage>,
}

impl FunnelChart {
    pub fn from_rows<'a>(
        file_stem: impl Into<String>,
        title: impl Into<String>,
        rows: impl IntoIterator<Item = &'a FunnelRow>,
    ) -> Self {
        Self {
            file_stem: file_stem.into(),
            title: title.into(),
            stages: rows
                .into_iter()
                .map(|row| ChartStage {
                    label: row.step.clone(),
                    count: row.count,
                })
                .collect(),
        }
    }

    pub fn max_count(&self) -> u64 {
        self.stages.iter().map(|s| s.count).max().unwrap_or(0)
    }

    /// Share of the first stage that reached `stage`.
    pub fn rate(&self, stage: &ChartStage) -> f64 {
        match self.stages.first() {
            Some(first) if first.count > 0 => stage.count as f64 / first.count as f64,
            _ => 0.0,
        }
    }
}

/// Files written and charts that could not be exported by any backend.
#[derive(Debug, Clone, Default)]
pub struct RenderSummary {
    pub written: Vec<PathBuf>,
    pub failed: Vec<String>,
}

/// Replace every non-alphanumeric character with `_` and cap the length.
pub fn safe_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .take(MAX_SAFE_NAME_LEN)
        .collect()
}

/// `stem`, or `stem_2`, `stem_3`, ... when an earlier chart already took it.
fn unique_stem(stem: String, taken: &mut HashSet<String>) -> String {
    if taken.insert(stem.clone()) {
        return stem;
    }
    let unique = (2..)
        .map(|n| format!("{stem}_{n}"))
        .find(|candidate| !taken.contains(candidate))
        .unwrap_or_default();
    warn!(stem = %stem, renamed = %unique, "Figure name collision");
    taken.insert(unique.clone());
    unique
}

/// Group breakdown rows by group value and keep the `limit` groups with the
/// most sessions. Ties keep ascending group order.
pub fn top_groups(rows: &[FunnelRow], limit: usize) -> Vec<(String, Vec<FunnelRow>)> {
    let mut order: Vec<String> = Vec::new();
    let mut grouped: HashMap<String, Vec<FunnelRow>> = HashMap::new();
    for row in rows {
        let Some(group) = row.group.as_ref() else {
            continue;
        };
        if !grouped.contains_key(group) {
            order.push(group.clone());
        }
        grouped.entry(group.clone()).or_default().push(row.clone());
    }

    let sessions = |rows: &[FunnelRow]| {
        rows.iter()
            .find(|r| r.step == FunnelStep::Sessions.as_str())
            .map_or(0, |r| r.count)
    };
    order.sort_by(|a, b| {
        sessions(&grouped[b])
            .cmp(&sessions(&grouped[a]))
            .then_with(|| a.cmp(b))
    });

    order
        .into_iter()
        .take(limit)
        .filter_map(|group| grouped.remove(&group).map(|rows| (group, rows)))
        .collect()
}

/// Renders the funnel tables of a processed directory into a figures directory.
pub struct FigureRenderer {
    out_dir: PathBuf,
    top_groups: usize,
    backends: Vec<Box<dyn ChartBackend>>,
}

impl FigureRenderer {
    /// PNG first, HTML fallback.
    pub fn new(out_dir: impl Into<PathBuf>, config: &FiguresConfig) -> Self {
        Self::with_backends(
            out_dir,
            config.top_groups,
            vec![
                Box::new(RasterBackend::new(config.width, config.height)),
                Box::new(HtmlBackend),
            ],
        )
    }

    pub fn with_backends(
        out_dir: impl Into<PathBuf>,
        top_groups: usize,
        backends: Vec<Box<dyn ChartBackend>>,
    ) -> Self {
        Self {
            out_dir: out_dir.into(),
            top_groups,
            backends,
        }
    }

    /// Write `chart` with the first backend that succeeds.
    pub fn export(&self, chart: &FunnelChart) -> Option<PathBuf> {
        for backend in &self.backends {
            let path = self
                .out_dir
                .join(format!("{}.{}", chart.file_stem, backend.extension()));
            match backend.render(chart, &path) {
                Ok(()) => {
                    info!(path = %path.display(), backend = backend.backend_name(), "Wrote figure");
                    return Some(path);
                }
                Err(e) => {
                    warn!(
                        chart = %chart.file_stem,
                        backend = backend.backend_name(),
                        error = %e,
                        "Figure export failed, trying next format"
                    );
                    // Remove any partial output.
                    let _ = fs::remove_file(&path);
                }
            }
        }
        error!(chart = %chart.file_stem, "Failed to export figure in any format");
        None
    }

    /// Chart the overall funnel and the top groups of every breakdown table present.
    ///
    /// A missing `funnel_overall.csv` is an error; missing breakdown tables are skipped.
    pub fn render_all(&self, processed_dir: &Path) -> FunnelResult<RenderSummary> {
        fs::create_dir_all(&self.out_dir)?;
        let mut summary = RenderSummary::default();

        let overall = read_funnel_table(&processed_dir.join(OVERALL_FILE_NAME), None)?;
        let chart = FunnelChart::from_rows("funnel_overall", "Overall Funnel", &overall);
        self.export_into(&chart, &mut summary);

        let mut taken = HashSet::from(["funnel_overall".to_string()]);
        for dimension in Dimension::ALL {
            let path = processed_dir.join(dimension.file_name());
            let rows = match read_funnel_table(&path, Some(dimension)) {
                Ok(rows) => rows,
                Err(FunnelError::MissingInput(_)) => {
                    info!(path = %path.display(), "No breakdown table, skipping");
                    continue;
                }
                Err(e) => return Err(e),
            };

            for (group, rows) in top_groups(&rows, self.top_groups) {
                let stem = unique_stem(
                    format!("funnel_{}_{}", dimension.column(), safe_name(&group)),
                    &mut taken,
                );
                let chart = FunnelChart::from_rows(
                    stem,
                    format!("Funnel - {group}"),
                    &rows,
                );
                self.export_into(&chart, &mut summary);
            }
        }

        info!(
            written = summary.written.len(),
            failed = summary.failed.len(),
            "Report generation completed"
        );
        Ok(summary)
    }

    fn export_into(&self, chart: &FunnelChart, summary: &mut RenderSummary) {
        match self.export(chart) {
            Some(path) => summary.written.push(path),
            None => summary.failed.push(chart.file_stem.clone()),
        }
    }
}
