//! Self-contained HTML funnel charts, used when raster export is unavailable.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use shopfunnel_core::markup::escape_html;
use shopfunnel_core::{FunnelError, FunnelResult};

use super::{ChartBackend, FunnelChart};

const PALETTE: &[&str] = &["#636efa", "#ef553b", "#00cc96", "#ab63fa", "#ffa15a", "#19d3f3"];

pub struct HtmlBackend;

impl HtmlBackend {
    /// The complete document for `chart`.
    pub fn document(chart: &FunnelChart) -> String {
        let max = chart.max_count().max(1) as f64;
        let title = escape_html(&chart.title);

        let mut bars = String::new();
        for (i, stage) in chart.stages.iter().enumerate() {
            let width = 100.0 * stage.count as f64 / max;
            let _ = write!(
                bars,
                r#"    <div class="stage">
      <span class="label">{label}</span>
      <div class="track"><div class="bar" style="width:{width:.1}%;background:{color}"></div></div>
      <span class="value">{count} ({rate:.1}%)</span>
    </div>
"#,
                label = escape_html(&stage.label),
                color = PALETTE[i % PALETTE.len()],
                count = stage.count,
                rate = 100.0 * chart.rate(stage),
            );
        }

        format!(
            r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <title>{title}</title>
  <style>
    body {{ font-family: sans-serif; margin: 2rem; }}
    .stage {{ display: flex; align-items: center; margin: 0.4rem 0; }}
    .label {{ width: 8rem; }}
    .track {{ flex: 1; display: flex; justify-content: center; }}
    .bar {{ height: 2rem; min-width: 2px; }}
    .value {{ width: 10rem; text-align: right; }}
  </style>
</head>
<body>
  <h1>{title}</h1>
  <div class="funnel">
{bars}  </div>
</body>
</html>
"#
        )
    }
}

impl ChartBackend for HtmlBackend {
    fn extension(&self) -> &'static str {
        "html"
    }

    fn render(&self, chart: &FunnelChart, path: &Path) -> FunnelResult<()> {
        if chart.stages.is_empty() {
            return Err(FunnelError::Render(format!(
                "chart {} has no stages",
                chart.file_stem
            )));
        }
        fs::write(path, Self::document(chart))?;
        Ok(())
    }

    fn backend_name(&self) -> &str {
        "html"
    }
}
