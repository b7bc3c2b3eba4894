//! PNG funnel charts drawn with plotters' bitmap backend.
//!
//! The title runs across the top. Each stage is a row: its label on the left,
//! a centred bar whose width is proportional to the stage count, and the count
//! with its share of the first stage on the right. Text uses the embedded
//! DejaVu Sans face so rendering does not depend on system fonts.

use std::path::Path;
use std::sync::OnceLock;

use plotters::coord::Shift;
use plotters::prelude::*;
use plotters::style::register_font;
use plotters::style::text_anchor::{HPos, Pos, VPos};
use shopfunnel_core::{FunnelError, FunnelResult};

use super::{ChartBackend, FunnelChart};

const FONT_FAMILY: &str = "shopfunnel-sans";
static FONT_BYTES: &[u8] = include_bytes!("../../assets/DejaVuSans.ttf");

const MARGIN: u32 = 24;
const TITLE_HEIGHT: u32 = 48;
const LABEL_WIDTH: u32 = 130;
const VALUE_WIDTH: u32 = 150;
const BAR_GAP: u32 = 12;
const TITLE_SIZE: i32 = 24;
const TEXT_SIZE: i32 = 16;

/// Register the embedded face with plotters once per process.
fn chart_font() -> FunnelResult<&'static str> {
    static REGISTERED: OnceLock<bool> = OnceLock::new();
    let registered = *REGISTERED
        .get_or_init(|| register_font(FONT_FAMILY, FontStyle::Normal, FONT_BYTES).is_ok());
    if registered {
        Ok(FONT_FAMILY)
    } else {
        Err(FunnelError::Render(
            "embedded chart font could not be loaded".to_string(),
        ))
    }
}

pub struct RasterBackend {
    width: u32,
    height: u32,
}

impl RasterBackend {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    fn check(&self, chart: &FunnelChart) -> FunnelResult<()> {
        if chart.stages.is_empty() {
            return Err(FunnelError::Render(format!(
                "chart {} has no stages",
                chart.file_stem
            )));
        }
        if self.width <= 2 * MARGIN + LABEL_WIDTH + VALUE_WIDTH
            || self.height <= 2 * MARGIN + TITLE_HEIGHT
        {
            return Err(FunnelError::Render(format!(
                "canvas {}x{} is too small",
                self.width, self.height
            )));
        }
        Ok(())
    }

    /// Draw `chart` onto `root`. The caller presents the area.
    fn draw<DB: DrawingBackend>(
        &self,
        chart: &FunnelChart,
        root: &DrawingArea<DB, Shift>,
    ) -> FunnelResult<()> {
        let font = chart_font()?;
        root.fill(&WHITE).map_err(render_error)?;

        let title_style = (font, TITLE_SIZE)
            .into_font()
            .color(&BLACK)
            .pos(Pos::new(HPos::Center, VPos::Top));
        root.draw(&Text::new(
            chart.title.clone(),
            ((self.width / 2) as i32, MARGIN as i32),
            title_style,
        ))
        .map_err(render_error)?;

        let label_style = (font, TEXT_SIZE)
            .into_font()
            .color(&BLACK)
            .pos(Pos::new(HPos::Left, VPos::Center));
        let value_style = (font, TEXT_SIZE)
            .into_font()
            .color(&BLACK)
            .pos(Pos::new(HPos::Right, VPos::Center));

        let bar_left = MARGIN + LABEL_WIDTH;
        let bar_area = f64::from(self.width - 2 * MARGIN - LABEL_WIDTH - VALUE_WIDTH);
        let bar_centre = bar_left as i32 + (bar_area / 2.0) as i32;
        let plot_top = MARGIN + TITLE_HEIGHT;
        let band = (self.height - MARGIN - plot_top) / chart.stages.len() as u32;
        let max = chart.max_count().max(1) as f64;

        for (i, stage) in chart.stages.iter().enumerate() {
            let top = (plot_top + i as u32 * band) as i32;
            let bottom = top + band.saturating_sub(BAR_GAP).max(1) as i32;
            let middle = (top + bottom) / 2;

            let bar_width = ((bar_area * stage.count as f64 / max).round() as i32).max(1);
            let left = bar_centre - bar_width / 2;
            root.draw(&Rectangle::new(
                [(left, top), (left + bar_width, bottom)],
                Palette99::pick(i).filled(),
            ))
            .map_err(render_error)?;

            root.draw(&Text::new(
                stage.label.clone(),
                (MARGIN as i32, middle),
                label_style.clone(),
            ))
            .map_err(render_error)?;
            root.draw(&Text::new(
                format!("{} ({:.1}%)", stage.count, 100.0 * chart.rate(stage)),
                ((self.width - MARGIN) as i32, middle),
                value_style.clone(),
            ))
            .map_err(render_error)?;
        }
        Ok(())
    }
}

fn render_error<E: std::fmt::Display>(e: E) -> FunnelError {
    FunnelError::Render(e.to_string())
}

impl ChartBackend for RasterBackend {
    fn extension(&self) -> &'static str {
        "png"
    }

    fn render(&self, chart: &FunnelChart, path: &Path) -> FunnelResult<()> {
        self.check(chart)?;
        let root = BitMapBackend::new(path, (self.width, self.height)).into_drawing_area();
        self.draw(chart, &root)?;
        root.present().map_err(render_error)?;
        Ok(())
    }

    fn backend_name(&self) -> &str {
        "plotters_bitmap"
    }
}
