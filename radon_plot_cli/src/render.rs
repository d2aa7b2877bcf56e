use std::panic;
use std::path::Path;

use anyhow::{anyhow, Result};
use chrono::{Duration, NaiveDateTime};
use plotters::prelude::*;
use plotters::style::{FontDesc, FontFamily, FontStyle};
use plotters_backend::{
    BackendColor, BackendCoord, BackendStyle, BackendTextStyle, DrawingBackend, DrawingErrorKind,
};
use radon_plot::{
    CrossingPolicy, RadonExport, Segment, SeriesPoint, ThresholdTable, ViewWindow, Zone,
};

#[derive(Clone, Copy, Debug)]
pub enum ChartKind {
    Png,
    Svg,
}

#[derive(Clone, Debug)]
pub struct PlotOptions {
    pub width: u32,
    pub height: u32,
    pub line_width: u32,
}

impl Default for PlotOptions {
    fn default() -> Self {
        // 12x6 in at 120 dpi
        Self {
            width: 1440,
            height: 720,
            line_width: 1,
        }
    }
}

/// Everything the chart needs, already clipped to the view window.
pub struct ChartData<'a> {
    pub export: &'a RadonExport,
    pub segments: Vec<Segment>,
    pub view: ViewWindow,
    pub table: ThresholdTable,
}

impl<'a> ChartData<'a> {
    pub fn new(export: &'a RadonExport, view: ViewWindow, policy: CrossingPolicy) -> Self {
        let segments = export
            .segments(policy)
            .iter()
            .filter_map(|segment| view.clip(segment))
            .collect();
        Self {
            export,
            segments,
            view,
            table: export.threshold_table(),
        }
    }
}

/// Final sample of the export and its zone, if the view shows it.
pub fn last_sample_marker(data: &ChartData) -> Option<(SeriesPoint, Zone)> {
    let time = *data.export.timeline.last()?;
    let value = *data.export.samples.last()?;
    if !data.view.contains(time) {
        return None;
    }
    Some((SeriesPoint { time, value }, data.table.classify(value)))
}

/// A maximal run of contiguous segments sharing one zone, drawn as one polyline.
#[derive(Clone, Debug, PartialEq)]
pub struct ZoneRun {
    pub zone: Zone,
    pub points: Vec<SeriesPoint>,
}

pub fn zone_runs(segments: &[Segment]) -> Vec<ZoneRun> {
    let mut runs: Vec<ZoneRun> = Vec::new();
    for segment in segments.iter().filter(|s| !s.is_point()) {
        match runs.last_mut() {
            Some(run)
                if run.zone == segment.zone && run.points.last() == Some(&segment.start) =>
            {
                run.points.push(segment.end);
            }
            _ => runs.push(ZoneRun {
                zone: segment.zone,
                points: vec![segment.start, segment.end],
            }),
        }
    }
    runs
}

fn zone_color(zone: Zone) -> RGBColor {
    let (r, g, b) = zone.rgb();
    RGBColor(r, g, b)
}

fn hours_since(origin: NaiveDateTime, time: NaiveDateTime) -> f64 {
    (time - origin).num_microseconds().unwrap_or(0) as f64 / 3_600_000_000.0
}

/// Tick label for an x offset in hours; long spans drop the time of day.
pub fn format_tick(origin: NaiveDateTime, hours: f64, span_hours: f64) -> String {
    let time = origin + Duration::microseconds((hours * 3_600_000_000.0).round() as i64);
    if span_hours > 72.0 {
        time.format("%Y-%m-%d").to_string()
    } else {
        time.format("%m-%d %H:%M").to_string()
    }
}

pub fn render_chart_guard(
    data: &ChartData,
    path: &Path,
    kind: ChartKind,
    opts: &PlotOptions,
) -> Result<()> {
    let render = || -> Result<()> {
        let size = (opts.width, opts.height);
        match kind {
            ChartKind::Png => {
                let root = LabelGuardBackend::new(BitMapBackend::new(path, size)).into_drawing_area();
                draw_chart(root, data, opts)
            }
            ChartKind::Svg => {
                let root = LabelGuardBackend::new(SVGBackend::new(path, size)).into_drawing_area();
                draw_chart(root, data, opts)
            }
        }
    };

    panic::catch_unwind(panic::AssertUnwindSafe(render))
        .map_err(|_| anyhow!("plotting backend panicked"))?
}

fn draw_chart<DB>(
    root: DrawingArea<DB, plotters::coord::Shift>,
    data: &ChartData,
    opts: &PlotOptions,
) -> Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    let area = root;
    area.fill(&WHITE)?;

    let origin = data.view.start();
    let span_hours = data.view.span_hours();
    let thresholds = data.table.thresholds();
    let unit = &data.export.unit;

    let values = data
        .segments
        .iter()
        .flat_map(|s| [s.start.value, s.end.value]);
    let (lo, hi) = values.fold((0.0_f64, 0.0_f64), |(lo, hi), v| (lo.min(v), hi.max(v)));
    let top = thresholds.iter().copied().fold(hi, f64::max);
    let y_max = (top * 1.1).max(1.0);
    let y_min = if lo < 0.0 { lo * 1.1 } else { 0.0 };

    let title = format!("Radon Levels Over Time ({})", data.export.metadata.serial_number);
    let caption_font = FontDesc::new(FontFamily::SansSerif, 28.0, FontStyle::Normal);
    let mut chart = ChartBuilder::on(&area)
        .caption(title, caption_font)
        .margin(20)
        .set_label_area_size(LabelAreaPosition::Left, 70)
        .set_label_area_size(LabelAreaPosition::Bottom, 60)
        .build_cartesian_2d(0.0..span_hours, y_min..y_max)?;

    let axis_font = FontDesc::new(FontFamily::SansSerif, 16.0, FontStyle::Normal);
    let tick = |x: &f64| format_tick(origin, *x, span_hours);
    chart
        .configure_mesh()
        .x_desc("Date and Time")
        .y_desc(format!("Radon Level ({})", unit))
        .x_labels(8)
        .x_label_formatter(&tick)
        .y_label_formatter(&|v| format!("{:.1}", v))
        .light_line_style(&BLACK.mix(0.05))
        .bold_line_style(&BLACK.mix(0.15))
        .label_style(axis_font.color(&BLACK.mix(0.85)))
        .draw()?;

    for (idx, run) in zone_runs(&data.segments).into_iter().enumerate() {
        let color = zone_color(run.zone);
        let style = ShapeStyle {
            color: color.to_rgba(),
            filled: false,
            stroke_width: opts.line_width,
        };
        let series = chart.draw_series(LineSeries::new(
            run.points
                .iter()
                .map(|p| (hours_since(origin, p.time), p.value)),
            style,
        ))?;
        if idx == 0 {
            series
                .label("Radon Levels")
                .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 30, y)], color));
        }
    }

    for (idx, threshold) in thresholds.iter().copied().enumerate() {
        let color = if idx == 0 {
            zone_color(Zone::Amber)
        } else {
            zone_color(Zone::Red)
        };
        chart
            .draw_series(DashedLineSeries::new(
                [(0.0, threshold), (span_hours, threshold)],
                10,
                6,
                plotters::style::Color::stroke_width(&color, 1),
            ))?
            .label(format!("{} {}", threshold, unit))
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 30, y)], color));
    }

    if let Some((last, zone)) = last_sample_marker(data) {
        chart.draw_series(std::iter::once(Circle::new(
            (hours_since(origin, last.time), last.value),
            4,
            zone_color(zone).filled(),
        )))?;
    }

    let legend_font = FontDesc::new(FontFamily::SansSerif, 16.0, FontStyle::Normal);
    chart
        .configure_series_labels()
        .background_style(&WHITE.mix(0.7))
        .border_style(&BLACK.mix(0.3))
        .label_font(legend_font.color(&BLACK))
        .position(SeriesLabelPosition::UpperLeft)
        .draw()?;

    area.present()?;
    Ok(())
}

/// Rough glyph box used when the font backend cannot measure a label.
fn approximate_text_size(text: &str, size: f64) -> (u32, u32) {
    let chars = text.chars().count() as f64;
    ((chars * size * 0.6).ceil() as u32, size.ceil() as u32)
}

/// Drawing backend that keeps rendering when fonts are unavailable.
///
/// Labels the font layer cannot render (missing system fonts, or a panic
/// inside the rasteriser) are dropped, and their size is estimated from the
/// character count so layout still succeeds. Shapes go straight through to
/// the wrapped backend, and so do its own I/O errors.
struct LabelGuardBackend<DB> {
    inner: DB,
}

impl<DB> LabelGuardBackend<DB> {
    fn new(inner: DB) -> Self {
        Self { inner }
    }
}

impl<DB: DrawingBackend> DrawingBackend for LabelGuardBackend<DB> {
    type ErrorType = DB::ErrorType;

    fn get_size(&self) -> (u32, u32) {
        self.inner.get_size()
    }

    fn ensure_prepared(&mut self) -> Result<(), DrawingErrorKind<Self::ErrorType>> {
        self.inner.ensure_prepared()
    }

    fn present(&mut self) -> Result<(), DrawingErrorKind<Self::ErrorType>> {
        self.inner.present()
    }

    fn draw_pixel(
        &mut self,
        point: BackendCoord,
        color: BackendColor,
    ) -> Result<(), DrawingErrorKind<DB::ErrorType>> {
        self.inner.draw_pixel(point, color)
    }

    fn draw_line<S: BackendStyle>(
        &mut self,
        from: BackendCoord,
        to: BackendCoord,
        style: &S,
    ) -> Result<(), DrawingErrorKind<DB::ErrorType>> {
        self.inner.draw_line(from, to, style)
    }

    fn draw_rect<S: BackendStyle>(
        &mut self,
        upper_left: BackendCoord,
        bottom_right: BackendCoord,
        style: &S,
        fill: bool,
    ) -> Result<(), DrawingErrorKind<DB::ErrorType>> {
        self.inner.draw_rect(upper_left, bottom_right, style, fill)
    }

    fn draw_path<S: BackendStyle, I: IntoIterator<Item = BackendCoord>>(
        &mut self,
        path: I,
        style: &S,
    ) -> Result<(), DrawingErrorKind<DB::ErrorType>> {
        self.inner.draw_path(path, style)
    }

    fn draw_circle<S: BackendStyle>(
        &mut self,
        center: BackendCoord,
        radius: u32,
        style: &S,
        fill: bool,
    ) -> Result<(), DrawingErrorKind<Self::ErrorType>> {
        self.inner.draw_circle(center, radius, style, fill)
    }

    fn draw_text<TStyle: BackendTextStyle>(
        &mut self,
        text: &str,
        style: &TStyle,
        pos: BackendCoord,
    ) -> Result<(), DrawingErrorKind<Self::ErrorType>> {
        let inner = &mut self.inner;
        match panic::catch_unwind(panic::AssertUnwindSafe(|| inner.draw_text(text, style, pos))) {
            Ok(Err(DrawingErrorKind::FontError(_))) | Err(_) => Ok(()),
            Ok(result) => result,
        }
    }

    fn estimate_text_size<TStyle: BackendTextStyle>(
        &self,
        text: &str,
        style: &TStyle,
    ) -> Result<(u32, u32), DrawingErrorKind<Self::ErrorType>> {
        let inner = &self.inner;
        match panic::catch_unwind(panic::AssertUnwindSafe(|| inner.estimate_text_size(text, style))) {
            Ok(Err(DrawingErrorKind::FontError(_))) | Err(_) => {
                Ok(approximate_text_size(text, style.size()))
            }
            Ok(result) => result,
        }
    }
}
