use std::fs::{self, File};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use chrono::{NaiveDate, NaiveDateTime};
use clap::{ArgAction, Parser, Subcommand, ValueEnum, ValueHint};
use radon_plot::{
    load_export, summarize, CrossingPolicy, ParseWarning, ParserConfig, RadonError, RadonExport,
    SeriesSummary, ViewWindow,
};
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod render;

use render::{render_chart_guard, ChartData, ChartKind, PlotOptions};

/// Factor applied by each `--zoom-in` / `--zoom-out` step.
const ZOOM_STEP: f64 = 2.0;

#[derive(Parser, Debug)]
#[command(author, version, about = "RadonEye RD200 export chart CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render a zone-coloured radon chart for an export file
    Plot(PlotArgs),
    /// Summarise an export file without rendering
    Inspect(InspectArgs),
}

#[derive(Parser, Debug)]
struct PlotArgs {
    /// RadonEye export file; prompted for on stdin when omitted
    #[arg(value_hint = ValueHint::FilePath)]
    input: Option<PathBuf>,

    /// Output PNG path (defaults next to the input)
    #[arg(long, value_hint = ValueHint::FilePath)]
    png: Option<PathBuf>,

    /// Output SVG path
    #[arg(long, value_hint = ValueHint::FilePath)]
    svg: Option<PathBuf>,

    /// Write the reconstructed series as CSV (`-` for stdout)
    #[arg(long, value_hint = ValueHint::FilePath)]
    csv: Option<PathBuf>,

    /// Image width in pixels
    #[arg(long, default_value_t = 1440)]
    width: u32,

    /// Image height in pixels
    #[arg(long, default_value_t = 720)]
    height: u32,

    /// Line width in pixels
    #[arg(long, default_value_t = 1)]
    line_width: u32,

    /// Threshold crossings resolved per sample pair
    #[arg(long, value_enum, default_value_t = CrossingOpt::All)]
    crossings: CrossingOpt,

    /// First visible timestamp (`YYYY-MM-DD[ HH:MM[:SS]]`)
    #[arg(long, value_parser = parse_timestamp)]
    from: Option<NaiveDateTime>,

    /// Last visible timestamp (`YYYY-MM-DD[ HH:MM[:SS]]`)
    #[arg(long, value_parser = parse_timestamp)]
    to: Option<NaiveDateTime>,

    /// Zoom in this many steps around the window centre
    #[arg(long, default_value_t = 0)]
    zoom_in: u32,

    /// Zoom out this many steps around the window centre
    #[arg(long, default_value_t = 0)]
    zoom_out: u32,

    /// Shift the window by this many hours (negative for earlier)
    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    pan: f64,

    /// Verbose logging
    #[arg(long, action = ArgAction::SetTrue)]
    verbose: bool,
}

#[derive(Parser, Debug)]
struct InspectArgs {
    /// RadonEye export file
    #[arg(value_hint = ValueHint::FilePath)]
    input: PathBuf,

    /// Report path (stdout when omitted)
    #[arg(short, long, value_hint = ValueHint::FilePath)]
    output: Option<PathBuf>,

    /// Emit the report as JSON
    #[arg(long, action = ArgAction::SetTrue)]
    json: bool,

    /// Threshold crossings resolved per sample pair
    #[arg(long, value_enum, default_value_t = CrossingOpt::All)]
    crossings: CrossingOpt,

    /// Verbose logging
    #[arg(long, action = ArgAction::SetTrue)]
    verbose: bool,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum CrossingOpt {
    All,
    FirstOnly,
}

impl From<CrossingOpt> for CrossingPolicy {
    fn from(value: CrossingOpt) -> Self {
        match value {
            CrossingOpt::All => CrossingPolicy::All,
            CrossingOpt::FirstOnly => CrossingPolicy::FirstOnly,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let verbose = match &cli.command {
        Command::Plot(args) => args.verbose,
        Command::Inspect(args) => args.verbose,
    };
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    match cli.command {
        Command::Plot(args) => handle_plot(args),
        Command::Inspect(args) => handle_inspect(args),
    }
}

/// Resolve the export path from the argument, or prompt for one. An empty
/// answer means no file was selected.
fn select_source<R: BufRead, W: Write>(
    arg: Option<PathBuf>,
    mut input: R,
    mut prompt: W,
) -> Result<PathBuf> {
    if let Some(path) = arg {
        if path.as_os_str().is_empty() {
            return Err(anyhow!("No file selected."));
        }
        return Ok(path);
    }
    write!(prompt, "Select RadonEye RD200 data file: ")?;
    prompt.flush()?;
    let mut answer = String::new();
    input.read_line(&mut answer)?;
    let answer = answer.trim();
    if answer.is_empty() {
        return Err(anyhow!("No file selected."));
    }
    Ok(PathBuf::from(answer))
}

fn load(path: &Path) -> Result<RadonExport> {
    let export = load_export(path, &ParserConfig::default())
        .with_context(|| format!("failed to load {}", path.display()))?;
    if export.samples.is_empty() {
        return Err(RadonError::InsufficientData)
            .with_context(|| format!("no data points in {}", path.display()));
    }
    Ok(export)
}

fn handle_plot(args: PlotArgs) -> Result<()> {
    let stdin = io::stdin();
    let input = select_source(args.input.clone(), stdin.lock(), io::stderr())?;
    let export = load(&input)?;
    let policy: CrossingPolicy = args.crossings.into();

    let full = ViewWindow::full(&export.timeline).ok_or(RadonError::InsufficientData)?;
    let view = resolve_view(&args, full)?;
    if view != full {
        info!("View window: {} to {}", view.start(), view.end());
    }

    let data = ChartData::new(&export, view, policy);
    info!("Segments to draw: {}", data.segments.len());

    if let Some(csv_path) = args.csv.as_ref() {
        if csv_path.as_os_str() == "-" {
            write_series_stdout(&export)?;
        } else {
            write_series_csv(&export, csv_path)?;
            info!("Wrote series CSV: {}", csv_path.display());
        }
    }

    let opts = PlotOptions {
        width: args.width,
        height: args.height,
        line_width: args.line_width.max(1),
    };

    let mut targets = Vec::new();
    if let Some(path) = args.png.clone() {
        targets.push((path, ChartKind::Png));
    }
    if let Some(path) = args.svg.clone() {
        targets.push((path, ChartKind::Svg));
    }
    if targets.is_empty() {
        targets.push((default_plot_path(&input), ChartKind::Png));
    }

    info!("Generating plot...");
    for (path, kind) in targets {
        render_chart_guard(&data, &path, kind, &opts)
            .with_context(|| format!("error generating plot {}", path.display()))?;
        info!("Wrote plot: {}", path.display());
    }
    Ok(())
}

fn default_plot_path(input: &Path) -> PathBuf {
    input.with_extension("png")
}

/// Apply the explicit bounds first, then zoom and pan steps. Zoom and pan
/// results are kept inside the data range.
fn resolve_view(args: &PlotArgs, full: ViewWindow) -> Result<ViewWindow> {
    let mut view = match (args.from, args.to) {
        (None, None) => full,
        (from, to) => ViewWindow::new(
            from.unwrap_or_else(|| full.start()),
            to.unwrap_or_else(|| full.end()),
        )?,
    };
    if args.zoom_in == 0 && args.zoom_out == 0 && args.pan == 0.0 {
        return Ok(view);
    }
    for _ in 0..args.zoom_in {
        view = view.zoom_in(ZOOM_STEP)?;
    }
    for _ in 0..args.zoom_out {
        // any wider window clamps back to the full range
        if view.span() >= full.span() {
            break;
        }
        view = view.zoom_out(ZOOM_STEP)?;
    }
    Ok(view.pan(args.pan)?.clamp_to(&full))
}

fn parse_timestamp(input: &str) -> Result<NaiveDateTime, String> {
    let trimmed = input.trim();
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(ts);
        }
    }
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .ok_or_else(|| format!("invalid timestamp '{}'", input))
}

fn write_series_stdout(export: &RadonExport) -> Result<()> {
    let stdout = io::stdout();
    let handle = stdout.lock();
    let mut writer = csv::Writer::from_writer(handle);
    write_series_rows(export, &mut writer)
}

fn write_series_csv(export: &RadonExport, path: &Path) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut writer = csv::Writer::from_writer(file);
    write_series_rows(export, &mut writer)
}

fn write_series_rows<W: Write>(export: &RadonExport, writer: &mut csv::Writer<W>) -> Result<()> {
    writer.write_record(["timestamp", "value", "zone"])?;
    let table = export.threshold_table();
    for point in export.points() {
        writer.write_record([
            point.time.format("%Y-%m-%d %H:%M:%S").to_string(),
            point.value.to_string(),
            table.classify(point.value).to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

#[derive(Debug, Serialize)]
struct InspectReport {
    file: String,
    serial_number: String,
    unit: String,
    declared_count: usize,
    parsed_count: usize,
    skipped_lines: usize,
    start: Option<NaiveDateTime>,
    end: NaiveDateTime,
    segment_count: usize,
    summary: SeriesSummary,
    warnings: Vec<ParseWarning>,
}

fn build_report(path: &Path, export: &RadonExport, policy: CrossingPolicy) -> InspectReport {
    InspectReport {
        file: path.display().to_string(),
        serial_number: export.metadata.serial_number.clone(),
        unit: export.unit.to_string(),
        declared_count: export.metadata.declared_count,
        parsed_count: export.samples.len(),
        skipped_lines: export.skipped_lines(),
        start: export.start_datetime(),
        end: export.metadata.end_datetime,
        segment_count: export.segments(policy).len(),
        summary: summarize(&export.samples, &export.threshold_table()),
        warnings: export.warnings.clone(),
    }
}

fn format_report(report: &InspectReport) -> String {
    let fmt_opt = |v: Option<f64>| v.map_or("n/a".into(), |v| format!("{:.2}", v));
    let mut out = String::new();
    out.push_str(&format!("FILE: {}\n", report.file));
    out.push_str(&format!("  serial: {}\n", report.serial_number));
    out.push_str(&format!("  unit: {}\n", report.unit));
    out.push_str(&format!(
        "  samples: {} parsed / {} declared ({} skipped)\n",
        report.parsed_count, report.declared_count, report.skipped_lines
    ));
    if let Some(start) = report.start {
        out.push_str(&format!("  span: {} to {}\n", start, report.end));
    }
    out.push_str(&format!(
        "  min={} max={} mean={}\n",
        fmt_opt(report.summary.min),
        fmt_opt(report.summary.max),
        fmt_opt(report.summary.mean)
    ));
    out.push_str("  hours per zone:\n");
    for entry in &report.summary.zones {
        out.push_str(&format!("    - {}: {}\n", entry.zone, entry.samples));
    }
    out.push_str(&format!("  segments: {}\n", report.segment_count));
    if !report.warnings.is_empty() {
        out.push_str("  warnings:\n");
        for warning in &report.warnings {
            out.push_str(&format!("    - {}\n", warning));
        }
    }
    out
}

fn handle_inspect(args: InspectArgs) -> Result<()> {
    let export = load_export(&args.input, &ParserConfig::default())
        .with_context(|| format!("failed to load {}", args.input.display()))?;
    if export.samples.is_empty() {
        warn!("No data points parsed from {}", args.input.display());
    }
    let report = build_report(&args.input, &export, args.crossings.into());
    let text = if args.json {
        serde_json::to_string_pretty(&report)? + "\n"
    } else {
        format_report(&report)
    };

    match args.output.as_ref() {
        Some(path) => {
            fs::write(path, text).with_context(|| format!("failed to write {}", path.display()))?;
            info!("Inspection report written: {}", path.display());
        }
        None => {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            handle.write_all(text.as_bytes())?;
        }
    }
    Ok(())
}
