//! Core RadonEye export handling: record parsing, timeline reconstruction
//! and threshold-zone segmentation of the measured radon series.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use serde::Serialize;
use thiserror::Error;
use tracing::info;

pub mod parser;
pub mod segments;
pub mod summary;
pub mod timeline;
pub mod view;
pub mod zones;

pub use parser::{parse_records, Flow, ParseWarning, ParsedRecords, ParserConfig, ParserState};
pub use segments::{segment_series, CrossingPolicy, Segment, SeriesPoint};
pub use summary::{summarize, SeriesSummary};
pub use timeline::{build_timeline, parse_export_name, ExportName};
pub use view::ViewWindow;
pub use zones::{ThresholdTable, Unit, Zone, ZoneBand};

#[derive(Error, Debug)]
pub enum RadonError {
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid export file name '{name}': {reason}")]
    InvalidFileName { name: String, reason: String },
    #[error("line {line_number}: invalid data count declaration '{line}'")]
    InvalidDeclaredCount { line_number: usize, line: String },
    #[error("no data points parsed")]
    InsufficientData,
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

/// Metadata describing one export, taken from its file name and header lines.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FileMetadata {
    pub serial_number: String,
    pub end_datetime: NaiveDateTime,
    pub declared_count: usize,
}

/// A fully loaded export: samples with their reconstructed hourly timeline.
#[derive(Clone, Debug)]
pub struct RadonExport {
    pub metadata: FileMetadata,
    pub unit: Unit,
    pub samples: Vec<f64>,
    pub timeline: Vec<NaiveDateTime>,
    pub warnings: Vec<ParseWarning>,
}

impl RadonExport {
    pub fn threshold_table(&self) -> ThresholdTable {
        ThresholdTable::for_unit(&self.unit)
    }

    pub fn points(&self) -> Vec<SeriesPoint> {
        self.timeline
            .iter()
            .zip(self.samples.iter())
            .map(|(&time, &value)| SeriesPoint { time, value })
            .collect()
    }

    pub fn segments(&self, policy: CrossingPolicy) -> Vec<Segment> {
        segment_series(&self.timeline, &self.samples, &self.threshold_table(), policy)
    }

    pub fn start_datetime(&self) -> Option<NaiveDateTime> {
        self.timeline.first().copied()
    }

    pub fn skipped_lines(&self) -> usize {
        self.warnings
            .iter()
            .filter(|w| matches!(w, ParseWarning::UnparseableValue { .. }))
            .count()
    }
}

/// Load an export from disk. The file name is validated before the file is opened.
pub fn load_export(path: &Path, config: &ParserConfig) -> Result<RadonExport, RadonError> {
    let name = path.to_string_lossy();
    let export_name = parse_export_name(&name)?;
    info!("Serial number extracted: {}", export_name.serial_number);

    let file = File::open(path).map_err(|source| RadonError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    info!("Loading data from {}", path.display());
    let records = parse_records(BufReader::new(file), config).map_err(|err| match err {
        RadonError::Read { source, .. } => RadonError::Read {
            path: path.to_path_buf(),
            source,
        },
        other => other,
    })?;
    Ok(assemble(export_name, records))
}

/// Same as [`load_export`] but over an already opened reader; `name` supplies the
/// serial number and end timestamp.
pub fn read_export<R: BufRead>(
    name: &str,
    reader: R,
    config: &ParserConfig,
) -> Result<RadonExport, RadonError> {
    let export_name = parse_export_name(name)?;
    let records = parse_records(reader, config)?;
    Ok(assemble(export_name, records))
}

fn assemble(export_name: ExportName, records: ParsedRecords) -> RadonExport {
    let timeline = build_timeline(export_name.end_datetime, records.samples.len());
    if let (Some(start), Some(end)) = (timeline.first(), timeline.last()) {
        info!("Start datetime: {}, End datetime: {}", start, end);
    }
    RadonExport {
        metadata: FileMetadata {
            serial_number: export_name.serial_number,
            end_datetime: export_name.end_datetime,
            declared_count: records.declared_count,
        },
        unit: records.unit,
        samples: records.samples,
        timeline,
        warnings: records.warnings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::io::Cursor;

    #[test]
    fn test_read_export_builds_matching_timeline() {
        let text = "Unit: Bq/m3\nData No: 3\n1) 50\n2) 150\n3) 250\n";
        let export = read_export(
            "IE08RE000855_20240115120000.txt",
            Cursor::new(text),
            &ParserConfig::default(),
        )
        .unwrap();

        assert_eq!(export.metadata.serial_number, "IE08RE000855");
        assert_eq!(export.metadata.declared_count, 3);
        assert_eq!(export.timeline.len(), export.samples.len());
        let end = NaiveDate::from_ymd_opt(2024, 1, 15)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        assert_eq!(export.timeline.last(), Some(&end));
        assert_eq!(
            export.start_datetime(),
            NaiveDate::from_ymd_opt(2024, 1, 15)
                .unwrap()
                .and_hms_opt(10, 0, 0)
        );
        assert!(export.warnings.is_empty());
    }

    #[test]
    fn test_line_stepping_through_root_exports() {
        let mut state = ParserState::new(&ParserConfig::default());
        let mut stopped_at = None;
        for (idx, line) in ["Data No: 2", "1) 40", "2) 60", "3) 80"].into_iter().enumerate() {
            let (next, flow) = state.advance(idx + 1, line).unwrap();
            state = next;
            if flow == Flow::Stop {
                stopped_at = Some(idx + 1);
                break;
            }
        }
        assert_eq!(stopped_at, Some(3));
        assert_eq!(state.finish().samples, vec![40.0, 60.0]);
    }

    #[test]
    fn test_bad_file_name_fails_before_reading() {
        let err = read_export(
            "export.txt",
            Cursor::new("1) 10\n"),
            &ParserConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, RadonError::InvalidFileName { .. }));
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let path = std::env::temp_dir().join("IE00RE000000_missing_20240101000000.txt");
        let err = load_export(&path, &ParserConfig::default()).unwrap_err();
        match err {
            RadonError::Read { path: reported, .. } => assert_eq!(reported, path),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_load_export_from_disk() {
        let path = std::env::temp_dir().join(format!(
            "IE08RE{:06}_20240301080000.txt",
            std::process::id() % 1_000_000
        ));
        std::fs::write(&path, "Unit: pCi/L\nData No: 2\n1) 1.5 pCi/L\n2) 5.0 pCi/L\n").unwrap();
        let export = load_export(&path, &ParserConfig::default()).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(export.unit, Unit::PciPerL);
        assert_eq!(export.samples, vec![1.5, 5.0]);
        assert_eq!(export.skipped_lines(), 0);
        let segments = export.segments(CrossingPolicy::All);
        // one crossing at 2.7 and one at 4.0, plus the trailing point
        assert_eq!(segments.len(), 4);
    }
}
