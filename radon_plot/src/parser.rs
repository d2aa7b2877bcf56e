use std::fmt;
use std::io::{self, BufRead};
use std::path::PathBuf;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{RadonError, Unit};

/// Sample count assumed when the export never declares `Data No:`.
pub const DEFAULT_DECLARED_COUNT: usize = 4391;

#[derive(Clone, Debug)]
pub struct ParserConfig {
    pub default_declared_count: usize,
    /// Emit a progress line every this many accepted samples; 0 disables.
    pub progress_every: usize,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            default_declared_count: DEFAULT_DECLARED_COUNT,
            progress_every: 1000,
        }
    }
}

/// Recoverable problems found while parsing; none of them abort the run.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParseWarning {
    UnparseableValue {
        line_number: usize,
        line: String,
        reason: String,
    },
    CountMismatch {
        declared: usize,
        parsed: usize,
    },
}

impl fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseWarning::UnparseableValue {
                line_number,
                line,
                reason,
            } => write!(f, "failed to parse line {}: '{}' ({})", line_number, line, reason),
            ParseWarning::CountMismatch { declared, parsed } => write!(
                f,
                "expected {} data points, found {}; check file format",
                declared, parsed
            ),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ParsedRecords {
    pub unit: Unit,
    pub declared_count: usize,
    pub samples: Vec<f64>,
    pub warnings: Vec<ParseWarning>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

#[derive(Debug, PartialEq)]
enum LineKind<'a> {
    Unit(&'a str),
    DeclaredCount,
    Data { ordinal: usize, rest: &'a str },
    Other,
}

fn classify_line(line: &str) -> LineKind<'_> {
    if let Some(rest) = line.strip_prefix("Unit:") {
        return LineKind::Unit(rest.trim());
    }
    if line.starts_with("Data No:") {
        return LineKind::DeclaredCount;
    }
    if let Some((head, rest)) = line.split_once(')') {
        let canonical = !head.is_empty()
            && !head.starts_with('0')
            && head.bytes().all(|b| b.is_ascii_digit());
        if canonical {
            if let Ok(ordinal) = head.parse::<usize>() {
                return LineKind::Data { ordinal, rest };
            }
        }
    }
    LineKind::Other
}

fn parse_value(rest: &str) -> Result<f64, String> {
    let token = rest
        .split_whitespace()
        .next()
        .ok_or_else(|| "missing value".to_string())?;
    let value: f64 = token.parse().map_err(|e| format!("'{}': {}", token, e))?;
    if !value.is_finite() {
        return Err(format!("'{}' is not a finite number", token));
    }
    Ok(value)
}

/// Running state of a parse, passed by value through each line step.
#[derive(Clone, Debug)]
pub struct ParserState {
    unit: Unit,
    declared_count: usize,
    samples: Vec<f64>,
    warnings: Vec<ParseWarning>,
    progress_every: usize,
}

impl ParserState {
    pub fn new(config: &ParserConfig) -> Self {
        Self {
            unit: Unit::default(),
            declared_count: config.default_declared_count,
            samples: Vec::new(),
            warnings: Vec::new(),
            progress_every: config.progress_every,
        }
    }

    pub fn accepted(&self) -> usize {
        self.samples.len()
    }

    pub fn declared_count(&self) -> usize {
        self.declared_count
    }

    /// Consume one line. Header lines never stop the parse; any other line
    /// stops it once the declared count has been reached.
    pub fn advance(mut self, line_number: usize, raw: &str) -> Result<(Self, Flow), RadonError> {
        let line = raw.trim();
        match classify_line(line) {
            LineKind::Unit(label) => {
                self.unit = Unit::parse(label);
                info!("Unit detected: {}", self.unit);
                return Ok((self, Flow::Continue));
            }
            LineKind::DeclaredCount => {
                self.declared_count = line
                    .split_whitespace()
                    .last()
                    .and_then(|token| token.parse().ok())
                    .ok_or_else(|| RadonError::InvalidDeclaredCount {
                        line_number,
                        line: line.to_string(),
                    })?;
                info!("Total data points set to: {}", self.declared_count);
                return Ok((self, Flow::Continue));
            }
            LineKind::Data { ordinal, rest }
                if (1..=self.declared_count).contains(&ordinal)
                    && self.samples.len() < self.declared_count =>
            {
                match parse_value(rest) {
                    Ok(value) => {
                        self.samples.push(value);
                        if self.progress_every > 0 && self.samples.len() % self.progress_every == 0
                        {
                            debug!("Parsed {} values...", self.samples.len());
                        }
                    }
                    Err(reason) => {
                        let warning = ParseWarning::UnparseableValue {
                            line_number,
                            line: line.to_string(),
                            reason,
                        };
                        warn!("{}", warning);
                        self.warnings.push(warning);
                    }
                }
            }
            LineKind::Data { .. } | LineKind::Other => {}
        }

        if self.samples.len() >= self.declared_count {
            info!("Loaded {} data points.", self.samples.len());
            return Ok((self, Flow::Stop));
        }
        Ok((self, Flow::Continue))
    }

    pub fn finish(mut self) -> ParsedRecords {
        if self.samples.len() != self.declared_count {
            let warning = ParseWarning::CountMismatch {
                declared: self.declared_count,
                parsed: self.samples.len(),
            };
            warn!("{}", warning);
            self.warnings.push(warning);
        }
        ParsedRecords {
            unit: self.unit,
            declared_count: self.declared_count,
            samples: self.samples,
            warnings: self.warnings,
        }
    }
}

/// Stream an export line by line. Read and decode failures are fatal; bad data
/// lines are recorded as warnings and skipped.
pub fn parse_records<R: BufRead>(
    reader: R,
    config: &ParserConfig,
) -> Result<ParsedRecords, RadonError> {
    let mut state = ParserState::new(config);
    for (idx, line) in reader.lines().enumerate() {
        let line = line.map_err(read_error)?;
        let (next, flow) = state.advance(idx + 1, &line)?;
        state = next;
        if flow == Flow::Stop {
            break;
        }
    }
    Ok(state.finish())
}

fn read_error(source: io::Error) -> RadonError {
    RadonError::Read {
        path: PathBuf::from("<input>"),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn parse(text: &str) -> ParsedRecords {
        parse_records(Cursor::new(text), &ParserConfig::default()).unwrap()
    }

    #[test]
    fn test_unit_and_bad_value_example() {
        let records = parse("Unit: pCi/L\nData No: 3\n1) 1.5 pCi/L\n2) bad_value\n3) 5.0 pCi/L\n");
        assert_eq!(records.unit, Unit::PciPerL);
        assert_eq!(records.declared_count, 3);
        assert_eq!(records.samples, vec![1.5, 5.0]);
        assert_eq!(records.warnings.len(), 2);
        assert!(matches!(
            records.warnings[0],
            ParseWarning::UnparseableValue { line_number: 4, .. }
        ));
        assert_eq!(
            records.warnings[1],
            ParseWarning::CountMismatch {
                declared: 3,
                parsed: 2
            }
        );
    }

    #[test]
    fn test_defaults_without_headers() {
        let records = parse("1) 12\n2) 14\n");
        assert_eq!(records.unit, Unit::BqPerM3);
        assert_eq!(records.declared_count, DEFAULT_DECLARED_COUNT);
        assert_eq!(records.samples, vec![12.0, 14.0]);
        assert!(matches!(
            records.warnings.as_slice(),
            [ParseWarning::CountMismatch { parsed: 2, .. }]
        ));
    }

    #[test]
    fn test_stops_at_declared_count() {
        let records = parse("Data No: 2\n1) 10\n2) 20\n3) 30\nUnit: pCi/L\n");
        assert_eq!(records.samples, vec![10.0, 20.0]);
        // the parse stopped before the late unit line
        assert_eq!(records.unit, Unit::BqPerM3);
        assert!(records.warnings.is_empty());
    }

    #[test]
    fn test_ordinals_outside_declared_range_are_ignored() {
        let records = parse("Data No: 2\n5) 99\n01) 7\n1) 10\n2) 20\n");
        assert_eq!(records.samples, vec![10.0, 20.0]);
    }

    #[test]
    fn test_redeclared_count_governs_rest() {
        let records = parse("Data No: 1\nData No: 3\n1) 1\n2) 2\n3) 3\n4) 4\n");
        assert_eq!(records.declared_count, 3);
        assert_eq!(records.samples, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_unrelated_lines_are_ignored_silently() {
        let records = parse(
            "RadonEye RD200\nS/N: IE08RE000855\nData No: 2\n\n  1)   33.5 Bq/m3  \nfoo) 1\n2) 40\n",
        );
        assert_eq!(records.samples, vec![33.5, 40.0]);
        assert!(records.warnings.is_empty());
    }

    #[test]
    fn test_missing_and_non_finite_values_warn() {
        let records = parse("Data No: 3\n1)\n2) NaN\n3) 4.5\n");
        assert_eq!(records.samples, vec![4.5]);
        let skipped = records
            .warnings
            .iter()
            .filter(|w| matches!(w, ParseWarning::UnparseableValue { .. }))
            .count();
        assert_eq!(skipped, 2);
    }

    #[test]
    fn test_malformed_declared_count_is_fatal() {
        let err = parse_records(Cursor::new("Data No: lots\n"), &ParserConfig::default())
            .unwrap_err();
        assert!(matches!(
            err,
            RadonError::InvalidDeclaredCount { line_number: 1, .. }
        ));
    }

    #[test]
    fn test_invalid_utf8_is_fatal() {
        let bytes: &[u8] = b"1) 10\n2) \xff\xfe\n";
        let err = parse_records(Cursor::new(bytes), &ParserConfig::default()).unwrap_err();
        assert!(matches!(err, RadonError::Read { .. }));
    }

    #[test]
    fn test_state_threads_through_steps() {
        let state = ParserState::new(&ParserConfig::default());
        let (state, flow) = state.advance(1, "Data No: 1").unwrap();
        assert_eq!(flow, Flow::Continue);
        assert_eq!(state.declared_count(), 1);
        let (state, flow) = state.advance(2, "1) 8.25").unwrap();
        assert_eq!(flow, Flow::Stop);
        assert_eq!(state.accepted(), 1);
        assert!(state.finish().warnings.is_empty());
    }

    #[test]
    fn test_warning_display() {
        let warning = ParseWarning::CountMismatch {
            declared: 4391,
            parsed: 10,
        };
        assert_eq!(
            warning.to_string(),
            "expected 4391 data points, found 10; check file format"
        );
    }
}
