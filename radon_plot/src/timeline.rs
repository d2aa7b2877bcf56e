//! Export file names carry the device serial and the hour of the last sample,
//! e.g. `IE08RE000855_20240115120000.txt`. The device logs once per hour, so
//! the whole timeline is rebuilt backwards from that end hour.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::Serialize;

use crate::RadonError;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ExportName {
    pub serial_number: String,
    pub end_datetime: NaiveDateTime,
}

/// Extract serial number and end timestamp from an export path or file name.
pub fn parse_export_name(path: &str) -> Result<ExportName, RadonError> {
    let name = path.rsplit(['/', '\\']).next().unwrap_or(path);
    let invalid = |reason: String| RadonError::InvalidFileName {
        name: name.to_string(),
        reason,
    };

    let serial_number = name.split('_').next().unwrap_or(name).to_string();
    let last_component = name.rsplit('_').next().unwrap_or(name);

    let date_token = last_component
        .get(..8)
        .filter(|token| token.bytes().all(|b| b.is_ascii_digit()))
        .ok_or_else(|| invalid(format!("no YYYYMMDD date token in '{}'", last_component)))?;
    let date = parse_date_token(date_token)
        .ok_or_else(|| invalid(format!("'{}' is not a calendar date", date_token)))?;

    let hour_source = if name.contains(' ') {
        name.split_whitespace().last().unwrap_or("")
    } else {
        last_component.get(8..).unwrap_or("")
    };
    let hour = hour_source
        .get(..2)
        .filter(|token| token.bytes().all(|b| b.is_ascii_digit()))
        .and_then(|token| token.parse::<u32>().ok())
        .ok_or_else(|| invalid(format!("no two-digit hour in '{}'", hour_source)))?;
    let end_datetime = date
        .and_hms_opt(hour, 0, 0)
        .ok_or_else(|| invalid(format!("hour {} out of range", hour)))?;

    Ok(ExportName {
        serial_number,
        end_datetime,
    })
}

fn parse_date_token(token: &str) -> Option<NaiveDate> {
    let year = token.get(0..4)?.parse().ok()?;
    let month = token.get(4..6)?.parse().ok()?;
    let day = token.get(6..8)?.parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

/// One timestamp per sample, one hour apart, ending at `end`.
pub fn build_timeline(end: NaiveDateTime, count: usize) -> Vec<NaiveDateTime> {
    if count == 0 {
        return Vec::new();
    }
    let start = end - Duration::hours(count as i64 - 1);
    (0..count)
        .map(|i| start + Duration::hours(i as i64))
        .collect()
}
