//! Visible time range of the chart. Pan and zoom commands are pure transforms
//! on the `(start, end)` pair; the renderer only reads the result.

use chrono::{Duration, NaiveDateTime};
use serde::Serialize;

use crate::segments::{Segment, SeriesPoint};
use crate::RadonError;

const MICROS_PER_HOUR: f64 = 3_600_000_000.0;

/// Narrowest window reachable by zooming in.
pub const MIN_SPAN_HOURS: i64 = 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ViewWindow {
    start: NaiveDateTime,
    end: NaiveDateTime,
}

fn micros(duration: Duration) -> f64 {
    duration.num_microseconds().unwrap_or(i64::MAX) as f64
}

fn from_micros(us: f64) -> Duration {
    Duration::microseconds(us.round() as i64)
}

impl ViewWindow {
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Result<Self, RadonError> {
        if end <= start {
            return Err(RadonError::InvalidParameter(format!(
                "view window end {} must be after start {}",
                end, start
            )));
        }
        Ok(Self { start, end })
    }

    /// Window spanning the whole timeline. A single sample gets an hour-wide
    /// window centred on it.
    pub fn full(timeline: &[NaiveDateTime]) -> Option<Self> {
        let first = *timeline.first()?;
        let last = *timeline.last()?;
        if last > first {
            Some(Self {
                start: first,
                end: last,
            })
        } else {
            let half = Duration::minutes(30 * MIN_SPAN_HOURS);
            Some(Self {
                start: first - half,
                end: first + half,
            })
        }
    }

    pub fn start(&self) -> NaiveDateTime {
        self.start
    }

    pub fn end(&self) -> NaiveDateTime {
        self.end
    }

    pub fn span(&self) -> Duration {
        self.end - self.start
    }

    pub fn span_hours(&self) -> f64 {
        micros(self.span()) / MICROS_PER_HOUR
    }

    fn shifted(&self, start: Duration, end: Duration) -> Result<Self, RadonError> {
        let moved = self
            .start
            .checked_add_signed(start)
            .zip(self.end.checked_add_signed(end));
        match moved {
            Some((start, end)) => Ok(Self { start, end }),
            None => Err(RadonError::InvalidParameter(format!(
                "view window {} to {} moved out of the representable date range",
                self.start, self.end
            ))),
        }
    }

    fn rescale(self, scale: f64) -> Result<Self, RadonError> {
        let min_span = micros(Duration::hours(MIN_SPAN_HOURS));
        let span = micros(self.span());
        let new_span = (span * scale).max(min_span);
        let delta = (new_span - span) / 2.0;
        self.shifted(from_micros(-delta), from_micros(delta))
    }

    /// Shrink the span by `factor` around its centre. Factors of 1 or less
    /// leave the window unchanged.
    pub fn zoom_in(self, factor: f64) -> Result<Self, RadonError> {
        if factor.is_nan() || factor <= 1.0 {
            return Ok(self);
        }
        self.rescale(1.0 / factor)
    }

    pub fn zoom_out(self, factor: f64) -> Result<Self, RadonError> {
        if factor.is_nan() || factor <= 1.0 {
            return Ok(self);
        }
        self.rescale(factor)
    }

    /// Shift both bounds; negative hours move towards earlier data.
    pub fn pan(self, hours: f64) -> Result<Self, RadonError> {
        if !hours.is_finite() {
            return Err(RadonError::InvalidParameter(format!(
                "pan offset must be finite, got {}",
                hours
            )));
        }
        let shift = from_micros(hours * MICROS_PER_HOUR);
        self.shifted(shift, shift)
    }

    /// Keep the window inside `bounds`, preserving its span when it fits.
    pub fn clamp_to(self, bounds: &ViewWindow) -> Self {
        if self.span() >= bounds.span() {
            return *bounds;
        }
        if self.start < bounds.start {
            let shift = bounds.start - self.start;
            return Self {
                start: bounds.start,
                end: self.end + shift,
            };
        }
        if self.end > bounds.end {
            let shift = self.end - bounds.end;
            return Self {
                start: self.start - shift,
                end: bounds.end,
            };
        }
        self
    }

    pub fn contains(&self, time: NaiveDateTime) -> bool {
        self.start <= time && time <= self.end
    }

    /// Trim a segment to the window, interpolating values at the cut points.
    /// A line piece that only touches the window edge is dropped.
    pub fn clip(&self, segment: &Segment) -> Option<Segment> {
        let (a, b) = (segment.start, segment.end);
        if b.time < self.start || a.time > self.end {
            return None;
        }
        let span = micros(b.time - a.time);
        if span <= 0.0 {
            return Some(*segment);
        }
        let at = |time: NaiveDateTime| {
            let fraction = micros(time - a.time) / span;
            SeriesPoint {
                time,
                value: a.value + (b.value - a.value) * fraction,
            }
        };
        let start = if a.time < self.start { at(self.start) } else { a };
        let end = if b.time > self.end { at(self.end) } else { b };
        if start.time >= end.time {
            return None;
        }
        Some(Segment {
            start,
            end,
            zone: segment.zone,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zones::Zone;
    use chrono::NaiveDate;

    fn at(h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    fn window(a: u32, b: u32) -> ViewWindow {
        ViewWindow::new(at(a), at(b)).unwrap()
    }

    #[test]
    fn test_new_rejects_empty_window() {
        assert!(ViewWindow::new(at(5), at(5)).is_err());
        assert!(ViewWindow::new(at(6), at(5)).is_err());
    }

    #[test]
    fn test_full_window() {
        let timeline = [at(1), at(2), at(3)];
        assert_eq!(ViewWindow::full(&timeline), Some(window(1, 3)));
        assert!(ViewWindow::full(&[]).is_none());
        let single = ViewWindow::full(&[at(4)]).unwrap();
        assert!(single.contains(at(4)));
        assert_eq!(single.span(), Duration::hours(1));
    }

    #[test]
    fn test_zoom_in_and_out_around_centre() {
        let zoomed = window(0, 8).zoom_in(2.0).unwrap();
        assert_eq!(zoomed, window(2, 6));
        assert_eq!(zoomed.zoom_out(2.0).unwrap(), window(0, 8));
        assert_eq!(window(0, 8).zoom_in(1.0).unwrap(), window(0, 8));
    }

    #[test]
    fn test_zoom_in_stops_at_minimum_span() {
        let zoomed = window(0, 4).zoom_in(100.0).unwrap();
        assert_eq!(zoomed.span(), Duration::hours(MIN_SPAN_HOURS));
        assert!(zoomed.contains(at(2)));
    }

    #[test]
    fn test_pan_and_clamp() {
        let bounds = window(0, 10);
        assert_eq!(window(2, 6).pan(3.0).unwrap(), window(5, 9));
        assert_eq!(window(2, 6).pan(6.0).unwrap().clamp_to(&bounds), window(6, 10));
        assert_eq!(window(2, 6).pan(-4.0).unwrap().clamp_to(&bounds), window(0, 4));
        assert_eq!(window(0, 10).zoom_out(3.0).unwrap().clamp_to(&bounds), bounds);
        assert!((window(2, 6).span_hours() - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_clip_segment() {
        let segment = Segment {
            start: SeriesPoint {
                time: at(1),
                value: 10.0,
            },
            end: SeriesPoint {
                time: at(5),
                value: 50.0,
            },
            zone: Zone::Green,
        };
        let clipped = window(2, 3).clip(&segment).unwrap();
        assert_eq!(clipped.start.time, at(2));
        assert!((clipped.start.value - 20.0).abs() < 1e-9);
        assert_eq!(clipped.end.time, at(3));
        assert!((clipped.end.value - 30.0).abs() < 1e-9);
        assert_eq!(clipped.zone, Zone::Green);

        assert_eq!(window(0, 8).clip(&segment), Some(segment));
        assert!(window(6, 8).clip(&segment).is_none());
    }

    #[test]
    fn test_pan_out_of_range_is_an_error() {
        let view = window(2, 6);
        for hours in [3.0e9, -3.0e9, f64::INFINITY, f64::NAN] {
            match view.pan(hours) {
                Err(RadonError::InvalidParameter(_)) => {}
                other => panic!("pan({hours}) gave {other:?}"),
            }
        }
        assert!(view.zoom_out(1.0e12).is_err());
    }

    #[test]
    fn test_clip_drops_segment_touching_window_edge() {
        let segment = Segment {
            start: SeriesPoint {
                time: at(6),
                value: 70.0,
            },
            end: SeriesPoint {
                time: at(7),
                value: 80.0,
            },
            zone: Zone::Green,
        };
        assert!(window(2, 6).clip(&segment).is_none());
        assert!(window(7, 9).clip(&segment).is_none());

        let point = Segment {
            start: segment.start,
            end: segment.start,
            zone: Zone::Green,
        };
        assert_eq!(window(2, 6).clip(&point), Some(point));
    }
}
