use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::zones::{Boundary, ThresholdTable, Zone};

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct SeriesPoint {
    pub time: NaiveDateTime,
    pub value: f64,
}

/// A drawable line piece that lies entirely in one zone.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Segment {
    pub start: SeriesPoint,
    pub end: SeriesPoint,
    pub zone: Zone,
}

impl Segment {
    /// The trailing sample is emitted as a zero-length segment.
    pub fn is_point(&self) -> bool {
        self.start == self.end
    }
}

/// How many threshold crossings are resolved inside one sample pair.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum CrossingPolicy {
    /// Split at every crossing so each piece carries its own zone colour.
    All,
    /// Split only at the first crossing found in ascending threshold order and
    /// colour the remainder by the zone of the pair's end value.
    FirstOnly,
}

impl Default for CrossingPolicy {
    fn default() -> Self {
        CrossingPolicy::All
    }
}

#[derive(Clone, Copy, Debug)]
struct Crossing {
    fraction: f64,
    point: SeriesPoint,
    zone_after: Zone,
}

fn interpolate_time(t0: NaiveDateTime, t1: NaiveDateTime, fraction: f64) -> NaiveDateTime {
    let span_us = (t1 - t0).num_microseconds().unwrap_or(0) as f64;
    t0 + Duration::microseconds((span_us * fraction).round() as i64)
}

/// Crossing strictly inside the pair, if the boundary lies between the endpoints.
fn crossing_at(a: SeriesPoint, b: SeriesPoint, boundary: &Boundary) -> Option<Crossing> {
    let fraction = (boundary.value - a.value) / (b.value - a.value);
    if fraction <= 0.0 || fraction >= 1.0 {
        return None;
    }
    Some(Crossing {
        fraction,
        point: SeriesPoint {
            time: interpolate_time(a.time, b.time, fraction),
            value: boundary.value,
        },
        zone_after: if b.value > a.value {
            boundary.above
        } else {
            boundary.below
        },
    })
}

/// Split one sample pair into single-zone segments, appending them to `out`.
pub fn split_pair(
    a: SeriesPoint,
    b: SeriesPoint,
    table: &ThresholdTable,
    policy: CrossingPolicy,
    out: &mut Vec<Segment>,
) {
    let start_zone = table.classify(a.value);
    if a.value == b.value {
        out.push(Segment {
            start: a,
            end: b,
            zone: start_zone,
        });
        return;
    }

    let boundaries = table.boundaries();
    match policy {
        CrossingPolicy::All => {
            let mut crossings: Vec<Crossing> = boundaries
                .iter()
                .filter_map(|boundary| crossing_at(a, b, boundary))
                .collect();
            crossings.sort_by(|x, y| x.fraction.total_cmp(&y.fraction));

            let mut cursor = a;
            let mut zone = start_zone;
            for crossing in crossings {
                out.push(Segment {
                    start: cursor,
                    end: crossing.point,
                    zone,
                });
                cursor = crossing.point;
                zone = crossing.zone_after;
            }
            out.push(Segment {
                start: cursor,
                end: b,
                zone,
            });
        }
        CrossingPolicy::FirstOnly => {
            match boundaries.iter().find_map(|boundary| crossing_at(a, b, boundary)) {
                Some(crossing) => {
                    out.push(Segment {
                        start: a,
                        end: crossing.point,
                        zone: start_zone,
                    });
                    out.push(Segment {
                        start: crossing.point,
                        end: b,
                        zone: table.classify(b.value),
                    });
                }
                None => out.push(Segment {
                    start: a,
                    end: b,
                    zone: start_zone,
                }),
            }
        }
    }
}

/// Segment a whole series. Every consecutive pair is split at threshold
/// crossings and the final sample is appended as a point segment.
pub fn segment_series(
    timeline: &[NaiveDateTime],
    samples: &[f64],
    table: &ThresholdTable,
    policy: CrossingPolicy,
) -> Vec<Segment> {
    debug_assert_eq!(timeline.len(), samples.len());
    let points: Vec<SeriesPoint> = timeline
        .iter()
        .zip(samples.iter())
        .map(|(&time, &value)| SeriesPoint { time, value })
        .collect();

    let mut out = Vec::with_capacity(points.len() + points.len() / 4);
    for pair in points.windows(2) {
        split_pair(pair[0], pair[1], table, policy, &mut out);
    }
    if let Some(&last) = points.last() {
        out.push(Segment {
            start: last,
            end: last,
            zone: table.classify(last.value),
        });
    }
    out
}
