use serde::Serialize;

use crate::zones::{ThresholdTable, Zone};

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ZoneCount {
    pub zone: Zone,
    pub samples: usize,
}

/// Descriptive statistics over a parsed series. Each sample covers one hour,
/// so zone counts double as hours spent in each zone.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SeriesSummary {
    pub count: usize,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub mean: Option<f64>,
    pub zones: Vec<ZoneCount>,
}

pub fn summarize(samples: &[f64], table: &ThresholdTable) -> SeriesSummary {
    let mut zones: Vec<ZoneCount> = table
        .bands()
        .iter()
        .map(|band| ZoneCount {
            zone: band.zone,
            samples: 0,
        })
        .collect();

    let mut min: Option<f64> = None;
    let mut max: Option<f64> = None;
    let mut total = 0.0;
    for &value in samples {
        min = Some(min.map_or(value, |m| m.min(value)));
        max = Some(max.map_or(value, |m| m.max(value)));
        total += value;
        let zone = table.classify(value);
        if let Some(entry) = zones.iter_mut().find(|entry| entry.zone == zone) {
            entry.samples += 1;
        }
    }

    SeriesSummary {
        count: samples.len(),
        min,
        max,
        mean: if samples.is_empty() {
            None
        } else {
            Some(total / samples.len() as f64)
        },
        zones,
    }
}
