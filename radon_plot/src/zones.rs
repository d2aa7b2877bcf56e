use std::fmt;

use serde::{Deserialize, Serialize};

/// Concentration unit declared by the export's `Unit:` line.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum Unit {
    BqPerM3,
    PciPerL,
    Unknown(String),
}

impl Unit {
    pub fn parse(label: &str) -> Self {
        match label.trim() {
            "Bq/m3" => Unit::BqPerM3,
            "pCi/L" => Unit::PciPerL,
            other => Unit::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Unit::BqPerM3 => "Bq/m3",
            Unit::PciPerL => "pCi/L",
            Unit::Unknown(label) => label,
        }
    }
}

impl Default for Unit {
    fn default() -> Self {
        Unit::BqPerM3
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Unit> for String {
    fn from(unit: Unit) -> Self {
        unit.as_str().to_string()
    }
}

impl From<String> for Unit {
    fn from(label: String) -> Self {
        Unit::parse(&label)
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Zone {
    Green,
    Amber,
    Red,
    /// Single zone used when the unit has no known thresholds.
    Unclassified,
}

impl Zone {
    pub fn rgb(self) -> (u8, u8, u8) {
        match self {
            Zone::Green => (0, 128, 0),
            Zone::Amber => (255, 165, 0),
            Zone::Red => (255, 0, 0),
            Zone::Unclassified => (0, 0, 255),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Zone::Green => "green",
            Zone::Amber => "amber",
            Zone::Red => "red",
            Zone::Unclassified => "blue",
        }
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Half-open interval `[low, high)` mapped to a zone.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct ZoneBand {
    pub low: f64,
    pub high: f64,
    pub zone: Zone,
}

impl ZoneBand {
    pub fn contains(&self, value: f64) -> bool {
        self.low <= value && value < self.high
    }
}

/// A boundary between two adjacent bands.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Boundary {
    pub value: f64,
    pub below: Zone,
    pub above: Zone,
}

/// Contiguous bands covering `[0, +inf)`, sorted by `low`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ThresholdTable {
    bands: Vec<ZoneBand>,
}

impl ThresholdTable {
    pub fn for_unit(unit: &Unit) -> Self {
        let bands = match unit {
            Unit::BqPerM3 => three_bands(100.0, 200.0),
            Unit::PciPerL => three_bands(2.7, 4.0),
            Unit::Unknown(_) => vec![ZoneBand {
                low: 0.0,
                high: f64::INFINITY,
                zone: Zone::Unclassified,
            }],
        };
        Self { bands }
    }

    pub fn bands(&self) -> &[ZoneBand] {
        &self.bands
    }

    /// Threshold values in ascending order.
    pub fn thresholds(&self) -> Vec<f64> {
        self.bands.iter().skip(1).map(|b| b.low).collect()
    }

    pub fn boundaries(&self) -> Vec<Boundary> {
        self.bands
            .windows(2)
            .map(|pair| Boundary {
                value: pair[1].low,
                below: pair[0].zone,
                above: pair[1].zone,
            })
            .collect()
    }

    /// Band holding `value`. Values under the first band (negative readings) and
    /// NaN fall into the first band so classification stays total.
    pub fn band_for(&self, value: f64) -> &ZoneBand {
        let idx = self
            .bands
            .iter()
            .rposition(|band| value >= band.low)
            .unwrap_or(0);
        &self.bands[idx]
    }

    pub fn classify(&self, value: f64) -> Zone {
        self.band_for(value).zone
    }
}

fn three_bands(amber_from: f64, red_from: f64) -> Vec<ZoneBand> {
    vec![
        ZoneBand {
            low: 0.0,
            high: amber_from,
            zone: Zone::Green,
        },
        ZoneBand {
            low: amber_from,
            high: red_from,
            zone: Zone::Amber,
        },
        ZoneBand {
            low: red_from,
            high: f64::INFINITY,
            zone: Zone::Red,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_parse() {
        assert_eq!(Unit::parse(" Bq/m3 "), Unit::BqPerM3);
        assert_eq!(Unit::parse("pCi/L"), Unit::PciPerL);
        assert_eq!(Unit::parse("ppm"), Unit::Unknown("ppm".into()));
        assert_eq!(Unit::default(), Unit::BqPerM3);
    }

    #[test]
    fn test_bq_classification_edges() {
        let table = ThresholdTable::for_unit(&Unit::BqPerM3);
        assert_eq!(table.classify(0.0), Zone::Green);
        assert_eq!(table.classify(99.999), Zone::Green);
        assert_eq!(table.classify(100.0), Zone::Amber);
        assert_eq!(table.classify(199.9), Zone::Amber);
        assert_eq!(table.classify(200.0), Zone::Red);
        assert_eq!(table.classify(f64::INFINITY), Zone::Red);
        assert_eq!(table.classify(-3.0), Zone::Green);
        assert_eq!(table.thresholds(), vec![100.0, 200.0]);
    }

    #[test]
    fn test_pci_classification_edges() {
        let table = ThresholdTable::for_unit(&Unit::PciPerL);
        assert_eq!(table.classify(2.69), Zone::Green);
        assert_eq!(table.classify(2.7), Zone::Amber);
        assert_eq!(table.classify(4.0), Zone::Red);
    }

    #[test]
    fn test_unknown_unit_is_single_band() {
        let table = ThresholdTable::for_unit(&Unit::Unknown("cpm".into()));
        assert!(table.thresholds().is_empty());
        assert!(table.boundaries().is_empty());
        assert_eq!(table.classify(1e6), Zone::Unclassified);
    }

    #[test]
    fn test_bands_cover_without_overlap() {
        for unit in [Unit::BqPerM3, Unit::PciPerL, Unit::Unknown("x".into())] {
            let table = ThresholdTable::for_unit(&unit);
            for value in [0.0, 0.5, 2.7, 3.99, 4.0, 99.0, 100.0, 150.0, 200.0, 1e9] {
                let hits = table.bands().iter().filter(|b| b.contains(value)).count();
                assert_eq!(hits, 1, "{unit} value {value}");
                assert!(table.band_for(value).contains(value));
            }
        }
    }
}
