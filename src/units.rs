use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const MS_TO_KMPH: f64 = 3.6;
const MS_TO_MPH: f64 = 2.236_936_292;
const M_PER_MILE: f64 = 1609.344;

/// The measurement units used for every value the simulation accepts or reports.
///
/// Internally everything is kept in metres and metres per second.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Units {
    /// Kilometres and km/h.
    #[default]
    Metric,
    /// Miles and mph.
    Imperial,
    /// Kilometres and mph.
    UK,
}

impl Units {
    /// Converts a speed in m/s into these units.
    pub fn speed_from_ms(self, speed: f64) -> f64 {
        match self {
            Units::Metric => speed * MS_TO_KMPH,
            Units::Imperial | Units::UK => speed * MS_TO_MPH,
        }
    }

    /// Converts a speed in these units into m/s.
    pub fn speed_to_ms(self, speed: f64) -> f64 {
        match self {
            Units::Metric => speed / MS_TO_KMPH,
            Units::Imperial | Units::UK => speed / MS_TO_MPH,
        }
    }

    /// Converts a distance in m into these units.
    pub fn dist_from_m(self, dist: f64) -> f64 {
        match self {
            Units::Metric | Units::UK => dist / 1000.0,
            Units::Imperial => dist / M_PER_MILE,
        }
    }

    pub fn speed_label(self) -> &'static str {
        match self {
            Units::Metric => "km/h",
            Units::Imperial | Units::UK => "mph",
        }
    }

    pub fn dist_label(self) -> &'static str {
        match self {
            Units::Metric | Units::UK => "km",
            Units::Imperial => "mi",
        }
    }
}

impl FromStr for Units {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "metric" => Ok(Units::Metric),
            "imperial" => Ok(Units::Imperial),
            "uk" => Ok(Units::UK),
            _ => Err(crate::Error::Config(format!("unknown units '{}'", s))),
        }
    }
}

impl fmt::Display for Units {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Units::Metric => "metric",
            Units::Imperial => "imperial",
            Units::UK => "uk",
        };
        write!(f, "{} ({}, {})", name, self.dist_label(), self.speed_label())
    }
}
