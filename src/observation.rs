use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Direction reported when the vane voltage matches no known heading.
pub const UNKNOWN_DIRECTION: f64 = -1.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AtmosphericReading {
    /// °C
    pub temperature: f64,
    /// %RH
    pub humidity: f64,
    /// hPa
    pub pressure: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WindReading {
    /// km/h, averaged over the windows folded since the last read.
    pub speed: f64,
    /// Degrees, or [`UNKNOWN_DIRECTION`].
    pub direction: f64,
    /// km/h, highest window speed since the last read.
    pub gust: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RainReading {
    /// mm
    pub rainfall: f64,
}

/// One row of the observation log. Serialises to the wire shape expected by
/// the collector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Observation {
    #[serde(with = "chrono::serde::ts_seconds")]
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "atmospherics")]
    pub atmospheric: AtmosphericReading,
    pub wind: WindReading,
    pub rain: RainReading,
    pub interval_seconds: u64,
    #[serde(skip)]
    pub published: bool,
}

/// An observation as read back from the store, together with its row id.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredObservation {
    pub id: i64,
    pub observation: Observation,
}
