//! Alert records
//!
//! Once in JSON mode, HamAlert sends one JSON object per line. Every field
//! is optional: spots from different sources carry different subsets, and
//! the replay of recent spots is no different from live ones. Unknown
//! fields are ignored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};

/// Placeholder shown when a spot carries no entity.
pub const UNKNOWN: &str = "Unknown";

/// Source name of park activations.
pub const SOURCE_POTA: &str = "pota";
/// Source name of summit activations.
pub const SOURCE_SOTA: &str = "sotawatch";
/// Source name of DX cluster spots.
pub const SOURCE_CLUSTER: &str = "cluster";

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("expected a JSON object")]
    NotAnObject,
}

/// One decoded alert.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    /// Bare time of day, `HH:MM` or `HH:MM:SS`, UTC.
    pub time: Option<String>,
    pub full_callsign: Option<String>,
    pub callsign: Option<String>,
    /// Frequency in Hz. On the wire either a number (Hz) or a string (MHz).
    #[serde(default, deserialize_with = "deserialize_frequency")]
    pub frequency: Option<f64>,
    pub mode: Option<String>,
    pub source: Option<String>,
    pub band: Option<String>,
    pub entity: Option<String>,
    pub spotter: Option<String>,
    pub comment: Option<String>,
    pub summit_name: Option<String>,
    pub summit_ref: Option<String>,
    pub summit_points: Option<serde_json::Value>,
    pub wwff_name: Option<String>,
    pub wwff_ref: Option<String>,
    pub wwff_division: Option<String>,
    pub dxcc: Option<serde_json::Value>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum WireFrequency {
    Hz(f64),
    Mhz(String),
}

fn deserialize_frequency<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
    Ok(match Option::<WireFrequency>::deserialize(d)? {
        Some(WireFrequency::Hz(hz)) => Some(hz),
        // An unparsable string is treated like an absent frequency rather
        // than poisoning the whole record.
        Some(WireFrequency::Mhz(mhz)) => mhz.trim().parse::<f64>().ok().map(|f| f * 1e6),
        None => None,
    })
}

impl Alert {
    /// Decodes a single line of the JSON stream.
    pub fn decode(line: &str) -> Result<Alert, DecodeError> {
        let value: serde_json::Value = serde_json::from_str(line)?;
        if !value.is_object() {
            return Err(DecodeError::NotAnObject);
        }
        Ok(serde_json::from_value(value)?)
    }

    /// Callsign to display, preferring the full callsign with prefixes/suffixes.
    pub fn display_callsign(&self) -> &str {
        self.full_callsign
            .as_deref()
            .or(self.callsign.as_deref())
            .unwrap_or(UNKNOWN)
    }

    /// Frequency rounded to whole Hz, if known and sensible.
    pub fn frequency_hz(&self) -> Option<u64> {
        match self.frequency {
            Some(f) if f.is_finite() && f > 0.0 => Some(f.round() as u64),
            _ => None,
        }
    }

    /// Summit or park reference, for the sources that have one.
    pub fn reference(&self) -> Option<&str> {
        match self.source.as_deref() {
            Some(SOURCE_SOTA) => self.summit_ref.as_deref(),
            Some(SOURCE_POTA) => self.wwff_ref.as_deref(),
            _ => None,
        }
    }

    /// Entity, followed by the summit or park name when there is one.
    pub fn location(&self) -> String {
        let entity = self.entity.as_deref().unwrap_or(UNKNOWN);
        let site = match self.source.as_deref() {
            Some(SOURCE_SOTA) => self.summit_name.as_deref(),
            Some(SOURCE_POTA) => self.wwff_name.as_deref(),
            _ => None,
        };
        match site {
            Some(site) => format!("{}: {}", entity, site),
            None => entity.to_string(),
        }
    }
}

/// An accepted alert on its way to the presentation thread.
#[derive(Debug, Clone, PartialEq)]
pub struct Spot {
    pub alert: Alert,
    /// Full timestamp resolved from the bare spot time, if it could be parsed.
    pub timestamp: Option<DateTime<Utc>>,
}

impl Spot {
    pub fn new(alert: Alert, timestamp: Option<DateTime<Utc>>) -> Spot {
        Spot { alert, timestamp }
    }

    /// Time column: the resolved time, else the raw string as received.
    pub fn display_time(&self) -> String {
        match (self.timestamp, self.alert.time.as_deref()) {
            (Some(ts), _) => ts.format("%H:%M:%S").to_string(),
            (None, Some(raw)) => raw.to_string(),
            (None, None) => UNKNOWN.to_string(),
        }
    }
}
