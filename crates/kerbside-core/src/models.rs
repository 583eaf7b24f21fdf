//! Core data models for parking bays.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::RecordError;
use crate::spatial::is_valid_coordinate;

const NAIVE_TIMESTAMP_FORMATS: [&str; 3] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
];

/// Occupancy status reported by an in-ground bay sensor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BayStatus {
    Occupied,
    Unoccupied,
    #[default]
    Unknown,
}

impl BayStatus {
    /// Map a feed `status_description` onto a status.
    ///
    /// The sensor feed reports a parked car as "Present"; older exports use "Occupied".
    pub fn from_description(description: &str) -> Self {
        match description.trim().to_ascii_lowercase().as_str() {
            "present" | "occupied" => Self::Occupied,
            "unoccupied" => Self::Unoccupied,
            _ => Self::Unknown,
        }
    }
}

/// Status filter accepted by proximity and bounds queries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusFilter {
    #[default]
    All,
    Available,
    Occupied,
}

impl StatusFilter {
    /// Parse a filter name. Unrecognized names return `None`.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "all" => Some(Self::All),
            "available" | "unoccupied" => Some(Self::Available),
            "occupied" | "present" => Some(Self::Occupied),
            _ => None,
        }
    }

    pub fn matches(self, status: BayStatus) -> bool {
        match self {
            Self::All => true,
            Self::Available => status == BayStatus::Unoccupied,
            Self::Occupied => status == BayStatus::Occupied,
        }
    }
}

/// A single parking bay as held in a published snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParkingPoint {
    /// Kerbside (bay) id
    pub id: String,
    pub lat: f64,
    pub lng: f64,
    pub status: BayStatus,
    /// Pay-stay zone number
    #[serde(default)]
    pub zone: Option<String>,
    /// Road segment description
    #[serde(default)]
    pub street: Option<String>,
    /// Assigned at refresh time by the boundary matcher
    #[serde(default)]
    pub suburb: Option<String>,
    #[serde(default)]
    pub postcode: Option<String>,
    #[serde(default)]
    pub status_timestamp: Option<DateTime<Utc>>,
    pub last_updated: DateTime<Utc>,
}

impl ParkingPoint {
    /// Create a point with only required fields.
    pub fn new(id: impl Into<String>, lat: f64, lng: f64, status: BayStatus) -> Self {
        Self {
            id: id.into(),
            lat,
            lng,
            status,
            zone: None,
            street: None,
            suburb: None,
            postcode: None,
            status_timestamp: None,
            last_updated: Utc::now(),
        }
    }

    pub fn with_zone(mut self, zone: impl Into<String>) -> Self {
        self.zone = Some(zone.into());
        self
    }

    pub fn with_street(mut self, street: impl Into<String>) -> Self {
        self.street = Some(street.into());
        self
    }

    /// Validate an untrusted feed record.
    ///
    /// `received_at` stands in for `last_updated` when the feed omits it.
    pub fn from_raw(raw: &RawBayRecord, received_at: DateTime<Utc>) -> Result<Self, RecordError> {
        let id = raw
            .kerbsideid
            .as_ref()
            .and_then(value_as_label)
            .ok_or(RecordError::MissingId)?;

        let (lat, lng) = raw
            .location
            .as_ref()
            .and_then(|location| {
                let lat = location.lat.as_ref().and_then(value_as_f64)?;
                let lng = location.lon.as_ref().and_then(value_as_f64)?;
                Some((lat, lng))
            })
            .ok_or_else(|| RecordError::MissingLocation { id: id.clone() })?;

        if !is_valid_coordinate(lat, lng) {
            return Err(RecordError::InvalidCoordinate { id, lat, lng });
        }

        let status = raw
            .status_description
            .as_deref()
            .map(BayStatus::from_description)
            .unwrap_or_default();

        Ok(Self {
            id,
            lat,
            lng,
            status,
            zone: raw.zone_number.as_ref().and_then(value_as_label),
            street: raw
                .road_segment_description
                .as_deref()
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string),
            suburb: None,
            postcode: None,
            status_timestamp: raw.status_timestamp.as_deref().and_then(parse_timestamp),
            last_updated: raw
                .lastupdated
                .as_deref()
                .and_then(parse_timestamp)
                .unwrap_or(received_at),
        })
    }
}

/// Location object as delivered by the sensor feed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawLocation {
    #[serde(default, alias = "latitude")]
    pub lat: Option<Value>,
    #[serde(default, alias = "lng", alias = "longitude")]
    pub lon: Option<Value>,
}

/// Untrusted parking sensor record; every field is optional until validated.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawBayRecord {
    #[serde(default, alias = "kerbside_id")]
    pub kerbsideid: Option<Value>,
    #[serde(default)]
    pub zone_number: Option<Value>,
    #[serde(default)]
    pub status_description: Option<String>,
    #[serde(default)]
    pub status_timestamp: Option<String>,
    #[serde(default, alias = "last_updated")]
    pub lastupdated: Option<String>,
    #[serde(default)]
    pub location: Option<RawLocation>,
    #[serde(default)]
    pub road_segment_description: Option<String>,
}

impl RawBayRecord {
    /// Convenience constructor used by tests and file fixtures.
    pub fn new(id: impl Into<String>, lat: f64, lng: f64, status: &str) -> Self {
        Self {
            kerbsideid: Some(Value::String(id.into())),
            status_description: Some(status.to_string()),
            location: Some(RawLocation {
                lat: Some(Value::from(lat)),
                lon: Some(Value::from(lng)),
            }),
            ..Self::default()
        }
    }
}

/// Records from one fetch, plus the number of payload entries that were not
/// record-shaped at all.
#[derive(Debug, Clone, Default)]
pub struct RecordBatch {
    pub records: Vec<RawBayRecord>,
    pub rejected: usize,
}

impl RecordBatch {
    pub fn new(records: Vec<RawBayRecord>, rejected: usize) -> Self {
        Self { records, rejected }
    }

    /// Entries seen upstream, decodable or not.
    pub fn received(&self) -> usize {
        self.records.len() + self.rejected
    }

    pub fn is_empty(&self) -> bool {
        self.received() == 0
    }

    /// Append another page.
    pub fn extend(&mut self, other: RecordBatch) {
        self.records.extend(other.records);
        self.rejected += other.rejected;
    }
}

impl From<Vec<RawBayRecord>> for RecordBatch {
    fn from(records: Vec<RawBayRecord>) -> Self {
        Self::new(records, 0)
    }
}

/// Parse feed timestamps: RFC 3339 first, then common naive formats read as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    NAIVE_TIMESTAMP_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|naive| naive.and_utc())
}

/// Render an id-like JSON value (number or string) as a label.
fn value_as_label(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => {
            if let Some(int) = n.as_i64() {
                Some(int.to_string())
            } else if let Some(uint) = n.as_u64() {
                Some(uint.to_string())
            } else {
                n.as_f64().filter(|f| f.is_finite()).map(|f| {
                    if f.fract() == 0.0 {
                        format!("{}", f as i64)
                    } else {
                        f.to_string()
                    }
                })
            }
        }
        _ => None,
    }
}

fn value_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|f| f.is_finite())
}
