//! Error types for spatial queries and record ingestion.

use thiserror::Error;

/// Errors raised by caller-supplied query input.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SpatialError {
    #[error("invalid coordinate ({lat}, {lng}): latitude must be within [-90, 90] and longitude within [-180, 180]")]
    InvalidCoordinate { lat: f64, lng: f64 },

    /// Unparsable bounds or radius. Query paths treat this as "no filter".
    #[error("malformed filter: {0}")]
    MalformedFilter(String),
}

/// Reasons a single untrusted record is skipped during a batch build.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RecordError {
    #[error("record has no kerbside id")]
    MissingId,

    #[error("record {id} has no usable location")]
    MissingLocation { id: String },

    #[error("record {id} has out-of-range coordinate ({lat}, {lng})")]
    InvalidCoordinate { id: String, lat: f64, lng: f64 },

    #[error("boundary has no name")]
    MissingName,

    #[error("boundary {name} has malformed geometry: {reason}")]
    MalformedGeometry { name: String, reason: String },
}

impl RecordError {
    /// Stable label used when counting skipped records.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MissingId => "missing_id",
            Self::MissingLocation { .. } => "missing_location",
            Self::InvalidCoordinate { .. } => "invalid_coordinate",
            Self::MissingName => "missing_name",
            Self::MalformedGeometry { .. } => "malformed_geometry",
        }
    }
}
