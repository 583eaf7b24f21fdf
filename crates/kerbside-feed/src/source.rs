//! Source traits shared by every feed.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use kerbside_core::{Boundary, RawBayRecord, RecordBatch};
use serde_json::Value;
use thiserror::Error;

/// Failure to obtain data from an upstream source.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned {status}: {body}")]
    Status { url: String, status: u16, body: String },

    #[error("fetch timed out after {0:?}")]
    Timeout(Duration),

    #[error("failed to decode {what}: {reason}")]
    Decode { what: String, reason: String },

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no parking data received")]
    Empty,
}

/// Supplier of raw parking bay records. Records are untrusted.
#[async_trait]
pub trait BaySource: Send + Sync {
    /// Short label for logs.
    fn name(&self) -> &str;

    /// Decoded records plus the count of entries that were not record-shaped.
    async fn fetch(&self) -> Result<RecordBatch, FeedError>;
}

/// Supplier of suburb boundaries.
#[async_trait]
pub trait BoundarySource: Send + Sync {
    fn name(&self) -> &str;

    async fn load(&self) -> Result<Vec<Boundary>, FeedError>;
}

/// Fixed in-memory records.
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    records: Vec<RawBayRecord>,
}

impl StaticSource {
    pub fn new(records: Vec<RawBayRecord>) -> Self {
        Self { records }
    }
}

#[async_trait]
impl BaySource for StaticSource {
    fn name(&self) -> &str {
        "static"
    }

    async fn fetch(&self) -> Result<RecordBatch, FeedError> {
        Ok(RecordBatch::from(self.records.clone()))
    }
}

/// Fixed in-memory boundaries. Empty when no boundary file is configured.
#[derive(Debug, Clone, Default)]
pub struct StaticBoundaries {
    boundaries: Vec<Boundary>,
}

impl StaticBoundaries {
    pub fn new(boundaries: Vec<Boundary>) -> Self {
        Self { boundaries }
    }
}

#[async_trait]
impl BoundarySource for StaticBoundaries {
    fn name(&self) -> &str {
        "static"
    }

    async fn load(&self) -> Result<Vec<Boundary>, FeedError> {
        Ok(self.boundaries.clone())
    }
}

/// Decode bay records from a JSON payload.
///
/// Accepts a bare array of records or an API response object with a
/// `results` array. Entries that are not record-shaped are dropped and
/// counted in [`RecordBatch::rejected`].
pub fn decode_records(payload: &Value) -> Result<RecordBatch, FeedError> {
    let entries = match payload {
        Value::Array(entries) => entries,
        Value::Object(_) => payload
            .get("results")
            .and_then(Value::as_array)
            .ok_or_else(|| FeedError::Decode {
                what: "bay records".to_string(),
                reason: "object has no results array".to_string(),
            })?,
        _ => {
            return Err(FeedError::Decode {
                what: "bay records".to_string(),
                reason: "expected an array or an object with results".to_string(),
            })
        }
    };

    let mut records = Vec::with_capacity(entries.len());
    let mut rejected = 0;
    for entry in entries {
        match serde_json::from_value::<RawBayRecord>(entry.clone()) {
            Ok(record) => records.push(record),
            Err(_) => rejected += 1,
        }
    }
    Ok(RecordBatch::new(records, rejected))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_api_results_object() {
        let payload = json!({
            "total_count": 2,
            "results": [
                {
                    "lastupdated": "2024-03-01T10:16:30+00:00",
                    "status_timestamp": "2024-03-01T10:15:00+00:00",
                    "zone_number": 7301,
                    "status_description": "Present",
                    "kerbsideid": 5837,
                    "location": { "lon": 144.9631, "lat": -37.8136 }
                },
                {
                    "status_description": "Unoccupied",
                    "kerbsideid": 5838,
                    "zone_number": null,
                    "location": { "lon": 144.9635, "lat": -37.8140 }
                }
            ]
        });
        let batch = decode_records(&payload).unwrap();
        assert_eq!(batch.records.len(), 2);
        assert_eq!(batch.rejected, 0);
        assert_eq!(batch.records[1].status_description.as_deref(), Some("Unoccupied"));
    }

    #[test]
    fn decodes_bare_array_and_counts_rejects() {
        let payload = json!([
            { "kerbsideid": "A1", "location": { "lat": -37.81, "lon": 144.96 } },
            { "kerbsideid": "A2", "status_description": 17 },
            "not a record"
        ]);
        let batch = decode_records(&payload).unwrap();
        assert_eq!(batch.records.len(), 1);
        assert_eq!(batch.rejected, 2);
        assert_eq!(batch.received(), 3);
    }

    #[test]
    fn rejects_unrecognized_payloads() {
        assert!(matches!(
            decode_records(&json!({ "error": "rate limited" })),
            Err(FeedError::Decode { .. })
        ));
        assert!(matches!(decode_records(&json!(42)), Err(FeedError::Decode { .. })));
    }

    #[tokio::test]
    async fn static_sources_return_their_contents() {
        let source = StaticSource::new(vec![RawBayRecord::new("1", -37.81, 144.96, "Present")]);
        assert_eq!(source.fetch().await.unwrap().records.len(), 1);

        let boundaries = StaticBoundaries::default();
        assert!(boundaries.load().await.unwrap().is_empty());
    }
}
