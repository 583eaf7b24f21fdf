//! File-backed sources: a JSON dump of sensor records and a GeoJSON
//! suburb boundary file.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use kerbside_core::{parse_feature_collection, Boundary, RecordBatch};
use serde_json::Value;

use crate::source::{decode_records, BaySource, BoundarySource, FeedError};

async fn read_json(path: &Path) -> Result<Value, FeedError> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| FeedError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    serde_json::from_str(&raw).map_err(|err| FeedError::Decode {
        what: path.display().to_string(),
        reason: err.to_string(),
    })
}

/// Records read from a JSON file, re-read on every fetch.
///
/// The file may hold a bare array of records or a saved API response.
#[derive(Debug, Clone)]
pub struct JsonFileSource {
    path: PathBuf,
}

impl JsonFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl BaySource for JsonFileSource {
    fn name(&self) -> &str {
        "json-file"
    }

    async fn fetch(&self) -> Result<RecordBatch, FeedError> {
        let payload = read_json(&self.path).await?;
        let batch = decode_records(&payload)?;
        if batch.rejected > 0 {
            tracing::warn!(
                "{} entries in {} are not bay records",
                batch.rejected,
                self.path.display()
            );
        }
        Ok(batch)
    }
}

/// Suburb boundaries from a GeoJSON `FeatureCollection`.
#[derive(Debug, Clone)]
pub struct GeoJsonBoundaries {
    path: PathBuf,
}

impl GeoJsonBoundaries {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl BoundarySource for GeoJsonBoundaries {
    fn name(&self) -> &str {
        "geojson-file"
    }

    async fn load(&self) -> Result<Vec<Boundary>, FeedError> {
        let document = read_json(&self.path).await?;
        let (boundaries, errors) = parse_feature_collection(&document);

        for err in errors.iter().take(5) {
            tracing::warn!("Skipping boundary: {}", err);
        }
        if errors.len() > 5 {
            tracing::warn!("... and {} more invalid boundaries", errors.len() - 5);
        }

        if boundaries.is_empty() && !errors.is_empty() {
            return Err(FeedError::Decode {
                what: self.path.display().to_string(),
                reason: format!("no valid boundaries ({} rejected)", errors.len()),
            });
        }

        tracing::info!(
            "Loaded {} suburb boundaries from {}",
            boundaries.len(),
            self.path.display()
        );
        Ok(boundaries)
    }
}
