//! Snapshot construction from files on disk.

use anyhow::{Context, Result};
use chrono::Utc;
use std::path::Path;

use kerbside_core::{build_snapshot, BoundaryMatcher, GridConfig, Snapshot};
use kerbside_feed::{BaySource, BoundarySource, GeoJsonBoundaries, JsonFileSource};

/// Read `records` (and `boundaries`, when given) and build version 1 of the snapshot.
///
/// Unlike the server, a boundary file that cannot be read is an error here:
/// the caller asked for it explicitly.
pub async fn load_snapshot(
    records: &Path,
    boundaries: Option<&Path>,
    grid: &GridConfig,
) -> Result<Snapshot> {
    let batch = JsonFileSource::new(records)
        .fetch()
        .await
        .with_context(|| format!("Failed to read bay records from {}", records.display()))?;

    let matcher = match boundaries {
        Some(path) => {
            let boundaries = GeoJsonBoundaries::new(path)
                .load()
                .await
                .with_context(|| format!("Failed to read boundaries from {}", path.display()))?;
            BoundaryMatcher::new(boundaries)
        }
        None => BoundaryMatcher::empty(),
    };

    Ok(build_snapshot(&batch, &matcher, grid, 1, Utc::now()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::path::PathBuf;

    fn write_temp(name: &str, value: &serde_json::Value) -> PathBuf {
        let path = std::env::temp_dir().join(format!("kerbside-cli-{}-{}", std::process::id(), name));
        std::fs::write(&path, serde_json::to_vec(value).unwrap()).unwrap();
        path
    }

    #[tokio::test]
    async fn builds_from_records_and_boundaries() {
        let records = write_temp(
            "records.json",
            &json!([
                { "kerbsideid": "a", "location": { "lat": -37.8136, "lon": 144.9631 }, "status_description": "Unoccupied" },
                { "kerbsideid": "b", "location": { "lat": -37.8140, "lon": 144.9635 }, "status_description": "Present" },
                { "kerbsideid": "c", "location": { "lat": -37.9000, "lon": 145.1000 }, "status_description": "Present" }
            ]),
        );
        let boundaries = write_temp(
            "suburbs.geojson",
            &json!({
                "type": "FeatureCollection",
                "features": [{
                    "type": "Feature",
                    "properties": { "SUBURB_NAME": "Melbourne", "POSTCODE": "3000" },
                    "geometry": {
                        "type": "Polygon",
                        "coordinates": [[[144.95, -37.82], [144.97, -37.82], [144.97, -37.80], [144.95, -37.80], [144.95, -37.82]]]
                    }
                }]
            }),
        );

        let snapshot = load_snapshot(&records, Some(&boundaries), &GridConfig::default())
            .await
            .unwrap();
        assert_eq!(snapshot.version(), 1);
        assert_eq!(snapshot.len(), 3);
        assert_eq!(snapshot.summary().matched, 2);
        assert_eq!(snapshot.get("a").unwrap().suburb.as_deref(), Some("Melbourne"));

        let _ = std::fs::remove_file(records);
        let _ = std::fs::remove_file(boundaries);
    }

    #[tokio::test]
    async fn missing_records_file_is_an_error() {
        let path = std::env::temp_dir().join("kerbside-cli-does-not-exist.json");
        let err = load_snapshot(&path, None, &GridConfig::default()).await.unwrap_err();
        assert!(err.to_string().contains("Failed to read bay records"));
    }
}
