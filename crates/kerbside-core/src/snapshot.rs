//! Immutable, versioned snapshots of the parking dataset.
//!
//! A refresh builds a complete [`Snapshot`] off to the side and publishes it
//! through a [`SnapshotCell`] with a single pointer swap. Readers load an
//! `Arc<Snapshot>` and keep it for the whole query, so a publish never
//! changes what an in-flight query sees.

use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::aggregate::{self, GroupBy, OverviewFilter, ZoneStats};
use crate::boundary::BoundaryMatcher;
use crate::error::SpatialError;
use crate::index::{GridConfig, GridIndex, ListingFilter, NearbyPoint, NearbyQuery};
use crate::models::{ParkingPoint, RecordBatch};
use crate::spatial::BoundingBox;

/// Skip reason for payload entries that could not be decoded as records.
pub const MALFORMED_RECORD: &str = "malformed_record";

/// What happened while building a snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildSummary {
    pub received: usize,
    pub indexed: usize,
    pub skipped: usize,
    /// Skipped records counted by reason
    pub skipped_by_reason: BTreeMap<String, usize>,
    /// Records replaced by a newer record with the same id
    pub duplicates: usize,
    pub matched: usize,
    pub unmatched: usize,
}

/// A published, read-only view of every parking bay.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    version: u64,
    built_at: Option<DateTime<Utc>>,
    index: GridIndex,
    summary: BuildSummary,
}

impl Snapshot {
    /// The version-0 snapshot served before the first refresh.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new(version: u64, built_at: DateTime<Utc>, index: GridIndex, summary: BuildSummary) -> Self {
        Self {
            version,
            built_at: Some(built_at),
            index,
            summary,
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn built_at(&self) -> Option<DateTime<Utc>> {
        self.built_at
    }

    pub fn summary(&self) -> &BuildSummary {
        &self.summary
    }

    pub fn index(&self) -> &GridIndex {
        &self.index
    }

    pub fn points(&self) -> &[ParkingPoint] {
        self.index.points()
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&ParkingPoint> {
        self.index.get(id)
    }

    /// Nearest bays within `radius_m`, at most `top_k`, nearest first.
    pub fn find_nearby(
        &self,
        lat: f64,
        lng: f64,
        radius_m: f64,
        top_k: usize,
    ) -> Result<Vec<NearbyPoint>, SpatialError> {
        self.find_nearby_with(&NearbyQuery::new(lat, lng).radius(radius_m).limit(top_k))
    }

    pub fn find_nearby_with(&self, query: &NearbyQuery) -> Result<Vec<NearbyPoint>, SpatialError> {
        self.index.within_radius(query)
    }

    /// Bays inside the box with the given corners, capped at `limit`.
    pub fn find_in_bounds(
        &self,
        min_lat: f64,
        min_lng: f64,
        max_lat: f64,
        max_lng: f64,
        limit: usize,
    ) -> Vec<&ParkingPoint> {
        let bbox = BoundingBox::from_corners(min_lat, min_lng, max_lat, max_lng);
        self.index.within_bounds(&bbox, limit)
    }

    /// Bounds query used by the map endpoints.
    ///
    /// No box means no spatial filter. `filter` is applied before the cap.
    /// With `sample` set, a capped result is spread across the box instead of
    /// filling up from one corner.
    pub fn query_bounds(
        &self,
        bbox: Option<&BoundingBox>,
        filter: &ListingFilter,
        limit: usize,
        sample: bool,
    ) -> Vec<&ParkingPoint> {
        match bbox {
            None => self.index.all(filter, limit),
            Some(bbox) if sample => self.index.sample_bounds_matching(bbox, filter, limit),
            Some(bbox) => self.index.within_bounds_matching(bbox, filter, limit),
        }
    }

    pub fn zone_statistics(&self, group_by: GroupBy, decimals: u32) -> Vec<ZoneStats> {
        aggregate::zone_statistics(self.points(), group_by, decimals)
    }

    pub fn overview(&self, filter: &OverviewFilter, decimals: u32) -> Option<ZoneStats> {
        aggregate::overview(self.points(), filter, decimals)
    }
}

/// Validate, de-duplicate, match and index a batch of feed records.
///
/// Bad records are skipped and counted; they never fail the batch. Entries
/// the source could not decode are counted under [`MALFORMED_RECORD`]. When
/// the same id appears more than once the record with the latest status
/// timestamp wins, and ties go to the record seen last.
pub fn build_snapshot(
    batch: &RecordBatch,
    matcher: &BoundaryMatcher,
    grid: &GridConfig,
    version: u64,
    now: DateTime<Utc>,
) -> Snapshot {
    let records = &batch.records;
    let mut summary = BuildSummary {
        received: batch.received(),
        skipped: batch.rejected,
        ..BuildSummary::default()
    };
    if batch.rejected > 0 {
        summary
            .skipped_by_reason
            .insert(MALFORMED_RECORD.to_string(), batch.rejected);
    }

    let mut points: Vec<ParkingPoint> = Vec::with_capacity(records.len());
    let mut positions: HashMap<String, usize> = HashMap::with_capacity(records.len());

    for record in records {
        let point = match ParkingPoint::from_raw(record, now) {
            Ok(point) => point,
            Err(err) => {
                summary.skipped += 1;
                *summary
                    .skipped_by_reason
                    .entry(err.kind().to_string())
                    .or_default() += 1;
                continue;
            }
        };

        match positions.entry(point.id.clone()) {
            Entry::Occupied(slot) => {
                summary.duplicates += 1;
                let existing = &mut points[*slot.get()];
                if point.status_timestamp >= existing.status_timestamp {
                    *existing = point;
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(points.len());
                points.push(point);
            }
        }
    }

    let matches = matcher.assign_all(&mut points);
    summary.matched = matches.matched;
    summary.unmatched = matches.unmatched;
    summary.indexed = points.len();

    Snapshot::new(version, now, GridIndex::build(points, grid), summary)
}

/// Holder of the current snapshot.
///
/// Reads are lock-free; `publish` replaces the whole snapshot atomically.
pub struct SnapshotCell {
    current: ArcSwap<Snapshot>,
}

impl SnapshotCell {
    pub fn new(snapshot: Snapshot) -> Self {
        Self {
            current: ArcSwap::from_pointee(snapshot),
        }
    }

    /// The current snapshot. Hold on to the `Arc` for the duration of a query.
    pub fn load(&self) -> Arc<Snapshot> {
        self.current.load_full()
    }

    /// Make `snapshot` current, returning the one it replaced.
    pub fn publish(&self, snapshot: Snapshot) -> Arc<Snapshot> {
        self.current.swap(Arc::new(snapshot))
    }

    pub fn version(&self) -> u64 {
        self.current.load().version
    }
}

impl Default for SnapshotCell {
    fn default() -> Self {
        Self::new(Snapshot::empty())
    }
}

impl std::fmt::Debug for SnapshotCell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let current = self.current.load();
        f.debug_struct("SnapshotCell")
            .field("version", &current.version)
            .field("points", &current.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boundary::Boundary;
    use crate::models::{BayStatus, RawBayRecord, RawLocation, StatusFilter};
    use crate::spatial::haversine_distance;
    use serde_json::Value;

    fn scenario_records() -> Vec<RawBayRecord> {
        vec![
            RawBayRecord::new("a", -37.8136, 144.9631, "Unoccupied"),
            RawBayRecord::new("b", -37.8140, 144.9635, "Present"),
            RawBayRecord::new("c", -37.9000, 145.1000, "Present"),
        ]
    }

    fn build(records: &[RawBayRecord], version: u64) -> Snapshot {
        build_snapshot(
            &RecordBatch::from(records.to_vec()),
            &BoundaryMatcher::empty(),
            &GridConfig::default(),
            version,
            Utc::now(),
        )
    }

    #[test]
    fn scenario_nearby_and_zone_stats() {
        let snapshot = build(&scenario_records(), 1);

        let nearby = snapshot.find_nearby(-37.8136, 144.9631, 500.0, 20).unwrap();
        let ids: Vec<&str> = nearby.iter().map(|hit| hit.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(nearby[0].distance_m, 0.0);
        let expected = haversine_distance(-37.8136, 144.9631, -37.8140, 144.9635);
        assert_eq!(nearby[1].distance_m, (expected * 10.0).round() / 10.0);

        let stats = snapshot.zone_statistics(GroupBy::Zone, 1);
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].group, "Unknown");
        assert_eq!((stats[0].total, stats[0].occupied, stats[0].available), (3, 2, 1));
        assert_eq!(stats[0].occupancy_rate, 66.7);
    }

    #[test]
    fn bad_records_are_counted_not_fatal() {
        let mut records = scenario_records();
        records.push(RawBayRecord {
            kerbsideid: None,
            ..RawBayRecord::new("x", -37.81, 144.96, "Present")
        });
        records.push(RawBayRecord::new("far", 123.0, 144.96, "Present"));
        records.push(RawBayRecord {
            location: Some(RawLocation {
                lat: Some(Value::Null),
                lon: None,
            }),
            ..RawBayRecord::new("nowhere", 0.0, 0.0, "Present")
        });

        let snapshot = build(&records, 1);
        let summary = snapshot.summary();
        assert_eq!(summary.received, 6);
        assert_eq!(summary.indexed, 3);
        assert_eq!(summary.skipped, 3);
        assert_eq!(summary.skipped_by_reason.get("missing_id"), Some(&1));
        assert_eq!(summary.skipped_by_reason.get("invalid_coordinate"), Some(&1));
        assert_eq!(summary.skipped_by_reason.get("missing_location"), Some(&1));
    }

    #[test]
    fn undecodable_entries_count_as_skipped() {
        let batch = RecordBatch::new(scenario_records(), 2);
        let snapshot = build_snapshot(
            &batch,
            &BoundaryMatcher::empty(),
            &GridConfig::default(),
            1,
            Utc::now(),
        );
        let summary = snapshot.summary();
        assert_eq!(summary.received, 5);
        assert_eq!(summary.indexed, 3);
        assert_eq!(summary.skipped, 2);
        assert_eq!(summary.skipped_by_reason.get(MALFORMED_RECORD), Some(&2));
    }

    #[test]
    fn latest_status_timestamp_wins_for_duplicate_ids() {
        let stamped = |status: &str, stamp: &str| RawBayRecord {
            status_timestamp: Some(stamp.to_string()),
            ..RawBayRecord::new("dup", -37.81, 144.96, status)
        };
        let records = vec![
            stamped("Present", "2024-03-01T10:00:00Z"),
            stamped("Unoccupied", "2024-03-01T09:00:00Z"),
        ];
        let snapshot = build(&records, 1);
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.summary().duplicates, 1);
        assert_eq!(snapshot.get("dup").unwrap().status, BayStatus::Occupied);

        let tied = vec![
            stamped("Present", "2024-03-01T10:00:00Z"),
            stamped("Unoccupied", "2024-03-01T10:00:00Z"),
        ];
        assert_eq!(build(&tied, 1).get("dup").unwrap().status, BayStatus::Unoccupied);
    }

    #[test]
    fn boundaries_are_applied_during_build() {
        let matcher = BoundaryMatcher::new(vec![Boundary::new(
            "Melbourne",
            vec![vec![
                [-37.82, 144.95],
                [-37.82, 144.97],
                [-37.80, 144.97],
                [-37.80, 144.95],
            ]],
        )
        .with_postcode("3000")]);

        let snapshot = build_snapshot(
            &RecordBatch::from(scenario_records()),
            &matcher,
            &GridConfig::default(),
            1,
            Utc::now(),
        );
        assert_eq!(snapshot.summary().matched, 2);
        assert_eq!(snapshot.summary().unmatched, 1);
        assert_eq!(snapshot.get("a").unwrap().suburb.as_deref(), Some("Melbourne"));
        assert!(snapshot.get("c").unwrap().suburb.is_none());

        let nearby = snapshot.find_nearby(-37.8136, 144.9631, 100.0, 5).unwrap();
        assert_eq!(nearby[0].postcode.as_deref(), Some("3000"));
    }

    #[test]
    fn bounds_queries() {
        let snapshot = build(&scenario_records(), 1);
        let inner = snapshot.find_in_bounds(-37.82, 144.96, -37.81, 144.97, 1000);
        assert_eq!(inner.len(), 2);

        let any = ListingFilter::default();
        assert_eq!(snapshot.query_bounds(None, &any, 1000, false).len(), 3);
        assert_eq!(snapshot.query_bounds(None, &any, 2, false).len(), 2);
        let bbox = BoundingBox::from_corners(-37.95, 145.05, -37.85, 145.15);
        let found = snapshot.query_bounds(Some(&bbox), &any, 10, true);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "c");
    }

    #[test]
    fn listing_filters_apply_before_the_cap() {
        let mut records = scenario_records();
        records[0].zone_number = Some(Value::from(7301));
        records[1].zone_number = Some(Value::from(7301));
        records[1].lastupdated = Some("2020-01-01T00:00:00Z".into());
        let snapshot = build(&records, 1);
        let cbd = BoundingBox::from_corners(-37.82, 144.96, -37.81, 144.97);

        let available = ListingFilter {
            status: StatusFilter::Available,
            ..ListingFilter::default()
        };
        let found = snapshot.query_bounds(None, &available, 1, false);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "a");

        let occupied = ListingFilter {
            status: StatusFilter::Occupied,
            ..ListingFilter::default()
        };
        let found = snapshot.query_bounds(Some(&cbd), &occupied, 10, true);
        let ids: Vec<&str> = found.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["b"]);

        let zoned = ListingFilter {
            area: OverviewFilter {
                zone: Some("7301".into()),
                suburb: None,
            },
            ..ListingFilter::default()
        };
        assert_eq!(snapshot.query_bounds(None, &zoned, 10, false).len(), 2);

        let fresh = ListingFilter::default().active_within(24, Utc::now());
        let found = snapshot.query_bounds(Some(&cbd), &fresh, 10, false);
        let ids: Vec<&str> = found.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["a"]);

        let unbounded = ListingFilter::default().active_within(0, Utc::now());
        assert!(unbounded.updated_since.is_none());
        assert_eq!(snapshot.query_bounds(Some(&cbd), &unbounded, 10, false).len(), 2);
    }

    #[test]
    fn empty_snapshot_answers_with_nothing() {
        let snapshot = Snapshot::empty();
        assert_eq!(snapshot.version(), 0);
        assert!(snapshot.built_at().is_none());
        assert!(snapshot.find_nearby(-37.81, 144.96, 500.0, 20).unwrap().is_empty());
        assert!(snapshot.zone_statistics(GroupBy::Zone, 1).is_empty());
        assert!(snapshot.overview(&OverviewFilter::default(), 1).is_none());
    }

    #[test]
    fn readers_keep_their_snapshot_across_publish() {
        let cell = SnapshotCell::default();
        assert_eq!(cell.version(), 0);

        cell.publish(build(&scenario_records(), 1));
        let held = cell.load();
        assert_eq!(held.len(), 3);

        let previous = cell.publish(build(&scenario_records()[..1], 2));
        assert_eq!(previous.version(), 1);
        assert_eq!(cell.version(), 2);
        assert_eq!(cell.load().len(), 1);

        assert_eq!(held.version(), 1);
        assert_eq!(held.len(), 3);
        assert_eq!(held.find_nearby(-37.8136, 144.9631, 500.0, 20).unwrap().len(), 2);
    }
}
