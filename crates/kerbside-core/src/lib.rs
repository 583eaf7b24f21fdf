//! Kerbside core: geospatial logic for parking bay proximity search,
//! suburb matching and occupancy aggregation.

pub mod aggregate;
pub mod boundary;
pub mod error;
pub mod index;
pub mod models;
pub mod snapshot;
pub mod spatial;

pub use aggregate::{overview, top_groups, zone_statistics, GroupBy, OverviewFilter, ZoneStats};
pub use boundary::{parse_feature_collection, Boundary, BoundaryMatcher, MatchSummary};
pub use error::{RecordError, SpatialError};
pub use index::{GridConfig, GridIndex, ListingFilter, NearbyPoint, NearbyQuery};
pub use models::{BayStatus, ParkingPoint, RawBayRecord, RawLocation, RecordBatch, StatusFilter};
pub use snapshot::{build_snapshot, BuildSummary, Snapshot, SnapshotCell, MALFORMED_RECORD};
pub use spatial::{distance_between, haversine_distance, BoundingBox, Coordinate};
