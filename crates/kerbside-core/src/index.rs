//! Uniform grid index over parking points.
//!
//! Space is cut into square cells (in degrees) anchored at the dataset's
//! south-west corner, and every point lands in exactly one cell. Radius and bounding-box queries
//! only visit the cells their box covers, which keeps lookups sub-linear
//! for city-sized datasets.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::aggregate::OverviewFilter;
use crate::error::SpatialError;
use crate::models::{BayStatus, ParkingPoint, StatusFilter};
use crate::spatial::{haversine_distance, BoundingBox, Coordinate};

pub const DEFAULT_RADIUS_M: f64 = 500.0;
pub const DEFAULT_TOP_K: usize = 20;
pub const DEFAULT_BOUNDS_LIMIT: usize = 1000;
pub const DEFAULT_TARGET_PER_CELL: usize = 32;

const MIN_CELL_SIZE_DEG: f64 = 1e-5;
/// The outer 1% of points on each side of each axis is ignored when sizing cells.
const OUTLIER_TRIM_DIVISOR: usize = 100;

/// Grid tuning.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridConfig {
    /// Fixed cell edge in degrees. Derived from the data when `None`.
    pub cell_size_deg: Option<f64>,
    /// Average number of points per cell aimed for when deriving the cell size.
    pub target_per_cell: usize,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            cell_size_deg: None,
            target_per_cell: DEFAULT_TARGET_PER_CELL,
        }
    }
}

/// Attribute filters for map listings, applied before the result cap.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListingFilter {
    pub status: StatusFilter,
    /// Exact zone and case-insensitive suburb substring
    pub area: OverviewFilter,
    /// Bays whose sensor last reported before this instant are left out
    pub updated_since: Option<DateTime<Utc>>,
}

impl ListingFilter {
    /// Keep only bays reported within `hours` of `now`. Zero disables the cutoff.
    pub fn active_within(mut self, hours: u64, now: DateTime<Utc>) -> Self {
        self.updated_since = i64::try_from(hours)
            .ok()
            .filter(|hours| *hours > 0)
            .and_then(chrono::Duration::try_hours)
            .and_then(|window| now.checked_sub_signed(window));
        self
    }

    pub fn matches(&self, point: &ParkingPoint) -> bool {
        self.status.matches(point.status)
            && self.area.matches(point)
            && self
                .updated_since
                .map_or(true, |since| point.last_updated >= since)
    }
}

/// Radius search parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NearbyQuery {
    pub lat: f64,
    pub lng: f64,
    pub radius_m: f64,
    pub top_k: usize,
    pub status: StatusFilter,
}

impl NearbyQuery {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self {
            lat,
            lng,
            radius_m: DEFAULT_RADIUS_M,
            top_k: DEFAULT_TOP_K,
            status: StatusFilter::All,
        }
    }

    pub fn radius(mut self, radius_m: f64) -> Self {
        self.radius_m = radius_m;
        self
    }

    pub fn limit(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn status(mut self, status: StatusFilter) -> Self {
        self.status = status;
        self
    }

    /// Radius actually searched. A negative or non-finite radius is a
    /// malformed filter and falls back to the default.
    pub fn effective_radius(&self) -> f64 {
        if self.radius_m.is_finite() && self.radius_m >= 0.0 {
            self.radius_m
        } else {
            DEFAULT_RADIUS_M
        }
    }
}

/// A radius search hit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NearbyPoint {
    pub id: String,
    pub lat: f64,
    pub lng: f64,
    /// Rounded to one decimal place
    pub distance_m: f64,
    pub status: BayStatus,
    pub zone: Option<String>,
    pub suburb: Option<String>,
    pub postcode: Option<String>,
    pub street: Option<String>,
    pub last_updated: DateTime<Utc>,
}

impl NearbyPoint {
    fn from_point(point: &ParkingPoint, distance_m: f64) -> Self {
        Self {
            id: point.id.clone(),
            lat: point.lat,
            lng: point.lng,
            distance_m: (distance_m * 10.0).round() / 10.0,
            status: point.status,
            zone: point.zone.clone(),
            suburb: point.suburb.clone(),
            postcode: point.postcode.clone(),
            street: point.street.clone(),
            last_updated: point.last_updated,
        }
    }
}

/// Cell coordinates: (row, col) counted from the layout origin.
type CellKey = (i64, i64);

#[derive(Debug, Clone, Copy)]
struct GridLayout {
    origin_lat: f64,
    origin_lng: f64,
    cell_size: f64,
}

impl GridLayout {
    fn plan(points: &[ParkingPoint], config: &GridConfig) -> Option<Self> {
        let extent = BoundingBox::enclosing(points.iter().map(|p| (p.lat, p.lng)))?;
        let requested = config
            .cell_size_deg
            .filter(|size| size.is_finite() && *size > 0.0)
            .unwrap_or_else(|| {
                let core = core_extent(points);
                derive_cell_size(
                    core.max_lat - core.min_lat,
                    core.max_lng - core.min_lng,
                    points.len(),
                    config.target_per_cell,
                )
            });

        Some(Self {
            origin_lat: extent.min_lat,
            origin_lng: extent.min_lng,
            cell_size: requested.max(MIN_CELL_SIZE_DEG),
        })
    }

    /// Cell of a position, by truncating division of its offset from the origin.
    fn key(&self, lat: f64, lng: f64) -> CellKey {
        (
            axis_index(lat - self.origin_lat, self.cell_size),
            axis_index(lng - self.origin_lng, self.cell_size),
        )
    }
}

/// Extent of the central 98% of points on each axis.
///
/// A handful of far-off sensors (a bay reported at 0,0) must not stretch
/// every cell across the whole city.
fn core_extent(points: &[ParkingPoint]) -> BoundingBox {
    let mut lats: Vec<f64> = points.iter().map(|p| p.lat).collect();
    let mut lngs: Vec<f64> = points.iter().map(|p| p.lng).collect();
    lats.sort_by(f64::total_cmp);
    lngs.sort_by(f64::total_cmp);

    let trim = points.len() / OUTLIER_TRIM_DIVISOR;
    let last = points.len().saturating_sub(1 + trim);
    BoundingBox::from_corners(lats[trim], lngs[trim], lats[last], lngs[last])
}

fn derive_cell_size(lat_span: f64, lng_span: f64, count: usize, target_per_cell: usize) -> f64 {
    let cells_wanted = (count as f64 / target_per_cell.max(1) as f64).ceil().max(1.0);
    let area = lat_span * lng_span;
    if area > 0.0 {
        (area / cells_wanted).sqrt()
    } else {
        // All points on one line (or one spot).
        lat_span.max(lng_span) / cells_wanted
    }
}

fn axis_index(offset: f64, cell_size: f64) -> i64 {
    (offset / cell_size).floor() as i64
}

/// Immutable grid index owning its points.
///
/// Only occupied cells are stored, so outliers cost one extra cell each
/// rather than a dense block of empty ones.
#[derive(Debug, Clone, Default)]
pub struct GridIndex {
    points: Vec<ParkingPoint>,
    by_id: HashMap<String, usize>,
    layout: Option<GridLayout>,
    cells: BTreeMap<CellKey, Vec<u32>>,
}

impl GridIndex {
    /// Bucket `points` into a grid.
    ///
    /// Points are expected to carry valid coordinates and unique ids; the
    /// snapshot builder guarantees both.
    pub fn build(points: Vec<ParkingPoint>, config: &GridConfig) -> Self {
        let Some(layout) = GridLayout::plan(&points, config) else {
            return Self::default();
        };

        let mut cells: BTreeMap<CellKey, Vec<u32>> = BTreeMap::new();
        let mut by_id = HashMap::with_capacity(points.len());
        for (idx, point) in points.iter().enumerate() {
            cells
                .entry(layout.key(point.lat, point.lng))
                .or_default()
                .push(idx as u32);
            by_id.insert(point.id.clone(), idx);
        }

        Self {
            points,
            by_id,
            layout: Some(layout),
            cells,
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[ParkingPoint] {
        &self.points
    }

    pub fn get(&self, id: &str) -> Option<&ParkingPoint> {
        self.by_id.get(id).map(|&idx| &self.points[idx])
    }

    /// Cell edge in degrees, or `None` for an empty index.
    pub fn cell_size_deg(&self) -> Option<f64> {
        self.layout.map(|layout| layout.cell_size)
    }

    /// Number of occupied cells.
    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    /// Buckets whose cells overlap `bbox`, in row-major order.
    fn covered_buckets(&self, bbox: &BoundingBox) -> Vec<&[u32]> {
        let Some(layout) = self.layout else {
            return Vec::new();
        };
        let (row_lo, col_lo) = layout.key(bbox.min_lat, bbox.min_lng);
        let (row_hi, col_hi) = layout.key(bbox.max_lat, bbox.max_lng);
        if row_lo > row_hi || col_lo > col_hi {
            return Vec::new();
        }

        let rows = row_hi.saturating_sub(row_lo).saturating_add(1);
        let cols = col_hi.saturating_sub(col_lo).saturating_add(1);
        if rows.saturating_mul(cols) <= self.cells.len() as i64 {
            (row_lo..=row_hi)
                .flat_map(|row| (col_lo..=col_hi).map(move |col| (row, col)))
                .filter_map(|key| self.cells.get(&key))
                .map(Vec::as_slice)
                .collect()
        } else {
            // Wider than the occupied grid: walk occupied cells instead of keys.
            self.cells
                .range((row_lo, col_lo)..=(row_hi, col_hi))
                .filter(|((_, col), _)| (col_lo..=col_hi).contains(col))
                .map(|(_, bucket)| bucket.as_slice())
                .collect()
        }
    }

    /// Points within `radius_m` of the query center, nearest first.
    ///
    /// Ties in distance are broken by id so results are deterministic.
    pub fn within_radius(&self, query: &NearbyQuery) -> Result<Vec<NearbyPoint>, SpatialError> {
        let center = Coordinate::new(query.lat, query.lng)?;
        let radius_m = query.effective_radius();
        if query.top_k == 0 {
            return Ok(Vec::new());
        }

        let bbox = BoundingBox::around(center, radius_m);
        let mut hits: Vec<(f64, &ParkingPoint)> = self
            .cell_members(&bbox)
            .filter(|point| query.status.matches(point.status))
            .filter_map(|point| {
                let distance = haversine_distance(center.lat, center.lng, point.lat, point.lng);
                (distance <= radius_m).then_some((distance, point))
            })
            .collect();

        hits.sort_by(|a, b| {
            a.0.partial_cmp(&b.0)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.1.id.cmp(&b.1.id))
        });
        hits.truncate(query.top_k);

        Ok(hits
            .into_iter()
            .map(|(distance, point)| NearbyPoint::from_point(point, distance))
            .collect())
    }

    /// Points inside `bbox`, in cell order, capped at `limit`.
    pub fn within_bounds(&self, bbox: &BoundingBox, limit: usize) -> Vec<&ParkingPoint> {
        self.within_bounds_matching(bbox, &ListingFilter::default(), limit)
    }

    pub fn within_bounds_matching(
        &self,
        bbox: &BoundingBox,
        filter: &ListingFilter,
        limit: usize,
    ) -> Vec<&ParkingPoint> {
        self.cell_members(bbox)
            .filter(|point| bbox.contains(point.lat, point.lng) && filter.matches(point))
            .take(limit)
            .collect()
    }

    /// Points inside `bbox`, drawn round-robin across cells when more than
    /// `limit` match so a capped result still spreads over the whole box.
    pub fn sample_bounds(&self, bbox: &BoundingBox, limit: usize) -> Vec<&ParkingPoint> {
        self.sample_bounds_matching(bbox, &ListingFilter::default(), limit)
    }

    pub fn sample_bounds_matching(
        &self,
        bbox: &BoundingBox,
        filter: &ListingFilter,
        limit: usize,
    ) -> Vec<&ParkingPoint> {
        let buckets: Vec<Vec<&ParkingPoint>> = self
            .covered_buckets(bbox)
            .into_iter()
            .map(|bucket| {
                bucket
                    .iter()
                    .map(|&idx| &self.points[idx as usize])
                    .filter(|point| bbox.contains(point.lat, point.lng) && filter.matches(point))
                    .collect::<Vec<_>>()
            })
            .filter(|bucket| !bucket.is_empty())
            .collect();

        let total: usize = buckets.iter().map(Vec::len).sum();
        if total <= limit {
            return buckets.into_iter().flatten().collect();
        }

        let mut sampled = Vec::with_capacity(limit);
        let mut depth = 0;
        while sampled.len() < limit {
            let mut progressed = false;
            for bucket in &buckets {
                if let Some(point) = bucket.get(depth) {
                    sampled.push(*point);
                    progressed = true;
                    if sampled.len() == limit {
                        break;
                    }
                }
            }
            if !progressed {
                break;
            }
            depth += 1;
        }
        sampled
    }

    /// First `limit` points passing `filter`, with no spatial filter.
    pub fn all(&self, filter: &ListingFilter, limit: usize) -> Vec<&ParkingPoint> {
        self.points
            .iter()
            .filter(|point| filter.matches(point))
            .take(limit)
            .collect()
    }

    fn cell_members<'a>(&'a self, bbox: &BoundingBox) -> impl Iterator<Item = &'a ParkingPoint> + 'a {
        self.covered_buckets(bbox)
            .into_iter()
            .flat_map(|bucket| bucket.iter())
            .map(move |&idx| &self.points[idx as usize])
    }
}
