//! Spatial math for proximity search and bounding-box filters.

use serde::{Deserialize, Serialize};

use crate::error::SpatialError;

/// Mean Earth radius used by the haversine formula.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Approximate meters per degree of latitude (and of longitude at the equator).
pub const METERS_PER_DEG: f64 = 111_000.0;

/// Floor for the longitude scale factor so boxes stay finite near the poles.
const MIN_LON_SCALE: f64 = 1e-6;

/// A validated WGS84 coordinate in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinate {
    pub fn new(lat: f64, lng: f64) -> Result<Self, SpatialError> {
        validate_coordinate(lat, lng)?;
        Ok(Self { lat, lng })
    }

    /// Great-circle distance to another coordinate in meters.
    pub fn distance_to(&self, other: &Coordinate) -> f64 {
        haversine_distance(self.lat, self.lng, other.lat, other.lng)
    }
}

pub fn is_valid_coordinate(lat: f64, lng: f64) -> bool {
    lat.is_finite()
        && lng.is_finite()
        && (-90.0..=90.0).contains(&lat)
        && (-180.0..=180.0).contains(&lng)
}

pub fn validate_coordinate(lat: f64, lng: f64) -> Result<(), SpatialError> {
    if is_valid_coordinate(lat, lng) {
        Ok(())
    } else {
        Err(SpatialError::InvalidCoordinate { lat, lng })
    }
}

/// Distance between two caller-supplied coordinates in meters.
///
/// Fails with `InvalidCoordinate` if either input is out of range.
pub fn distance_between(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> Result<f64, SpatialError> {
    let a = Coordinate::new(lat1, lng1)?;
    let b = Coordinate::new(lat2, lng2)?;
    Ok(a.distance_to(&b))
}

/// Calculate distance between two points in meters using the haversine formula.
///
/// Inputs are not validated; use [`distance_between`] for caller input.
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let dphi = (lat2 - lat1).to_radians();
    let dlambda = (lon2 - lon1).to_radians();
    let a = (dphi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (dlambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * a.sqrt().atan2((1.0 - a).sqrt())
}

/// Convert a north/south distance in meters to degrees latitude.
pub fn meters_to_lat_deg(meters: f64) -> f64 {
    meters / METERS_PER_DEG
}

/// Convert an east/west distance in meters to degrees longitude at `ref_lat_deg`.
pub fn meters_to_lon_deg(meters: f64, ref_lat_deg: f64) -> f64 {
    let scale = ref_lat_deg.to_radians().cos().abs().max(MIN_LON_SCALE);
    meters / (METERS_PER_DEG * scale)
}

/// Axis-aligned latitude/longitude rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub min_lng: f64,
    pub max_lat: f64,
    pub max_lng: f64,
}

impl BoundingBox {
    /// Build a box from any two opposite corners.
    pub fn from_corners(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> Self {
        Self {
            min_lat: lat1.min(lat2),
            min_lng: lng1.min(lng2),
            max_lat: lat1.max(lat2),
            max_lng: lng1.max(lng2),
        }
    }

    /// Box covering a circle of `radius_m` around `center`, clamped to valid ranges.
    ///
    /// Boxes that reach a pole span every longitude.
    pub fn around(center: Coordinate, radius_m: f64) -> Self {
        let radius_m = radius_m.max(0.0);
        let lat_range = meters_to_lat_deg(radius_m);
        let min_lat = (center.lat - lat_range).max(-90.0);
        let max_lat = (center.lat + lat_range).min(90.0);

        if min_lat <= -90.0 || max_lat >= 90.0 {
            return Self {
                min_lat,
                min_lng: -180.0,
                max_lat,
                max_lng: 180.0,
            };
        }

        let lng_range = meters_to_lon_deg(radius_m, center.lat);
        Self {
            min_lat,
            min_lng: (center.lng - lng_range).max(-180.0),
            max_lat,
            max_lng: (center.lng + lng_range).min(180.0),
        }
    }

    /// Smallest box enclosing every `(lat, lng)` pair, or `None` when empty.
    pub fn enclosing<I>(coords: I) -> Option<Self>
    where
        I: IntoIterator<Item = (f64, f64)>,
    {
        coords.into_iter().fold(None, |acc, (lat, lng)| {
            Some(match acc {
                None => Self::from_corners(lat, lng, lat, lng),
                Some(bbox) => Self {
                    min_lat: bbox.min_lat.min(lat),
                    min_lng: bbox.min_lng.min(lng),
                    max_lat: bbox.max_lat.max(lat),
                    max_lng: bbox.max_lng.max(lng),
                },
            })
        })
    }

    /// Parse `"lat1,lng1,lat2,lng2"` (corners in any order).
    pub fn parse(raw: &str) -> Result<Self, SpatialError> {
        let values: Vec<f64> = raw
            .split(',')
            .map(|part| part.trim().parse::<f64>())
            .collect::<Result<_, _>>()
            .map_err(|_| SpatialError::MalformedFilter(format!("unparsable bounds '{raw}'")))?;

        let &[lat1, lng1, lat2, lng2] = values.as_slice() else {
            return Err(SpatialError::MalformedFilter(format!(
                "bounds need 4 values, got {}",
                values.len()
            )));
        };

        if !is_valid_coordinate(lat1, lng1) || !is_valid_coordinate(lat2, lng2) {
            return Err(SpatialError::MalformedFilter(format!(
                "bounds '{raw}' are out of range"
            )));
        }

        Ok(Self::from_corners(lat1, lng1, lat2, lng2))
    }

    pub fn contains(&self, lat: f64, lng: f64) -> bool {
        lat >= self.min_lat && lat <= self.max_lat && lng >= self.min_lng && lng <= self.max_lng
    }

    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.min_lat <= other.max_lat
            && other.min_lat <= self.max_lat
            && self.min_lng <= other.max_lng
            && other.min_lng <= self.max_lng
    }
}
