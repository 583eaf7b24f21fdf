//! Suburb boundaries and point-in-polygon matching.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::RecordError;
use crate::models::ParkingPoint;
use crate::spatial::{is_valid_coordinate, BoundingBox};

/// Cross-product magnitude under which a point counts as lying on an edge.
const EDGE_TOLERANCE: f64 = 1e-12;

const DEFAULT_STATE: &str = "VIC";

/// A named suburb polygon.
///
/// Rings hold `[lat, lng]` vertices. Outer rings, holes and the parts of a
/// multi-polygon are all kept in one list; containment uses the even-odd
/// rule across every ring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Boundary {
    pub name: String,
    pub postcode: Option<String>,
    pub state: String,
    pub rings: Vec<Vec<[f64; 2]>>,
}

impl Boundary {
    pub fn new(name: impl Into<String>, rings: Vec<Vec<[f64; 2]>>) -> Self {
        Self {
            name: name.into(),
            postcode: None,
            state: DEFAULT_STATE.to_string(),
            rings,
        }
    }

    pub fn with_postcode(mut self, postcode: impl Into<String>) -> Self {
        self.postcode = Some(postcode.into());
        self
    }

    /// Envelope of every vertex, or `None` when there are no vertices.
    pub fn bbox(&self) -> Option<BoundingBox> {
        BoundingBox::enclosing(
            self.rings
                .iter()
                .flat_map(|ring| ring.iter().map(|vertex| (vertex[0], vertex[1]))),
        )
    }

    /// Check if a point is inside this boundary.
    /// Uses ray casting; a point on any edge counts as inside.
    pub fn contains(&self, lat: f64, lng: f64) -> bool {
        let mut inside = false;

        for ring in self.rings.iter().filter(|ring| ring.len() >= 3) {
            let n = ring.len();
            let mut j = n - 1;
            for i in 0..n {
                let yi = ring[i][0];
                let xi = ring[i][1];
                let yj = ring[j][0];
                let xj = ring[j][1];

                if on_segment(lat, lng, yi, xi, yj, xj) {
                    return true;
                }

                if ((yi > lat) != (yj > lat)) && (lng < (xj - xi) * (lat - yi) / (yj - yi) + xi) {
                    inside = !inside;
                }
                j = i;
            }
        }

        inside
    }

    /// Parse one GeoJSON feature with `Polygon` or `MultiPolygon` geometry.
    pub fn from_geojson_feature(feature: &Value) -> Result<Self, RecordError> {
        let property = |key: &str| feature.get("properties").and_then(|props| props.get(key));

        let name = ["SUBURB_NAME", "name"]
            .iter()
            .find_map(|key| property(key).and_then(Value::as_str))
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .ok_or(RecordError::MissingName)?
            .to_string();

        let malformed = |reason: &str| RecordError::MalformedGeometry {
            name: name.clone(),
            reason: reason.to_string(),
        };

        let geometry = feature
            .get("geometry")
            .filter(|geometry| !geometry.is_null())
            .ok_or_else(|| malformed("missing geometry"))?;
        let coordinates = geometry
            .get("coordinates")
            .ok_or_else(|| malformed("missing coordinates"))?;

        let rings = match geometry.get("type").and_then(Value::as_str) {
            Some("Polygon") => parse_polygon(coordinates).map_err(|reason| malformed(&reason))?,
            Some("MultiPolygon") => {
                let parts = coordinates
                    .as_array()
                    .ok_or_else(|| malformed("multipolygon coordinates are not an array"))?;
                let mut rings = Vec::new();
                for part in parts {
                    rings.extend(parse_polygon(part).map_err(|reason| malformed(&reason))?);
                }
                rings
            }
            Some(other) => return Err(malformed(&format!("unsupported geometry type {other}"))),
            None => return Err(malformed("missing geometry type")),
        };

        if rings.is_empty() {
            return Err(malformed("no rings"));
        }

        let postcode = ["POSTCODE", "postcode"]
            .iter()
            .find_map(|key| property(key))
            .and_then(|value| match value {
                Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            });

        let state = ["STATE", "state"]
            .iter()
            .find_map(|key| property(key).and_then(Value::as_str))
            .map(str::to_string)
            .unwrap_or_else(|| DEFAULT_STATE.to_string());

        Ok(Self {
            name,
            postcode,
            state,
            rings,
        })
    }
}

/// Parse a GeoJSON `FeatureCollection` (or a bare array of features).
///
/// Features that fail to parse are returned as errors alongside the valid
/// boundaries; one bad suburb does not reject the whole file.
pub fn parse_feature_collection(document: &Value) -> (Vec<Boundary>, Vec<RecordError>) {
    let features = match document {
        Value::Array(features) => features.as_slice(),
        Value::Object(_) => match document.get("features").and_then(Value::as_array) {
            Some(features) => features.as_slice(),
            None => return (Vec::new(), vec![not_a_collection()]),
        },
        _ => return (Vec::new(), vec![not_a_collection()]),
    };

    let mut boundaries = Vec::with_capacity(features.len());
    let mut errors = Vec::new();
    for feature in features {
        match Boundary::from_geojson_feature(feature) {
            Ok(boundary) => boundaries.push(boundary),
            Err(err) => errors.push(err),
        }
    }
    (boundaries, errors)
}

fn not_a_collection() -> RecordError {
    RecordError::MalformedGeometry {
        name: "FeatureCollection".to_string(),
        reason: "document has no features array".to_string(),
    }
}

/// GeoJSON polygon rings are `[lng, lat]`; flip them to `[lat, lng]`.
fn parse_polygon(coordinates: &Value) -> Result<Vec<Vec<[f64; 2]>>, String> {
    let rings = coordinates
        .as_array()
        .ok_or_else(|| "polygon coordinates are not an array".to_string())?;

    rings
        .iter()
        .map(|ring| {
            let vertices = ring
                .as_array()
                .ok_or_else(|| "ring is not an array".to_string())?;
            if vertices.len() < 3 {
                return Err(format!("ring has {} vertices", vertices.len()));
            }
            vertices
                .iter()
                .map(|vertex| {
                    let lng = vertex.get(0).and_then(Value::as_f64);
                    let lat = vertex.get(1).and_then(Value::as_f64);
                    match (lat, lng) {
                        (Some(lat), Some(lng)) if is_valid_coordinate(lat, lng) => Ok([lat, lng]),
                        _ => Err(format!("bad vertex {vertex}")),
                    }
                })
                .collect()
        })
        .collect()
}

fn on_segment(lat: f64, lng: f64, y1: f64, x1: f64, y2: f64, x2: f64) -> bool {
    let cross = (x2 - x1) * (lat - y1) - (y2 - y1) * (lng - x1);
    cross.abs() <= EDGE_TOLERANCE
        && lng >= x1.min(x2)
        && lng <= x1.max(x2)
        && lat >= y1.min(y2)
        && lat <= y1.max(y2)
}

/// Counts from one matching pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchSummary {
    pub matched: usize,
    pub unmatched: usize,
}

/// Assigns suburbs to points against a fixed, ordered boundary set.
///
/// The first boundary (in load order) containing a point wins, so points on
/// a shared edge resolve deterministically.
#[derive(Debug, Clone, Default)]
pub struct BoundaryMatcher {
    boundaries: Vec<Boundary>,
    envelopes: Vec<Option<BoundingBox>>,
}

impl BoundaryMatcher {
    pub fn new(boundaries: Vec<Boundary>) -> Self {
        let envelopes = boundaries.iter().map(Boundary::bbox).collect();
        Self {
            boundaries,
            envelopes,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.boundaries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boundaries.is_empty()
    }

    pub fn boundaries(&self) -> &[Boundary] {
        &self.boundaries
    }

    /// First boundary containing the point.
    pub fn locate(&self, lat: f64, lng: f64) -> Option<&Boundary> {
        self.boundaries
            .iter()
            .zip(&self.envelopes)
            .filter(|(_, envelope)| envelope.is_some_and(|bbox| bbox.contains(lat, lng)))
            .map(|(boundary, _)| boundary)
            .find(|boundary| boundary.contains(lat, lng))
    }

    /// Write suburb and postcode onto `point`, clearing them when no boundary
    /// matches. Returns whether a boundary matched.
    pub fn assign(&self, point: &mut ParkingPoint) -> bool {
        match self.locate(point.lat, point.lng) {
            Some(boundary) => {
                point.suburb = Some(boundary.name.clone());
                point.postcode = boundary.postcode.clone();
                true
            }
            None => {
                point.suburb = None;
                point.postcode = None;
                false
            }
        }
    }

    pub fn assign_all(&self, points: &mut [ParkingPoint]) -> MatchSummary {
        let mut summary = MatchSummary::default();
        for point in points.iter_mut() {
            if self.assign(point) {
                summary.matched += 1;
            } else {
                summary.unmatched += 1;
            }
        }
        summary
    }
}
