//! Parking bay query endpoints.
//!
//! Optional parameters are taken as raw strings so that a malformed value
//! falls back to its default instead of rejecting the request.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::str::FromStr;
use std::sync::Arc;

use kerbside_core::{
    BoundingBox, ListingFilter, NearbyPoint, NearbyQuery, OverviewFilter, ParkingPoint, StatusFilter,
};

use crate::api::request_id::RequestId;
use crate::api::{request_error, ApiError};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct NearbyParams {
    pub lat: Option<String>,
    pub lng: Option<String>,
    pub radius: Option<String>,
    pub limit: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SearchCenter {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Serialize)]
pub struct NearbyResponse {
    pub data: Vec<NearbyPoint>,
    pub search_center: SearchCenter,
    pub search_radius: f64,
    pub count: usize,
}

#[derive(Debug, Default, Deserialize)]
pub struct BoundsParams {
    pub bounds: Option<String>,
    pub limit: Option<String>,
    pub sample: Option<String>,
    pub status: Option<String>,
    pub zone: Option<String>,
    pub suburb: Option<String>,
    /// Staleness cutoff in hours; 0 disables it
    pub active_hours: Option<String>,
}

fn parse_param<T: FromStr>(raw: Option<&str>) -> Option<T> {
    raw.and_then(|value| value.trim().parse().ok())
}

fn parse_status(raw: Option<&str>) -> StatusFilter {
    raw.and_then(StatusFilter::parse).unwrap_or_default()
}

fn parse_flag(raw: Option<&str>) -> bool {
    matches!(
        raw.map(|value| value.trim().to_ascii_lowercase()).as_deref(),
        Some("true" | "1" | "yes")
    )
}

/// Bays near a point, nearest first.
pub async fn nearby(
    State(state): State<Arc<AppState>>,
    request_id: Option<Extension<RequestId>>,
    Query(params): Query<NearbyParams>,
) -> Result<Json<NearbyResponse>, ApiError> {
    let (Some(lat), Some(lng)) = (
        parse_param::<f64>(params.lat.as_deref()),
        parse_param::<f64>(params.lng.as_deref()),
    ) else {
        return Err(request_error(
            StatusCode::BAD_REQUEST,
            "lat and lng are required numeric parameters",
            request_id.as_deref(),
        ));
    };

    let mut query = NearbyQuery::new(lat, lng)
        .limit(parse_param(params.limit.as_deref()).unwrap_or(state.config().nearby_limit))
        .status(parse_status(params.status.as_deref()));
    if let Some(radius) = parse_param::<f64>(params.radius.as_deref()) {
        query = query.radius(radius);
    }

    let snapshot = state.snapshot();
    let data = snapshot
        .find_nearby_with(&query)
        .map_err(|err| {
            request_error(StatusCode::BAD_REQUEST, err.to_string(), request_id.as_deref())
        })?;

    Ok(Json(NearbyResponse {
        count: data.len(),
        data,
        search_center: SearchCenter { lat, lng },
        search_radius: query.effective_radius(),
    }))
}

fn bounded_points(state: &AppState, params: &BoundsParams) -> Vec<ParkingPoint> {
    let bbox = params
        .bounds
        .as_deref()
        .and_then(|raw| match BoundingBox::parse(raw) {
            Ok(bbox) => Some(bbox),
            Err(err) => {
                tracing::debug!("Ignoring bounds filter: {}", err);
                None
            }
        });
    let limit = parse_param(params.limit.as_deref()).unwrap_or(state.config().bounds_limit);
    let sample = parse_flag(params.sample.as_deref());
    let active_hours =
        parse_param(params.active_hours.as_deref()).unwrap_or(state.config().active_hours);
    let filter = ListingFilter {
        status: parse_status(params.status.as_deref()),
        area: OverviewFilter {
            zone: params.zone.clone(),
            suburb: params.suburb.clone(),
        },
        updated_since: None,
    }
    .active_within(active_hours, Utc::now());

    let snapshot = state.snapshot();
    let points = snapshot
        .query_bounds(bbox.as_ref(), &filter, limit, sample)
        .into_iter()
        .cloned()
        .collect();
    points
}

/// Bays inside a viewport, narrowed by status, zone, suburb and staleness.
/// A malformed `bounds` value disables the spatial filter.
pub async fn in_bounds(
    State(state): State<Arc<AppState>>,
    Query(params): Query<BoundsParams>,
) -> Json<Vec<ParkingPoint>> {
    Json(bounded_points(&state, &params))
}

/// Same selection as [`in_bounds`], as a GeoJSON `FeatureCollection`.
pub async fn geojson(
    State(state): State<Arc<AppState>>,
    Query(params): Query<BoundsParams>,
) -> Json<Value> {
    let features: Vec<Value> = bounded_points(&state, &params)
        .into_iter()
        .map(|point| {
            json!({
                "type": "Feature",
                "geometry": {
                    "type": "Point",
                    "coordinates": [point.lng, point.lat]
                },
                "properties": {
                    "id": point.id,
                    "status": point.status,
                    "zone": point.zone,
                    "street": point.street,
                    "suburb": point.suburb,
                    "postcode": point.postcode,
                    "last_updated": point.last_updated,
                }
            })
        })
        .collect();

    Json(json!({
        "type": "FeatureCollection",
        "features": features,
    }))
}

/// One bay by kerbside id.
pub async fn get_bay(
    State(state): State<Arc<AppState>>,
    request_id: Option<Extension<RequestId>>,
    Path(id): Path<String>,
) -> Result<Json<ParkingPoint>, ApiError> {
    state.snapshot().get(&id).cloned().map(Json).ok_or_else(|| {
        request_error(
            StatusCode::NOT_FOUND,
            format!("bay {id} not found"),
            request_id.as_deref(),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_numbers_are_ignored() {
        assert_eq!(parse_param::<f64>(Some(" 12.5 ")), Some(12.5));
        assert_eq!(parse_param::<f64>(Some("abc")), None);
        assert_eq!(parse_param::<usize>(Some("-3")), None);
        assert_eq!(parse_param::<usize>(None), None);
    }

    #[test]
    fn sample_flag_accepts_common_truthy_values() {
        assert!(parse_flag(Some("true")));
        assert!(parse_flag(Some("1")));
        assert!(parse_flag(Some("YES")));
        assert!(!parse_flag(Some("no")));
        assert!(!parse_flag(None));
    }
}
