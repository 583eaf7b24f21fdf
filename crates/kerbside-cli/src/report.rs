//! JSON reports printed by the `kerbside` subcommands.

use serde_json::{json, Value};

use kerbside_core::{
    top_groups, BoundingBox, GroupBy, ListingFilter, NearbyQuery, OverviewFilter, Snapshot,
};

/// Build summary plus the overall occupancy of what was indexed.
pub fn import(snapshot: &Snapshot, decimals: u32) -> Value {
    json!({
        "built_at": snapshot.built_at(),
        "points": snapshot.len(),
        "summary": snapshot.summary(),
        "overview": snapshot.overview(&OverviewFilter::default(), decimals),
    })
}

/// Nearest bays, in the same shape as the HTTP nearby response.
pub fn nearby(snapshot: &Snapshot, query: &NearbyQuery) -> anyhow::Result<Value> {
    let data = snapshot.find_nearby_with(query)?;
    Ok(json!({
        "count": data.len(),
        "data": data,
        "search_center": { "lat": query.lat, "lng": query.lng },
        "search_radius": query.effective_radius(),
    }))
}

/// Bays inside `bounds` passing `filter`. A missing or malformed box selects
/// every bay.
pub fn bounds(
    snapshot: &Snapshot,
    bounds: Option<&str>,
    filter: &ListingFilter,
    limit: usize,
    sample: bool,
) -> Value {
    let bbox = bounds.and_then(|raw| BoundingBox::parse(raw).ok());
    let points = snapshot.query_bounds(bbox.as_ref(), filter, limit, sample);
    json!({
        "filtered": bbox.is_some(),
        "count": points.len(),
        "data": points,
    })
}

/// Occupancy per group; with `top`, only the busiest groups.
pub fn stats(snapshot: &Snapshot, group_by: GroupBy, top: Option<usize>, decimals: u32) -> Value {
    let groups = snapshot.zone_statistics(group_by, decimals);
    let groups = match top {
        Some(n) => top_groups(&groups, n),
        None => groups,
    };
    json!({
        "by": group_by.as_str(),
        "groups": groups,
    })
}
