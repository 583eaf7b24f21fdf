//! Occupancy statistics endpoints.

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

use kerbside_core::aggregate::OVERVIEW_GROUP;
use kerbside_core::{top_groups, GroupBy, OverviewFilter, ZoneStats};

use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct OverviewParams {
    pub zone: Option<String>,
    pub suburb: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct GroupParams {
    pub by: Option<String>,
    pub top: Option<String>,
}

/// Totals across every bay, optionally narrowed to a zone or suburb.
/// An empty selection reports zeros.
pub async fn overview(
    State(state): State<Arc<AppState>>,
    Query(params): Query<OverviewParams>,
) -> Json<ZoneStats> {
    let filter = OverviewFilter {
        zone: params.zone,
        suburb: params.suburb,
    };
    let stats = state
        .snapshot()
        .overview(&filter, state.config().rate_decimals)
        .unwrap_or_else(|| ZoneStats {
            group: OVERVIEW_GROUP.to_string(),
            total: 0,
            occupied: 0,
            available: 0,
            occupancy_rate: 0.0,
        });
    Json(stats)
}

/// Per-group statistics; `top` keeps only the largest groups.
pub async fn groups(
    State(state): State<Arc<AppState>>,
    Query(params): Query<GroupParams>,
) -> Json<Vec<ZoneStats>> {
    let group_by = params
        .by
        .as_deref()
        .and_then(GroupBy::parse)
        .unwrap_or_default();
    let stats = state
        .snapshot()
        .zone_statistics(group_by, state.config().rate_decimals);

    match params.top.as_deref().and_then(|raw| raw.trim().parse::<usize>().ok()) {
        Some(n) => Json(top_groups(&stats, n)),
        None => Json(stats),
    }
}
