//! Occupancy statistics grouped by zone, suburb or street.

use std::cmp::Ordering;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::models::{BayStatus, ParkingPoint};

/// Group for points with no grouping key.
pub const UNKNOWN_GROUP: &str = "Unknown";
/// Group name used by the all-points overview.
pub const OVERVIEW_GROUP: &str = "All";
pub const DEFAULT_RATE_DECIMALS: u32 = 1;

/// Field that points are grouped by.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupBy {
    #[default]
    Zone,
    Suburb,
    Street,
}

impl GroupBy {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "zone" | "zone_number" => Some(Self::Zone),
            "suburb" => Some(Self::Suburb),
            "street" | "road" => Some(Self::Street),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Zone => "zone",
            Self::Suburb => "suburb",
            Self::Street => "street",
        }
    }

    fn key(self, point: &ParkingPoint) -> Option<&str> {
        let key = match self {
            Self::Zone => point.zone.as_deref(),
            Self::Suburb => point.suburb.as_deref(),
            Self::Street => point.street.as_deref(),
        };
        key.filter(|value| !value.trim().is_empty())
    }
}

/// Occupancy counts for one group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneStats {
    pub group: String,
    pub total: usize,
    pub occupied: usize,
    pub available: usize,
    /// Percentage of bays occupied, 0-100
    pub occupancy_rate: f64,
}

#[derive(Debug, Clone, Copy, Default)]
struct Tally {
    total: usize,
    occupied: usize,
    available: usize,
}

impl Tally {
    fn add(&mut self, status: BayStatus) {
        self.total += 1;
        match status {
            BayStatus::Occupied => self.occupied += 1,
            BayStatus::Unoccupied => self.available += 1,
            BayStatus::Unknown => {}
        }
    }

    fn into_stats(self, group: String, decimals: u32) -> ZoneStats {
        ZoneStats {
            group,
            total: self.total,
            occupied: self.occupied,
            available: self.available,
            occupancy_rate: occupancy_rate(self.occupied, self.total, decimals),
        }
    }
}

/// `occupied / total * 100`, rounded to 1 or 2 decimals. Zero when `total` is zero.
pub fn occupancy_rate(occupied: usize, total: usize, decimals: u32) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let factor = 10f64.powi(decimals.clamp(1, 2) as i32);
    let rate = occupied as f64 / total as f64 * 100.0;
    (rate * factor).round() / factor
}

/// Per-group statistics, ordered by group name with "Unknown" last.
pub fn zone_statistics<'a, I>(points: I, group_by: GroupBy, decimals: u32) -> Vec<ZoneStats>
where
    I: IntoIterator<Item = &'a ParkingPoint>,
{
    let mut tallies: HashMap<&'a str, Tally> = HashMap::new();
    for point in points {
        let key = group_by.key(point).unwrap_or(UNKNOWN_GROUP);
        tallies.entry(key).or_default().add(point.status);
    }

    let mut stats: Vec<ZoneStats> = tallies
        .into_iter()
        .filter(|(_, tally)| tally.total > 0)
        .map(|(group, tally)| tally.into_stats(group.to_string(), decimals))
        .collect();
    stats.sort_by(|a, b| compare_group_names(&a.group, &b.group));
    stats
}

/// The `n` groups with the most bays; ties broken by group name.
pub fn top_groups(stats: &[ZoneStats], n: usize) -> Vec<ZoneStats> {
    let mut ranked = stats.to_vec();
    ranked.sort_by(|a, b| {
        b.total
            .cmp(&a.total)
            .then_with(|| compare_group_names(&a.group, &b.group))
    });
    ranked.truncate(n);
    ranked
}

/// Filter for the all-points overview.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverviewFilter {
    /// Exact zone number
    pub zone: Option<String>,
    /// Case-insensitive suburb substring
    pub suburb: Option<String>,
}

impl OverviewFilter {
    pub fn matches(&self, point: &ParkingPoint) -> bool {
        let zone_ok = match self.zone.as_deref().map(str::trim) {
            Some(zone) if !zone.is_empty() => point.zone.as_deref() == Some(zone),
            _ => true,
        };
        let suburb_ok = match self.suburb.as_deref().map(str::trim) {
            Some(needle) if !needle.is_empty() => point
                .suburb
                .as_deref()
                .is_some_and(|suburb| suburb.to_lowercase().contains(&needle.to_lowercase())),
            _ => true,
        };
        zone_ok && suburb_ok
    }
}

/// One "All" group over the points passing `filter`, or `None` if none do.
pub fn overview<'a, I>(points: I, filter: &OverviewFilter, decimals: u32) -> Option<ZoneStats>
where
    I: IntoIterator<Item = &'a ParkingPoint>,
{
    let mut tally = Tally::default();
    for point in points.into_iter().filter(|point| filter.matches(point)) {
        tally.add(point.status);
    }
    (tally.total > 0).then(|| tally.into_stats(OVERVIEW_GROUP.to_string(), decimals))
}

/// Numeric-aware group ordering: "2" before "10", names compared
/// case-insensitively, "Unknown" always last.
fn compare_group_names(a: &str, b: &str) -> Ordering {
    match (a == UNKNOWN_GROUP, b == UNKNOWN_GROUP) {
        (true, true) => return Ordering::Equal,
        (true, false) => return Ordering::Greater,
        (false, true) => return Ordering::Less,
        (false, false) => {}
    }

    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y).then_with(|| a.cmp(b)),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a
            .to_lowercase()
            .cmp(&b.to_lowercase())
            .then_with(|| a.cmp(b)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenario() -> Vec<ParkingPoint> {
        vec![
            ParkingPoint::new("a", -37.8136, 144.9631, BayStatus::Unoccupied),
            ParkingPoint::new("b", -37.8140, 144.9635, BayStatus::Occupied),
            ParkingPoint::new("c", -37.9000, 145.1000, BayStatus::Occupied),
        ]
    }

    fn zoned(id: &str, zone: &str, status: BayStatus) -> ParkingPoint {
        ParkingPoint::new(id, -37.81, 144.96, status).with_zone(zone)
    }

    #[test]
    fn missing_zones_fall_into_unknown() {
        let stats = zone_statistics(&scenario(), GroupBy::Zone, DEFAULT_RATE_DECIMALS);
        assert_eq!(
            stats,
            vec![ZoneStats {
                group: "Unknown".to_string(),
                total: 3,
                occupied: 2,
                available: 1,
                occupancy_rate: 66.7,
            }]
        );
    }

    #[test]
    fn rate_honours_decimals() {
        assert_eq!(occupancy_rate(2, 3, 1), 66.7);
        assert_eq!(occupancy_rate(2, 3, 2), 66.67);
        assert_eq!(occupancy_rate(0, 0, 1), 0.0);
        assert_eq!(occupancy_rate(5, 5, 1), 100.0);
    }

    #[test]
    fn counts_stay_consistent() {
        let points = vec![
            zoned("1", "7301", BayStatus::Occupied),
            zoned("2", "7301", BayStatus::Unknown),
            zoned("3", "7302", BayStatus::Unoccupied),
            ParkingPoint::new("4", -37.8, 144.9, BayStatus::Occupied),
        ];
        for stat in zone_statistics(&points, GroupBy::Zone, 2) {
            assert!(stat.occupied + stat.available <= stat.total);
            assert!((0.0..=100.0).contains(&stat.occupancy_rate));
        }
    }

    #[test]
    fn groups_sort_numerically_with_unknown_last() {
        let points = vec![
            zoned("1", "10", BayStatus::Occupied),
            ParkingPoint::new("2", -37.8, 144.9, BayStatus::Occupied),
            zoned("3", "2", BayStatus::Occupied),
            zoned("4", "Loading", BayStatus::Occupied),
        ];
        let groups: Vec<String> = zone_statistics(&points, GroupBy::Zone, 1)
            .into_iter()
            .map(|stat| stat.group)
            .collect();
        assert_eq!(groups, vec!["2", "10", "Loading", "Unknown"]);
    }

    #[test]
    fn top_groups_rank_by_total_then_name() {
        let points = vec![
            zoned("1", "B", BayStatus::Occupied),
            zoned("2", "B", BayStatus::Occupied),
            zoned("3", "A", BayStatus::Occupied),
            zoned("4", "C", BayStatus::Occupied),
            zoned("5", "C", BayStatus::Unoccupied),
            zoned("6", "D", BayStatus::Occupied),
        ];
        let stats = zone_statistics(&points, GroupBy::Zone, 1);
        let top: Vec<(String, usize)> = top_groups(&stats, 3)
            .into_iter()
            .map(|stat| (stat.group, stat.total))
            .collect();
        assert_eq!(
            top,
            vec![("B".to_string(), 2), ("C".to_string(), 2), ("A".to_string(), 1)]
        );
    }

    #[test]
    fn group_by_suburb_and_street() {
        let mut points = scenario();
        points[0].suburb = Some("Melbourne".to_string());
        points[1].street = Some("Swanston St".to_string());

        let suburbs = zone_statistics(&points, GroupBy::Suburb, 1);
        assert_eq!(suburbs[0].group, "Melbourne");
        assert_eq!(suburbs[1].group, UNKNOWN_GROUP);
        assert_eq!(suburbs[1].total, 2);

        let streets = zone_statistics(&points, GroupBy::Street, 1);
        assert_eq!(streets[0].group, "Swanston St");
        assert_eq!(GroupBy::parse("STREET"), Some(GroupBy::Street));
        assert_eq!(GroupBy::parse("postcode"), None);
    }

    #[test]
    fn overview_filters_by_zone_and_suburb() {
        let mut points = vec![
            zoned("1", "7301", BayStatus::Occupied),
            zoned("2", "7301", BayStatus::Unoccupied),
            zoned("3", "7302", BayStatus::Occupied),
        ];
        points[0].suburb = Some("North Melbourne".to_string());
        points[2].suburb = Some("Carlton".to_string());

        let all = overview(&points, &OverviewFilter::default(), 1).unwrap();
        assert_eq!(all.group, OVERVIEW_GROUP);
        assert_eq!((all.total, all.occupied, all.available), (3, 2, 1));

        let zone = OverviewFilter {
            zone: Some("7301".to_string()),
            suburb: None,
        };
        assert_eq!(overview(&points, &zone, 1).unwrap().total, 2);

        let suburb = OverviewFilter {
            zone: None,
            suburb: Some("melb".to_string()),
        };
        let stats = overview(&points, &suburb, 1).unwrap();
        assert_eq!((stats.total, stats.occupancy_rate), (1, 100.0));

        let nothing = OverviewFilter {
            zone: Some("9999".to_string()),
            suburb: None,
        };
        assert!(overview(&points, &nothing, 1).is_none());
    }
}
