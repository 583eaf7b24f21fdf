//! Query a saved parking feed dump without running the server.
//!
//! Example:
//!   kerbside --records bays.json --boundaries suburbs.geojson nearby --lat -37.8136 --lng 144.9631

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use kerbside_cli::{load_snapshot, report};
use chrono::Utc;
use kerbside_core::{GridConfig, GroupBy, ListingFilter, NearbyQuery, OverviewFilter, StatusFilter};

/// Field to group occupancy statistics by
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Grouping {
    /// Parking zone number
    Zone,
    /// Matched suburb
    Suburb,
    /// Road segment description
    Street,
}

impl From<Grouping> for GroupBy {
    fn from(grouping: Grouping) -> Self {
        match grouping {
            Grouping::Zone => GroupBy::Zone,
            Grouping::Suburb => GroupBy::Suburb,
            Grouping::Street => GroupBy::Street,
        }
    }
}

/// Offline parking bay queries
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Bay records: a JSON array or a feed page with a `results` array
    #[arg(long)]
    records: PathBuf,

    /// Suburb boundaries as a GeoJSON FeatureCollection
    #[arg(long)]
    boundaries: Option<PathBuf>,

    /// Grid cell size in degrees (derived from the data when omitted)
    #[arg(long)]
    cell_size: Option<f64>,

    /// Decimal places for occupancy rates (1 or 2)
    #[arg(long, default_value_t = 1)]
    rate_decimals: u32,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build the snapshot and print the build summary
    Import,

    /// Bays nearest to a point
    Nearby {
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,

        #[arg(long, allow_hyphen_values = true)]
        lng: f64,

        /// Search radius in meters
        #[arg(long, default_value_t = 500.0)]
        radius: f64,

        /// Maximum number of results
        #[arg(long, default_value_t = 20)]
        limit: usize,

        /// all, available or occupied
        #[arg(long, default_value = "all")]
        status: String,
    },

    /// Bays inside a viewport
    Bounds {
        /// min_lat,min_lng,max_lat,max_lng
        #[arg(long, allow_hyphen_values = true)]
        bounds: Option<String>,

        #[arg(long, default_value_t = 1000)]
        limit: usize,

        /// Spread a capped result across the viewport
        #[arg(long)]
        sample: bool,

        /// all, available or occupied
        #[arg(long, default_value = "all")]
        status: String,

        #[arg(long)]
        zone: Option<String>,

        /// Case-insensitive suburb substring
        #[arg(long)]
        suburb: Option<String>,

        /// Leave out bays not reported within this many hours
        #[arg(long)]
        active_hours: Option<u64>,
    },

    /// Occupancy statistics per group
    Stats {
        #[arg(long, value_enum, default_value = "zone")]
        by: Grouping,

        /// Only the N groups with the most bays
        #[arg(long)]
        top: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let grid = GridConfig {
        cell_size_deg: args.cell_size,
        ..GridConfig::default()
    };
    let snapshot = load_snapshot(&args.records, args.boundaries.as_deref(), &grid).await?;
    let decimals = args.rate_decimals;

    let output = match args.command {
        Command::Import => report::import(&snapshot, decimals),
        Command::Nearby {
            lat,
            lng,
            radius,
            limit,
            status,
        } => {
            let status = StatusFilter::parse(&status)
                .with_context(|| format!("Unknown status filter '{status}'"))?;
            let query = NearbyQuery::new(lat, lng).radius(radius).limit(limit).status(status);
            report::nearby(&snapshot, &query)?
        }
        Command::Bounds {
            bounds,
            limit,
            sample,
            status,
            zone,
            suburb,
            active_hours,
        } => {
            let status = StatusFilter::parse(&status)
                .with_context(|| format!("Unknown status filter '{status}'"))?;
            let filter = ListingFilter {
                status,
                area: OverviewFilter { zone, suburb },
                updated_since: None,
            }
            .active_within(active_hours.unwrap_or(0), Utc::now());
            report::bounds(&snapshot, bounds.as_deref(), &filter, limit, sample)
        }
        Command::Stats { by, top } => report::stats(&snapshot, by.into(), top, decimals),
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
