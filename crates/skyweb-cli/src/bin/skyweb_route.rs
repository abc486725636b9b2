//! Route preparation: altitude correction and per-leg airspace analysis.
//!
//! Reads a JSON waypoint file, corrects departure/arrival altitudes,
//! inserts CLIMB/DESC points and, when a reference store is available,
//! prints the airspaces and nearby aerodromes along every leg.
//!
//! Usage:
//!   cargo run -p skyweb-cli --bin skyweb-route -- route.json --db data/skyweb_2401.db

use anyhow::Result;
use clap::Parser;
use serde::Serialize;
use skyweb_cli::{init_tracing, load_waypoints};
use skyweb_core::{correct_route, legs_from_corrected, AerodromeInfo, CorrectedWaypoint, CorrectorConfig, LegAirspaces};
use skyweb_refdb::query::DEFAULT_ROUTE_BUFFER_NM;
use skyweb_refdb::{AerodromeQuery, AirspaceQueryEngine, Config, ReferenceStore};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about = "Correct a VFR route and list the airspaces along it")]
struct Args {
    /// JSON waypoint file (array, or object with a "waypoints" array)
    waypoints: PathBuf,

    /// Departure ground elevation in feet
    #[arg(long)]
    dep_ground_ft: Option<f64>,

    /// Arrival ground elevation in feet
    #[arg(long)]
    arr_ground_ft: Option<f64>,

    /// Reference store (defaults to SKYWEB_DB_PATH)
    #[arg(long)]
    db: Option<PathBuf>,

    /// Corridor half-width in NM (defaults to SKYWEB_CORRIDOR_NM)
    #[arg(long)]
    corridor_nm: Option<f64>,

    /// Aerodrome search half-width in NM
    #[arg(long, default_value_t = DEFAULT_ROUTE_BUFFER_NM)]
    aerodrome_buffer_nm: f64,

    #[arg(long, default_value_t = 500.0)]
    climb_rate_fpm: f64,

    #[arg(long, default_value_t = 100.0)]
    ground_speed_kt: f64,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Serialize)]
struct RouteReport {
    waypoints: Vec<CorrectedWaypoint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    legs: Option<Vec<LegAirspaces>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    nearby_aerodromes: Option<Vec<AerodromeInfo>>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose)?;
    let config = Config::from_env();

    let imported = load_waypoints(&args.waypoints)?;
    let corrector = CorrectorConfig {
        climb_rate_fpm: args.climb_rate_fpm,
        ground_speed_kt: args.ground_speed_kt,
        ..CorrectorConfig::default()
    };
    let corrected = correct_route(&imported, args.dep_ground_ft, args.arr_ground_ft, &corrector);
    info!("Corrected route: {} waypoints ({} imported)", corrected.len(), imported.len());

    let mut report = RouteReport {
        waypoints: corrected,
        legs: None,
        nearby_aerodromes: None,
    };

    match args.db.or(config.db_path) {
        Some(db) => {
            let store = Arc::new(ReferenceStore::open(db));
            let points: Vec<_> = report.waypoints.iter().map(CorrectedWaypoint::to_route_point).collect();
            let legs = legs_from_corrected(&report.waypoints);

            let engine = AirspaceQueryEngine::new(store.clone());
            let corridor_nm = args.corridor_nm.unwrap_or(config.corridor_nm);
            report.legs = Some(engine.analyze_route(&points, &legs, corridor_nm).await?);

            let endpoints: Vec<&str> = [imported.first(), imported.last()]
                .into_iter()
                .flatten()
                .map(|wp| wp.name.as_str())
                .collect();
            let aerodromes = AerodromeQuery::new(store);
            report.nearby_aerodromes = Some(
                aerodromes
                    .search_near_route(&points, args.aerodrome_buffer_nm, &endpoints)
                    .await?,
            );
        }
        None => warn!("No reference store given; skipping airspace analysis"),
    }

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
