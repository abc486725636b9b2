//! SkyWeb CLI - command line tools for the reference data pipeline.
//!
//! This crate provides two binaries:
//! - skyweb-etl: SIA XML export → reference store → map tiles
//! - skyweb-route: route altitude correction and per-leg airspace analysis

pub mod logging;
pub mod route_input;

pub use logging::init_tracing;
pub use route_input::{load_waypoints, RouteFile};
