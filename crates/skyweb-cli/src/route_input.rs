//! Waypoint files handed over by the route import collaborator.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use skyweb_core::ImportedWaypoint;
use std::path::Path;

/// Either a bare waypoint array or an object wrapping one.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum RouteFile {
    Bare(Vec<ImportedWaypoint>),
    Wrapped { waypoints: Vec<ImportedWaypoint> },
}

impl RouteFile {
    pub fn into_waypoints(self) -> Vec<ImportedWaypoint> {
        match self {
            Self::Bare(waypoints) | Self::Wrapped { waypoints } => waypoints,
        }
    }
}

/// Read and validate a waypoint file.
pub fn load_waypoints(path: &Path) -> Result<Vec<ImportedWaypoint>> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let waypoints = serde_json::from_str::<RouteFile>(&raw)
        .with_context(|| format!("parsing waypoints in {}", path.display()))?
        .into_waypoints();

    for wp in &waypoints {
        if !(-90.0..=90.0).contains(&wp.lat) || !(-180.0..=180.0).contains(&wp.lon) {
            bail!("waypoint {} has out-of-range position ({}, {})", wp.name, wp.lat, wp.lon);
        }
    }
    Ok(waypoints)
}
