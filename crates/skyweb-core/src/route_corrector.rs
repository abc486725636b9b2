//! Route altitude correction: departure/arrival altitude assignment and
//! synthesized CLIMB/DESC waypoints.
//!
//! Pure and deterministic. Ground elevations are resolved by the caller.

use crate::altitude::METERS_TO_FEET;
use crate::models::{CorrectedWaypoint, ImportedWaypoint, Leg, WaypointSource};
use crate::spatial::{haversine_nm, interpolate};
use serde::{Deserialize, Serialize};

/// Altitude changes below this never produce an intermediate waypoint.
pub const MIN_TRANSITION_FT: i64 = 100;

/// Imported altitudes below this are treated as unusable source elevation.
const NEAR_ZERO_IMPORT_FT: f64 = 50.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrectorConfig {
    /// Climb and descent rate in feet per minute
    pub climb_rate_fpm: f64,
    /// Ground speed in knots during the altitude change
    pub ground_speed_kt: f64,
    /// Height above ground for departure/arrival when ground is known
    pub pattern_alt_ft: f64,
    /// Departure/arrival altitude when the imported one is near zero
    pub min_alt_ft: f64,
}

impl Default for CorrectorConfig {
    fn default() -> Self {
        Self {
            climb_rate_fpm: 500.0,
            ground_speed_kt: 100.0,
            pattern_alt_ft: 1000.0,
            min_alt_ft: 1000.0,
        }
    }
}

/// Apply altitude correction and insert intermediate CLIMB/DESC waypoints.
///
/// Returns an empty list for routes with fewer than two waypoints.
pub fn correct_route(
    waypoints: &[ImportedWaypoint],
    dep_ground_ft: Option<f64>,
    arr_ground_ft: Option<f64>,
    config: &CorrectorConfig,
) -> Vec<CorrectedWaypoint> {
    if waypoints.len() < 2 {
        return Vec::new();
    }
    let base = assign_altitudes(waypoints, dep_ground_ft, arr_ground_ft, config);
    insert_intermediates(&base, config)
}

/// Legs between consecutive corrected waypoints, planned at the altitude of
/// the leg's destination (never negative).
pub fn legs_from_corrected(waypoints: &[CorrectedWaypoint]) -> Vec<Leg> {
    waypoints
        .windows(2)
        .enumerate()
        .map(|(i, pair)| Leg {
            from_seq: i + 1,
            to_seq: i + 2,
            planned_altitude_ft: pair[1].altitude_ft.max(0),
        })
        .collect()
}

fn assign_altitudes(
    waypoints: &[ImportedWaypoint],
    dep_ground_ft: Option<f64>,
    arr_ground_ft: Option<f64>,
    config: &CorrectorConfig,
) -> Vec<CorrectedWaypoint> {
    let last = waypoints.len() - 1;
    waypoints
        .iter()
        .enumerate()
        .map(|(i, wp)| {
            let imported_ft = wp.altitude_m * METERS_TO_FEET;
            let (altitude_ft, source) = if i == 0 {
                (endpoint_altitude(imported_ft, dep_ground_ft, config), WaypointSource::Departure)
            } else if i == last {
                (endpoint_altitude(imported_ft, arr_ground_ft, config), WaypointSource::Arrival)
            } else {
                (imported_ft, WaypointSource::Segment)
            };
            CorrectedWaypoint {
                name: wp.name.clone(),
                lat: wp.lat,
                lon: wp.lon,
                altitude_ft: altitude_ft.round() as i64,
                source,
                is_intermediate: false,
                original_altitude_m: wp.altitude_m,
            }
        })
        .collect()
}

fn endpoint_altitude(imported_ft: f64, ground_ft: Option<f64>, config: &CorrectorConfig) -> f64 {
    match ground_ft {
        Some(ground) => ground + config.pattern_alt_ft,
        None if imported_ft < NEAR_ZERO_IMPORT_FT => config.min_alt_ft,
        None => imported_ft,
    }
}

fn insert_intermediates(base: &[CorrectedWaypoint], config: &CorrectorConfig) -> Vec<CorrectedWaypoint> {
    let mut enhanced = Vec::with_capacity(base.len() * 2);
    for (i, wp) in base.iter().enumerate() {
        enhanced.push(wp.clone());
        let Some(next) = base.get(i + 1) else {
            continue;
        };
        let is_last_segment = i + 2 == base.len();
        // The final leg keeps cruise altitude until the descent point.
        let target_ft = if is_last_segment {
            wp.altitude_ft
        } else {
            next.altitude_ft
        };
        if let Some(intermediate) = intermediate_waypoint(wp, next, target_ft, is_last_segment, config) {
            enhanced.push(intermediate);
        }
    }
    enhanced
}

fn intermediate_waypoint(
    start: &CorrectedWaypoint,
    end: &CorrectedWaypoint,
    target_ft: i64,
    is_last_segment: bool,
    config: &CorrectorConfig,
) -> Option<CorrectedWaypoint> {
    let alt_diff = (end.altitude_ft - start.altitude_ft).abs();
    if alt_diff < MIN_TRANSITION_FT || config.climb_rate_fpm <= 0.0 {
        return None;
    }

    let time_min = alt_diff as f64 / config.climb_rate_fpm;
    let transition_nm = config.ground_speed_kt * time_min / 60.0;
    let segment_nm = haversine_nm(start.lat, start.lon, end.lat, end.lon);
    if transition_nm >= segment_nm {
        return None;
    }

    let ratio = if is_last_segment {
        1.0 - transition_nm / segment_nm
    } else {
        transition_nm / segment_nm
    };
    let (lat, lon) = interpolate(start.lat, start.lon, end.lat, end.lon, ratio);

    let climbing = end.altitude_ft > start.altitude_ft;
    let (label, source) = if climbing {
        ("CLIMB", WaypointSource::IntermediateClimb)
    } else {
        ("DESC", WaypointSource::IntermediateDescent)
    };
    let named_ft = if is_last_segment && !climbing {
        end.altitude_ft
    } else {
        target_ft
    };

    Some(CorrectedWaypoint {
        name: format!("{label}_{named_ft}"),
        lat,
        lon,
        altitude_ft: target_ft,
        source,
        is_intermediate: true,
        original_altitude_m: target_ft as f64 / METERS_TO_FEET,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wp(name: &str, lat: f64, lon: f64, altitude_ft: f64) -> ImportedWaypoint {
        ImportedWaypoint {
            name: name.to_string(),
            lat,
            lon,
            altitude_m: altitude_ft / METERS_TO_FEET,
        }
    }

    /// Two aerodromes 40 NM apart on a meridian with one interior waypoint.
    fn scenario_route() -> Vec<ImportedWaypoint> {
        // Degrees of latitude per NM on the haversine sphere.
        let nm = 180.0 / (std::f64::consts::PI * crate::spatial::EARTH_RADIUS_NM);
        vec![
            wp("DEP", 47.0, 2.0, 0.0),
            wp("MID", 47.0 + 20.0 * nm, 2.0, 3000.0),
            wp("ARR", 47.0 + 40.0 * nm, 2.0, 0.0),
        ]
    }

    #[test]
    fn scenario_forty_nm_route() {
        let route = scenario_route();
        let total = haversine_nm(route[0].lat, route[0].lon, route[2].lat, route[2].lon);
        assert!((total - 40.0).abs() < 1e-6, "route length {total}");

        let corrected = correct_route(&route, Some(200.0), Some(550.0), &CorrectorConfig::default());
        let names: Vec<&str> = corrected.iter().map(|w| w.name.as_str()).collect();
        assert_eq!(names, vec!["DEP", "CLIMB_3000", "MID", "DESC_1550", "ARR"]);

        assert_eq!(corrected[0].altitude_ft, 1200);
        assert_eq!(corrected[0].source, WaypointSource::Departure);
        assert_eq!(corrected[2].altitude_ft, 3000);
        assert_eq!(corrected[2].source, WaypointSource::Segment);
        assert_eq!(corrected[4].altitude_ft, 1550);
        assert_eq!(corrected[4].source, WaypointSource::Arrival);

        let climb = &corrected[1];
        assert!(climb.is_intermediate);
        assert_eq!(climb.source, WaypointSource::IntermediateClimb);
        let from_dep = haversine_nm(route[0].lat, route[0].lon, climb.lat, climb.lon);
        assert!((from_dep - 6.0).abs() < 0.01, "climb at {from_dep} NM");

        let desc = &corrected[3];
        assert_eq!(desc.source, WaypointSource::IntermediateDescent);
        assert_eq!(desc.altitude_ft, 3000);
        let to_arr = haversine_nm(desc.lat, desc.lon, route[2].lat, route[2].lon);
        assert!((to_arr - 4.8333).abs() < 0.01, "descent at {to_arr} NM before arrival");
    }

    #[test]
    fn near_zero_import_is_floored_without_ground() {
        let route = vec![wp("A", 47.0, 2.0, 10.0), wp("B", 47.5, 2.0, 2500.0)];
        let corrected = correct_route(&route, None, None, &CorrectorConfig::default());
        assert_eq!(corrected[0].altitude_ft, 1000);
        assert_eq!(corrected.last().map(|w| w.altitude_ft), Some(2500));
    }

    #[test]
    fn no_intermediate_below_hundred_feet() {
        let route = vec![
            wp("A", 47.0, 2.0, 2000.0),
            wp("B", 47.2, 2.0, 2099.0),
            wp("C", 47.4, 2.0, 2050.0),
        ];
        let corrected = correct_route(&route, None, None, &CorrectorConfig::default());
        assert_eq!(corrected.len(), 3);
        assert!(corrected.iter().all(|w| !w.is_intermediate));
    }

    #[test]
    fn exactly_one_intermediate_when_distance_allows() {
        // 1000 ft at 500 fpm and 100 kt needs 3.33 NM; the leg is ~30 NM.
        let route = vec![
            wp("A", 47.0, 2.0, 2000.0),
            wp("B", 47.5, 2.0, 3000.0),
            wp("C", 48.0, 2.0, 3000.0),
        ];
        let corrected = correct_route(&route, None, None, &CorrectorConfig::default());
        let intermediates: Vec<_> = corrected.iter().filter(|w| w.is_intermediate).collect();
        assert_eq!(intermediates.len(), 1);
        assert_eq!(intermediates[0].name, "CLIMB_3000");
    }

    #[test]
    fn nothing_inserted_when_leg_too_short() {
        // 0.05° ≈ 3 NM, less than the 16.7 NM a 5000 ft climb needs.
        let route = vec![
            wp("A", 47.0, 2.0, 1000.0),
            wp("B", 47.05, 2.0, 6000.0),
            wp("C", 47.5, 2.0, 6000.0),
        ];
        let corrected = correct_route(&route, None, None, &CorrectorConfig::default());
        assert!(corrected.iter().all(|w| !w.is_intermediate));
    }

    #[test]
    fn degenerate_routes_yield_nothing() {
        let config = CorrectorConfig::default();
        assert!(correct_route(&[], None, None, &config).is_empty());
        assert!(correct_route(&[wp("A", 47.0, 2.0, 1000.0)], Some(100.0), None, &config).is_empty());
    }

    #[test]
    fn legs_follow_destination_altitude() {
        let route = scenario_route();
        let corrected = correct_route(&route, Some(200.0), Some(550.0), &CorrectorConfig::default());
        let legs = legs_from_corrected(&corrected);
        assert_eq!(legs.len(), corrected.len() - 1);
        assert_eq!(legs[0], Leg { from_seq: 1, to_seq: 2, planned_altitude_ft: 3000 });
        assert_eq!(legs.last().map(|l| l.planned_altitude_ft), Some(1550));
    }
}
