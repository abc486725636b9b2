//! Route-leg × airspace intersection queries.
//!
//! Candidates come from `airspace_spatial_indexed`, pre-filtered by bounding
//! box (through the R-tree when present) and altitude band. The exact
//! geometric tests run in Rust on the decoded multipolygons.

use super::profile::{ProfileCache, StoreProfile};
use super::services::airspace_services;
use super::QueryError;
use crate::geometry::from_geojson_str;
use crate::store::ConnectionProvider;
use futures::future::try_join_all;
use geo::{Line, MultiPolygon};
use skyweb_core::{
    classify_segment, nm_to_degrees, segment_distance, segment_intersects, segment_line,
    AirspaceIntersection, AirspaceType, BoundingBox, IntersectionType, Leg, LegAirspaces, RoutePoint,
    ServiceInfo,
};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

/// Airspace categories irrelevant to VFR route preparation (IFR-only or
/// upper-level structures).
pub const EXCLUDED_TYPES: &[&str] = &["CTL", "ACC", "UAC", "UIR", "UTA", "FRA", "LTA", "OCA"];

pub fn is_excluded_type(type_code: &str) -> bool {
    let code = type_code.trim();
    EXCLUDED_TYPES.iter().any(|t| t.eq_ignore_ascii_case(code))
}

const INDEXED_CANDIDATES: &str = "SELECT a.id, a.airspace_id, a.part_id, a.volume_id, a.name, a.type_code,
        a.airspace_class, a.floor_ft, a.ceiling_ft, a.geom_geojson
    FROM airspace_spatial_index r
    JOIN airspace_spatial_indexed a ON a.id = r.id
    WHERE r.max_lon >= ?1 AND r.min_lon <= ?2 AND r.max_lat >= ?3 AND r.min_lat <= ?4
      AND a.floor_ft <= ?5 AND a.ceiling_ft >= ?5
    ORDER BY a.id";

const SCAN_CANDIDATES: &str = "SELECT a.id, a.airspace_id, a.part_id, a.volume_id, a.name, a.type_code,
        a.airspace_class, a.floor_ft, a.ceiling_ft, a.geom_geojson
    FROM airspace_spatial_indexed a
    WHERE a.max_lon >= ?1 AND a.min_lon <= ?2 AND a.max_lat >= ?3 AND a.min_lat <= ?4
      AND a.floor_ft <= ?5 AND a.ceiling_ft >= ?5
    ORDER BY a.id";

#[derive(Debug, Clone)]
struct Candidate {
    airspace_id: i64,
    part_id: i64,
    volume_id: i64,
    name: String,
    type_code: String,
    airspace_class: Option<String>,
    floor_ft: i64,
    ceiling_ft: i64,
    geojson: String,
    area: MultiPolygon<f64>,
}

impl Candidate {
    fn into_intersection(
        self,
        intersection_type: IntersectionType,
        services: Vec<ServiceInfo>,
        with_geometry: bool,
    ) -> AirspaceIntersection {
        let geometry_geojson = if with_geometry {
            serde_json::from_str(&self.geojson).ok()
        } else {
            None
        };
        AirspaceIntersection {
            airspace_type: AirspaceType::from_code(&self.type_code),
            identifier: self.name,
            type_code: self.type_code,
            airspace_class: self.airspace_class,
            lower_limit_ft: self.floor_ft,
            upper_limit_ft: self.ceiling_ft,
            intersection_type,
            services,
            part_id: self.part_id,
            volume_id: self.volume_id,
            geometry_geojson,
        }
    }
}

/// Intersection queries over any connection provider.
///
/// The store profile is detected on the first call and cached for the
/// engine's lifetime; build a new engine when a new cycle is attached.
pub struct AirspaceQueryEngine<P> {
    provider: P,
    profile: ProfileCache,
}

impl<P: ConnectionProvider> AirspaceQueryEngine<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            profile: ProfileCache::default(),
        }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub async fn profile(&self) -> Result<StoreProfile, QueryError> {
        let mut conn = self.provider.acquire().await?;
        self.profile.get(&mut conn).await
    }

    /// Airspaces the segment touches at `altitude_ft`, classified, with
    /// services and GeoJSON geometry attached.
    ///
    /// A zero-length segment yields an empty list.
    pub async fn query_segment(
        &self,
        lat1: f64,
        lon1: f64,
        lat2: f64,
        lon2: f64,
        altitude_ft: i64,
    ) -> Result<Vec<AirspaceIntersection>, QueryError> {
        let mut conn = self.provider.acquire().await?;
        let profile = self.profile.get(&mut conn).await?;
        let Some(line) = segment_line(lat1, lon1, lat2, lon2) else {
            return Ok(Vec::new());
        };
        direct_airspaces(&mut conn, profile, &line, altitude_ft).await
    }

    /// Airspaces within `corridor_nm` of the segment that the segment itself
    /// does not touch, flagged NEARBY.
    pub async fn query_corridor(
        &self,
        lat1: f64,
        lon1: f64,
        lat2: f64,
        lon2: f64,
        altitude_ft: i64,
        corridor_nm: f64,
    ) -> Result<Vec<AirspaceIntersection>, QueryError> {
        let mut conn = self.provider.acquire().await?;
        let profile = self.profile.get(&mut conn).await?;
        let Some(line) = segment_line(lat1, lon1, lat2, lon2) else {
            return Ok(Vec::new());
        };
        corridor_airspaces(&mut conn, profile, &line, altitude_ft, corridor_nm).await
    }

    /// Direct and corridor airspaces for every leg.
    ///
    /// `waypoints` are addressed by 1-based sequence number. Legs run
    /// concurrently, each on its own connection; the output keeps leg order.
    pub async fn analyze_route(
        &self,
        waypoints: &[RoutePoint],
        legs: &[Leg],
        corridor_nm: f64,
    ) -> Result<Vec<LegAirspaces>, QueryError> {
        let resolved = legs
            .iter()
            .map(|leg| {
                let from = waypoint(waypoints, leg, leg.from_seq)?;
                let to = waypoint(waypoints, leg, leg.to_seq)?;
                Ok((leg, from, to))
            })
            .collect::<Result<Vec<_>, QueryError>>()?;

        debug!("Analyzing {} legs (corridor {} NM)", resolved.len(), corridor_nm);
        try_join_all(
            resolved
                .into_iter()
                .map(|(leg, from, to)| self.analyze_leg(leg, from, to, corridor_nm)),
        )
        .await
    }

    async fn analyze_leg(
        &self,
        leg: &Leg,
        from: &RoutePoint,
        to: &RoutePoint,
        corridor_nm: f64,
    ) -> Result<LegAirspaces, QueryError> {
        let mut conn = self.provider.acquire().await?;
        let profile = self.profile.get(&mut conn).await?;

        let (route_airspaces, corridor) = match segment_line(from.lat, from.lon, to.lat, to.lon) {
            Some(line) => {
                let direct = direct_airspaces(&mut conn, profile, &line, leg.planned_altitude_ft).await?;
                let corridor =
                    corridor_airspaces(&mut conn, profile, &line, leg.planned_altitude_ft, corridor_nm).await?;
                (direct, corridor)
            }
            None => (Vec::new(), Vec::new()),
        };

        let direct_names: HashSet<&str> = route_airspaces.iter().map(|a| a.identifier.as_str()).collect();
        let corridor_airspaces = corridor
            .into_iter()
            .filter(|a| !direct_names.contains(a.identifier.as_str()))
            .collect();

        Ok(LegAirspaces {
            from_waypoint: from.name.clone(),
            to_waypoint: to.name.clone(),
            from_seq: leg.from_seq,
            to_seq: leg.to_seq,
            planned_altitude_ft: leg.planned_altitude_ft,
            route_airspaces,
            corridor_airspaces,
        })
    }
}

fn waypoint<'a>(waypoints: &'a [RoutePoint], leg: &Leg, seq: usize) -> Result<&'a RoutePoint, QueryError> {
    seq.checked_sub(1)
        .and_then(|index| waypoints.get(index))
        .ok_or(QueryError::InvalidLeg {
            from_seq: leg.from_seq,
            to_seq: leg.to_seq,
            seq,
        })
}

async fn direct_airspaces(
    conn: &mut SqliteConnection,
    profile: StoreProfile,
    line: &Line<f64>,
    altitude_ft: i64,
) -> Result<Vec<AirspaceIntersection>, QueryError> {
    let bbox = BoundingBox::from_segment(line.start.y, line.start.x, line.end.y, line.end.x);
    let candidates = fetch_candidates(conn, profile, bbox, altitude_ft).await?;

    let mut services_by_airspace: HashMap<i64, Vec<ServiceInfo>> = HashMap::new();
    let mut results = Vec::new();
    for candidate in candidates {
        if !segment_intersects(line, &candidate.area) {
            continue;
        }
        let intersection_type = classify_segment(line, &candidate.area);
        let services = match services_by_airspace.get(&candidate.airspace_id) {
            Some(services) => services.clone(),
            None => {
                let services = airspace_services(
                    conn,
                    profile.variant,
                    candidate.airspace_id,
                    &candidate.name,
                    &candidate.type_code,
                )
                .await?;
                services_by_airspace.insert(candidate.airspace_id, services.clone());
                services
            }
        };
        results.push(candidate.into_intersection(intersection_type, services, true));
    }
    Ok(results)
}

async fn corridor_airspaces(
    conn: &mut SqliteConnection,
    profile: StoreProfile,
    line: &Line<f64>,
    altitude_ft: i64,
    corridor_nm: f64,
) -> Result<Vec<AirspaceIntersection>, QueryError> {
    let corridor_deg = nm_to_degrees(corridor_nm.max(0.0));
    let bbox = BoundingBox::from_segment(line.start.y, line.start.x, line.end.y, line.end.x).expand(corridor_deg);
    let candidates = fetch_candidates(conn, profile, bbox, altitude_ft).await?;

    Ok(candidates
        .into_iter()
        .filter(|c| !segment_intersects(line, &c.area) && segment_distance(line, &c.area) <= corridor_deg)
        .map(|c| c.into_intersection(IntersectionType::Nearby, Vec::new(), false))
        .collect())
}

/// Bounding-box and altitude pre-filter, excluded categories dropped.
async fn fetch_candidates(
    conn: &mut SqliteConnection,
    profile: StoreProfile,
    bbox: BoundingBox,
    altitude_ft: i64,
) -> Result<Vec<Candidate>, QueryError> {
    let sql = if profile.spatial_index {
        INDEXED_CANDIDATES
    } else {
        SCAN_CANDIDATES
    };
    let rows = sqlx::query(sql)
        .bind(bbox.lon_min)
        .bind(bbox.lon_max)
        .bind(bbox.lat_min)
        .bind(bbox.lat_max)
        .bind(altitude_ft)
        .fetch_all(&mut *conn)
        .await?;

    let mut candidates = Vec::with_capacity(rows.len());
    for row in &rows {
        if let Some(candidate) = decode_candidate(row)? {
            candidates.push(candidate);
        }
    }
    Ok(candidates)
}

fn decode_candidate(row: &SqliteRow) -> Result<Option<Candidate>, QueryError> {
    let type_code: String = row.try_get("type_code")?;
    if is_excluded_type(&type_code) {
        return Ok(None);
    }
    let id: i64 = row.try_get("id")?;
    let geojson: String = row.try_get("geom_geojson")?;
    let area = match from_geojson_str(&geojson) {
        Ok(area) => area,
        Err(e) => {
            warn!("Skipping airspace row {} with unreadable geometry: {}", id, e);
            return Ok(None);
        }
    };
    Ok(Some(Candidate {
        airspace_id: row.try_get("airspace_id")?,
        part_id: row.try_get("part_id")?,
        volume_id: row.try_get("volume_id")?,
        name: row.try_get("name")?,
        type_code,
        airspace_class: row.try_get("airspace_class")?,
        floor_ft: row.try_get("floor_ft")?,
        ceiling_ft: row.try_get("ceiling_ft")?,
        geojson,
        area,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn excluded_types_are_case_insensitive() {
        assert!(is_excluded_type("LTA"));
        assert!(is_excluded_type(" uir "));
        assert!(!is_excluded_type("TMA"));
        assert!(!is_excluded_type("CTR"));
    }

    #[test]
    fn leg_sequence_is_one_based() {
        let points = vec![
            RoutePoint { name: "A".into(), lat: 48.0, lon: 2.0 },
            RoutePoint { name: "B".into(), lat: 48.5, lon: 2.0 },
        ];
        let leg = Leg { from_seq: 1, to_seq: 2, planned_altitude_ft: 2500 };
        assert_eq!(waypoint(&points, &leg, 1).unwrap().name, "A");
        assert_eq!(waypoint(&points, &leg, 2).unwrap().name, "B");
        assert!(matches!(
            waypoint(&points, &leg, 0),
            Err(QueryError::InvalidLeg { seq: 0, .. })
        ));
        assert!(matches!(
            waypoint(&points, &leg, 3),
            Err(QueryError::InvalidLeg { seq: 3, .. })
        ));
    }
}
