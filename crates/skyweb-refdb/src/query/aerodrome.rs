//! Aerodrome lookups: by ICAO code, by bounding box and along a route.

use super::profile::{ProfileCache, SchemaVariant};
use super::services::aerodrome_services;
use super::QueryError;
use crate::store::ConnectionProvider;
use skyweb_core::spatial::NM_PER_DEGREE;
use skyweb_core::{haversine_nm, AerodromeInfo, AerodromeStatus, RoutePoint, RunwayInfo};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use std::collections::HashSet;

/// Default search half-width around a route.
pub const DEFAULT_ROUTE_BUFFER_NM: f64 = 15.0;

const CURRENT_AERODROME: &str = "SELECT id, icao, name, status, lat, lon, elevation_ft, mag_variation
    FROM aerodrome";

const LEGACY_AERODROME: &str = "SELECT pk AS id, CAST(AdCode AS TEXT) AS icao,
        CAST(COALESCE(AdNomComplet, '') AS TEXT) AS name, CAST(AdStatut AS TEXT) AS status,
        CAST(ArpLat AS REAL) AS lat, CAST(ArpLong AS REAL) AS lon,
        CAST(AdRefAltFt AS REAL) AS elevation_ft, CAST(AdMagVar AS REAL) AS mag_variation
    FROM Ad";

const CURRENT_RUNWAYS: &str = "SELECT designator, length_m, width_m, is_main, surface,
        threshold1_lat, threshold1_lon, lda1_m, threshold2_lat, threshold2_lon, lda2_m
    FROM runway WHERE aerodrome_id = ? ORDER BY is_main DESC, id";

const LEGACY_RUNWAYS: &str = "SELECT CAST(Rwy AS TEXT) AS designator, CAST(Longueur AS REAL) AS length_m,
        CAST(Largeur AS REAL) AS width_m, CAST(COALESCE(Principale, 0) AS INTEGER) AS is_main,
        CAST(Revetement AS TEXT) AS surface, CAST(Lda1 AS REAL) AS lda1_m, CAST(Lda2 AS REAL) AS lda2_m,
        NULL AS threshold1_lat, NULL AS threshold1_lon, NULL AS threshold2_lat, NULL AS threshold2_lon
    FROM Rwy WHERE Ad_pk = ? ORDER BY is_main DESC, pk";

pub struct AerodromeQuery<P> {
    provider: P,
    profile: ProfileCache,
}

impl<P: ConnectionProvider> AerodromeQuery<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            profile: ProfileCache::default(),
        }
    }

    /// Full record (runways and services included) for one ICAO code.
    pub async fn get_by_icao(&self, icao: &str) -> Result<Option<AerodromeInfo>, QueryError> {
        let mut conn = self.provider.acquire().await?;
        let variant = self.profile.get(&mut conn).await?.variant;

        let (base, column) = match variant {
            SchemaVariant::Current => (CURRENT_AERODROME, "icao"),
            SchemaVariant::Legacy => (LEGACY_AERODROME, "AdCode"),
        };
        let sql = format!("{base} WHERE UPPER({column}) = ?");
        let row = sqlx::query(&sql)
            .bind(icao.trim().to_uppercase())
            .fetch_optional(&mut conn)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let Some((id, mut info)) = decode_aerodrome(&row)? else {
            return Ok(None);
        };
        info.runways = runways(&mut conn, variant, id).await?;
        info.services = aerodrome_services(&mut conn, variant, id).await?;
        Ok(Some(info))
    }

    /// Aerodromes whose reference point lies in the box. Runways and
    /// services are not loaded.
    pub async fn search_bbox(
        &self,
        lat_min: f64,
        lon_min: f64,
        lat_max: f64,
        lon_max: f64,
    ) -> Result<Vec<AerodromeInfo>, QueryError> {
        let mut conn = self.provider.acquire().await?;
        let variant = self.profile.get(&mut conn).await?.variant;
        search_bbox(&mut conn, variant, lat_min, lon_min, lat_max, lon_max).await
    }

    /// Aerodromes within `buffer_nm` of any route segment, minus `exclude`
    /// (typically departure and arrival).
    pub async fn search_near_route(
        &self,
        route: &[RoutePoint],
        buffer_nm: f64,
        exclude: &[&str],
    ) -> Result<Vec<AerodromeInfo>, QueryError> {
        if route.len() < 2 {
            return Ok(Vec::new());
        }

        let avg_lat = route.iter().map(|p| p.lat).sum::<f64>() / route.len() as f64;
        let lat_buffer = buffer_nm / NM_PER_DEGREE;
        let lon_buffer = buffer_nm / (NM_PER_DEGREE * avg_lat.to_radians().cos().abs().max(0.1));
        let lat_min = route.iter().map(|p| p.lat).fold(f64::INFINITY, f64::min) - lat_buffer;
        let lat_max = route.iter().map(|p| p.lat).fold(f64::NEG_INFINITY, f64::max) + lat_buffer;
        let lon_min = route.iter().map(|p| p.lon).fold(f64::INFINITY, f64::min) - lon_buffer;
        let lon_max = route.iter().map(|p| p.lon).fold(f64::NEG_INFINITY, f64::max) + lon_buffer;

        let candidates = self.search_bbox(lat_min, lon_min, lat_max, lon_max).await?;
        let excluded: HashSet<String> = exclude.iter().map(|code| code.trim().to_uppercase()).collect();
        Ok(candidates
            .into_iter()
            .filter(|ad| !excluded.contains(&ad.icao))
            .filter(|ad| {
                route
                    .windows(2)
                    .any(|seg| point_segment_distance_nm(ad.lat, ad.lon, &seg[0], &seg[1]) <= buffer_nm)
            })
            .collect())
    }
}

async fn search_bbox(
    conn: &mut SqliteConnection,
    variant: SchemaVariant,
    lat_min: f64,
    lon_min: f64,
    lat_max: f64,
    lon_max: f64,
) -> Result<Vec<AerodromeInfo>, QueryError> {
    let sql = match variant {
        SchemaVariant::Current => {
            format!("{CURRENT_AERODROME} WHERE lat BETWEEN ?1 AND ?2 AND lon BETWEEN ?3 AND ?4 ORDER BY icao")
        }
        SchemaVariant::Legacy => format!(
            "{LEGACY_AERODROME} WHERE ArpLat BETWEEN ?1 AND ?2 AND ArpLong BETWEEN ?3 AND ?4 ORDER BY AdCode"
        ),
    };
    let rows = sqlx::query(&sql)
        .bind(lat_min.min(lat_max))
        .bind(lat_min.max(lat_max))
        .bind(lon_min.min(lon_max))
        .bind(lon_min.max(lon_max))
        .fetch_all(&mut *conn)
        .await?;

    let mut results = Vec::with_capacity(rows.len());
    for row in &rows {
        if let Some((_, info)) = decode_aerodrome(row)? {
            results.push(info);
        }
    }
    Ok(results)
}

/// Aerodromes without a reference point are unusable and skipped.
fn decode_aerodrome(row: &SqliteRow) -> Result<Option<(i64, AerodromeInfo)>, QueryError> {
    let lat: Option<f64> = row.try_get("lat")?;
    let lon: Option<f64> = row.try_get("lon")?;
    let (Some(lat), Some(lon)) = (lat, lon) else {
        return Ok(None);
    };
    let status: Option<String> = row.try_get("status")?;
    let name: Option<String> = row.try_get("name")?;
    let icao: String = row.try_get("icao")?;
    Ok(Some((
        row.try_get("id")?,
        AerodromeInfo {
            icao: icao.trim().to_uppercase(),
            name: name.unwrap_or_default(),
            status: AerodromeStatus::parse(status.as_deref()),
            lat,
            lon,
            elevation_ft: row.try_get("elevation_ft")?,
            mag_variation: row.try_get("mag_variation")?,
            runways: Vec::new(),
            services: Vec::new(),
        },
    )))
}

async fn runways(
    conn: &mut SqliteConnection,
    variant: SchemaVariant,
    aerodrome_id: i64,
) -> Result<Vec<RunwayInfo>, QueryError> {
    let sql = match variant {
        SchemaVariant::Current => CURRENT_RUNWAYS,
        SchemaVariant::Legacy => LEGACY_RUNWAYS,
    };
    let rows = sqlx::query(sql).bind(aerodrome_id).fetch_all(&mut *conn).await?;
    let mut runways = Vec::with_capacity(rows.len());
    for row in rows {
        let designator: Option<String> = row.try_get("designator")?;
        let is_main: Option<i64> = row.try_get("is_main")?;
        runways.push(RunwayInfo {
            designator: designator.unwrap_or_default(),
            length_m: row.try_get("length_m")?,
            width_m: row.try_get("width_m")?,
            is_main: is_main.unwrap_or(0) != 0,
            surface: row.try_get("surface")?,
            threshold1_lat: row.try_get("threshold1_lat")?,
            threshold1_lon: row.try_get("threshold1_lon")?,
            lda1_m: row.try_get("lda1_m")?,
            threshold2_lat: row.try_get("threshold2_lat")?,
            threshold2_lon: row.try_get("threshold2_lon")?,
            lda2_m: row.try_get("lda2_m")?,
        });
    }
    Ok(runways)
}

/// Distance from a point to a route segment in NM, on a local
/// equirectangular projection centred on the segment.
fn point_segment_distance_nm(lat: f64, lon: f64, a: &RoutePoint, b: &RoutePoint) -> f64 {
    let seg_nm = haversine_nm(a.lat, a.lon, b.lat, b.lon);
    if seg_nm < 0.1 {
        return haversine_nm(lat, lon, a.lat, a.lon);
    }

    let mid_lat = ((a.lat + b.lat) / 2.0).to_radians().cos();
    let project = |plat: f64, plon: f64| ((plon - a.lon) * NM_PER_DEGREE * mid_lat, (plat - a.lat) * NM_PER_DEGREE);
    let (bx, by) = project(b.lat, b.lon);
    let (px, py) = project(lat, lon);

    let len_sq = bx * bx + by * by;
    let t = ((px * bx + py * by) / len_sq).clamp(0.0, 1.0);
    let (cx, cy) = (bx * t, by * t);
    ((px - cx).powi(2) + (py - cy).powi(2)).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(lat: f64, lon: f64) -> RoutePoint {
        RoutePoint {
            name: String::new(),
            lat,
            lon,
        }
    }

    #[test]
    fn distance_to_segment_uses_perpendicular_when_projected_inside() {
        let a = point(48.0, 2.0);
        let b = point(49.0, 2.0);
        // 0.1° of longitude at 48.5°N is about 4 NM.
        let d = point_segment_distance_nm(48.5, 2.1, &a, &b);
        assert!((d - 3.97).abs() < 0.1, "got {d}");
    }

    #[test]
    fn distance_to_segment_falls_back_to_endpoint() {
        let a = point(48.0, 2.0);
        let b = point(49.0, 2.0);
        let d = point_segment_distance_nm(50.0, 2.0, &a, &b);
        assert!((d - 60.0).abs() < 0.5, "got {d}");
    }
}
