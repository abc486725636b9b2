//! Spatial math: great-circle distances, interpolation and slippy-map tiles.

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Mean Earth radius in nautical miles.
pub const EARTH_RADIUS_NM: f64 = 3440.065;

/// Flat approximation 1 NM ≈ 1/60°, adequate at single-digit NM scale.
pub const NM_PER_DEGREE: f64 = 60.0;

/// Great-circle distance in nautical miles (haversine).
pub fn haversine_nm(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let dphi = (lat2 - lat1).to_radians();
    let dlambda = (lon2 - lon1).to_radians();
    let a = (dphi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (dlambda / 2.0).sin().powi(2);
    2.0 * a.sqrt().clamp(0.0, 1.0).asin() * EARTH_RADIUS_NM
}

pub fn nm_to_degrees(nm: f64) -> f64 {
    nm / NM_PER_DEGREE
}

/// Linear interpolation between two positions, `ratio` in [0, 1].
pub fn interpolate(lat1: f64, lon1: f64, lat2: f64, lon2: f64, ratio: f64) -> (f64, f64) {
    let ratio = ratio.clamp(0.0, 1.0);
    (lat1 + (lat2 - lat1) * ratio, lon1 + (lon2 - lon1) * ratio)
}

/// Geographic bounding box in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub lon_min: f64,
    pub lat_min: f64,
    pub lon_max: f64,
    pub lat_max: f64,
}

impl BoundingBox {
    pub fn from_segment(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> Self {
        Self {
            lon_min: lon1.min(lon2),
            lat_min: lat1.min(lat2),
            lon_max: lon1.max(lon2),
            lat_max: lat1.max(lat2),
        }
    }

    pub fn expand(&self, degrees: f64) -> Self {
        Self {
            lon_min: self.lon_min - degrees,
            lat_min: self.lat_min - degrees,
            lon_max: self.lon_max + degrees,
            lat_max: self.lat_max + degrees,
        }
    }

    pub fn union(&self, other: &BoundingBox) -> Self {
        Self {
            lon_min: self.lon_min.min(other.lon_min),
            lat_min: self.lat_min.min(other.lat_min),
            lon_max: self.lon_max.max(other.lon_max),
            lat_max: self.lat_max.max(other.lat_max),
        }
    }
}

/// Latitude limit of the Web-Mercator projection.
pub const MERCATOR_MAX_LAT: f64 = 85.051_128_779_806_59;

/// Bounding box of slippy-map tile (z, x, y).
///
/// Longitude edges are linear in x; latitude edges come from the inverse
/// Gudermannian of y.
pub fn tile_bbox(z: u8, x: u32, y: u32) -> BoundingBox {
    let n = 2f64.powi(i32::from(z));
    let lon_min = x as f64 / n * 360.0 - 180.0;
    let lon_max = (x as f64 + 1.0) / n * 360.0 - 180.0;
    let lat_max = tile_y_to_lat(y as f64, n);
    let lat_min = tile_y_to_lat(y as f64 + 1.0, n);
    BoundingBox {
        lon_min,
        lat_min,
        lon_max,
        lat_max,
    }
}

fn tile_y_to_lat(y: f64, n: f64) -> f64 {
    (PI * (1.0 - 2.0 * y / n)).sinh().atan().to_degrees()
}

/// Tile column containing a longitude at zoom z.
pub fn lon_to_tile_x(lon: f64, z: u8) -> u32 {
    let n = 2f64.powi(i32::from(z));
    let x = ((lon + 180.0) / 360.0 * n).floor();
    x.clamp(0.0, n - 1.0) as u32
}

/// Tile row containing a latitude at zoom z.
pub fn lat_to_tile_y(lat: f64, z: u8) -> u32 {
    let n = 2f64.powi(i32::from(z));
    let lat_rad = lat.clamp(-MERCATOR_MAX_LAT, MERCATOR_MAX_LAT).to_radians();
    let y = ((1.0 - (lat_rad.tan() + 1.0 / lat_rad.cos()).ln() / PI) / 2.0 * n).floor();
    y.clamp(0.0, n - 1.0) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn haversine_one_degree_latitude() {
        // 1° of latitude is 60 NM on a 3440.065 NM sphere.
        let dist = haversine_nm(0.0, 0.0, 1.0, 0.0);
        assert!((dist - 60.04).abs() < 0.05, "got {dist}");
    }

    #[test]
    fn haversine_same_point() {
        assert!(haversine_nm(48.85, 2.35, 48.85, 2.35) < 1e-9);
    }

    #[test]
    fn zoom_zero_covers_world() {
        let bbox = tile_bbox(0, 0, 0);
        assert_eq!(bbox.lon_min, -180.0);
        assert_eq!(bbox.lon_max, 180.0);
        assert!((bbox.lat_max - MERCATOR_MAX_LAT).abs() < 1e-9);
        assert!((bbox.lat_min + MERCATOR_MAX_LAT).abs() < 1e-9);
    }

    #[test]
    fn zoom_one_quadrants() {
        let top_left = tile_bbox(1, 0, 0);
        assert_eq!(top_left.lon_min, -180.0);
        assert_eq!(top_left.lon_max, 0.0);
        assert!(top_left.lat_max > 0.0);
        assert!(top_left.lat_min.abs() < 1e-9);

        let bottom_right = tile_bbox(1, 1, 1);
        assert_eq!(bottom_right.lon_min, 0.0);
        assert_eq!(bottom_right.lon_max, 180.0);
        assert!(bottom_right.lat_max <= 1e-9);
    }

    #[test]
    fn tiles_have_positive_area() {
        for z in 0..5u8 {
            let n = 1u32 << z;
            for x in 0..n {
                for y in 0..n {
                    let b = tile_bbox(z, x, y);
                    assert!(b.lon_max > b.lon_min);
                    assert!(b.lat_max > b.lat_min);
                }
            }
        }
    }

    #[test]
    fn france_at_zoom_six() {
        let b = tile_bbox(6, 32, 22);
        assert!(b.lon_min >= 0.0 && b.lon_max <= 10.0);
        assert!(b.lat_min > 40.0 && b.lat_max < 55.0);
        assert_eq!(lon_to_tile_x(2.35, 6), 32);
        assert_eq!(lat_to_tile_y(48.85, 6), 22);
    }

    #[test]
    fn tile_index_round_trips_through_bbox() {
        let b = tile_bbox(9, 259, 176);
        let (lat, lon) = ((b.lat_min + b.lat_max) / 2.0, (b.lon_min + b.lon_max) / 2.0);
        assert_eq!(lon_to_tile_x(lon, 9), 259);
        assert_eq!(lat_to_tile_y(lat, 9), 176);
    }

    #[test]
    fn bbox_expand_and_union() {
        let a = BoundingBox::from_segment(49.0, 3.0, 48.0, 2.0);
        assert_eq!((a.lat_min, a.lon_max), (48.0, 3.0));
        let b = BoundingBox::from_segment(48.5, 2.5, 50.0, 4.0);
        let u = a.union(&b);
        assert_eq!((u.lon_min, u.lat_min, u.lon_max, u.lat_max), (2.0, 48.0, 4.0, 50.0));
        assert!(a.expand(0.5).lat_min < a.lat_min);
    }
}
