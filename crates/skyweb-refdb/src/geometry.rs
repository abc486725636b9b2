//! Geometry encoding for the reference store.
//!
//! The register ships WKT text. The store keeps a GeoJSON MultiPolygon
//! (WGS84, lon/lat order) plus its bounding box so that both the query
//! engine and the tile generator decode one format.

use geo::{BoundingRect, Geometry, MultiPolygon};
use skyweb_core::BoundingBox;
use thiserror::Error;
use wkt::TryFromWkt;

#[derive(Debug, Error)]
pub enum GeometryError {
    #[error("invalid WKT: {0}")]
    InvalidWkt(String),
    #[error("geometry is not areal: {0}")]
    NotAreal(&'static str),
    #[error("invalid stored GeoJSON: {0}")]
    InvalidGeoJson(String),
}

/// Parse register WKT into a multipolygon.
///
/// Empty text yields `Ok(None)`: the part simply has no usable footprint.
pub fn wkt_to_multipolygon(text: &str) -> Result<Option<MultiPolygon<f64>>, GeometryError> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(None);
    }
    let geometry = Geometry::<f64>::try_from_wkt_str(text)
        .map_err(|e| GeometryError::InvalidWkt(e.to_string()))?;
    let multi = into_multipolygon(geometry)?;
    Ok((!multi.0.is_empty()).then_some(multi))
}

fn into_multipolygon(geometry: Geometry<f64>) -> Result<MultiPolygon<f64>, GeometryError> {
    match geometry {
        Geometry::Polygon(p) => Ok(MultiPolygon(vec![p])),
        Geometry::MultiPolygon(mp) => Ok(mp),
        Geometry::Rect(r) => Ok(MultiPolygon(vec![r.to_polygon()])),
        Geometry::GeometryCollection(collection) => {
            let mut polygons = Vec::new();
            for member in collection {
                polygons.extend(into_multipolygon(member)?.0);
            }
            Ok(MultiPolygon(polygons))
        }
        Geometry::Point(_) | Geometry::MultiPoint(_) => Err(GeometryError::NotAreal("point")),
        Geometry::Line(_) | Geometry::LineString(_) | Geometry::MultiLineString(_) => {
            Err(GeometryError::NotAreal("line"))
        }
        Geometry::Triangle(t) => Ok(MultiPolygon(vec![t.to_polygon()])),
    }
}

pub fn bounding_box(area: &MultiPolygon<f64>) -> Option<BoundingBox> {
    let rect = area.bounding_rect()?;
    Some(BoundingBox {
        lon_min: rect.min().x,
        lat_min: rect.min().y,
        lon_max: rect.max().x,
        lat_max: rect.max().y,
    })
}

pub fn to_geojson_value(area: &MultiPolygon<f64>) -> geojson::Geometry {
    geojson::Geometry::new(geojson::Value::from(area))
}

pub fn to_geojson_string(area: &MultiPolygon<f64>) -> Result<String, GeometryError> {
    serde_json::to_string(&to_geojson_value(area)).map_err(|e| GeometryError::InvalidGeoJson(e.to_string()))
}

/// Decode a stored GeoJSON geometry back into a multipolygon.
pub fn from_geojson_str(text: &str) -> Result<MultiPolygon<f64>, GeometryError> {
    let geometry: geojson::Geometry =
        serde_json::from_str(text).map_err(|e| GeometryError::InvalidGeoJson(e.to_string()))?;
    match geometry.value {
        geojson::Value::Polygon(_) => geo::Polygon::<f64>::try_from(geometry.value)
            .map(|p| MultiPolygon(vec![p]))
            .map_err(|e| GeometryError::InvalidGeoJson(e.to_string())),
        geojson::Value::MultiPolygon(_) => MultiPolygon::<f64>::try_from(geometry.value)
            .map_err(|e| GeometryError::InvalidGeoJson(e.to_string())),
        _ => Err(GeometryError::NotAreal("stored geometry")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn polygon_wkt_becomes_multipolygon() {
        let mp = wkt_to_multipolygon("POLYGON((2.0 48.0, 2.5 48.0, 2.5 49.0, 2.0 49.0, 2.0 48.0))")
            .unwrap()
            .unwrap();
        assert_eq!(mp.0.len(), 1);
        let bbox = bounding_box(&mp).unwrap();
        assert_eq!(bbox.lon_min, 2.0);
        assert_eq!(bbox.lat_max, 49.0);
    }

    #[test]
    fn empty_wkt_is_null_geometry() {
        assert!(wkt_to_multipolygon("").unwrap().is_none());
        assert!(wkt_to_multipolygon("   ").unwrap().is_none());
    }

    #[test]
    fn garbage_wkt_is_an_error() {
        assert!(matches!(
            wkt_to_multipolygon("POLYGON((2.0 48.0, oops"),
            Err(GeometryError::InvalidWkt(_))
        ));
        assert!(matches!(
            wkt_to_multipolygon("POINT(2.0 48.0)"),
            Err(GeometryError::NotAreal(_))
        ));
    }

    #[test]
    fn geojson_storage_preserves_rings() {
        let mp = wkt_to_multipolygon(
            "MULTIPOLYGON(((0 0, 1 0, 1 1, 0 1, 0 0)), ((2 2, 3 2, 3 3, 2 3, 2 2)))",
        )
        .unwrap()
        .unwrap();
        let stored = to_geojson_string(&mp).unwrap();
        assert!(stored.contains("MultiPolygon"));
        let decoded = from_geojson_str(&stored).unwrap();
        assert_eq!(decoded, mp);
    }
}
