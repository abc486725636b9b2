//! Pre-rendered GeoJSON map tiles.
//!
//! Airspaces from `airspace_spatial_indexed` are bucketed into slippy-map
//! tiles `airspaces/{z}/{x}/{y}.json`. Each zoom band shows a subset of
//! categories, simplified at the band's tolerance. Empty tiles are not
//! written. A `tileset.json` manifest describes the result.

use crate::geometry::{bounding_box, from_geojson_str, to_geojson_value};
use anyhow::{Context, Result};
use geo::{MultiPolygon, SimplifyVwPreserve};
use rstar::{RTree, RTreeObject, AABB};
use serde::{Serialize, Serializer};
use skyweb_core::spatial::{lat_to_tile_y, lon_to_tile_x};
use skyweb_core::{tile_bbox, BoundingBox};
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{ConnectOptions, Row};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const TILE_URL_TEMPLATE: &str = "airspaces/{z}/{x}/{y}.json";

/// Categories and simplification tolerance for a range of zoom levels.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ZoomBand {
    pub min_zoom: u8,
    pub max_zoom: u8,
    /// `None` shows every category, written as `"all"` in the manifest
    #[serde(serialize_with = "serialize_types")]
    pub types: Option<&'static [&'static str]>,
    /// Degrees
    pub tolerance: f64,
}

impl ZoomBand {
    pub fn allows(&self, type_code: &str) -> bool {
        match self.types {
            Some(types) => types.iter().any(|t| t.eq_ignore_ascii_case(type_code.trim())),
            None => true,
        }
    }
}

fn serialize_types<S: Serializer>(types: &Option<&'static [&'static str]>, serializer: S) -> Result<S::Ok, S::Error> {
    match types {
        Some(types) => serializer.collect_seq(types.iter()),
        None => serializer.serialize_str("all"),
    }
}

pub const ZOOM_BANDS: [ZoomBand; 3] = [
    ZoomBand {
        min_zoom: 0,
        max_zoom: 5,
        types: Some(&["FIR", "TMA"]),
        tolerance: 0.01,
    },
    ZoomBand {
        min_zoom: 6,
        max_zoom: 8,
        types: Some(&["TMA", "CTR", "SIV", "D", "R", "P"]),
        tolerance: 0.001,
    },
    ZoomBand {
        min_zoom: 9,
        max_zoom: 12,
        types: None,
        tolerance: 0.0001,
    },
];

#[derive(Debug, Clone)]
struct TileFeature {
    id: i64,
    name: String,
    type_code: String,
    airspace_class: Option<String>,
    floor_ft: i64,
    ceiling_ft: i64,
    area: MultiPolygon<f64>,
}

/// R-tree entry: a feature's bounding box and its position in the feature list.
#[derive(Debug, Clone)]
struct FeatureEnvelope {
    index: usize,
    bbox: BoundingBox,
}

impl RTreeObject for FeatureEnvelope {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_corners(
            [self.bbox.lon_min, self.bbox.lat_min],
            [self.bbox.lon_max, self.bbox.lat_max],
        )
    }
}

#[derive(Debug, Serialize)]
struct TilesetManifest<'a> {
    format: &'static str,
    tile_url: &'static str,
    min_zoom: u8,
    max_zoom: u8,
    zoom_levels: Vec<ZoomBand>,
    cycle: &'a str,
    generated_at: String,
    tile_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    bounds: Option<[f64; 4]>,
}

pub struct TileGenerator {
    db_path: PathBuf,
    output_dir: PathBuf,
    cycle: String,
    max_zoom: u8,
}

impl TileGenerator {
    pub fn new(db_path: impl Into<PathBuf>, output_dir: impl Into<PathBuf>, cycle: impl Into<String>) -> Self {
        Self {
            db_path: db_path.into(),
            output_dir: output_dir.into(),
            cycle: cycle.into(),
            max_zoom: ZOOM_BANDS[ZOOM_BANDS.len() - 1].max_zoom,
        }
    }

    /// Stop rendering after this zoom level.
    pub fn with_max_zoom(mut self, max_zoom: u8) -> Self {
        self.max_zoom = max_zoom;
        self
    }

    /// Render every band and write the manifest. Returns the number of tiles
    /// written.
    pub async fn generate_all(&self) -> Result<usize> {
        let features = self.load_features().await?;
        info!("Generating tiles for {} airspace rows", features.len());

        let index = RTree::bulk_load(
            features
                .iter()
                .enumerate()
                .filter_map(|(index, f)| bounding_box(&f.area).map(|bbox| FeatureEnvelope { index, bbox }))
                .collect(),
        );
        let bounds = features
            .iter()
            .filter_map(|f| bounding_box(&f.area))
            .reduce(|a, b| a.union(&b));

        let tiles_root = self.output_dir.join("airspaces");
        let mut total = 0usize;
        if let Some(bounds) = bounds {
            for band in ZOOM_BANDS.iter().filter(|b| b.min_zoom <= self.max_zoom) {
                total += self.render_band(band, &features, &index, bounds, &tiles_root)?;
            }
        } else {
            warn!("No airspace geometry in store; writing an empty tileset");
        }

        self.write_manifest(total, bounds)?;
        info!("Generated {} tiles in {}", total, tiles_root.display());
        Ok(total)
    }

    async fn load_features(&self) -> Result<Vec<TileFeature>> {
        let mut conn = SqliteConnectOptions::new()
            .filename(&self.db_path)
            .read_only(true)
            .connect()
            .await
            .with_context(|| format!("opening store {}", self.db_path.display()))?;

        let rows = sqlx::query(
            "SELECT id, name, type_code, airspace_class, floor_ft, ceiling_ft, geom_geojson
             FROM airspace_spatial_indexed ORDER BY id",
        )
        .fetch_all(&mut conn)
        .await?;

        let mut features = Vec::with_capacity(rows.len());
        for row in rows {
            let id: i64 = row.try_get("id")?;
            let geojson: String = row.try_get("geom_geojson")?;
            let area = from_geojson_str(&geojson).with_context(|| format!("airspace row {id}"))?;
            features.push(TileFeature {
                id,
                name: row.try_get("name")?,
                type_code: row.try_get("type_code")?,
                airspace_class: row.try_get("airspace_class")?,
                floor_ft: row.try_get("floor_ft")?,
                ceiling_ft: row.try_get("ceiling_ft")?,
                area,
            });
        }
        Ok(features)
    }

    fn render_band(
        &self,
        band: &ZoomBand,
        features: &[TileFeature],
        index: &RTree<FeatureEnvelope>,
        bounds: BoundingBox,
        tiles_root: &Path,
    ) -> Result<usize> {
        // Simplified once per band, only for the categories the band shows.
        let simplified: Vec<Option<MultiPolygon<f64>>> = features
            .iter()
            .map(|f| band.allows(&f.type_code).then(|| simplify(&f.area, band.tolerance)))
            .collect();

        let mut written = 0usize;
        for z in band.min_zoom..=band.max_zoom.min(self.max_zoom) {
            let (x_range, y_range) = tile_range(z, bounds);
            let mut at_zoom = 0usize;
            for x in x_range {
                for y in y_range.clone() {
                    let tile = tile_bbox(z, x, y);
                    let envelope = AABB::from_corners([tile.lon_min, tile.lat_min], [tile.lon_max, tile.lat_max]);
                    let mut hits: Vec<usize> = index
                        .locate_in_envelope_intersecting(&envelope)
                        .map(|entry| entry.index)
                        .filter(|&i| simplified[i].is_some())
                        .collect();
                    if hits.is_empty() {
                        continue;
                    }
                    hits.sort_unstable();

                    let collection = feature_collection(features, &simplified, &hits);
                    write_tile(tiles_root, z, x, y, &collection)?;
                    at_zoom += 1;
                }
            }
            debug!("Zoom {}: {} tiles", z, at_zoom);
            written += at_zoom;
        }
        Ok(written)
    }

    fn write_manifest(&self, tile_count: usize, bounds: Option<BoundingBox>) -> Result<()> {
        std::fs::create_dir_all(&self.output_dir)?;
        let manifest = TilesetManifest {
            format: "geojson",
            tile_url: TILE_URL_TEMPLATE,
            min_zoom: ZOOM_BANDS[0].min_zoom,
            max_zoom: self.max_zoom.min(ZOOM_BANDS[ZOOM_BANDS.len() - 1].max_zoom),
            zoom_levels: ZOOM_BANDS.to_vec(),
            cycle: &self.cycle,
            generated_at: chrono::Utc::now().to_rfc3339(),
            tile_count,
            bounds: bounds.map(|b| [b.lon_min, b.lat_min, b.lon_max, b.lat_max]),
        };
        let path = self.output_dir.join("tileset.json");
        std::fs::write(&path, serde_json::to_vec_pretty(&manifest)?)
            .with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }
}

/// Tiles covering `bounds` at zoom `z`, widened by one tile on each side so
/// features lying exactly on a tile edge are picked up by both neighbours.
fn tile_range(z: u8, bounds: BoundingBox) -> (std::ops::RangeInclusive<u32>, std::ops::RangeInclusive<u32>) {
    let last = (1u32 << z) - 1;
    let x_min = lon_to_tile_x(bounds.lon_min, z).saturating_sub(1);
    let x_max = (lon_to_tile_x(bounds.lon_max, z) + 1).min(last);
    // Tile rows grow southwards.
    let y_min = lat_to_tile_y(bounds.lat_max, z).saturating_sub(1);
    let y_max = (lat_to_tile_y(bounds.lat_min, z) + 1).min(last);
    (x_min..=x_max, y_min..=y_max)
}

/// Topology-preserving simplification. Falls back to the input when the
/// result would lose a ring.
fn simplify(area: &MultiPolygon<f64>, tolerance: f64) -> MultiPolygon<f64> {
    // Visvalingam works on triangle areas; square the distance tolerance.
    let simplified = area.simplify_vw_preserve(&(tolerance * tolerance));
    let intact = simplified.0.len() == area.0.len()
        && simplified
            .0
            .iter()
            .all(|p| p.exterior().0.len() >= 4 && p.interiors().iter().all(|r| r.0.len() >= 4));
    if intact {
        simplified
    } else {
        area.clone()
    }
}

fn feature_collection(
    features: &[TileFeature],
    simplified: &[Option<MultiPolygon<f64>>],
    hits: &[usize],
) -> geojson::FeatureCollection {
    let features = hits
        .iter()
        .filter_map(|&i| {
            let area = simplified[i].as_ref()?;
            let f = &features[i];
            let mut properties = serde_json::Map::new();
            properties.insert("id".into(), f.id.into());
            properties.insert("name".into(), f.name.clone().into());
            properties.insert("type".into(), f.type_code.clone().into());
            properties.insert(
                "class".into(),
                f.airspace_class.clone().map(Into::into).unwrap_or(serde_json::Value::Null),
            );
            properties.insert("floor_ft".into(), f.floor_ft.into());
            properties.insert("ceiling_ft".into(), f.ceiling_ft.into());
            Some(geojson::Feature {
                bbox: None,
                geometry: Some(to_geojson_value(area)),
                id: None,
                properties: Some(properties),
                foreign_members: None,
            })
        })
        .collect();
    geojson::FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}

fn write_tile(root: &Path, z: u8, x: u32, y: u32, collection: &geojson::FeatureCollection) -> Result<()> {
    let dir = root.join(z.to_string()).join(x.to_string());
    std::fs::create_dir_all(&dir)?;
    let path = dir.join(format!("{y}.json"));
    std::fs::write(&path, serde_json::to_vec(collection)?).with_context(|| format!("writing tile {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;

    #[test]
    fn bands_cover_zero_to_twelve_without_gaps() {
        let mut expected = 0u8;
        for band in ZOOM_BANDS {
            assert_eq!(band.min_zoom, expected);
            expected = band.max_zoom + 1;
        }
        assert_eq!(expected, 13);
    }

    #[test]
    fn band_type_filter() {
        assert!(ZOOM_BANDS[0].allows("tma"));
        assert!(!ZOOM_BANDS[0].allows("CTR"));
        assert!(ZOOM_BANDS[1].allows("CTR"));
        assert!(!ZOOM_BANDS[1].allows("TSA"));
        assert!(ZOOM_BANDS[2].allows("TSA"));
    }

    #[test]
    fn unfiltered_band_is_listed_as_all() {
        let open = serde_json::to_value(ZOOM_BANDS[2]).unwrap();
        assert_eq!(open["types"], "all");
        let filtered = serde_json::to_value(ZOOM_BANDS[0]).unwrap();
        assert_eq!(filtered["types"], serde_json::json!(["FIR", "TMA"]));
    }

    #[test]
    fn tile_range_stays_on_grid() {
        let world = BoundingBox {
            lon_min: -180.0,
            lat_min: -85.0,
            lon_max: 180.0,
            lat_max: 85.0,
        };
        let (xs, ys) = tile_range(2, world);
        assert_eq!((*xs.start(), *xs.end()), (0, 3));
        assert_eq!((*ys.start(), *ys.end()), (0, 3));

        let paris = BoundingBox {
            lon_min: 2.0,
            lat_min: 48.5,
            lon_max: 2.5,
            lat_max: 49.0,
        };
        let (xs, _) = tile_range(0, paris);
        assert_eq!((*xs.start(), *xs.end()), (0, 0));
    }

    #[test]
    fn simplification_never_drops_small_polygons() {
        let tiny = MultiPolygon(vec![polygon![
            (x: 2.0, y: 48.0),
            (x: 2.001, y: 48.0),
            (x: 2.001, y: 48.001),
            (x: 2.0, y: 48.001),
            (x: 2.0, y: 48.0),
        ]]);
        let out = simplify(&tiny, 0.01);
        assert_eq!(out.0.len(), 1);
        assert!(out.0[0].exterior().0.len() >= 4);
    }
}
