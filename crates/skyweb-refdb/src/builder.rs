//! Reference store builder.
//!
//! Turns a parsed SIA export into `skyweb_<cycle>.db`: normalized tables,
//! native geometry, the denormalized `airspace_spatial_indexed` table and its
//! bounding-box R-tree. The store is written beside its final location and
//! renamed into place once complete, so readers never see a partial store.

use crate::config::store_file_name;
use crate::geometry::{bounding_box, to_geojson_string, wkt_to_multipolygon};
use crate::importer::{ExportCounts, ParsedExport, Record};
use anyhow::{Context, Result};
use serde::Serialize;
use skyweb_core::{limit_to_ft_amsl, normalize_band, normalize_icao_class, parse_number};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const SCHEMA_VERSION: &str = "1";

// Field names the register uses for identities and cross-references.
const AIRSPACE_KEYS: &[&str] = &["pk", "EspaceId"];
const AIRSPACE_REFS: &[&str] = &["espace_pk", "EspaceRef", "EspaceId", "Espace"];
const PART_KEYS: &[&str] = &["pk", "PartieId"];
const PART_REFS: &[&str] = &["partie_pk", "PartieRef", "PartieId", "Partie"];
const SERVICE_KEYS: &[&str] = &["pk", "ServiceId", "IndicLieu"];
const SERVICE_REFS: &[&str] = &["service_pk", "ServiceRef", "ServiceId", "Service", "IndicLieu"];
const AERODROME_KEYS: &[&str] = &["pk", "AdCode"];
const AERODROME_REFS: &[&str] = &["ad_pk", "Ad_pk", "AdRef", "Ad", "AdCode"];

/// Outcome of a successful build.
#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
    pub db_path: PathBuf,
    pub cycle: String,
    pub counts: ExportCounts,
    /// Rows in `airspace_spatial_indexed`
    pub indexed_rows: i64,
    /// Whether the bounding-box R-tree was created
    pub spatial_index: bool,
    pub size_bytes: u64,
}

/// Natural key → dense surrogate id, assigned in record order.
#[derive(Debug, Default)]
pub struct SurrogateKeys {
    ids: HashMap<String, i64>,
    len: i64,
}

impl SurrogateKeys {
    /// Give record `i` the id `i + 1` and register each of its natural keys.
    pub fn assign<'a>(records: impl IntoIterator<Item = &'a Record>, key_fields: &[&str]) -> Self {
        let mut keys = Self::default();
        for record in records {
            keys.len += 1;
            for field in key_fields {
                if let Some(value) = text(record, &[*field]) {
                    keys.ids.insert(value.to_string(), keys.len);
                }
            }
        }
        keys
    }

    /// Surrogate id of the first reference field that resolves.
    pub fn resolve(&self, record: &Record, ref_fields: &[&str]) -> Option<i64> {
        ref_fields
            .iter()
            .filter_map(|field| text(record, &[*field]))
            .find_map(|value| self.ids.get(value).copied())
    }

    pub fn len(&self) -> i64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Builds one store per cycle under an output directory.
pub struct DatabaseBuilder {
    output_dir: PathBuf,
    cycle: String,
}

impl DatabaseBuilder {
    pub fn new(output_dir: impl Into<PathBuf>, cycle: impl Into<String>) -> Self {
        Self {
            output_dir: output_dir.into(),
            cycle: cycle.into(),
        }
    }

    pub fn target_path(&self) -> PathBuf {
        store_file_name(&self.output_dir, &self.cycle)
    }

    fn partial_path(&self) -> PathBuf {
        self.output_dir.join(format!("skyweb_{}.db.partial", self.cycle))
    }

    /// Build the store. On failure the partial file is removed and any
    /// previous store at the target path is left untouched.
    pub async fn build(&self, data: &ParsedExport) -> Result<BuildReport> {
        std::fs::create_dir_all(&self.output_dir)
            .with_context(|| format!("creating output directory {}", self.output_dir.display()))?;

        let partial = self.partial_path();
        if partial.exists() {
            std::fs::remove_file(&partial)?;
        }

        info!("Building reference store for cycle {}: {}", self.cycle, partial.display());
        let (indexed_rows, spatial_index) = match self.write_store(&partial, data).await {
            Ok(result) => result,
            Err(e) => {
                if let Err(cleanup) = std::fs::remove_file(&partial) {
                    debug!("No partial store to remove: {}", cleanup);
                }
                return Err(e);
            }
        };

        let target = self.target_path();
        std::fs::rename(&partial, &target)
            .with_context(|| format!("moving store into place at {}", target.display()))?;
        let size_bytes = std::fs::metadata(&target)?.len();

        info!(
            "Built reference store {} ({} bytes, {} indexed rows, spatial index: {})",
            target.display(),
            size_bytes,
            indexed_rows,
            spatial_index
        );
        Ok(BuildReport {
            db_path: target,
            cycle: self.cycle.clone(),
            counts: data.counts(),
            indexed_rows,
            spatial_index,
            size_bytes,
        })
    }

    async fn write_store(&self, path: &Path, data: &ParsedExport) -> Result<(i64, bool)> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .with_context(|| format!("opening {}", path.display()))?;

        let rtree_available = init_spatial_metadata(&pool).await?;
        run_migrations(&pool).await?;
        insert_records(&pool, data).await?;
        build_geometries(&pool).await?;
        let indexed_rows = materialize_airspaces(&pool).await?;
        let spatial_index = if rtree_available {
            create_spatial_index(&pool).await
        } else {
            warn!("SQLite R*Tree module unavailable; queries will scan the full table");
            false
        };
        write_metadata(&pool, &self.cycle, &data.counts(), indexed_rows, spatial_index).await?;

        sqlx::query("VACUUM").execute(&pool).await?;
        pool.close().await;
        Ok((indexed_rows, spatial_index))
    }
}

/// Spatial metadata table plus a check that the R*Tree module is compiled in.
async fn init_spatial_metadata(pool: &SqlitePool) -> Result<bool> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS geometry_columns (
            f_table_name TEXT NOT NULL,
            f_geometry_column TEXT NOT NULL,
            geometry_type TEXT NOT NULL,
            srid INTEGER NOT NULL DEFAULT 4326,
            encoding TEXT NOT NULL DEFAULT 'geojson',
            PRIMARY KEY (f_table_name, f_geometry_column)
        )",
    )
    .execute(pool)
    .await?;

    for table in ["geometry", "airspace_spatial_indexed"] {
        sqlx::query(
            "INSERT OR REPLACE INTO geometry_columns (f_table_name, f_geometry_column, geometry_type, srid)
             VALUES (?, 'geom_geojson', 'MULTIPOLYGON', 4326)",
        )
        .bind(table)
        .execute(pool)
        .await?;
    }

    let check = sqlx::query("CREATE VIRTUAL TABLE temp.rtree_check USING rtree(id, min_x, max_x)")
        .execute(pool)
        .await;
    match check {
        Ok(_) => {
            sqlx::query("DROP TABLE temp.rtree_check").execute(pool).await?;
            Ok(true)
        }
        Err(e) => {
            warn!("R*Tree check failed: {}", e);
            Ok(false)
        }
    }
}

async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    let migration_sql = include_str!("../migrations/001_reference.sql");

    for statement in migration_sql.split(';') {
        let statement: String = statement
            .lines()
            .filter(|line| !line.trim().starts_with("--"))
            .collect::<Vec<_>>()
            .join("\n");
        let statement = statement.trim();
        if statement.is_empty() {
            continue;
        }
        sqlx::query(statement)
            .execute(pool)
            .await
            .with_context(|| format!("migration statement failed: {}", statement))?;
    }
    debug!("Reference schema created");
    Ok(())
}

async fn insert_records(pool: &SqlitePool, data: &ParsedExport) -> Result<()> {
    let aerodromes = unique_aerodromes(&data.aerodromes);

    let airspace_keys = SurrogateKeys::assign(&data.airspaces, AIRSPACE_KEYS);
    let part_keys = SurrogateKeys::assign(&data.parts, PART_KEYS);
    let service_keys = SurrogateKeys::assign(&data.services, SERVICE_KEYS);
    let aerodrome_keys = SurrogateKeys::assign(aerodromes.iter().copied(), AERODROME_KEYS);

    let mut tx = pool.begin().await?;

    for (i, rec) in data.airspaces.iter().enumerate() {
        sqlx::query(
            "INSERT INTO airspace (id, natural_key, name, type_code, airspace_class) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(i as i64 + 1)
        .bind(text(rec, AIRSPACE_KEYS))
        .bind(text(rec, &["Nom"]).unwrap_or_default())
        .bind(text(rec, &["TypeEspace"]).unwrap_or_default().to_uppercase())
        .bind(normalize_icao_class(text(rec, &["Classe"])))
        .execute(&mut *tx)
        .await?;
    }

    for (i, rec) in data.parts.iter().enumerate() {
        sqlx::query("INSERT INTO airspace_part (id, airspace_id, natural_key, name) VALUES (?, ?, ?, ?)")
            .bind(i as i64 + 1)
            .bind(airspace_keys.resolve(rec, AIRSPACE_REFS))
            .bind(text(rec, PART_KEYS))
            .bind(text(rec, &["Nom"]))
            .execute(&mut *tx)
            .await?;
    }

    for (i, rec) in data.volumes.iter().enumerate() {
        let floor_spec = text(rec, &["Plancher"]);
        let floor_ref = text(rec, &["PlancherRef"]);
        let floor_val = text(rec, &["PlancherVal"]);
        let ceiling_spec = text(rec, &["Plafond"]);
        let ceiling_ref = text(rec, &["PlafondRef"]);
        let ceiling_val = text(rec, &["PlafondVal"]);
        let (floor_ft, ceiling_ft) = normalize_band(
            limit_to_ft_amsl(floor_spec, floor_ref, floor_val),
            limit_to_ft_amsl(ceiling_spec, ceiling_ref, ceiling_val),
        );
        sqlx::query(
            "INSERT INTO volume (id, part_id, natural_key, floor_spec, floor_ref, floor_value,
                ceiling_spec, ceiling_ref, ceiling_value, floor_ft_amsl, ceiling_ft_amsl, hours_code)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(i as i64 + 1)
        .bind(part_keys.resolve(rec, PART_REFS))
        .bind(text(rec, &["pk", "VolumeId"]))
        .bind(floor_spec)
        .bind(floor_ref)
        .bind(parse_number(floor_val))
        .bind(ceiling_spec)
        .bind(ceiling_ref)
        .bind(parse_number(ceiling_val))
        .bind(floor_ft)
        .bind(ceiling_ft)
        .bind(text(rec, &["HorCode"]))
        .execute(&mut *tx)
        .await?;
    }

    for (i, rec) in data.geometries.iter().enumerate() {
        sqlx::query("INSERT INTO geometry (id, part_id, wkt) VALUES (?, ?, ?)")
            .bind(i as i64 + 1)
            .bind(part_keys.resolve(rec, PART_REFS))
            .bind(text(rec, &["WKT", "wkt", "Wkt"]))
            .execute(&mut *tx)
            .await?;
    }

    for (i, rec) in aerodromes.iter().enumerate() {
        sqlx::query(
            "INSERT INTO aerodrome (id, icao, name, status, lat, lon, elevation_ft, mag_variation,
                ref_temperature, hours_code, remarks)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(i as i64 + 1)
        .bind(text(rec, &["AdCode"]).unwrap_or_default().to_uppercase())
        .bind(text(rec, &["AdNomComplet", "AdNomCarto"]))
        .bind(text(rec, &["AdStatut"]))
        .bind(number(rec, &["ArpLat"]))
        .bind(number(rec, &["ArpLon", "ArpLong"]))
        .bind(number(rec, &["AdRefAltFt"]))
        .bind(number(rec, &["DecMag", "AdMagVar"]))
        .bind(number(rec, &["TempRef", "AdRefTemp"]))
        .bind(text(rec, &["HorCode"]))
        .bind(text(rec, &["Remarques"]))
        .execute(&mut *tx)
        .await?;
    }

    for (i, rec) in data.runways.iter().enumerate() {
        sqlx::query(
            "INSERT INTO runway (id, aerodrome_id, designator, length_m, width_m, is_main, surface,
                threshold1_lat, threshold1_lon, lda1_m, threshold2_lat, threshold2_lon, lda2_m)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(i as i64 + 1)
        .bind(aerodrome_keys.resolve(rec, AERODROME_REFS))
        .bind(text(rec, &["Identifiant", "Rwy"]))
        .bind(number(rec, &["Longueur"]))
        .bind(number(rec, &["Largeur"]))
        .bind(flag(text(rec, &["Principal", "Principale"])))
        .bind(text(rec, &["Revetement"]))
        .bind(number(rec, &["LatSeuil1"]))
        .bind(number(rec, &["LonSeuil1"]))
        .bind(number(rec, &["LDA1", "Lda1"]))
        .bind(number(rec, &["LatSeuil2"]))
        .bind(number(rec, &["LonSeuil2"]))
        .bind(number(rec, &["LDA2", "Lda2"]))
        .execute(&mut *tx)
        .await?;
    }

    // Aerodrome services carry the aerodrome's code as location indicator.
    let service_aerodrome_refs: Vec<&str> = AERODROME_REFS.iter().copied().chain(["IndicLieu"]).collect();
    for (i, rec) in data.services.iter().enumerate() {
        sqlx::query(
            "INSERT INTO service (id, natural_key, airspace_id, aerodrome_id, location_indicator, callsign,
                service_type, language, hours_code, hours_text)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(i as i64 + 1)
        .bind(text(rec, SERVICE_KEYS))
        .bind(airspace_keys.resolve(rec, AIRSPACE_REFS))
        .bind(aerodrome_keys.resolve(rec, &service_aerodrome_refs))
        .bind(text(rec, &["IndicLieu"]))
        .bind(text(rec, &["Indicatif"]))
        .bind(text(rec, &["TypeService", "IndicService"]))
        .bind(text(rec, &["Langue"]))
        .bind(text(rec, &["HorCode"]))
        .bind(text(rec, &["HorTxt"]))
        .execute(&mut *tx)
        .await?;
    }

    for (i, rec) in data.frequencies.iter().enumerate() {
        sqlx::query(
            "INSERT INTO frequency (id, service_id, frequency_mhz, spacing, hours_code, hours_text, sector, remarks)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(i as i64 + 1)
        .bind(service_keys.resolve(rec, SERVICE_REFS))
        .bind(text(rec, &["Frequence"]))
        .bind(text(rec, &["Espacement"]))
        .bind(text(rec, &["HorCode"]))
        .bind(text(rec, &["HorTxt"]))
        .bind(text(rec, &["Secteur", "SecteurSituation"]))
        .bind(text(rec, &["Remarques"]))
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    info!(
        "Inserted {} airspaces, {} parts, {} services, {} aerodromes",
        airspace_keys.len(),
        part_keys.len(),
        service_keys.len(),
        aerodrome_keys.len()
    );
    Ok(())
}

/// Aerodromes keyed by ICAO code; records without a code are dropped and
/// the first record wins on duplicates.
fn unique_aerodromes(records: &[Record]) -> Vec<&Record> {
    let mut seen = HashSet::new();
    records
        .iter()
        .filter(|rec| match text(rec, &["AdCode"]) {
            Some(code) => {
                let fresh = seen.insert(code.to_uppercase());
                if !fresh {
                    debug!("Duplicate aerodrome {} ignored", code);
                }
                fresh
            }
            None => false,
        })
        .collect()
}

/// WKT → GeoJSON MultiPolygon plus bounding box. Any non-empty WKT that does
/// not parse aborts the build.
async fn build_geometries(pool: &SqlitePool) -> Result<()> {
    let rows = sqlx::query("SELECT id, wkt FROM geometry ORDER BY id")
        .fetch_all(pool)
        .await?;

    let mut tx = pool.begin().await?;
    let mut converted = 0usize;
    for row in rows {
        let id: i64 = row.try_get("id")?;
        let wkt: Option<String> = row.try_get("wkt")?;
        let Some(area) = wkt_to_multipolygon(wkt.as_deref().unwrap_or_default())
            .with_context(|| format!("geometry {id}"))?
        else {
            continue;
        };
        let Some(bbox) = bounding_box(&area) else {
            continue;
        };
        sqlx::query(
            "UPDATE geometry SET geom_geojson = ?, min_lon = ?, min_lat = ?, max_lon = ?, max_lat = ? WHERE id = ?",
        )
        .bind(to_geojson_string(&area)?)
        .bind(bbox.lon_min)
        .bind(bbox.lat_min)
        .bind(bbox.lon_max)
        .bind(bbox.lat_max)
        .bind(id)
        .execute(&mut *tx)
        .await?;
        converted += 1;
    }
    tx.commit().await?;
    info!("Converted {} geometries", converted);
    Ok(())
}

/// Populate `airspace_spatial_indexed`: one row per (part, volume, geometry).
/// Volume bands are already defaulted and ordered at insert.
async fn materialize_airspaces(pool: &SqlitePool) -> Result<i64> {
    sqlx::query(
        "INSERT INTO airspace_spatial_indexed (airspace_id, part_id, volume_id, geometry_id, name, type_code,
            airspace_class, part_name, floor_ft, ceiling_ft, hours_code, geom_geojson,
            min_lon, min_lat, max_lon, max_lat)
         SELECT a.id, p.id, v.id, g.id, a.name, a.type_code, a.airspace_class, p.name,
            v.floor_ft_amsl, v.ceiling_ft_amsl,
            v.hours_code, g.geom_geojson, g.min_lon, g.min_lat, g.max_lon, g.max_lat
         FROM airspace_part p
         JOIN airspace a ON p.airspace_id = a.id
         JOIN volume v ON v.part_id = p.id
         JOIN geometry g ON g.part_id = p.id
         WHERE g.geom_geojson IS NOT NULL
         ORDER BY p.id, v.id, g.id",
    )
    .execute(pool)
    .await?;

    let (rows,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM airspace_spatial_indexed")
        .fetch_one(pool)
        .await?;
    info!("Materialized {} airspace rows", rows);
    Ok(rows)
}

/// Bounding-box R-tree over `airspace_spatial_indexed`. Failure is tolerated.
async fn create_spatial_index(pool: &SqlitePool) -> bool {
    let result: Result<()> = async {
        sqlx::query(
            "CREATE VIRTUAL TABLE airspace_spatial_index USING rtree(id, min_lon, max_lon, min_lat, max_lat)",
        )
        .execute(pool)
        .await?;
        sqlx::query(
            "INSERT INTO airspace_spatial_index (id, min_lon, max_lon, min_lat, max_lat)
             SELECT id, min_lon, max_lon, min_lat, max_lat FROM airspace_spatial_indexed",
        )
        .execute(pool)
        .await?;
        Ok(())
    }
    .await;

    match result {
        Ok(()) => true,
        Err(e) => {
            warn!("Could not create spatial index: {}", e);
            false
        }
    }
}

async fn write_metadata(
    pool: &SqlitePool,
    cycle: &str,
    counts: &ExportCounts,
    indexed_rows: i64,
    spatial_index: bool,
) -> Result<()> {
    let entries = [
        ("cycle", cycle.to_string()),
        ("built_at", chrono::Utc::now().to_rfc3339()),
        ("schema_version", SCHEMA_VERSION.to_string()),
        ("counts", serde_json::to_string(counts)?),
        ("indexed_rows", indexed_rows.to_string()),
        ("spatial_index", if spatial_index { "1" } else { "0" }.to_string()),
    ];
    let mut tx = pool.begin().await?;
    for (key, value) in entries {
        sqlx::query("INSERT OR REPLACE INTO store_metadata (key, value) VALUES (?, ?)")
            .bind(key)
            .bind(value)
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;
    Ok(())
}

/// First non-empty trimmed value among `fields`.
fn text<'a>(record: &'a Record, fields: &[&str]) -> Option<&'a str> {
    fields
        .iter()
        .filter_map(|field| record.get(*field))
        .map(|value| value.trim())
        .find(|value| !value.is_empty())
}

fn number(record: &Record, fields: &[&str]) -> Option<f64> {
    parse_number(text(record, fields))
}

fn flag(raw: Option<&str>) -> i64 {
    match raw.map(|v| v.trim().to_lowercase()) {
        Some(v) if matches!(v.as_str(), "1" | "oui" | "yes" | "true" | "o" | "y") => 1,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::importer::parse_str;

    fn record(pairs: &[(&str, &str)]) -> Record {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn surrogate_keys_are_dense_and_resolve_any_natural_key() {
        let espaces = vec![
            record(&[("pk", "300"), ("EspaceId", "ESP001")]),
            record(&[("EspaceId", "ESP002")]),
        ];
        let keys = SurrogateKeys::assign(&espaces, AIRSPACE_KEYS);
        assert_eq!(keys.len(), 2);
        assert_eq!(keys.resolve(&record(&[("Espace", "300")]), AIRSPACE_REFS), Some(1));
        assert_eq!(keys.resolve(&record(&[("EspaceId", "ESP001")]), AIRSPACE_REFS), Some(1));
        assert_eq!(keys.resolve(&record(&[("espace_pk", "ESP002")]), AIRSPACE_REFS), Some(2));
        assert_eq!(keys.resolve(&record(&[("EspaceId", "nope")]), AIRSPACE_REFS), None);
    }

    #[test]
    fn text_and_number_coercion() {
        let rec = record(&[("A", "  "), ("B", " 12,5 "), ("C", "abc")]);
        assert_eq!(text(&rec, &["A", "B"]), Some("12,5"));
        assert_eq!(number(&rec, &["B"]), Some(12.5));
        assert_eq!(number(&rec, &["C"]), None);
        assert_eq!(number(&rec, &["missing"]), None);
        assert_eq!(flag(Some("OUI")), 1);
        assert_eq!(flag(Some("non")), 0);
        assert_eq!(flag(None), 0);
    }

    #[tokio::test]
    async fn build_replaces_store_and_leaves_no_partial() {
        let dir = tempfile::tempdir().unwrap();
        let xml = r#"<SIA>
            <Espace><EspaceId>E1</EspaceId><Nom>TEST CTR</Nom><TypeEspace>CTR</TypeEspace><Classe>D</Classe></Espace>
            <Partie><PartieId>P1</PartieId><EspaceId>E1</EspaceId><Nom>1</Nom></Partie>
            <Volume><PartieId>P1</PartieId><PlafondRef>STD</PlafondRef><PlafondVal>45</PlafondVal></Volume>
            <Geometrie><PartieId>P1</PartieId><WKT>POLYGON((0 0, 1 0, 1 1, 0 1, 0 0))</WKT></Geometrie>
        </SIA>"#;
        let data = parse_str(xml).unwrap();
        let builder = DatabaseBuilder::new(dir.path(), "2401");

        let first = builder.build(&data).await.unwrap();
        let second = builder.build(&data).await.unwrap();
        assert_eq!(first.db_path, second.db_path);
        assert_eq!(second.indexed_rows, 1);
        assert!(second.db_path.ends_with("skyweb_2401.db"));
        assert!(!dir.path().join("skyweb_2401.db.partial").exists());

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(SqliteConnectOptions::new().filename(&second.db_path))
            .await
            .unwrap();
        let (floor, ceiling): (i64, i64) =
            sqlx::query_as("SELECT floor_ft, ceiling_ft FROM airspace_spatial_indexed")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!((floor, ceiling), (0, 4500));
        let (cycle,): (String,) = sqlx::query_as("SELECT value FROM store_metadata WHERE key = 'cycle'")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(cycle, "2401");
    }

    #[tokio::test]
    async fn failed_spatial_index_leaves_table_scannable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blocked.db");
        let xml = r#"<SIA>
            <Espace><EspaceId>E1</EspaceId><Nom>TEST CTR</Nom><TypeEspace>CTR</TypeEspace></Espace>
            <Partie><PartieId>P1</PartieId><EspaceId>E1</EspaceId></Partie>
            <Volume><PartieId>P1</PartieId><PlancherVal>2000</PlancherVal><PlafondVal>1000</PlafondVal></Volume>
            <Geometrie><PartieId>P1</PartieId><WKT>POLYGON((2 48, 3 48, 3 49, 2 49, 2 48))</WKT></Geometrie>
        </SIA>"#;
        let data = parse_str(xml).unwrap();

        // An ordinary table holding the index name makes CREATE VIRTUAL TABLE fail.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(SqliteConnectOptions::new().filename(&path).create_if_missing(true))
            .await
            .unwrap();
        sqlx::query("CREATE TABLE airspace_spatial_index (id INTEGER)")
            .execute(&pool)
            .await
            .unwrap();
        init_spatial_metadata(&pool).await.unwrap();
        run_migrations(&pool).await.unwrap();
        insert_records(&pool, &data).await.unwrap();
        build_geometries(&pool).await.unwrap();
        assert_eq!(materialize_airspaces(&pool).await.unwrap(), 1);
        assert!(!create_spatial_index(&pool).await);
        pool.close().await;
        std::fs::remove_file(&path).unwrap();

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(SqliteConnectOptions::new().filename(&path).create_if_missing(true))
            .await
            .unwrap();
        sqlx::query("CREATE TABLE airspace_spatial_index (id INTEGER)")
            .execute(&pool)
            .await
            .unwrap();
        pool.close().await;

        let builder = DatabaseBuilder::new(dir.path(), "2403");
        let (rows, spatial_index) = builder.write_store(&path, &data).await.unwrap();
        assert_eq!(rows, 1);
        assert!(!spatial_index);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(SqliteConnectOptions::new().filename(&path))
            .await
            .unwrap();
        let (flag,): (String,) =
            sqlx::query_as("SELECT value FROM store_metadata WHERE key = 'spatial_index'")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(flag, "0");
        let (name, floor, ceiling): (String, i64, i64) = sqlx::query_as(
            "SELECT name, floor_ft, ceiling_ft FROM airspace_spatial_indexed
             WHERE max_lon >= ? AND min_lon <= ? AND max_lat >= ? AND min_lat <= ?",
        )
        .bind(2.4)
        .bind(2.6)
        .bind(48.4)
        .bind(48.6)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(name, "TEST CTR");
        assert_eq!((floor, ceiling), (1000, 2000));
    }

    #[tokio::test]
    async fn bad_wkt_aborts_and_keeps_previous_store() {
        let dir = tempfile::tempdir().unwrap();
        let builder = DatabaseBuilder::new(dir.path(), "2402");
        builder.build(&ParsedExport::default()).await.unwrap();
        let before = std::fs::metadata(builder.target_path()).unwrap().len();

        let xml = r#"<SIA>
            <Partie><PartieId>P1</PartieId></Partie>
            <Geometrie><PartieId>P1</PartieId><WKT>POLYGON((0 0, 1 0, broken</WKT></Geometrie>
        </SIA>"#;
        let err = builder.build(&parse_str(xml).unwrap()).await.unwrap_err();
        assert!(format!("{err:#}").contains("geometry 1"));
        assert!(!dir.path().join("skyweb_2402.db.partial").exists());
        assert_eq!(std::fs::metadata(builder.target_path()).unwrap().len(), before);
    }
}
