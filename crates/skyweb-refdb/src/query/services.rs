//! ATS service and frequency lookup for airspaces and aerodromes.
//!
//! Airspaces resolve their services in three tiers:
//! 1. services linked directly to the airspace;
//! 2. for SIV and TMA, services whose name equals the airspace name and
//!    whose type is the one the category implies (SIV → information,
//!    TMA → approach);
//! 3. the same, with the name split on its last space into a parent name
//!    and a sector suffix; parent rows whose sector mentions the suffix are
//!    preferred, otherwise every parent row is kept.

use super::profile::SchemaVariant;
use super::QueryError;
use skyweb_core::{FrequencyInfo, ServiceInfo};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

const CURRENT_SELECT: &str = "SELECT s.location_indicator, s.callsign, s.service_type, s.language,
        f.frequency_mhz, f.spacing, f.hours_code, f.hours_text, f.sector
    FROM service s
    LEFT JOIN frequency f ON f.service_id = s.id";

const LEGACY_SELECT: &str = "SELECT s.IndicLieu AS location_indicator, s.IndicLieu AS callsign,
        s.IndicService AS service_type, NULL AS language,
        CAST(f.Frequence AS TEXT) AS frequency_mhz, CAST(f.Espacement AS TEXT) AS spacing,
        f.HorCode AS hours_code, f.HorTxt AS hours_text, f.SecteurSituation AS sector
    FROM Service s
    LEFT JOIN Frequence f ON f.ServiceRef = s.pk";

const INFORMATION_TYPES: &[&str] = &["Information", "SIV", "FIS", "Info"];
const APPROACH_TYPES: &[&str] = &["Approche", "Approach", "APP"];

/// One service × frequency row.
#[derive(Debug, Clone)]
pub(crate) struct ServiceRow {
    location_indicator: Option<String>,
    callsign: Option<String>,
    service_type: Option<String>,
    language: Option<String>,
    frequency_mhz: Option<String>,
    spacing: Option<String>,
    hours_code: Option<String>,
    hours_text: Option<String>,
    sector: Option<String>,
}

impl ServiceRow {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            location_indicator: row.try_get("location_indicator")?,
            callsign: row.try_get("callsign")?,
            service_type: row.try_get("service_type")?,
            language: row.try_get("language")?,
            frequency_mhz: row.try_get("frequency_mhz")?,
            spacing: row.try_get("spacing")?,
            hours_code: row.try_get("hours_code")?,
            hours_text: row.try_get("hours_text")?,
            sector: row.try_get("sector")?,
        })
    }

    fn matches_name(&self, name: &str) -> bool {
        [&self.location_indicator, &self.callsign]
            .into_iter()
            .flatten()
            .any(|value| value.trim().eq_ignore_ascii_case(name.trim()))
    }

    fn has_type(&self, accepted: &[&str]) -> bool {
        self.service_type
            .as_deref()
            .map(|t| accepted.iter().any(|a| t.trim().eq_ignore_ascii_case(a)))
            .unwrap_or(false)
    }

    fn sector_mentions(&self, suffix: &str) -> bool {
        self.sector
            .as_deref()
            .map(|s| s.to_uppercase().contains(&suffix.to_uppercase()))
            .unwrap_or(false)
    }
}

/// Service types implied by an airspace category, if name fallback applies.
pub(crate) fn implied_service_types(type_code: &str) -> Option<&'static [&'static str]> {
    match type_code.trim().to_uppercase().as_str() {
        "SIV" => Some(INFORMATION_TYPES),
        "TMA" => Some(APPROACH_TYPES),
        _ => None,
    }
}

/// Split "PARIS NORD" into ("PARIS", "NORD").
pub(crate) fn split_sector(name: &str) -> Option<(&str, &str)> {
    let (parent, suffix) = name.trim().rsplit_once(' ')?;
    let (parent, suffix) = (parent.trim(), suffix.trim());
    (!parent.is_empty() && !suffix.is_empty()).then_some((parent, suffix))
}

pub(crate) async fn airspace_services(
    conn: &mut SqliteConnection,
    variant: SchemaVariant,
    airspace_id: i64,
    name: &str,
    type_code: &str,
) -> Result<Vec<ServiceInfo>, QueryError> {
    let direct = fetch_linked(conn, variant, Link::Airspace, airspace_id).await?;
    if !direct.is_empty() {
        return Ok(group_services(direct));
    }

    let Some(accepted) = implied_service_types(type_code) else {
        return Ok(Vec::new());
    };

    let exact: Vec<ServiceRow> = fetch_by_name(conn, variant, name)
        .await?
        .into_iter()
        .filter(|row| row.has_type(accepted))
        .collect();
    if !exact.is_empty() {
        return Ok(group_services(exact));
    }

    let Some((parent, suffix)) = split_sector(name) else {
        return Ok(Vec::new());
    };
    let parent_rows: Vec<ServiceRow> = fetch_by_name(conn, variant, parent)
        .await?
        .into_iter()
        .filter(|row| row.has_type(accepted))
        .collect();
    Ok(group_services(select_sector(parent_rows, suffix)))
}

pub(crate) async fn aerodrome_services(
    conn: &mut SqliteConnection,
    variant: SchemaVariant,
    aerodrome_id: i64,
) -> Result<Vec<ServiceInfo>, QueryError> {
    let rows = fetch_linked(conn, variant, Link::Aerodrome, aerodrome_id).await?;
    Ok(group_services(rows))
}

/// Keep parent rows whose sector mentions the suffix, or all of them when
/// none does.
pub(crate) fn select_sector(rows: Vec<ServiceRow>, suffix: &str) -> Vec<ServiceRow> {
    let matching: Vec<ServiceRow> = rows.iter().filter(|r| r.sector_mentions(suffix)).cloned().collect();
    if matching.is_empty() {
        rows
    } else {
        matching
    }
}

#[derive(Debug, Clone, Copy)]
enum Link {
    Airspace,
    Aerodrome,
}

async fn fetch_linked(
    conn: &mut SqliteConnection,
    variant: SchemaVariant,
    link: Link,
    id: i64,
) -> Result<Vec<ServiceRow>, QueryError> {
    let sql = match (variant, link) {
        (SchemaVariant::Current, Link::Airspace) => {
            format!("{CURRENT_SELECT} WHERE s.airspace_id = ? ORDER BY s.id, f.id")
        }
        (SchemaVariant::Current, Link::Aerodrome) => {
            format!("{CURRENT_SELECT} WHERE s.aerodrome_id = ? ORDER BY s.id, f.id")
        }
        (SchemaVariant::Legacy, Link::Airspace) => {
            format!("{LEGACY_SELECT} WHERE s.EspaceRef = ? ORDER BY s.pk, f.pk")
        }
        (SchemaVariant::Legacy, Link::Aerodrome) => {
            format!("{LEGACY_SELECT} WHERE s.Ad_pk = ? ORDER BY s.pk, f.pk")
        }
    };
    let rows = sqlx::query(&sql).bind(id).fetch_all(&mut *conn).await?;
    Ok(rows.iter().map(ServiceRow::from_row).collect::<Result<_, _>>()?)
}

async fn fetch_by_name(
    conn: &mut SqliteConnection,
    variant: SchemaVariant,
    name: &str,
) -> Result<Vec<ServiceRow>, QueryError> {
    let sql = match variant {
        SchemaVariant::Current => format!(
            "{CURRENT_SELECT}
             WHERE UPPER(TRIM(s.location_indicator)) = UPPER(TRIM(?1))
                OR UPPER(TRIM(s.callsign)) = UPPER(TRIM(?1))
             ORDER BY s.id, f.id"
        ),
        SchemaVariant::Legacy => format!(
            "{LEGACY_SELECT}
             WHERE UPPER(TRIM(s.IndicLieu)) = UPPER(TRIM(?1))
             ORDER BY s.pk, f.pk"
        ),
    };
    let rows = sqlx::query(&sql).bind(name).fetch_all(&mut *conn).await?;
    let rows: Vec<ServiceRow> = rows.iter().map(ServiceRow::from_row).collect::<Result<_, _>>()?;
    Ok(rows.into_iter().filter(|row| row.matches_name(name)).collect())
}

/// Group rows by callsign and type, keeping first-seen order.
pub(crate) fn group_services(rows: Vec<ServiceRow>) -> Vec<ServiceInfo> {
    let mut services: Vec<(String, ServiceInfo)> = Vec::new();
    for row in rows {
        let callsign = row
            .callsign
            .clone()
            .or_else(|| row.location_indicator.clone())
            .unwrap_or_default();
        let service_type = row.service_type.clone().unwrap_or_default();
        let key = format!("{callsign}:{service_type}");

        let index = match services.iter().position(|(k, _)| *k == key) {
            Some(index) => index,
            None => {
                services.push((
                    key,
                    ServiceInfo {
                        callsign,
                        service_type,
                        language: row.language.clone(),
                        frequencies: Vec::new(),
                    },
                ));
                services.len() - 1
            }
        };

        if let Some(mhz) = row.frequency_mhz.filter(|f| !f.trim().is_empty()) {
            services[index].1.frequencies.push(FrequencyInfo {
                frequency_mhz: mhz.trim().to_string(),
                spacing: row.spacing,
                hours_code: row.hours_code,
                hours_text: row.hours_text,
                sector: row.sector,
            });
        }
    }
    services.into_iter().map(|(_, service)| service).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(callsign: &str, service_type: &str, mhz: Option<&str>, sector: Option<&str>) -> ServiceRow {
        ServiceRow {
            location_indicator: Some(callsign.to_string()),
            callsign: Some(callsign.to_string()),
            service_type: Some(service_type.to_string()),
            language: None,
            frequency_mhz: mhz.map(str::to_string),
            spacing: Some("8.33".to_string()),
            hours_code: None,
            hours_text: None,
            sector: sector.map(str::to_string),
        }
    }

    #[test]
    fn sector_split_uses_last_space() {
        assert_eq!(split_sector("PARIS NORD"), Some(("PARIS", "NORD")));
        assert_eq!(split_sector("SEINE INFO SUD"), Some(("SEINE INFO", "SUD")));
        assert_eq!(split_sector("PARIS"), None);
    }

    #[test]
    fn implied_types_only_for_siv_and_tma() {
        assert!(implied_service_types("siv").is_some());
        assert!(implied_service_types("TMA").is_some());
        assert!(implied_service_types("CTR").is_none());
    }

    #[test]
    fn sector_preference_falls_back_to_all_rows() {
        let rows = vec![
            row("PARIS", "Information", Some("120.300"), Some("Secteur Nord")),
            row("PARIS", "Information", Some("125.700"), Some("Secteur Sud")),
        ];
        let north = select_sector(rows.clone(), "nord");
        assert_eq!(north.len(), 1);
        assert_eq!(north[0].frequency_mhz.as_deref(), Some("120.300"));

        let all = select_sector(rows, "OUEST");
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn grouping_merges_frequencies_per_service() {
        let services = group_services(vec![
            row("PARIS", "Approche", Some("119.250"), None),
            row("PARIS", "Approche", Some("121.050"), None),
            row("PARIS", "Information", None, None),
        ]);
        assert_eq!(services.len(), 2);
        assert_eq!(services[0].frequencies.len(), 2);
        assert_eq!(services[0].frequencies[1].frequency_mhz, "121.050");
        assert!(services[1].frequencies.is_empty());
    }

    #[test]
    fn type_and_name_matching_ignore_case() {
        let r = row("Paris", "APPROCHE", None, None);
        assert!(r.has_type(&["Approche"]));
        assert!(!r.has_type(&["Information"]));
        assert!(r.matches_name(" PARIS "));
    }
}
