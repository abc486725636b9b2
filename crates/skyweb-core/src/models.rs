//! Core data models shared by the reference store, the query engine and the
//! route corrector.

use serde::{Deserialize, Serialize};

/// Airspace category as published in the SIA register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AirspaceType {
    Tma,
    Ctr,
    Siv,
    D,
    R,
    P,
    Tsa,
    Cba,
    Awy,
    Fir,
    Rmz,
    Tmz,
    Cta,
    Other,
}

impl AirspaceType {
    pub fn from_code(code: &str) -> Self {
        match code.trim().to_uppercase().as_str() {
            "TMA" => Self::Tma,
            "CTR" => Self::Ctr,
            "SIV" => Self::Siv,
            "D" => Self::D,
            "R" => Self::R,
            "P" => Self::P,
            "TSA" => Self::Tsa,
            "CBA" => Self::Cba,
            "AWY" => Self::Awy,
            "FIR" => Self::Fir,
            "RMZ" => Self::Rmz,
            "TMZ" => Self::Tmz,
            "CTA" => Self::Cta,
            _ => Self::Other,
        }
    }
}

/// How a route segment relates to an airspace volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IntersectionType {
    /// Both segment endpoints lie inside the airspace.
    Inside,
    /// The segment passes through the airspace boundary.
    Crosses,
    /// The segment ends inside the airspace.
    Entry,
    /// The segment starts inside the airspace.
    Exit,
    /// Within the corridor around the segment but not on it.
    Nearby,
}

/// Radio frequency for a service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrequencyInfo {
    /// e.g. "119.250"
    pub frequency_mhz: String,
    /// "25" or "8.33" kHz
    #[serde(default)]
    pub spacing: Option<String>,
    #[serde(default)]
    pub hours_code: Option<String>,
    #[serde(default)]
    pub hours_text: Option<String>,
    #[serde(default)]
    pub sector: Option<String>,
}

/// ATC/FIS service attached to an airspace or an aerodrome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub callsign: String,
    pub service_type: String,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub frequencies: Vec<FrequencyInfo>,
}

/// An airspace intersected by (or near) a route leg.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AirspaceIntersection {
    /// Airspace display name, e.g. "TMA PARIS 1"
    pub identifier: String,
    pub airspace_type: AirspaceType,
    /// Raw register type code ("TMA", "CTR", "LTA" ...)
    pub type_code: String,
    /// ICAO class A-G
    pub airspace_class: Option<String>,
    /// Lower limit in ft AMSL
    pub lower_limit_ft: i64,
    /// Upper limit in ft AMSL
    pub upper_limit_ft: i64,
    pub intersection_type: IntersectionType,
    #[serde(default)]
    pub services: Vec<ServiceInfo>,
    pub part_id: i64,
    pub volume_id: i64,
    /// GeoJSON geometry for map rendering (direct-route results only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geometry_geojson: Option<serde_json::Value>,
}

/// Airspace analysis result for a single route leg.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegAirspaces {
    pub from_waypoint: String,
    pub to_waypoint: String,
    pub from_seq: usize,
    pub to_seq: usize,
    pub planned_altitude_ft: i64,
    pub route_airspaces: Vec<AirspaceIntersection>,
    pub corridor_airspaces: Vec<AirspaceIntersection>,
}

/// A waypoint as handed to route analysis: position only, 1-based sequence
/// implied by its index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutePoint {
    pub name: String,
    pub lat: f64,
    pub lon: f64,
}

/// A leg between two 1-based waypoint sequence numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Leg {
    pub from_seq: usize,
    pub to_seq: usize,
    pub planned_altitude_ft: i64,
}

/// Waypoint as imported by the upstream route collaborator (altitude in metres).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportedWaypoint {
    pub name: String,
    #[serde(alias = "latitude")]
    pub lat: f64,
    #[serde(alias = "longitude")]
    pub lon: f64,
    #[serde(default)]
    pub altitude_m: f64,
}

/// Where a corrected altitude came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaypointSource {
    Departure,
    Arrival,
    Segment,
    IntermediateClimb,
    IntermediateDescent,
}

/// A waypoint with corrected altitude.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectedWaypoint {
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    pub altitude_ft: i64,
    pub source: WaypointSource,
    pub is_intermediate: bool,
    pub original_altitude_m: f64,
}

impl CorrectedWaypoint {
    pub fn to_route_point(&self) -> RoutePoint {
        RoutePoint {
            name: self.name.clone(),
            lat: self.lat,
            lon: self.lon,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AerodromeStatus {
    /// Open to public air traffic
    #[default]
    Cap,
    Military,
    Restricted,
}

impl AerodromeStatus {
    /// Case-insensitive; anything unrecognised is treated as public.
    pub fn parse(raw: Option<&str>) -> Self {
        let Some(raw) = raw else {
            return Self::Cap;
        };
        match raw.trim().to_uppercase().as_str() {
            "MIL" | "MILITARY" => Self::Military,
            "RES" | "RESTRICTED" | "RESTREINT" => Self::Restricted,
            _ => Self::Cap,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunwayInfo {
    pub designator: String,
    pub length_m: Option<f64>,
    pub width_m: Option<f64>,
    pub is_main: bool,
    pub surface: Option<String>,
    pub threshold1_lat: Option<f64>,
    pub threshold1_lon: Option<f64>,
    pub lda1_m: Option<f64>,
    pub threshold2_lat: Option<f64>,
    pub threshold2_lon: Option<f64>,
    pub lda2_m: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AerodromeInfo {
    pub icao: String,
    pub name: String,
    pub status: AerodromeStatus,
    pub lat: f64,
    pub lon: f64,
    pub elevation_ft: Option<f64>,
    pub mag_variation: Option<f64>,
    #[serde(default)]
    pub runways: Vec<RunwayInfo>,
    #[serde(default)]
    pub services: Vec<ServiceInfo>,
}

/// Keep only a single-letter ICAO class A-G.
pub fn normalize_icao_class(raw: Option<&str>) -> Option<String> {
    let value = raw?.trim().to_uppercase();
    match value.as_str() {
        "A" | "B" | "C" | "D" | "E" | "F" | "G" => Some(value),
        _ => None,
    }
}
