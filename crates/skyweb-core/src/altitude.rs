//! Altitude reference handling for airspace vertical limits.
//!
//! The register expresses floors and ceilings against heterogeneous
//! references. Everything is normalized to integer feet AMSL.

/// Floor used when a volume has no usable lower limit.
pub const DEFAULT_FLOOR_FT: i64 = 0;
/// Ceiling used when a volume has no usable upper limit (treated as unlimited).
pub const DEFAULT_CEILING_FT: i64 = 99_999;

pub const METERS_TO_FEET: f64 = 3.28084;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AltitudeReference {
    /// Above mean sea level
    Amsl,
    /// Standard pressure (flight levels)
    Std,
    /// Above surface
    Sfc,
}

impl AltitudeReference {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_uppercase().as_str() {
            "AMSL" | "MSL" | "ALT" => Some(Self::Amsl),
            "STD" | "FL" => Some(Self::Std),
            "SFC" | "ASFC" | "AGL" | "GND" => Some(Self::Sfc),
            _ => None,
        }
    }
}

/// Tolerant numeric coercion: empty or non-numeric text yields `None`.
///
/// Accepts a decimal comma as well as a decimal point.
pub fn parse_number(raw: Option<&str>) -> Option<f64> {
    let text = raw?.trim();
    if text.is_empty() {
        return None;
    }
    let parsed = text
        .parse::<f64>()
        .or_else(|_| text.replace(',', ".").parse::<f64>())
        .ok()?;
    parsed.is_finite().then_some(parsed)
}

/// Normalize one vertical limit to feet AMSL.
///
/// `value` is the numeric field (feet), `spec` the textual limit ("SFC",
/// "FL065", "3500 FT AMSL", "UNL"). Returns `None` when nothing usable is
/// present so the caller can apply the floor/ceiling default.
pub fn limit_to_ft_amsl(spec: Option<&str>, reference: Option<&str>, value: Option<&str>) -> Option<i64> {
    let reference = reference.and_then(AltitudeReference::parse);

    if let Some(value) = parse_number(value) {
        let feet = match reference {
            // Flight-level numbers published without the x100 factor.
            Some(AltitudeReference::Std) if value < 1000.0 => value * 100.0,
            _ => value,
        };
        return Some(feet.round() as i64);
    }

    spec.and_then(parse_limit_spec)
}

fn parse_limit_spec(spec: &str) -> Option<i64> {
    let spec = spec.trim().to_uppercase();
    if spec.is_empty() {
        return None;
    }
    match spec.as_str() {
        "SFC" | "GND" | "ASFC" => return Some(0),
        "UNL" | "UNLTD" | "UNLIMITED" => return Some(DEFAULT_CEILING_FT),
        _ => {}
    }
    if let Some(level) = spec.strip_prefix("FL") {
        let level = parse_number(Some(level.trim()))?;
        return Some((level * 100.0).round() as i64);
    }

    let digits: String = spec
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    let feet = parse_number(Some(&digits))?;
    Some(feet.round() as i64)
}

/// Normalize a floor/ceiling pair, applying defaults and keeping
/// `floor <= ceiling`. An inverted pair is widened rather than rejected so
/// matching stays over-inclusive.
pub fn normalize_band(floor: Option<i64>, ceiling: Option<i64>) -> (i64, i64) {
    let floor = floor.unwrap_or(DEFAULT_FLOOR_FT);
    let ceiling = ceiling.unwrap_or(DEFAULT_CEILING_FT);
    (floor.min(ceiling), floor.max(ceiling))
}
