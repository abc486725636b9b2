//! Pipeline configuration from environment.

use std::env;
use std::path::PathBuf;

/// Default corridor half-width around a route leg, in nautical miles.
pub const DEFAULT_CORRIDOR_NM: f64 = 2.5;

/// Highest zoom level the tile generator renders.
pub const DEFAULT_MAX_ZOOM: u8 = 12;

#[derive(Debug, Clone)]
pub struct Config {
    /// Directory receiving the store and the tile tree
    pub output_dir: PathBuf,
    /// Store to query; defaults to `skyweb_<cycle>.db` under `output_dir`
    pub db_path: Option<PathBuf>,
    /// Publication cycle label, e.g. "2401"
    pub cycle: String,
    pub corridor_nm: f64,
    pub max_zoom: u8,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            output_dir: env::var("SKYWEB_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("data")),
            db_path: env::var("SKYWEB_DB_PATH").ok().map(PathBuf::from),
            cycle: env::var("SKYWEB_CYCLE").unwrap_or_else(|_| "current".to_string()),
            corridor_nm: env::var("SKYWEB_CORRIDOR_NM")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|nm: &f64| nm.is_finite() && *nm >= 0.0)
                .unwrap_or(DEFAULT_CORRIDOR_NM),
            max_zoom: env::var("SKYWEB_MAX_ZOOM")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(|z: u8| z.min(DEFAULT_MAX_ZOOM))
                .unwrap_or(DEFAULT_MAX_ZOOM),
        }
    }

    /// Store file for the configured cycle.
    pub fn store_path(&self) -> PathBuf {
        self.db_path
            .clone()
            .unwrap_or_else(|| store_file_name(&self.output_dir, &self.cycle))
    }
}

/// `skyweb_<cycle>.db` inside `dir`.
pub fn store_file_name(dir: &std::path::Path, cycle: &str) -> PathBuf {
    dir.join(format!("skyweb_{cycle}.db"))
}
