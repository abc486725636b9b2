//! SIA reference data pipeline: XML import, SQLite reference store build,
//! map tiles, and the read-only airspace/aerodrome query engine.

pub mod builder;
pub mod config;
pub mod geometry;
pub mod importer;
pub mod query;
pub mod store;
pub mod tiles;

pub use builder::{BuildReport, DatabaseBuilder};
pub use config::Config;
pub use importer::{parse_file, parse_str, ImportError, ParsedExport};
pub use query::{AerodromeQuery, AirspaceQueryEngine, QueryError, SchemaVariant, StoreProfile};
pub use store::{ConnectionProvider, ReferenceStore};
pub use tiles::TileGenerator;
