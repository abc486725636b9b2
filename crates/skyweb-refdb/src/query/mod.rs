//! Read-only queries against an attached reference store.

mod aerodrome;
mod airspace;
mod profile;
mod services;

pub use aerodrome::{AerodromeQuery, DEFAULT_ROUTE_BUFFER_NM};
pub use airspace::{is_excluded_type, AirspaceQueryEngine, EXCLUDED_TYPES};
pub use profile::{SchemaVariant, StoreProfile};

use crate::geometry::GeometryError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueryError {
    /// No store has been attached (or the attached file is gone).
    #[error("reference store is not ready")]
    NotReady,
    #[error("leg {from_seq}->{to_seq} references unknown waypoint {seq}")]
    InvalidLeg {
        from_seq: usize,
        to_seq: usize,
        seq: usize,
    },
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Geometry(#[from] GeometryError),
}
