//! Store layout detection.

use super::QueryError;
use sqlx::SqliteConnection;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

/// Table layout of a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaVariant {
    /// English normalized tables written by this crate's builder
    Current,
    /// Older stores carrying the register's own table names (`Service`,
    /// `Frequence`, `Ad`, `Rwy`)
    Legacy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreProfile {
    pub variant: SchemaVariant,
    /// Whether `airspace_spatial_index` exists and is readable
    pub spatial_index: bool,
}

impl StoreProfile {
    pub async fn detect(conn: &mut SqliteConnection) -> Result<Self, QueryError> {
        let names: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master
             WHERE type = 'table' AND name IN ('aerodrome', 'airspace_spatial_index')",
        )
        .fetch_all(&mut *conn)
        .await?;
        let has = |table: &str| names.iter().any(|(name,)| name == table);

        let variant = if has("aerodrome") {
            SchemaVariant::Current
        } else {
            SchemaVariant::Legacy
        };

        let mut spatial_index = has("airspace_spatial_index");
        if spatial_index {
            if let Err(e) = sqlx::query("SELECT id FROM airspace_spatial_index LIMIT 1")
                .fetch_optional(&mut *conn)
                .await
            {
                warn!("Spatial index unreadable, falling back to full scan: {}", e);
                spatial_index = false;
            }
        }

        let profile = Self {
            variant,
            spatial_index,
        };
        debug!("Detected store profile {:?}", profile);
        Ok(profile)
    }
}

/// Profile detected on first use and reused for every later call.
#[derive(Debug, Default)]
pub(crate) struct ProfileCache(OnceCell<StoreProfile>);

impl ProfileCache {
    pub(crate) async fn get(&self, conn: &mut SqliteConnection) -> Result<StoreProfile, QueryError> {
        self.0
            .get_or_try_init(|| async move { StoreProfile::detect(conn).await })
            .await
            .copied()
    }
}
