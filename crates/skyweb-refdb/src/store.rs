//! Read-only access to the current cycle's reference store.

use crate::query::QueryError;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{ConnectOptions, SqliteConnection};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// Hands out one connection per query call.
///
/// Connections are read-only and are dropped when the call finishes, so any
/// number of readers can run side by side without locking.
pub trait ConnectionProvider: Send + Sync {
    fn acquire(&self) -> impl Future<Output = Result<SqliteConnection, QueryError>> + Send;
}

impl<T: ConnectionProvider> ConnectionProvider for Arc<T> {
    fn acquire(&self) -> impl Future<Output = Result<SqliteConnection, QueryError>> + Send {
        (**self).acquire()
    }
}

#[derive(Debug, Clone)]
struct AttachedStore {
    path: PathBuf,
}

/// Local store file attached by the lifecycle collaborator once a cycle
/// has been downloaded or built.
#[derive(Debug, Default)]
pub struct ReferenceStore {
    attached: RwLock<Option<AttachedStore>>,
}

impl ReferenceStore {
    /// A store with nothing attached yet; every query returns `NotReady`.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            attached: RwLock::new(Some(AttachedStore { path: path.into() })),
        }
    }

    /// Point the store at a complete cycle file. Replaces any previous cycle.
    pub async fn attach(&self, path: impl Into<PathBuf>) {
        let path = path.into();
        info!("Attaching reference store {}", path.display());
        *self.attached.write().await = Some(AttachedStore { path });
    }

    pub async fn detach(&self) {
        *self.attached.write().await = None;
    }

    pub async fn path(&self) -> Option<PathBuf> {
        self.attached.read().await.as_ref().map(|a| a.path.clone())
    }

    pub async fn is_ready(&self) -> bool {
        self.attached.read().await.is_some()
    }

    /// Publication cycle recorded by the builder.
    pub async fn cycle(&self) -> Result<Option<String>, QueryError> {
        let mut conn = self.acquire().await?;
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM store_metadata WHERE key = 'cycle'")
            .fetch_optional(&mut conn)
            .await?;
        Ok(row.map(|(cycle,)| cycle))
    }
}

impl ConnectionProvider for ReferenceStore {
    async fn acquire(&self) -> Result<SqliteConnection, QueryError> {
        let path = self.path().await.ok_or(QueryError::NotReady)?;
        if !path.exists() {
            return Err(QueryError::NotReady);
        }
        let conn = SqliteConnectOptions::new()
            .filename(&path)
            .read_only(true)
            .connect()
            .await?;
        Ok(conn)
    }
}
