pub mod cached;
pub mod postgres;
pub mod sqlite;
pub mod trait_def;

pub use cached::CachedHitStore;
pub use postgres::PostgresStorage;
pub use sqlite::SqliteStorage;
pub use trait_def::{
    EventStore, HitStore, InsertOutcome, NewEvent, StorageError, StorageResult, StoredHit,
};

use std::sync::Arc;
use tracing::info;

use crate::config::{DatabaseBackend, DatabaseConfig};

/// Both store views over one connection pool
pub struct Stores {
    pub hits: Arc<dyn HitStore>,
    pub events: Arc<dyn EventStore>,
}

/// Connect to the configured backend and create the schema
pub async fn connect(config: &DatabaseConfig) -> anyhow::Result<Stores> {
    match config.backend {
        DatabaseBackend::Sqlite => {
            info!("Using SQLite storage: {}", config.url);
            let storage = Arc::new(SqliteStorage::new(&config.url, config.max_connections).await?);
            storage.init().await?;
            Ok(Stores {
                hits: storage.clone(),
                events: storage,
            })
        }
        DatabaseBackend::Postgres => {
            info!("Using PostgreSQL storage: {}", config.url);
            let storage =
                Arc::new(PostgresStorage::new(&config.url, config.max_connections).await?);
            storage.init().await?;
            Ok(Stores {
                hits: storage.clone(),
                events: storage,
            })
        }
    }
}
