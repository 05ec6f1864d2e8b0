use crate::models::DownloadRecord;
use anyhow::Result;
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbErr, Statement};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

pub mod migrator;
pub mod repositories;

const MEMORY_URL: &str = "sqlite::memory:";

/// Failure to read or write the idempotency store.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("Database error: {0}")]
    Database(#[from] DbErr),

    #[error("Write for `{0}` was not acknowledged by the database")]
    NotAcknowledged(String),
}

/// Name-keyed record of every release already fetched or queued.
#[derive(Clone)]
pub struct Store {
    pub conn: DatabaseConnection,
}

impl Store {
    pub async fn new(db_url: &str) -> Result<Self> {
        Self::with_pool_options(db_url, 5, 1).await
    }

    /// Private database for tests and dry runs. A single connection keeps
    /// every query on the same in-memory database.
    pub async fn in_memory() -> Result<Self> {
        Self::with_pool_options(MEMORY_URL, 1, 1).await
    }

    pub async fn with_pool_options(
        db_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self> {
        use sea_orm_migration::MigratorTrait;

        if !db_url.contains(":memory:") {
            let path_str = db_url
                .trim_start_matches("sqlite://")
                .trim_start_matches("sqlite:");
            let path_str = path_str.split('?').next().unwrap_or(path_str);
            if let Some(parent) = Path::new(path_str).parent() {
                tokio::fs::create_dir_all(parent).await.ok();
            }
            if !Path::new(path_str).exists() {
                std::fs::File::create(path_str)?;
            }
        }

        let mut opt = ConnectOptions::new(db_url.to_string());
        opt.max_connections(max_connections)
            .min_connections(min_connections)
            .connect_timeout(Duration::from_secs(10))
            .acquire_timeout(Duration::from_secs(10))
            .sqlx_logging(false);

        let conn = Database::connect(opt).await?;

        migrator::Migrator::up(&conn, None).await?;

        info!(
            "Database connected & migrations applied (pool: {}-{})",
            min_connections, max_connections
        );

        Ok(Self { conn })
    }

    pub async fn ping(&self) -> Result<()> {
        let backend = self.conn.get_database_backend();
        self.conn
            .query_one(Statement::from_string(backend, "SELECT 1".to_string()))
            .await?;
        Ok(())
    }

    fn download_repo(&self) -> repositories::download::DownloadRepository {
        repositories::download::DownloadRepository::new(self.conn.clone())
    }

    pub async fn exists(&self, name: &str) -> Result<bool, PersistenceError> {
        self.download_repo().exists(name).await
    }

    pub async fn get(&self, name: &str) -> Result<Option<DownloadRecord>, PersistenceError> {
        self.download_repo().get(name).await
    }

    pub async fn upsert(&self, record: &DownloadRecord) -> Result<(), PersistenceError> {
        self.download_repo().upsert(record).await
    }

    pub async fn recent(&self, limit: u64) -> Result<Vec<DownloadRecord>, PersistenceError> {
        self.download_repo().recent(limit).await
    }

    pub async fn count(&self) -> Result<u64, PersistenceError> {
        self.download_repo().count().await
    }
}
