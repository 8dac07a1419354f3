//! PostgreSQL storage backend

use crate::blob;
use async_trait::async_trait;
use scribe_core::{Document, DocumentId, DocumentRepository, RepositoryError, RepositoryStats};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;
use tracing::debug;

/// PostgreSQL storage backend
pub struct PostgresStorage {
    pool: PgPool,
}

impl PostgresStorage {
    /// Connect and make sure the schema exists
    pub async fn new(database_url: &str) -> Result<Self, RepositoryError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(|e| RepositoryError::Connection(e.to_string()))?;

        let storage = Self { pool };
        storage.init_schema().await?;

        Ok(storage)
    }

    /// Create with an existing connection pool
    pub fn with_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn init_schema(&self) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                id TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL,
                version BIGINT NOT NULL,
                data BYTEA NOT NULL,
                updated_at BIGINT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_documents_updated_at ON documents(updated_at DESC)",
        )
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        debug!("PostgreSQL schema ready");
        Ok(())
    }
}

#[async_trait]
impl DocumentRepository for PostgresStorage {
    async fn save(&self, document: &Document) -> Result<(), RepositoryError> {
        let data = blob::encode(document)?;

        sqlx::query(
            r#"
            INSERT INTO documents (id, owner_id, version, data, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE SET
                version = EXCLUDED.version,
                data = EXCLUDED.data,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(document.id().as_str())
        .bind(document.owner_id())
        .bind(document.version() as i64)
        .bind(&data)
        .bind(document.updated_at() as i64)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(())
    }

    async fn load(&self, id: &DocumentId) -> Result<Option<Document>, RepositoryError> {
        let row = sqlx::query("SELECT data FROM documents WHERE id = $1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;

        match row {
            Some(row) => {
                let data: Vec<u8> = row.get("data");
                Ok(Some(blob::decode(&data)?))
            }
            None => Ok(None),
        }
    }

    async fn list(&self) -> Result<Vec<DocumentId>, RepositoryError> {
        let rows = sqlx::query("SELECT id FROM documents ORDER BY updated_at DESC")
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;

        let ids: Vec<DocumentId> = rows
            .iter()
            .filter_map(|row| blob::stored_id(row.try_get::<String, _>("id")))
            .collect();

        Ok(ids)
    }

    async fn exists(&self, id: &DocumentId) -> Result<bool, RepositoryError> {
        let row = sqlx::query("SELECT 1 FROM documents WHERE id = $1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;

        Ok(row.is_some())
    }

    async fn stats(&self) -> Result<RepositoryStats, RepositoryError> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS count, COALESCE(SUM(LENGTH(data)), 0)::BIGINT AS size FROM documents",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(db_error)?;

        let document_count: i64 = row.get("count");
        let total_size: i64 = row.get("size");

        Ok(RepositoryStats {
            document_count: document_count as usize,
            total_size_bytes: total_size as usize,
        })
    }
}

fn db_error(e: sqlx::Error) -> RepositoryError {
    RepositoryError::Database(e.to_string())
}
