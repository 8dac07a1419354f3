//! SQLite storage backend

use crate::blob;
use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use scribe_core::{Document, DocumentId, DocumentRepository, RepositoryError, RepositoryStats};
use std::path::Path;
use tracing::debug;

/// SQLite storage backend
///
/// Embedded persistence for single-node setups.
pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    /// Open (or create) the database at `path`
    pub fn new(path: impl AsRef<Path>) -> Result<Self, RepositoryError> {
        let conn = Connection::open(path).map_err(db_error)?;

        let storage = Self {
            conn: Mutex::new(conn),
        };

        storage.init_schema()?;
        Ok(storage)
    }

    /// Create an in-memory SQLite database (for testing)
    pub fn in_memory() -> Result<Self, RepositoryError> {
        let conn = Connection::open_in_memory().map_err(db_error)?;

        let storage = Self {
            conn: Mutex::new(conn),
        };

        storage.init_schema()?;
        Ok(storage)
    }

    fn init_schema(&self) -> Result<(), RepositoryError> {
        let conn = self.conn.lock();

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                id TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL,
                version INTEGER NOT NULL,
                data BLOB NOT NULL,
                updated_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_documents_updated_at ON documents(updated_at);
            "#,
        )
        .map_err(db_error)?;

        debug!("SQLite schema ready");
        Ok(())
    }
}

#[async_trait]
impl DocumentRepository for SqliteStorage {
    async fn save(&self, document: &Document) -> Result<(), RepositoryError> {
        let data = blob::encode(document)?;
        let conn = self.conn.lock();

        conn.execute(
            r#"
            INSERT INTO documents (id, owner_id, version, data, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(id) DO UPDATE SET
                version = excluded.version,
                data = excluded.data,
                updated_at = excluded.updated_at
            "#,
            params![
                document.id().as_str(),
                document.owner_id(),
                document.version() as i64,
                data,
                document.updated_at() as i64,
            ],
        )
        .map_err(db_error)?;

        Ok(())
    }

    async fn load(&self, id: &DocumentId) -> Result<Option<Document>, RepositoryError> {
        let conn = self.conn.lock();

        let data: Option<Vec<u8>> = conn
            .query_row(
                "SELECT data FROM documents WHERE id = ?1",
                params![id.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_error)?;

        data.map(|bytes| blob::decode(&bytes)).transpose()
    }

    async fn list(&self) -> Result<Vec<DocumentId>, RepositoryError> {
        let conn = self.conn.lock();

        let mut stmt = conn
            .prepare("SELECT id FROM documents ORDER BY updated_at DESC")
            .map_err(db_error)?;

        let ids: Vec<DocumentId> = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(db_error)?
            .filter_map(blob::stored_id)
            .collect();

        Ok(ids)
    }

    async fn exists(&self, id: &DocumentId) -> Result<bool, RepositoryError> {
        let conn = self.conn.lock();

        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM documents WHERE id = ?1",
                params![id.as_str()],
                |row| row.get(0),
            )
            .map_err(db_error)?;

        Ok(count > 0)
    }

    async fn stats(&self) -> Result<RepositoryStats, RepositoryError> {
        let conn = self.conn.lock();

        let document_count: i64 = conn
            .query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))
            .map_err(db_error)?;

        let total_size: i64 = conn
            .query_row(
                "SELECT COALESCE(SUM(LENGTH(data)), 0) FROM documents",
                [],
                |row| row.get(0),
            )
            .map_err(db_error)?;

        Ok(RepositoryStats {
            document_count: document_count as usize,
            total_size_bytes: total_size as usize,
        })
    }
}

fn db_error(e: rusqlite::Error) -> RepositoryError {
    RepositoryError::Database(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use scribe_core::{DocumentType, Permission, SuggestionKind};

    #[tokio::test]
    async fn test_sqlite_save_and_load() {
        let storage = SqliteStorage::in_memory().unwrap();
        let mut doc = Document::new("Roadmap", DocumentType::Sheet, "u1", "v1");
        doc.add_collaborator("u1", "u2", Permission::Read).unwrap();
        doc.add_comment("u2", "Bob", "typo", None).unwrap();
        doc.add_suggestion("u1", "Alice", SuggestionKind::Replace, "v1.1", None)
            .unwrap();
        doc.update_content("u1", "v2").unwrap();

        storage.save(&doc).await.unwrap();

        let loaded = storage.load(doc.id()).await.unwrap().unwrap();
        assert_eq!(loaded, doc);
        assert!(storage.exists(doc.id()).await.unwrap());
    }

    #[tokio::test]
    async fn test_sqlite_upsert() {
        let storage = SqliteStorage::in_memory().unwrap();
        let mut doc = Document::new("Roadmap", DocumentType::Doc, "u1", "v1");

        storage.save(&doc).await.unwrap();
        doc.update_content("u1", "v2").unwrap();
        storage.save(&doc).await.unwrap();

        let loaded = storage.load(doc.id()).await.unwrap().unwrap();
        assert_eq!(loaded.content(), "v2");
        assert_eq!(loaded.version(), 2);

        let stats = storage.stats().await.unwrap();
        assert_eq!(stats.document_count, 1);
        assert!(stats.total_size_bytes > 0);
    }

    #[tokio::test]
    async fn test_sqlite_list() {
        let storage = SqliteStorage::in_memory().unwrap();

        for i in 0..3 {
            let doc = Document::new(format!("Doc {}", i), DocumentType::Doc, "u1", "");
            storage.save(&doc).await.unwrap();
        }

        assert_eq!(storage.list().await.unwrap().len(), 3);
        assert!(storage
            .load(&DocumentId::new("doc_absent").unwrap())
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_sqlite_list_skips_invalid_ids() {
        let storage = SqliteStorage::in_memory().unwrap();
        let doc = Document::new("Roadmap", DocumentType::Doc, "u1", "");
        storage.save(&doc).await.unwrap();

        storage
            .conn
            .lock()
            .execute(
                "INSERT INTO documents (id, owner_id, version, data, updated_at) VALUES ('bad id!', 'u1', 1, x'00', 0)",
                [],
            )
            .unwrap();

        assert_eq!(storage.list().await.unwrap(), vec![doc.id().clone()]);
    }
}
