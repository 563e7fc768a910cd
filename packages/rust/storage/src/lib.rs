//! libSQL storage layer for documents, revisions and attachments.
//!
//! The [`Storage`] struct wraps a local libSQL database. Every write that
//! changes a document's title or content first snapshots the prior state into
//! `document_revisions` within the same transaction, so any applied change
//! can be rolled back with [`Storage::restore_revision`].
//!
//! **Access rules:**
//! - read-write via [`Storage::open`]
//! - read-only via [`Storage::open_readonly`] (writes are rejected)

mod migrations;

use std::path::Path;

use chrono::{DateTime, Utc};
use libsql::{Connection, Database, Transaction, params};
use redraft_shared::{Document, DocumentId, RedraftError, Result};
use serde::Serialize;
use uuid::Uuid;

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

/// A stored media attachment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Attachment {
    pub id: i64,
    pub url: String,
    /// Alternative text; empty when none has been written.
    pub alt: String,
}

/// A saved prior state of a document.
#[derive(Debug, Clone, Serialize)]
pub struct Revision {
    pub id: String,
    pub document_id: DocumentId,
    pub title: String,
    pub content: String,
    pub seo_title: Option<String>,
    pub meta_description: Option<String>,
    pub created_at: DateTime<Utc>,
}

fn storage_err(e: libsql::Error) -> RedraftError {
    RedraftError::Storage(e.to_string())
}

const DOCUMENT_COLUMNS: &str =
    "id, title, kind, content, seo_title, meta_description, updated_at";

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| RedraftError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;
        let conn = db.connect().map_err(storage_err)?;

        let storage = Self {
            db,
            conn,
            readonly: false,
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open an existing database at `path` in read-only mode.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(RedraftError::Storage(format!(
                "database not found: {}",
                path.display()
            )));
        }
        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;
        let conn = db.connect().map_err(storage_err)?;

        Ok(Self {
            db,
            conn,
            readonly: true,
        })
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        RedraftError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => match rows.next().await {
                Ok(Some(row)) => row.get::<u32>(0).unwrap_or(0),
                _ => 0,
            },
            Err(_) => 0,
        }
    }

    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(RedraftError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Documents
    // -----------------------------------------------------------------------

    /// Insert a new document. Returns its assigned id.
    pub async fn insert_document(&self, title: &str, kind: &str, content: &str) -> Result<DocumentId> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        let mut rows = self
            .conn
            .query(
                "INSERT INTO documents (title, kind, content, updated_at)
                 VALUES (?1, ?2, ?3, ?4) RETURNING id",
                params![title, kind, content, now.as_str()],
            )
            .await
            .map_err(storage_err)?;

        match rows.next().await.map_err(storage_err)? {
            Some(row) => Ok(DocumentId(row.get::<i64>(0).map_err(storage_err)?)),
            None => Err(RedraftError::Storage("insert returned no id".into())),
        }
    }

    /// Get a document by id.
    pub async fn get_document(&self, id: DocumentId) -> Result<Option<Document>> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = ?1"),
                params![id.0],
            )
            .await
            .map_err(storage_err)?;

        match rows.next().await.map_err(storage_err)? {
            Some(row) => Ok(Some(row_to_document(&row)?)),
            None => Ok(None),
        }
    }

    /// List all documents, newest change first.
    pub async fn list_documents(&self) -> Result<Vec<Document>> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {DOCUMENT_COLUMNS} FROM documents ORDER BY updated_at DESC, id"),
                params![],
            )
            .await
            .map_err(storage_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            results.push(row_to_document(&row)?);
        }
        Ok(results)
    }

    /// Replace a document's content, saving the prior state as a revision.
    /// Returns the revision id.
    pub async fn update_content(&self, id: DocumentId, content: &str) -> Result<String> {
        self.check_writable()?;
        let tx = self.conn.transaction().await.map_err(storage_err)?;
        let revision_id = snapshot(&tx, id).await?;

        tx.execute(
            "UPDATE documents SET content = ?1, updated_at = ?2 WHERE id = ?3",
            params![content, Utc::now().to_rfc3339(), id.0],
        )
        .await
        .map_err(storage_err)?;
        tx.commit().await.map_err(storage_err)?;

        tracing::info!(document = %id, revision = %revision_id, "content updated");
        Ok(revision_id)
    }

    /// Update the title and SEO meta of a document. `None` leaves a field
    /// unchanged. A revision is saved first. Returns the revision id.
    pub async fn update_seo_meta(
        &self,
        id: DocumentId,
        title: Option<&str>,
        meta_description: Option<&str>,
    ) -> Result<String> {
        self.check_writable()?;
        let tx = self.conn.transaction().await.map_err(storage_err)?;
        let revision_id = snapshot(&tx, id).await?;

        tx.execute(
            "UPDATE documents SET
               title = COALESCE(?1, title),
               seo_title = COALESCE(?1, seo_title),
               meta_description = COALESCE(?2, meta_description),
               updated_at = ?3
             WHERE id = ?4",
            params![title, meta_description, Utc::now().to_rfc3339(), id.0],
        )
        .await
        .map_err(storage_err)?;
        tx.commit().await.map_err(storage_err)?;

        tracing::info!(document = %id, revision = %revision_id, "seo meta updated");
        Ok(revision_id)
    }

    /// Revisions of a document, newest first.
    pub async fn list_revisions(&self, id: DocumentId) -> Result<Vec<Revision>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, document_id, title, content, seo_title, meta_description, created_at
                 FROM document_revisions WHERE document_id = ?1 ORDER BY rowid DESC",
                params![id.0],
            )
            .await
            .map_err(storage_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            results.push(row_to_revision(&row)?);
        }
        Ok(results)
    }

    /// Put a document back to the state saved in `revision_id`. The state
    /// being replaced is itself saved as a new revision, whose id is returned.
    pub async fn restore_revision(&self, revision_id: &str) -> Result<String> {
        self.check_writable()?;
        let tx = self.conn.transaction().await.map_err(storage_err)?;

        let mut rows = tx
            .query(
                "SELECT id, document_id, title, content, seo_title, meta_description, created_at
                 FROM document_revisions WHERE id = ?1",
                params![revision_id],
            )
            .await
            .map_err(storage_err)?;
        let revision = match rows.next().await.map_err(storage_err)? {
            Some(row) => row_to_revision(&row)?,
            None => {
                return Err(RedraftError::Storage(format!(
                    "revision not found: {revision_id}"
                )));
            }
        };
        drop(rows);

        let saved = snapshot(&tx, revision.document_id).await?;
        tx.execute(
            "UPDATE documents SET title = ?1, content = ?2, seo_title = ?3,
               meta_description = ?4, updated_at = ?5
             WHERE id = ?6",
            params![
                revision.title.as_str(),
                revision.content.as_str(),
                revision.seo_title.as_deref(),
                revision.meta_description.as_deref(),
                Utc::now().to_rfc3339(),
                revision.document_id.0
            ],
        )
        .await
        .map_err(storage_err)?;
        tx.commit().await.map_err(storage_err)?;

        tracing::info!(document = %revision.document_id, restored = revision_id, "revision restored");
        Ok(saved)
    }

    // -----------------------------------------------------------------------
    // Attachments
    // -----------------------------------------------------------------------

    /// Insert or replace an attachment record.
    pub async fn upsert_attachment(&self, id: i64, url: &str, alt: &str) -> Result<()> {
        self.check_writable()?;
        self.conn
            .execute(
                "INSERT INTO attachments (id, url, alt) VALUES (?1, ?2, ?3)
                 ON CONFLICT(id) DO UPDATE SET url = excluded.url, alt = excluded.alt",
                params![id, url, alt],
            )
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    pub async fn get_attachment(&self, id: i64) -> Result<Option<Attachment>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, url, alt FROM attachments WHERE id = ?1",
                params![id],
            )
            .await
            .map_err(storage_err)?;

        match rows.next().await.map_err(storage_err)? {
            Some(row) => Ok(Some(row_to_attachment(&row)?)),
            None => Ok(None),
        }
    }

    /// Write an attachment's alt text. Returns `false` when no attachment
    /// with that id exists.
    pub async fn set_alt_text(&self, id: i64, alt: &str) -> Result<bool> {
        self.check_writable()?;
        let changed = self
            .conn
            .execute(
                "UPDATE attachments SET alt = ?1 WHERE id = ?2",
                params![alt, id],
            )
            .await
            .map_err(storage_err)?;
        Ok(changed > 0)
    }

    /// Fetch the attachments among `ids` that exist. Unknown ids are skipped.
    pub async fn attachments_for(&self, ids: &[i64]) -> Result<Vec<Attachment>> {
        let mut results = Vec::with_capacity(ids.len());
        for &id in ids {
            if let Some(attachment) = self.get_attachment(id).await? {
                results.push(attachment);
            }
        }
        Ok(results)
    }
}

/// Save the current state of document `id` as a revision inside `tx`.
async fn snapshot(tx: &Transaction, id: DocumentId) -> Result<String> {
    let revision_id = Uuid::now_v7().to_string();
    let inserted = tx
        .execute(
            "INSERT INTO document_revisions
               (id, document_id, title, content, seo_title, meta_description, created_at)
             SELECT ?1, id, title, content, seo_title, meta_description, ?2
             FROM documents WHERE id = ?3",
            params![revision_id.as_str(), Utc::now().to_rfc3339(), id.0],
        )
        .await
        .map_err(storage_err)?;

    if inserted == 0 {
        return Err(RedraftError::Storage(format!("document not found: {id}")));
    }
    Ok(revision_id)
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RedraftError::Storage(format!("invalid date: {e}")))
}

fn row_to_document(row: &libsql::Row) -> Result<Document> {
    Ok(Document {
        id: DocumentId(row.get::<i64>(0).map_err(storage_err)?),
        title: row.get::<String>(1).map_err(storage_err)?,
        kind: row.get::<String>(2).map_err(storage_err)?,
        content: row.get::<String>(3).map_err(storage_err)?,
        seo_title: row.get::<String>(4).ok(),
        meta_description: row.get::<String>(5).ok(),
        updated_at: parse_timestamp(&row.get::<String>(6).map_err(storage_err)?)?,
    })
}

fn row_to_revision(row: &libsql::Row) -> Result<Revision> {
    Ok(Revision {
        id: row.get::<String>(0).map_err(storage_err)?,
        document_id: DocumentId(row.get::<i64>(1).map_err(storage_err)?),
        title: row.get::<String>(2).map_err(storage_err)?,
        content: row.get::<String>(3).map_err(storage_err)?,
        seo_title: row.get::<String>(4).ok(),
        meta_description: row.get::<String>(5).ok(),
        created_at: parse_timestamp(&row.get::<String>(6).map_err(storage_err)?)?,
    })
}

fn row_to_attachment(row: &libsql::Row) -> Result<Attachment> {
    Ok(Attachment {
        id: row.get::<i64>(0).map_err(storage_err)?,
        url: row.get::<String>(1).map_err(storage_err)?,
        alt: row.get::<String>(2).map_err(storage_err)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_db_path() -> std::path::PathBuf {
        std::env::temp_dir().join(format!("redraft_test_{}.db", Uuid::now_v7()))
    }

    async fn test_storage() -> Storage {
        Storage::open(&temp_db_path()).await.expect("open test db")
    }

    #[tokio::test]
    async fn open_and_migrate() {
        let storage = test_storage().await;
        assert_eq!(storage.get_schema_version().await, 2);
    }

    #[tokio::test]
    async fn idempotent_migration() {
        let tmp = temp_db_path();
        let first = Storage::open(&tmp).await.expect("first open");
        drop(first);
        let second = Storage::open(&tmp).await.expect("second open");
        assert_eq!(second.get_schema_version().await, 2);
    }

    #[tokio::test]
    async fn document_crud() {
        let storage = test_storage().await;
        let id = storage
            .insert_document("Hello", "post", "<!-- wp:paragraph --><p>x</p><!-- /wp:paragraph -->")
            .await
            .expect("insert");

        let doc = storage.get_document(id).await.expect("get").expect("exists");
        assert_eq!(doc.title, "Hello");
        assert_eq!(doc.kind, "post");
        assert!(doc.seo_title.is_none());

        assert!(storage.get_document(DocumentId(9999)).await.unwrap().is_none());
        assert_eq!(storage.list_documents().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn content_update_writes_revision() {
        let storage = test_storage().await;
        let id = storage.insert_document("T", "post", "old").await.unwrap();

        let revision_id = storage.update_content(id, "new").await.expect("update");
        let doc = storage.get_document(id).await.unwrap().unwrap();
        assert_eq!(doc.content, "new");

        let revisions = storage.list_revisions(id).await.unwrap();
        assert_eq!(revisions.len(), 1);
        assert_eq!(revisions[0].id, revision_id);
        assert_eq!(revisions[0].content, "old");
    }

    #[tokio::test]
    async fn update_of_missing_document_fails_without_revision() {
        let storage = test_storage().await;
        let result = storage.update_content(DocumentId(42), "x").await;
        assert!(matches!(result, Err(RedraftError::Storage(_))));
        assert!(storage.list_revisions(DocumentId(42)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn seo_meta_update_keeps_unset_fields() {
        let storage = test_storage().await;
        let id = storage.insert_document("Original", "page", "c").await.unwrap();

        storage
            .update_seo_meta(id, None, Some("A short summary."))
            .await
            .unwrap();
        let doc = storage.get_document(id).await.unwrap().unwrap();
        assert_eq!(doc.title, "Original");
        assert_eq!(doc.meta_description.as_deref(), Some("A short summary."));

        storage.update_seo_meta(id, Some("Better title"), None).await.unwrap();
        let doc = storage.get_document(id).await.unwrap().unwrap();
        assert_eq!(doc.title, "Better title");
        assert_eq!(doc.seo_title.as_deref(), Some("Better title"));
        assert_eq!(doc.meta_description.as_deref(), Some("A short summary."));
        assert_eq!(storage.list_revisions(id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn restore_revision_roundtrip() {
        let storage = test_storage().await;
        let id = storage.insert_document("T", "post", "v1").await.unwrap();
        let first = storage.update_content(id, "v2").await.unwrap();

        storage.restore_revision(&first).await.expect("restore");
        let doc = storage.get_document(id).await.unwrap().unwrap();
        assert_eq!(doc.content, "v1");

        let revisions = storage.list_revisions(id).await.unwrap();
        assert_eq!(revisions.len(), 2);
        assert_eq!(revisions[0].content, "v2");

        assert!(storage.restore_revision("missing").await.is_err());
    }

    #[tokio::test]
    async fn attachment_operations() {
        let storage = test_storage().await;
        storage
            .upsert_attachment(5, "https://example.org/a.jpg", "")
            .await
            .unwrap();
        storage
            .upsert_attachment(6, "https://example.org/b.jpg", "A boat")
            .await
            .unwrap();

        assert!(storage.set_alt_text(5, "A quay at dawn").await.unwrap());
        assert!(!storage.set_alt_text(77, "nobody").await.unwrap());

        let found = storage.attachments_for(&[5, 77, 6]).await.unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].alt, "A quay at dawn");
        assert_eq!(found[1].url, "https://example.org/b.jpg");
    }

    #[tokio::test]
    async fn readonly_rejects_writes() {
        let tmp = temp_db_path();
        let rw = Storage::open(&tmp).await.unwrap();
        let id = rw.insert_document("T", "post", "c").await.unwrap();
        drop(rw);

        let ro = Storage::open_readonly(&tmp).await.unwrap();
        assert!(ro.get_document(id).await.unwrap().is_some());
        let result = ro.update_content(id, "x").await;
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("read-only"));
    }

    #[tokio::test]
    async fn readonly_requires_existing_file() {
        assert!(Storage::open_readonly(&temp_db_path()).await.is_err());
    }
}
