//! SQL migration definitions for the redraft database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a batch of SQL statements.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            description: "Initial schema: documents, document_revisions, attachments",
            sql: r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS documents (
    id               INTEGER PRIMARY KEY AUTOINCREMENT,
    title            TEXT NOT NULL,
    kind             TEXT NOT NULL DEFAULT 'post',
    content          TEXT NOT NULL,
    seo_title        TEXT,
    meta_description TEXT,
    updated_at       TEXT NOT NULL
);

-- Prior states of a document, written before every content or title change
CREATE TABLE IF NOT EXISTS document_revisions (
    id          TEXT PRIMARY KEY,
    document_id INTEGER NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
    title       TEXT NOT NULL,
    content     TEXT NOT NULL,
    created_at  TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_revisions_document ON document_revisions(document_id);

CREATE TABLE IF NOT EXISTS attachments (
    id  INTEGER PRIMARY KEY,
    url TEXT NOT NULL,
    alt TEXT NOT NULL DEFAULT ''
);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
        },
        Migration {
            version: 2,
            description: "Revisions keep the SEO meta they replaced",
            sql: r#"
ALTER TABLE document_revisions ADD COLUMN seo_title TEXT;
ALTER TABLE document_revisions ADD COLUMN meta_description TEXT;

INSERT INTO schema_migrations (version) VALUES (2);
"#,
        },
    ]
}
