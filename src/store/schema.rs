//! On-disk relational schema: libraries/versions/pages/chunks plus an FTS5
//! shadow table over chunk content.

use sqlx::SqlitePool;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS libraries (
    id   TEXT PRIMARY KEY,
    name TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS versions (
    id                 TEXT PRIMARY KEY,
    library_id         TEXT NOT NULL REFERENCES libraries(id) ON DELETE CASCADE,
    name               TEXT NOT NULL,
    status             TEXT NOT NULL,
    progress_pages     INTEGER NOT NULL DEFAULT 0,
    progress_max_pages INTEGER NOT NULL DEFAULT 0,
    source_url         TEXT,
    scraper_options    TEXT,
    error_message      TEXT,
    started_at         TEXT,
    updated_at         TEXT NOT NULL,
    UNIQUE(library_id, name)
);

CREATE TABLE IF NOT EXISTS pages (
    id           TEXT PRIMARY KEY,
    version_id   TEXT NOT NULL REFERENCES versions(id) ON DELETE CASCADE,
    url          TEXT NOT NULL,
    title        TEXT NOT NULL,
    etag         TEXT,
    last_modified TEXT,
    content_type TEXT NOT NULL,
    depth        INTEGER NOT NULL DEFAULT 0,
    created_at   TEXT NOT NULL,
    updated_at   TEXT NOT NULL,
    UNIQUE(version_id, url)
);

CREATE TABLE IF NOT EXISTS chunks (
    id         TEXT PRIMARY KEY,
    page_id    TEXT NOT NULL REFERENCES pages(id) ON DELETE CASCADE,
    content    TEXT NOT NULL,
    metadata   TEXT NOT NULL,
    sort_order INTEGER NOT NULL,
    has_embedding INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_chunks_page_sort ON chunks(page_id, sort_order);
CREATE INDEX IF NOT EXISTS idx_pages_version ON pages(version_id);
CREATE INDEX IF NOT EXISTS idx_versions_library ON versions(library_id);
CREATE INDEX IF NOT EXISTS idx_versions_status ON versions(status);

CREATE VIRTUAL TABLE IF NOT EXISTS chunks_fts USING fts5(
    content,
    content='chunks',
    content_rowid='rowid'
);

CREATE TRIGGER IF NOT EXISTS chunks_ai AFTER INSERT ON chunks BEGIN
    INSERT INTO chunks_fts(rowid, content) VALUES (new.rowid, new.content);
END;

CREATE TRIGGER IF NOT EXISTS chunks_ad AFTER DELETE ON chunks BEGIN
    INSERT INTO chunks_fts(chunks_fts, rowid, content) VALUES ('delete', old.rowid, old.content);
END;

CREATE TRIGGER IF NOT EXISTS chunks_au AFTER UPDATE ON chunks BEGIN
    INSERT INTO chunks_fts(chunks_fts, rowid, content) VALUES ('delete', old.rowid, old.content);
    INSERT INTO chunks_fts(rowid, content) VALUES (new.rowid, new.content);
END;

CREATE TABLE IF NOT EXISTS embedding_config (
    id        INTEGER PRIMARY KEY CHECK (id = 0),
    provider  TEXT NOT NULL,
    model     TEXT NOT NULL,
    dimension INTEGER NOT NULL,
    spec      TEXT NOT NULL
);
"#;

pub async fn migrate(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(SCHEMA_SQL).execute(pool).await?;
    Ok(())
}
