//! Page/chunk persistence: atomic per-URL replace-on-ingest, structural
//! lookups over a page's chunk tree, and the embedding text format.

use chrono::Utc;
use sqlx::{Row, SqlitePool};
use std::sync::Arc;
use uuid::Uuid;

use crate::core::errors::{AppError, AppResult};
use crate::core::types::{Chunk, ChunkMetadata, Page, ScrapeResult};
use crate::embedder::Embedder;

use super::vectors::VectorIndex;

fn embedding_text(page_title: &str, page_url: &str, path: &[String], content: &str) -> String {
    format!(
        "<title>{}</title>\n<url>{}</url>\n<path>{}</path>\n{}",
        page_title,
        page_url,
        path.join(" / "),
        content
    )
}

fn row_to_chunk(row: &sqlx::sqlite::SqliteRow) -> AppResult<Chunk> {
    let metadata_json: String = row.get("metadata");
    let metadata: ChunkMetadata =
        serde_json::from_str(&metadata_json).map_err(|e| AppError::Other(e.into()))?;
    Ok(Chunk {
        id: row.get("id"),
        page_id: row.get("page_id"),
        content: row.get("content"),
        metadata,
        sort_order: row.get::<i64, _>("sort_order"),
        embedding: None,
    })
}

/// Atomically replaces a URL's page + chunks and (re-)embeds non-empty
/// chunks. Aborts the whole operation if embedding fails non-transiently,
/// leaving the prior page/chunks in place.
pub async fn add_documents(
    pool: &SqlitePool,
    vectors: &VectorIndex,
    version_id: &str,
    depth: u32,
    scrape: &ScrapeResult,
    embedder: Option<&Arc<dyn Embedder>>,
) -> AppResult<String> {
    // Embed before mutating the store so a failed embedding call leaves
    // prior content untouched.
    let texts: Vec<String> = scrape
        .chunks
        .iter()
        .filter(|c| !c.content.trim().is_empty())
        .map(|c| embedding_text(&scrape.title, &scrape.url, &c.path, &c.content))
        .collect();

    let embeddings: Option<Vec<Vec<f32>>> = if let Some(embedder) = embedder {
        if texts.is_empty() {
            Some(Vec::new())
        } else {
            Some(
                embedder
                    .embed_documents(&texts)
                    .await
                    .map_err(|e| AppError::Embedding(e.to_string()))?,
            )
        }
    } else {
        None
    };

    let mut tx = pool.begin().await.map_err(|e| AppError::Other(e.into()))?;

    let existing_page_id: Option<String> = sqlx::query(
        "SELECT id FROM pages WHERE version_id = ? AND url = ?",
    )
    .bind(version_id)
    .bind(&scrape.url)
    .fetch_optional(&mut *tx)
    .await
    .map_err(|e| AppError::Other(e.into()))?
    .map(|r| r.get("id"));

    if let Some(old_page_id) = &existing_page_id {
        sqlx::query("DELETE FROM pages WHERE id = ?")
            .bind(old_page_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::Other(e.into()))?;
        vectors
            .delete_by_page(old_page_id)
            .await
            .map_err(|e| AppError::Other(e))?;
    }

    let page_id = Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();
    sqlx::query(
        "INSERT INTO pages (id, version_id, url, title, etag, last_modified, content_type, depth, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&page_id)
    .bind(version_id)
    .bind(&scrape.url)
    .bind(&scrape.title)
    .bind(&scrape.etag)
    .bind(&scrape.last_modified)
    .bind(&scrape.content_type)
    .bind(depth)
    .bind(&now)
    .bind(&now)
    .execute(&mut *tx)
    .await
    .map_err(|e| AppError::Other(e.into()))?;

    let mut embed_iter = embeddings.as_ref().map(|v| v.iter());
    let mut chunk_ids = Vec::with_capacity(scrape.chunks.len());
    for (sort_order, c) in scrape.chunks.iter().enumerate() {
        let chunk_id = Uuid::new_v4().to_string();
        let metadata = ChunkMetadata {
            path: c.path.clone(),
            level: c.level,
            types: c.types.clone(),
        };
        let metadata_json = serde_json::to_string(&metadata).map_err(|e| AppError::Other(e.into()))?;

        let has_content = !c.content.trim().is_empty();
        let vector = if has_content {
            embed_iter.as_mut().and_then(|it| it.next())
        } else {
            None
        };

        sqlx::query(
            "INSERT INTO chunks (id, page_id, content, metadata, sort_order, has_embedding, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&chunk_id)
        .bind(&page_id)
        .bind(&c.content)
        .bind(&metadata_json)
        .bind(sort_order as i64)
        .bind(vector.is_some())
        .bind(&now)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::Other(e.into()))?;

        if let Some(vec) = vector {
            vectors
                .upsert(&chunk_id, &page_id, vec)
                .await
                .map_err(AppError::Other)?;
        }
        chunk_ids.push(chunk_id);
    }

    tx.commit().await.map_err(|e| AppError::Other(e.into()))?;
    Ok(page_id)
}

pub async fn delete_page(pool: &SqlitePool, vectors: &VectorIndex, page_id: &str) -> AppResult<()> {
    sqlx::query("DELETE FROM pages WHERE id = ?")
        .bind(page_id)
        .execute(pool)
        .await
        .map_err(|e| AppError::Other(e.into()))?;
    vectors.delete_by_page(page_id).await.map_err(AppError::Other)?;
    Ok(())
}

pub async fn delete_pages(pool: &SqlitePool, vectors: &VectorIndex, version_id: &str) -> AppResult<u64> {
    let page_ids: Vec<String> = sqlx::query("SELECT id FROM pages WHERE version_id = ?")
        .bind(version_id)
        .fetch_all(pool)
        .await
        .map_err(|e| AppError::Other(e.into()))?
        .into_iter()
        .map(|r| r.get("id"))
        .collect();

    let n = page_ids.len() as u64;
    sqlx::query("DELETE FROM pages WHERE version_id = ?")
        .bind(version_id)
        .execute(pool)
        .await
        .map_err(|e| AppError::Other(e.into()))?;

    for page_id in page_ids {
        vectors.delete_by_page(&page_id).await.map_err(AppError::Other)?;
    }
    Ok(n)
}

pub async fn get_pages_by_version_id(pool: &SqlitePool, version_id: &str) -> AppResult<Vec<Page>> {
    let rows = sqlx::query("SELECT * FROM pages WHERE version_id = ?")
        .bind(version_id)
        .fetch_all(pool)
        .await
        .map_err(|e| AppError::Other(e.into()))?;

    rows.iter()
        .map(|row| {
            Ok(Page {
                id: row.get("id"),
                version_id: row.get("version_id"),
                url: row.get("url"),
                title: row.get("title"),
                etag: row.get("etag"),
                last_modified: row.get("last_modified"),
                content_type: row.get("content_type"),
                depth: row.get::<i64, _>("depth") as u32,
                created_at: parse_ts(row.get("created_at")),
                updated_at: parse_ts(row.get("updated_at")),
            })
        })
        .collect()
}

fn parse_ts(s: String) -> chrono::DateTime<Utc> {
    chrono::DateTime::parse_from_rfc3339(&s)
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

pub async fn find_chunks_by_url(pool: &SqlitePool, version_id: &str, url: &str) -> AppResult<Vec<Chunk>> {
    let rows = sqlx::query(
        "SELECT c.* FROM chunks c JOIN pages p ON c.page_id = p.id
         WHERE p.version_id = ? AND p.url = ? ORDER BY c.sort_order",
    )
    .bind(version_id)
    .bind(url)
    .fetch_all(pool)
    .await
    .map_err(|e| AppError::Other(e.into()))?;
    rows.iter().map(row_to_chunk).collect()
}

/// Returns chunks in `sort_order` regardless of the order `ids` was given in.
pub async fn find_chunks_by_ids(pool: &SqlitePool, ids: &[String]) -> AppResult<Vec<Chunk>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let placeholders = ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
    let sql = format!(
        "SELECT * FROM chunks WHERE id IN ({placeholders}) ORDER BY page_id, sort_order"
    );
    let mut q = sqlx::query(&sql);
    for id in ids {
        q = q.bind(id);
    }
    let rows = q.fetch_all(pool).await.map_err(|e| AppError::Other(e.into()))?;
    rows.iter().map(row_to_chunk).collect()
}

async fn all_chunks_for_page(pool: &SqlitePool, page_id: &str) -> AppResult<Vec<Chunk>> {
    let rows = sqlx::query("SELECT * FROM chunks WHERE page_id = ? ORDER BY sort_order")
        .bind(page_id)
        .fetch_all(pool)
        .await
        .map_err(|e| AppError::Other(e.into()))?;
    rows.iter().map(row_to_chunk).collect()
}

pub async fn find_parent_chunk(pool: &SqlitePool, chunk_id: &str) -> AppResult<Option<Chunk>> {
    let Some(chunk) = find_chunk(pool, chunk_id).await? else {
        return Ok(None);
    };
    if chunk.metadata.path.is_empty() {
        return Ok(None);
    }
    let parent_path = &chunk.metadata.path[..chunk.metadata.path.len() - 1];
    let siblings = all_chunks_for_page(pool, &chunk.page_id).await?;
    Ok(siblings
        .into_iter()
        .find(|c| c.metadata.path == parent_path))
}

pub async fn find_chunk(pool: &SqlitePool, chunk_id: &str) -> AppResult<Option<Chunk>> {
    let row = sqlx::query("SELECT * FROM chunks WHERE id = ?")
        .bind(chunk_id)
        .fetch_optional(pool)
        .await
        .map_err(|e| AppError::Other(e.into()))?;
    row.as_ref().map(row_to_chunk).transpose()
}

pub async fn find_preceding_sibling_chunks(
    pool: &SqlitePool,
    chunk_id: &str,
    limit: usize,
) -> AppResult<Vec<Chunk>> {
    let Some(chunk) = find_chunk(pool, chunk_id).await? else {
        return Ok(Vec::new());
    };
    if chunk.metadata.path.is_empty() {
        return Ok(Vec::new());
    }
    let parent_path = &chunk.metadata.path[..chunk.metadata.path.len() - 1];
    let siblings = all_chunks_for_page(pool, &chunk.page_id).await?;
    let mut preceding: Vec<Chunk> = siblings
        .into_iter()
        .filter(|c| {
            c.metadata.path.len() == chunk.metadata.path.len()
                && c.metadata.path[..c.metadata.path.len() - 1] == *parent_path
                && c.sort_order < chunk.sort_order
        })
        .collect();
    preceding.sort_by_key(|c| std::cmp::Reverse(c.sort_order));
    preceding.truncate(limit);
    preceding.reverse();
    Ok(preceding)
}

pub async fn find_subsequent_sibling_chunks(
    pool: &SqlitePool,
    chunk_id: &str,
    limit: usize,
) -> AppResult<Vec<Chunk>> {
    let Some(chunk) = find_chunk(pool, chunk_id).await? else {
        return Ok(Vec::new());
    };
    if chunk.metadata.path.is_empty() {
        return Ok(Vec::new());
    }
    let parent_path = &chunk.metadata.path[..chunk.metadata.path.len() - 1];
    let siblings = all_chunks_for_page(pool, &chunk.page_id).await?;
    let mut subsequent: Vec<Chunk> = siblings
        .into_iter()
        .filter(|c| {
            c.metadata.path.len() == chunk.metadata.path.len()
                && c.metadata.path[..c.metadata.path.len() - 1] == *parent_path
                && c.sort_order > chunk.sort_order
        })
        .collect();
    subsequent.sort_by_key(|c| c.sort_order);
    subsequent.truncate(limit);
    Ok(subsequent)
}

pub async fn find_child_chunks(pool: &SqlitePool, chunk_id: &str, limit: usize) -> AppResult<Vec<Chunk>> {
    let Some(chunk) = find_chunk(pool, chunk_id).await? else {
        return Ok(Vec::new());
    };
    let all = all_chunks_for_page(pool, &chunk.page_id).await?;
    let mut children: Vec<Chunk> = all
        .into_iter()
        .filter(|c| {
            c.metadata.path.len() == chunk.metadata.path.len() + 1
                && c.metadata.path.starts_with(&chunk.metadata.path)
        })
        .collect();
    children.sort_by_key(|c| c.sort_order);
    children.truncate(limit);
    Ok(children)
}

pub async fn all_chunks_for_page_public(pool: &SqlitePool, page_id: &str) -> AppResult<Vec<Chunk>> {
    all_chunks_for_page(pool, page_id).await
}
