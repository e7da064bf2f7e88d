//! FTS query sanitization and hybrid (vector + full-text) search via
//! reciprocal-rank fusion.

use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use std::sync::Arc;

use crate::core::errors::{AppError, AppResult};
use crate::core::types::ChunkHit;
use crate::embedder::Embedder;

use super::chunks::find_chunk;
use super::vectors::VectorIndex;

const RANK_CONSTANT: f64 = 60.0;

fn escape_phrase(s: &str) -> String {
    s.replace('"', "\"\"")
}

/// Builds a safe FTS5 MATCH expression from free-text user input.
///
/// Every emitted term is wrapped as a quoted phrase, which both escapes FTS5
/// syntax characters and strips operator meaning from bare `AND`/`OR`/`NOT`/
/// `NEAR` tokens — wrapping in quotes is sufficient to "downgrade" them,
/// since FTS5 phrase syntax has no operator semantics inside quotes.
pub fn sanitize_fts_query(input: &str) -> String {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    let quote_count = trimmed.matches('"').count();
    let normalized = if quote_count % 2 == 1 {
        format!("{trimmed}\"")
    } else {
        trimmed.to_string()
    };

    let mut terms: Vec<String> = Vec::new();
    for (i, segment) in normalized.split('"').enumerate() {
        if segment.is_empty() {
            continue;
        }
        if i % 2 == 0 {
            for token in segment.split_whitespace() {
                terms.push(format!("\"{}\"", escape_phrase(token)));
            }
        } else {
            let phrase = segment.trim();
            if !phrase.is_empty() {
                terms.push(format!("\"{}\"", escape_phrase(phrase)));
            }
        }
    }

    if terms.is_empty() {
        return String::new();
    }

    // Exact-phrase bonus: the untouched original input also participates,
    // so a literal substring match ranks at least as well as its tokens.
    let bonus = format!("\"{}\"", escape_phrase(trimmed));
    if !terms.contains(&bonus) {
        terms.push(bonus);
    }

    terms.join(" OR ")
}

async fn fts_candidates(
    pool: &SqlitePool,
    version_id: &str,
    fts_expr: &str,
    limit: usize,
) -> AppResult<Vec<String>> {
    if fts_expr.is_empty() {
        return Ok(Vec::new());
    }
    let rows = sqlx::query(
        "SELECT c.id AS id FROM chunks_fts
         JOIN chunks c ON chunks_fts.rowid = c.rowid
         JOIN pages p ON c.page_id = p.id
         WHERE chunks_fts MATCH ? AND p.version_id = ?
         ORDER BY rank LIMIT ?",
    )
    .bind(fts_expr)
    .bind(version_id)
    .bind(limit as i64)
    .fetch_all(pool)
    .await
    .map_err(|e| AppError::Other(e.into()))?;

    Ok(rows.into_iter().map(|r| r.get("id")).collect())
}

async fn valid_chunk_ids_for_version(
    pool: &SqlitePool,
    version_id: &str,
) -> AppResult<std::collections::HashSet<String>> {
    let rows = sqlx::query(
        "SELECT c.id AS id FROM chunks c JOIN pages p ON c.page_id = p.id WHERE p.version_id = ?",
    )
    .bind(version_id)
    .fetch_all(pool)
    .await
    .map_err(|e| AppError::Other(e.into()))?;
    Ok(rows.into_iter().map(|r| r.get("id")).collect())
}

/// `find_by_content`: fuses vector and FTS ranks with
/// reciprocal-rank fusion. Degrades to FTS-only when no embedder is
/// configured.
pub async fn find_by_content(
    pool: &SqlitePool,
    vectors: &VectorIndex,
    embedder: Option<&Arc<dyn Embedder>>,
    version_id: &str,
    query: &str,
    k: usize,
) -> AppResult<Vec<ChunkHit>> {
    let over_fetch = k.max(10);
    let fts_expr = sanitize_fts_query(query);
    let fts_ids = fts_candidates(pool, version_id, &fts_expr, over_fetch).await?;

    let mut fts_rank: HashMap<String, u32> = HashMap::new();
    for (i, id) in fts_ids.iter().enumerate() {
        fts_rank.insert(id.clone(), (i + 1) as u32);
    }

    let mut vec_rank: HashMap<String, u32> = HashMap::new();
    if let Some(embedder) = embedder {
        let query_vec = embedder
            .embed_query(query)
            .await
            .map_err(|e| AppError::Embedding(e.to_string()))?;
        let valid = valid_chunk_ids_for_version(pool, version_id).await?;
        let candidates = vectors
            .search(&query_vec, over_fetch * 4)
            .await
            .map_err(AppError::Other)?;
        let mut rank = 0u32;
        for (chunk_id, _distance) in candidates {
            if !valid.contains(&chunk_id) {
                continue;
            }
            rank += 1;
            vec_rank.insert(chunk_id, rank);
            if rank as usize >= over_fetch {
                break;
            }
        }
    }

    let mut ids: Vec<String> = fts_rank.keys().cloned().collect();
    for id in vec_rank.keys() {
        if !ids.contains(id) {
            ids.push(id.clone());
        }
    }

    let mut scored: Vec<(String, f64, Option<u32>, Option<u32>, usize)> = ids
        .into_iter()
        .enumerate()
        .map(|(insertion_order, id)| {
            let vr = vec_rank.get(&id).copied();
            let fr = fts_rank.get(&id).copied();
            let mut score = 0.0;
            if let Some(r) = vr {
                score += 1.0 / (RANK_CONSTANT + r as f64);
            }
            if let Some(r) = fr {
                score += 1.0 / (RANK_CONSTANT + r as f64);
            }
            (id, score, vr, fr, insertion_order)
        })
        .collect();

    scored.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.2.unwrap_or(u32::MAX).cmp(&b.2.unwrap_or(u32::MAX)))
            .then_with(|| a.3.unwrap_or(u32::MAX).cmp(&b.3.unwrap_or(u32::MAX)))
            .then_with(|| a.4.cmp(&b.4))
    });
    scored.truncate(k);

    let mut hits = Vec::with_capacity(scored.len());
    for (id, score, vr, fr, _) in scored {
        let Some(chunk) = find_chunk(pool, &id).await? else {
            continue;
        };
        let page_row = sqlx::query("SELECT id, url, title, content_type FROM pages WHERE id = ?")
            .bind(&chunk.page_id)
            .fetch_optional(pool)
            .await
            .map_err(|e| AppError::Other(e.into()))?;
        let Some(page_row) = page_row else { continue };

        hits.push(ChunkHit {
            chunk,
            page_id: page_row.get("id"),
            url: page_row.get("url"),
            title: page_row.get("title"),
            content_type: page_row.get("content_type"),
            score,
            vec_rank: vr,
            fts_rank: fr,
        });
    }

    Ok(hits)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitizes_sql_injection_attempt() {
        let expr = sanitize_fts_query("\"; DROP TABLE documents; --");
        assert!(!expr.is_empty());
        assert!(expr.contains("OR"));
    }

    #[test]
    fn downgrades_operator_keywords() {
        let expr = sanitize_fts_query("foo AND bar");
        assert!(expr.contains("\"AND\""));
        assert!(!expr.contains(" AND "));
    }

    #[test]
    fn handles_unclosed_quote() {
        let expr = sanitize_fts_query("\"unclosed");
        assert!(!expr.is_empty());
    }

    #[test]
    fn handles_decorator_and_ampersand() {
        assert!(!sanitize_fts_query("@decorator").is_empty());
        assert!(!sanitize_fts_query("foo & bar").is_empty());
        assert!(!sanitize_fts_query("test*").is_empty());
    }
}
