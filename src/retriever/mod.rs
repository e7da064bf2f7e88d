//! Assembly of raw hybrid-search hits into coherent passages.
//!
//! `store::search::find_by_content` returns individual chunk hits; this module
//! groups them by page and expands each group into a passage shaped for how
//! that content actually reads. Prose pages (docs, guides) read best as a
//! paragraph with its immediate surroundings; structured pages (code, JSON,
//! config) read best as the whole enclosing block, since a lone line out of a
//! function or object is usually meaningless on its own.

use std::collections::HashMap;
use std::sync::Arc;

use crate::core::errors::AppResult;
use crate::core::types::{Chunk, ChunkHit, SearchResult};
use crate::embedder::Embedder;
use crate::store::Store;

/// Parent-chain walks are bounded to guard against a pathological or
/// corrupted path list; real documents never nest this deep.
const MAX_CHAIN_DEPTH: usize = 50;

/// Runs a hybrid search and assembles each hit's surrounding context into a
/// passage per page. Always returns at least one result when `limit > 0` and
/// the version has matching content; never panics on a content type the
/// pipelines didn't produce.
pub async fn search(
    store: &Store,
    embedder: Option<&Arc<dyn Embedder>>,
    version_id: &str,
    query: &str,
    limit: usize,
) -> AppResult<Vec<SearchResult>> {
    let hits = store.find_by_content(embedder, version_id, query, limit).await?;
    if hits.is_empty() {
        return Ok(Vec::new());
    }

    let mut by_url: HashMap<String, Vec<ChunkHit>> = HashMap::new();
    let mut url_order: Vec<String> = Vec::new();
    for hit in hits {
        if !by_url.contains_key(&hit.url) {
            url_order.push(hit.url.clone());
        }
        by_url.entry(hit.url.clone()).or_default().push(hit);
    }

    let mut results = Vec::with_capacity(url_order.len());
    for url in url_order {
        let group = by_url.remove(&url).expect("just inserted");
        let content_type = group[0].content_type.clone();
        let score = group.iter().fold(f64::MIN, |acc, h| acc.max(h.score));

        let content = if is_structured(&content_type) {
            assemble_hierarchical(store, &group).await?
        } else {
            assemble_prose(store, &group).await?
        };

        results.push(SearchResult {
            url,
            content,
            score,
            mime_type: content_type,
        });
    }

    Ok(results)
}

fn is_structured(content_type: &str) -> bool {
    matches!(content_type, "code" | "json" | "config") || content_type.contains("x-source-code")
}

/// Collects each hit's chunk, its parent, one preceding and two subsequent
/// siblings, and up to three children; dedups by chunk id across hits in the
/// group, then joins everything in document order.
async fn assemble_prose(store: &Store, hits: &[ChunkHit]) -> AppResult<String> {
    let mut collected: HashMap<String, Chunk> = HashMap::new();

    for hit in hits {
        let chunk = hit.chunk.clone();
        let chunk_id = chunk.id.clone();
        collected.insert(chunk_id.clone(), chunk);

        if let Some(parent) = store.find_parent_chunk(&chunk_id).await? {
            collected.entry(parent.id.clone()).or_insert(parent);
        }
        for sib in store.find_preceding_sibling_chunks(&chunk_id, 1).await? {
            collected.entry(sib.id.clone()).or_insert(sib);
        }
        for sib in store.find_subsequent_sibling_chunks(&chunk_id, 2).await? {
            collected.entry(sib.id.clone()).or_insert(sib);
        }
        for child in store.find_child_chunks(&chunk_id, 3).await? {
            collected.entry(child.id.clone()).or_insert(child);
        }
    }

    Ok(join_in_order(collected.into_values().collect()))
}

/// Structured content is assembled from the full page tree rather than one
/// sibling window, since a single field or line rarely stands on its own.
async fn assemble_hierarchical(store: &Store, hits: &[ChunkHit]) -> AppResult<String> {
    let page_id = hits[0].page_id.clone();
    let all = store.all_chunks_for_page(&page_id).await?;
    let by_path: HashMap<Vec<String>, &Chunk> =
        all.iter().map(|c| (c.metadata.path.clone(), c)).collect();

    let mut collected: HashMap<String, Chunk> = HashMap::new();

    let anchor_path = if hits.len() == 1 {
        let chunk_path = &hits[0].chunk.metadata.path;
        match nearest_structural_ancestor(&by_path, chunk_path) {
            Some(ancestor) => ancestor.metadata.path.clone(),
            None if !chunk_path.is_empty() => chunk_path[..1].to_vec(),
            None => chunk_path.clone(),
        }
    } else {
        let paths: Vec<Vec<String>> = hits.iter().map(|h| h.chunk.metadata.path.clone()).collect();
        let common = longest_common_path_prefix(&paths);
        match find_nearest_existing_prefix(&by_path, &common) {
            Some(existing) => existing,
            None => Vec::new(),
        }
    };

    // Full subtree of each hit chunk (multi-hit) so no hit's own content is
    // lost even if it sits outside the common anchor's most specific node.
    for hit in hits {
        for c in subtree(&all, &hit.chunk.metadata.path) {
            collected.entry(c.id.clone()).or_insert_with(|| c.clone());
        }
    }
    // Full subtree rooted at the shared anchor, plus its parent chain to the
    // document root, so the passage reads as a complete unit in context.
    for c in subtree(&all, &anchor_path) {
        collected.entry(c.id.clone()).or_insert_with(|| c.clone());
    }
    for c in parent_chain(&by_path, &anchor_path) {
        collected.entry(c.id.clone()).or_insert_with(|| c.clone());
    }

    Ok(join_in_order(collected.into_values().collect()))
}

fn join_in_order(mut chunks: Vec<Chunk>) -> String {
    chunks.sort_by_key(|c| c.sort_order);
    chunks.into_iter().map(|c| c.content).collect::<Vec<_>>().join("\n\n")
}

/// Walks up from `path`'s immediate parent looking for a chunk explicitly
/// marked structural. Each step strictly shortens the prefix, so the walk
/// always terminates within `path.len()` iterations; bounded again by
/// `MAX_CHAIN_DEPTH` as a belt-and-braces guard.
fn nearest_structural_ancestor<'a>(
    by_path: &HashMap<Vec<String>, &'a Chunk>,
    path: &[String],
) -> Option<&'a Chunk> {
    let mut len = path.len();
    let mut steps = 0;
    while len > 0 && steps < MAX_CHAIN_DEPTH {
        len -= 1;
        if let Some(c) = by_path.get(&path[..len].to_vec()) {
            if c.metadata.is_structural() {
                return Some(*c);
            }
        }
        steps += 1;
    }
    None
}

/// Finds the longest prefix of `path` that actually has a chunk, tolerating
/// gaps where an intermediate path segment produced no chunk of its own.
fn find_nearest_existing_prefix(
    by_path: &HashMap<Vec<String>, &Chunk>,
    path: &[String],
) -> Option<Vec<String>> {
    let mut len = path.len();
    let mut steps = 0;
    loop {
        if by_path.contains_key(&path[..len].to_vec()) {
            return Some(path[..len].to_vec());
        }
        if len == 0 || steps >= MAX_CHAIN_DEPTH {
            return None;
        }
        len -= 1;
        steps += 1;
    }
}

fn longest_common_path_prefix(paths: &[Vec<String>]) -> Vec<String> {
    let Some(first) = paths.first() else {
        return Vec::new();
    };
    let mut prefix = first.clone();
    for p in &paths[1..] {
        let shared = prefix.iter().zip(p.iter()).take_while(|(a, b)| a == b).count();
        prefix.truncate(shared);
        if prefix.is_empty() {
            break;
        }
    }
    prefix
}

/// Every chunk whose path is `anchor` itself or nested under it.
fn subtree(all: &[Chunk], anchor: &[String]) -> Vec<Chunk> {
    all.iter()
        .filter(|c| c.metadata.path.starts_with(anchor))
        .cloned()
        .collect()
}

/// Every ancestor chunk from the document root down to (and including, if
/// present) `anchor`, skipping path lengths with no chunk of their own.
fn parent_chain<'a>(by_path: &HashMap<Vec<String>, &'a Chunk>, anchor: &[String]) -> Vec<Chunk> {
    let mut out = Vec::new();
    for len in 0..=anchor.len().min(MAX_CHAIN_DEPTH) {
        if let Some(c) = by_path.get(&anchor[..len].to_vec()) {
            out.push((*c).clone());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::ChunkMetadata;

    fn chunk(id: &str, page_id: &str, path: &[&str], types: &[&str], sort_order: i64, content: &str) -> Chunk {
        Chunk {
            id: id.to_string(),
            page_id: page_id.to_string(),
            content: content.to_string(),
            metadata: ChunkMetadata {
                path: path.iter().map(|s| s.to_string()).collect(),
                level: path.len() as u32,
                types: types.iter().map(|s| s.to_string()).collect(),
            },
            sort_order,
            embedding: None,
        }
    }

    #[test]
    fn subtree_includes_self_and_descendants_only() {
        let all = vec![
            chunk("a", "p", &["Foo"], &["structural"], 0, "struct Foo {"),
            chunk("b", "p", &["Foo", "new"], &["structural"], 1, "fn new() {"),
            chunk("c", "p", &["Foo", "new"], &["code"], 2, "body"),
            chunk("d", "p", &["Bar"], &["structural"], 3, "struct Bar {"),
        ];
        let sub = subtree(&all, &["Foo".to_string()]);
        let ids: Vec<&str> = sub.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn nearest_structural_ancestor_skips_non_structural_levels() {
        let all = vec![
            chunk("a", "p", &["Foo"], &["structural"], 0, "struct Foo {"),
            chunk("b", "p", &["Foo", "new"], &["structural"], 1, "fn new() {"),
        ];
        let by_path: HashMap<Vec<String>, &Chunk> =
            all.iter().map(|c| (c.metadata.path.clone(), c)).collect();
        let found = nearest_structural_ancestor(&by_path, &["Foo".to_string(), "new".to_string(), "inner".to_string()]);
        assert_eq!(found.unwrap().id, "b");
    }

    #[test]
    fn longest_common_prefix_of_divergent_paths_is_empty() {
        let paths = vec![vec!["Foo".to_string()], vec!["Bar".to_string()]];
        assert!(longest_common_path_prefix(&paths).is_empty());
    }

    #[test]
    fn longest_common_prefix_of_shared_ancestor() {
        let paths = vec![
            vec!["Foo".to_string(), "a".to_string()],
            vec!["Foo".to_string(), "b".to_string()],
        ];
        assert_eq!(longest_common_path_prefix(&paths), vec!["Foo".to_string()]);
    }

    #[test]
    fn parent_chain_tolerates_gaps() {
        let all = vec![chunk("a", "p", &["Foo"], &["structural"], 0, "struct Foo {")];
        let by_path: HashMap<Vec<String>, &Chunk> =
            all.iter().map(|c| (c.metadata.path.clone(), c)).collect();
        let chain = parent_chain(&by_path, &["Foo".to_string(), "new".to_string()]);
        assert_eq!(chain.len(), 1);
        assert_eq!(chain[0].id, "a");
    }
}
