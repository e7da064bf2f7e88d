//! Library/version catalog: creation, lookup, status transitions, and the
//! fuzzy-suggestion helper used by not-found errors.

use chrono::Utc;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::core::errors::{AppError, AppResult};
use crate::core::types::{
    normalize_name, normalize_version_input, FindVersionResult, LibrarySummary, ScraperOptions,
    Version, VersionStatus, VersionSummary,
};

use super::version_order::{compare_versions, is_parseable};

/// Finds or creates the library/version rows for `(library, version)`,
/// returning the version id. Idempotent under case/whitespace variation.
pub async fn resolve_version(
    pool: &SqlitePool,
    library: &str,
    version: Option<&str>,
) -> AppResult<String> {
    let lib_name = normalize_name(library);
    if lib_name.is_empty() {
        return Err(AppError::Validation("library name must not be empty".into()));
    }
    let version_name = normalize_version_input(version);

    let mut tx = pool.begin().await.map_err(|e| AppError::Other(e.into()))?;

    let library_id: String = match sqlx::query("SELECT id FROM libraries WHERE name = ?")
        .bind(&lib_name)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| AppError::Other(e.into()))?
    {
        Some(row) => row.get("id"),
        None => {
            let id = Uuid::new_v4().to_string();
            sqlx::query("INSERT INTO libraries (id, name) VALUES (?, ?)")
                .bind(&id)
                .bind(&lib_name)
                .execute(&mut *tx)
                .await
                .map_err(|e| AppError::Other(e.into()))?;
            id
        }
    };

    let version_id: String = match sqlx::query(
        "SELECT id FROM versions WHERE library_id = ? AND name = ?",
    )
    .bind(&library_id)
    .bind(&version_name)
    .fetch_optional(&mut *tx)
    .await
    .map_err(|e| AppError::Other(e.into()))?
    {
        Some(row) => row.get("id"),
        None => {
            let id = Uuid::new_v4().to_string();
            let now = Utc::now().to_rfc3339();
            sqlx::query(
                "INSERT INTO versions (id, library_id, name, status, progress_pages, progress_max_pages, updated_at)
                 VALUES (?, ?, ?, ?, 0, 0, ?)",
            )
            .bind(&id)
            .bind(&library_id)
            .bind(&version_name)
            .bind(VersionStatus::NotIndexed.to_string())
            .bind(&now)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::Other(e.into()))?;
            id
        }
    };

    tx.commit().await.map_err(|e| AppError::Other(e.into()))?;
    Ok(version_id)
}

fn row_to_version(row: &sqlx::sqlite::SqliteRow) -> AppResult<Version> {
    let status_str: String = row.get("status");
    let status = parse_status(&status_str)?;
    let scraper_options: Option<String> = row.get("scraper_options");
    let scraper_options = scraper_options
        .and_then(|s| serde_json::from_str::<ScraperOptions>(&s).ok());
    let started_at: Option<String> = row.get("started_at");
    let updated_at: String = row.get("updated_at");

    Ok(Version {
        id: row.get("id"),
        library_id: row.get("library_id"),
        name: row.get("name"),
        status,
        progress_pages: row.get::<i64, _>("progress_pages") as u32,
        progress_max_pages: row.get::<i64, _>("progress_max_pages") as u32,
        source_url: row.get("source_url"),
        scraper_options,
        error_message: row.get("error_message"),
        started_at: started_at.and_then(|s| chrono::DateTime::parse_from_rfc3339(&s).ok()).map(|d| d.with_timezone(&Utc)),
        updated_at: chrono::DateTime::parse_from_rfc3339(&updated_at)
            .map(|d| d.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
    })
}

fn parse_status(s: &str) -> AppResult<VersionStatus> {
    use VersionStatus::*;
    Ok(match s {
        "NOT_INDEXED" => NotIndexed,
        "QUEUED" => Queued,
        "RUNNING" => Running,
        "COMPLETED" => Completed,
        "FAILED" => Failed,
        "CANCELLED" => Cancelled,
        "UPDATING" => Updating,
        other => {
            return Err(AppError::StoreIntegrity(format!(
                "unknown version status in store: {other}"
            )))
        }
    })
}

pub async fn get_version(pool: &SqlitePool, version_id: &str) -> AppResult<Version> {
    let row = sqlx::query("SELECT * FROM versions WHERE id = ?")
        .bind(version_id)
        .fetch_optional(pool)
        .await
        .map_err(|e| AppError::Other(e.into()))?
        .ok_or_else(|| AppError::NotFound(format!("version {version_id}")))?;
    row_to_version(&row)
}

pub async fn update_version_status(
    pool: &SqlitePool,
    version_id: &str,
    new: VersionStatus,
    error_message: Option<&str>,
) -> AppResult<VersionStatus> {
    let current = get_version(pool, version_id).await?;
    if !current.status.can_transition_to(new) {
        return Err(AppError::IllegalTransition {
            from: current.status.to_string(),
            to: new.to_string(),
        });
    }

    let now = Utc::now().to_rfc3339();
    let started_at = if matches!(new, VersionStatus::Running) && current.started_at.is_none() {
        Some(now.clone())
    } else {
        None
    };

    sqlx::query(
        "UPDATE versions SET status = ?, error_message = ?, updated_at = ?,
         started_at = COALESCE(?, started_at) WHERE id = ?",
    )
    .bind(new.to_string())
    .bind(error_message)
    .bind(&now)
    .bind(started_at)
    .bind(version_id)
    .execute(pool)
    .await
    .map_err(|e| AppError::Other(e.into()))?;

    Ok(new)
}

pub async fn update_version_progress(
    pool: &SqlitePool,
    version_id: &str,
    pages: u32,
    max_pages: u32,
) -> AppResult<()> {
    sqlx::query(
        "UPDATE versions SET progress_pages = ?, progress_max_pages = ?, updated_at = ? WHERE id = ?",
    )
    .bind(pages)
    .bind(max_pages)
    .bind(Utc::now().to_rfc3339())
    .bind(version_id)
    .execute(pool)
    .await
    .map_err(|e| AppError::Other(e.into()))?;
    Ok(())
}

pub async fn set_scraper_options(
    pool: &SqlitePool,
    version_id: &str,
    source_url: &str,
    options: &ScraperOptions,
) -> AppResult<()> {
    let serialized = serde_json::to_string(options).map_err(|e| AppError::Other(e.into()))?;
    sqlx::query("UPDATE versions SET source_url = ?, scraper_options = ?, updated_at = ? WHERE id = ?")
        .bind(source_url)
        .bind(serialized)
        .bind(Utc::now().to_rfc3339())
        .bind(version_id)
        .execute(pool)
        .await
        .map_err(|e| AppError::Other(e.into()))?;
    Ok(())
}

pub async fn get_versions_by_status(
    pool: &SqlitePool,
    status: VersionStatus,
) -> AppResult<Vec<Version>> {
    let rows = sqlx::query("SELECT * FROM versions WHERE status = ?")
        .bind(status.to_string())
        .fetch_all(pool)
        .await
        .map_err(|e| AppError::Other(e.into()))?;
    rows.iter().map(row_to_version).collect()
}

pub async fn find_versions_by_source_url(
    pool: &SqlitePool,
    source_url: &str,
) -> AppResult<Vec<Version>> {
    let rows = sqlx::query("SELECT * FROM versions WHERE source_url = ?")
        .bind(source_url)
        .fetch_all(pool)
        .await
        .map_err(|e| AppError::Other(e.into()))?;
    rows.iter().map(row_to_version).collect()
}

/// `remove_version`: cascades to pages/chunks via FK; deletes the owning
/// library when this was its last version.
pub async fn remove_version(pool: &SqlitePool, version_id: &str) -> AppResult<()> {
    let library_id: String = sqlx::query("SELECT library_id FROM versions WHERE id = ?")
        .bind(version_id)
        .fetch_optional(pool)
        .await
        .map_err(|e| AppError::Other(e.into()))?
        .ok_or_else(|| AppError::NotFound(format!("version {version_id}")))?
        .get("library_id");

    sqlx::query("DELETE FROM versions WHERE id = ?")
        .bind(version_id)
        .execute(pool)
        .await
        .map_err(|e| AppError::Other(e.into()))?;

    let remaining: i64 = sqlx::query("SELECT COUNT(*) AS n FROM versions WHERE library_id = ?")
        .bind(&library_id)
        .fetch_one(pool)
        .await
        .map_err(|e| AppError::Other(e.into()))?
        .get("n");

    if remaining == 0 {
        sqlx::query("DELETE FROM libraries WHERE id = ?")
            .bind(&library_id)
            .execute(pool)
            .await
            .map_err(|e| AppError::Other(e.into()))?;
    }

    Ok(())
}

pub async fn get_library_name(pool: &SqlitePool, library_id: &str) -> AppResult<String> {
    let row = sqlx::query("SELECT name FROM libraries WHERE id = ?")
        .bind(library_id)
        .fetch_optional(pool)
        .await
        .map_err(|e| AppError::Other(e.into()))?
        .ok_or_else(|| AppError::NotFound(format!("library {library_id}")))?;
    Ok(row.get("name"))
}

/// Startup-only recovery escape hatch (§4.4 Recovery): bypasses the normal
/// transition table to force an orphaned QUEUED/RUNNING/UPDATING version
/// back to QUEUED so the scheduler can pick it up fresh. `started_at` is
/// untouched.
pub async fn force_reset_to_queued(pool: &SqlitePool, version_id: &str) -> AppResult<()> {
    sqlx::query("UPDATE versions SET status = ?, updated_at = ? WHERE id = ?")
        .bind(VersionStatus::Queued.to_string())
        .bind(Utc::now().to_rfc3339())
        .bind(version_id)
        .execute(pool)
        .await
        .map_err(|e| AppError::Other(e.into()))?;
    Ok(())
}

pub async fn list_libraries(pool: &SqlitePool) -> AppResult<Vec<LibrarySummary>> {
    let lib_rows = sqlx::query("SELECT id, name FROM libraries ORDER BY name")
        .fetch_all(pool)
        .await
        .map_err(|e| AppError::Other(e.into()))?;

    let mut out = Vec::with_capacity(lib_rows.len());
    for lib in lib_rows {
        let library_id: String = lib.get("id");
        let library_name: String = lib.get("name");
        let mut versions = list_versions(pool, &library_id).await?;
        versions.sort_by(|a, b| compare_versions(&a.version, &b.version));
        out.push(LibrarySummary {
            library: library_name,
            versions,
        });
    }
    Ok(out)
}

pub async fn list_versions_by_library_name(pool: &SqlitePool, library: &str) -> AppResult<Vec<VersionSummary>> {
    let lib_name = normalize_name(library);
    let library_id: String = sqlx::query("SELECT id FROM libraries WHERE name = ?")
        .bind(&lib_name)
        .fetch_optional(pool)
        .await
        .map_err(|e| AppError::Other(e.into()))?
        .ok_or_else(|| AppError::NotFound(format!("library '{library}'")))?
        .get("id");

    let mut versions = list_versions(pool, &library_id).await?;
    versions.retain(|v| is_parseable(&v.version));
    versions.sort_by(|a, b| compare_versions(&a.version, &b.version));
    Ok(versions)
}

pub async fn list_versions(pool: &SqlitePool, library_id: &str) -> AppResult<Vec<VersionSummary>> {
    let rows = sqlx::query("SELECT * FROM versions WHERE library_id = ?")
        .bind(library_id)
        .fetch_all(pool)
        .await
        .map_err(|e| AppError::Other(e.into()))?;

    rows.iter()
        .map(|row| {
            let v = row_to_version(row)?;
            Ok(VersionSummary {
                version: v.name,
                status: v.status,
                pages: v.progress_pages,
                max_pages: v.progress_max_pages,
                indexed_at: v.started_at,
                source_url: v.source_url,
            })
        })
        .collect()
}

/// `find_version`: resolves a target version against what's indexed, with
/// fuzzy library-name suggestions on a miss (SPEC_FULL §B).
pub async fn find_version(
    pool: &SqlitePool,
    library: &str,
    target: Option<&str>,
) -> AppResult<FindVersionResult> {
    let lib_name = normalize_name(library);
    let library_id: Option<String> = sqlx::query("SELECT id FROM libraries WHERE name = ?")
        .bind(&lib_name)
        .fetch_optional(pool)
        .await
        .map_err(|e| AppError::Other(e.into()))?
        .map(|r| r.get("id"));

    let Some(library_id) = library_id else {
        return Ok(FindVersionResult {
            best_match: None,
            has_unversioned: false,
        });
    };

    let mut names: Vec<String> = sqlx::query("SELECT name FROM versions WHERE library_id = ?")
        .bind(&library_id)
        .fetch_all(pool)
        .await
        .map_err(|e| AppError::Other(e.into()))?
        .into_iter()
        .map(|r| r.get::<String, _>("name"))
        .collect();

    let has_unversioned = names.iter().any(|n| n.is_empty());
    names.sort_by(|a, b| compare_versions(a, b));

    let target_norm = target.map(normalize_version_input);
    let best_match = match target_norm {
        Some(t) if !t.is_empty() => names.into_iter().find(|n| n == &t),
        _ => names.into_iter().rev().find(|n| !n.is_empty()).or(Some(String::new())),
    };

    Ok(FindVersionResult {
        best_match,
        has_unversioned,
    })
}

/// Bounded fuzzy search over known library names for not-found suggestions.
pub async fn suggest_library_names(pool: &SqlitePool, attempted: &str) -> AppResult<Vec<String>> {
    let names: Vec<String> = sqlx::query("SELECT name FROM libraries")
        .fetch_all(pool)
        .await
        .map_err(|e| AppError::Other(e.into()))?
        .into_iter()
        .map(|r| r.get::<String, _>("name"))
        .collect();

    let attempted_norm = normalize_name(attempted);
    let mut scored: Vec<(String, f64)> = names
        .into_iter()
        .map(|n| {
            let ratio = similarity_ratio(&attempted_norm, &n);
            (n, ratio)
        })
        .filter(|(_, ratio)| *ratio >= 0.7)
        .collect();

    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    Ok(scored.into_iter().take(3).map(|(n, _)| n).collect())
}

fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut row: Vec<usize> = (0..=b.len()).collect();

    for i in 1..=a.len() {
        let mut prev = row[0];
        row[0] = i;
        for j in 1..=b.len() {
            let tmp = row[j];
            row[j] = if a[i - 1] == b[j - 1] {
                prev
            } else {
                1 + prev.min(row[j]).min(row[j - 1])
            };
            prev = tmp;
        }
    }
    row[b.len()]
}

fn similarity_ratio(a: &str, b: &str) -> f64 {
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    1.0 - (levenshtein(a, b) as f64 / max_len as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn similarity_ratio_exact_match_is_one() {
        assert_eq!(similarity_ratio("react", "react"), 1.0);
    }

    #[test]
    fn similarity_ratio_catches_typo() {
        assert!(similarity_ratio("reactt", "react") >= 0.7);
    }
}
