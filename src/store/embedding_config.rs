//! The process-wide embedding configuration singleton: once
//! recorded, a store refuses to open against a different dimension.

use sqlx::{Row, SqlitePool};

use crate::core::errors::{AppError, AppResult};
use crate::core::types::EmbeddingConfig;

pub async fn get(pool: &SqlitePool) -> AppResult<Option<EmbeddingConfig>> {
    let row = sqlx::query("SELECT provider, model, dimension, spec FROM embedding_config WHERE id = 0")
        .fetch_optional(pool)
        .await
        .map_err(|e| AppError::Other(e.into()))?;

    Ok(row.map(|r| EmbeddingConfig {
        provider: r.get("provider"),
        model: r.get("model"),
        dimension: r.get::<i64, _>("dimension") as u32,
        spec: r.get("spec"),
    }))
}

/// Records the embedding config on first write, or verifies an unchanged
/// dimension on subsequent opens.
pub async fn ensure(pool: &SqlitePool, candidate: &EmbeddingConfig) -> AppResult<()> {
    match get(pool).await? {
        None => {
            sqlx::query(
                "INSERT INTO embedding_config (id, provider, model, dimension, spec) VALUES (0, ?, ?, ?, ?)",
            )
            .bind(&candidate.provider)
            .bind(&candidate.model)
            .bind(candidate.dimension)
            .bind(&candidate.spec)
            .execute(pool)
            .await
            .map_err(|e| AppError::Other(e.into()))?;
            Ok(())
        }
        Some(existing) if existing.dimension != candidate.dimension => {
            Err(AppError::StoreIntegrity(format!(
                "store was initialized with embedding dimension {} ({}), cannot open with dimension {} ({})",
                existing.dimension, existing.spec, candidate.dimension, candidate.spec
            )))
        }
        Some(_) => Ok(()),
    }
}
