//! Typed error kinds with distinct semantics.

use thiserror::Error;

/// Errors raised by the store, crawler, scheduler, and embedder.
///
/// The MCP/HTTP surfaces map these to their own presentation: tool calls
/// surface kind + message; HTTP maps `Validation -> 400`, `NotFound -> 404`,
/// `Auth -> 401`, everything else `-> 500`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("transient fetch error: {0}")]
    TransientFetch(String),

    #[error("permanent fetch error: {0}")]
    PermanentFetch(String),

    #[error("embedding error: {0}")]
    Embedding(String),

    #[error("illegal status transition: {from} -> {to}")]
    IllegalTransition { from: String, to: String },

    #[error("store integrity error: {0}")]
    StoreIntegrity(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AppError {
    pub fn http_status(&self) -> u16 {
        match self {
            AppError::NotFound(_) => 404,
            AppError::Validation(_) | AppError::IllegalTransition { .. } => 400,
            _ => 500,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            AppError::NotFound(_) => "not_found",
            AppError::Validation(_) => "validation",
            AppError::TransientFetch(_) => "transient_fetch",
            AppError::PermanentFetch(_) => "permanent_fetch",
            AppError::Embedding(_) => "embedding",
            AppError::IllegalTransition { .. } => "illegal_transition",
            AppError::StoreIntegrity(_) => "store_integrity",
            AppError::Other(_) => "internal",
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;
