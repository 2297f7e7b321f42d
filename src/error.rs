//! Error types for the matching library.
//!
//! Binaries and the filesystem-facing modules use `anyhow`; the engine and
//! the catalog boundary use these typed errors so callers can tell a
//! rate-limited request apart from a rejected one.

use std::time::Duration;
use thiserror::Error;

/// Composite scoring failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScoreError {
    /// Every (local, hit) field pair had at least one side missing.
    #[error("no comparable fields between local track and candidate")]
    NoComparableFields,
}

/// Failure talking to the remote catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("rate limited by catalog (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    #[error("catalog rejected credentials: {0}")]
    Unauthorized(String),

    #[error("catalog rejected request: {0}")]
    InvalidRequest(String),

    #[error("catalog returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("catalog transport error: {0}")]
    Http(#[from] reqwest::Error),
}

impl CatalogError {
    /// Faults that will fail every following request too.
    pub fn is_fatal(&self) -> bool {
        matches!(self, CatalogError::Unauthorized(_))
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, CatalogError::RateLimited { .. })
    }

    /// Server-suggested back-off, when the catalog sent one.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            CatalogError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

/// Failure of the matching engine as a whole.
#[derive(Debug, Error)]
pub enum MatchError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("catalog fault aborted matching: {0}")]
    Catalog(#[from] CatalogError),
}
