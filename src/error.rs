//! Error types for the offer pipeline.
//!
//! This module provides structured error handling with:
//! - `AppError`: pipeline-level errors crossing stage boundaries
//! - `Result<T>`: Type alias for Results using AppError
//!
//! Port-specific failures (`FetchError`, `EnrichmentFailure`, `AiError`) live
//! next to their ports and are folded into stage reports instead of
//! propagating.

use thiserror::Error;

/// Pipeline-level errors.
///
/// Only repository failures are expected to abort a stage; everything else a
/// stage encounters is recorded in its report.
#[derive(Debug, Error)]
pub enum AppError {
    /// Repository read or write failed
    #[error("Repository error: {0:#}")]
    Repository(anyhow::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Wrap a repository failure
    pub fn repository(err: anyhow::Error) -> Self {
        Self::Repository(err)
    }

    pub fn is_repository(&self) -> bool {
        matches!(self, AppError::Repository(_))
    }
}

/// Result type alias using AppError.
pub type Result<T> = std::result::Result<T, AppError>;
