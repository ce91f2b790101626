//! Error types shared by the store layer, the scheduler core and the session
//! state container.

use std::time::Duration;

use thiserror::Error;

/// Failures reported by a catalog or review store backend.
#[derive(Debug, Error)]
pub enum StoreError {
  /// The stored version no longer matches the one the caller read.
  #[error("version conflict: expected {expected}, found {found}")]
  Conflict { expected: u64, found: u64 },

  #[error("store call timed out after {0:?}")]
  Timeout(Duration),

  #[error("store unavailable: {0}")]
  Unavailable(String),
}

/// Failures of the four core operations.
#[derive(Debug, Error)]
pub enum CoreError {
  #[error("quality must be within 0..=5, got {0}")]
  InvalidQuality(i64),

  #[error("unknown item {0}")]
  UnknownItem(crate::domain::ItemId),

  #[error("unknown exercise {0}")]
  UnknownExercise(String),

  #[error("review update for item {item} kept conflicting after {attempts} attempts")]
  ContendedUpdate { item: crate::domain::ItemId, attempts: u32 },

  #[error(transparent)]
  Store(#[from] StoreError),
}

pub type CoreResult<T> = Result<T, CoreError>;
