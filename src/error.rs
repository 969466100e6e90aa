use std::collections::TryReserveError;

use thiserror::Error;

/// Everything that can go wrong while managing pools and their segments.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AllocError {
  #[error("registry is already initialized")]
  AlreadyInitialized,

  #[error("registry is not initialized")]
  NotInitialized,

  #[error("registry still holds {0} open pool(s)")]
  PoolsStillOpen(usize),

  #[error("resource exhausted: {0}")]
  ResourceExhausted(String),

  #[error("pool has no free segments")]
  NoFreeSpace,

  #[error("no free segment can hold {requested} bytes")]
  NoSufficientSegment { requested: usize },

  #[error("handle does not refer to a live allocation or pool")]
  InvalidHandle,

  #[error("pool still has {allocations} allocation(s) and {gaps} free segment(s)")]
  NotReleasable { allocations: usize, gaps: usize },

  #[error("size must be greater than zero")]
  ZeroSize,

  #[error("invalid configuration: {0}")]
  InvalidConfig(String),

  /// An arena or index invariant broke mid-operation. Always a bug.
  #[error("internal inconsistency: {0}")]
  InternalInconsistency(String),
}

impl From<TryReserveError> for AllocError {
  fn from(err: TryReserveError) -> Self {
    AllocError::ResourceExhausted(err.to_string())
  }
}

pub type Result<T> = std::result::Result<T, AllocError>;
