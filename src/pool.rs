use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::buffer::PoolBuffer;
use crate::config::PoolConfig;
use crate::error::{AllocError, Result};
use crate::gap::GapIndex;
use crate::segment::{SegmentArena, SegmentId};

static NEXT_POOL_ID: AtomicU64 = AtomicU64::new(1);

/// How a pool picks the gap an allocation is carved from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AllocPolicy {
  /// First gap in buffer order that is large enough.
  FirstFit,
  /// Smallest gap that is large enough, lowest address on ties.
  BestFit,
}

/// Handle to a live allocation inside a [`Pool`].
///
/// Handles are plain values and can be copied, but only the first `free`
/// succeeds: every later use of the same handle, or of a handle whose segment
/// has since been reused, is rejected with [`AllocError::InvalidHandle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Allocation {
  pub(crate) pool: u64,
  pub(crate) segment: SegmentId,
  pub(crate) generation: u32,
  pub(crate) offset: usize,
  pub(crate) size: usize,
}

impl Allocation {
  /// Position of the first byte within the pool buffer.
  #[inline]
  pub fn offset(&self) -> usize {
    self.offset
  }

  #[inline]
  pub fn size(&self) -> usize {
    self.size
  }
}

/// Aggregate counters of a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
  pub total_size: usize,
  pub alloc_size: usize,
  pub num_allocs: usize,
  pub num_gaps: usize,
  pub policy: AllocPolicy,
  /// Live segments, allocated or free.
  pub segments: usize,
  pub segment_capacity: usize,
  pub gap_capacity: usize,
}

/// A single allocator over one fixed buffer.
///
/// ```text
///   ┌──────────────────────────────────────────────────────────────┐
///   │                        POOL BUFFER                           │
///   │  ┌────────┬──────────────┬──────┬───────────────────────┐    │
///   │  │ alloc  │     gap      │alloc │          gap          │    │
///   │  └────────┴──────────────┴──────┴───────────────────────┘    │
///   └──────────────────────────────────────────────────────────────┘
///        ▲             ▲                         ▲
///        │             └──── gap index ──────────┘  (sorted by size)
///        └── segment arena (every range, buffer order)
/// ```
///
/// Not thread-safe; a pool belongs to the thread that opened it.
#[derive(Debug)]
pub struct Pool {
  pub(crate) id: u64,
  pub(crate) buffer: PoolBuffer,
  pub(crate) segments: SegmentArena,
  pub(crate) gaps: GapIndex,
  pub(crate) policy: AllocPolicy,
  pub(crate) alloc_size: usize,
  pub(crate) num_allocs: usize,
}

impl Pool {
  /// Opens a pool of `size` bytes with the default capacities.
  pub fn open(
    size: usize,
    policy: AllocPolicy,
  ) -> Result<Self> {
    Self::with_config(size, policy, PoolConfig::default())
  }

  pub fn with_config(
    size: usize,
    policy: AllocPolicy,
    config: PoolConfig,
  ) -> Result<Self> {
    if size == 0 {
      return Err(AllocError::ZeroSize);
    }
    config.validate()?;

    // Each step drops whatever the earlier ones acquired if it fails.
    let buffer = PoolBuffer::allocate(size)?;
    let segments = SegmentArena::new(size, config.segment_capacity, config.segment_growth)?;
    let mut gaps = GapIndex::with_capacity(config.gap_capacity, config.gap_growth)?;

    let head = segments
      .head()
      .ok_or_else(|| AllocError::InternalInconsistency("new arena has no segment".into()))?;
    gaps.insert(size, 0, head)?;

    let id = NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed);
    debug!(pool = id, size, ?policy, "pool opened");

    Ok(Self {
      id,
      buffer,
      segments,
      gaps,
      policy,
      alloc_size: 0,
      num_allocs: 0,
    })
  }

  #[inline]
  pub fn policy(&self) -> AllocPolicy {
    self.policy
  }

  #[inline]
  pub fn total_size(&self) -> usize {
    self.buffer.len()
  }

  /// Bytes currently handed out.
  #[inline]
  pub fn alloc_size(&self) -> usize {
    self.alloc_size
  }

  #[inline]
  pub fn num_allocs(&self) -> usize {
    self.num_allocs
  }

  #[inline]
  pub fn num_gaps(&self) -> usize {
    self.gaps.len()
  }

  pub fn stats(&self) -> PoolStats {
    PoolStats {
      total_size: self.total_size(),
      alloc_size: self.alloc_size,
      num_allocs: self.num_allocs,
      num_gaps: self.num_gaps(),
      policy: self.policy,
      segments: self.segments.used(),
      segment_capacity: self.segments.capacity(),
      gap_capacity: self.gaps.capacity(),
    }
  }

  /// A pool may only be released once it is back to a single gap with no
  /// outstanding allocations.
  pub fn check_releasable(&self) -> Result<()> {
    if self.num_allocs != 0 || self.num_gaps() > 1 {
      return Err(AllocError::NotReleasable {
        allocations: self.num_allocs,
        gaps: self.num_gaps(),
      });
    }

    Ok(())
  }

  /// Releases the pool, or hands it back untouched when it is still in use.
  pub fn close(self) -> std::result::Result<(), (Self, AllocError)> {
    if let Err(err) = self.check_releasable() {
      return Err((self, err));
    }

    debug!(pool = self.id, size = self.total_size(), "pool closed");
    Ok(())
  }

  /// Confirms `allocation` was issued by this pool and is still live.
  pub(crate) fn validate(
    &self,
    allocation: &Allocation,
  ) -> Result<()> {
    if allocation.pool != self.id {
      return Err(AllocError::InvalidHandle);
    }

    match self.segments.get(allocation.segment) {
      Some(segment)
        if segment.in_use
          && segment.allocated
          && segment.generation == allocation.generation
          && segment.offset == allocation.offset
          && segment.size == allocation.size =>
      {
        Ok(())
      }
      _ => Err(AllocError::InvalidHandle),
    }
  }

  pub fn bytes(
    &self,
    allocation: &Allocation,
  ) -> Result<&[u8]> {
    self.validate(allocation)?;

    self
      .buffer
      .range(allocation.offset, allocation.size)
      .ok_or_else(|| AllocError::InternalInconsistency("allocation exceeds the pool buffer".into()))
  }

  pub fn bytes_mut(
    &mut self,
    allocation: &Allocation,
  ) -> Result<&mut [u8]> {
    self.validate(allocation)?;

    self
      .buffer
      .range_mut(allocation.offset, allocation.size)
      .ok_or_else(|| AllocError::InternalInconsistency("allocation exceeds the pool buffer".into()))
  }
}
