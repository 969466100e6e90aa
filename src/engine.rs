//! Allocation and release against a [`Pool`].
//!
//! ```text
//!   allocate(250), best-fit:
//!
//!   before   | 100 free | 50 used | 300 free | 50 used | 300 free | 200 used |
//!                                   ▲ smallest >= 250, lowest address
//!   after    | 100 free | 50 used | 250 used |50 free| 50 used | 300 free | 200 used |
//!
//!   free(x), both neighbours free:
//!
//!   before   | 80 free | x: 120 used | 40 free |
//!   after    |           240 free            |
//! ```
//!
//! Every operation reserves whatever storage it could need before touching a
//! segment, so a failure leaves the pool exactly as it was.

use tracing::{error, trace};

use crate::error::{AllocError, Result};
use crate::pool::{AllocPolicy, Allocation, Pool};
use crate::segment::SegmentId;

impl Pool {
  /// Carves `size` bytes out of a gap chosen by the pool's policy.
  pub fn allocate(
    &mut self,
    size: usize,
  ) -> Result<Allocation> {
    if size == 0 {
      return Err(AllocError::ZeroSize);
    }
    if self.gaps.is_empty() {
      return Err(AllocError::NoFreeSpace);
    }

    // Growing the arena rebuilds the gap index, so it has to happen before a
    // candidate is pulled out of it.
    self.segments.grow_if_needed(&mut self.gaps)?;
    self.gaps.grow_if_needed()?;

    let candidate = match self.policy {
      AllocPolicy::FirstFit => self.first_fit(size),
      AllocPolicy::BestFit => self.best_fit(size),
    }
    .ok_or(AllocError::NoSufficientSegment { requested: size })?;

    let (offset, available) = self
      .segments
      .get(candidate)
      .map(|segment| (segment.offset, segment.size))
      .ok_or_else(|| self.inconsistent(format!("{candidate} vanished during allocation")))?;

    if available > size && !self.segments.has_vacant_slot() {
      return Err(AllocError::ResourceExhausted("no unused segment slot".into()));
    }

    self.gaps.remove(candidate).map_err(|err| self.report(err))?;

    if let Some(rest) = self
      .segments
      .split(candidate, size)
      .map_err(|err| self.report(err))?
    {
      self
        .gaps
        .insert(available - size, offset + size, rest)
        .map_err(|err| self.report(err))?;
    }

    let generation = self
      .segments
      .mark_allocated(candidate)
      .map_err(|err| self.report(err))?;

    self.num_allocs += 1;
    self.alloc_size += size;

    trace!(pool = self.id, size, offset, %candidate, "allocated");

    Ok(Allocation {
      pool: self.id,
      segment: candidate,
      generation,
      offset,
      size,
    })
  }

  /// Returns an allocation to the pool, merging it with free neighbours.
  ///
  /// Fails with [`AllocError::InvalidHandle`] when the handle belongs to a
  /// different pool or has already been freed.
  pub fn free(
    &mut self,
    allocation: Allocation,
  ) -> Result<()> {
    self.validate(&allocation)?;

    // Freeing adds at most one gap.
    self.gaps.grow_if_needed()?;

    let mut current = allocation.segment;
    self
      .segments
      .mark_free(current)
      .map_err(|err| self.report(err))?;

    self.num_allocs -= 1;
    self.alloc_size -= allocation.size;

    let (prev, next) = self
      .segments
      .get(current)
      .map(|segment| (segment.prev, segment.next))
      .ok_or_else(|| self.inconsistent(format!("{current} vanished during free")))?;

    if let Some(next) = next.filter(|id| self.is_gap(*id)) {
      self.gaps.remove(next).map_err(|err| self.report(err))?;
      self
        .segments
        .merge(current, next)
        .map_err(|err| self.report(err))?;
    }

    if let Some(prev) = prev.filter(|id| self.is_gap(*id)) {
      self.gaps.remove(prev).map_err(|err| self.report(err))?;
      self
        .segments
        .merge(prev, current)
        .map_err(|err| self.report(err))?;
      current = prev;
    }

    let (size, offset) = self
      .segments
      .get(current)
      .map(|segment| (segment.size, segment.offset))
      .ok_or_else(|| self.inconsistent(format!("{current} vanished during free")))?;

    self
      .gaps
      .insert(size, offset, current)
      .map_err(|err| self.report(err))?;

    trace!(pool = self.id, size = allocation.size, offset = allocation.offset, "freed");

    Ok(())
  }

  fn first_fit(
    &self,
    size: usize,
  ) -> Option<SegmentId> {
    self
      .segments
      .iter()
      .find(|(_, segment)| !segment.allocated && segment.size >= size)
      .map(|(id, _)| id)
  }

  fn best_fit(
    &self,
    size: usize,
  ) -> Option<SegmentId> {
    self.gaps.best_fit(size).map(|entry| entry.segment)
  }

  fn is_gap(
    &self,
    id: SegmentId,
  ) -> bool {
    self
      .segments
      .get(id)
      .is_some_and(|segment| segment.is_gap())
  }

  fn inconsistent(
    &self,
    message: String,
  ) -> AllocError {
    self.report(AllocError::InternalInconsistency(message))
  }

  fn report(
    &self,
    err: AllocError,
  ) -> AllocError {
    if let AllocError::InternalInconsistency(message) = &err {
      error!(pool = self.id, %message, "pool invariant broken");
    }
    err
  }
}
