use tracing::debug;

use crate::config::GrowthPolicy;
use crate::error::{AllocError, Result};
use crate::segment::SegmentId;

/// One free segment as seen by the index.
///
/// `offset` is the segment's position in the pool buffer and only serves as
/// the tie-breaker between gaps of the same size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GapEntry {
  pub size: usize,
  pub offset: usize,
  pub segment: SegmentId,
}

impl GapEntry {
  #[inline]
  fn key(&self) -> (usize, usize) {
    (self.size, self.offset)
  }
}

/// Free segments sorted by `(size, offset)`.
///
/// ```text
///   entries:  [ 100 @ 0 ][ 300 @ 200 ][ 300 @ 700 ][ 900 @ 1100 ] ...
///               ▲
///               └── the first entry >= request is the best fit
/// ```
///
/// With that ordering the first entry large enough for a request is the
/// smallest sufficient gap, and among equally sized gaps the lowest-addressed.
#[derive(Debug)]
pub struct GapIndex {
  entries: Vec<GapEntry>,
  capacity: usize,
  growth: GrowthPolicy,
}

impl GapIndex {
  pub fn with_capacity(
    capacity: usize,
    growth: GrowthPolicy,
  ) -> Result<Self> {
    let mut entries = Vec::new();
    entries.try_reserve_exact(capacity)?;

    Ok(Self {
      entries,
      capacity,
      growth,
    })
  }

  #[inline]
  pub fn len(&self) -> usize {
    self.entries.len()
  }

  #[inline]
  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  #[inline]
  pub fn capacity(&self) -> usize {
    self.capacity
  }

  pub fn entries(&self) -> &[GapEntry] {
    &self.entries
  }

  /// Doubles the storage once the fill factor is exceeded.
  pub fn grow_if_needed(&mut self) -> Result<bool> {
    if !self.growth.should_grow(self.entries.len(), self.capacity) {
      return Ok(false);
    }

    let capacity = self.growth.next_capacity(self.capacity)?;
    self
      .entries
      .try_reserve_exact(capacity - self.entries.len())?;

    debug!(from = self.capacity, to = capacity, "gap index grown");
    self.capacity = capacity;

    Ok(true)
  }

  /// Appends an entry and bubbles it left into sorted position.
  pub fn insert(
    &mut self,
    size: usize,
    offset: usize,
    segment: SegmentId,
  ) -> Result<()> {
    self.grow_if_needed()?;

    self.entries.push(GapEntry {
      size,
      offset,
      segment,
    });

    let mut current = self.entries.len() - 1;
    while current > 0 && self.entries[current].key() < self.entries[current - 1].key() {
      self.entries.swap(current, current - 1);
      current -= 1;
    }

    Ok(())
  }

  pub fn remove(
    &mut self,
    segment: SegmentId,
  ) -> Result<GapEntry> {
    let position = self
      .entries
      .iter()
      .position(|entry| entry.segment == segment)
      .ok_or_else(|| {
        AllocError::InternalInconsistency(format!("{segment} is missing from the gap index"))
      })?;

    // Shifts the tail left by one.
    Ok(self.entries.remove(position))
  }

  /// Forgets every entry; used when the arena is rebuilt.
  pub fn clear(&mut self) {
    self.entries.clear();
  }

  /// Smallest gap that can hold `size` bytes, lowest address on ties.
  pub fn best_fit(
    &self,
    size: usize,
  ) -> Option<&GapEntry> {
    self.entries.iter().find(|entry| entry.size >= size)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn index() -> GapIndex {
    GapIndex::with_capacity(4, GrowthPolicy::default()).unwrap()
  }

  fn sizes(index: &GapIndex) -> Vec<(usize, usize)> {
    index.entries().iter().map(|entry| entry.key()).collect()
  }

  #[test]
  fn test_insert_keeps_order() {
    let mut index = index();

    index.insert(300, 700, SegmentId::new(3)).unwrap();
    index.insert(100, 0, SegmentId::new(1)).unwrap();
    index.insert(300, 200, SegmentId::new(2)).unwrap();
    index.insert(50, 900, SegmentId::new(4)).unwrap();

    assert_eq!(sizes(&index), vec![(50, 900), (100, 0), (300, 200), (300, 700)]);
  }

  #[test]
  fn test_best_fit_prefers_lower_address() {
    let mut index = index();

    index.insert(300, 700, SegmentId::new(3)).unwrap();
    index.insert(300, 200, SegmentId::new(2)).unwrap();
    index.insert(100, 0, SegmentId::new(1)).unwrap();

    assert_eq!(index.best_fit(250).unwrap().segment, SegmentId::new(2));
    assert_eq!(index.best_fit(100).unwrap().segment, SegmentId::new(1));
    assert!(index.best_fit(301).is_none());
  }

  #[test]
  fn test_remove() {
    let mut index = index();

    index.insert(10, 0, SegmentId::new(0)).unwrap();
    index.insert(20, 10, SegmentId::new(1)).unwrap();
    index.insert(30, 30, SegmentId::new(2)).unwrap();

    let removed = index.remove(SegmentId::new(1)).unwrap();

    assert_eq!(removed.size, 20);
    assert_eq!(sizes(&index), vec![(10, 0), (30, 30)]);
    assert!(matches!(
      index.remove(SegmentId::new(1)),
      Err(AllocError::InternalInconsistency(_))
    ));
  }

  #[test]
  fn test_grows_past_fill_factor() {
    let mut index = index();

    for i in 0..4 {
      index.insert(i + 1, i * 10, SegmentId::new(i)).unwrap();
    }
    assert_eq!(index.capacity(), 4);

    index.insert(99, 99, SegmentId::new(9)).unwrap();

    assert_eq!(index.capacity(), 8);
    assert_eq!(index.len(), 5);
  }

  #[test]
  fn test_clear() {
    let mut index = index();
    index.insert(10, 0, SegmentId::new(0)).unwrap();

    index.clear();

    assert!(index.is_empty());
    assert!(index.best_fit(1).is_none());
  }
}
