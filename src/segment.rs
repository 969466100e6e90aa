use std::fmt;

use tracing::debug;

use crate::config::GrowthPolicy;
use crate::error::{AllocError, Result};
use crate::gap::GapIndex;

/// Slot number of a segment inside its arena.
///
/// Stable for the lifetime of the segment, including across arena growth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SegmentId(usize);

impl SegmentId {
  #[inline]
  pub const fn new(slot: usize) -> Self {
    Self(slot)
  }
}

impl fmt::Display for SegmentId {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    write!(f, "segment #{}", self.0)
  }
}

/// One contiguous range of the pool buffer, either handed out or free.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
  pub offset: usize,
  pub size: usize,
  pub allocated: bool,
  /// False for slots that hold no segment and can be reused by a split.
  pub in_use: bool,
  /// Bumped every time the segment is handed out.
  pub generation: u32,
  pub prev: Option<SegmentId>,
  pub next: Option<SegmentId>,
}

impl Segment {
  const VACANT: Segment = Segment {
    offset: 0,
    size: 0,
    allocated: false,
    in_use: false,
    generation: 0,
    prev: None,
    next: None,
  };

  #[inline]
  pub fn is_gap(&self) -> bool {
    self.in_use && !self.allocated
  }

  fn vacated(generation: u32) -> Self {
    Segment {
      generation,
      ..Self::VACANT
    }
  }
}

/// Segment slots plus the doubly-linked list threading live segments in
/// buffer order.
///
/// ```text
///   slots:   [ #0 used ][ #1 free ][ #2 ---- ][ #3 used ][ #4 ---- ] ...
///   list:    head ─► #0 ◄─► #3 ◄─► #1 ─► None
///   buffer:  |── #0 ──|──── #3 ────|──────── #1 ────────|
/// ```
///
/// Links are slot numbers, so growing the slot storage only needs the slots
/// copied over and relinked; nothing dangles.
#[derive(Debug)]
pub struct SegmentArena {
  slots: Vec<Segment>,
  used: usize,
  head: Option<SegmentId>,
  growth: GrowthPolicy,
}

impl SegmentArena {
  /// Creates an arena whose single free segment spans `total_size` bytes.
  pub fn new(
    total_size: usize,
    capacity: usize,
    growth: GrowthPolicy,
  ) -> Result<Self> {
    if capacity == 0 {
      return Err(AllocError::InvalidConfig("segment capacity must be positive".into()));
    }

    let mut slots = Vec::new();
    slots.try_reserve_exact(capacity)?;
    slots.resize(capacity, Segment::VACANT);

    slots[0] = Segment {
      offset: 0,
      size: total_size,
      allocated: false,
      in_use: true,
      generation: 0,
      prev: None,
      next: None,
    };

    Ok(Self {
      slots,
      used: 1,
      head: Some(SegmentId::new(0)),
      growth,
    })
  }

  #[inline]
  pub fn capacity(&self) -> usize {
    self.slots.len()
  }

  /// Number of live segments.
  #[inline]
  pub fn used(&self) -> usize {
    self.used
  }

  #[inline]
  pub fn head(&self) -> Option<SegmentId> {
    self.head
  }

  pub fn get(
    &self,
    id: SegmentId,
  ) -> Option<&Segment> {
    self.slots.get(id.0)
  }

  pub fn has_vacant_slot(&self) -> bool {
    self.used < self.slots.len()
  }

  /// Live segments in buffer order.
  pub fn iter(&self) -> Segments<'_> {
    Segments {
      arena: self,
      cursor: self.head,
      remaining: self.used,
    }
  }

  fn live(
    &self,
    id: SegmentId,
  ) -> Result<Segment> {
    match self.slots.get(id.0) {
      Some(segment) if segment.in_use => Ok(*segment),
      _ => Err(AllocError::InternalInconsistency(format!("{id} is not a live segment"))),
    }
  }

  /// Doubles the slot storage once the fill factor is exceeded, then
  /// re-registers every gap in a cleared `gaps`.
  ///
  /// The new storage is filled by walking the buffer-order list, so a broken
  /// list is reported before anything is replaced.
  pub fn grow_if_needed(
    &mut self,
    gaps: &mut GapIndex,
  ) -> Result<bool> {
    if !self.growth.should_grow(self.used, self.slots.len()) {
      return Ok(false);
    }

    let capacity = self.growth.next_capacity(self.slots.len())?;

    let mut slots = Vec::new();
    slots.try_reserve_exact(capacity)?;
    slots.extend(self.slots.iter().map(|old| Segment::vacated(old.generation)));
    slots.resize(capacity, Segment::VACANT);

    let mut walked = 0;
    let mut prev = None;
    let mut cursor = self.head;
    while let Some(id) = cursor {
      let segment = self.live(id)?;
      walked += 1;
      if walked > self.used {
        return Err(AllocError::InternalInconsistency(
          "segment list is longer than the live count".into(),
        ));
      }

      slots[id.0] = Segment { prev, ..segment };
      prev = Some(id);
      cursor = segment.next;
    }

    if walked != self.used {
      return Err(AllocError::InternalInconsistency(format!(
        "segment list holds {walked} segments, expected {}",
        self.used
      )));
    }

    debug!(from = self.slots.len(), to = capacity, "segment arena grown");
    self.slots = slots;

    gaps.clear();
    let mut cursor = self.head;
    while let Some(id) = cursor {
      let segment = self.slots[id.0];
      if !segment.allocated {
        gaps.insert(segment.size, segment.offset, id)?;
      }
      cursor = segment.next;
    }

    Ok(true)
  }

  /// Shrinks `id` to exactly `size` bytes and returns the free remainder, if
  /// any, linked in right after it.
  ///
  /// Never grows the arena: callers make room beforehand, since a growth here
  /// would re-register gaps the caller already pulled from the index.
  pub fn split(
    &mut self,
    id: SegmentId,
    size: usize,
  ) -> Result<Option<SegmentId>> {
    let segment = self.live(id)?;
    if size > segment.size {
      return Err(AllocError::InternalInconsistency(format!(
        "cannot split {size} bytes out of {id} holding {}",
        segment.size
      )));
    }

    let remainder = segment.size - size;
    if remainder == 0 {
      return Ok(None);
    }

    let slot = self
      .slots
      .iter()
      .position(|candidate| !candidate.in_use)
      .ok_or_else(|| AllocError::ResourceExhausted("no unused segment slot".into()))?;
    let rest = SegmentId::new(slot);

    self.slots[slot] = Segment {
      offset: segment.offset + size,
      size: remainder,
      allocated: false,
      in_use: true,
      generation: self.slots[slot].generation,
      prev: Some(id),
      next: segment.next,
    };

    if let Some(next) = segment.next {
      self.slots[next.0].prev = Some(rest);
    }

    let current = &mut self.slots[id.0];
    current.size = size;
    current.next = Some(rest);
    self.used += 1;

    Ok(Some(rest))
  }

  /// Folds the gap `b` into the gap `a` directly before it and frees `b`'s slot.
  pub fn merge(
    &mut self,
    a: SegmentId,
    b: SegmentId,
  ) -> Result<()> {
    let first = self.live(a)?;
    let second = self.live(b)?;

    if first.next != Some(b) || second.prev != Some(a) {
      return Err(AllocError::InternalInconsistency(format!(
        "{b} does not directly follow {a}"
      )));
    }
    if first.allocated || second.allocated {
      return Err(AllocError::InternalInconsistency(format!(
        "cannot merge allocated segments {a} and {b}"
      )));
    }

    if let Some(next) = second.next {
      self.slots[next.0].prev = Some(a);
    }

    let merged = &mut self.slots[a.0];
    merged.size += second.size;
    merged.next = second.next;

    self.slots[b.0] = Segment::vacated(second.generation);
    self.used -= 1;

    Ok(())
  }

  /// Marks a live gap as handed out and returns its new generation.
  pub fn mark_allocated(
    &mut self,
    id: SegmentId,
  ) -> Result<u32> {
    let segment = self.live(id)?;
    if segment.allocated {
      return Err(AllocError::InternalInconsistency(format!("{id} is already allocated")));
    }

    let slot = &mut self.slots[id.0];
    slot.allocated = true;
    slot.generation = slot.generation.wrapping_add(1);

    Ok(slot.generation)
  }

  pub fn mark_free(
    &mut self,
    id: SegmentId,
  ) -> Result<()> {
    self.live(id)?;
    self.slots[id.0].allocated = false;

    Ok(())
  }
}

/// Iterator over live segments in buffer order.
pub struct Segments<'a> {
  arena: &'a SegmentArena,
  cursor: Option<SegmentId>,
  remaining: usize,
}

impl<'a> Iterator for Segments<'a> {
  type Item = (SegmentId, &'a Segment);

  fn next(&mut self) -> Option<Self::Item> {
    // `remaining` caps the walk so a corrupted cycle cannot spin forever.
    if self.remaining == 0 {
      return None;
    }

    let id = self.cursor?;
    let segment = self.arena.slots.get(id.0)?;

    self.cursor = segment.next;
    self.remaining -= 1;

    Some((id, segment))
  }
}
