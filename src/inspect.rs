use crate::error::{AllocError, Result};
use crate::pool::Pool;

/// One entry of a pool snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSegment {
  pub size: usize,
  pub allocated: bool,
}

impl Pool {
  /// Every live segment in buffer order.
  pub fn inspect(&self) -> Result<Vec<PoolSegment>> {
    let mut snapshot = Vec::new();
    snapshot.try_reserve_exact(self.segments.used())?;

    snapshot.extend(self.segments.iter().map(|(_, segment)| PoolSegment {
      size: segment.size,
      allocated: segment.allocated,
    }));

    Ok(snapshot)
  }
}

fn violation(message: String) -> AllocError {
  AllocError::InternalInconsistency(message)
}

/// Walks a pool and reports the first broken structural invariant.
///
/// Checks that segments tile the buffer without holes or overlap, that no two
/// neighbouring segments are both free, that the gap index is sorted and
/// lists exactly the free segments, and that the pool's counters add up.
pub fn check_invariants(pool: &Pool) -> Result<()> {
  let segments = &pool.segments;
  let gaps = pool.gaps.entries();

  let mut expected_offset = 0;
  let mut expected_prev = None;
  let mut previous_free = false;
  let mut walked = 0;
  let mut free_segments = 0;
  let mut allocated_bytes = 0;
  let mut allocations = 0;

  for (id, segment) in segments.iter() {
    walked += 1;

    if !segment.in_use {
      return Err(violation(format!("{id} is linked but not in use")));
    }
    if segment.size == 0 {
      return Err(violation(format!("{id} is empty")));
    }
    if segment.offset != expected_offset {
      return Err(violation(format!(
        "{id} starts at {}, expected {expected_offset}",
        segment.offset
      )));
    }
    if segment.prev != expected_prev {
      return Err(violation(format!("{id} has a stale back link")));
    }

    if segment.allocated {
      allocations += 1;
      allocated_bytes += segment.size;
      previous_free = false;
    } else {
      if previous_free {
        return Err(violation(format!("{id} is a gap next to another gap")));
      }
      if !gaps.iter().any(|entry| {
        entry.segment == id && entry.size == segment.size && entry.offset == segment.offset
      }) {
        return Err(violation(format!("{id} is free but not indexed")));
      }
      free_segments += 1;
      previous_free = true;
    }

    expected_offset += segment.size;
    expected_prev = Some(id);
  }

  if walked != segments.used() {
    return Err(violation(format!(
      "walked {walked} segments, arena counts {}",
      segments.used()
    )));
  }
  if expected_offset != pool.total_size() {
    return Err(violation(format!(
      "segments cover {expected_offset} of {} bytes",
      pool.total_size()
    )));
  }
  if free_segments != gaps.len() {
    return Err(violation(format!(
      "{free_segments} free segments but {} index entries",
      gaps.len()
    )));
  }
  if gaps
    .windows(2)
    .any(|pair| (pair[0].size, pair[0].offset) >= (pair[1].size, pair[1].offset))
  {
    return Err(violation("gap index is out of order".into()));
  }
  if allocations != pool.num_allocs() || allocated_bytes != pool.alloc_size() {
    return Err(violation(format!(
      "counters say {} allocations of {} bytes, segments hold {allocations} of {allocated_bytes}",
      pool.num_allocs(),
      pool.alloc_size()
    )));
  }

  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::pool::AllocPolicy;

  #[test]
  fn test_inspect_pristine_pool() {
    let pool = Pool::open(1000, AllocPolicy::BestFit).unwrap();

    assert_eq!(
      pool.inspect().unwrap(),
      vec![PoolSegment {
        size: 1000,
        allocated: false
      }]
    );
    check_invariants(&pool).unwrap();
  }

  #[test]
  fn test_inspect_is_buffer_ordered() {
    let mut pool = Pool::open(1000, AllocPolicy::FirstFit).unwrap();
    let a = pool.allocate(100).unwrap();
    let _b = pool.allocate(200).unwrap();
    pool.free(a).unwrap();

    let snapshot = pool.inspect().unwrap();

    assert_eq!(snapshot.len(), pool.segments.used());
    assert_eq!(
      snapshot,
      vec![
        PoolSegment { size: 100, allocated: false },
        PoolSegment { size: 200, allocated: true },
        PoolSegment { size: 700, allocated: false },
      ]
    );
    assert_eq!(pool.num_allocs(), 1);
  }

  #[test]
  fn test_detects_counter_drift() {
    let mut pool = Pool::open(64, AllocPolicy::FirstFit).unwrap();
    let _ = pool.allocate(16).unwrap();

    pool.num_allocs += 1;

    assert!(matches!(
      check_invariants(&pool),
      Err(AllocError::InternalInconsistency(_))
    ));
  }

  #[test]
  fn test_detects_unindexed_gap() {
    let mut pool = Pool::open(64, AllocPolicy::FirstFit).unwrap();
    let head = pool.segments.head().unwrap();

    pool.gaps.remove(head).unwrap();

    assert!(matches!(
      check_invariants(&pool),
      Err(AllocError::InternalInconsistency(_))
    ));
  }
}
