use std::ptr::NonNull;
use std::slice;

use crate::error::{AllocError, Result};

/// The contiguous byte range a pool carves into segments.
///
/// Acquired once with `calloc` so every byte starts zeroed, and handed back
/// with `free` when the pool is dropped. The buffer never moves or resizes.
pub struct PoolBuffer {
  base: NonNull<u8>,
  len: usize,
}

impl PoolBuffer {
  pub fn allocate(len: usize) -> Result<Self> {
    if len == 0 {
      return Err(AllocError::ZeroSize);
    }

    let address = unsafe { libc::calloc(len, 1) } as *mut u8;

    match NonNull::new(address) {
      Some(base) => Ok(Self { base, len }),
      None => Err(AllocError::ResourceExhausted(format!(
        "calloc failed for a {len} byte pool buffer"
      ))),
    }
  }

  #[inline]
  pub fn len(&self) -> usize {
    self.len
  }

  /// Bytes in `offset..offset + size`, or `None` when out of bounds.
  pub fn range(
    &self,
    offset: usize,
    size: usize,
  ) -> Option<&[u8]> {
    let end = offset.checked_add(size)?;
    if end > self.len {
      return None;
    }

    // Bounds checked above; the buffer is initialized by calloc.
    Some(unsafe { slice::from_raw_parts(self.base.as_ptr().add(offset), size) })
  }

  pub fn range_mut(
    &mut self,
    offset: usize,
    size: usize,
  ) -> Option<&mut [u8]> {
    let end = offset.checked_add(size)?;
    if end > self.len {
      return None;
    }

    Some(unsafe { slice::from_raw_parts_mut(self.base.as_ptr().add(offset), size) })
  }
}

impl Drop for PoolBuffer {
  fn drop(&mut self) {
    unsafe { libc::free(self.base.as_ptr() as *mut libc::c_void) };
  }
}

impl std::fmt::Debug for PoolBuffer {
  fn fmt(
    &self,
    f: &mut std::fmt::Formatter<'_>,
  ) -> std::fmt::Result {
    f.debug_struct("PoolBuffer")
      .field("base", &self.base)
      .field("len", &self.len)
      .finish()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_allocate_zeroed() {
    let buffer = PoolBuffer::allocate(64).unwrap();

    assert_eq!(buffer.len(), 64);
    assert!(buffer.range(0, 64).unwrap().iter().all(|byte| *byte == 0));
  }

  #[test]
  fn test_zero_length_rejected() {
    assert_eq!(PoolBuffer::allocate(0).unwrap_err(), AllocError::ZeroSize);
  }

  #[test]
  fn test_range_bounds() {
    let mut buffer = PoolBuffer::allocate(16).unwrap();

    buffer.range_mut(8, 8).unwrap().fill(0xAB);

    assert_eq!(buffer.range(7, 2).unwrap(), &[0x00, 0xAB]);
    assert!(buffer.range(8, 9).is_none());
    assert!(buffer.range(usize::MAX, 2).is_none());
  }
}
