//! Table of open pools, plus the thread-wide instance behind the free
//! functions of the crate root.
//!
//! ```text
//!   slots:  [ pool ][ ---- ][ pool ][ pool ][ ---- ] ...
//!              #0     #1      #2      #3      #4
//!                     ▲                        ▲
//!               closed, never reused      next open lands here
//! ```
//!
//! The table only grows. Closing a pool clears its slot without compacting,
//! so a [`PoolHandle`] never comes to mean a different pool.

use std::cell::RefCell;

use tracing::debug;

use crate::config::RegistryConfig;
use crate::error::{AllocError, Result};
use crate::inspect::PoolSegment;
use crate::pool::{AllocPolicy, Allocation, Pool};

/// Identifies a pool opened through a [`Registry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PoolHandle(usize);

#[derive(Debug)]
pub struct Registry {
  slots: Vec<Option<Pool>>,
  capacity: usize,
  config: RegistryConfig,
}

impl Registry {
  pub fn new() -> Result<Self> {
    Self::with_config(RegistryConfig::default())
  }

  pub fn with_config(config: RegistryConfig) -> Result<Self> {
    config.validate()?;

    let mut slots = Vec::new();
    slots.try_reserve_exact(config.capacity)?;

    Ok(Self {
      slots,
      capacity: config.capacity,
      config,
    })
  }

  /// Number of slots ever handed out, open or closed.
  #[inline]
  pub fn len(&self) -> usize {
    self.slots.len()
  }

  #[inline]
  pub fn is_empty(&self) -> bool {
    self.slots.is_empty()
  }

  #[inline]
  pub fn capacity(&self) -> usize {
    self.capacity
  }

  pub fn open_count(&self) -> usize {
    self.slots.iter().filter(|slot| slot.is_some()).count()
  }

  fn grow_if_needed(&mut self) -> Result<()> {
    if !self.config.growth.should_grow(self.slots.len(), self.capacity) {
      return Ok(());
    }

    let capacity = self.config.growth.next_capacity(self.capacity)?;
    self.slots.try_reserve_exact(capacity - self.slots.len())?;

    debug!(from = self.capacity, to = capacity, "registry grown");
    self.capacity = capacity;

    Ok(())
  }

  pub fn open_pool(
    &mut self,
    size: usize,
    policy: AllocPolicy,
  ) -> Result<PoolHandle> {
    self.grow_if_needed()?;

    let pool = Pool::with_config(size, policy, self.config.pool)?;
    let handle = PoolHandle(self.slots.len());
    self.slots.push(Some(pool));

    Ok(handle)
  }

  /// Closes the pool if it is back to a single gap with no allocations;
  /// otherwise it stays open and registered.
  pub fn close_pool(
    &mut self,
    handle: PoolHandle,
  ) -> Result<()> {
    let slot = self
      .slots
      .get_mut(handle.0)
      .ok_or(AllocError::InvalidHandle)?;

    slot
      .as_ref()
      .ok_or(AllocError::InvalidHandle)?
      .check_releasable()?;

    if let Some(pool) = slot.take() {
      pool.close().map_err(|(_, err)| err)?;
    }

    Ok(())
  }

  pub fn pool(
    &self,
    handle: PoolHandle,
  ) -> Result<&Pool> {
    self
      .slots
      .get(handle.0)
      .and_then(Option::as_ref)
      .ok_or(AllocError::InvalidHandle)
  }

  pub fn pool_mut(
    &mut self,
    handle: PoolHandle,
  ) -> Result<&mut Pool> {
    self
      .slots
      .get_mut(handle.0)
      .and_then(Option::as_mut)
      .ok_or(AllocError::InvalidHandle)
  }

  /// Fails while any pool is still open.
  pub fn ensure_empty(&self) -> Result<()> {
    match self.open_count() {
      0 => Ok(()),
      open => Err(AllocError::PoolsStillOpen(open)),
    }
  }
}

thread_local! {
  static REGISTRY: RefCell<Option<Registry>> = const { RefCell::new(None) };
}

fn with_registry<R>(f: impl FnOnce(&mut Registry) -> Result<R>) -> Result<R> {
  REGISTRY.with_borrow_mut(|registry| match registry {
    Some(registry) => f(registry),
    None => Err(AllocError::NotInitialized),
  })
}

/// Sets up the registry for the current thread.
pub fn registry_init() -> Result<()> {
  registry_init_with(RegistryConfig::default())
}

pub fn registry_init_with(config: RegistryConfig) -> Result<()> {
  REGISTRY.with_borrow_mut(|registry| {
    if registry.is_some() {
      return Err(AllocError::AlreadyInitialized);
    }

    *registry = Some(Registry::with_config(config)?);
    debug!(capacity = config.capacity, "registry initialized");

    Ok(())
  })
}

/// Drops the registry; every pool must have been closed first.
pub fn registry_teardown() -> Result<()> {
  REGISTRY.with_borrow_mut(|registry| {
    registry
      .as_ref()
      .ok_or(AllocError::NotInitialized)?
      .ensure_empty()?;

    *registry = None;
    debug!("registry torn down");

    Ok(())
  })
}

pub fn pool_open(
  size: usize,
  policy: AllocPolicy,
) -> Result<PoolHandle> {
  with_registry(|registry| registry.open_pool(size, policy))
}

pub fn pool_close(pool: PoolHandle) -> Result<()> {
  with_registry(|registry| registry.close_pool(pool))
}

pub fn allocate(
  pool: PoolHandle,
  size: usize,
) -> Result<Allocation> {
  with_registry(|registry| registry.pool_mut(pool)?.allocate(size))
}

pub fn free(
  pool: PoolHandle,
  allocation: Allocation,
) -> Result<()> {
  with_registry(|registry| registry.pool_mut(pool)?.free(allocation))
}

pub fn inspect(pool: PoolHandle) -> Result<Vec<PoolSegment>> {
  with_registry(|registry| registry.pool(pool)?.inspect())
}

/// Runs `f` against a registered pool.
///
/// `f` must not call back into the registry functions.
pub fn with_pool<R>(
  pool: PoolHandle,
  f: impl FnOnce(&Pool) -> R,
) -> Result<R> {
  with_registry(|registry| Ok(f(registry.pool(pool)?)))
}
