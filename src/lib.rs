//! # segpool - Segmented Memory Pools
//!
//! This crate manages one or more fixed-size memory **pools**. Each pool
//! owns a single buffer and hands out byte ranges from it, choosing the
//! range with a **first-fit** or **best-fit** policy, without going back to
//! the system allocator for every request.
//!
//! ## Overview
//!
//! A pool tracks its buffer as a sequence of **segments**. Every segment is
//! either handed out to a client or free (a **gap**):
//!
//! ```text
//!   Pool of 1000 bytes after a few allocations and frees:
//!
//!   ┌──────────────────────────────────────────────────────────────────────┐
//!   │                           POOL BUFFER                                │
//!   │                                                                      │
//!   │   ┌───────┬─────┬──────────────┬─────┬──────────────┬────────────┐   │
//!   │   │  gap  │ A2  │     gap      │ A4  │     gap      │     A6     │   │
//!   │   │  100  │ 50  │     300      │ 50  │     300      │    200     │   │
//!   │   └───────┴─────┴──────────────┴─────┴──────────────┴────────────┘   │
//!   │                                                                      │
//!   └──────────────────────────────────────────────────────────────────────┘
//!
//!   Allocating splits a gap; freeing merges a segment with free neighbours,
//!   so two gaps are never adjacent.
//! ```
//!
//! ## Crate Structure
//!
//! ```text
//!   segpool
//!   ├── buffer     - The pool's contiguous buffer (libc calloc/free)
//!   ├── config     - Capacities and growth parameters
//!   ├── engine     - allocate / free, split and coalesce
//!   ├── error      - AllocError
//!   ├── gap        - Free-space index sorted by (size, address) (internal)
//!   ├── inspect    - Snapshots and invariant checks
//!   ├── pool       - Pool, Allocation handles, counters
//!   ├── registry   - Table of open pools
//!   └── segment    - Segment slots and the buffer-order list (internal)
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use segpool::{AllocPolicy, Pool};
//!
//! let mut pool = Pool::open(1024, AllocPolicy::BestFit)?;
//!
//! let allocation = pool.allocate(64)?;
//! pool.bytes_mut(&allocation)?.fill(0x2A);
//! assert_eq!(pool.bytes(&allocation)?[0], 0x2A);
//!
//! pool.free(allocation)?;
//! assert_eq!(pool.num_gaps(), 1);
//! # Ok::<(), segpool::AllocError>(())
//! ```
//!
//! Or through the thread-wide registry:
//!
//! ```rust
//! use segpool::{AllocPolicy, allocate, free, pool_close, pool_open, registry_init, registry_teardown};
//!
//! registry_init()?;
//! let pool = pool_open(4096, AllocPolicy::FirstFit)?;
//! let allocation = allocate(pool, 128)?;
//! free(pool, allocation)?;
//! pool_close(pool)?;
//! registry_teardown()?;
//! # Ok::<(), segpool::AllocError>(())
//! ```
//!
//! ## How It Works
//!
//! Two structures describe a pool and are kept in lockstep:
//!
//! ```text
//!   Segment arena (every segment, linked in buffer order):
//!
//!   head ─► [ 0..100 gap ] ◄─► [ 100..150 used ] ◄─► [ 150..450 gap ] ◄─► ...
//!
//!   Gap index (free segments only, sorted by size then address):
//!
//!   [ 100 @ 0 ][ 300 @ 150 ][ 300 @ 500 ]
//! ```
//!
//! - **First-fit** walks the arena list and takes the first gap large enough.
//! - **Best-fit** takes the first index entry large enough, which is the
//!   smallest sufficient gap and, among equal sizes, the lowest address.
//!
//! Segments refer to each other by slot number, not by address. When the
//! arena fills past 75% its slots are copied into storage twice the size and
//! the gap index is rebuilt from the list; outstanding handles stay valid.
//!
//! ## Limitations
//!
//! - **Single-threaded only**: pools and the registry are not `Sync`; the
//!   registry behind the free functions is per thread
//! - **Fixed buffer**: a pool never grows its buffer, only its bookkeeping
//! - **No compaction**: fragmentation is reduced only by merging neighbours
//! - **No alignment guarantees** beyond what the requested sizes produce

mod buffer;
pub mod config;
mod engine;
pub mod error;
mod gap;
pub mod inspect;
mod pool;
pub mod registry;
mod segment;

pub use config::{GrowthPolicy, PoolConfig, RegistryConfig};
pub use error::{AllocError, Result};
pub use inspect::{PoolSegment, check_invariants};
pub use pool::{AllocPolicy, Allocation, Pool, PoolStats};
pub use registry::{
  PoolHandle, Registry, allocate, free, inspect, pool_close, pool_open, registry_init,
  registry_init_with, registry_teardown, with_pool,
};
