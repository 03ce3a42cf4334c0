//! # segalloc - A Segregated Free-List Memory Allocator
//!
//! This crate provides a **boundary-tag allocator with segregated free lists**
//! over a single contiguous region that only ever grows, the way `malloc`
//! sits on top of `sbrk`.
//!
//! ## Overview
//!
//! Every block carries its size and an allocated bit at both ends, and every
//! free block is linked into one of twenty size-class lists through its own
//! payload. No bookkeeping lives outside the managed region.
//!
//! ```text
//!   Managed Region:
//!
//!   ┌──────────────────────────────────────────────────────────────────────┐
//!   │ pad │ prologue │  A1  │   free   │  A2  │      free      │ epilogue │
//!   └──────────────────────────────────────────────────────────────────────┘
//!                             │                      │                     ▲
//!                             │                      │                     │
//!                             ▼                      ▼                  Break
//!   buckets  [0] [1] ... [6] ───┘   ...   [11] ──────┘   ...   [19]
//!
//!   Allocation: search the bucket for the request's size class, then larger
//!   ones; split the block found; grow the region when nothing fits.
//!   Release: mark free, merge with free neighbours, relink.
//! ```
//!
//! ## Crate Structure
//!
//! ```text
//!   segalloc
//!   ├── align      - Alignment macro and size constants
//!   ├── block      - Boundary tags, block navigation over the region
//!   ├── memlib     - Growth primitives (Region, ProgramBreak)
//!   ├── free_list  - Segregated, size-sorted free lists
//!   ├── coalesce   - Merging of adjacent free blocks
//!   ├── allocator  - SegAllocator: allocate, release, resize
//!   ├── check      - Consistency scan and heap statistics
//!   ├── config     - Chunk size, placement policy, heap ceiling
//!   ├── sync       - LockedAllocator for multi-threaded callers
//!   └── logging    - tracing subscriber setup
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use segalloc::{Config, SegAllocator};
//!
//! let mut allocator = SegAllocator::with_region(Config::default()).unwrap();
//!
//! let ptr = allocator.allocate(100).unwrap();
//! unsafe {
//!     ptr.as_ptr().write(42);
//!
//!     let ptr = allocator.resize(Some(ptr), 400).unwrap();
//!     assert_eq!(ptr.as_ptr().read(), 42);
//!
//!     allocator.release(ptr);
//! }
//!
//! assert!(allocator.is_consistent());
//! ```
//!
//! ## Block Format
//!
//! ```text
//!   Allocated:                          Free:
//!   ┌──────────────┐                    ┌──────────────┐
//!   │ size | 1     │ header             │ size | 0     │ header
//!   ├──────────────┤ ◄── pointer        ├──────────────┤
//!   │              │     returned       │ next free    │
//!   │   payload    │                    │ prev free    │
//!   │              │                    │   ...        │
//!   ├──────────────┤                    ├──────────────┤
//!   │ size | 1     │ footer             │ size | 0     │ footer
//!   └──────────────┘                    └──────────────┘
//! ```
//!
//! Tags and links are 4-byte words; links are offsets from the start of the
//! region. Sizes are multiples of 8, the smallest block is 16 bytes, and a
//! single heap spans at most 4 GiB.
//!
//! ## Limitations
//!
//! - **Single-threaded core**: wrap it in [`LockedAllocator`] to share it
//! - **Never shrinks**: memory goes back to the free lists, not to the source
//! - **Unchecked misuse**: double frees and foreign pointers are undefined
//!   behavior, which is why [`SegAllocator::release`] is `unsafe`
//! - **8-byte alignment only**
//!
//! ## Safety
//!
//! Handing out raw memory is inherently unsafe. Allocation is safe to call;
//! releasing and resizing require `unsafe` blocks.

pub mod align;
mod allocator;
mod block;
mod check;
mod coalesce;
mod config;
mod error;
mod free_list;
pub mod logging;
mod memlib;
mod sync;

pub use allocator::SegAllocator;
pub use check::HeapStats;
pub use config::{Config, Placement};
pub use error::{ConfigError, GrowError, Inconsistency, InitError};
pub use free_list::MAX_LIST;
pub use memlib::{HeapSource, MAX_HEAP, ProgramBreak, Region};
pub use sync::LockedAllocator;
