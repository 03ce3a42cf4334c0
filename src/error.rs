use thiserror::Error;

/// The growth primitive could not extend the managed region.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GrowError {
  #[error("heap exhausted: requested {requested} bytes, {available} bytes left")]
  Exhausted { requested: usize, available: usize },

  #[error("region grew at {found:#x}, expected {expected:#x}")]
  Discontiguous { expected: usize, found: usize },

  #[error("region start {0:#x} is not double-word aligned")]
  Misaligned(usize),

  #[error("sbrk failed: errno {0}")]
  Os(i32),
}

/// The allocator could not be brought up. Nothing may be allocated from it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InitError {
  #[error("bootstrap extension failed: {0}")]
  Grow(#[from] GrowError),

  #[error("invalid configuration: {0}")]
  Config(#[from] ConfigError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
  #[error("chunk size {0} is smaller than the minimum block")]
  ChunkTooSmall(usize),

  #[error("chunk size {0} does not fit a boundary tag")]
  ChunkTooLarge(usize),
}

/// A broken heap invariant found by a consistency scan. Offsets are payload
/// offsets from the start of the managed region.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Inconsistency {
  #[error("prologue at 8 is damaged")]
  BadPrologue,

  #[error("epilogue expected at {expected}, heap ends at {found}")]
  BadEpilogue { expected: usize, found: usize },

  #[error("header and footer disagree at {0}")]
  TagMismatch(usize),

  #[error("block at {offset} has invalid size {size}")]
  BadSize { offset: usize, size: usize },

  #[error("payload at {0} is not double-word aligned")]
  Misaligned(usize),

  #[error("block at {0} runs past the break")]
  Overlap(usize),

  #[error("adjacent free blocks at {0} and {1} escaped coalescing")]
  Uncoalesced(usize, usize),

  #[error("block at {0} is in a free list but marked allocated")]
  AllocatedInFreeList(usize),

  #[error("block at {offset} of size {size} sits in bucket {bucket}")]
  WrongBucket { offset: usize, size: usize, bucket: usize },

  #[error("bucket {0} is not sorted by size")]
  Unsorted(usize),

  #[error("broken back link at {0}")]
  BrokenLink(usize),

  #[error("{heap} free blocks in the heap, {lists} in the free lists")]
  FreeCountMismatch { heap: usize, lists: usize },
}
