use std::env;

use tracing::warn;

use crate::{
  align,
  align::{CHUNK_SIZE, MAX_BLOCK_SIZE, MIN_BLOCK_SIZE},
  error::ConfigError,
  memlib::MAX_HEAP,
};

/// Where a split block puts the allocated piece.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
  /// Allocated piece at the low address, free remainder above it.
  LowAddress,
  /// Like [`Placement::LowAddress`] for small carves, but carves of at least
  /// `threshold` bytes go to the high address, leaving the remainder below.
  /// Keeps small and large blocks apart.
  Segregating { threshold: usize },
}

impl Default for Placement {
  fn default() -> Self {
    Placement::Segregating { threshold: 32 }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
  /// Bytes the heap grows by at init and whenever no free block fits.
  pub chunk_size: usize,
  pub placement: Placement,
  /// Capacity used when the allocator builds its own [`crate::Region`].
  pub max_heap: usize,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      chunk_size: CHUNK_SIZE,
      placement: Placement::default(),
      max_heap: MAX_HEAP,
    }
  }
}

impl Config {
  pub fn with_chunk_size(
    mut self,
    chunk_size: usize,
  ) -> Self {
    self.chunk_size = chunk_size;
    self
  }

  pub fn with_placement(
    mut self,
    placement: Placement,
  ) -> Self {
    self.placement = placement;
    self
  }

  pub fn with_max_heap(
    mut self,
    max_heap: usize,
  ) -> Self {
    self.max_heap = max_heap;
    self
  }

  /// Defaults overridden by `SEGALLOC_CHUNK_SIZE`, `SEGALLOC_MAX_HEAP` and
  /// `SEGALLOC_PLACEMENT` (`low` or `split:<threshold>`). Unparsable values
  /// are ignored.
  pub fn from_env() -> Self {
    let mut config = Self::default();

    if let Some(chunk_size) = read_env("SEGALLOC_CHUNK_SIZE", |v| v.parse::<usize>().ok()) {
      config.chunk_size = chunk_size;
    }

    if let Some(max_heap) = read_env("SEGALLOC_MAX_HEAP", |v| v.parse::<usize>().ok()) {
      config.max_heap = max_heap;
    }

    if let Some(placement) = read_env("SEGALLOC_PLACEMENT", parse_placement) {
      config.placement = placement;
    }

    config
  }

  /// Rounds the chunk size to the alignment unit and rejects unusable ones.
  pub fn validated(mut self) -> Result<Self, ConfigError> {
    if self.chunk_size < MIN_BLOCK_SIZE {
      return Err(ConfigError::ChunkTooSmall(self.chunk_size));
    }

    if self.chunk_size > MAX_BLOCK_SIZE {
      return Err(ConfigError::ChunkTooLarge(self.chunk_size));
    }

    self.chunk_size = align!(self.chunk_size);
    Ok(self)
  }
}

fn read_env<T>(
  key: &str,
  parse: impl FnOnce(&str) -> Option<T>,
) -> Option<T> {
  let value = env::var(key).ok()?;
  let parsed = parse(value.trim());

  if parsed.is_none() {
    warn!(target: "segalloc", key, value = %value, "ignoring unparsable setting");
  }

  parsed
}

pub fn parse_placement(value: &str) -> Option<Placement> {
  match value {
    "low" => Some(Placement::LowAddress),
    _ => value
      .strip_prefix("split:")
      .and_then(|threshold| threshold.parse().ok())
      .map(|threshold| Placement::Segregating { threshold }),
  }
}
