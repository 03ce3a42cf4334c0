/// Word size in bytes. Headers, footers and free-list links are one word each.
pub const WSIZE: usize = 4;

/// Double word size in bytes. This is also the alignment unit.
pub const DSIZE: usize = 8;

/// Every payload pointer and every block size is a multiple of this.
pub const ALIGNMENT: usize = DSIZE;

/// Header + next link + prev link + footer.
pub const MIN_BLOCK_SIZE: usize = 2 * DSIZE;

/// Default amount (in bytes) the heap grows by when no free block fits.
pub const CHUNK_SIZE: usize = 1 << 12;

/// Largest block size a 32-bit boundary tag can describe.
pub const MAX_BLOCK_SIZE: usize = (u32::MAX as usize) & !(ALIGNMENT - 1);

/// Rounds the given size up to the allocator's alignment unit (a double word).
///
/// # Examples
///
/// ```rust
/// use segalloc::align;
///
/// assert_eq!(align!(1), 8);
/// assert_eq!(align!(8), 8);
/// assert_eq!(align!(13), 16);
/// ```
#[macro_export]
macro_rules! align {
  ($value:expr) => {
    ($value + $crate::align::ALIGNMENT - 1) & !($crate::align::ALIGNMENT - 1)
  };
}

/// Block size needed to serve a request of `size` payload bytes.
///
/// Adds room for the header and footer, rounds up to the alignment unit and
/// never goes below [`MIN_BLOCK_SIZE`]. Returns `None` when the result would
/// not fit in a boundary tag.
pub const fn adjusted_size(size: usize) -> Option<usize> {
  if size <= DSIZE {
    return Some(MIN_BLOCK_SIZE);
  }

  if size > MAX_BLOCK_SIZE - DSIZE {
    return None;
  }

  Some(align!(size + DSIZE))
}
