use std::{
  alloc::{self, Layout},
  ptr::NonNull,
};

use libc::{c_void, intptr_t, sbrk};
use tracing::debug;

use crate::{align, align::ALIGNMENT, error::GrowError};

/// Default ceiling for a [`Region`]: 20 MiB.
pub const MAX_HEAP: usize = 20 * (1 << 20);

/// The primitive a heap grows through.
///
/// Every successful call returns the old break: the first byte of `increment`
/// freshly granted bytes that directly follow the previously granted ones.
/// The region never shrinks.
pub trait HeapSource {
  fn sbrk(
    &mut self,
    increment: usize,
  ) -> Result<NonNull<u8>, GrowError>;
}

/// A fixed-capacity region reserved up front and handed out by moving a
/// break forward, like a private `sbrk`.
pub struct Region {
  start: NonNull<u8>,
  layout: Layout,
  brk: usize,
}

impl Region {
  pub fn new() -> Result<Self, GrowError> {
    Self::with_capacity(MAX_HEAP)
  }

  /// Reserves `max_heap` bytes, rounded up to the alignment unit. Fails when
  /// the reservation is impossible instead of aborting.
  pub fn with_capacity(max_heap: usize) -> Result<Self, GrowError> {
    let exhausted = GrowError::Exhausted {
      requested: max_heap,
      available: isize::MAX as usize,
    };

    let size = max_heap
      .max(ALIGNMENT)
      .checked_add(ALIGNMENT - 1)
      .map(|size| size & !(ALIGNMENT - 1))
      .ok_or(exhausted.clone())?;
    let layout = Layout::from_size_align(size, ALIGNMENT).map_err(|_| exhausted.clone())?;

    let start = NonNull::new(unsafe { alloc::alloc(layout) }).ok_or(GrowError::Exhausted {
      requested: size,
      available: 0,
    })?;

    debug!(target: "segalloc", capacity = size, "region reserved");
    Ok(Self { start, layout, brk: 0 })
  }

  pub fn capacity(&self) -> usize {
    self.layout.size()
  }

  /// Bytes handed out so far.
  pub fn used(&self) -> usize {
    self.brk
  }

  /// Rewinds the break to the start. Anything built on the region is gone.
  pub fn reset(&mut self) {
    self.brk = 0;
  }
}

impl HeapSource for Region {
  fn sbrk(
    &mut self,
    increment: usize,
  ) -> Result<NonNull<u8>, GrowError> {
    let available = self.capacity() - self.brk;

    if increment > available {
      return Err(GrowError::Exhausted {
        requested: increment,
        available,
      });
    }

    let old = unsafe { self.start.add(self.brk) };
    self.brk += increment;

    Ok(old)
  }
}

impl Drop for Region {
  fn drop(&mut self) {
    unsafe { alloc::dealloc(self.start.as_ptr(), self.layout) }
  }
}

// The region is plain owned memory.
unsafe impl Send for Region {}

/// The process break, moved with `sbrk(2)`.
///
/// Only sound while nothing else in the process moves the break; a growth
/// that does not land right after the previous one is reported by the
/// allocator as discontiguous.
pub struct ProgramBreak {
  _private: (),
}

impl ProgramBreak {
  /// Pads the current break up to the alignment unit.
  pub fn new() -> Result<Self, GrowError> {
    let current = unsafe { sbrk(0) } as usize;
    let pad = align!(current) - current;

    if pad > 0 {
      debug!(target: "segalloc", pad, "aligning program break");
      Self::raw_sbrk(pad)?;
    }

    Ok(Self { _private: () })
  }

  /// Current program break.
  pub fn current() -> *mut c_void {
    unsafe { sbrk(0) }
  }

  fn raw_sbrk(increment: usize) -> Result<NonNull<u8>, GrowError> {
    let increment = intptr_t::try_from(increment).map_err(|_| GrowError::Exhausted {
      requested: increment,
      available: intptr_t::MAX as usize,
    })?;

    let address = unsafe { sbrk(increment) };

    if address == usize::MAX as *mut c_void {
      let errno = std::io::Error::last_os_error().raw_os_error().unwrap_or(libc::ENOMEM);
      return Err(GrowError::Os(errno));
    }

    NonNull::new(address.cast()).ok_or(GrowError::Os(libc::ENOMEM))
  }
}

impl HeapSource for ProgramBreak {
  fn sbrk(
    &mut self,
    increment: usize,
  ) -> Result<NonNull<u8>, GrowError> {
    Self::raw_sbrk(increment)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_region_grows_contiguously() {
    let mut region = Region::with_capacity(256).unwrap();

    let first = region.sbrk(16).unwrap();
    let second = region.sbrk(64).unwrap();

    assert_eq!(first.as_ptr() as usize % ALIGNMENT, 0);
    assert_eq!(unsafe { first.add(16) }, second);
    assert_eq!(region.used(), 80);
  }

  #[test]
  fn test_region_exhaustion() {
    let mut region = Region::with_capacity(64).unwrap();

    region.sbrk(48).unwrap();

    assert_eq!(
      region.sbrk(32),
      Err(GrowError::Exhausted {
        requested: 32,
        available: 16
      })
    );
    assert_eq!(region.used(), 48);

    region.sbrk(16).unwrap();
    assert!(region.sbrk(1).is_err());
  }

  #[test]
  fn test_region_reset() {
    let mut region = Region::with_capacity(64).unwrap();

    let first = region.sbrk(64).unwrap();
    region.reset();

    assert_eq!(region.sbrk(8).unwrap(), first);
  }

  #[test]
  fn test_region_capacity_rounds_up() {
    assert_eq!(Region::with_capacity(0).unwrap().capacity(), ALIGNMENT);
    assert_eq!(Region::with_capacity(100).unwrap().capacity(), 104);
  }

  #[test]
  fn test_region_rejects_impossible_capacity() {
    assert!(matches!(
      Region::with_capacity(usize::MAX),
      Err(GrowError::Exhausted { .. })
    ));
    assert!(matches!(
      Region::with_capacity(isize::MAX as usize),
      Err(GrowError::Exhausted { .. })
    ));
  }

  #[test]
  fn test_program_break_starts_aligned() {
    let mut source = ProgramBreak::new().unwrap();
    assert!(!ProgramBreak::current().is_null());

    let start = source.sbrk(0).unwrap();
    assert_eq!(start.as_ptr() as usize % ALIGNMENT, 0);
  }
}
