use std::ptr::NonNull;

use parking_lot::{Mutex, MutexGuard};

use crate::{
  allocator::SegAllocator,
  check::HeapStats,
  error::{Inconsistency, InitError},
  memlib::{HeapSource, Region},
};

/// A [`SegAllocator`] behind one lock, for callers on several threads.
///
/// Every operation takes the lock for its whole duration, so calls are
/// serialised exactly as the single-threaded allocator expects.
pub struct LockedAllocator<S: HeapSource = Region> {
  inner: Mutex<SegAllocator<S>>,
}

impl<S: HeapSource> LockedAllocator<S> {
  pub fn new(allocator: SegAllocator<S>) -> Self {
    Self {
      inner: Mutex::new(allocator),
    }
  }

  pub fn allocate(
    &self,
    size: usize,
  ) -> Option<NonNull<u8>> {
    self.inner.lock().allocate(size)
  }

  /// # Safety
  ///
  /// See [`SegAllocator::release`].
  pub unsafe fn release(
    &self,
    ptr: NonNull<u8>,
  ) {
    unsafe { self.inner.lock().release(ptr) }
  }

  /// # Safety
  ///
  /// See [`SegAllocator::resize`].
  pub unsafe fn resize(
    &self,
    ptr: Option<NonNull<u8>>,
    size: usize,
  ) -> Option<NonNull<u8>> {
    unsafe { self.inner.lock().resize(ptr, size) }
  }

  pub fn init(&self) -> Result<(), InitError> {
    self.inner.lock().init()
  }

  pub fn check(&self) -> Result<(), Inconsistency> {
    self.inner.lock().check()
  }

  pub fn stats(&self) -> HeapStats {
    self.inner.lock().stats()
  }

  /// Holds the lock across several operations.
  pub fn lock(&self) -> MutexGuard<'_, SegAllocator<S>> {
    self.inner.lock()
  }

  pub fn into_inner(self) -> SegAllocator<S> {
    self.inner.into_inner()
  }
}
