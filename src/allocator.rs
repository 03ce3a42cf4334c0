use std::ptr::{self, NonNull};

use tracing::{debug, trace, warn};

use crate::{
  align,
  align::{DSIZE, MIN_BLOCK_SIZE, WSIZE, adjusted_size},
  block::{BlockPtr, Heap, Tag},
  coalesce::coalesce,
  config::{Config, Placement},
  error::{GrowError, InitError},
  free_list::FreeLists,
  memlib::{HeapSource, Region},
};

/// Largest region a heap of 32-bit boundary tags can address.
const MAX_REGION: usize = u32::MAX as usize & !(DSIZE - 1);

/// Boundary-tag allocator over a single growable region, with segregated
/// free lists.
///
/// ```text
///   base
///   ┌─────┬──────┬──────┬───────────────────────── ─ ─ ┬──────┐
///   │ pad │ 8|1  │ 8|1  │  blocks ...                  │ 0|1  │
///   └─────┴──────┴──────┴───────────────────────── ─ ─ ┴──────┘
///          prologue       first block at base + 16      epilogue
/// ```
pub struct SegAllocator<S: HeapSource = Region> {
  source: S,
  heap: Heap,
  lists: FreeLists,
  config: Config,
}

// The allocator has exclusive ownership of the memory behind `heap`.
unsafe impl<S: HeapSource + Send> Send for SegAllocator<S> {}

impl SegAllocator<Region> {
  /// An allocator over a private [`Region`] sized by `config.max_heap`.
  pub fn with_region(config: Config) -> Result<Self, InitError> {
    let region = Region::with_capacity(config.max_heap)?;
    Self::with_config(region, config)
  }
}

impl<S: HeapSource> SegAllocator<S> {
  pub fn new(source: S) -> Result<Self, InitError> {
    Self::with_config(source, Config::default())
  }

  pub fn with_config(
    mut source: S,
    config: Config,
  ) -> Result<Self, InitError> {
    let config = config.validated()?;
    let heap = Self::skeleton(&mut source)?;

    let mut allocator = Self {
      source,
      heap,
      lists: FreeLists::new(),
      config,
    };

    allocator.extend(allocator.config.chunk_size)?;

    debug!(
      target: "segalloc",
      base = ?allocator.heap.base(),
      chunk_size = allocator.config.chunk_size,
      "heap initialised"
    );

    Ok(allocator)
  }

  /// Lays down a fresh skeleton and initial chunk, forgetting every block of
  /// the previous heap. Pointers handed out before are dangling afterwards.
  pub fn init(&mut self) -> Result<(), InitError> {
    self.heap = Self::skeleton(&mut self.source)?;
    self.lists.clear();
    self.extend(self.config.chunk_size)?;

    debug!(target: "segalloc", base = ?self.heap.base(), "heap re-initialised");
    Ok(())
  }

  /// Pad word, prologue header and footer, epilogue header.
  fn skeleton(source: &mut S) -> Result<Heap, GrowError> {
    let base = source.sbrk(4 * WSIZE)?;

    if base.as_ptr() as usize % DSIZE != 0 {
      return Err(GrowError::Misaligned(base.as_ptr() as usize));
    }

    let mut heap = unsafe { Heap::new(base, 4 * WSIZE) };
    heap.put(0, 0);
    heap.put_tag(WSIZE, Tag::pack(DSIZE, true));
    heap.put_tag(2 * WSIZE, Tag::pack(DSIZE, true));
    heap.put_tag(3 * WSIZE, Tag::EPILOGUE);

    Ok(heap)
  }

  /// Grows the heap by at least `bytes` and returns the resulting free block,
  /// already merged with a free block that ended at the old break.
  fn extend(
    &mut self,
    bytes: usize,
  ) -> Result<BlockPtr, GrowError> {
    let size = align!(bytes.max(MIN_BLOCK_SIZE));
    let available = MAX_REGION.saturating_sub(self.heap.len());

    if size > available {
      return Err(GrowError::Exhausted {
        requested: size,
        available,
      });
    }

    let start = self.source.sbrk(size)?;

    if start.as_ptr() != self.heap.brk() {
      return Err(GrowError::Discontiguous {
        expected: self.heap.brk() as usize,
        found: start.as_ptr() as usize,
      });
    }

    // The new block's header overwrites the old epilogue.
    let bp = BlockPtr::new(self.heap.len()).ok_or(GrowError::Exhausted {
      requested: size,
      available,
    })?;
    unsafe { self.heap.grow(size) };

    self.heap.set_tags(bp, size, false);
    let epilogue = self.heap.next_block(bp);
    self.heap.put_tag(Heap::header_offset(epilogue), Tag::EPILOGUE);

    debug!(target: "segalloc", size, heap_size = self.heap.len(), "heap extended");

    self.lists.insert(&mut self.heap, bp);
    Ok(coalesce(&mut self.heap, &mut self.lists, bp))
  }

  /// Returns a double-word aligned block of at least `size` bytes, or `None`
  /// when `size` is zero or the heap cannot grow any further.
  pub fn allocate(
    &mut self,
    size: usize,
  ) -> Option<NonNull<u8>> {
    if size == 0 {
      return None;
    }

    let Some(asize) = adjusted_size(size) else {
      warn!(target: "segalloc", size, "request too large for a block");
      return None;
    };

    let bp = match self.lists.find_fit(&self.heap, asize) {
      Some(bp) => bp,
      None => match self.extend(asize.max(self.config.chunk_size)) {
        Ok(bp) => bp,
        Err(err) => {
          warn!(target: "segalloc", size, %err, "out of memory");
          return None;
        }
      },
    };

    let bp = self.place(bp, asize);
    let ptr = self.heap.payload(bp);

    trace!(target: "segalloc", size, block = asize, ?ptr, "allocated");
    Some(ptr)
  }

  /// Marks `asize` bytes of the free block `bp` allocated, splitting off the
  /// rest when it can stand as a block of its own.
  fn place(
    &mut self,
    bp: BlockPtr,
    asize: usize,
  ) -> BlockPtr {
    let total = self.heap.size(bp);
    self.lists.remove(&mut self.heap, bp);

    let slack = total - asize;

    if slack < MIN_BLOCK_SIZE {
      self.heap.set_tags(bp, total, true);
      return bp;
    }

    match self.config.placement {
      Placement::Segregating { threshold } if asize >= threshold => {
        self.heap.set_tags(bp, slack, false);
        self.lists.insert(&mut self.heap, bp);

        let allocated = self.heap.next_block(bp);
        self.heap.set_tags(allocated, asize, true);
        allocated
      }
      _ => {
        self.heap.set_tags(bp, asize, true);

        let rest = self.heap.next_block(bp);
        self.heap.set_tags(rest, slack, false);
        self.lists.insert(&mut self.heap, rest);
        bp
      }
    }
  }

  /// Returns a block to the heap.
  ///
  /// # Safety
  ///
  /// `ptr` must have come from [`allocate`](Self::allocate) or
  /// [`resize`](Self::resize) on this allocator since its last
  /// [`init`](Self::init), and must not have been released already. Nothing
  /// checks this.
  pub unsafe fn release(
    &mut self,
    ptr: NonNull<u8>,
  ) {
    let bp = unsafe { self.heap.block_of(ptr) };
    let size = self.heap.size(bp);

    self.heap.set_tags(bp, size, false);
    self.lists.insert(&mut self.heap, bp);
    coalesce(&mut self.heap, &mut self.lists, bp);

    trace!(target: "segalloc", ?ptr, size, "released");
  }

  /// Resizes a block, growing in place when the block after it is free or the
  /// end of the heap, moving it otherwise. Never shrinks.
  ///
  /// `resize(None, n)` is `allocate(n)`. `resize(Some(p), 0)` releases `p`
  /// and returns `None`. When no memory is left, `None` is returned and the
  /// original block is untouched.
  ///
  /// # Safety
  ///
  /// Same contract as [`release`](Self::release) for `ptr`. On success the
  /// old pointer must no longer be used unless it was returned again.
  pub unsafe fn resize(
    &mut self,
    ptr: Option<NonNull<u8>>,
    size: usize,
  ) -> Option<NonNull<u8>> {
    let Some(ptr) = ptr else {
      return self.allocate(size);
    };

    if size == 0 {
      unsafe { self.release(ptr) };
      return None;
    }

    let asize = adjusted_size(size)?;
    let bp = unsafe { self.heap.block_of(ptr) };
    let current = self.heap.size(bp);

    if current >= asize {
      return Some(ptr);
    }

    if self.grow_in_place(bp, asize) {
      trace!(target: "segalloc", ?ptr, size, "resized in place");
      return Some(ptr);
    }

    let moved = self.allocate(size)?;
    unsafe {
      ptr::copy_nonoverlapping(ptr.as_ptr(), moved.as_ptr(), (current - DSIZE).min(size));
      self.release(ptr);
    }

    trace!(target: "segalloc", from = ?ptr, to = ?moved, size, "resized by moving");
    Some(moved)
  }

  /// Absorbs the following block, extending the heap first if that block
  /// ends at the break and is still too small.
  fn grow_in_place(
    &mut self,
    bp: BlockPtr,
    asize: usize,
  ) -> bool {
    let current = self.heap.size(bp);
    let next = self.heap.next_block(bp);
    let next_tag = self.heap.header(next);

    let next_is_end = next_tag.size() == 0;
    if next_tag.is_allocated() && !next_is_end {
      return false;
    }

    let mut available = current + next_tag.size();

    if available < asize {
      let reaches_end = next_is_end || self.heap.size(self.heap.next_block(next)) == 0;
      if !reaches_end {
        return false;
      }

      let shortfall = asize - available;
      if let Err(err) = self.extend(shortfall.max(self.config.chunk_size)) {
        warn!(target: "segalloc", shortfall, %err, "cannot grow block in place");
        return false;
      }

      // Either a fresh block at the old epilogue or `next` merged with it.
      available = current + self.heap.size(next);
    }

    self.lists.remove(&mut self.heap, next);
    self.heap.set_tags(bp, available, true);
    true
  }

  /// Payload bytes available behind a live pointer.
  ///
  /// # Safety
  ///
  /// `ptr` must be a live allocation of this allocator.
  pub unsafe fn usable_size(
    &self,
    ptr: NonNull<u8>,
  ) -> usize {
    let bp = unsafe { self.heap.block_of(ptr) };
    self.heap.size(bp) - DSIZE
  }

  pub fn config(&self) -> &Config {
    &self.config
  }

  pub fn source(&self) -> &S {
    &self.source
  }

  pub(crate) fn heap(&self) -> &Heap {
    &self.heap
  }

  pub(crate) fn lists(&self) -> &FreeLists {
    &self.lists
  }
}
