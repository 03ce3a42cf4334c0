use std::{num::NonZeroU32, ptr::NonNull};

use crate::align::{DSIZE, WSIZE};

/// A block, named by the heap offset of its payload.
///
/// Offsets are relative to the start of the managed region. Offset zero is the
/// alignment pad, so it never names a block and can be stored as a null link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockPtr(NonZeroU32);

impl BlockPtr {
  pub fn new(offset: usize) -> Option<Self> {
    u32::try_from(offset).ok().and_then(NonZeroU32::new).map(Self)
  }

  #[inline]
  pub fn offset(self) -> usize {
    self.0.get() as usize
  }

  #[inline]
  fn raw(link: Option<Self>) -> u32 {
    link.map_or(0, |bp| bp.0.get())
  }

  #[inline]
  fn from_raw(raw: u32) -> Option<Self> {
    NonZeroU32::new(raw).map(Self)
  }

  #[inline]
  fn add(
    self,
    bytes: usize,
  ) -> Self {
    Self(self.0.saturating_add(bytes as u32))
  }

  #[inline]
  fn sub(
    self,
    bytes: usize,
  ) -> Self {
    Self::new(self.offset() - bytes).expect("block offset underflows the heap")
  }
}

/// A boundary tag: block size packed with the allocated bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tag(u32);

impl Tag {
  /// The zero-size, allocated tag closing the heap.
  pub const EPILOGUE: Tag = Tag(1);

  #[inline]
  pub fn pack(
    size: usize,
    allocated: bool,
  ) -> Self {
    debug_assert_eq!(size % DSIZE, 0, "unaligned block size {size}");
    Self(size as u32 | allocated as u32)
  }

  #[inline]
  pub fn size(self) -> usize {
    (self.0 & !0x7) as usize
  }

  #[inline]
  pub fn is_allocated(self) -> bool {
    self.0 & 0x1 == 1
  }
}

/// The managed region, viewed as words.
///
/// ```text
///   bp = BlockPtr (payload offset)
///
///   ┌────────┬───────────────────────────────────────┬────────┐
///   │ header │ payload                               │ footer │
///   │ size|a │ (free: next link, prev link, ...)     │ size|a │
///   └────────┴───────────────────────────────────────┴────────┘
///   bp - 4   bp                                      bp + size - 8
/// ```
pub struct Heap {
  base: NonNull<u8>,
  len: usize,
}

impl Heap {
  /// # Safety
  ///
  /// `base` must be aligned to the alignment unit and `len` bytes starting at
  /// it must stay valid for reads and writes for as long as the heap is used.
  pub unsafe fn new(
    base: NonNull<u8>,
    len: usize,
  ) -> Self {
    Self { base, len }
  }

  #[inline]
  pub fn base(&self) -> NonNull<u8> {
    self.base
  }

  /// Bytes between the base and the current break.
  #[inline]
  pub fn len(&self) -> usize {
    self.len
  }

  /// Address right after the last managed byte.
  #[inline]
  pub fn brk(&self) -> *mut u8 {
    self.base.as_ptr().wrapping_add(self.len)
  }

  /// # Safety
  ///
  /// The `bytes` right after the current break must have been granted by the
  /// same growth primitive that produced `base`.
  pub unsafe fn grow(
    &mut self,
    bytes: usize,
  ) {
    self.len += bytes;
  }

  #[inline]
  pub fn get(
    &self,
    offset: usize,
  ) -> u32 {
    debug_assert!(offset % WSIZE == 0 && offset + WSIZE <= self.len, "word {offset} outside heap");
    unsafe { self.base.as_ptr().add(offset).cast::<u32>().read() }
  }

  #[inline]
  pub fn put(
    &mut self,
    offset: usize,
    value: u32,
  ) {
    debug_assert!(offset % WSIZE == 0 && offset + WSIZE <= self.len, "word {offset} outside heap");
    unsafe { self.base.as_ptr().add(offset).cast::<u32>().write(value) }
  }

  #[inline]
  pub fn tag_at(
    &self,
    offset: usize,
  ) -> Tag {
    Tag(self.get(offset))
  }

  #[inline]
  pub fn put_tag(
    &mut self,
    offset: usize,
    tag: Tag,
  ) {
    self.put(offset, tag.0);
  }

  #[inline]
  pub fn header_offset(bp: BlockPtr) -> usize {
    bp.offset() - WSIZE
  }

  #[inline]
  pub fn footer_offset(
    &self,
    bp: BlockPtr,
  ) -> usize {
    bp.offset() + self.size(bp) - DSIZE
  }

  #[inline]
  pub fn header(
    &self,
    bp: BlockPtr,
  ) -> Tag {
    self.tag_at(Self::header_offset(bp))
  }

  #[inline]
  pub fn footer(
    &self,
    bp: BlockPtr,
  ) -> Tag {
    self.tag_at(self.footer_offset(bp))
  }

  #[inline]
  pub fn size(
    &self,
    bp: BlockPtr,
  ) -> usize {
    self.header(bp).size()
  }

  #[inline]
  pub fn is_allocated(
    &self,
    bp: BlockPtr,
  ) -> bool {
    self.header(bp).is_allocated()
  }

  /// Writes the header, then the footer derived from the new size.
  pub fn set_tags(
    &mut self,
    bp: BlockPtr,
    size: usize,
    allocated: bool,
  ) {
    let tag = Tag::pack(size, allocated);
    self.put_tag(Self::header_offset(bp), tag);
    self.put_tag(bp.offset() + size - DSIZE, tag);
  }

  #[inline]
  pub fn next_block(
    &self,
    bp: BlockPtr,
  ) -> BlockPtr {
    bp.add(self.size(bp))
  }

  /// Walks back using the previous block's footer.
  #[inline]
  pub fn prev_block(
    &self,
    bp: BlockPtr,
  ) -> BlockPtr {
    bp.sub(self.tag_at(bp.offset() - DSIZE).size())
  }

  /// Tag of the block physically before `bp`, read from its footer.
  #[inline]
  pub fn prev_footer(
    &self,
    bp: BlockPtr,
  ) -> Tag {
    self.tag_at(bp.offset() - DSIZE)
  }

  #[inline]
  pub fn next_free(
    &self,
    bp: BlockPtr,
  ) -> Option<BlockPtr> {
    BlockPtr::from_raw(self.get(bp.offset()))
  }

  #[inline]
  pub fn prev_free(
    &self,
    bp: BlockPtr,
  ) -> Option<BlockPtr> {
    BlockPtr::from_raw(self.get(bp.offset() + WSIZE))
  }

  #[inline]
  pub fn set_next_free(
    &mut self,
    bp: BlockPtr,
    next: Option<BlockPtr>,
  ) {
    self.put(bp.offset(), BlockPtr::raw(next));
  }

  #[inline]
  pub fn set_prev_free(
    &mut self,
    bp: BlockPtr,
    prev: Option<BlockPtr>,
  ) {
    self.put(bp.offset() + WSIZE, BlockPtr::raw(prev));
  }

  /// Address handed out to callers for this block.
  #[inline]
  pub fn payload(
    &self,
    bp: BlockPtr,
  ) -> NonNull<u8> {
    unsafe { self.base.add(bp.offset()) }
  }

  /// Maps a payload address back to its block.
  ///
  /// # Safety
  ///
  /// `ptr` must be a payload address previously produced by [`Heap::payload`].
  pub unsafe fn block_of(
    &self,
    ptr: NonNull<u8>,
  ) -> BlockPtr {
    let offset = unsafe { ptr.as_ptr().offset_from(self.base.as_ptr()) };
    debug_assert!(offset > 0 && (offset as usize) < self.len, "pointer {ptr:?} not in heap");
    BlockPtr::new(offset as usize).expect("pointer not in heap")
  }

  /// Every block from the prologue up to (not including) the epilogue.
  pub fn blocks(&self) -> Blocks<'_> {
    Blocks {
      heap: self,
      cursor: BlockPtr::new(DSIZE),
    }
  }
}

pub struct Blocks<'a> {
  heap: &'a Heap,
  cursor: Option<BlockPtr>,
}

impl Iterator for Blocks<'_> {
  type Item = BlockPtr;

  fn next(&mut self) -> Option<BlockPtr> {
    let bp = self.cursor?;

    if bp.offset() + WSIZE > self.heap.len {
      self.cursor = None;
      return None;
    }

    let size = self.heap.size(bp);
    if size == 0 {
      self.cursor = None;
      return None;
    }

    self.cursor = BlockPtr::new(bp.offset() + size);
    Some(bp)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn heap_over(words: &mut [u64]) -> Heap {
    let len = words.len() * 8;
    unsafe { Heap::new(NonNull::new(words.as_mut_ptr().cast()).unwrap(), len) }
  }

  #[test]
  fn test_tag_packing() {
    let tag = Tag::pack(4096, false);
    assert_eq!(tag.size(), 4096);
    assert!(!tag.is_allocated());

    let tag = Tag::pack(24, true);
    assert_eq!(tag.size(), 24);
    assert!(tag.is_allocated());

    assert_eq!(Tag::EPILOGUE.size(), 0);
    assert!(Tag::EPILOGUE.is_allocated());
  }

  #[test]
  fn test_block_ptr_rejects_zero() {
    assert!(BlockPtr::new(0).is_none());
    assert_eq!(BlockPtr::new(16).map(BlockPtr::offset), Some(16));
    assert!(BlockPtr::new(u32::MAX as usize + 1).is_none());
  }

  #[test]
  fn test_navigation() {
    let mut words = [0u64; 16];
    let mut heap = heap_over(&mut words);

    // prologue, then a 32 byte block, a 48 byte block and the epilogue.
    heap.put(0, 0);
    heap.set_tags(BlockPtr::new(8).unwrap(), 8, true);
    let a = BlockPtr::new(16).unwrap();
    heap.set_tags(a, 32, true);
    let b = heap.next_block(a);
    heap.set_tags(b, 48, false);
    heap.put_tag(Heap::header_offset(heap.next_block(b)), Tag::EPILOGUE);

    assert_eq!(b.offset(), 48);
    assert_eq!(heap.prev_block(b), a);
    assert_eq!(heap.header(b), heap.footer(b));
    assert!(heap.prev_footer(b).is_allocated());
    assert_eq!(heap.blocks().map(BlockPtr::offset).collect::<Vec<_>>(), vec![8, 16, 48]);
  }

  #[test]
  fn test_links() {
    let mut words = [0u64; 8];
    let mut heap = heap_over(&mut words);
    let bp = BlockPtr::new(16).unwrap();
    let other = BlockPtr::new(40).unwrap();

    heap.set_next_free(bp, Some(other));
    heap.set_prev_free(bp, None);

    assert_eq!(heap.next_free(bp), Some(other));
    assert_eq!(heap.prev_free(bp), None);
  }

  #[test]
  fn test_payload_round_trip() {
    let mut words = [0u64; 8];
    let heap = heap_over(&mut words);
    let bp = BlockPtr::new(24).unwrap();

    let ptr = heap.payload(bp);
    assert_eq!(ptr.as_ptr() as usize % DSIZE, 0);
    assert_eq!(unsafe { heap.block_of(ptr) }, bp);
  }
}
