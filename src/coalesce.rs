use tracing::trace;

use crate::{
  block::{BlockPtr, Heap},
  free_list::FreeLists,
};

/// Merges a free block with its free physical neighbours.
///
/// `bp` must be marked free and already linked into `lists`. Returns the
/// surviving block, linked into the bucket for its merged size.
///
/// ```text
///   prev   bp   next          result
///   [A]   [F]   [A]    ->     unchanged
///   [A]   [F]   [F]    ->     [A][ F + next  ]
///   [F]   [F]   [A]    ->     [ prev + F ][A]
///   [F]   [F]   [F]    ->     [ prev + F + next ]
/// ```
pub fn coalesce(
  heap: &mut Heap,
  lists: &mut FreeLists,
  bp: BlockPtr,
) -> BlockPtr {
  let prev_allocated = heap.prev_footer(bp).is_allocated();
  let next = heap.next_block(bp);
  let next_allocated = heap.is_allocated(next);

  let mut size = heap.size(bp);

  let start = match (prev_allocated, next_allocated) {
    (true, true) => return bp,
    (true, false) => {
      lists.remove(heap, bp);
      lists.remove(heap, next);
      size += heap.size(next);
      bp
    }
    (false, true) => {
      let prev = heap.prev_block(bp);
      lists.remove(heap, bp);
      lists.remove(heap, prev);
      size += heap.size(prev);
      prev
    }
    (false, false) => {
      let prev = heap.prev_block(bp);
      lists.remove(heap, bp);
      lists.remove(heap, prev);
      lists.remove(heap, next);
      size += heap.size(prev) + heap.size(next);
      prev
    }
  };

  trace!(target: "segalloc", from = bp.offset(), into = start.offset(), size, "coalesced");

  heap.set_tags(start, size, false);
  lists.insert(heap, start);
  start
}

#[cfg(test)]
mod tests {
  use std::ptr::NonNull;

  use super::*;
  use crate::block::Tag;

  /// Prologue, blocks of the given (size, allocated) shape, epilogue. Free
  /// blocks are linked into the returned lists.
  fn layout(
    words: &mut Vec<u64>,
    shape: &[(usize, bool)],
  ) -> (Heap, FreeLists, Vec<BlockPtr>) {
    let total: usize = shape.iter().map(|&(size, _)| size).sum();
    words.resize((total + 16) / 8, 0);

    let len = words.len() * 8;
    let mut heap = unsafe { Heap::new(NonNull::new(words.as_mut_ptr().cast()).unwrap(), len) };
    let mut lists = FreeLists::new();

    heap.put(0, 0);
    heap.set_tags(BlockPtr::new(8).unwrap(), 8, true);

    let mut blocks = Vec::new();
    let mut offset = 16;
    for &(size, allocated) in shape {
      let bp = BlockPtr::new(offset).unwrap();
      heap.set_tags(bp, size, allocated);
      blocks.push(bp);
      offset += size;
    }
    heap.put_tag(offset - 4, Tag::EPILOGUE);

    for &bp in &blocks {
      if !heap.is_allocated(bp) {
        lists.insert(&mut heap, bp);
      }
    }

    (heap, lists, blocks)
  }

  #[test]
  fn test_both_neighbours_allocated() {
    let mut words = Vec::new();
    let (mut heap, mut lists, blocks) = layout(&mut words, &[(32, true), (32, false), (32, true)]);

    let merged = coalesce(&mut heap, &mut lists, blocks[1]);

    assert_eq!(merged, blocks[1]);
    assert_eq!(heap.size(merged), 32);
    assert_eq!(lists.len(&heap), 1);
  }

  #[test]
  fn test_merge_with_next() {
    let mut words = Vec::new();
    let (mut heap, mut lists, blocks) = layout(&mut words, &[(32, true), (32, false), (48, false)]);

    let merged = coalesce(&mut heap, &mut lists, blocks[1]);

    assert_eq!(merged, blocks[1]);
    assert_eq!(heap.size(merged), 80);
    assert_eq!(heap.header(merged), heap.footer(merged));
    assert_eq!(lists.len(&heap), 1);
    assert_eq!(lists.head(6), Some(merged));
  }

  #[test]
  fn test_merge_with_prev() {
    let mut words = Vec::new();
    let (mut heap, mut lists, blocks) = layout(&mut words, &[(24, false), (40, false), (32, true)]);

    let merged = coalesce(&mut heap, &mut lists, blocks[1]);

    assert_eq!(merged, blocks[0]);
    assert_eq!(heap.size(merged), 64);
    assert!(!heap.is_allocated(merged));
    assert_eq!(lists.len(&heap), 1);
    assert_eq!(lists.head(6), Some(merged));
  }

  #[test]
  fn test_merge_all_three() {
    let mut words = Vec::new();
    let (mut heap, mut lists, blocks) =
      layout(&mut words, &[(16, false), (24, false), (40, false), (32, true)]);

    let merged = coalesce(&mut heap, &mut lists, blocks[1]);

    assert_eq!(merged, blocks[0]);
    assert_eq!(heap.size(merged), 80);
    assert_eq!(heap.footer(merged), Tag::pack(80, false));
    assert_eq!(heap.next_block(merged), blocks[3]);
    assert_eq!(lists.len(&heap), 1);
  }

  #[test]
  fn test_sentinels_stop_merging() {
    let mut words = Vec::new();
    let (mut heap, mut lists, blocks) = layout(&mut words, &[(64, false)]);

    let merged = coalesce(&mut heap, &mut lists, blocks[0]);

    assert_eq!(merged, blocks[0]);
    assert_eq!(heap.size(merged), 64);
  }
}
