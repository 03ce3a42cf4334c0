use crate::block::{BlockPtr, Heap};

/// Number of size classes. The last one takes every block of 2^19 bytes or more.
pub const MAX_LIST: usize = 20;

/// Size class of a block: `floor(log2(size))`, capped at the catch-all class.
#[inline]
pub fn bucket_of(size: usize) -> usize {
  size.checked_ilog2().map_or(0, |log| log as usize).min(MAX_LIST - 1)
}

/// Segregated free lists.
///
/// ```text
///   heads   0    1   ...   4      5      6    ...   19
///         ┌────┬────┬───┬──────┬──────┬──────┬───┬──────┐
///         │    │    │   │  ●   │      │  ●   │   │  ●   │
///         └────┴────┴───┴──┼───┴──────┴──┼───┴───┴──┼───┘
///                          ▼             ▼          ▼
///                        [16]          [64]     [4096 ...]
///                          ▼             ▼
///                        [24]          [112]
/// ```
///
/// Each bucket is a doubly linked list threaded through the payloads of its
/// free blocks, kept in ascending size order.
#[derive(Debug, Clone, Default)]
pub struct FreeLists {
  heads: [Option<BlockPtr>; MAX_LIST],
}

impl FreeLists {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn clear(&mut self) {
    self.heads = [None; MAX_LIST];
  }

  #[inline]
  pub fn head(
    &self,
    bucket: usize,
  ) -> Option<BlockPtr> {
    self.heads[bucket]
  }

  /// Links a free block into its bucket, before the first entry that is at
  /// least as large. The block's header must already carry its size.
  pub fn insert(
    &mut self,
    heap: &mut Heap,
    bp: BlockPtr,
  ) {
    let size = heap.size(bp);
    let bucket = bucket_of(size);

    let mut prev = None;
    let mut cur = self.heads[bucket];

    while let Some(candidate) = cur {
      if heap.size(candidate) >= size {
        break;
      }
      prev = cur;
      cur = heap.next_free(candidate);
    }

    heap.set_prev_free(bp, prev);
    heap.set_next_free(bp, cur);

    if let Some(next) = cur {
      heap.set_prev_free(next, Some(bp));
    }

    match prev {
      Some(prev) => heap.set_next_free(prev, Some(bp)),
      None => self.heads[bucket] = Some(bp),
    }
  }

  /// Unlinks a free block. Its header must still carry the size it was
  /// inserted with.
  pub fn remove(
    &mut self,
    heap: &mut Heap,
    bp: BlockPtr,
  ) {
    let prev = heap.prev_free(bp);
    let next = heap.next_free(bp);

    match prev {
      Some(prev) => heap.set_next_free(prev, next),
      None => self.heads[bucket_of(heap.size(bp))] = next,
    }

    if let Some(next) = next {
      heap.set_prev_free(next, prev);
    }
  }

  /// First block of at least `size` bytes, searching from the size class of
  /// `size` upward. Within a bucket this is the smallest sufficient block.
  pub fn find_fit(
    &self,
    heap: &Heap,
    size: usize,
  ) -> Option<BlockPtr> {
    (bucket_of(size)..MAX_LIST).find_map(|bucket| {
      self
        .iter(heap, bucket)
        .find(|&bp| heap.size(bp) >= size)
    })
  }

  pub fn iter<'a>(
    &self,
    heap: &'a Heap,
    bucket: usize,
  ) -> Iter<'a> {
    Iter {
      heap,
      cursor: self.head(bucket),
    }
  }

  /// Total number of linked blocks.
  #[cfg(test)]
  pub fn len(
    &self,
    heap: &Heap,
  ) -> usize {
    (0..MAX_LIST).map(|bucket| self.iter(heap, bucket).count()).sum()
  }
}

pub struct Iter<'a> {
  heap: &'a Heap,
  cursor: Option<BlockPtr>,
}

impl Iterator for Iter<'_> {
  type Item = BlockPtr;

  fn next(&mut self) -> Option<BlockPtr> {
    let bp = self.cursor?;
    self.cursor = self.heap.next_free(bp);
    Some(bp)
  }
}

#[cfg(test)]
mod tests {
  use std::ptr::NonNull;

  use super::*;

  /// A heap of `sizes` free blocks laid end to end starting at offset 16.
  fn heap_with_blocks(
    words: &mut Vec<u64>,
    sizes: &[usize],
  ) -> (Heap, Vec<BlockPtr>) {
    let total: usize = sizes.iter().sum();
    words.resize((total + 16) / 8, 0);

    let len = words.len() * 8;
    let mut heap = unsafe { Heap::new(NonNull::new(words.as_mut_ptr().cast()).unwrap(), len) };

    let mut blocks = Vec::new();
    let mut offset = 16;
    for &size in sizes {
      let bp = BlockPtr::new(offset).unwrap();
      heap.set_tags(bp, size, false);
      blocks.push(bp);
      offset += size;
    }

    (heap, blocks)
  }

  fn sizes_in(
    lists: &FreeLists,
    heap: &Heap,
    bucket: usize,
  ) -> Vec<usize> {
    lists.iter(heap, bucket).map(|bp| heap.size(bp)).collect()
  }

  #[test]
  fn test_bucket_of() {
    assert_eq!(bucket_of(0), 0);
    assert_eq!(bucket_of(1), 0);
    assert_eq!(bucket_of(16), 4);
    assert_eq!(bucket_of(24), 4);
    assert_eq!(bucket_of(32), 5);
    assert_eq!(bucket_of(4096), 12);
    assert_eq!(bucket_of(4095), 11);
    assert_eq!(bucket_of(1 << 19), MAX_LIST - 1);
    assert_eq!(bucket_of(usize::MAX), MAX_LIST - 1);
  }

  #[test]
  fn test_insert_keeps_bucket_sorted() {
    let mut words = Vec::new();
    let (mut heap, blocks) = heap_with_blocks(&mut words, &[48, 32, 56, 40, 32]);
    let mut lists = FreeLists::new();

    for &bp in &blocks {
      lists.insert(&mut heap, bp);
    }

    assert_eq!(sizes_in(&lists, &heap, 5), vec![32, 32, 40, 48, 56]);
    assert_eq!(lists.len(&heap), 5);
  }

  #[test]
  fn test_insert_equal_sizes_go_first() {
    let mut words = Vec::new();
    let (mut heap, blocks) = heap_with_blocks(&mut words, &[32, 32]);
    let mut lists = FreeLists::new();

    lists.insert(&mut heap, blocks[0]);
    lists.insert(&mut heap, blocks[1]);

    assert_eq!(lists.head(5), Some(blocks[1]));
  }

  #[test]
  fn test_remove_head_middle_tail() {
    let mut words = Vec::new();
    let (mut heap, blocks) = heap_with_blocks(&mut words, &[32, 40, 48, 56]);
    let mut lists = FreeLists::new();

    for &bp in &blocks {
      lists.insert(&mut heap, bp);
    }

    lists.remove(&mut heap, blocks[1]);
    assert_eq!(sizes_in(&lists, &heap, 5), vec![32, 48, 56]);

    lists.remove(&mut heap, blocks[0]);
    assert_eq!(lists.head(5), Some(blocks[2]));
    assert_eq!(heap.prev_free(blocks[2]), None);

    lists.remove(&mut heap, blocks[3]);
    assert_eq!(sizes_in(&lists, &heap, 5), vec![48]);

    lists.remove(&mut heap, blocks[2]);
    assert_eq!(lists.len(&heap), 0);
  }

  #[test]
  fn test_find_fit_walks_past_small_entries() {
    let mut words = Vec::new();
    let (mut heap, blocks) = heap_with_blocks(&mut words, &[32, 40, 48]);
    let mut lists = FreeLists::new();

    for &bp in &blocks {
      lists.insert(&mut heap, bp);
    }

    assert_eq!(lists.find_fit(&heap, 40), Some(blocks[1]));
    assert_eq!(lists.find_fit(&heap, 41), Some(blocks[2]));
    assert_eq!(lists.find_fit(&heap, 56), None);
  }

  #[test]
  fn test_find_fit_moves_to_larger_classes() {
    let mut words = Vec::new();
    let (mut heap, blocks) = heap_with_blocks(&mut words, &[16, 256]);
    let mut lists = FreeLists::new();

    for &bp in &blocks {
      lists.insert(&mut heap, bp);
    }

    assert_eq!(lists.find_fit(&heap, 16), Some(blocks[0]));
    assert_eq!(lists.find_fit(&heap, 24), Some(blocks[1]));
    assert_eq!(lists.find_fit(&heap, 264), None);
  }
}
