use tracing::warn;

use crate::{
  align::{ALIGNMENT, DSIZE, MIN_BLOCK_SIZE, WSIZE},
  allocator::SegAllocator,
  block::{Heap, Tag},
  error::Inconsistency,
  free_list::{MAX_LIST, bucket_of},
  memlib::HeapSource,
};

/// Snapshot of how the heap is used.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapStats {
  /// Bytes managed, from the pad word to the epilogue.
  pub heap_size: usize,
  pub free_bytes: usize,
  pub free_blocks: usize,
  pub allocated_blocks: usize,
  pub largest_free: usize,
}

impl<S: HeapSource> SegAllocator<S> {
  /// Walks the whole heap and every free list, verifying that
  ///
  /// - every block's header matches its footer and its payload is aligned,
  /// - no block runs past the epilogue, which sits right at the break,
  /// - no two physically adjacent blocks are both free,
  /// - every free-list member is free, sorted and in the bucket of its size,
  /// - the heap and the free lists agree on the number of free blocks.
  ///
  /// Linear in the heap size; meant for tests and debugging.
  pub fn check(&self) -> Result<(), Inconsistency> {
    let heap = self.heap();
    let heap_free = check_blocks(heap)?;
    let list_free = self.check_lists(heap_free)?;

    if heap_free != list_free {
      return Err(Inconsistency::FreeCountMismatch {
        heap: heap_free,
        lists: list_free,
      });
    }

    Ok(())
  }

  pub fn is_consistent(&self) -> bool {
    match self.check() {
      Ok(()) => true,
      Err(err) => {
        warn!(target: "segalloc", %err, "heap check failed");
        false
      }
    }
  }

  fn check_lists(
    &self,
    heap_free: usize,
  ) -> Result<usize, Inconsistency> {
    let heap = self.heap();
    let mut count = 0;

    for bucket in 0..MAX_LIST {
      let mut prev = None;
      let mut prev_size = 0;

      for bp in self.lists().iter(heap, bucket) {
        count += 1;
        // A cycle would never end; stop once we've seen more than can exist.
        if count > heap_free {
          return Err(Inconsistency::FreeCountMismatch {
            heap: heap_free,
            lists: count,
          });
        }

        let tag = heap.header(bp);
        if tag.is_allocated() {
          return Err(Inconsistency::AllocatedInFreeList(bp.offset()));
        }

        if bucket_of(tag.size()) != bucket {
          return Err(Inconsistency::WrongBucket {
            offset: bp.offset(),
            size: tag.size(),
            bucket,
          });
        }

        if tag.size() < prev_size {
          return Err(Inconsistency::Unsorted(bucket));
        }

        if heap.prev_free(bp) != prev {
          return Err(Inconsistency::BrokenLink(bp.offset()));
        }

        prev = Some(bp);
        prev_size = tag.size();
      }
    }

    Ok(count)
  }

  pub fn stats(&self) -> HeapStats {
    let heap = self.heap();
    let mut stats = HeapStats {
      heap_size: heap.len(),
      ..HeapStats::default()
    };

    // Skip the prologue.
    for bp in heap.blocks().skip(1) {
      let tag = heap.header(bp);
      if tag.is_allocated() {
        stats.allocated_blocks += 1;
      } else {
        stats.free_blocks += 1;
        stats.free_bytes += tag.size();
        stats.largest_free = stats.largest_free.max(tag.size());
      }
    }

    stats
  }
}

/// Scans the heap front to back and returns the number of free blocks.
fn check_blocks(heap: &Heap) -> Result<usize, Inconsistency> {
  if heap.tag_at(WSIZE) != Tag::pack(DSIZE, true) || heap.tag_at(2 * WSIZE) != Tag::pack(DSIZE, true) {
    return Err(Inconsistency::BadPrologue);
  }

  if heap.base().as_ptr() as usize % ALIGNMENT != 0 {
    return Err(Inconsistency::Misaligned(0));
  }

  let mut free = 0;
  let mut prev_free: Option<usize> = None;
  let mut end = 2 * DSIZE;

  for bp in heap.blocks().skip(1) {
    let offset = bp.offset();
    let tag = heap.header(bp);

    if offset % ALIGNMENT != 0 {
      return Err(Inconsistency::Misaligned(offset));
    }

    if tag.size() < MIN_BLOCK_SIZE || tag.size() % ALIGNMENT != 0 {
      return Err(Inconsistency::BadSize {
        offset,
        size: tag.size(),
      });
    }

    if offset + tag.size() > heap.len() {
      return Err(Inconsistency::Overlap(offset));
    }

    if heap.footer(bp) != tag {
      return Err(Inconsistency::TagMismatch(offset));
    }

    if tag.is_allocated() {
      prev_free = None;
    } else {
      if let Some(prev) = prev_free {
        return Err(Inconsistency::Uncoalesced(prev, offset));
      }
      prev_free = Some(offset);
      free += 1;
    }

    end = offset + tag.size();
  }

  if end != heap.len() || heap.tag_at(end - WSIZE) != Tag::EPILOGUE {
    return Err(Inconsistency::BadEpilogue {
      expected: heap.len(),
      found: end,
    });
  }

  Ok(free)
}
