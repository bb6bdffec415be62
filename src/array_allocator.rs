//! Concurrent allocator for small arrays.
//!
//! A request of length `k` is rounded up to the next power of two and served
//! from a lock-free free list dedicated to that size, so there are only
//! `log2(MAX_ARRAY_LENGTH) + 1` size classes. Recycled arrays keep whatever the
//! previous owner left in them; callers initialize what they use.

use crossbeam::queue::SegQueue;

use crate::error::{Error, Result};

/// Largest array length served. Skip list heights are capped at this value.
pub const MAX_ARRAY_LENGTH: usize = 32;
const NUM_SIZE_CLASSES: usize = MAX_ARRAY_LENGTH.trailing_zeros() as usize + 1;

fn size_class(len: usize) -> usize {
    len.max(1).next_power_of_two().trailing_zeros() as usize
}

pub struct ArrayAllocator<T> {
    pools: [SegQueue<Box<[T]>>; NUM_SIZE_CLASSES],
}

impl<T> std::fmt::Debug for ArrayAllocator<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let free: Vec<usize> = self.pools.iter().map(SegQueue::len).collect();
        f.debug_struct("ArrayAllocator").field("free", &free).finish()
    }
}

impl<T: Default> Default for ArrayAllocator<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Default> ArrayAllocator<T> {
    pub fn new() -> Self {
        Self {
            pools: std::array::from_fn(|_| SegQueue::new()),
        }
    }

    /// Array of at least `len` items. Its length is the size class of `len`.
    /// May be called concurrently with other `allocate` and `free` calls.
    pub fn allocate(&self, len: usize) -> Result<Box<[T]>> {
        if len > MAX_ARRAY_LENGTH {
            return Err(Error::ArrayTooLong {
                len,
                max: MAX_ARRAY_LENGTH,
            });
        }
        let class = size_class(len);
        Ok(self.pools[class].pop().unwrap_or_else(|| {
            log::trace!("size class {class} empty, allocating fresh array");
            (0..1usize << class).map(|_| T::default()).collect()
        }))
    }

    /// Returns an array obtained from `allocate` to its size class.
    pub fn free(&self, arr: Box<[T]>) {
        let class = size_class(arr.len());
        debug_assert_eq!(arr.len(), 1 << class, "array not from this allocator");
        if arr.len() == 1 << class && class < NUM_SIZE_CLASSES {
            self.pools[class].push(arr);
        }
    }

    /// Number of arrays waiting in the free list of `len`'s size class.
    pub fn pooled(&self, len: usize) -> usize {
        self.pools
            .get(size_class(len))
            .map_or(0, SegQueue::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rayon::prelude::*;

    #[test]
    fn rounds_up_to_power_of_two() {
        let a = ArrayAllocator::<u32>::new();
        assert_eq!(a.allocate(0).unwrap().len(), 1);
        assert_eq!(a.allocate(1).unwrap().len(), 1);
        assert_eq!(a.allocate(3).unwrap().len(), 4);
        assert_eq!(a.allocate(17).unwrap().len(), 32);
        assert_eq!(a.allocate(32).unwrap().len(), 32);
    }

    #[test]
    fn rejects_oversized() {
        let a = ArrayAllocator::<u32>::new();
        assert_eq!(
            a.allocate(33),
            Err(Error::ArrayTooLong { len: 33, max: 32 })
        );
    }

    #[test]
    fn reuses_freed_arrays() {
        let a = ArrayAllocator::<u32>::new();
        let mut arr = a.allocate(5).unwrap();
        arr[0] = 77;
        a.free(arr);
        assert_eq!(a.pooled(8), 1);
        assert_eq!(a.pooled(4), 0);
        let again = a.allocate(6).unwrap();
        // Not reinitialized.
        assert_eq!(again[0], 77);
        assert_eq!(a.pooled(8), 0);
    }

    #[test]
    fn concurrent_allocate_and_free() {
        let a = ArrayAllocator::<u64>::new();
        (0..1000usize).into_par_iter().for_each(|i| {
            let len = i % 32 + 1;
            let arr = a.allocate(len).unwrap();
            assert!(arr.len() >= len);
            a.free(arr);
        });
        let total: usize = [1, 2, 4, 8, 16, 32].iter().map(|&l| a.pooled(l)).sum();
        assert!(total > 0 && total <= 1000);
    }
}
