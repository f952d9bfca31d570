//! Bounded stack of spare blocks in front of a [`MemoryPool`].
//!
//! A bucket serves one block size. Returned blocks are pushed onto a small
//! cache and handed out again first; once the cache is full they go back to
//! the memory pool behind it. The pool itself is created on the first miss,
//! so a bucket that is never rented from allocates nothing but its cache.

use std::alloc::Layout;
use std::fmt;
use std::ptr::NonNull;

use crate::alloc::RawBuffer;
use crate::error::PoolError;
use crate::memory_pool::{MemoryPool, PoolSpec};

/// Cache of fixed-size blocks over a lazily created [`MemoryPool`].
///
/// # Example
///
/// ```
/// use std::alloc::Layout;
/// use native_pool::MemoryBucket;
///
/// let mut bucket = MemoryBucket::new(2, Layout::new::<[u64; 4]>()).unwrap();
/// let a = bucket.rent();
/// unsafe { bucket.return_block(a) };
/// assert_eq!(bucket.len(), 1);
///
/// // cached blocks are reused first
/// assert_eq!(bucket.rent(), a);
/// unsafe { bucket.return_block(a) };
/// ```
pub struct MemoryBucket {
    cache: RawBuffer<NonNull<u8>>,
    cached: usize,
    block_len: usize,
    spec: PoolSpec,
    pool: Option<MemoryPool>,
}

// SAFETY: the bucket exclusively owns its cached blocks and pool
unsafe impl Send for MemoryBucket {}

impl MemoryBucket {
    /// Creates a bucket caching up to `size` blocks of `block`'s size and
    /// alignment. The pool behind it carves `size` blocks per slab.
    ///
    /// # Errors
    ///
    /// [`PoolError::InvalidArgument`] if `size` is zero or the slab size
    /// overflows.
    pub fn new(size: usize, block: Layout) -> Result<Self, PoolError> {
        Self::with_blocks_per_slab(size, size, block)
    }

    /// Like [`new`](Self::new) with an explicit slab size for the pool.
    ///
    /// Buckets of large blocks usually want one block per slab, so that a
    /// miss allocates exactly one block and an overflowing return frees it.
    pub fn with_blocks_per_slab(
        size: usize,
        blocks_per_slab: usize,
        block: Layout,
    ) -> Result<Self, PoolError> {
        if size == 0 {
            return Err(PoolError::invalid("size", size, "must be positive"));
        }
        let spec = MemoryPool::builder()
            .blocks_per_slab(blocks_per_slab)
            .block_len(block.size())
            .align(block.align())
            .max_free_slabs(0)
            .spec()?;
        Ok(Self {
            cache: RawBuffer::with_capacity(size),
            cached: 0,
            block_len: block.size(),
            spec,
            pool: None,
        })
    }

    /// Most blocks the cache holds.
    #[inline]
    pub fn size(&self) -> usize {
        self.cache.capacity()
    }

    /// Bytes per block.
    #[inline]
    pub fn block_len(&self) -> usize {
        self.block_len
    }

    /// Blocks currently cached.
    #[inline]
    pub fn len(&self) -> usize {
        self.cached
    }

    /// Returns `true` if no block is cached.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.cached == 0
    }

    /// Returns `true` if the next return goes to the memory pool.
    #[inline]
    pub fn is_full(&self) -> bool {
        self.cached == self.cache.capacity()
    }

    /// Rents a block, from the cache if one is there.
    #[inline]
    pub fn rent(&mut self) -> NonNull<u8> {
        if self.cached > 0 {
            self.cached -= 1;
            // SAFETY: slots below `cached` hold cached blocks
            return unsafe { self.cache.slot(self.cached).read() };
        }
        let spec = &self.spec;
        self.pool
            .get_or_insert_with(|| MemoryPool::with_spec(spec.clone()))
            .rent()
    }

    /// Returns a block.
    ///
    /// # Safety
    ///
    /// `block` was rented from this bucket and not returned since.
    #[inline]
    pub unsafe fn return_block(&mut self, block: NonNull<u8>) {
        if self.cached < self.cache.capacity() {
            // SAFETY: cached < capacity
            unsafe { self.cache.slot(self.cached).write(block) };
            self.cached += 1;
        } else if let Some(pool) = self.pool.as_mut() {
            // SAFETY: every block not taken from the cache was carved from
            // this pool
            unsafe { pool.return_block(block) };
        }
    }
}

impl fmt::Debug for MemoryBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryBucket")
            .field("size", &self.size())
            .field("cached", &self.cached)
            .field("block_len", &self.block_len)
            .field("pool", &self.pool)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_cache() {
        assert!(matches!(
            MemoryBucket::new(0, Layout::new::<u64>()),
            Err(PoolError::InvalidArgument { name: "size", .. })
        ));
        assert!(MemoryBucket::with_blocks_per_slab(1, 0, Layout::new::<u64>()).is_err());
    }

    #[test]
    fn pool_created_on_first_miss() {
        let mut bucket = MemoryBucket::new(4, Layout::new::<[u32; 8]>()).unwrap();
        assert!(bucket.pool.is_none());
        assert_eq!(bucket.block_len(), 32);

        let block = bucket.rent();
        assert_eq!(block.as_ptr() as usize % 4, 0);
        assert!(bucket.pool.is_some());
        unsafe { bucket.return_block(block) };
        assert_eq!(bucket.len(), 1);
        assert!(!bucket.is_full());
    }

    #[test]
    fn overflowing_returns_go_to_the_pool() {
        let mut bucket = MemoryBucket::with_blocks_per_slab(2, 1, Layout::new::<u64>()).unwrap();
        let blocks: Vec<_> = (0..4).map(|_| bucket.rent()).collect();
        assert_eq!(bucket.pool.as_ref().map(MemoryPool::slabs), Some(4));

        for block in &blocks {
            unsafe { bucket.return_block(*block) };
        }
        assert!(bucket.is_full());
        // past the cache, the inactive slab is released and the active one
        // stays in the ring
        assert_eq!(bucket.pool.as_ref().map(MemoryPool::slabs), Some(3));

        // LIFO: the last cached block comes out first
        assert_eq!(bucket.rent(), blocks[1]);
        assert_eq!(bucket.rent(), blocks[0]);
        assert!(bucket.is_empty());
    }
}
