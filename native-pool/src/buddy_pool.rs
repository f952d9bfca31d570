//! Buddy allocator over one contiguous region.
//!
//! The region is `max_block_len` bytes. Blocks are powers of two between
//! `min_block_len` and `max_block_len`, laid out as a complete binary tree:
//! the root is the whole region, and the two children of a node are its
//! halves. Node `i` at depth `d` covers offset `(i - (2^d - 1)) * (max >> d)`.
//!
//! ```text
//!  depth 0            [ 0 ........................ ]
//!  depth 1      [ 1 ............ ][ 2 ............ ]
//!  depth 2   [ 3 ...][ 4 ...][ 5 ...][ 6 ...]
//! ```
//!
//! Every node is free, split or allocated. Renting walks down from the root,
//! splitting free nodes until one of the requested depth is reached; returning
//! frees the node and merges it with its buddy for as long as the buddy is
//! free too. Nodes below a free or allocated node are always free.

use std::alloc::Layout;
use std::fmt;
use std::ptr::NonNull;

use crate::alloc::RawAllocator;
use crate::error::PoolError;

/// Deepest tree the pool builds, i.e. `max_block_len / min_block_len` is at
/// most `2^MAX_DEPTH`.
const MAX_DEPTH: u32 = 24;

/// Alignment cap for the region.
const MAX_ALIGN: usize = 4096;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
enum BlockState {
    Free,
    Split,
    Allocated,
}

/// Power-of-two block allocator with splitting and buddy merging.
///
/// Rented blocks are aligned to `min_block_len` (capped at 4096) and their
/// contents are unspecified.
///
/// # Example
///
/// ```
/// use native_pool::{BuddyMemoryPool, PoolError};
///
/// let mut pool = BuddyMemoryPool::new(16, 64).unwrap();
/// let small = pool.rent(10).unwrap();
/// let half = pool.rent(32).unwrap();
/// assert_eq!(pool.allocated(), 48);
///
/// pool.return_block(small, 10).unwrap();
/// assert_eq!(pool.return_block(small, 10), Err(PoolError::BufferNotFromPool));
///
/// pool.return_block(half, 32).unwrap();
/// let whole = pool.rent(64).unwrap();
/// pool.return_block(whole, 64).unwrap();
/// ```
pub struct BuddyMemoryPool {
    memory: NonNull<u8>,
    layout: Layout,
    min_block_len: usize,
    depth: u32,
    states: Box<[BlockState]>,
    allocated: usize,
}

// SAFETY: the pool exclusively owns its region; blocks carry no thread affinity
unsafe impl Send for BuddyMemoryPool {}

impl BuddyMemoryPool {
    /// Creates a pool over one `max_block_len`-byte region, splitting down
    /// to `min_block_len`.
    ///
    /// # Errors
    ///
    /// [`PoolError::InvalidArgument`] unless both lengths are powers of two
    /// with `min_block_len <= max_block_len` and a ratio of at most `2^24`.
    pub fn new(min_block_len: usize, max_block_len: usize) -> Result<Self, PoolError> {
        if !min_block_len.is_power_of_two() {
            return Err(PoolError::invalid(
                "min_block_len",
                min_block_len,
                "must be a positive power of two",
            ));
        }
        if !max_block_len.is_power_of_two() {
            return Err(PoolError::invalid(
                "max_block_len",
                max_block_len,
                "must be a positive power of two",
            ));
        }
        if min_block_len > max_block_len {
            return Err(PoolError::invalid(
                "min_block_len",
                min_block_len,
                "cannot be greater than max_block_len",
            ));
        }
        let depth = (max_block_len / min_block_len).trailing_zeros();
        if depth > MAX_DEPTH {
            return Err(PoolError::invalid(
                "max_block_len",
                max_block_len,
                "splits into more than 2^24 minimum blocks",
            ));
        }
        let layout = Layout::from_size_align(max_block_len, min_block_len.min(MAX_ALIGN))
            .map_err(|_| PoolError::invalid("max_block_len", max_block_len, "region size overflows"))?;

        let nodes = (1usize << (depth + 1)) - 1;
        log::debug!(
            "buddy pool: allocating {max_block_len} byte region, {} levels",
            depth + 1
        );
        Ok(Self {
            memory: RawAllocator::alloc(layout),
            layout,
            min_block_len,
            depth,
            states: vec![BlockState::Free; nodes].into_boxed_slice(),
            allocated: 0,
        })
    }

    /// Smallest block handed out.
    #[inline]
    pub fn min_block_len(&self) -> usize {
        self.min_block_len
    }

    /// Size of the whole region, and of the largest block.
    #[inline]
    pub fn max_block_len(&self) -> usize {
        self.layout.size()
    }

    /// Bytes currently rented, counted in whole blocks.
    #[inline]
    pub fn allocated(&self) -> usize {
        self.allocated
    }

    /// Returns `true` if no block is rented.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.allocated == 0
    }

    /// Block size a request of `len` bytes is served with.
    #[inline]
    pub fn block_len(&self, len: usize) -> usize {
        len.max(self.min_block_len).next_power_of_two()
    }

    /// Tree depth of the blocks serving `len` bytes.
    fn depth_of(&self, len: usize) -> Result<u32, PoolError> {
        if len == 0 {
            return Err(PoolError::invalid("len", len, "must be positive"));
        }
        if len > self.max_block_len() {
            return Err(PoolError::LengthExceeded {
                requested: len,
                max: self.max_block_len(),
            });
        }
        let order = (self.block_len(len) / self.min_block_len).trailing_zeros();
        Ok(self.depth - order)
    }

    /// Rents a block of at least `len` bytes.
    ///
    /// # Errors
    ///
    /// [`PoolError::InvalidArgument`] for a zero length,
    /// [`PoolError::LengthExceeded`] past `max_block_len`, and
    /// [`PoolError::Exhausted`] when no free block is left that large.
    pub fn rent(&mut self, len: usize) -> Result<NonNull<u8>, PoolError> {
        let depth = self.depth_of(len)?;
        let node = self
            .find_free(depth)
            .ok_or(PoolError::Exhausted { requested: len })?;
        self.states[node] = BlockState::Allocated;

        let block_len = self.max_block_len() >> depth;
        self.allocated += block_len;
        let offset = (node + 1 - (1 << depth)) * block_len;
        // SAFETY: offset + block_len <= region size
        Ok(unsafe { self.memory.add(offset) })
    }

    /// [`rent`](Self::rent), or `None` on any failure.
    #[inline]
    pub fn try_rent(&mut self, len: usize) -> Option<NonNull<u8>> {
        self.rent(len).ok()
    }

    /// Returns a block rented with the same `len`, merging it with free
    /// buddies.
    ///
    /// # Errors
    ///
    /// [`PoolError::BufferNotFromPool`] if `block` is not a rented block of
    /// that size, including a block returned twice. The pool is unchanged.
    pub fn return_block(&mut self, block: NonNull<u8>, len: usize) -> Result<(), PoolError> {
        let depth = self.depth_of(len)?;
        let block_len = self.max_block_len() >> depth;
        let offset = (block.as_ptr() as usize).wrapping_sub(self.memory.as_ptr() as usize);
        if offset >= self.max_block_len() || offset % block_len != 0 {
            return Err(PoolError::BufferNotFromPool);
        }
        let mut node = (1 << depth) - 1 + offset / block_len;
        if self.states[node] != BlockState::Allocated {
            return Err(PoolError::BufferNotFromPool);
        }

        self.states[node] = BlockState::Free;
        self.allocated -= block_len;
        while node != 0 {
            let buddy = if node % 2 == 1 { node + 1 } else { node - 1 };
            if self.states[buddy] != BlockState::Free {
                break;
            }
            node = (node - 1) / 2;
            self.states[node] = BlockState::Free;
        }
        Ok(())
    }

    /// Marks every block free. Blocks still held by callers must not be used
    /// afterwards.
    pub fn reset(&mut self) {
        self.states.fill(BlockState::Free);
        self.allocated = 0;
    }

    /// Leftmost free node at `target` depth, splitting free ancestors on the
    /// way down.
    fn find_free(&mut self, target: u32) -> Option<usize> {
        let mut node = 0;
        let mut depth = 0;
        loop {
            match self.states[node] {
                BlockState::Free if depth == target => return Some(node),
                BlockState::Free => {
                    log::trace!("buddy pool: splitting {} byte block", self.max_block_len() >> depth);
                    self.states[node] = BlockState::Split;
                    node = 2 * node + 1;
                    depth += 1;
                    continue;
                }
                BlockState::Split if depth < target => {
                    node = 2 * node + 1;
                    depth += 1;
                    continue;
                }
                _ => {}
            }
            // Dead end: move to the next right sibling up the path.
            loop {
                if node == 0 {
                    return None;
                }
                if node % 2 == 1 {
                    node += 1;
                    break;
                }
                node = (node - 1) / 2;
                depth -= 1;
            }
        }
    }
}

impl Drop for BuddyMemoryPool {
    fn drop(&mut self) {
        // SAFETY: allocated in `new` with this layout
        unsafe { RawAllocator::free(self.memory, self.layout) };
    }
}

impl fmt::Debug for BuddyMemoryPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuddyMemoryPool")
            .field("min_block_len", &self.min_block_len)
            .field("max_block_len", &self.max_block_len())
            .field("allocated", &self.allocated)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offset(pool: &BuddyMemoryPool, block: NonNull<u8>) -> usize {
        block.as_ptr() as usize - pool.memory.as_ptr() as usize
    }

    #[test]
    fn validates_block_lengths() {
        assert!(BuddyMemoryPool::new(0, 64).is_err());
        assert!(BuddyMemoryPool::new(16, 48).is_err());
        assert!(BuddyMemoryPool::new(24, 64).is_err());
        assert!(matches!(
            BuddyMemoryPool::new(128, 64),
            Err(PoolError::InvalidArgument { name: "min_block_len", .. })
        ));
        assert!(BuddyMemoryPool::new(1, 1 << 25).is_err());

        let pool = BuddyMemoryPool::new(64, 64).unwrap();
        assert_eq!(pool.min_block_len(), 64);
        assert_eq!(pool.max_block_len(), 64);
    }

    #[test]
    fn splits_down_to_the_requested_size() {
        let mut pool = BuddyMemoryPool::new(16, 128).unwrap();
        let a = pool.rent(16).unwrap();
        let b = pool.rent(1).unwrap();
        let c = pool.rent(17).unwrap();
        let d = pool.rent(64).unwrap();

        assert_eq!(offset(&pool, a), 0);
        assert_eq!(offset(&pool, b), 16);
        assert_eq!(offset(&pool, c), 32);
        assert_eq!(offset(&pool, d), 64);
        assert_eq!(pool.allocated(), 128);
        assert_eq!(pool.block_len(17), 32);
        assert_eq!(a.as_ptr() as usize % 16, 0);

        assert_eq!(pool.rent(16), Err(PoolError::Exhausted { requested: 16 }));
        assert!(pool.try_rent(1).is_none());
        assert_eq!(
            pool.rent(129),
            Err(PoolError::LengthExceeded {
                requested: 129,
                max: 128
            })
        );
        assert!(matches!(pool.rent(0), Err(PoolError::InvalidArgument { name: "len", .. })));
    }

    #[test]
    fn returned_buddies_merge() {
        let mut pool = BuddyMemoryPool::new(16, 128).unwrap();
        let a = pool.rent(16).unwrap();
        let b = pool.rent(16).unwrap();
        let c = pool.rent(32).unwrap();

        // only one of the pair is free, so no 32-byte block at offset 0
        pool.return_block(a, 16).unwrap();
        let e = pool.rent(32).unwrap();
        assert_eq!(offset(&pool, e), 64);
        assert!(pool.rent(128).is_err());

        // a's buddy comes back: the pair merges, then merges no further
        // while c is out
        pool.return_block(b, 16).unwrap();
        let f = pool.rent(32).unwrap();
        assert_eq!(offset(&pool, f), 0);

        for (block, len) in [(c, 32), (e, 32), (f, 32)] {
            pool.return_block(block, len).unwrap();
        }
        assert!(pool.is_empty());
        assert_eq!(pool.states[0], BlockState::Free);
        let whole = pool.rent(128).unwrap();
        assert_eq!(offset(&pool, whole), 0);
    }

    #[test]
    fn double_return_is_rejected() {
        let mut pool = BuddyMemoryPool::new(16, 64).unwrap();
        let a = pool.rent(16).unwrap();
        let b = pool.rent(16).unwrap();

        pool.return_block(a, 16).unwrap();
        assert_eq!(pool.return_block(a, 16), Err(PoolError::BufferNotFromPool));
        assert_eq!(pool.allocated(), 16);

        // wrong size, misaligned and foreign pointers
        assert_eq!(pool.return_block(b, 32), Err(PoolError::BufferNotFromPool));
        let inside = unsafe { b.add(1) };
        assert_eq!(pool.return_block(inside, 16), Err(PoolError::BufferNotFromPool));
        let mut other = 0u64;
        let foreign = NonNull::from(&mut other).cast::<u8>();
        assert_eq!(pool.return_block(foreign, 16), Err(PoolError::BufferNotFromPool));

        pool.return_block(b, 16).unwrap();
        assert!(pool.is_empty());
        assert_eq!(pool.return_block(b, 16), Err(PoolError::BufferNotFromPool));
        assert!(pool.states.iter().all(|s| *s == BlockState::Free));
    }

    #[test]
    fn reset_frees_everything() {
        let mut pool = BuddyMemoryPool::new(8, 64).unwrap();
        while pool.try_rent(8).is_some() {}
        assert_eq!(pool.allocated(), 64);
        pool.reset();
        assert!(pool.is_empty());
        assert!(pool.rent(64).is_ok());
    }

    #[test]
    fn blocks_are_writable() {
        let mut pool = BuddyMemoryPool::new(32, 256).unwrap();
        let blocks: Vec<_> = (0..8).map(|_| pool.rent(32).unwrap()).collect();
        for (i, block) in blocks.iter().enumerate() {
            unsafe { block.as_ptr().write_bytes(i as u8, 32) };
        }
        for (i, block) in blocks.iter().enumerate() {
            let bytes = unsafe { std::slice::from_raw_parts(block.as_ptr(), 32) };
            assert!(bytes.iter().all(|b| *b == i as u8));
        }
        for block in blocks {
            pool.return_block(block, 32).unwrap();
        }
        assert_eq!(pool.states[0], BlockState::Free);
    }
}
