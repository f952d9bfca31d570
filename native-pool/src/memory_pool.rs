//! Fixed-size block allocator carved from slabs.
//!
//! Each slab holds `blocks_per_slab` nodes. A node is a header followed by
//! the caller's block. While a node is free its header links to the next
//! free node of the same slab; once rented the header records the owning
//! slab, which is how [`MemoryPool::return_block`] finds its way back without
//! any lookup.
//!
//! Slabs in use form a circular doubly-linked ring with one *active* slab that
//! serves rents. A slab that becomes fully free while not active leaves the
//! ring and is either cached for reuse (up to `max_free_slabs`) or released.
//!
//! ```text
//!         +--------+    +--------+    +--------+
//!  ... <->| slab A |<-->| slab B |<-->| slab C |<-> ... (ring)
//!         +--------+    +--------+    +--------+
//!              ^ active
//!
//!  free slabs: D -> E -> null   (singly linked through `next`)
//! ```

use std::alloc::Layout;
use std::marker::PhantomData;
use std::mem;
use std::ptr::{self, NonNull};

use crate::alloc::RawAllocator;
use crate::error::PoolError;

// =============================================================================
// Layout
// =============================================================================

#[repr(C)]
struct Slab {
    next: *mut Slab,
    prev: *mut Slab,
    free: *mut Node,
    count: usize,
}

/// Node header. `next` while free, `slab` while rented.
#[repr(C)]
union Node {
    next: *mut Node,
    slab: *mut Slab,
}

const fn round_up(n: usize, align: usize) -> usize {
    (n + align - 1) & !(align - 1)
}

// =============================================================================
// Builder
// =============================================================================

/// Builder for [`MemoryPool`].
///
/// # Example
///
/// ```
/// use native_pool::MemoryPool;
///
/// let mut pool = MemoryPool::builder()
///     .blocks_per_slab(64)
///     .block_len(48)
///     .align(16)
///     .max_free_slabs(2)
///     .build()
///     .unwrap();
///
/// let block = pool.rent();
/// assert_eq!(block.as_ptr() as usize % 16, 0);
/// unsafe { pool.return_block(block) };
/// ```
#[derive(Clone, Debug)]
pub struct MemoryPoolBuilder {
    blocks_per_slab: usize,
    block_len: usize,
    align: usize,
    max_free_slabs: usize,
}

impl Default for MemoryPoolBuilder {
    fn default() -> Self {
        Self {
            blocks_per_slab: 64,
            block_len: 0,
            align: mem::align_of::<*mut u8>(),
            max_free_slabs: 1,
        }
    }
}

impl MemoryPoolBuilder {
    /// Blocks carved from each slab. Must be non-zero. Default: 64.
    pub fn blocks_per_slab(mut self, n: usize) -> Self {
        self.blocks_per_slab = n;
        self
    }

    /// Usable bytes per block. Default: 0.
    pub fn block_len(mut self, len: usize) -> Self {
        self.block_len = len;
        self
    }

    /// Minimum block alignment, a power of two. Never below pointer alignment.
    pub fn align(mut self, align: usize) -> Self {
        self.align = align;
        self
    }

    /// Fully free slabs kept for reuse instead of being released. Default: 1.
    pub fn max_free_slabs(mut self, n: usize) -> Self {
        self.max_free_slabs = n;
        self
    }

    /// Builds the pool and allocates its first slab.
    pub fn build(self) -> Result<MemoryPool, PoolError> {
        Ok(MemoryPool::with_spec(self.spec()?))
    }

    /// Validates the settings and derives the slab layout without allocating.
    pub(crate) fn spec(&self) -> Result<PoolSpec, PoolError> {
        if self.blocks_per_slab == 0 {
            return Err(PoolError::invalid(
                "blocks_per_slab",
                0,
                "must be positive",
            ));
        }
        if !self.align.is_power_of_two() {
            return Err(PoolError::invalid(
                "align",
                self.align,
                "must be a power of two",
            ));
        }

        let align = self.align.max(mem::align_of::<Node>());
        let header = round_up(mem::size_of::<Node>(), align);
        let overflow = PoolError::invalid("block_len", self.block_len, "slab size overflows");
        let stride = header
            .checked_add(self.block_len)
            .filter(|n| *n <= isize::MAX as usize - align)
            .map(|n| round_up(n, align))
            .ok_or(overflow.clone())?;
        let first = round_up(mem::size_of::<Slab>(), align);
        let size = stride
            .checked_mul(self.blocks_per_slab)
            .and_then(|n| n.checked_add(first))
            .ok_or(overflow.clone())?;
        let slab_layout =
            Layout::from_size_align(size, align.max(mem::align_of::<Slab>())).map_err(|_| overflow)?;

        Ok(PoolSpec {
            blocks_per_slab: self.blocks_per_slab,
            block_len: self.block_len,
            max_free_slabs: self.max_free_slabs,
            header,
            stride,
            first,
            slab_layout,
        })
    }
}

/// Validated pool settings and the slab layout derived from them.
#[derive(Clone, Debug)]
pub(crate) struct PoolSpec {
    blocks_per_slab: usize,
    block_len: usize,
    max_free_slabs: usize,
    header: usize,
    stride: usize,
    first: usize,
    slab_layout: Layout,
}

// =============================================================================
// MemoryPool
// =============================================================================

/// Slab allocator handing out fixed-length raw blocks.
///
/// Rent and return are O(1). Memory grows one slab at a time and is bounded
/// on the way down by `max_free_slabs`.
///
/// # Example
///
/// ```
/// use native_pool::MemoryPool;
///
/// let mut pool = MemoryPool::new(8, 16, 1).unwrap();
/// let blocks: Vec<_> = (0..9).map(|_| pool.rent()).collect();
/// assert_eq!(pool.slabs(), 2);
///
/// for block in blocks {
///     unsafe { pool.return_block(block) };
/// }
/// assert_eq!(pool.slabs() + pool.free_slabs(), 2);
/// ```
pub struct MemoryPool {
    active: NonNull<Slab>,
    free_slab: *mut Slab,

    slabs: usize,
    free_slabs: usize,
    max_free_slabs: usize,

    blocks_per_slab: usize,
    block_len: usize,

    // Derived layout
    header: usize,
    stride: usize,
    first: usize,
    slab_layout: Layout,
}

// SAFETY: the pool exclusively owns its slabs; blocks carry no thread affinity
unsafe impl Send for MemoryPool {}

impl MemoryPool {
    /// Creates a pool of `blocks_per_slab` blocks of `block_len` bytes per slab.
    pub fn new(
        blocks_per_slab: usize,
        block_len: usize,
        max_free_slabs: usize,
    ) -> Result<Self, PoolError> {
        Self::builder()
            .blocks_per_slab(blocks_per_slab)
            .block_len(block_len)
            .max_free_slabs(max_free_slabs)
            .build()
    }

    /// Returns a builder with default settings.
    pub fn builder() -> MemoryPoolBuilder {
        MemoryPoolBuilder::default()
    }

    /// Creates a pool from validated settings and allocates its first slab.
    pub(crate) fn with_spec(spec: PoolSpec) -> Self {
        let mut pool = MemoryPool {
            active: NonNull::dangling(),
            free_slab: ptr::null_mut(),
            slabs: 1,
            free_slabs: 0,
            max_free_slabs: spec.max_free_slabs,
            blocks_per_slab: spec.blocks_per_slab,
            block_len: spec.block_len,
            header: spec.header,
            stride: spec.stride,
            first: spec.first,
            slab_layout: spec.slab_layout,
        };
        let slab = pool.alloc_slab();
        // SAFETY: fresh slab, sole member of the ring
        unsafe {
            (*slab).next = slab;
            (*slab).prev = slab;
            pool.active = NonNull::new_unchecked(slab);
        }
        pool
    }

    /// Slabs currently in the active ring.
    #[inline]
    pub fn slabs(&self) -> usize {
        self.slabs
    }

    /// Fully free slabs cached for reuse.
    #[inline]
    pub fn free_slabs(&self) -> usize {
        self.free_slabs
    }

    /// Cap on cached free slabs.
    #[inline]
    pub fn max_free_slabs(&self) -> usize {
        self.max_free_slabs
    }

    /// Blocks per slab.
    #[inline]
    pub fn blocks_per_slab(&self) -> usize {
        self.blocks_per_slab
    }

    /// Usable bytes per block.
    #[inline]
    pub fn block_len(&self) -> usize {
        self.block_len
    }

    /// Rents one block.
    ///
    /// The block is aligned to the pool's alignment. Its contents are zero
    /// the first time a slab is carved and whatever the last renter left
    /// afterwards.
    #[inline]
    pub fn rent(&mut self) -> NonNull<u8> {
        // SAFETY: active is always a live ring member
        unsafe {
            let mut slab = self.active.as_ptr();
            if (*slab).count == 0 {
                slab = (*slab).next;
                self.active = NonNull::new_unchecked(slab);
                if (*slab).count == 0 {
                    slab = self.next_slab();
                }
            }

            let node = (*slab).free;
            (*slab).free = (*node).next;
            (*node).slab = slab;
            (*slab).count -= 1;
            NonNull::new_unchecked((node as *mut u8).add(self.header))
        }
    }

    /// Returns a block to the pool.
    ///
    /// # Safety
    ///
    /// `block` must have been rented from this pool and not returned since.
    #[inline]
    pub unsafe fn return_block(&mut self, block: NonNull<u8>) {
        unsafe {
            let node = block.as_ptr().sub(self.header) as *mut Node;
            let slab = (*node).slab;
            (*slab).count += 1;

            if (*slab).count == self.blocks_per_slab && slab != self.active.as_ptr() {
                (*(*slab).prev).next = (*slab).next;
                (*(*slab).next).prev = (*slab).prev;
                self.slabs -= 1;

                if self.free_slabs == self.max_free_slabs {
                    log::debug!(
                        "memory pool: releasing slab ({} in use, {} cached)",
                        self.slabs,
                        self.free_slabs
                    );
                    RawAllocator::free(NonNull::new_unchecked(slab).cast(), self.slab_layout);
                } else {
                    (*node).next = (*slab).free;
                    (*slab).free = node;
                    (*slab).next = self.free_slab;
                    self.free_slab = slab;
                    self.free_slabs += 1;
                    log::trace!("memory pool: cached free slab ({} cached)", self.free_slabs);
                }
                return;
            }

            (*node).next = (*slab).free;
            (*slab).free = node;
        }
    }

    /// Releases every cached free slab.
    pub fn trim_excess(&mut self) {
        let mut slab = self.free_slab;
        while !slab.is_null() {
            // SAFETY: cached slabs are owned solely by the free list
            unsafe {
                let next = (*slab).next;
                RawAllocator::free(NonNull::new_unchecked(slab).cast(), self.slab_layout);
                slab = next;
            }
        }
        self.free_slab = ptr::null_mut();
        self.free_slabs = 0;
    }

    /// Active ring exhausted: splice in a cached or fresh slab before the
    /// active one and make it active.
    #[cold]
    unsafe fn next_slab(&mut self) -> *mut Slab {
        let slab = if self.free_slab.is_null() {
            self.alloc_slab()
        } else {
            let slab = self.free_slab;
            // SAFETY: cached slab, fully free with its node list intact
            unsafe {
                self.free_slab = (*slab).next;
            }
            self.free_slabs -= 1;
            log::trace!("memory pool: recycled cached slab ({} cached)", self.free_slabs);
            slab
        };

        // SAFETY: active and its prev are live ring members
        unsafe {
            let active = self.active.as_ptr();
            (*slab).next = active;
            (*slab).prev = (*active).prev;
            (*slab).count = self.blocks_per_slab;
            (*(*active).prev).next = slab;
            (*active).prev = slab;
            self.active = NonNull::new_unchecked(slab);
        }
        self.slabs += 1;
        slab
    }

    /// Allocates a slab and threads its free list front to back.
    fn alloc_slab(&mut self) -> *mut Slab {
        let base = RawAllocator::alloc_zeroed(self.slab_layout).as_ptr();
        log::debug!(
            "memory pool: allocating slab of {} x {} bytes",
            self.blocks_per_slab,
            self.block_len
        );
        // SAFETY: base spans slab_layout; every node lies inside it
        unsafe {
            let nodes = base.add(self.first);
            let mut next: *mut Node = ptr::null_mut();
            for i in (0..self.blocks_per_slab).rev() {
                let node = nodes.add(i * self.stride) as *mut Node;
                (*node).next = next;
                next = node;
            }

            let slab = base as *mut Slab;
            slab.write(Slab {
                next: ptr::null_mut(),
                prev: ptr::null_mut(),
                free: next,
                count: self.blocks_per_slab,
            });
            slab
        }
    }
}

impl Drop for MemoryPool {
    fn drop(&mut self) {
        let mut slab = self.active.as_ptr();
        for _ in 0..self.slabs {
            // SAFETY: the ring holds exactly `slabs` members
            unsafe {
                let next = (*slab).next;
                RawAllocator::free(NonNull::new_unchecked(slab).cast(), self.slab_layout);
                slab = next;
            }
        }
        self.trim_excess();
    }
}

impl std::fmt::Debug for MemoryPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryPool")
            .field("slabs", &self.slabs)
            .field("free_slabs", &self.free_slabs)
            .field("max_free_slabs", &self.max_free_slabs)
            .field("blocks_per_slab", &self.blocks_per_slab)
            .field("block_len", &self.block_len)
            .finish()
    }
}

// =============================================================================
// NodePool
// =============================================================================

/// Typed view over a [`MemoryPool`] sized and aligned for `T`.
///
/// Used for intrusive nodes: tree nodes, hash chain nodes, queue segments.
pub struct NodePool<T> {
    pool: MemoryPool,
    _marker: PhantomData<T>,
}

// SAFETY: values stored in the pool are owned by whoever holds their pointer
unsafe impl<T: Send> Send for NodePool<T> {}

impl<T> NodePool<T> {
    /// Creates a node pool with `blocks_per_slab` nodes per slab.
    pub fn new(blocks_per_slab: usize, max_free_slabs: usize) -> Result<Self, PoolError> {
        let pool = MemoryPool::builder()
            .blocks_per_slab(blocks_per_slab)
            .block_len(mem::size_of::<T>())
            .align(mem::align_of::<T>())
            .max_free_slabs(max_free_slabs)
            .build()?;
        Ok(Self {
            pool,
            _marker: PhantomData,
        })
    }

    /// Moves `value` into a freshly rented node.
    #[inline]
    pub fn alloc(&mut self, value: T) -> NonNull<T> {
        let ptr = self.pool.rent().cast::<T>();
        // SAFETY: block is sized and aligned for T
        unsafe { ptr.as_ptr().write(value) };
        ptr
    }

    /// Moves the value out of `ptr` and returns its node.
    ///
    /// # Safety
    ///
    /// `ptr` must come from [`alloc`](Self::alloc) on this pool and not have
    /// been taken or freed.
    #[inline]
    pub unsafe fn take(&mut self, ptr: NonNull<T>) -> T {
        unsafe {
            let value = ptr.as_ptr().read();
            self.pool.return_block(ptr.cast());
            value
        }
    }

    /// Returns the node without running `T`'s destructor.
    ///
    /// # Safety
    ///
    /// Same as [`take`](Self::take); the value is forgotten.
    #[inline]
    pub unsafe fn free(&mut self, ptr: NonNull<T>) {
        unsafe { self.pool.return_block(ptr.cast()) }
    }

    /// The underlying block pool.
    #[inline]
    pub fn pool(&self) -> &MemoryPool {
        &self.pool
    }

    /// Releases every cached free slab.
    pub fn trim_excess(&mut self) {
        self.pool.trim_excess();
    }
}

impl<T> std::fmt::Debug for NodePool<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("NodePool").field(&self.pool).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    // =========================================================================
    // Construction
    // =========================================================================

    #[test]
    fn zero_blocks_per_slab_rejected() {
        let err = MemoryPool::new(0, 16, 1).unwrap_err();
        assert!(matches!(
            err,
            PoolError::InvalidArgument {
                name: "blocks_per_slab",
                ..
            }
        ));
    }

    #[test]
    fn non_power_of_two_align_rejected() {
        let err = MemoryPool::builder().align(24).build().unwrap_err();
        assert!(matches!(err, PoolError::InvalidArgument { name: "align", .. }));
    }

    #[test]
    fn new_pool_has_one_slab() {
        let pool = MemoryPool::new(4, 32, 2).unwrap();
        assert_eq!(pool.slabs(), 1);
        assert_eq!(pool.free_slabs(), 0);
        assert_eq!(pool.max_free_slabs(), 2);
        assert_eq!(pool.blocks_per_slab(), 4);
        assert_eq!(pool.block_len(), 32);
    }

    // =========================================================================
    // Rent / Return
    // =========================================================================

    #[test]
    fn blocks_are_distinct_and_writable() {
        let mut pool = MemoryPool::new(4, 16, 0).unwrap();
        let blocks: Vec<_> = (0..10).map(|_| pool.rent()).collect();

        for (i, block) in blocks.iter().enumerate() {
            unsafe { block.as_ptr().write_bytes(i as u8, 16) };
        }
        for (i, block) in blocks.iter().enumerate() {
            let bytes = unsafe { std::slice::from_raw_parts(block.as_ptr(), 16) };
            assert!(bytes.iter().all(|&b| b == i as u8));
        }

        let mut addrs: Vec<_> = blocks.iter().map(|b| b.as_ptr() as usize).collect();
        addrs.sort_unstable();
        addrs.dedup();
        assert_eq!(addrs.len(), 10);

        for block in blocks {
            unsafe { pool.return_block(block) };
        }
    }

    #[test]
    fn returned_block_is_reused() {
        let mut pool = MemoryPool::new(4, 8, 0).unwrap();
        let a = pool.rent();
        unsafe { pool.return_block(a) };
        let b = pool.rent();
        assert_eq!(a, b);
        unsafe { pool.return_block(b) };
    }

    #[test]
    fn alignment_is_honored() {
        let mut pool = MemoryPool::builder()
            .blocks_per_slab(7)
            .block_len(40)
            .align(128)
            .build()
            .unwrap();
        let blocks: Vec<_> = (0..20).map(|_| pool.rent()).collect();
        for block in &blocks {
            assert_eq!(block.as_ptr() as usize % 128, 0);
        }
        for block in blocks {
            unsafe { pool.return_block(block) };
        }
    }

    #[test]
    fn single_block_slabs() {
        let mut pool = MemoryPool::new(1, 8, 1).unwrap();
        let a = pool.rent();
        let b = pool.rent();
        let c = pool.rent();
        assert_eq!(pool.slabs(), 3);

        unsafe { pool.return_block(a) };
        assert_eq!(pool.slabs(), 2);
        assert_eq!(pool.free_slabs(), 1);

        unsafe { pool.return_block(b) };
        assert_eq!(pool.slabs(), 1);
        assert_eq!(pool.free_slabs(), 1);

        unsafe { pool.return_block(c) };
        // c lives in the active slab, which never leaves the ring
        assert_eq!(pool.slabs(), 1);
    }

    // =========================================================================
    // Slab recycling
    // =========================================================================

    #[test]
    fn recycles_free_slab_instead_of_allocating() {
        let mut pool = MemoryPool::new(8, 16, 1).unwrap();

        let first: Vec<_> = (0..8).map(|_| pool.rent()).collect();
        assert_eq!(pool.slabs(), 1);

        let ninth = pool.rent();
        assert_eq!(pool.slabs(), 2);

        for block in first {
            unsafe { pool.return_block(block) };
        }
        assert_eq!(pool.slabs(), 1);
        assert_eq!(pool.free_slabs(), 1);

        // Exhaust the second slab, then rent once more
        let rest: Vec<_> = (0..7).map(|_| pool.rent()).collect();
        assert_eq!(pool.slabs(), 1);
        let recycled = pool.rent();
        assert_eq!(pool.slabs(), 2);
        assert_eq!(pool.free_slabs(), 0);

        unsafe {
            pool.return_block(ninth);
            pool.return_block(recycled);
            for block in rest {
                pool.return_block(block);
            }
        }
        assert!(pool.slabs() + pool.free_slabs() <= 2);
    }

    #[test]
    fn free_slabs_capped() {
        let mut pool = MemoryPool::new(2, 8, 1).unwrap();
        let blocks: Vec<_> = (0..8).map(|_| pool.rent()).collect();
        assert_eq!(pool.slabs(), 4);

        for block in blocks {
            unsafe { pool.return_block(block) };
        }
        assert_eq!(pool.slabs(), 1);
        assert_eq!(pool.free_slabs(), 1);
    }

    #[test]
    fn trim_excess_releases_cache() {
        let mut pool = MemoryPool::new(2, 8, 8).unwrap();
        let blocks: Vec<_> = (0..8).map(|_| pool.rent()).collect();
        for block in blocks {
            unsafe { pool.return_block(block) };
        }
        assert_eq!(pool.free_slabs(), 3);

        pool.trim_excess();
        assert_eq!(pool.free_slabs(), 0);
        assert_eq!(pool.slabs(), 1);

        // Still serviceable
        let a = pool.rent();
        unsafe { pool.return_block(a) };
    }

    #[test]
    fn stress_conservation() {
        let mut pool = MemoryPool::new(16, 8, 2).unwrap();
        let mut rng = SmallRng::seed_from_u64(42);
        let mut live: Vec<NonNull<u8>> = Vec::new();

        for _ in 0..20_000 {
            if live.is_empty() || rng.random_range(0..100) < 55 {
                let block = pool.rent();
                unsafe { block.cast::<usize>().as_ptr().write(live.len()) };
                live.push(block);
            } else {
                let idx = rng.random_range(0..live.len());
                let block = live.swap_remove(idx);
                unsafe { pool.return_block(block) };
            }
            assert!(live.len() <= pool.slabs() * pool.blocks_per_slab());
            assert!(pool.free_slabs() <= pool.max_free_slabs());
        }

        for block in live.drain(..) {
            unsafe { pool.return_block(block) };
        }
        let slabs = pool.slabs() + pool.free_slabs();
        let again: Vec<_> = (0..pool.blocks_per_slab() * 2).map(|_| pool.rent()).collect();
        assert!(pool.slabs() <= slabs.max(2));
        for block in again {
            unsafe { pool.return_block(block) };
        }
    }

    // =========================================================================
    // NodePool
    // =========================================================================

    #[derive(Debug)]
    struct DropCounter(Arc<AtomicUsize>);

    impl Drop for DropCounter {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn node_pool_take_moves_value_out() {
        let drops = Arc::new(AtomicUsize::new(0));
        let mut pool = NodePool::<DropCounter>::new(4, 1).unwrap();

        let ptr = pool.alloc(DropCounter(drops.clone()));
        assert_eq!(drops.load(Ordering::SeqCst), 0);

        let value = unsafe { pool.take(ptr) };
        assert_eq!(drops.load(Ordering::SeqCst), 0);
        drop(value);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn node_pool_over_aligned() {
        #[repr(align(64))]
        struct Padded(#[allow(dead_code)] u8);

        let mut pool = NodePool::<Padded>::new(3, 0).unwrap();
        let ptrs: Vec<_> = (0..10).map(|i| pool.alloc(Padded(i))).collect();
        for ptr in &ptrs {
            assert_eq!(ptr.as_ptr() as usize % 64, 0);
        }
        for ptr in ptrs {
            unsafe { pool.free(ptr) };
        }
    }
}
