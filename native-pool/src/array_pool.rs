//! Size-class array pools.
//!
//! Lengths are grouped into power-of-two classes `16 << i`, each served by
//! its own [`MemoryBucket`](crate::MemoryBucket).
//!
//! [`ArrayPool`] is single-threaded. [`ConcurrentArrayPool`] guards each class
//! with its own [`SpinLock`] so unrelated classes never contend.

use std::alloc::Layout;
use std::cell::UnsafeCell;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;
use std::{fmt, slice};

use crossbeam_utils::CachePadded;

use crate::error::PoolError;
use crate::memory_bucket::MemoryBucket;
use crate::pod::Pod;
use crate::spin_lock::SpinLock;

/// Smallest size class.
pub const MIN_POOLED_LENGTH: usize = 16;

/// Largest size class any pool will configure.
pub const MAX_POOLED_LENGTH: usize = 1 << 30;

/// Size class index serving `len` elements.
#[inline]
fn select_bucket(len: usize) -> usize {
    let v = len.saturating_sub(1) | (MIN_POOLED_LENGTH - 1);
    (usize::BITS - 1 - v.leading_zeros()) as usize - 3
}

/// Size class index of a returned array, if `len` is exactly a class.
#[inline]
fn return_bucket(len: usize, buckets: usize) -> Result<usize, PoolError> {
    if len < MIN_POOLED_LENGTH || !len.is_power_of_two() {
        return Err(PoolError::BufferNotFromPool);
    }
    let index = select_bucket(len);
    if index >= buckets {
        return Err(PoolError::BufferNotFromPool);
    }
    Ok(index)
}

fn validate(size: usize, max_len: usize) -> Result<usize, PoolError> {
    if size == 0 {
        return Err(PoolError::invalid("size", size, "must be positive"));
    }
    let max_len = max_len.clamp(MIN_POOLED_LENGTH, MAX_POOLED_LENGTH);
    Ok(select_bucket(max_len) + 1)
}

fn make_buckets<T, B>(
    size: usize,
    count: usize,
    wrap: impl Fn(MemoryBucket) -> B,
) -> Result<Box<[B]>, PoolError> {
    (0..count)
        .map(|i| {
            let len = MIN_POOLED_LENGTH << i;
            let layout = Layout::array::<T>(len)
                .map_err(|_| PoolError::invalid("max_len", len, "array size overflows"))?;
            MemoryBucket::new(size, layout).map(&wrap)
        })
        .collect()
}

// =============================================================================
// PooledArray
// =============================================================================

/// An array rented from a pool.
///
/// Dereferences to a slice of exactly the size class length. Hand it back
/// with the pool's `return_array`; an array that is simply dropped stays
/// owned by the pool and is released when the pool is dropped.
pub struct PooledArray<'pool, T> {
    ptr: NonNull<T>,
    len: usize,
    owner: usize,
    _marker: PhantomData<&'pool mut [T]>,
}

// SAFETY: a PooledArray is a unique handle to its elements
unsafe impl<T: Send> Send for PooledArray<'_, T> {}
unsafe impl<T: Sync> Sync for PooledArray<'_, T> {}

impl<T> PooledArray<'_, T> {
    /// Length of the array (its size class).
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Always `false`: size classes start at 16.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Raw pointer to the first element.
    #[inline]
    pub fn as_ptr(&self) -> *const T {
        self.ptr.as_ptr()
    }

    /// Raw mutable pointer to the first element.
    #[inline]
    pub fn as_mut_ptr(&mut self) -> *mut T {
        self.ptr.as_ptr()
    }
}

impl<T> Deref for PooledArray<'_, T> {
    type Target = [T];

    #[inline]
    fn deref(&self) -> &[T] {
        // SAFETY: T: Pod at construction, so every element is a valid value
        unsafe { slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }
}

impl<T> DerefMut for PooledArray<'_, T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut [T] {
        // SAFETY: as above, and the handle is unique
        unsafe { slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl<T: fmt::Debug> fmt::Debug for PooledArray<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

// =============================================================================
// ArrayPool
// =============================================================================

/// Single-threaded size-class pool of `T` arrays.
///
/// # Example
///
/// ```
/// use native_pool::ArrayPool;
///
/// let pool = ArrayPool::<u32>::new(4, 1024).unwrap();
///
/// let mut array = pool.rent(100).unwrap();
/// assert_eq!(array.len(), 128);
/// array[0] = 7;
///
/// pool.return_array(array).unwrap();
/// assert!(pool.rent(2048).is_err());
/// ```
pub struct ArrayPool<T: Pod> {
    buckets: Box<[UnsafeCell<MemoryBucket>]>,
    size: usize,
    _marker: PhantomData<T>,
}

// SAFETY: buckets own their memory; the pool is !Sync through UnsafeCell
unsafe impl<T: Pod + Send> Send for ArrayPool<T> {}

impl<T: Pod> ArrayPool<T> {
    /// Creates a pool caching up to `size` arrays per class, with classes up
    /// to `max_len` (clamped to `16..=1 << 30`).
    pub fn new(size: usize, max_len: usize) -> Result<Self, PoolError> {
        let () = T::_ASSERT_NO_DROP;
        let count = validate(size, max_len)?;
        Ok(Self {
            buckets: make_buckets::<T, _>(size, count, UnsafeCell::new)?,
            size,
            _marker: PhantomData,
        })
    }

    /// Arrays cached per size class.
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Largest length the pool serves.
    #[inline]
    pub fn max_len(&self) -> usize {
        MIN_POOLED_LENGTH << (self.buckets.len() - 1)
    }

    #[inline]
    fn id(&self) -> usize {
        self.buckets.as_ptr() as usize
    }

    /// Rents an array of at least `min_len` elements.
    pub fn rent(&self, min_len: usize) -> Result<PooledArray<'_, T>, PoolError> {
        self.try_rent(min_len).ok_or(PoolError::LengthExceeded {
            requested: min_len,
            max: self.max_len(),
        })
    }

    /// Rents an array of at least `min_len` elements, or `None` if `min_len`
    /// exceeds the largest class.
    pub fn try_rent(&self, min_len: usize) -> Option<PooledArray<'_, T>> {
        let index = select_bucket(min_len);
        let bucket = self.buckets.get(index)?;
        // SAFETY: single-threaded; no reference into the bucket outlives this call
        let block = unsafe { (*bucket.get()).rent() };
        Some(PooledArray {
            ptr: block.cast(),
            len: MIN_POOLED_LENGTH << index,
            owner: self.id(),
            _marker: PhantomData,
        })
    }

    /// Returns an array to the pool.
    ///
    /// Fails with [`PoolError::BufferNotFromPool`] if the array was rented
    /// from a different pool; the pool is left unchanged.
    pub fn return_array(&self, array: PooledArray<'_, T>) -> Result<(), PoolError> {
        if array.owner != self.id() {
            return Err(PoolError::BufferNotFromPool);
        }
        let index = return_bucket(array.len, self.buckets.len())?;
        // SAFETY: the array came from this bucket (owner and class match)
        unsafe { (*self.buckets[index].get()).return_block(array.ptr.cast()) };
        Ok(())
    }

    /// Returns an array to the pool, reporting `false` instead of an error.
    pub fn try_return(&self, array: PooledArray<'_, T>) -> bool {
        self.return_array(array).is_ok()
    }
}

impl<T: Pod> fmt::Debug for ArrayPool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArrayPool")
            .field("size", &self.size)
            .field("max_len", &self.max_len())
            .finish()
    }
}

// =============================================================================
// ConcurrentArrayPool
// =============================================================================

/// Thread-safe size-class pool of `T` arrays.
///
/// Each class is protected by its own cache-padded [`SpinLock`].
///
/// # Example
///
/// ```
/// use native_pool::ConcurrentArrayPool;
/// use std::thread;
///
/// let pool = ConcurrentArrayPool::<u8>::new(8, 4096).unwrap();
/// thread::scope(|s| {
///     for _ in 0..4 {
///         s.spawn(|| {
///             let array = pool.rent(1000).unwrap();
///             assert_eq!(array.len(), 1024);
///             pool.return_array(array).unwrap();
///         });
///     }
/// });
/// ```
pub struct ConcurrentArrayPool<T: Pod> {
    buckets: Box<[CachePadded<SpinLock<MemoryBucket>>]>,
    size: usize,
    _marker: PhantomData<T>,
}

// SAFETY: every bucket is behind a lock
unsafe impl<T: Pod + Send> Send for ConcurrentArrayPool<T> {}
unsafe impl<T: Pod + Send> Sync for ConcurrentArrayPool<T> {}

impl<T: Pod> ConcurrentArrayPool<T> {
    /// Creates a pool caching up to `size` arrays per class, with classes up
    /// to `max_len` (clamped to `16..=1 << 30`).
    pub fn new(size: usize, max_len: usize) -> Result<Self, PoolError> {
        let () = T::_ASSERT_NO_DROP;
        let count = validate(size, max_len)?;
        Ok(Self {
            buckets: make_buckets::<T, _>(size, count, |b| CachePadded::new(SpinLock::new(b)))?,
            size,
            _marker: PhantomData,
        })
    }

    /// Arrays cached per size class.
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Largest length the pool serves.
    #[inline]
    pub fn max_len(&self) -> usize {
        MIN_POOLED_LENGTH << (self.buckets.len() - 1)
    }

    #[inline]
    fn id(&self) -> usize {
        self.buckets.as_ptr() as usize
    }

    /// Rents an array of at least `min_len` elements.
    pub fn rent(&self, min_len: usize) -> Result<PooledArray<'_, T>, PoolError> {
        self.try_rent(min_len).ok_or(PoolError::LengthExceeded {
            requested: min_len,
            max: self.max_len(),
        })
    }

    /// Rents an array of at least `min_len` elements, or `None` if `min_len`
    /// exceeds the largest class.
    pub fn try_rent(&self, min_len: usize) -> Option<PooledArray<'_, T>> {
        let index = select_bucket(min_len);
        let block = self.buckets.get(index)?.lock().rent();
        Some(PooledArray {
            ptr: block.cast(),
            len: MIN_POOLED_LENGTH << index,
            owner: self.id(),
            _marker: PhantomData,
        })
    }

    /// Returns an array to the pool.
    pub fn return_array(&self, array: PooledArray<'_, T>) -> Result<(), PoolError> {
        if array.owner != self.id() {
            return Err(PoolError::BufferNotFromPool);
        }
        let index = return_bucket(array.len, self.buckets.len())?;
        // SAFETY: the array came from this bucket
        unsafe { self.buckets[index].lock().return_block(array.ptr.cast()) };
        Ok(())
    }

    /// Returns an array to the pool, reporting `false` instead of an error.
    pub fn try_return(&self, array: PooledArray<'_, T>) -> bool {
        self.return_array(array).is_ok()
    }
}

impl<T: Pod> fmt::Debug for ConcurrentArrayPool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConcurrentArrayPool")
            .field("size", &self.size)
            .field("max_len", &self.max_len())
            .finish()
    }
}
