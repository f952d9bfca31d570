//! Size-class cache of segment slot arrays.
//!
//! Segment lengths are powers of two from 32 up to 1M slots, one
//! [`MemoryBucket`] per length. Classes up to the configured capacity keep
//! `cache_size` released arrays; longer classes keep a single spare.

use std::alloc::Layout;
use std::marker::PhantomData;
use std::ptr::NonNull;

use native_pool::{MemoryBucket, PoolError};

use super::segment::Slot;

/// Smallest segment length, and the length of a fresh queue's segment.
pub(crate) const MIN_SEGMENT_LEN: usize = 32;

/// Largest segment length.
pub(crate) const MAX_SEGMENT_LEN: usize = 1024 * 1024;

pub(crate) struct SlotPool<T> {
    classes: Box<[MemoryBucket]>,
    _marker: PhantomData<T>,
}

#[inline]
fn class_of(len: usize) -> usize {
    debug_assert!(len.is_power_of_two() && (MIN_SEGMENT_LEN..=MAX_SEGMENT_LEN).contains(&len));
    (len / MIN_SEGMENT_LEN).trailing_zeros() as usize
}

impl<T> SlotPool<T> {
    /// Caches up to `cache_size` arrays for every class up to `max_len`,
    /// which is rounded up to a power of two within the segment limits.
    ///
    /// # Errors
    ///
    /// [`PoolError::InvalidArgument`] if `cache_size` is zero or a slot
    /// array of `T` would overflow the address space.
    pub(crate) fn new(cache_size: usize, max_len: usize) -> Result<Self, PoolError> {
        let max_len = max_len
            .clamp(MIN_SEGMENT_LEN, MAX_SEGMENT_LEN)
            .next_power_of_two();
        let classes = (0..=class_of(MAX_SEGMENT_LEN))
            .map(|index| {
                let len = MIN_SEGMENT_LEN << index;
                let layout = Layout::array::<Slot<T>>(len)
                    .map_err(|_| PoolError::invalid("len", len, "slot array size overflows"))?;
                let size = if len <= max_len { cache_size } else { 1 };
                MemoryBucket::with_blocks_per_slab(size, 1, layout)
            })
            .collect::<Result<_, _>>()?;
        Ok(Self {
            classes,
            _marker: PhantomData,
        })
    }

    /// An uninitialized array of `len` slots, `len` a power of two within
    /// the segment limits.
    #[inline]
    pub(crate) fn rent(&mut self, len: usize) -> NonNull<Slot<T>> {
        self.classes[class_of(len)].rent().cast()
    }

    /// Takes back an array whose items have all been moved out.
    ///
    /// # Safety
    ///
    /// `slots` came from [`rent`](Self::rent) on this pool with the same
    /// `len`.
    #[inline]
    pub(crate) unsafe fn give_back(&mut self, slots: NonNull<Slot<T>>, len: usize) {
        // SAFETY: rented from this class's bucket
        unsafe { self.classes[class_of(len)].return_block(slots.cast()) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_class_per_segment_length() {
        let pool = SlotPool::<u64>::new(4, 100).unwrap();
        assert_eq!(pool.classes.len(), 16);
        let sizes: Vec<_> = pool.classes.iter().map(MemoryBucket::size).collect();
        assert_eq!(&sizes[..4], &[4, 4, 4, 1]);
        assert!(sizes[4..].iter().all(|s| *s == 1));
        assert_eq!(
            pool.classes[0].block_len(),
            32 * std::mem::size_of::<Slot<u64>>()
        );
        assert!(SlotPool::<u64>::new(0, 100).is_err());
    }

    #[test]
    fn cached_array_reused() {
        let mut pool = SlotPool::<u64>::new(2, 256).unwrap();
        let a = pool.rent(64);
        unsafe { pool.give_back(a, 64) };
        let b = pool.rent(64);
        assert_eq!(a, b);
        unsafe { pool.give_back(b, 64) };
    }

    #[test]
    fn cache_is_bounded() {
        let mut pool = SlotPool::<u64>::new(1, 64).unwrap();
        let a = pool.rent(32);
        let b = pool.rent(32);
        unsafe {
            pool.give_back(a, 32);
            pool.give_back(b, 32);
        }
        assert_eq!(pool.classes[0].len(), 1);
    }

    #[test]
    fn long_segments_keep_one_spare() {
        let mut pool = SlotPool::<u64>::new(4, 64).unwrap();
        let a = pool.rent(512);
        let b = pool.rent(512);
        unsafe {
            pool.give_back(a, 512);
            pool.give_back(b, 512);
        }
        assert_eq!(pool.classes[4].len(), 1);
        assert!(pool.classes[4].is_full());
    }

    #[test]
    fn oversized_slot_arrays_are_rejected() {
        assert!(matches!(
            SlotPool::<[u8; 1 << 50]>::new(1, 32),
            Err(PoolError::InvalidArgument { name: "len", .. })
        ));
    }
}
