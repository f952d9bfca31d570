//! Unbounded multi-producer multi-consumer (MPMC) queue.
//!
//! The queue is a linked list of bounded ring segments. Producers append to
//! the tail segment and consumers take from the head segment, both lock-free.
//! When the tail fills up it is frozen and a segment twice its length (up to
//! 1M slots) is linked after it; when the head segment is drained and has a
//! successor, head moves on and the drained segment is retired. Both
//! transitions happen under a short cross-segment lock.
//!
//! Segment headers come from a [`NodePool`] and slot arrays from a size-class
//! cache. Retired segments return to them through epoch-based reclamation,
//! once no thread can still be looking at them.
//!
//! # Example
//!
//! ```
//! use native_queue::ConcurrentQueue;
//! use std::sync::Arc;
//! use std::thread;
//!
//! let queue = Arc::new(ConcurrentQueue::<u64>::new().unwrap());
//!
//! let producers: Vec<_> = (0..2)
//!     .map(|p| {
//!         let queue = queue.clone();
//!         thread::spawn(move || {
//!             for i in 0..100 {
//!                 queue.enqueue(p * 1000 + i);
//!             }
//!         })
//!     })
//!     .collect();
//! for h in producers {
//!     h.join().unwrap();
//! }
//!
//! let mut received = Vec::new();
//! while let Some(v) = queue.try_dequeue() {
//!     received.push(v);
//! }
//! assert_eq!(received.len(), 200);
//! assert!(queue.is_empty());
//! ```

mod segment;
mod slots;

use std::fmt;
use std::marker::PhantomData;
use std::ptr::{self, NonNull};
use std::sync::Arc;
use std::sync::atomic::{AtomicPtr, Ordering};

use crossbeam_epoch::{self as epoch, Guard};
use crossbeam_utils::{Backoff, CachePadded};
use native_pool::{NodePool, PoolError, SpinLock};

use segment::Segment;
use slots::{MAX_SEGMENT_LEN, MIN_SEGMENT_LEN, SlotPool};

// =============================================================================
// Builder
// =============================================================================

/// Builder for [`ConcurrentQueue`].
///
/// # Example
///
/// ```
/// use native_queue::ConcurrentQueue;
///
/// let queue = ConcurrentQueue::<u32>::builder()
///     .slab_size(64)
///     .max_free_slabs(2)
///     .array_pool_size(8)
///     .capacity(4096)
///     .build()
///     .unwrap();
///
/// queue.enqueue(1);
/// assert_eq!(queue.len(), 1);
/// ```
pub struct ConcurrentQueueBuilder<T> {
    slab_size: usize,
    max_free_slabs: usize,
    array_pool_size: usize,
    capacity: usize,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Default for ConcurrentQueueBuilder<T> {
    fn default() -> Self {
        Self {
            slab_size: 32,
            max_free_slabs: 2,
            array_pool_size: 4,
            capacity: MAX_SEGMENT_LEN,
            _marker: PhantomData,
        }
    }
}

impl<T> Clone for ConcurrentQueueBuilder<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for ConcurrentQueueBuilder<T> {}

impl<T> fmt::Debug for ConcurrentQueueBuilder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConcurrentQueueBuilder")
            .field("slab_size", &self.slab_size)
            .field("max_free_slabs", &self.max_free_slabs)
            .field("array_pool_size", &self.array_pool_size)
            .field("capacity", &self.capacity)
            .finish()
    }
}

impl<T> ConcurrentQueueBuilder<T> {
    /// Segment headers per pool slab. Raised to at least 32. Default: 32.
    pub fn slab_size(mut self, n: usize) -> Self {
        self.slab_size = n;
        self
    }

    /// Fully free header slabs kept for reuse. Default: 2.
    pub fn max_free_slabs(mut self, n: usize) -> Self {
        self.max_free_slabs = n;
        self
    }

    /// Released slot arrays cached per segment length, clamped to `1..=64`.
    /// Default: 4.
    pub fn array_pool_size(mut self, n: usize) -> Self {
        self.array_pool_size = n;
        self
    }

    /// Largest segment length whose slot arrays are cached
    /// `array_pool_size` deep; longer segments keep one spare array. Raised
    /// to at least 32 and rounded up to a power of two. Default: 1M.
    pub fn capacity(mut self, n: usize) -> Self {
        self.capacity = n;
        self
    }

    /// Builds the queue with one empty 32-slot segment.
    pub fn build(self) -> Result<ConcurrentQueue<T>, PoolError> {
        let segments = NodePool::new(self.slab_size.max(32), self.max_free_slabs)?;
        let slots = SlotPool::new(self.array_pool_size.clamp(1, 64), self.capacity)?;
        let pools = Arc::new(SpinLock::new(Pools { segments, slots }));

        let first = pools.lock().new_segment(MIN_SEGMENT_LEN);
        Ok(ConcurrentQueue {
            head: CachePadded::new(AtomicPtr::new(first.as_ptr())),
            tail: CachePadded::new(AtomicPtr::new(first.as_ptr())),
            cross_segment_lock: SpinLock::new(()),
            pools,
        })
    }
}

// =============================================================================
// Pools
// =============================================================================

struct Pools<T> {
    segments: NodePool<Segment<T>>,
    slots: SlotPool<T>,
}

impl<T> Pools<T> {
    fn new_segment(&mut self, len: usize) -> NonNull<Segment<T>> {
        let slots = self.slots.rent(len);
        // SAFETY: fresh array of `len` slots, len a power of two
        let segment = unsafe { Segment::new(slots, len) };
        self.segments.alloc(segment)
    }

    /// # Safety
    ///
    /// `segment` holds no items and is unreachable by every thread.
    unsafe fn release(&mut self, segment: NonNull<Segment<T>>) {
        unsafe {
            let seg = segment.as_ref();
            self.slots.give_back(seg.slots(), seg.len());
            self.segments.free(segment);
        }
    }
}

// =============================================================================
// ConcurrentQueue
// =============================================================================

/// An unbounded lock-free MPMC FIFO queue.
///
/// Items are delivered in enqueue order per producer and exactly once across
/// consumers. `len` and `is_empty` are exact when the queue is quiescent and
/// a consistent snapshot otherwise.
pub struct ConcurrentQueue<T> {
    head: CachePadded<AtomicPtr<Segment<T>>>,
    tail: CachePadded<AtomicPtr<Segment<T>>>,
    cross_segment_lock: SpinLock<()>,
    pools: Arc<SpinLock<Pools<T>>>,
}

// SAFETY: items move between threads through the segment protocol only
unsafe impl<T: Send> Send for ConcurrentQueue<T> {}
unsafe impl<T: Send> Sync for ConcurrentQueue<T> {}

impl<T> ConcurrentQueue<T> {
    /// Creates a queue with default pool settings.
    pub fn new() -> Result<Self, PoolError> {
        ConcurrentQueueBuilder::default().build()
    }

    /// Returns a builder with default settings.
    pub fn builder() -> ConcurrentQueueBuilder<T> {
        ConcurrentQueueBuilder::default()
    }

    #[inline]
    fn segment<'g>(&self, ptr: *mut Segment<T>, _guard: &'g Guard) -> &'g Segment<T> {
        // SAFETY: segments reachable from head/tail are retired through the
        // epoch, so they outlive the guard
        unsafe { &*ptr }
    }

    /// Adds an item at the tail.
    pub fn enqueue(&self, item: T) {
        let guard = epoch::pin();
        let mut item = item;
        loop {
            let tail = self.tail.load(Ordering::Acquire);
            match self.segment(tail, &guard).try_enqueue(item) {
                Ok(()) => return,
                Err(back) => item = back,
            }
            self.grow(tail, &guard);
        }
    }

    /// Tail segment is full: freeze it and link a larger one.
    #[cold]
    fn grow(&self, tail: *mut Segment<T>, guard: &Guard) {
        let _lock = self.cross_segment_lock.lock();
        if self.tail.load(Ordering::Acquire) != tail {
            return;
        }
        let segment = self.segment(tail, guard);
        segment.freeze();

        let len = (segment.len() * 2).min(MAX_SEGMENT_LEN);
        let next = self.pools.lock().new_segment(len).as_ptr();
        segment.next.store(next, Ordering::Release);
        self.tail.store(next, Ordering::Release);
        log::trace!("concurrent queue: grew to a {len}-slot segment");
    }

    /// Removes the item at the head, or `None` if the queue is empty.
    pub fn try_dequeue(&self) -> Option<T> {
        let guard = epoch::pin();
        loop {
            let head = self.head.load(Ordering::Acquire);
            let segment = self.segment(head, &guard);
            if let Some(item) = segment.try_dequeue() {
                return Some(item);
            }
            if segment.next.load(Ordering::Acquire).is_null() {
                return None;
            }
            // Frozen: items published before the freeze may still be there
            if let Some(item) = segment.try_dequeue() {
                return Some(item);
            }
            self.advance_head(head, &guard);
        }
    }

    /// Returns `true` if an item is available, without removing it.
    pub fn try_peek(&self) -> bool {
        !self.is_empty()
    }

    #[cold]
    fn advance_head(&self, head: *mut Segment<T>, guard: &Guard) {
        let _lock = self.cross_segment_lock.lock();
        if self.head.load(Ordering::Acquire) != head {
            return;
        }
        let next = self.segment(head, guard).next.load(Ordering::Acquire);
        self.head.store(next, Ordering::Release);
        // SAFETY: drained and no longer reachable from head
        unsafe { self.retire(head, guard) };
        log::trace!("concurrent queue: advanced head segment");
    }

    /// Hands an unreachable, empty segment back to the pools once every
    /// thread pinned now has unpinned.
    ///
    /// # Safety
    ///
    /// `segment` holds no items and can no longer be reached from head or
    /// tail.
    unsafe fn retire(&self, segment: *mut Segment<T>, guard: &Guard) {
        let Some(segment) = NonNull::new(segment) else {
            return;
        };
        let pools = Arc::clone(&self.pools);
        // SAFETY: the closure touches the segment only after the epoch
        // advances past every reader; the pools are kept alive by the Arc
        unsafe {
            guard.defer_unchecked(move || pools.lock().release(segment));
        }
    }

    /// Returns `true` if no item is available.
    pub fn is_empty(&self) -> bool {
        let guard = epoch::pin();
        let mut segment = self.segment(self.head.load(Ordering::Acquire), &guard);
        loop {
            let next = segment.next.load(Ordering::Acquire);
            if segment.try_peek() {
                return false;
            }
            if !next.is_null() {
                segment = self.segment(next, &guard);
            } else if segment.next.load(Ordering::Acquire).is_null() {
                return true;
            }
        }
    }

    /// Number of items in the queue.
    pub fn len(&self) -> usize {
        let guard = epoch::pin();
        let backoff = Backoff::new();
        loop {
            let head = self.head.load(Ordering::Acquire);
            let tail = self.tail.load(Ordering::Acquire);
            let head_seg = self.segment(head, &guard);
            let (hh, ht) = head_seg.cursors();

            if head == tail {
                if self.cursors_stable(head, tail) && head_seg.cursors() == (hh, ht) {
                    return head_seg.count(hh, ht);
                }
            } else if head_seg.next.load(Ordering::Acquire) == tail {
                let tail_seg = self.segment(tail, &guard);
                let (th, tt) = tail_seg.cursors();
                if self.cursors_stable(head, tail)
                    && head_seg.cursors() == (hh, ht)
                    && tail_seg.cursors() == (th, tt)
                {
                    return head_seg.count(hh, ht) + tail_seg.count(th, tt);
                }
            } else if let Some(n) = self.len_locked(head, tail, (hh, ht), &guard) {
                return n;
            }
            backoff.snooze();
        }
    }

    #[inline]
    fn cursors_stable(&self, head: *mut Segment<T>, tail: *mut Segment<T>) -> bool {
        self.head.load(Ordering::Acquire) == head && self.tail.load(Ordering::Acquire) == tail
    }

    /// Three or more segments: sum under the cross-segment lock.
    #[cold]
    fn len_locked(
        &self,
        head: *mut Segment<T>,
        tail: *mut Segment<T>,
        (hh, ht): (usize, usize),
        guard: &Guard,
    ) -> Option<usize> {
        let _lock = self.cross_segment_lock.lock();
        if !self.cursors_stable(head, tail) {
            return None;
        }
        let head_seg = self.segment(head, guard);
        let tail_seg = self.segment(tail, guard);
        let (th, tt) = tail_seg.cursors();
        if head_seg.cursors() != (hh, ht) || tail_seg.cursors() != (th, tt) {
            return None;
        }

        let mut count = head_seg.count(hh, ht) + tail_seg.count(th, tt);
        let mut seg = head_seg.next.load(Ordering::Acquire);
        while seg != tail {
            let middle = self.segment(seg, guard);
            count += middle.frozen_count();
            seg = middle.next.load(Ordering::Acquire);
        }
        Some(count)
    }

    /// Drops every item and starts over with one empty 32-slot segment.
    pub fn clear(&self) {
        let guard = epoch::pin();
        let _lock = self.cross_segment_lock.lock();

        let tail = self.tail.load(Ordering::Acquire);
        self.segment(tail, &guard).freeze();

        let fresh = self.pools.lock().new_segment(MIN_SEGMENT_LEN).as_ptr();
        let mut seg = self.head.swap(fresh, Ordering::AcqRel);
        self.tail.store(fresh, Ordering::Release);

        while !seg.is_null() {
            let segment = self.segment(seg, &guard);
            while segment.try_dequeue().is_some() {}
            let next = segment.next.load(Ordering::Acquire);
            // SAFETY: drained and unlinked from head and tail
            unsafe { self.retire(seg, &guard) };
            seg = next;
        }
        log::trace!("concurrent queue: cleared");
    }
}

impl<T> Drop for ConcurrentQueue<T> {
    fn drop(&mut self) {
        let mut pools = self.pools.lock();
        let mut seg = *self.head.get_mut();
        while let Some(segment) = NonNull::new(seg) {
            // SAFETY: exclusive access; no other thread can reach the queue
            unsafe {
                while segment.as_ref().try_dequeue().is_some() {}
                seg = segment.as_ref().next.load(Ordering::Relaxed);
                pools.release(segment);
            }
        }
        *self.head.get_mut() = ptr::null_mut();
        *self.tail.get_mut() = ptr::null_mut();
    }
}

impl<T> fmt::Debug for ConcurrentQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConcurrentQueue")
            .field("len", &self.len())
            .finish()
    }
}
