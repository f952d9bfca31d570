//! One bounded ring of a concurrent queue.
//!
//! This uses per-slot sequence numbers to coordinate multiple producers and
//! multiple consumers within a fixed-length segment.

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicBool, AtomicPtr, AtomicUsize, Ordering};

use crossbeam_utils::{Backoff, CachePadded};

/// A slot in the segment ring.
///
/// The sequence number indicates the slot's state for cursor position `pos`
/// mapping onto it:
/// - `sequence == pos`: slot is empty, writable by the producer claiming `pos`
/// - `sequence == pos + 1`: slot holds an item, readable by the consumer
///   claiming `pos`
/// - `sequence == pos + len`: slot recycled, writable next lap
#[repr(C)]
pub(crate) struct Slot<T> {
    sequence: AtomicUsize,
    item: UnsafeCell<MaybeUninit<T>>,
}

/// A bounded MPMC ring plus the link to its successor.
///
/// Once frozen, `tail` is pushed `2 * len` past its real value so every
/// producer sees the segment as full, and consumers subtract the offset back
/// when deciding whether it is drained.
///
/// Memory layout:
/// ```text
/// ┌─────────────────────────────────────────────┐
/// │ slots, len, mask, frozen, next              │
/// ├─────────────────────────────────────────────┤
/// │ head (cache-line padded) - consumer cursor  │
/// ├─────────────────────────────────────────────┤
/// │ tail (cache-line padded) - producer cursor  │
/// └─────────────────────────────────────────────┘
/// ```
#[repr(C)]
pub(crate) struct Segment<T> {
    slots: NonNull<Slot<T>>,
    len: usize,
    mask: usize,
    frozen: AtomicBool,
    pub(crate) next: AtomicPtr<Segment<T>>,

    head: CachePadded<AtomicUsize>,
    tail: CachePadded<AtomicUsize>,
}

// SAFETY: items cross threads only through the sequence protocol
unsafe impl<T: Send> Send for Segment<T> {}
unsafe impl<T: Send> Sync for Segment<T> {}

impl<T> Segment<T> {
    /// Creates a segment over `slots`, initializing every slot sequence.
    ///
    /// # Safety
    ///
    /// `slots` points to `len` writable slots owned by the segment; `len` is
    /// a power of two.
    pub(crate) unsafe fn new(slots: NonNull<Slot<T>>, len: usize) -> Self {
        debug_assert!(len.is_power_of_two());
        for i in 0..len {
            // SAFETY: i < len
            unsafe {
                slots.as_ptr().add(i).write(Slot {
                    sequence: AtomicUsize::new(i),
                    item: UnsafeCell::new(MaybeUninit::uninit()),
                });
            }
        }
        Self {
            slots,
            len,
            mask: len - 1,
            frozen: AtomicBool::new(false),
            next: AtomicPtr::new(ptr::null_mut()),
            head: CachePadded::new(AtomicUsize::new(0)),
            tail: CachePadded::new(AtomicUsize::new(0)),
        }
    }

    #[inline]
    fn slot(&self, pos: usize) -> &Slot<T> {
        // SAFETY: masked index is < len
        unsafe { &*self.slots.as_ptr().add(pos & self.mask) }
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub(crate) fn slots(&self) -> NonNull<Slot<T>> {
        self.slots
    }

    #[inline]
    fn freeze_offset(&self) -> usize {
        self.len * 2
    }

    /// Snapshot of `(head, tail)`.
    #[inline]
    pub(crate) fn cursors(&self) -> (usize, usize) {
        (
            self.head.load(Ordering::Acquire),
            self.tail.load(Ordering::Acquire),
        )
    }

    /// Items between a `(head, tail)` snapshot of this segment.
    pub(crate) fn count(&self, head: usize, tail: usize) -> usize {
        if head == tail || head == tail.wrapping_sub(self.freeze_offset()) {
            return 0;
        }
        let head = head & self.mask;
        let tail = tail & self.mask;
        if head < tail {
            tail - head
        } else {
            self.len - head + tail
        }
    }

    /// Items in a frozen segment that no consumer has reached yet.
    pub(crate) fn frozen_count(&self) -> usize {
        let (head, tail) = self.cursors();
        tail.wrapping_sub(self.freeze_offset()).wrapping_sub(head)
    }

    /// Closes the segment to producers. Must be serialized by the caller.
    pub(crate) fn freeze(&self) {
        if !self.frozen.load(Ordering::Relaxed) {
            self.tail.fetch_add(self.freeze_offset(), Ordering::AcqRel);
            self.frozen.store(true, Ordering::Release);
        }
    }

    // === Producer operations ===

    /// Attempts to enqueue, handing the item back if the segment is full or
    /// frozen.
    #[inline]
    pub(crate) fn try_enqueue(&self, item: T) -> Result<(), T> {
        loop {
            let tail = self.tail.load(Ordering::Acquire);
            let slot = self.slot(tail);
            let seq = slot.sequence.load(Ordering::Acquire);
            let diff = seq.wrapping_sub(tail) as isize;

            if diff == 0 {
                if self
                    .tail
                    .compare_exchange_weak(
                        tail,
                        tail.wrapping_add(1),
                        Ordering::AcqRel,
                        Ordering::Relaxed,
                    )
                    .is_ok()
                {
                    // SAFETY: the CAS gave this producer exclusive use of the slot
                    unsafe { (*slot.item.get()).write(item) };
                    slot.sequence
                        .store(tail.wrapping_add(1), Ordering::Release);
                    return Ok(());
                }
            } else if diff < 0 {
                // Not yet recycled by a consumer, or frozen
                return Err(item);
            }
            // Another producer claimed this slot; reload
        }
    }

    // === Consumer operations ===

    /// Attempts to dequeue. Returns `None` once the segment is empty.
    #[inline]
    pub(crate) fn try_dequeue(&self) -> Option<T> {
        let mut backoff = None;
        loop {
            let head = self.head.load(Ordering::Acquire);
            let slot = self.slot(head);
            let seq = slot.sequence.load(Ordering::Acquire);
            let diff = seq.wrapping_sub(head.wrapping_add(1)) as isize;

            if diff == 0 {
                if self
                    .head
                    .compare_exchange_weak(
                        head,
                        head.wrapping_add(1),
                        Ordering::AcqRel,
                        Ordering::Relaxed,
                    )
                    .is_ok()
                {
                    // SAFETY: the CAS gave this consumer exclusive use of the
                    // published slot
                    let item = unsafe { (*slot.item.get()).assume_init_read() };
                    slot.sequence
                        .store(head.wrapping_add(self.len), Ordering::Release);
                    return Some(item);
                }
            } else if diff < 0 {
                if self.is_drained(head) {
                    return None;
                }
                // A producer claimed the slot but has not published yet
                backoff.get_or_insert_with(Backoff::new).snooze();
            }
        }
    }

    /// Returns `true` if an item is ready at the head, without taking it.
    pub(crate) fn try_peek(&self) -> bool {
        let mut backoff = None;
        loop {
            let head = self.head.load(Ordering::Acquire);
            let seq = self.slot(head).sequence.load(Ordering::Acquire);
            let diff = seq.wrapping_sub(head.wrapping_add(1)) as isize;

            if diff == 0 {
                return true;
            }
            if diff < 0 {
                if self.is_drained(head) {
                    return false;
                }
                backoff.get_or_insert_with(Backoff::new).snooze();
            }
        }
    }

    /// No claimed position is left at or past `head`.
    #[inline]
    fn is_drained(&self, head: usize) -> bool {
        // frozen before tail: a frozen flag implies the offset is visible
        let frozen = self.frozen.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        tail.wrapping_sub(head) as isize <= 0
            || (frozen
                && tail
                    .wrapping_sub(self.freeze_offset())
                    .wrapping_sub(head) as isize
                    <= 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::alloc::Layout;

    use native_pool::RawAllocator;

    fn with_segment<T>(len: usize, f: impl FnOnce(&Segment<T>)) {
        let layout = Layout::array::<Slot<T>>(len).unwrap();
        let slots = RawAllocator::alloc(layout).cast::<Slot<T>>();
        let segment = unsafe { Segment::new(slots, len) };
        f(&segment);
        while segment.try_dequeue().is_some() {}
        unsafe { RawAllocator::free(slots.cast(), layout) };
    }

    #[test]
    fn slot_sequence_initialization() {
        with_segment::<u64>(8, |s| {
            for i in 0..8 {
                assert_eq!(s.slot(i).sequence.load(Ordering::Relaxed), i);
            }
            assert_eq!(s.cursors(), (0, 0));
        });
    }

    #[test]
    fn fill_then_drain() {
        with_segment::<u64>(4, |s| {
            for i in 0..4 {
                assert!(s.try_enqueue(i).is_ok());
            }
            assert_eq!(s.try_enqueue(99), Err(99));
            let (h, t) = s.cursors();
            assert_eq!(s.count(h, t), 4);

            for i in 0..4 {
                assert_eq!(s.try_dequeue(), Some(i));
            }
            assert_eq!(s.try_dequeue(), None);
        });
    }

    #[test]
    fn wraps_around() {
        with_segment::<u64>(4, |s| {
            for lap in 0..10u64 {
                for i in 0..3 {
                    s.try_enqueue(lap * 10 + i).unwrap();
                }
                for i in 0..3 {
                    assert_eq!(s.try_dequeue(), Some(lap * 10 + i));
                }
            }
            assert!(!s.try_peek());
        });
    }

    #[test]
    fn freeze_blocks_producers_not_consumers() {
        with_segment::<u64>(8, |s| {
            s.try_enqueue(1).unwrap();
            s.try_enqueue(2).unwrap();
            s.freeze();
            assert_eq!(s.try_enqueue(3), Err(3));

            let (h, t) = s.cursors();
            assert_eq!(s.count(h, t), 2);
            assert_eq!(s.frozen_count(), 2);

            assert!(s.try_peek());
            assert_eq!(s.try_dequeue(), Some(1));
            assert_eq!(s.try_dequeue(), Some(2));
            assert_eq!(s.try_dequeue(), None);

            let (h, t) = s.cursors();
            assert_eq!(s.count(h, t), 0);
            assert_eq!(s.frozen_count(), 0);
        });
    }

    #[test]
    fn full_frozen_segment_counts_len() {
        with_segment::<u64>(4, |s| {
            for i in 0..4 {
                s.try_enqueue(i).unwrap();
            }
            s.freeze();
            let (h, t) = s.cursors();
            assert_eq!(s.count(h, t), 4);
        });
    }
}
