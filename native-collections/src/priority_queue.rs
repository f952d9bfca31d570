//! Array-backed 4-ary min-heap keyed by a separate priority.
//!
//! Node `i` has parent `(i - 1) >> 2` and children `(i << 2) + 1 ..= (i << 2) + 4`.
//! A wider node halves the tree height compared to a binary heap, trading a
//! few extra comparisons per level for fewer cache misses.

use std::fmt;
use std::ptr;
use std::slice;

use native_pool::RawBuffer;

use crate::cursor::{Cursor, Cursored};
use crate::list::grown_capacity;
use crate::CollectionError;

const ARITY_SHIFT: usize = 2;

/// A min-priority queue of `(element, priority)` pairs.
///
/// Ties between equal priorities are broken arbitrarily.
///
/// # Example
///
/// ```
/// use native_collections::PriorityQueue;
///
/// let mut queue = PriorityQueue::new();
/// queue.enqueue("a", 5);
/// queue.enqueue("b", 1);
/// queue.enqueue("c", 3);
///
/// assert_eq!(queue.dequeue(), Ok("b"));
/// assert_eq!(queue.dequeue(), Ok("c"));
/// assert_eq!(queue.dequeue(), Ok("a"));
/// assert!(queue.is_empty());
/// ```
pub struct PriorityQueue<E, P> {
    nodes: RawBuffer<(E, P)>,
    len: usize,
    version: u32,
}

// SAFETY: the queue uniquely owns its nodes
unsafe impl<E: Send, P: Send> Send for PriorityQueue<E, P> {}

impl<E, P: Ord> Default for PriorityQueue<E, P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E, P: Ord> PriorityQueue<E, P> {
    /// Creates an empty queue without allocating.
    pub const fn new() -> Self {
        Self {
            nodes: RawBuffer::new(),
            len: 0,
            version: 0,
        }
    }

    /// Creates an empty queue with room for `capacity` pairs.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            nodes: RawBuffer::with_capacity(capacity),
            len: 0,
            version: 0,
        }
    }

    /// Number of queued pairs.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if nothing is queued.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Allocated node slots.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.nodes.capacity()
    }

    /// Structural modification counter.
    #[inline]
    pub fn version(&self) -> u32 {
        self.version
    }

    #[inline]
    fn as_slice(&self) -> &[(E, P)] {
        // SAFETY: the first `len` slots are initialized
        unsafe { slice::from_raw_parts(self.nodes.as_ptr(), self.len) }
    }

    // ========================================================================
    // Enqueue
    // ========================================================================

    /// Adds `element` with `priority`, growing if needed.
    pub fn enqueue(&mut self, element: E, priority: P) {
        if self.len == self.nodes.capacity() {
            self.grow(self.len + 1);
        }
        let index = self.len;
        self.len += 1;
        self.version = self.version.wrapping_add(1);
        // SAFETY: index < capacity and is the fresh hole at the end
        unsafe { self.move_up((element, priority), index) };
    }

    /// Adds `element` only if it fits without growing; hands the pair back
    /// otherwise.
    pub fn try_enqueue(&mut self, element: E, priority: P) -> Result<(), (E, P)> {
        if self.len == self.nodes.capacity() {
            return Err((element, priority));
        }
        let index = self.len;
        self.len += 1;
        self.version = self.version.wrapping_add(1);
        // SAFETY: as in `enqueue`
        unsafe { self.move_up((element, priority), index) };
        Ok(())
    }

    // ========================================================================
    // Dequeue / peek
    // ========================================================================

    /// Removes and returns the minimum-priority element.
    pub fn dequeue(&mut self) -> Result<E, CollectionError> {
        self.try_dequeue()
            .map(|(element, _)| element)
            .ok_or(CollectionError::EmptyQueue)
    }

    /// Removes and returns the minimum-priority pair, if any.
    pub fn try_dequeue(&mut self) -> Option<(E, P)> {
        if self.len == 0 {
            return None;
        }
        self.len -= 1;
        self.version = self.version.wrapping_add(1);
        // SAFETY: slot 0 is initialized; when len > 0 the last slot is moved
        // into the hole left at the root
        unsafe {
            let root = self.nodes.slot(0).read();
            if self.len > 0 {
                let last = self.nodes.slot(self.len).read();
                self.move_down(last, 0);
            }
            Some(root)
        }
    }

    /// The minimum-priority element.
    pub fn peek(&self) -> Result<&E, CollectionError> {
        self.try_peek()
            .map(|(element, _)| element)
            .ok_or(CollectionError::EmptyQueue)
    }

    /// The minimum-priority pair, if any.
    #[inline]
    pub fn try_peek(&self) -> Option<(&E, &P)> {
        self.as_slice().first().map(|(e, p)| (e, p))
    }

    // ========================================================================
    // Combined operations
    // ========================================================================

    /// Enqueues then dequeues in one sift.
    ///
    /// If the queue is non-empty and `priority` is greater than the root's,
    /// the root is replaced and its element returned. Otherwise `element`
    /// itself would be dequeued, so it is returned unchanged.
    pub fn enqueue_dequeue(&mut self, element: E, priority: P) -> E {
        match self.try_enqueue_dequeue(element, priority) {
            Ok(root) | Err(root) => root,
        }
    }

    /// Like [`enqueue_dequeue`](Self::enqueue_dequeue), reporting whether
    /// the queue changed: `Ok(old_root)` if it did, `Err(element)` if not.
    pub fn try_enqueue_dequeue(&mut self, element: E, priority: P) -> Result<E, E> {
        let replaces_root = matches!(self.as_slice().first(), Some((_, root)) if priority > *root);
        if !replaces_root {
            return Err(element);
        }
        // SAFETY: slot 0 is initialized and refilled by move_down
        let (old, _) = unsafe {
            let old = self.nodes.slot(0).read();
            self.move_down((element, priority), 0);
            old
        };
        self.version = self.version.wrapping_add(1);
        Ok(old)
    }

    /// Dequeues then enqueues in one sift. Fails on an empty queue.
    pub fn dequeue_enqueue(&mut self, element: E, priority: P) -> Result<E, CollectionError> {
        self.try_dequeue_enqueue(element, priority)
            .map_err(|_| CollectionError::EmptyQueue)
    }

    /// Like [`dequeue_enqueue`](Self::dequeue_enqueue), handing `element`
    /// back when the queue is empty.
    pub fn try_dequeue_enqueue(&mut self, element: E, priority: P) -> Result<E, E> {
        if self.len == 0 {
            return Err(element);
        }
        // SAFETY: slot 0 is initialized and refilled before returning
        let (old, _) = unsafe {
            let root = self.nodes.slot(0);
            let old = root.read();
            if priority > old.1 {
                self.move_down((element, priority), 0);
            } else {
                root.write((element, priority));
            }
            old
        };
        self.version = self.version.wrapping_add(1);
        Ok(old)
    }

    // ========================================================================
    // Capacity
    // ========================================================================

    #[cold]
    fn grow(&mut self, needed: usize) {
        let capacity = grown_capacity(self.nodes.capacity(), needed);
        // SAFETY: growing keeps every live node
        unsafe { self.nodes.resize(capacity) };
    }

    /// Grows so that at least `capacity` pairs fit. Returns the capacity.
    pub fn ensure_capacity(&mut self, capacity: usize) -> usize {
        if capacity > self.nodes.capacity() {
            self.grow(capacity);
            self.version = self.version.wrapping_add(1);
        }
        self.nodes.capacity()
    }

    /// Shrinks to the length when less than 90% of the capacity is used.
    pub fn trim_excess(&mut self) {
        let threshold = (self.nodes.capacity() as f64 * 0.9) as usize;
        if self.len < threshold {
            // SAFETY: shrinking to len keeps every live node
            unsafe { self.nodes.resize(self.len) };
            self.version = self.version.wrapping_add(1);
        }
    }

    /// Drops every pair. Capacity is kept.
    pub fn clear(&mut self) {
        let len = self.len;
        self.len = 0;
        // SAFETY: the first `len` slots were initialized
        unsafe { ptr::drop_in_place(ptr::slice_from_raw_parts_mut(self.nodes.as_ptr(), len)) };
        self.version = self.version.wrapping_add(1);
    }

    /// Every queued pair in storage order, which is not priority order.
    pub fn unordered_items(&self) -> UnorderedItems<'_, E, P> {
        UnorderedItems {
            inner: self.as_slice().iter(),
        }
    }

    /// A detached, version-checked cursor over the unordered items.
    pub fn cursor(&self) -> Cursor<Self> {
        Cursor::new(self)
    }

    // ========================================================================
    // Sifting
    // ========================================================================

    /// Places `node` into the hole at `index`, moving it toward the root.
    ///
    /// # Safety
    ///
    /// `index < len`; slot `index` is a hole and every other slot below `len`
    /// is initialized.
    unsafe fn move_up(&mut self, node: (E, P), mut index: usize) {
        let base = self.nodes.as_ptr();
        unsafe {
            while index > 0 {
                let parent = (index - 1) >> ARITY_SHIFT;
                if node.1 < (*base.add(parent)).1 {
                    ptr::copy_nonoverlapping(base.add(parent), base.add(index), 1);
                    index = parent;
                } else {
                    break;
                }
            }
            base.add(index).write(node);
        }
    }

    /// Places `node` into the hole at `index`, moving it toward the leaves.
    ///
    /// # Safety
    ///
    /// Same as [`move_up`](Self::move_up).
    unsafe fn move_down(&mut self, node: (E, P), mut index: usize) {
        let base = self.nodes.as_ptr();
        let len = self.len;
        unsafe {
            loop {
                let first = (index << ARITY_SHIFT) + 1;
                if first >= len {
                    break;
                }
                let end = (first + (1 << ARITY_SHIFT)).min(len);
                let mut min = first;
                for child in first + 1..end {
                    if (*base.add(child)).1 < (*base.add(min)).1 {
                        min = child;
                    }
                }
                if node.1 > (*base.add(min)).1 {
                    ptr::copy_nonoverlapping(base.add(min), base.add(index), 1);
                    index = min;
                } else {
                    break;
                }
            }
            base.add(index).write(node);
        }
    }
}

impl<E, P> Drop for PriorityQueue<E, P> {
    fn drop(&mut self) {
        // SAFETY: the first `len` slots are initialized
        unsafe {
            ptr::drop_in_place(ptr::slice_from_raw_parts_mut(self.nodes.as_ptr(), self.len));
        }
    }
}

impl<E: fmt::Debug, P: fmt::Debug + Ord> fmt::Debug for PriorityQueue<E, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.unordered_items()).finish()
    }
}

impl<E, P: Ord> Cursored for PriorityQueue<E, P> {
    type Item<'a>
        = (&'a E, &'a P)
    where
        Self: 'a;
    type Position = usize;

    fn version(&self) -> u32 {
        self.version
    }

    fn start(&self) -> usize {
        0
    }

    fn advance<'a>(&'a self, position: &mut usize) -> Option<(&'a E, &'a P)> {
        let (e, p) = self.as_slice().get(*position)?;
        *position += 1;
        Some((e, p))
    }
}

/// Iterator over queued pairs in storage order.
pub struct UnorderedItems<'a, E, P> {
    inner: slice::Iter<'a, (E, P)>,
}

impl<'a, E, P> Iterator for UnorderedItems<'a, E, P> {
    type Item = (&'a E, &'a P);

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(e, p)| (e, p))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<E, P> ExactSizeIterator for UnorderedItems<'_, E, P> {}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};
    use std::collections::BinaryHeap;
    use std::cmp::Reverse;

    impl<E, P: Ord> PriorityQueue<E, P> {
        fn assert_heap(&self) {
            let nodes = self.as_slice();
            for i in 1..nodes.len() {
                let parent = (i - 1) >> ARITY_SHIFT;
                assert!(nodes[parent].1 <= nodes[i].1, "heap order broken at {i}");
            }
        }
    }

    #[test]
    fn dequeues_in_priority_order() {
        let mut q = PriorityQueue::new();
        for (e, p) in [("a", 5), ("b", 1), ("c", 3)] {
            q.enqueue(e, p);
        }
        assert_eq!(q.peek(), Ok(&"b"));
        assert_eq!(q.dequeue(), Ok("b"));
        assert_eq!(q.dequeue(), Ok("c"));
        assert_eq!(q.dequeue(), Ok("a"));
        assert_eq!(q.dequeue(), Err(CollectionError::EmptyQueue));
        assert_eq!(q.peek(), Err(CollectionError::EmptyQueue));
    }

    #[test]
    fn try_enqueue_respects_capacity() {
        let mut q = PriorityQueue::with_capacity(2);
        assert!(q.try_enqueue('x', 2).is_ok());
        assert!(q.try_enqueue('y', 1).is_ok());
        assert_eq!(q.try_enqueue('z', 0), Err(('z', 0)));
        assert_eq!(q.try_peek(), Some((&'y', &1)));
    }

    #[test]
    fn enqueue_dequeue_semantics() {
        let mut q = PriorityQueue::new();
        // Empty: returns the element itself
        assert_eq!(q.enqueue_dequeue("x", 1), "x");
        assert_eq!(q.try_enqueue_dequeue("x", 1), Err("x"));

        q.enqueue("low", 1);
        q.enqueue("mid", 5);
        // Not greater than the root: returned unchanged
        assert_eq!(q.enqueue_dequeue("lower", 0), "lower");
        assert_eq!(q.enqueue_dequeue("same", 1), "same");
        // Greater: root comes out, new pair goes in
        assert_eq!(q.enqueue_dequeue("high", 9), "low");
        assert_eq!(q.dequeue(), Ok("mid"));
        assert_eq!(q.dequeue(), Ok("high"));
    }

    #[test]
    fn dequeue_enqueue_semantics() {
        let mut q = PriorityQueue::new();
        assert_eq!(q.dequeue_enqueue("x", 1), Err(CollectionError::EmptyQueue));
        assert_eq!(q.try_dequeue_enqueue("x", 1), Err("x"));

        q.enqueue("a", 2);
        q.enqueue("b", 4);
        // Smaller priority overwrites the root directly
        assert_eq!(q.dequeue_enqueue("c", 1), Ok("a"));
        assert_eq!(q.try_peek(), Some((&"c", &1)));
        // Larger priority sifts down
        assert_eq!(q.dequeue_enqueue("d", 7), Ok("c"));
        assert_eq!(q.dequeue(), Ok("b"));
        assert_eq!(q.dequeue(), Ok("d"));
    }

    #[test]
    fn randomized_against_binary_heap() {
        let mut rng = SmallRng::seed_from_u64(0x4EA9);
        let mut q = PriorityQueue::new();
        let mut reference = BinaryHeap::new();

        for step in 0..20_000u32 {
            if rng.random_bool(0.55) || reference.is_empty() {
                let p: u16 = rng.random_range(0..500);
                q.enqueue(step, p);
                reference.push(Reverse(p));
            } else {
                let (_, p) = q.try_dequeue().unwrap();
                assert_eq!(Reverse(p), reference.pop().unwrap());
            }
            if step % 1000 == 0 {
                q.assert_heap();
            }
        }
        q.assert_heap();
        assert_eq!(q.len(), reference.len());
    }

    #[test]
    fn unordered_items_is_the_live_multiset() {
        let mut q = PriorityQueue::new();
        // 37 is coprime with 50, so priorities are a permutation of 0..50
        for i in 0..50u32 {
            q.enqueue(i, (i * 37) % 50);
        }
        for _ in 0..10 {
            q.dequeue().unwrap();
        }

        let mut items: Vec<_> = q.unordered_items().map(|(e, p)| (*p, *e)).collect();
        items.sort();
        let mut expected: Vec<_> = (0..50u32).map(|i| ((i * 37) % 50, i)).collect();
        expected.sort();
        assert_eq!(items, expected[10..]);
    }

    #[test]
    fn capacity_and_versions() {
        let mut q: PriorityQueue<u8, u8> = PriorityQueue::new();
        let v = q.version();
        assert_eq!(q.ensure_capacity(10), 10);
        assert_ne!(q.version(), v);
        q.enqueue(1, 1);
        q.trim_excess();
        assert_eq!(q.capacity(), 1);

        let mut c = q.cursor();
        assert_eq!(c.next(&q), Ok(Some((&1, &1))));
        q.clear();
        assert_eq!(c.next(&q), Err(CollectionError::VersionChanged));
    }
}
