//! Lock-free LIFO stack (Treiber stack) over pooled nodes.
//!
//! Nodes are rented from a [`NodePool`] behind a spin lock. Popped nodes go
//! back to the pool through epoch-based reclamation, which also rules out
//! ABA on the head pointer.

use std::fmt;
use std::mem::ManuallyDrop;
use std::ptr::{self, NonNull};
use std::sync::Arc;
use std::sync::atomic::{AtomicPtr, Ordering};

use crossbeam_epoch as epoch;
use crossbeam_utils::{Backoff, CachePadded};
use native_pool::{NodePool, PoolError, SpinLock};

struct Node<T> {
    value: ManuallyDrop<T>,
    next: *mut Node<T>,
}

struct NodeSlab<T>(NodePool<Node<T>>);

// SAFETY: nodes only carry T between threads
unsafe impl<T: Send> Send for NodeSlab<T> {}

/// An unbounded lock-free LIFO stack.
///
/// # Example
///
/// ```
/// use native_queue::ConcurrentStack;
///
/// let stack = ConcurrentStack::new().unwrap();
/// stack.push(1);
/// stack.push(2);
/// assert_eq!(stack.len(), 2);
/// assert_eq!(stack.try_pop(), Some(2));
/// assert_eq!(stack.try_pop(), Some(1));
/// assert_eq!(stack.try_pop(), None);
/// ```
pub struct ConcurrentStack<T> {
    head: CachePadded<AtomicPtr<Node<T>>>,
    nodes: Arc<SpinLock<NodeSlab<T>>>,
}

// SAFETY: values move between threads through the head CAS only
unsafe impl<T: Send> Send for ConcurrentStack<T> {}
unsafe impl<T: Send> Sync for ConcurrentStack<T> {}

impl<T> ConcurrentStack<T> {
    /// Creates a stack with 64 nodes per slab and one cached free slab.
    pub fn new() -> Result<Self, PoolError> {
        Self::with_slab_size(64, 1)
    }

    /// Creates a stack with `blocks_per_slab` nodes per pool slab.
    pub fn with_slab_size(blocks_per_slab: usize, max_free_slabs: usize) -> Result<Self, PoolError> {
        Ok(Self {
            head: CachePadded::new(AtomicPtr::new(ptr::null_mut())),
            nodes: Arc::new(SpinLock::new(NodeSlab(NodePool::new(
                blocks_per_slab,
                max_free_slabs,
            )?))),
        })
    }

    /// Pushes a value on top.
    pub fn push(&self, value: T) {
        let node = self
            .nodes
            .lock()
            .0
            .alloc(Node {
                value: ManuallyDrop::new(value),
                next: ptr::null_mut(),
            })
            .as_ptr();

        let backoff = Backoff::new();
        let mut head = self.head.load(Ordering::Relaxed);
        loop {
            // SAFETY: node is unpublished and exclusively ours
            unsafe { (*node).next = head };
            match self
                .head
                .compare_exchange_weak(head, node, Ordering::Release, Ordering::Relaxed)
            {
                Ok(_) => return,
                Err(current) => {
                    head = current;
                    backoff.spin();
                }
            }
        }
    }

    /// Pops the top value, or `None` if the stack is empty.
    pub fn try_pop(&self) -> Option<T> {
        let guard = epoch::pin();
        let backoff = Backoff::new();
        loop {
            let head = self.head.load(Ordering::Acquire);
            if head.is_null() {
                return None;
            }
            // SAFETY: head cannot be released while we are pinned
            let next = unsafe { (*head).next };
            if self
                .head
                .compare_exchange_weak(head, next, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                // SAFETY: the CAS made us the node's sole owner
                let value = unsafe { ManuallyDrop::take(&mut (*head).value) };
                let nodes = Arc::clone(&self.nodes);
                let node = NonNull::from(unsafe { &mut *head });
                // SAFETY: released once no pinned thread can read `next`
                unsafe { guard.defer_unchecked(move || nodes.lock().0.free(node)) };
                return Some(value);
            }
            backoff.snooze();
        }
    }

    /// Returns `true` if the stack holds no values.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.head.load(Ordering::Acquire).is_null()
    }

    /// Number of values, counted by walking the nodes.
    pub fn len(&self) -> usize {
        let _guard = epoch::pin();
        let mut count = 0;
        let mut node = self.head.load(Ordering::Acquire);
        while !node.is_null() {
            count += 1;
            // SAFETY: pinned; popped nodes outlive the guard
            node = unsafe { (*node).next };
        }
        count
    }

    /// Drops every value.
    pub fn clear(&self) {
        let guard = epoch::pin();
        let mut node = self.head.swap(ptr::null_mut(), Ordering::AcqRel);
        while let Some(mut current) = NonNull::new(node) {
            // SAFETY: the swap detached the chain; it is ours alone
            unsafe {
                node = current.as_ref().next;
                ManuallyDrop::drop(&mut current.as_mut().value);
                let nodes = Arc::clone(&self.nodes);
                guard.defer_unchecked(move || nodes.lock().0.free(current));
            }
        }
    }
}

impl<T> Drop for ConcurrentStack<T> {
    fn drop(&mut self) {
        let mut nodes = self.nodes.lock();
        let mut node = *self.head.get_mut();
        while let Some(mut current) = NonNull::new(node) {
            // SAFETY: exclusive access to the whole chain
            unsafe {
                node = current.as_ref().next;
                ManuallyDrop::drop(&mut current.as_mut().value);
                nodes.0.free(current);
            }
        }
    }
}

impl<T> fmt::Debug for ConcurrentStack<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConcurrentStack")
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::AtomicUsize;
    use std::thread;

    #[test]
    fn lifo_order() {
        let s = ConcurrentStack::new().unwrap();
        for i in 0..200 {
            s.push(i);
        }
        assert_eq!(s.len(), 200);
        for i in (0..200).rev() {
            assert_eq!(s.try_pop(), Some(i));
        }
        assert!(s.is_empty());
        assert_eq!(s.try_pop(), None);
    }

    #[test]
    fn zero_slab_size_rejected() {
        assert!(ConcurrentStack::<u8>::with_slab_size(0, 1).is_err());
    }

    struct DropCounter(Arc<AtomicUsize>);

    impl Drop for DropCounter {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn clear_and_drop_release_values() {
        let drops = Arc::new(AtomicUsize::new(0));
        let s = ConcurrentStack::new().unwrap();
        for _ in 0..10 {
            s.push(DropCounter(drops.clone()));
        }
        s.clear();
        assert_eq!(drops.load(Ordering::SeqCst), 10);
        assert!(s.is_empty());

        for _ in 0..5 {
            s.push(DropCounter(drops.clone()));
        }
        drop(s);
        assert_eq!(drops.load(Ordering::SeqCst), 15);
    }

    #[test]
    fn concurrent_push_pop() {
        const THREADS: usize = 4;
        const PER_THREAD: usize = 5_000;

        let s = Arc::new(ConcurrentStack::new().unwrap());
        let handles: Vec<_> = (0..THREADS)
            .map(|t| {
                let s = s.clone();
                thread::spawn(move || {
                    let mut popped = Vec::new();
                    for i in 0..PER_THREAD {
                        s.push(t * PER_THREAD + i);
                        if i % 2 == 0 {
                            popped.extend(s.try_pop());
                        }
                    }
                    popped
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for h in handles {
            for v in h.join().unwrap() {
                assert!(seen.insert(v));
            }
        }
        while let Some(v) = s.try_pop() {
            assert!(seen.insert(v));
        }
        assert_eq!(seen.len(), THREADS * PER_THREAD);
    }
}
