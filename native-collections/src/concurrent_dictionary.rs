//! Lock-striped concurrent hash map.
//!
//! Buckets are singly-linked chains of pooled nodes. Readers never lock:
//! they pin the epoch, load the current `Tables` and walk the chain with
//! acquire loads. Writers lock the stripe owning the bucket, check that the
//! tables they locked are still current, and mutate. Published nodes are
//! never written again except for their `next` link; value updates swap in
//! a replacement node.
//!
//! Growing builds a fresh `Tables` (copying every node) while holding every
//! stripe lock, publishes it with one pointer swap and hands the old tables
//! and nodes to the epoch collector.

use std::fmt;
use std::hash::{BuildHasher, Hash};
use std::marker::PhantomData;
use std::ptr::{self, NonNull};
use std::sync::Arc;
use std::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};
use std::thread;

use crossbeam_epoch::{self as epoch, Atomic, Guard, Owned};
use crossbeam_utils::CachePadded;
use native_pool::{NodePool, PoolError, SpinLock, SpinLockGuard};
use rustc_hash::FxBuildHasher;

use crate::hash_helpers::{MAX_PRIME_ARRAY_LENGTH, fast_mod, fast_mod_multiplier, get_prime, hash32};
use crate::CollectionError;

const DEFAULT_CAPACITY: usize = 31;
const MAX_LOCK_COUNT: usize = 1024;

struct Node<K, V> {
    key: K,
    value: V,
    hash: u32,
    next: AtomicPtr<Node<K, V>>,
}

type Nodes<K, V> = Arc<SpinLock<NodePool<Node<K, V>>>>;

/// Bucket array plus the stripe locks guarding it. Each lock holds the
/// number of items in its stripe.
struct Tables<K, V> {
    buckets: Box<[AtomicPtr<Node<K, V>>]>,
    locks: Box<[CachePadded<SpinLock<usize>>]>,
    fast_mod_multiplier: u64,
}

impl<K, V> Tables<K, V> {
    fn new(buckets: usize, locks: usize) -> Self {
        Self {
            buckets: (0..buckets)
                .map(|_| AtomicPtr::new(ptr::null_mut()))
                .collect(),
            locks: (0..locks)
                .map(|_| CachePadded::new(SpinLock::new(0)))
                .collect(),
            fast_mod_multiplier: fast_mod_multiplier(buckets as u32),
        }
    }

    #[inline]
    fn bucket_no(&self, hash: u32) -> usize {
        fast_mod(hash, self.buckets.len() as u32, self.fast_mod_multiplier) as usize
    }

    #[inline]
    fn lock_no(&self, bucket_no: usize) -> usize {
        bucket_no % self.locks.len()
    }

    fn budget(&self) -> usize {
        (self.buckets.len() / self.locks.len()).max(1)
    }

    /// Every node reachable from the buckets.
    ///
    /// Callers hold every stripe lock.
    fn collect_nodes(&self) -> Vec<NonNull<Node<K, V>>> {
        let mut nodes = Vec::new();
        for bucket in self.buckets.iter() {
            let mut node = bucket.load(Ordering::Acquire);
            while let Some(n) = NonNull::new(node) {
                nodes.push(n);
                // SAFETY: chain members stay allocated while the stripe is locked
                node = unsafe { n.as_ref() }.next.load(Ordering::Acquire);
            }
        }
        nodes
    }
}

/// Locks every stripe of `tables` in index order.
fn lock_stripes<K, V>(tables: &Tables<K, V>) -> Vec<SpinLockGuard<'_, usize>> {
    tables.locks.iter().map(|lock| lock.lock()).collect()
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for [`ConcurrentDictionary`].
///
/// # Example
///
/// ```
/// use native_collections::ConcurrentDictionary;
///
/// let map: ConcurrentDictionary<u64, u64> = ConcurrentDictionary::builder()
///     .concurrency_level(8)
///     .capacity(1000)
///     .slab_size(256)
///     .build()
///     .unwrap();
/// assert!(map.try_add(1, 10));
/// ```
pub struct ConcurrentDictionaryBuilder<K, V, S = FxBuildHasher> {
    concurrency_level: usize,
    capacity: usize,
    slab_size: usize,
    max_free_slabs: usize,
    grow_lock_array: bool,
    hasher: S,
    _marker: PhantomData<fn() -> (K, V)>,
}

impl<K, V> Default for ConcurrentDictionaryBuilder<K, V, FxBuildHasher> {
    fn default() -> Self {
        Self {
            concurrency_level: 0,
            capacity: DEFAULT_CAPACITY,
            slab_size: 64,
            max_free_slabs: 4,
            grow_lock_array: true,
            hasher: FxBuildHasher,
            _marker: PhantomData,
        }
    }
}

impl<K, V, S: Clone> Clone for ConcurrentDictionaryBuilder<K, V, S> {
    fn clone(&self) -> Self {
        Self {
            hasher: self.hasher.clone(),
            _marker: PhantomData,
            ..*self
        }
    }
}

impl<K, V, S> fmt::Debug for ConcurrentDictionaryBuilder<K, V, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConcurrentDictionaryBuilder")
            .field("concurrency_level", &self.concurrency_level)
            .field("capacity", &self.capacity)
            .field("slab_size", &self.slab_size)
            .field("max_free_slabs", &self.max_free_slabs)
            .field("grow_lock_array", &self.grow_lock_array)
            .finish_non_exhaustive()
    }
}

impl<K, V, S> ConcurrentDictionaryBuilder<K, V, S> {
    /// Initial number of stripe locks. `0` (the default) uses the available
    /// parallelism.
    pub fn concurrency_level(mut self, level: usize) -> Self {
        self.concurrency_level = level;
        self
    }

    /// Initial bucket count hint, raised to the concurrency level and rounded
    /// up to a table prime. Default 31.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Nodes per pool slab. Default 64.
    pub fn slab_size(mut self, nodes: usize) -> Self {
        self.slab_size = nodes;
        self
    }

    /// Fully free slabs kept cached by the node pool. Default 4.
    pub fn max_free_slabs(mut self, slabs: usize) -> Self {
        self.max_free_slabs = slabs;
        self
    }

    /// Whether growing the table also doubles the stripe locks (up to 1024).
    /// Default true.
    pub fn grow_lock_array(mut self, grow: bool) -> Self {
        self.grow_lock_array = grow;
        self
    }

    /// Replaces the key hasher.
    pub fn hasher<H>(self, hasher: H) -> ConcurrentDictionaryBuilder<K, V, H> {
        ConcurrentDictionaryBuilder {
            concurrency_level: self.concurrency_level,
            capacity: self.capacity,
            slab_size: self.slab_size,
            max_free_slabs: self.max_free_slabs,
            grow_lock_array: self.grow_lock_array,
            hasher,
            _marker: PhantomData,
        }
    }

    /// Builds the dictionary.
    ///
    /// # Errors
    ///
    /// [`PoolError::InvalidArgument`] if the slab size is zero.
    pub fn build(self) -> Result<ConcurrentDictionary<K, V, S>, PoolError> {
        let nodes = NodePool::new(self.slab_size, self.max_free_slabs)?;
        let concurrency = match self.concurrency_level {
            0 => thread::available_parallelism().map_or(1, |n| n.get()),
            n => n,
        };
        let buckets = get_prime(self.capacity.max(concurrency)).min(MAX_PRIME_ARRAY_LENGTH);
        let tables = Tables::new(buckets, concurrency);
        let budget = tables.budget();
        Ok(ConcurrentDictionary {
            tables: Atomic::new(tables),
            budget: CachePadded::new(AtomicUsize::new(budget)),
            grow_lock_array: self.grow_lock_array,
            nodes: Arc::new(SpinLock::new(nodes)),
            hasher: self.hasher,
        })
    }
}

// ============================================================================
// Dictionary
// ============================================================================

/// A thread-safe hash map for plain `Copy` keys and values.
///
/// Reads are lock-free. Writes lock one of several stripes chosen by the
/// key's bucket. [`len`](Self::len), [`is_empty`](Self::is_empty) and
/// [`clear`](Self::clear) lock every stripe.
///
/// # Example
///
/// ```
/// use native_collections::ConcurrentDictionary;
/// use std::sync::Arc;
/// use std::thread;
///
/// let map = Arc::new(ConcurrentDictionary::<u32, u32>::new().unwrap());
/// let handles: Vec<_> = (0..4)
///     .map(|t| {
///         let map = map.clone();
///         thread::spawn(move || {
///             for i in 0..100 {
///                 map.try_add(t * 100 + i, i);
///             }
///         })
///     })
///     .collect();
/// for h in handles {
///     h.join().unwrap();
/// }
/// assert_eq!(map.len(), 400);
/// assert_eq!(map.try_get_value(&205), Some(5));
/// ```
pub struct ConcurrentDictionary<K, V, S = FxBuildHasher> {
    tables: Atomic<Tables<K, V>>,
    /// Items a stripe may hold before an insert tries to grow the table.
    budget: CachePadded<AtomicUsize>,
    grow_lock_array: bool,
    nodes: Nodes<K, V>,
    hasher: S,
}

// SAFETY: keys and values are only copied in and out; nodes and tables are
// reclaimed through the epoch collector
unsafe impl<K: Send + Sync, V: Send + Sync, S: Send> Send for ConcurrentDictionary<K, V, S> {}
unsafe impl<K: Send + Sync, V: Send + Sync, S: Sync> Sync for ConcurrentDictionary<K, V, S> {}

impl<K, V> ConcurrentDictionary<K, V, FxBuildHasher> {
    /// Creates a dictionary with default settings.
    pub fn new() -> Result<Self, PoolError> {
        Self::builder().build()
    }

    /// Returns a builder.
    pub fn builder() -> ConcurrentDictionaryBuilder<K, V> {
        ConcurrentDictionaryBuilder::default()
    }
}

impl<K, V, S> ConcurrentDictionary<K, V, S>
where
    K: Copy + Eq + Hash + Send + Sync,
    V: Copy + Send + Sync,
    S: BuildHasher,
{
    #[inline]
    fn current<'g>(&self, guard: &'g Guard) -> &'g Tables<K, V> {
        // SAFETY: the pointer is never null and retired tables outlive the pin
        unsafe { self.tables.load(Ordering::Acquire, guard).deref() }
    }

    /// Locks the stripe owning `hash` in the current tables.
    fn lock_bucket<'g>(
        &self,
        hash: u32,
        guard: &'g Guard,
    ) -> (&'g Tables<K, V>, usize, SpinLockGuard<'g, usize>) {
        loop {
            let tables = self.current(guard);
            let bucket_no = tables.bucket_no(hash);
            let stripe = tables.locks[tables.lock_no(bucket_no)].lock();
            if ptr::eq(tables, self.current(guard)) {
                return (tables, bucket_no, stripe);
            }
        }
    }

    /// Locks every stripe of the current tables.
    fn lock_all<'g>(&self, guard: &'g Guard) -> (&'g Tables<K, V>, Vec<SpinLockGuard<'g, usize>>) {
        loop {
            let tables = self.current(guard);
            let stripes = lock_stripes(tables);
            if ptr::eq(tables, self.current(guard)) {
                return (tables, stripes);
            }
        }
    }

    #[inline]
    fn alloc_node(&self, key: K, value: V, hash: u32, next: *mut Node<K, V>) -> *mut Node<K, V> {
        self.nodes
            .lock()
            .alloc(Node {
                key,
                value,
                hash,
                next: AtomicPtr::new(next),
            })
            .as_ptr()
    }

    /// Returns `nodes` to the pool once no pinned reader can reach them.
    ///
    /// # Safety
    ///
    /// Every node is unlinked from the live tables and retired only once.
    unsafe fn retire_nodes(&self, nodes: Vec<NonNull<Node<K, V>>>, guard: &Guard) {
        if nodes.is_empty() {
            return;
        }
        let pool = Arc::clone(&self.nodes);
        let release = move || {
            let mut pool = pool.lock();
            for node in nodes {
                // SAFETY: allocated by this pool, unreachable by now
                unsafe { pool.free(node) };
            }
        };
        // SAFETY: the closure touches only the pool it keeps alive
        unsafe { guard.defer_unchecked(release) };
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// The value mapped to `key`.
    pub fn try_get_value(&self, key: &K) -> Option<V> {
        let hash = hash32(&self.hasher, key);
        let guard = epoch::pin();
        let tables = self.current(&guard);
        let mut node = tables.buckets[tables.bucket_no(hash)].load(Ordering::Acquire);
        // SAFETY: nodes reachable from pinned tables are not freed yet
        while let Some(n) = unsafe { node.as_ref() } {
            if n.hash == hash && n.key == *key {
                return Some(n.value);
            }
            node = n.next.load(Ordering::Acquire);
        }
        None
    }

    /// Returns `true` if `key` is present.
    #[inline]
    pub fn contains_key(&self, key: &K) -> bool {
        self.try_get_value(key).is_some()
    }

    /// The value mapped to `key`.
    ///
    /// # Errors
    ///
    /// [`CollectionError::KeyNotFound`] on a miss.
    pub fn get(&self, key: &K) -> Result<V, CollectionError> {
        self.try_get_value(key).ok_or(CollectionError::KeyNotFound)
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Adds `key` or, with `update_if_exists`, replaces its value.
    /// Returns whether a new entry was added and the value now mapped.
    fn add_internal(&self, key: K, value: V, update_if_exists: bool) -> (bool, V) {
        let hash = hash32(&self.hasher, &key);
        let guard = epoch::pin();
        let grow_from = {
            let (tables, bucket_no, mut count) = self.lock_bucket(hash, &guard);
            let bucket = &tables.buckets[bucket_no];
            let mut link = bucket;
            let mut node = link.load(Ordering::Acquire);
            // SAFETY: the stripe lock keeps the chain stable
            while let Some(n) = unsafe { node.as_ref() } {
                if n.hash == hash && n.key == key {
                    if !update_if_exists {
                        return (false, n.value);
                    }
                    let next = n.next.load(Ordering::Acquire);
                    link.store(self.alloc_node(key, value, hash, next), Ordering::Release);
                    // SAFETY: just unlinked
                    unsafe { self.retire_nodes(vec![NonNull::from(n)], &guard) };
                    return (false, value);
                }
                link = &n.next;
                node = link.load(Ordering::Acquire);
            }

            let head = bucket.load(Ordering::Acquire);
            bucket.store(self.alloc_node(key, value, hash, head), Ordering::Release);
            *count += 1;
            (*count > self.budget.load(Ordering::Relaxed)).then_some(tables as *const Tables<K, V>)
        };

        if let Some(observed) = grow_from {
            self.grow_table(observed, &guard);
        }
        (true, value)
    }

    /// Adds `key` mapped to `value` unless `key` is present. Returns `true`
    /// if added.
    pub fn try_add(&self, key: K, value: V) -> bool {
        self.add_internal(key, value, false).0
    }

    /// Maps `key` to `value`, adding or replacing.
    pub fn insert(&self, key: K, value: V) {
        self.add_internal(key, value, true);
    }

    /// The value mapped to `key`, adding `value` first if `key` is absent.
    pub fn get_or_add(&self, key: K, value: V) -> V {
        match self.try_get_value(&key) {
            Some(existing) => existing,
            None => self.add_internal(key, value, false).1,
        }
    }

    /// The value mapped to `key`, adding `make(key)` first if `key` is
    /// absent. `make` may run even when another thread wins the race.
    pub fn get_or_add_with<F: FnOnce(&K) -> V>(&self, key: K, make: F) -> V {
        match self.try_get_value(&key) {
            Some(existing) => existing,
            None => {
                let value = make(&key);
                self.add_internal(key, value, false).1
            }
        }
    }

    /// Unlinks the entry for `key` if `accept` approves its value.
    fn remove_internal(&self, key: &K, accept: impl FnOnce(&V) -> bool) -> Option<V> {
        let hash = hash32(&self.hasher, key);
        let guard = epoch::pin();
        let (tables, bucket_no, mut count) = self.lock_bucket(hash, &guard);
        let mut link = &tables.buckets[bucket_no];
        let mut node = link.load(Ordering::Acquire);
        // SAFETY: the stripe lock keeps the chain stable
        while let Some(n) = unsafe { node.as_ref() } {
            if n.hash == hash && n.key == *key {
                if !accept(&n.value) {
                    return None;
                }
                link.store(n.next.load(Ordering::Acquire), Ordering::Release);
                *count -= 1;
                let value = n.value;
                // SAFETY: just unlinked
                unsafe { self.retire_nodes(vec![NonNull::from(n)], &guard) };
                return Some(value);
            }
            link = &n.next;
            node = link.load(Ordering::Acquire);
        }
        None
    }

    /// Removes `key`, returning its value.
    pub fn try_remove(&self, key: &K) -> Option<V> {
        self.remove_internal(key, |_| true)
    }

    /// Removes `key` only if it maps to `value`. Returns `true` if removed.
    pub fn try_remove_if(&self, key: &K, value: &V) -> bool
    where
        V: PartialEq,
    {
        self.remove_internal(key, |current| current == value).is_some()
    }

    /// Replaces the value of `key` with `new_value` if it currently equals
    /// `comparison`. Returns `true` if replaced.
    pub fn try_update(&self, key: &K, new_value: V, comparison: &V) -> bool
    where
        V: PartialEq,
    {
        let hash = hash32(&self.hasher, key);
        let guard = epoch::pin();
        let (tables, bucket_no, _stripe) = self.lock_bucket(hash, &guard);
        let mut link = &tables.buckets[bucket_no];
        let mut node = link.load(Ordering::Acquire);
        // SAFETY: the stripe lock keeps the chain stable
        while let Some(n) = unsafe { node.as_ref() } {
            if n.hash == hash && n.key == *key {
                if n.value != *comparison {
                    return false;
                }
                let next = n.next.load(Ordering::Acquire);
                link.store(self.alloc_node(*key, new_value, hash, next), Ordering::Release);
                // SAFETY: just unlinked
                unsafe { self.retire_nodes(vec![NonNull::from(n)], &guard) };
                return true;
            }
            link = &n.next;
            node = link.load(Ordering::Acquire);
        }
        false
    }

    // ========================================================================
    // Whole-table operations
    // ========================================================================

    /// Number of entries. Locks every stripe.
    pub fn len(&self) -> usize {
        let guard = epoch::pin();
        let (_, stripes) = self.lock_all(&guard);
        stripes.iter().map(|count| **count).sum()
    }

    /// Returns `true` if there are no entries. Locks every stripe.
    pub fn is_empty(&self) -> bool {
        let guard = epoch::pin();
        let (_, stripes) = self.lock_all(&guard);
        stripes.iter().all(|count| **count == 0)
    }

    /// Removes every entry and shrinks back to the default bucket count.
    pub fn clear(&self) {
        let guard = epoch::pin();
        let (tables, stripes) = self.lock_all(&guard);
        if stripes.iter().all(|count| **count == 0) {
            return;
        }
        let retired = tables.collect_nodes();
        let fresh = Tables::new(get_prime(DEFAULT_CAPACITY), tables.locks.len());
        self.budget.store(fresh.budget(), Ordering::Relaxed);
        let old = self.tables.swap(Owned::new(fresh), Ordering::AcqRel, &guard);
        // SAFETY: `old` and its nodes are unreachable from the new tables
        unsafe {
            guard.defer_destroy(old);
            self.retire_nodes(retired, &guard);
        }
        drop(stripes);
    }

    /// Grows the bucket array, or raises the budget if the table is sparse.
    ///
    /// Does nothing if `observed` is no longer the current tables.
    #[cold]
    fn grow_table(&self, observed: *const Tables<K, V>, guard: &Guard) {
        let tables = self.current(guard);
        if !ptr::eq(tables, observed) {
            return;
        }
        let stripes = lock_stripes(tables);
        if !ptr::eq(tables, self.current(guard)) {
            return;
        }

        let old_buckets = tables.buckets.len();
        let len: usize = stripes.iter().map(|count| **count).sum();
        if len < old_buckets / 4 {
            let budget = self.budget.load(Ordering::Relaxed).saturating_mul(2);
            self.budget.store(budget, Ordering::Relaxed);
            log::debug!(
                "concurrent dictionary sparse ({len} items in {old_buckets} buckets), budget raised to {budget}"
            );
            return;
        }

        let mut new_buckets = get_prime(old_buckets.saturating_mul(2));
        let at_max = new_buckets >= MAX_PRIME_ARRAY_LENGTH;
        if at_max {
            new_buckets = MAX_PRIME_ARRAY_LENGTH;
        }
        let old_locks = tables.locks.len();
        let new_locks = if self.grow_lock_array && old_locks < MAX_LOCK_COUNT {
            old_locks * 2
        } else {
            old_locks
        };

        let mut fresh = Tables::new(new_buckets, new_locks);
        let mut tails: Vec<*mut Node<K, V>> = vec![ptr::null_mut(); new_buckets];
        let retired = tables.collect_nodes();
        {
            let mut pool = self.nodes.lock();
            for &old in &retired {
                // SAFETY: old nodes stay allocated until retired below
                let old = unsafe { old.as_ref() };
                let bucket_no = fresh.bucket_no(old.hash);
                let lock_no = fresh.lock_no(bucket_no);
                let copy = pool
                    .alloc(Node {
                        key: old.key,
                        value: old.value,
                        hash: old.hash,
                        next: AtomicPtr::new(ptr::null_mut()),
                    })
                    .as_ptr();
                match NonNull::new(tails[bucket_no]) {
                    // SAFETY: tail is a node of `fresh`, not yet published
                    Some(tail) => unsafe { tail.as_ref() }.next.store(copy, Ordering::Relaxed),
                    None => fresh.buckets[bucket_no].store(copy, Ordering::Relaxed),
                }
                tails[bucket_no] = copy;
                *fresh.locks[lock_no].get_mut() += 1;
            }
        }

        let budget = if at_max { usize::MAX } else { fresh.budget() };
        self.budget.store(budget, Ordering::Relaxed);
        let old = self.tables.swap(Owned::new(fresh), Ordering::AcqRel, guard);
        // SAFETY: `old` and its nodes are unreachable from the new tables
        unsafe {
            guard.defer_destroy(old);
            self.retire_nodes(retired, guard);
        }
        drop(stripes);
        log::debug!(
            "concurrent dictionary resized: {old_buckets} -> {new_buckets} buckets, {old_locks} -> {new_locks} locks"
        );
    }

    // ========================================================================
    // Enumeration
    // ========================================================================

    /// Iterates a weakly consistent view of the entries.
    ///
    /// Never blocks and never fails. Entries added or removed during the
    /// walk may or may not be observed.
    pub fn iter(&self) -> Iter<'_, K, V, S> {
        let guard = epoch::pin();
        let tables = self.tables.load(Ordering::Acquire, &guard).as_raw();
        Iter {
            _dict: self,
            guard,
            tables,
            bucket: 0,
            node: ptr::null(),
        }
    }

    /// Iterates keys, weakly consistent.
    pub fn keys(&self) -> impl Iterator<Item = K> + '_ {
        self.iter().map(|(k, _)| k)
    }

    /// Iterates values, weakly consistent.
    pub fn values(&self) -> impl Iterator<Item = V> + '_ {
        self.iter().map(|(_, v)| v)
    }

    /// Snapshot of the entries.
    pub fn to_vec(&self) -> Vec<(K, V)> {
        self.iter().collect()
    }
}

impl<K, V, S> Drop for ConcurrentDictionary<K, V, S> {
    fn drop(&mut self) {
        // SAFETY: `&mut self` means no reader holds the tables; nodes go
        // away with the pool
        unsafe {
            let tables = self.tables.load(Ordering::Relaxed, epoch::unprotected());
            drop(tables.into_owned());
        }
    }
}

impl<K, V, S> fmt::Debug for ConcurrentDictionary<K, V, S>
where
    K: Copy + Eq + Hash + Send + Sync + fmt::Debug,
    V: Copy + Send + Sync + fmt::Debug,
    S: BuildHasher,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

/// Weakly consistent iterator over `(K, V)` copies.
pub struct Iter<'a, K, V, S> {
    _dict: &'a ConcurrentDictionary<K, V, S>,
    // keeps `tables` and its nodes alive
    guard: Guard,
    tables: *const Tables<K, V>,
    bucket: usize,
    node: *const Node<K, V>,
}

impl<K: Copy, V: Copy, S> Iterator for Iter<'_, K, V, S> {
    type Item = (K, V);

    fn next(&mut self) -> Option<(K, V)> {
        // SAFETY: the tables and every node reachable from them stay
        // allocated while `self.guard` is pinned
        let tables = unsafe { &*self.tables };
        loop {
            if let Some(node) = unsafe { self.node.as_ref() } {
                self.node = node.next.load(Ordering::Acquire);
                return Some((node.key, node.value));
            }
            let bucket = tables.buckets.get(self.bucket)?;
            self.bucket += 1;
            self.node = bucket.load(Ordering::Acquire);
        }
    }
}

impl<K, V, S> fmt::Debug for Iter<'_, K, V, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Iter")
            .field("bucket", &self.bucket)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small() -> ConcurrentDictionary<u32, u32> {
        ConcurrentDictionary::builder()
            .concurrency_level(2)
            .capacity(0)
            .slab_size(16)
            .build()
            .unwrap()
    }

    fn bucket_count<K, V, S>(map: &ConcurrentDictionary<K, V, S>) -> (usize, usize)
    where
        K: Copy + Eq + Hash + Send + Sync,
        V: Copy + Send + Sync,
        S: BuildHasher,
    {
        let guard = epoch::pin();
        let tables = map.current(&guard);
        (tables.buckets.len(), tables.locks.len())
    }

    #[test]
    fn builder_rounds_capacity() {
        let map = small();
        assert_eq!(bucket_count(&map), (3, 2));

        let map: ConcurrentDictionary<u8, u8> = ConcurrentDictionary::builder()
            .concurrency_level(4)
            .capacity(100)
            .build()
            .unwrap();
        assert_eq!(bucket_count(&map), (107, 4));

        assert!(
            ConcurrentDictionary::<u8, u8>::builder()
                .slab_size(0)
                .build()
                .is_err()
        );
    }

    #[test]
    fn builder_infers_types_from_the_binding() {
        let map: ConcurrentDictionary<u64, u64> = ConcurrentDictionary::builder()
            .concurrency_level(8)
            .capacity(1000)
            .slab_size(256)
            .build()
            .unwrap();
        assert!(map.try_add(1, 10));
        assert_eq!(map.get(&1), Ok(10));

        let builder = ConcurrentDictionary::<u32, u64>::builder()
            .max_free_slabs(1)
            .hasher(std::hash::RandomState::new());
        let copy = builder.clone();
        assert!(format!("{copy:?}").contains("max_free_slabs: 1"));
        let map = builder.build().unwrap();
        map.insert(3, 30);
        assert_eq!(map.try_get_value(&3), Some(30));
        assert!(copy.build().unwrap().is_empty());
    }

    #[test]
    fn add_get_remove() {
        let map = small();
        assert!(map.try_add(1, 10));
        assert!(!map.try_add(1, 11));
        assert_eq!(map.try_get_value(&1), Some(10));
        assert_eq!(map.get(&2), Err(CollectionError::KeyNotFound));
        assert!(map.contains_key(&1));

        assert!(!map.try_remove_if(&1, &11));
        assert!(map.try_remove_if(&1, &10));
        assert_eq!(map.try_remove(&1), None);
        assert!(map.is_empty());
    }

    #[test]
    fn update_and_upsert() {
        let map = small();
        map.insert(5, 1);
        map.insert(5, 2);
        assert_eq!(map.len(), 1);
        assert!(!map.try_update(&5, 3, &1));
        assert!(map.try_update(&5, 3, &2));
        assert_eq!(map.get(&5), Ok(3));
        assert!(!map.try_update(&6, 0, &0));

        assert_eq!(map.get_or_add(5, 100), 3);
        assert_eq!(map.get_or_add(6, 100), 100);
        assert_eq!(map.get_or_add_with(7, |k| k * 2), 14);
        assert_eq!(map.get_or_add_with(7, |_| unreachable!()), 14);
    }

    #[test]
    fn grows_and_keeps_every_entry() {
        let map = small();
        for i in 0..1000 {
            assert!(map.try_add(i, i + 1));
        }
        let (buckets, locks) = bucket_count(&map);
        assert!(buckets > 3);
        assert!(locks > 2);
        assert_eq!(map.len(), 1000);
        for i in 0..1000 {
            assert_eq!(map.try_get_value(&i), Some(i + 1));
        }
        let mut entries = map.to_vec();
        entries.sort_unstable();
        assert_eq!(entries, (0..1000).map(|i| (i, i + 1)).collect::<Vec<_>>());
    }

    #[test]
    fn lock_array_stays_fixed_when_disabled() {
        let map: ConcurrentDictionary<u32, u32> = ConcurrentDictionary::builder()
            .concurrency_level(2)
            .capacity(0)
            .grow_lock_array(false)
            .build()
            .unwrap();
        for i in 0..500 {
            map.insert(i, i);
        }
        assert_eq!(bucket_count(&map).1, 2);
        assert_eq!(map.len(), 500);
    }

    #[test]
    fn clear_resets_to_default_size() {
        let map = small();
        for i in 0..300 {
            map.insert(i, i);
        }
        map.clear();
        assert!(map.is_empty());
        assert_eq!(map.iter().count(), 0);
        assert_eq!(bucket_count(&map).0, 37);
        map.insert(1, 1);
        assert_eq!(map.keys().collect::<Vec<_>>(), vec![1]);
        assert_eq!(map.values().collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn nodes_land_in_their_buckets() {
        let map = small();
        for i in 0..64 {
            map.insert(i, i);
        }
        let guard = epoch::pin();
        let tables = map.current(&guard);
        for bucket in tables.buckets.iter() {
            let mut node = bucket.load(Ordering::Acquire);
            while let Some(n) = unsafe { node.as_ref() } {
                assert_eq!(tables.bucket_no(n.hash), tables.bucket_no(hash32(&map.hasher, &n.key)));
                node = n.next.load(Ordering::Acquire);
            }
        }
    }
}
