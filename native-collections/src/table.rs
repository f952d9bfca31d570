//! Chained hash table shared by [`Dictionary`](crate::Dictionary) and
//! [`HashSet`](crate::HashSet).
//!
//! Entries live densely in one array; buckets hold `entry index + 1` of each
//! chain's head, `0` meaning empty. Removed entries are threaded onto a free
//! list through their `next` field, encoded as `START_OF_FREE_LIST - next
//! free index`, so a live entry always has `next >= -1` and a free one
//! `next <= -2`.

use std::borrow::Borrow;
use std::mem::MaybeUninit;
use std::ptr;

use native_pool::RawBuffer;

use crate::hash_helpers::{
    MAX_PRIME_ARRAY_LENGTH, expand_prime, fast_mod, fast_mod_multiplier, get_prime,
};
use crate::CollectionError;

const START_OF_FREE_LIST: i32 = -3;

pub(crate) struct Entry<K, V> {
    hash_code: u32,
    next: i32,
    key: MaybeUninit<K>,
    value: MaybeUninit<V>,
}

impl<K, V> Entry<K, V> {
    #[inline]
    fn is_live(&self) -> bool {
        self.next >= -1
    }

    /// # Safety
    ///
    /// The entry is live.
    #[inline]
    pub(crate) unsafe fn key(&self) -> &K {
        unsafe { self.key.assume_init_ref() }
    }

    /// # Safety
    ///
    /// The entry is live.
    #[inline]
    pub(crate) unsafe fn value(&self) -> &V {
        unsafe { self.value.assume_init_ref() }
    }

    /// # Safety
    ///
    /// The entry is live.
    #[inline]
    pub(crate) unsafe fn value_mut(&mut self) -> &mut V {
        unsafe { self.value.assume_init_mut() }
    }
}

/// Outcome of a chain walk.
pub(crate) enum Probe {
    Found(usize),
    Vacant,
}

pub(crate) struct RawTable<K, V> {
    buckets: RawBuffer<i32>,
    entries: RawBuffer<Entry<K, V>>,
    /// High-water mark: entries `[0, count)` have been used at least once.
    count: usize,
    free_list: i32,
    free_count: usize,
    fast_mod_multiplier: u64,
    version: u32,
}

// SAFETY: the table uniquely owns its keys and values
unsafe impl<K: Send, V: Send> Send for RawTable<K, V> {}

impl<K, V> RawTable<K, V> {
    pub(crate) const fn new() -> Self {
        Self {
            buckets: RawBuffer::new(),
            entries: RawBuffer::new(),
            count: 0,
            free_list: -1,
            free_count: 0,
            fast_mod_multiplier: 0,
            version: 0,
        }
    }

    pub(crate) fn with_capacity(capacity: usize) -> Self {
        let mut table = Self::new();
        if capacity > 0 {
            table.initialize(capacity);
        }
        table
    }

    fn initialize(&mut self, capacity: usize) {
        let size = get_prime(capacity);
        self.buckets = RawBuffer::with_capacity_zeroed(size);
        self.entries = RawBuffer::with_capacity(size);
        self.free_list = -1;
        self.fast_mod_multiplier = fast_mod_multiplier(size as u32);
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.count - self.free_count
    }

    #[inline]
    pub(crate) fn capacity(&self) -> usize {
        self.entries.capacity()
    }

    #[inline]
    pub(crate) fn version(&self) -> u32 {
        self.version
    }

    #[inline]
    pub(crate) fn entries_ptr(&self) -> *const u8 {
        self.entries.as_ptr().cast()
    }

    #[inline]
    fn bump(&mut self) {
        self.version = self.version.wrapping_add(1);
    }

    #[inline]
    fn bucket_slot(&self, hash_code: u32) -> *mut i32 {
        let len = self.buckets.capacity() as u32;
        let index = fast_mod(hash_code, len, self.fast_mod_multiplier);
        // SAFETY: index < bucket count
        unsafe { self.buckets.slot(index as usize) }
    }

    #[inline]
    fn entry(&self, index: usize) -> &Entry<K, V> {
        debug_assert!(index < self.count);
        // SAFETY: entries below `count` have initialized headers
        unsafe { &*self.entries.slot(index) }
    }

    #[inline]
    fn entry_mut(&mut self, index: usize) -> &mut Entry<K, V> {
        debug_assert!(index < self.count);
        // SAFETY: as in `entry`
        unsafe { &mut *self.entries.slot(index) }
    }

    /// Live entry at `index`, if any.
    #[inline]
    pub(crate) fn live(&self, index: usize) -> Option<&Entry<K, V>> {
        if index >= self.count {
            return None;
        }
        let entry = self.entry(index);
        entry.is_live().then_some(entry)
    }

    /// Live entry at `index` with mutable access to its value.
    #[inline]
    pub(crate) fn live_mut(&mut self, index: usize) -> Option<&mut Entry<K, V>> {
        if index >= self.count {
            return None;
        }
        let entry = self.entry_mut(index);
        entry.is_live().then_some(entry)
    }

    /// Index range covering every entry ever used.
    #[inline]
    pub(crate) fn high_water(&self) -> usize {
        self.count
    }

    // ========================================================================
    // Lookup
    // ========================================================================

    /// Walks the chain for `hash_code` looking for `key`.
    pub(crate) fn probe<Q>(&self, hash_code: u32, key: &Q) -> Result<Probe, CollectionError>
    where
        K: Borrow<Q>,
        Q: Eq + ?Sized,
    {
        if self.buckets.capacity() == 0 {
            return Ok(Probe::Vacant);
        }
        // SAFETY: bucket slots are initialized (zeroed at allocation)
        let mut i = unsafe { *self.bucket_slot(hash_code) } - 1;
        let mut steps = 0usize;
        while i >= 0 {
            let entry = self.entry(i as usize);
            // SAFETY: chain members are live
            if entry.hash_code == hash_code
                && <K as Borrow<Q>>::borrow(unsafe { entry.key() }) == key {
                return Ok(Probe::Found(i as usize));
            }
            i = entry.next;
            steps += 1;
            if steps > self.entries.capacity() {
                return Err(CollectionError::ConcurrentOperationsNotSupported);
            }
        }
        Ok(Probe::Vacant)
    }

    /// Like [`probe`](Self::probe), collapsing a detected cycle to a miss.
    ///
    /// Exclusive `&mut` access rules out the interleavings that corrupt a
    /// chain, so a cycle means a broken `Hash`/`Eq` pair.
    #[inline]
    pub(crate) fn find<Q>(&self, hash_code: u32, key: &Q) -> Option<usize>
    where
        K: Borrow<Q>,
        Q: Eq + ?Sized,
    {
        match self.probe(hash_code, key) {
            Ok(Probe::Found(i)) => Some(i),
            Ok(Probe::Vacant) => None,
            Err(e) => {
                debug_assert!(false, "{e}");
                None
            }
        }
    }

    // ========================================================================
    // Insertion
    // ========================================================================

    /// Inserts a key known to be absent. Returns its entry index.
    pub(crate) fn insert_vacant(&mut self, hash_code: u32, key: K, value: V) -> usize {
        if self.buckets.capacity() == 0 {
            self.initialize(0);
        }

        let index = if self.free_count > 0 {
            let index = self.free_list as usize;
            self.free_list = START_OF_FREE_LIST - self.entry(index).next;
            self.free_count -= 1;
            index
        } else {
            if self.count == self.entries.capacity() {
                self.resize(expand_prime(self.count));
            }
            self.count += 1;
            self.count - 1
        };

        let bucket = self.bucket_slot(hash_code);
        // SAFETY: index < count <= capacity; the slot is vacant
        unsafe {
            self.entries.slot(index).write(Entry {
                hash_code,
                next: *bucket - 1,
                key: MaybeUninit::new(key),
                value: MaybeUninit::new(value),
            });
            *bucket = index as i32 + 1;
        }
        self.bump();
        index
    }

    // ========================================================================
    // Removal
    // ========================================================================

    /// Unlinks the entry for `key` and moves its key and value out.
    pub(crate) fn remove<Q>(&mut self, hash_code: u32, key: &Q) -> Option<(K, V)>
    where
        K: Borrow<Q>,
        Q: Eq + ?Sized,
    {
        if self.buckets.capacity() == 0 {
            return None;
        }
        let bucket = self.bucket_slot(hash_code);
        let mut last = -1i32;
        // SAFETY: bucket slots are initialized
        let mut i = unsafe { *bucket } - 1;
        let mut steps = 0usize;
        while i >= 0 {
            let entry = self.entry(i as usize);
            let next = entry.next;
            // SAFETY: chain members are live
            if entry.hash_code == hash_code
                && <K as Borrow<Q>>::borrow(unsafe { entry.key() }) == key {
                if last < 0 {
                    // SAFETY: bucket slot is in range
                    unsafe { *bucket = next + 1 };
                } else {
                    self.entry_mut(last as usize).next = next;
                }
                let free_link = START_OF_FREE_LIST - self.free_list;
                let entry = self.entry_mut(i as usize);
                // SAFETY: the entry was live; it is marked free right after
                let pair = unsafe { (entry.key.assume_init_read(), entry.value.assume_init_read()) };
                entry.next = free_link;
                self.free_list = i;
                self.free_count += 1;
                self.bump();
                return Some(pair);
            }
            last = i;
            i = next;
            steps += 1;
            if steps > self.entries.capacity() {
                debug_assert!(false, "{}", CollectionError::ConcurrentOperationsNotSupported);
                return None;
            }
        }
        None
    }

    // ========================================================================
    // Capacity
    // ========================================================================

    /// Reallocates entries to `new_size` and rebuilds every chain in place.
    fn resize(&mut self, new_size: usize) {
        debug_assert!(new_size >= self.count);
        // SAFETY: entries past `count` are uninitialized; none are lost
        unsafe { self.entries.resize(new_size) };
        self.buckets = RawBuffer::with_capacity_zeroed(new_size);
        self.fast_mod_multiplier = fast_mod_multiplier(new_size as u32);

        for i in 0..self.count {
            let entry = self.entry(i);
            if !entry.is_live() {
                continue;
            }
            let bucket = self.bucket_slot(entry.hash_code);
            // SAFETY: bucket slot is in range
            unsafe {
                self.entry_mut(i).next = *bucket - 1;
                *bucket = i as i32 + 1;
            }
        }
        log::trace!("hash table resized to {new_size} entries");
    }

    pub(crate) fn ensure_capacity(&mut self, capacity: usize) -> Result<usize, CollectionError> {
        if capacity > MAX_PRIME_ARRAY_LENGTH {
            return Err(CollectionError::invalid(
                "capacity",
                capacity,
                "exceeds the largest hash table size",
            ));
        }
        let current = self.entries.capacity();
        if current >= capacity {
            return Ok(current);
        }
        let new_size = get_prime(capacity);
        if self.buckets.capacity() == 0 {
            self.initialize(new_size);
        } else {
            self.resize(new_size);
        }
        self.bump();
        Ok(new_size)
    }

    /// Compacts live entries into an array of `get_prime(capacity)` entries.
    pub(crate) fn trim_excess_to(&mut self, capacity: usize) -> Result<usize, CollectionError> {
        let len = self.len();
        if capacity < len {
            return Err(CollectionError::CapacityTooSmall { capacity, len });
        }
        let new_size = get_prime(capacity);
        let current = self.entries.capacity();
        if new_size >= current {
            return Ok(current);
        }

        let old = std::mem::replace(&mut self.entries, RawBuffer::with_capacity(new_size));
        let old_count = self.count;
        self.buckets = RawBuffer::with_capacity_zeroed(new_size);
        self.fast_mod_multiplier = fast_mod_multiplier(new_size as u32);
        self.count = 0;
        self.free_list = -1;
        self.free_count = 0;

        for i in 0..old_count {
            // SAFETY: i < old count; live entries are moved bitwise exactly once
            unsafe {
                let src = old.slot(i);
                if !(*src).is_live() {
                    continue;
                }
                let bucket = self.bucket_slot((*src).hash_code);
                let dst = self.entries.slot(self.count);
                ptr::copy_nonoverlapping(src, dst, 1);
                (*dst).next = *bucket - 1;
                *bucket = self.count as i32 + 1;
            }
            self.count += 1;
        }
        self.bump();
        log::trace!("hash table trimmed to {new_size} entries");
        Ok(new_size)
    }

    /// Drops every live entry. Capacity is kept.
    pub(crate) fn clear(&mut self) {
        let count = self.count;
        if count > 0 {
            self.count = 0;
            self.free_list = -1;
            self.free_count = 0;
            // SAFETY: bucket array spans its capacity
            unsafe { self.buckets.zero_range(0, self.buckets.capacity()) };
            for i in 0..count {
                // SAFETY: i < old count
                unsafe { drop_entry(self.entries.slot(i)) };
            }
        }
        self.bump();
    }
}

/// Drops the key and value of a live entry in place.
///
/// # Safety
///
/// `entry` points to an initialized entry header.
#[inline]
unsafe fn drop_entry<K, V>(entry: *mut Entry<K, V>) {
    unsafe {
        if (*entry).is_live() {
            (*entry).key.assume_init_drop();
            (*entry).value.assume_init_drop();
        }
    }
}

impl<K, V> Drop for RawTable<K, V> {
    fn drop(&mut self) {
        if std::mem::needs_drop::<(K, V)>() {
            for i in 0..self.count {
                // SAFETY: i < count
                unsafe { drop_entry(self.entries.slot(i)) };
            }
        }
    }
}

/// Walks live entries in index order.
pub(crate) struct RawIter<'a, K, V> {
    table: &'a RawTable<K, V>,
    index: usize,
    remaining: usize,
}

impl<'a, K, V> RawIter<'a, K, V> {
    pub(crate) fn new(table: &'a RawTable<K, V>) -> Self {
        Self {
            table,
            index: 0,
            remaining: table.len(),
        }
    }
}

impl<'a, K, V> Iterator for RawIter<'a, K, V> {
    type Item = &'a Entry<K, V>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.index < self.table.count {
            let index = self.index;
            self.index += 1;
            if let Some(entry) = self.table.live(index) {
                self.remaining -= 1;
                return Some(entry);
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

/// Yields mutable access to live values in index order.
pub(crate) struct RawIterMut<'a, K, V> {
    entries: *mut Entry<K, V>,
    count: usize,
    index: usize,
    remaining: usize,
    _marker: std::marker::PhantomData<&'a mut RawTable<K, V>>,
}

impl<'a, K, V> RawIterMut<'a, K, V> {
    pub(crate) fn new(table: &'a mut RawTable<K, V>) -> Self {
        Self {
            entries: table.entries.as_ptr(),
            count: table.count,
            index: 0,
            remaining: table.len(),
            _marker: std::marker::PhantomData,
        }
    }
}

impl<'a, K, V> Iterator for RawIterMut<'a, K, V> {
    type Item = (&'a K, &'a mut V);

    fn next(&mut self) -> Option<Self::Item> {
        while self.index < self.count {
            // SAFETY: index < count; each entry is yielded at most once
            let entry = unsafe { &mut *self.entries.add(self.index) };
            self.index += 1;
            if entry.is_live() {
                self.remaining -= 1;
                // SAFETY: live entry
                return Some(unsafe {
                    (entry.key.assume_init_ref(), entry.value.assume_init_mut())
                });
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}
