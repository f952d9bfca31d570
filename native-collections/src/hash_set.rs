//! Hash set over the shared chained table.

use std::borrow::Borrow;
use std::fmt;
use std::hash::{BuildHasher, Hash};

use rustc_hash::FxBuildHasher;

use crate::cursor::{Cursor, Cursored};
use crate::hash_helpers::hash32;
use crate::table::{RawIter, RawTable};
use crate::CollectionError;

/// A set of distinct `T`.
///
/// Same layout and growth policy as [`Dictionary`](crate::Dictionary), with
/// no value stored per entry.
///
/// # Example
///
/// ```
/// use native_collections::HashSet;
///
/// let mut seen = HashSet::new();
/// assert!(seen.add(7));
/// assert!(!seen.add(7));
/// assert!(seen.contains(&7));
/// assert!(seen.remove(&7));
/// assert!(seen.is_empty());
/// ```
pub struct HashSet<T, S = FxBuildHasher> {
    table: RawTable<T, ()>,
    hasher: S,
}

impl<T> HashSet<T, FxBuildHasher> {
    /// Creates an empty set. Buckets are allocated on first insert.
    pub const fn new() -> Self {
        Self {
            table: RawTable::new(),
            hasher: FxBuildHasher,
        }
    }

    /// Creates an empty set holding at least `capacity` items before
    /// resizing.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_and_hasher(capacity, FxBuildHasher)
    }
}

impl<T, S: Default> Default for HashSet<T, S> {
    fn default() -> Self {
        Self::with_hasher(S::default())
    }
}

impl<T, S> HashSet<T, S> {
    /// Creates an empty set using `hasher`.
    pub const fn with_hasher(hasher: S) -> Self {
        Self {
            table: RawTable::new(),
            hasher,
        }
    }

    /// Creates an empty set with room for `capacity` items using `hasher`.
    pub fn with_capacity_and_hasher(capacity: usize, hasher: S) -> Self {
        Self {
            table: RawTable::with_capacity(capacity),
            hasher,
        }
    }

    /// Number of items.
    #[inline]
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Returns `true` if the set holds no items.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.table.len() == 0
    }

    /// Items that fit before the entry array is reallocated.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.table.capacity()
    }

    /// Structural modification counter.
    #[inline]
    pub fn version(&self) -> u32 {
        self.table.version()
    }

    /// Address of the entry array. Stable until the next resize.
    #[inline]
    pub fn entries_ptr(&self) -> *const u8 {
        self.table.entries_ptr()
    }

    /// Drops every item. Capacity is kept.
    pub fn clear(&mut self) {
        self.table.clear();
    }

    /// Iterates items in slot order.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            raw: RawIter::new(&self.table),
        }
    }

    /// Grows so that at least `capacity` items fit. Returns the capacity.
    ///
    /// # Errors
    ///
    /// [`CollectionError::InvalidArgument`] beyond the largest table size.
    pub fn ensure_capacity(&mut self, capacity: usize) -> Result<usize, CollectionError> {
        self.table.ensure_capacity(capacity)
    }

    /// Shrinks the entry array to the smallest table size holding every
    /// item. Returns the capacity.
    pub fn trim_excess(&mut self) -> usize {
        let len = self.table.len();
        self.table
            .trim_excess_to(len)
            .unwrap_or_else(|_| self.table.capacity())
    }

    /// A detached, version-checked cursor over the items.
    pub fn cursor(&self) -> Cursor<Self> {
        Cursor::new(self)
    }
}

impl<T, S> HashSet<T, S>
where
    T: Eq + Hash,
    S: BuildHasher,
{
    /// Adds `item`. Returns `false` if an equal item was already present;
    /// the stored item is kept.
    pub fn add(&mut self, item: T) -> bool {
        let hash = hash32(&self.hasher, &item);
        if self.table.find(hash, &item).is_some() {
            return false;
        }
        self.table.insert_vacant(hash, item, ());
        true
    }

    /// Removes the item equal to `item`. Returns `true` if one was present.
    pub fn remove<Q>(&mut self, item: &Q) -> bool
    where
        T: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.take(item).is_some()
    }

    /// Removes and returns the stored item equal to `item`.
    pub fn take<Q>(&mut self, item: &Q) -> Option<T>
    where
        T: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = hash32(&self.hasher, item);
        self.table.remove(hash, item).map(|(t, ())| t)
    }

    /// Returns `true` if an item equal to `item` is present.
    #[inline]
    pub fn contains<Q>(&self, item: &Q) -> bool
    where
        T: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.table.find(hash32(&self.hasher, item), item).is_some()
    }

    /// The stored item equal to `item`.
    pub fn try_get_value<Q>(&self, item: &Q) -> Option<&T>
    where
        T: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let i = self.table.find(hash32(&self.hasher, item), item)?;
        // SAFETY: `live` only yields live entries
        self.table.live(i).map(|entry| unsafe { entry.key() })
    }
}

impl<T, S> Extend<T> for HashSet<T, S>
where
    T: Eq + Hash,
    S: BuildHasher,
{
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for item in iter {
            self.add(item);
        }
    }
}

impl<T, S> FromIterator<T> for HashSet<T, S>
where
    T: Eq + Hash,
    S: BuildHasher + Default,
{
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut set = Self::with_hasher(S::default());
        set.extend(iter);
        set
    }
}

impl<'a, T, S> IntoIterator for &'a HashSet<T, S> {
    type Item = &'a T;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<T: fmt::Debug, S> fmt::Debug for HashSet<T, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl<T, S> Cursored for HashSet<T, S> {
    type Item<'a>
        = &'a T
    where
        Self: 'a;
    type Position = usize;

    fn version(&self) -> u32 {
        self.table.version()
    }

    fn start(&self) -> usize {
        0
    }

    fn advance<'a>(&'a self, slot: &mut usize) -> Option<&'a T> {
        while *slot < self.table.high_water() {
            let i = *slot;
            *slot += 1;
            if let Some(entry) = self.table.live(i) {
                // SAFETY: live entry
                return Some(unsafe { entry.key() });
            }
        }
        None
    }
}

/// Iterator over set items.
pub struct Iter<'a, T> {
    raw: RawIter<'a, T, ()>,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    #[inline]
    fn next(&mut self) -> Option<&'a T> {
        // SAFETY: the raw iterator yields live entries only
        self.raw.next().map(|entry| unsafe { entry.key() })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.raw.size_hint()
    }
}

impl<T> ExactSizeIterator for Iter<'_, T> {}
