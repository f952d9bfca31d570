//! Chained hash map with a dense entry array.

use std::borrow::Borrow;
use std::fmt;
use std::hash::{BuildHasher, Hash};
use std::ops::Index;

use rustc_hash::FxBuildHasher;

use crate::cursor::{Cursor, Cursored};
use crate::hash_helpers::hash32;
use crate::table::{Probe, RawIter, RawIterMut, RawTable};
use crate::CollectionError;

/// A hash map from `K` to `V`.
///
/// Entries are stored densely and chained through per-bucket index lists;
/// removed slots are recycled through a free list before the array grows.
/// Insertions, removals, capacity changes and [`clear`](Self::clear) bump
/// [`version`](Self::version). Overwriting the value of an existing key does
/// not.
///
/// # Example
///
/// ```
/// use native_collections::{CollectionError, Dictionary};
///
/// let mut scores = Dictionary::with_capacity(4);
/// scores.add("ada", 10).unwrap();
/// assert_eq!(scores.add("ada", 11), Err(CollectionError::DuplicateKey));
///
/// scores.insert("ada", 12);
/// assert_eq!(scores.get("ada"), Some(&12));
/// assert_eq!(scores.index("bob"), Err(CollectionError::KeyNotFound));
/// ```
pub struct Dictionary<K, V, S = FxBuildHasher> {
    table: RawTable<K, V>,
    hasher: S,
}

impl<K, V> Dictionary<K, V, FxBuildHasher> {
    /// Creates an empty dictionary. Buckets are allocated on first insert.
    pub const fn new() -> Self {
        Self {
            table: RawTable::new(),
            hasher: FxBuildHasher,
        }
    }

    /// Creates an empty dictionary holding at least `capacity` entries
    /// before resizing.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_and_hasher(capacity, FxBuildHasher)
    }
}

impl<K, V, S: Default> Default for Dictionary<K, V, S> {
    fn default() -> Self {
        Self::with_hasher(S::default())
    }
}

impl<K, V, S> Dictionary<K, V, S> {
    /// Creates an empty dictionary using `hasher`.
    pub const fn with_hasher(hasher: S) -> Self {
        Self {
            table: RawTable::new(),
            hasher,
        }
    }

    /// Creates an empty dictionary with room for `capacity` entries using
    /// `hasher`.
    pub fn with_capacity_and_hasher(capacity: usize, hasher: S) -> Self {
        Self {
            table: RawTable::with_capacity(capacity),
            hasher,
        }
    }

    /// Number of entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Returns `true` if the dictionary holds no entries.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.table.len() == 0
    }

    /// Entries that fit before the entry array is reallocated.
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

    /// The hasher used for keys.
    #[inline]
    pub fn hasher(&self) -> &S {
        &self.hasher
    }

    /// Drops every entry. Capacity is kept.
    pub fn clear(&mut self) {
        self.table.clear();
    }

    /// Iterates entries in slot order.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            raw: RawIter::new(&self.table),
        }
    }

    /// Iterates entries with mutable access to the values.
    pub fn iter_mut(&mut self) -> IterMut<'_, K, V> {
        IterMut {
            raw: RawIterMut::new(&mut self.table),
        }
    }

    /// Iterates keys.
    pub fn keys(&self) -> Keys<'_, K, V> {
        Keys { inner: self.iter() }
    }

    /// Iterates values.
    pub fn values(&self) -> Values<'_, K, V> {
        Values { inner: self.iter() }
    }

    /// Returns `true` if some entry holds `value`. Linear in the capacity.
    pub fn contains_value(&self, value: &V) -> bool
    where
        V: PartialEq,
    {
        self.values().any(|v| v == value)
    }

    /// Grows so that at least `capacity` entries fit. Returns the capacity.
    ///
    /// # Errors
    ///
    /// [`CollectionError::InvalidArgument`] beyond the largest table size.
    pub fn ensure_capacity(&mut self, capacity: usize) -> Result<usize, CollectionError> {
        self.table.ensure_capacity(capacity)
    }

    /// Shrinks the entry array to the smallest table size holding every
    /// entry. Returns the capacity.
    pub fn trim_excess(&mut self) -> usize {
        let len = self.table.len();
        self.table
            .trim_excess_to(len)
            .unwrap_or_else(|_| self.table.capacity())
    }

    /// Shrinks the entry array to the smallest table size holding
    /// `capacity` entries. Returns the capacity.
    ///
    /// # Errors
    ///
    /// [`CollectionError::CapacityTooSmall`] if `capacity` is below the length.
    pub fn trim_excess_to(&mut self, capacity: usize) -> Result<usize, CollectionError> {
        self.table.trim_excess_to(capacity)
    }

    /// A detached, version-checked cursor over the entries.
    pub fn cursor(&self) -> Cursor<Self> {
        Cursor::new(self)
    }
}

impl<K, V, S> Dictionary<K, V, S>
where
    K: Eq + Hash,
    S: BuildHasher,
{
    #[inline]
    fn hash<Q: Hash + ?Sized>(&self, key: &Q) -> u32 {
        hash32(&self.hasher, key)
    }

    /// Adds `key` mapped to `value`.
    ///
    /// # Errors
    ///
    /// [`CollectionError::DuplicateKey`] if `key` is present, and
    /// [`CollectionError::ConcurrentOperationsNotSupported`] if a corrupted
    /// chain is detected.
    pub fn add(&mut self, key: K, value: V) -> Result<(), CollectionError> {
        let hash = self.hash(&key);
        match self.table.probe(hash, &key)? {
            Probe::Found(_) => Err(CollectionError::DuplicateKey),
            Probe::Vacant => {
                self.table.insert_vacant(hash, key, value);
                Ok(())
            }
        }
    }

    /// Adds `key` mapped to `value` unless `key` is present. Returns `true`
    /// if added.
    pub fn try_add(&mut self, key: K, value: V) -> bool {
        let hash = self.hash(&key);
        if self.table.find(hash, &key).is_some() {
            return false;
        }
        self.table.insert_vacant(hash, key, value);
        true
    }

    /// Maps `key` to `value`, returning the previous value if `key` was
    /// present.
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        let hash = self.hash(&key);
        match self.table.find(hash, &key) {
            Some(i) => self
                .table
                .live_mut(i)
                // SAFETY: `live_mut` only yields live entries
                .map(|entry| std::mem::replace(unsafe { entry.value_mut() }, value)),
            None => {
                self.table.insert_vacant(hash, key, value);
                None
            }
        }
    }

    /// The value mapped to `key`.
    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let i = self.table.find(self.hash(key), key)?;
        // SAFETY: `live` only yields live entries
        self.table.live(i).map(|entry| unsafe { entry.value() })
    }

    /// The stored key and value for `key`.
    pub fn get_key_value<Q>(&self, key: &Q) -> Option<(&K, &V)>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let i = self.table.find(self.hash(key), key)?;
        // SAFETY: `live` only yields live entries
        self.table
            .live(i)
            .map(|entry| unsafe { (entry.key(), entry.value()) })
    }

    /// Same as [`get`](Self::get).
    #[inline]
    pub fn try_get_value<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.get(key)
    }

    /// Mutable access to the value mapped to `key`.
    pub fn get_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let i = self.table.find(self.hash(key), key)?;
        // SAFETY: `live_mut` only yields live entries
        self.table.live_mut(i).map(|entry| unsafe { entry.value_mut() })
    }

    /// The value mapped to `key`.
    ///
    /// # Errors
    ///
    /// [`CollectionError::KeyNotFound`] on a miss.
    pub fn index<Q>(&self, key: &Q) -> Result<&V, CollectionError>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = self.hash(key);
        match self.table.probe(hash, key)? {
            // SAFETY: `live` only yields live entries
            Probe::Found(i) => self
                .table
                .live(i)
                .map(|entry| unsafe { entry.value() })
                .ok_or(CollectionError::KeyNotFound),
            Probe::Vacant => Err(CollectionError::KeyNotFound),
        }
    }

    /// Returns `true` if `key` is present.
    #[inline]
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.table.find(self.hash(key), key).is_some()
    }

    /// Removes `key`, returning its value.
    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.remove_entry(key).map(|(_, v)| v)
    }

    /// Removes `key`, returning the stored key and value.
    pub fn remove_entry<Q>(&mut self, key: &Q) -> Option<(K, V)>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = self.hash(key);
        self.table.remove(hash, key)
    }
}

impl<K, V, S, Q> Index<&Q> for Dictionary<K, V, S>
where
    K: Eq + Hash + Borrow<Q>,
    Q: Hash + Eq + ?Sized,
    S: BuildHasher,
{
    type Output = V;

    /// # Panics
    ///
    /// Panics if `key` is not present.
    fn index(&self, key: &Q) -> &V {
        match self.get(key) {
            Some(v) => v,
            None => panic!("key not found in dictionary"),
        }
    }
}

impl<K, V, S> Extend<(K, V)> for Dictionary<K, V, S>
where
    K: Eq + Hash,
    S: BuildHasher,
{
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (k, v) in iter {
            self.insert(k, v);
        }
    }
}

impl<K, V, S> FromIterator<(K, V)> for Dictionary<K, V, S>
where
    K: Eq + Hash,
    S: BuildHasher + Default,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut dict = Self::with_hasher(S::default());
        dict.extend(iter);
        dict
    }
}

impl<'a, K, V, S> IntoIterator for &'a Dictionary<K, V, S> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<K: fmt::Debug, V: fmt::Debug, S> fmt::Debug for Dictionary<K, V, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<K, V, S> Cursored for Dictionary<K, V, S> {
    type Item<'a>
        = (&'a K, &'a V)
    where
        Self: 'a;
    /// Next entry slot to inspect.
    type Position = usize;

    fn version(&self) -> u32 {
        self.table.version()
    }

    fn start(&self) -> usize {
        0
    }

    fn advance<'a>(&'a self, slot: &mut usize) -> Option<(&'a K, &'a V)> {
        while *slot < self.table.high_water() {
            let i = *slot;
            *slot += 1;
            if let Some(entry) = self.table.live(i) {
                // SAFETY: live entry
                return Some(unsafe { (entry.key(), entry.value()) });
            }
        }
        None
    }
}

// ============================================================================
// Iterators
// ============================================================================

/// Iterator over `(&K, &V)`.
pub struct Iter<'a, K, V> {
    raw: RawIter<'a, K, V>,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        // SAFETY: the raw iterator yields live entries only
        self.raw.next().map(|entry| unsafe { (entry.key(), entry.value()) })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.raw.size_hint()
    }
}

impl<K, V> ExactSizeIterator for Iter<'_, K, V> {}

/// Iterator over `(&K, &mut V)`.
pub struct IterMut<'a, K, V> {
    raw: RawIterMut<'a, K, V>,
}

impl<'a, K, V> Iterator for IterMut<'a, K, V> {
    type Item = (&'a K, &'a mut V);

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.raw.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.raw.size_hint()
    }
}

impl<K, V> ExactSizeIterator for IterMut<'_, K, V> {}

/// Iterator over keys.
pub struct Keys<'a, K, V> {
    inner: Iter<'a, K, V>,
}

impl<'a, K, V> Iterator for Keys<'a, K, V> {
    type Item = &'a K;

    #[inline]
    fn next(&mut self) -> Option<&'a K> {
        self.inner.next().map(|(k, _)| k)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

/// Iterator over values.
pub struct Values<'a, K, V> {
    inner: Iter<'a, K, V>,
}

impl<'a, K, V> Iterator for Values<'a, K, V> {
    type Item = &'a V;

    #[inline]
    fn next(&mut self) -> Option<&'a V> {
        self.inner.next().map(|(_, v)| v)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}
