//! Sorted map over parallel key and value arrays.

use std::borrow::Borrow;
use std::fmt;
use std::iter::Zip;
use std::ops::Index;
use std::slice;

use crate::cursor::{Cursor, Cursored};
use crate::list::List;
use crate::CollectionError;

/// A map kept as two parallel arrays sorted by key.
///
/// Lookups are binary searches; insertion and removal shift the tail of
/// both arrays. Suited to small or read-mostly maps that want ordered,
/// contiguous iteration.
///
/// # Example
///
/// ```
/// use native_collections::SortedList;
///
/// let mut prices = SortedList::new();
/// prices.add(103, "c").unwrap();
/// prices.add(101, "a").unwrap();
/// prices.insert(102, "b");
///
/// assert_eq!(prices.keys(), &[101, 102, 103]);
/// assert_eq!(prices.get(&102), Some(&"b"));
/// assert_eq!(prices.remove(&101), Some("a"));
/// ```
pub struct SortedList<K, V> {
    keys: List<K>,
    values: List<V>,
    version: u32,
}

impl<K, V> Default for SortedList<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> SortedList<K, V> {
    /// Creates an empty list without allocating.
    pub const fn new() -> Self {
        Self {
            keys: List::new(),
            values: List::new(),
            version: 0,
        }
    }

    /// Creates an empty list with room for `capacity` entries.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            keys: List::with_capacity(capacity),
            values: List::with_capacity(capacity),
            version: 0,
        }
    }

    /// Number of entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Returns `true` if the list holds no entries.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Allocated entry slots.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.keys.capacity()
    }

    /// Structural modification counter.
    #[inline]
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Keys in ascending order.
    #[inline]
    pub fn keys(&self) -> &[K] {
        self.keys.as_slice()
    }

    /// Values in key order.
    #[inline]
    pub fn values(&self) -> &[V] {
        self.values.as_slice()
    }

    /// Values in key order, mutably.
    #[inline]
    pub fn values_mut(&mut self) -> &mut [V] {
        self.values.as_mut_slice()
    }

    /// Iterates entries in key order.
    pub fn iter(&self) -> Zip<slice::Iter<'_, K>, slice::Iter<'_, V>> {
        self.keys.iter().zip(self.values.iter())
    }

    /// Entry at `index` in key order.
    pub fn get_at(&self, index: usize) -> Option<(&K, &V)> {
        Some((self.keys.get(index)?, self.values.get(index)?))
    }

    /// Sets the capacity of both arrays.
    ///
    /// # Errors
    ///
    /// [`CollectionError::CapacityTooSmall`] below the length.
    pub fn set_capacity(&mut self, capacity: usize) -> Result<(), CollectionError> {
        self.keys.set_capacity(capacity)?;
        self.values.set_capacity(capacity)
    }

    /// Grows so that at least `capacity` entries fit. Returns the capacity.
    pub fn ensure_capacity(&mut self, capacity: usize) -> usize {
        self.values.ensure_capacity(capacity);
        self.keys.ensure_capacity(capacity)
    }

    /// Shrinks to the length when less than 90% of the capacity is used.
    /// Returns the capacity.
    pub fn trim_excess(&mut self) -> usize {
        self.keys.trim_excess();
        self.values.trim_excess();
        self.keys.capacity()
    }

    /// Drops every entry. Capacity is kept.
    pub fn clear(&mut self) {
        self.keys.clear();
        self.values.clear();
        self.version = self.version.wrapping_add(1);
    }

    /// Removes the entry at `index` in key order.
    ///
    /// # Errors
    ///
    /// [`CollectionError::IndexOutOfRange`] past the end.
    pub fn remove_at(&mut self, index: usize) -> Result<(K, V), CollectionError> {
        let key = self.keys.remove_at(index)?;
        let value = self.values.remove_at(index)?;
        self.version = self.version.wrapping_add(1);
        Ok((key, value))
    }

    /// A detached, version-checked cursor over the entries in key order.
    pub fn cursor(&self) -> Cursor<Self> {
        Cursor::new(self)
    }

    fn insert_at(&mut self, index: usize, key: K, value: V) {
        debug_assert!(index <= self.keys.len());
        // a binary search never yields an index past the end
        let _ = self.keys.insert(index, key);
        let _ = self.values.insert(index, value);
        self.version = self.version.wrapping_add(1);
    }
}

impl<K: Ord, V> SortedList<K, V> {
    /// Position of `key`: `Ok(index)` if present, `Err(insertion point)`
    /// otherwise.
    #[inline]
    pub fn search<Q>(&self, key: &Q) -> Result<usize, usize>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.keys
            .as_slice()
            .binary_search_by(|probe| <K as Borrow<Q>>::borrow(probe).cmp(key))
    }

    /// Adds `key` mapped to `value`.
    ///
    /// # Errors
    ///
    /// [`CollectionError::DuplicateKey`] if `key` is present.
    pub fn add(&mut self, key: K, value: V) -> Result<(), CollectionError> {
        match self.search(&key) {
            Ok(_) => Err(CollectionError::DuplicateKey),
            Err(index) => {
                self.insert_at(index, key, value);
                Ok(())
            }
        }
    }

    /// Adds `key` unless present. Returns `true` if added.
    pub fn try_add(&mut self, key: K, value: V) -> bool {
        self.add(key, value).is_ok()
    }

    /// Maps `key` to `value`, returning the previous value if present.
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        match self.search(&key) {
            Ok(index) => {
                self.version = self.version.wrapping_add(1);
                Some(std::mem::replace(&mut self.values[index], value))
            }
            Err(index) => {
                self.insert_at(index, key, value);
                None
            }
        }
    }

    /// The value mapped to `key`.
    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.search(key).ok().and_then(|i| self.values.get(i))
    }

    /// Same as [`get`](Self::get).
    #[inline]
    pub fn try_get_value<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.get(key)
    }

    /// Mutable access to the value mapped to `key`.
    pub fn get_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let index = self.search(key).ok()?;
        self.values.get_mut(index)
    }

    /// The value mapped to `key`.
    ///
    /// # Errors
    ///
    /// [`CollectionError::KeyNotFound`] on a miss.
    pub fn index<Q>(&self, key: &Q) -> Result<&V, CollectionError>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.get(key).ok_or(CollectionError::KeyNotFound)
    }

    /// Returns `true` if `key` is present.
    #[inline]
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.search(key).is_ok()
    }

    /// Removes `key`, returning its value.
    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.remove_entry(key).map(|(_, v)| v)
    }

    /// Removes `key`, returning the stored key and value.
    pub fn remove_entry<Q>(&mut self, key: &Q) -> Option<(K, V)>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let index = self.search(key).ok()?;
        self.remove_at(index).ok()
    }

    /// Entry with the smallest key.
    pub fn first(&self) -> Option<(&K, &V)> {
        self.get_at(0)
    }

    /// Entry with the largest key.
    pub fn last(&self) -> Option<(&K, &V)> {
        self.get_at(self.len().checked_sub(1)?)
    }
}

impl<K, V, Q> Index<&Q> for SortedList<K, V>
where
    K: Ord + Borrow<Q>,
    Q: Ord + ?Sized,
{
    type Output = V;

    /// # Panics
    ///
    /// Panics if `key` is not present.
    fn index(&self, key: &Q) -> &V {
        match self.get(key) {
            Some(v) => v,
            None => panic!("key not found in sorted list"),
        }
    }
}

impl<K: Ord, V> Extend<(K, V)> for SortedList<K, V> {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (k, v) in iter {
            self.insert(k, v);
        }
    }
}

impl<K: Ord, V> FromIterator<(K, V)> for SortedList<K, V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut list = Self::new();
        list.extend(iter);
        list
    }
}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for SortedList<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<K, V> Cursored for SortedList<K, V> {
    type Item<'a>
        = (&'a K, &'a V)
    where
        Self: 'a;
    type Position = usize;

    fn version(&self) -> u32 {
        self.version
    }

    fn start(&self) -> usize {
        0
    }

    fn advance<'a>(&'a self, index: &mut usize) -> Option<(&'a K, &'a V)> {
        let entry = self.get_at(*index)?;
        *index += 1;
        Some(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};
    use std::collections::BTreeMap;

    #[test]
    fn keeps_keys_sorted() {
        let mut list = SortedList::new();
        for k in [5, 3, 9, 1, 7] {
            list.add(k, k * 10).unwrap();
        }
        assert_eq!(list.keys(), &[1, 3, 5, 7, 9]);
        assert_eq!(list.values(), &[10, 30, 50, 70, 90]);
        assert_eq!(list.add(3, 0), Err(CollectionError::DuplicateKey));
        assert!(!list.try_add(3, 0));
        assert_eq!(list.first(), Some((&1, &10)));
        assert_eq!(list.last(), Some((&9, &90)));
        assert_eq!(list.search(&4), Err(2));
        assert_eq!(list[&7], 70);
    }

    #[test]
    fn lookups_and_removal() {
        let mut list: SortedList<String, u32> = SortedList::with_capacity(4);
        list.insert("b".into(), 2);
        list.insert("a".into(), 1);
        assert_eq!(list.insert("a".into(), 11), Some(1));
        assert_eq!(list.get("a"), Some(&11));
        assert_eq!(list.index("z"), Err(CollectionError::KeyNotFound));
        *list.get_mut("b").unwrap() += 1;
        assert_eq!(list.try_get_value("b"), Some(&3));

        assert_eq!(list.remove_entry("a"), Some(("a".to_string(), 11)));
        assert_eq!(list.remove("a"), None);
        assert!(list.contains_key("b"));
        assert_eq!(
            list.remove_at(1),
            Err(CollectionError::IndexOutOfRange { index: 1, len: 1 })
        );
    }

    #[test]
    fn capacity_control() {
        let mut list = SortedList::new();
        assert_eq!(list.ensure_capacity(10), 10);
        list.extend((0..3).map(|i| (i, i)));
        assert_eq!(
            list.set_capacity(2),
            Err(CollectionError::CapacityTooSmall { capacity: 2, len: 3 })
        );
        assert_eq!(list.trim_excess(), 3);
        list.clear();
        assert!(list.is_empty());
        assert_eq!(list.capacity(), 3);
    }

    #[test]
    fn cursor_sees_overwrite() {
        let mut list: SortedList<u8, u8> = [(2, 2), (1, 1)].into_iter().collect();
        let mut c = list.cursor();
        assert_eq!(c.next(&list), Ok(Some((&1, &1))));
        list.insert(2, 20);
        assert_eq!(c.next(&list), Err(CollectionError::VersionChanged));
    }

    #[test]
    fn randomized_against_btree() {
        let mut rng = SmallRng::seed_from_u64(3);
        let mut list = SortedList::new();
        let mut reference = BTreeMap::new();
        for _ in 0..5_000 {
            let k = rng.random_range(0..200u32);
            if rng.random_bool(0.6) {
                assert_eq!(list.insert(k, k), reference.insert(k, k));
            } else {
                assert_eq!(list.remove(&k), reference.remove(&k));
            }
        }
        assert!(list.iter().eq(reference.iter()));
    }
}
