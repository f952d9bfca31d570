//! Red-black tree set over pooled nodes.
//!
//! Insertion and deletion are single-pass and top-down: 4-nodes are split on
//! the way down an insert, and every 2-node on the way down a delete is
//! widened first, so no parent pointers or recursion are needed.

use std::borrow::Borrow;
use std::cmp::Ordering;
use std::fmt;
use std::marker::PhantomData;
use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

use native_pool::{NodePool, PoolError};

use crate::cursor::{Cursor, Cursored};

/// Source of per-set cursor identities. `0` is reserved.
static NEXT_ID: AtomicUsize = AtomicUsize::new(1);

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Color {
    Black,
    Red,
}

#[derive(Clone, Copy, Debug)]
enum Rotation {
    Left,
    LeftRight,
    Right,
    RightLeft,
}

struct Node<T> {
    item: T,
    left: *mut Node<T>,
    right: *mut Node<T>,
    color: Color,
}

// =============================================================================
// Node helpers
//
// Every function below takes raw node pointers that are either null (where
// noted) or point to live nodes of the same tree.
// =============================================================================

#[inline]
unsafe fn is_red<T>(node: *mut Node<T>) -> bool {
    !node.is_null() && unsafe { (*node).color } == Color::Red
}

#[inline]
unsafe fn is_2node<T>(node: *mut Node<T>) -> bool {
    unsafe {
        (*node).color == Color::Black && !is_red((*node).left) && !is_red((*node).right)
    }
}

#[inline]
unsafe fn is_4node<T>(node: *mut Node<T>) -> bool {
    unsafe { is_red((*node).left) && is_red((*node).right) }
}

#[inline]
unsafe fn split_4node<T>(node: *mut Node<T>) {
    unsafe {
        (*node).color = Color::Red;
        (*(*node).left).color = Color::Black;
        (*(*node).right).color = Color::Black;
    }
}

#[inline]
unsafe fn merge_2nodes<T>(node: *mut Node<T>) {
    unsafe {
        (*node).color = Color::Black;
        (*(*node).left).color = Color::Red;
        (*(*node).right).color = Color::Red;
    }
}

#[inline]
unsafe fn sibling<T>(parent: *mut Node<T>, node: *mut Node<T>) -> *mut Node<T> {
    unsafe {
        if (*parent).left == node {
            (*parent).right
        } else {
            (*parent).left
        }
    }
}

#[inline]
unsafe fn replace_child<T>(parent: *mut Node<T>, child: *mut Node<T>, new_child: *mut Node<T>) {
    unsafe {
        if (*parent).left == child {
            (*parent).left = new_child;
        } else {
            (*parent).right = new_child;
        }
    }
}

unsafe fn rotate_left<T>(node: *mut Node<T>) -> *mut Node<T> {
    unsafe {
        let child = (*node).right;
        (*node).right = (*child).left;
        (*child).left = node;
        child
    }
}

unsafe fn rotate_right<T>(node: *mut Node<T>) -> *mut Node<T> {
    unsafe {
        let child = (*node).left;
        (*node).left = (*child).right;
        (*child).right = node;
        child
    }
}

unsafe fn rotate_left_right<T>(node: *mut Node<T>) -> *mut Node<T> {
    unsafe {
        let child = (*node).left;
        let grand_child = (*child).right;
        (*node).left = (*grand_child).right;
        (*grand_child).right = node;
        (*child).right = (*grand_child).left;
        (*grand_child).left = child;
        grand_child
    }
}

unsafe fn rotate_right_left<T>(node: *mut Node<T>) -> *mut Node<T> {
    unsafe {
        let child = (*node).right;
        let grand_child = (*child).left;
        (*node).right = (*grand_child).left;
        (*grand_child).left = node;
        (*child).left = (*grand_child).right;
        (*grand_child).right = child;
        grand_child
    }
}

/// Rotation that borrows from `sibling` to widen the 2-node `current`.
unsafe fn borrow_rotation<T>(
    parent: *mut Node<T>,
    current: *mut Node<T>,
    sibling: *mut Node<T>,
) -> Rotation {
    unsafe {
        let current_is_left = (*parent).left == current;
        match (is_red((*sibling).left), current_is_left) {
            (true, true) => Rotation::RightLeft,
            (true, false) => Rotation::Right,
            (false, true) => Rotation::Left,
            (false, false) => Rotation::LeftRight,
        }
    }
}

unsafe fn rotate<T>(node: *mut Node<T>, rotation: Rotation) -> *mut Node<T> {
    unsafe {
        match rotation {
            Rotation::Right => {
                (*(*(*node).left).left).color = Color::Black;
                rotate_right(node)
            }
            Rotation::Left => {
                (*(*(*node).right).right).color = Color::Black;
                rotate_left(node)
            }
            Rotation::RightLeft => rotate_right_left(node),
            Rotation::LeftRight => rotate_left_right(node),
        }
    }
}

/// Pushes `node` and its chain of left descendants.
#[inline]
unsafe fn push_left_spine<T>(stack: &mut Vec<*const Node<T>>, mut node: *const Node<T>) {
    while !node.is_null() {
        stack.push(node);
        node = unsafe { (*node).left };
    }
}

// =============================================================================
// SortedSet
// =============================================================================

/// An ordered set of distinct `T`, kept as a red-black tree.
///
/// Nodes come from a private [`NodePool`]. Every `add`, `remove` and
/// `clear` bumps [`version`](Self::version), even when the set's contents
/// end up unchanged, because the descent may rebalance the tree.
///
/// # Example
///
/// ```
/// use native_collections::SortedSet;
///
/// let mut set = SortedSet::new().unwrap();
/// for x in [5, 1, 4, 1, 3] {
///     set.add(x);
/// }
/// assert_eq!(set.iter().copied().collect::<Vec<_>>(), vec![1, 3, 4, 5]);
/// assert_eq!(set.min(), Some(&1));
/// assert_eq!(set.max(), Some(&5));
/// assert!(set.remove(&4));
/// ```
pub struct SortedSet<T> {
    root: *mut Node<T>,
    len: usize,
    version: u32,
    id: usize,
    nodes: NodePool<Node<T>>,
}

// SAFETY: the set uniquely owns its nodes and their items
unsafe impl<T: Send> Send for SortedSet<T> {}

impl<T> SortedSet<T> {
    /// Creates an empty set drawing nodes from slabs of 64.
    pub fn new() -> Result<Self, PoolError> {
        Self::with_slab_size(64, 1)
    }

    /// Creates an empty set with `blocks_per_slab` nodes per pool slab.
    ///
    /// # Errors
    ///
    /// [`PoolError::InvalidArgument`] if `blocks_per_slab` is zero.
    pub fn with_slab_size(blocks_per_slab: usize, max_free_slabs: usize) -> Result<Self, PoolError> {
        Ok(Self {
            root: ptr::null_mut(),
            len: 0,
            version: 0,
            id: NEXT_ID.fetch_add(1, AtomicOrdering::Relaxed),
            nodes: NodePool::new(blocks_per_slab, max_free_slabs)?,
        })
    }

    /// Number of items.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the set holds no items.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Structural modification counter.
    #[inline]
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Smallest item.
    pub fn min(&self) -> Option<&T> {
        let mut node = self.root;
        // SAFETY: tree nodes are live
        unsafe {
            while !node.is_null() && !(*node).left.is_null() {
                node = (*node).left;
            }
            node.as_ref().map(|n| &n.item)
        }
    }

    /// Largest item.
    pub fn max(&self) -> Option<&T> {
        let mut node = self.root;
        // SAFETY: tree nodes are live
        unsafe {
            while !node.is_null() && !(*node).right.is_null() {
                node = (*node).right;
            }
            node.as_ref().map(|n| &n.item)
        }
    }

    /// Drops every item and returns every node to the pool.
    pub fn clear(&mut self) {
        self.release_all();
        self.version = self.version.wrapping_add(1);
    }

    fn release_all(&mut self) {
        if self.root.is_null() {
            return;
        }
        let mut stack = vec![self.root];
        while let Some(node) = stack.pop() {
            // SAFETY: each node is reached once and taken once
            unsafe {
                if !(*node).left.is_null() {
                    stack.push((*node).left);
                }
                if !(*node).right.is_null() {
                    stack.push((*node).right);
                }
                drop(self.nodes.take(NonNull::new_unchecked(node)));
            }
        }
        self.root = ptr::null_mut();
        self.len = 0;
    }

    /// Iterates in ascending order.
    pub fn iter(&self) -> Iter<'_, T> {
        let mut stack = Vec::new();
        // SAFETY: tree nodes are live
        unsafe { push_left_spine(&mut stack, self.root) };
        Iter {
            stack,
            remaining: self.len,
            _marker: PhantomData,
        }
    }

    /// A detached, version-checked cursor walking in ascending order.
    pub fn cursor(&self) -> Cursor<Self> {
        Cursor::new(self)
    }

    #[inline]
    fn new_node(&mut self, item: T, color: Color) -> *mut Node<T> {
        self.nodes
            .alloc(Node {
                item,
                left: ptr::null_mut(),
                right: ptr::null_mut(),
                color,
            })
            .as_ptr()
    }

    #[inline]
    unsafe fn replace_child_or_root(
        &mut self,
        parent: *mut Node<T>,
        child: *mut Node<T>,
        new_child: *mut Node<T>,
    ) {
        if parent.is_null() {
            self.root = new_child;
        } else {
            unsafe { replace_child(parent, child, new_child) };
        }
    }

    /// Fixes a red `current` under a red `parent` by rotating at the
    /// grandparent.
    unsafe fn insertion_balance(
        &mut self,
        current: *mut Node<T>,
        parent: *mut Node<T>,
        grand_parent: *mut Node<T>,
        great_grand_parent: *mut Node<T>,
    ) {
        unsafe {
            let parent_is_right = (*grand_parent).right == parent;
            let current_is_right = (*parent).right == current;
            let new_child = match (parent_is_right, current_is_right) {
                (true, true) => rotate_left(grand_parent),
                (false, false) => rotate_right(grand_parent),
                (false, true) => rotate_left_right(grand_parent),
                (true, false) => rotate_right_left(grand_parent),
            };
            (*grand_parent).color = Color::Red;
            (*new_child).color = Color::Black;
            self.replace_child_or_root(great_grand_parent, grand_parent, new_child);
        }
    }

    /// Puts `successor` (the last node visited by a delete descent) in the
    /// place of `matched`.
    unsafe fn replace_node(
        &mut self,
        matched: *mut Node<T>,
        parent_of_match: *mut Node<T>,
        mut successor: *mut Node<T>,
        parent_of_successor: *mut Node<T>,
    ) {
        unsafe {
            if successor == matched {
                successor = (*matched).left;
            } else {
                if !(*successor).right.is_null() {
                    (*(*successor).right).color = Color::Black;
                }
                if parent_of_successor != matched {
                    (*parent_of_successor).left = (*successor).right;
                    (*successor).right = (*matched).right;
                }
                (*successor).left = (*matched).left;
            }
            if !successor.is_null() {
                (*successor).color = (*matched).color;
            }
            self.replace_child_or_root(parent_of_match, matched, successor);
        }
    }
}

impl<T: Ord> SortedSet<T> {
    fn find<Q>(&self, item: &Q) -> *mut Node<T>
    where
        T: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let mut node = self.root;
        // SAFETY: tree nodes are live
        unsafe {
            while !node.is_null() {
                match item.cmp(<T as Borrow<Q>>::borrow(&(*node).item)) {
                    Ordering::Equal => return node,
                    Ordering::Less => node = (*node).left,
                    Ordering::Greater => node = (*node).right,
                }
            }
        }
        ptr::null_mut()
    }

    /// Returns `true` if an item equal to `item` is present.
    #[inline]
    pub fn contains<Q>(&self, item: &Q) -> bool
    where
        T: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        !self.find(item).is_null()
    }

    /// The stored item equal to `item`.
    pub fn try_get_value<Q>(&self, item: &Q) -> Option<&T>
    where
        T: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        // SAFETY: `find` returns null or a live node
        unsafe { self.find(item).as_ref().map(|n| &n.item) }
    }

    /// Adds `item`. Returns `false` (and drops `item`) if an equal item is
    /// already present.
    pub fn add(&mut self, item: T) -> bool {
        self.insert(item).is_ok()
    }

    /// Stores `item`, replacing and returning an equal item if present.
    pub fn add_or_replace(&mut self, item: T) -> Option<T> {
        let node = self.find(&item);
        if node.is_null() {
            // `find` just missed, so this cannot hit a duplicate
            let inserted = self.insert(item);
            debug_assert!(inserted.is_ok());
            return None;
        }
        self.version = self.version.wrapping_add(1);
        // SAFETY: `find` returned a live node
        Some(std::mem::replace(unsafe { &mut (*node).item }, item))
    }

    /// Inserts `item`, handing it back if an equal item is present.
    fn insert(&mut self, item: T) -> Result<(), T> {
        self.version = self.version.wrapping_add(1);
        if self.root.is_null() {
            self.root = self.new_node(item, Color::Black);
            self.len = 1;
            return Ok(());
        }

        let mut current = self.root;
        let mut parent = ptr::null_mut();
        let mut grand_parent = ptr::null_mut();
        let mut great_grand_parent = ptr::null_mut();
        let mut order = Ordering::Equal;

        // SAFETY: every pointer below is null or a live node of this tree
        unsafe {
            while !current.is_null() {
                order = item.cmp(&(*current).item);
                if order == Ordering::Equal {
                    (*self.root).color = Color::Black;
                    return Err(item);
                }
                if is_4node(current) {
                    split_4node(current);
                    if is_red(parent) {
                        self.insertion_balance(current, parent, grand_parent, great_grand_parent);
                    }
                }
                great_grand_parent = grand_parent;
                grand_parent = parent;
                parent = current;
                current = if order == Ordering::Less {
                    (*current).left
                } else {
                    (*current).right
                };
            }

            let node = self.new_node(item, Color::Red);
            if order == Ordering::Greater {
                (*parent).right = node;
            } else {
                (*parent).left = node;
            }
            if (*parent).color == Color::Red {
                self.insertion_balance(node, parent, grand_parent, great_grand_parent);
            }
            (*self.root).color = Color::Black;
        }
        self.len += 1;
        Ok(())
    }

    /// Removes the item equal to `item`. Returns `true` if one was present.
    pub fn remove<Q>(&mut self, item: &Q) -> bool
    where
        T: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.take(item).is_some()
    }

    /// Removes and returns the stored item equal to `item`.
    pub fn take<Q>(&mut self, item: &Q) -> Option<T>
    where
        T: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        if self.root.is_null() {
            return None;
        }
        self.version = self.version.wrapping_add(1);

        let mut current = self.root;
        let mut parent: *mut Node<T> = ptr::null_mut();
        let mut grand_parent: *mut Node<T> = ptr::null_mut();
        let mut matched: *mut Node<T> = ptr::null_mut();
        let mut parent_of_match: *mut Node<T> = ptr::null_mut();

        // SAFETY: every pointer below is null or a live node of this tree
        unsafe {
            while !current.is_null() {
                if is_2node(current) {
                    if parent.is_null() {
                        (*current).color = Color::Red;
                    } else {
                        let mut sib = sibling(parent, current);
                        if is_red(sib) {
                            if (*parent).right == sib {
                                rotate_left(parent);
                            } else {
                                rotate_right(parent);
                            }
                            (*parent).color = Color::Red;
                            (*sib).color = Color::Black;
                            self.replace_child_or_root(grand_parent, parent, sib);
                            grand_parent = sib;
                            if parent == matched {
                                parent_of_match = sib;
                            }
                            sib = sibling(parent, current);
                        }

                        if is_2node(sib) {
                            merge_2nodes(parent);
                        } else {
                            let rotation = borrow_rotation(parent, current, sib);
                            let new_grand_parent = rotate(parent, rotation);
                            (*new_grand_parent).color = (*parent).color;
                            (*parent).color = Color::Black;
                            (*current).color = Color::Red;
                            self.replace_child_or_root(grand_parent, parent, new_grand_parent);
                            if parent == matched {
                                parent_of_match = new_grand_parent;
                            }
                        }
                    }
                }

                // after the match, keep descending to its in-order successor
                let order = if matched.is_null() {
                    item.cmp(<T as Borrow<Q>>::borrow(&(*current).item))
                } else {
                    Ordering::Less
                };
                if order == Ordering::Equal {
                    matched = current;
                    parent_of_match = parent;
                }
                grand_parent = parent;
                parent = current;
                current = if order == Ordering::Less {
                    (*current).left
                } else {
                    (*current).right
                };
            }

            let taken = NonNull::new(matched).map(|node| {
                self.replace_node(matched, parent_of_match, parent, grand_parent);
                self.len -= 1;
                self.nodes.take(node).item
            });
            if !self.root.is_null() {
                (*self.root).color = Color::Black;
            }
            taken
        }
    }
}

impl<T> Drop for SortedSet<T> {
    fn drop(&mut self) {
        self.release_all();
    }
}

impl<T: Ord> Extend<T> for SortedSet<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for item in iter {
            self.add(item);
        }
    }
}

impl<'a, T> IntoIterator for &'a SortedSet<T> {
    type Item = &'a T;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<T: fmt::Debug> fmt::Debug for SortedSet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl<T> Cursored for SortedSet<T> {
    type Item<'a>
        = &'a T
    where
        Self: 'a;
    type Position = SortedSetPosition<T>;

    fn version(&self) -> u32 {
        self.version
    }

    fn start(&self) -> SortedSetPosition<T> {
        let mut stack = Vec::new();
        // SAFETY: tree nodes are live
        unsafe { push_left_spine(&mut stack, self.root) };
        SortedSetPosition { stack }
    }

    fn advance<'a>(&'a self, position: &mut SortedSetPosition<T>) -> Option<&'a T> {
        let node = position.stack.pop()?;
        // SAFETY: the version check guarantees the stack still matches the tree
        unsafe {
            push_left_spine(&mut position.stack, (*node).right);
            Some(&(*node).item)
        }
    }

    fn identity(&self) -> usize {
        self.id
    }
}

/// Where a [`SortedSet`] cursor stands: the pending ancestors of the walk,
/// innermost last.
pub struct SortedSetPosition<T> {
    stack: Vec<*const Node<T>>,
}

impl<T> fmt::Debug for SortedSetPosition<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SortedSetPosition")
            .field("depth", &self.stack.len())
            .finish()
    }
}

/// In-order iterator over a [`SortedSet`].
pub struct Iter<'a, T> {
    stack: Vec<*const Node<T>>,
    remaining: usize,
    _marker: PhantomData<&'a T>,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<&'a T> {
        let node = self.stack.pop()?;
        self.remaining -= 1;
        // SAFETY: the set is borrowed for 'a, so the tree is unchanged
        unsafe {
            push_left_spine(&mut self.stack, (*node).right);
            Some(&(*node).item)
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<T> ExactSizeIterator for Iter<'_, T> {}
