//! Detached, version-checked enumeration.
//!
//! Borrowing iterators (`iter()`) cover the common case: the borrow checker
//! rules out mutation while they are alive. A [`Cursor`] instead holds no
//! borrow between steps. It records the collection's version when created and
//! fails with [`CollectionError::VersionChanged`] once the collection has been
//! structurally modified since.
//!
//! ```
//! use native_collections::{CollectionError, List};
//!
//! let mut list = List::new();
//! list.push(1);
//! list.push(2);
//!
//! let mut cursor = list.cursor();
//! assert_eq!(cursor.next(&list), Ok(Some(&1)));
//!
//! list.push(3);
//! assert_eq!(cursor.next(&list), Err(CollectionError::VersionChanged));
//! ```

use crate::CollectionError;

/// A collection that can be walked by a [`Cursor`].
pub trait Cursored {
    /// Item yielded per step.
    type Item<'a>
    where
        Self: 'a;

    /// Where the walk currently stands.
    type Position;

    /// Structural modification counter.
    fn version(&self) -> u32;

    /// Position before the first item.
    fn start(&self) -> Self::Position;

    /// Yields the item at `position` and moves past it, or `None` at the end.
    ///
    /// Called only while the version matches the one `position` was created
    /// under.
    fn advance<'a>(&'a self, position: &mut Self::Position) -> Option<Self::Item<'a>>;

    /// Identifies the collection instance when positions hold raw node
    /// pointers. Collections whose positions are plain indices return 0.
    fn identity(&self) -> usize {
        0
    }
}

/// Lifecycle of a [`Cursor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    /// Created, no item yielded yet.
    Uninitialized,
    /// At least one item yielded.
    Enumerating,
    /// Ran past the last item.
    Done,
}

/// Version-checked position into a [`Cursored`] collection.
pub struct Cursor<C: Cursored> {
    version: u32,
    identity: usize,
    position: Option<C::Position>,
    state: CursorState,
}

impl<C: Cursored> Cursor<C> {
    /// Starts a cursor at the beginning of `collection`.
    pub fn new(collection: &C) -> Self {
        Self {
            version: collection.version(),
            identity: collection.identity(),
            position: None,
            state: CursorState::Uninitialized,
        }
    }

    /// Current lifecycle state.
    #[inline]
    pub fn state(&self) -> CursorState {
        self.state
    }

    /// Yields the next item.
    ///
    /// Fails with [`CollectionError::VersionChanged`] if `collection` was
    /// structurally modified since the cursor was created or last reset.
    pub fn next<'a>(&mut self, collection: &'a C) -> Result<Option<C::Item<'a>>, CollectionError> {
        if collection.identity() != self.identity {
            return Err(CollectionError::invalid(
                "collection",
                collection.identity(),
                "cursor belongs to another collection",
            ));
        }
        if collection.version() != self.version {
            return Err(CollectionError::VersionChanged);
        }
        if self.state == CursorState::Done {
            return Ok(None);
        }

        let position = self.position.get_or_insert_with(|| collection.start());
        match collection.advance(position) {
            Some(item) => {
                self.state = CursorState::Enumerating;
                Ok(Some(item))
            }
            None => {
                self.state = CursorState::Done;
                self.position = None;
                Ok(None)
            }
        }
    }

    /// Rewinds to the beginning and adopts the collection's current version.
    pub fn reset(&mut self, collection: &C) {
        self.version = collection.version();
        self.identity = collection.identity();
        self.position = None;
        self.state = CursorState::Uninitialized;
    }
}

impl<C: Cursored> std::fmt::Debug for Cursor<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cursor")
            .field("version", &self.version)
            .field("state", &self.state)
            .finish()
    }
}
