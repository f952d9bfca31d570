//! Manually managed containers over raw and pooled memory.
//!
//! Every container here keeps its elements in memory it allocated itself,
//! through [`native_pool`]: contiguous [`RawBuffer`](native_pool::RawBuffer)s
//! for the array-backed structures, slab pools for the node-based ones.
//! Nothing is reference counted and nothing is traced; dropping a container
//! drops its live elements and hands its memory back.
//!
//! # Data Structures
//!
//! | Structure | Backing | Notes |
//! |-----------|---------|-------|
//! | [`List`] | raw buffer | growable array, `insert`/`remove_at` shift |
//! | [`Stack`] | raw buffer | LIFO |
//! | [`PriorityQueue`] | raw buffer | 4-ary min-heap, priority stored beside the element |
//! | [`Dictionary`] / [`HashSet`] | bucket + entry arrays | chained, prime-sized, free-list reuse |
//! | [`ConcurrentDictionary`] | pooled nodes | lock-free reads, striped writes, live resize |
//! | [`SortedSet`] | pooled nodes | top-down red-black tree |
//! | [`SortedList`] | parallel arrays | binary search |
//! | [`MemoryStream`] | raw buffer | `std::io` read/write/seek |
//! | [`MemoryReader`] / [`MemoryWriter`] | borrowed bytes | [`Pod`](native_pool::Pod) values |
//! | [`ArraySegment`] | borrowed slice | `(array, offset, count)` window |
//!
//! # Enumeration
//!
//! `iter()` borrows the container, so it cannot be modified while iterated.
//! When enumeration has to outlive a borrow, take a [`Cursor`]: it carries
//! the container's version and fails with
//! [`CollectionError::VersionChanged`] once the container is structurally
//! modified.
//!
//! ```
//! use native_collections::{CollectionError, List};
//!
//! let mut list: List<u32> = (0..3).collect();
//! let mut cursor = list.cursor();
//! assert_eq!(cursor.next(&list), Ok(Some(&0)));
//!
//! list.push(3);
//! assert_eq!(cursor.next(&list), Err(CollectionError::VersionChanged));
//! ```
//!
//! # Thread Safety
//!
//! Only [`ConcurrentDictionary`] is `Sync`. The other containers are `Send`
//! when their elements are and are meant to be owned by one thread at a time.
//!
//! ```
//! use std::sync::Arc;
//! use std::thread;
//! use native_collections::ConcurrentDictionary;
//!
//! let map = Arc::new(ConcurrentDictionary::<u64, u64>::new().unwrap());
//! let handles: Vec<_> = (0..4u64)
//!     .map(|t| {
//!         let map = Arc::clone(&map);
//!         thread::spawn(move || {
//!             for i in 0..100 {
//!                 map.try_add(t * 100 + i, i);
//!             }
//!         })
//!     })
//!     .collect();
//! for h in handles {
//!     h.join().unwrap();
//! }
//! assert_eq!(map.len(), 400);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

mod array_segment;
pub mod concurrent_dictionary;
mod cursor;
pub mod dictionary;
mod error;
pub mod hash_helpers;
pub mod hash_set;
mod list;
mod memory;
mod memory_stream;
pub mod priority_queue;
pub mod sorted_list;
pub mod sorted_set;
mod stack;
mod table;

pub use array_segment::ArraySegment;
pub use concurrent_dictionary::{ConcurrentDictionary, ConcurrentDictionaryBuilder};
pub use cursor::{Cursor, CursorState, Cursored};
pub use dictionary::Dictionary;
pub use error::CollectionError;
pub use hash_set::HashSet;
pub use list::List;
pub use memory::{MemoryReader, MemoryWriter};
pub use memory_stream::{MemoryStream, SeekOrigin};
pub use native_pool::PoolError;
pub use priority_queue::PriorityQueue;
pub use sorted_list::SortedList;
pub use sorted_set::{SortedSet, SortedSetPosition};
pub use stack::Stack;
