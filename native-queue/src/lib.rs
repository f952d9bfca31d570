//! # native-queue
//!
//! Lock-free concurrent containers over pooled memory.
//!
//! ## Features
//!
//! - [`ConcurrentQueue`]: unbounded MPMC FIFO built from linked ring segments
//!   that double in length as the queue grows
//! - [`ConcurrentStack`]: unbounded lock-free LIFO
//!
//! Both rent their internal nodes from `native_pool` pools and hand retired
//! nodes back through epoch-based reclamation, so steady-state traffic does
//! not touch the global allocator.
//!
//! ## Example
//!
//! ```
//! use native_queue::ConcurrentQueue;
//!
//! let queue = ConcurrentQueue::new().unwrap();
//! queue.enqueue(42u64);
//! assert_eq!(queue.try_dequeue(), Some(42));
//! assert_eq!(queue.try_dequeue(), None);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

mod queue;
mod stack;

pub use native_pool::PoolError;
pub use queue::{ConcurrentQueue, ConcurrentQueueBuilder};
pub use stack::ConcurrentStack;
