//! Unbounded lock-free queue for Strand.
//!
//! ## Features
//!
//! - `LockFreeQueue`: Unbounded MPMC FIFO queue (Michael-Scott, sentinel based).
//!
//! Unlinked nodes are reclaimed through `crossbeam-epoch`, so no node is freed
//! while another thread may still be walking over it.
//!
//! ## Usage
//!
//! ```rust
//! use strand_queue::LockFreeQueue;
//!
//! let q = LockFreeQueue::new();
//! q.push(1);
//! q.push(2);
//! assert_eq!(q.peek(), Some(1));
//! assert_eq!(q.pop(), Some(1));
//! assert_eq!(q.len(), 1);
//! ```

pub mod queue;

pub use queue::{IntoIter, LockFreeQueue};
