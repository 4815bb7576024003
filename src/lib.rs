//! Strand: lock-free building blocks for concurrent data structures.
//!
//! Two independent primitives, neither of which ever blocks a thread on a
//! lock:
//!
//! - [`LockFreeQueue`]: an unbounded multi-producer multi-consumer FIFO queue
//!   (Michael-Scott, sentinel node, cooperative tail advancement).
//! - [`MarkableReference`]: a reference and a boolean mark updated together by
//!   a single compare-and-set, for logically deleting nodes in lock-free lists
//!   and skip lists.
//!
//! Unlinked queue nodes and superseded reference pairs are reclaimed with
//! epoch-based reclamation (`crossbeam-epoch`).
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use strand::{LockFreeQueue, MarkableReference};
//!
//! let q = LockFreeQueue::new();
//! q.push("job");
//! assert_eq!(q.pop(), Some("job"));
//! assert_eq!(q.pop(), None);
//!
//! let node = Arc::new(1);
//! let link = MarkableReference::new(Some(node.clone()), false);
//! assert!(link.attempt_mark(Some(&node), true));
//! assert!(link.is_marked());
//! ```

#![warn(missing_docs)]

pub use strand_markable::{CompareExchangeError, MarkableReference, Pair};
pub use strand_queue::{IntoIter, LockFreeQueue};
