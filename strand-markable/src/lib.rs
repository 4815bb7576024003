//! Atomic markable reference for Strand.
//!
//! A [`MarkableReference`] holds an optional shared reference together with a
//! boolean mark and updates both in a single compare-and-set. Lock-free lists
//! and skip lists use the mark to flag a node as logically deleted while it is
//! still linked.
//!
//! Both fields live in one immutable [`Pair`]. Every update allocates a new
//! pair and swaps the whole cell, so readers never see a reference from one
//! update combined with the mark of another. Superseded pairs are reclaimed
//! through `crossbeam-epoch`.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use strand_markable::MarkableReference;
//!
//! let x = Arc::new(1);
//! let y = Arc::new(2);
//!
//! let cell = MarkableReference::new(Some(x.clone()), false);
//! assert!(cell.compare_and_set(Some(&x), Some(y.clone()), false, false));
//!
//! let (reference, marked) = cell.get();
//! assert!(Arc::ptr_eq(&reference.unwrap(), &y));
//! assert!(!marked);
//!
//! // Stale expectation: nothing changes.
//! assert!(!cell.compare_and_set(Some(&x), None, false, true));
//! ```

#![warn(missing_docs)]

mod error;
mod markable;
mod pair;

pub use error::CompareExchangeError;
pub use markable::MarkableReference;
pub use pair::Pair;
