//! `MarkableReference<T>`: an atomically replaced (reference, mark) pair.

use std::fmt;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use crossbeam_epoch::{self as epoch, Atomic, Guard, Owned, Shared};
use crossbeam_utils::Backoff;
use tracing::trace;

use crate::error::CompareExchangeError;
use crate::pair::{same_reference, Pair};

/// A reference and a boolean mark that are read and updated together.
///
/// The cell stores a pointer to an immutable [`Pair`]. Writers never touch
/// the fields of the current pair; they allocate a new one and swap the
/// pointer, so a reader observes either the old combination or the new one.
///
/// Old pairs are retired through the epoch collector and freed once no pinned
/// thread can still be reading them. This is why `T` must be
/// `Send + Sync + 'static`: the last `Arc<T>` of a retired pair may be
/// dropped later, on another thread.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use strand_markable::MarkableReference;
///
/// let node = Arc::new("node");
/// let next = MarkableReference::new(Some(node.clone()), false);
///
/// // Logically delete: keep the reference, set the mark.
/// assert!(next.attempt_mark(Some(&node), true));
/// assert!(next.is_marked());
///
/// // Anyone still expecting the unmarked state now fails.
/// assert!(!next.compare_and_set(Some(&node), None, false, false));
/// ```
pub struct MarkableReference<T: Send + Sync + 'static> {
    pair: Atomic<Pair<T>>,
}

impl<T: Send + Sync + 'static> MarkableReference<T> {
    /// Creates a cell holding `reference` and `mark`.
    pub fn new(reference: Option<Arc<T>>, mark: bool) -> Self {
        Self::from(Pair::new(reference, mark))
    }

    #[inline]
    fn current<'g>(&self, guard: &'g Guard) -> (Shared<'g, Pair<T>>, &'g Pair<T>) {
        let shared = self.pair.load(Ordering::Acquire, guard);
        // SAFETY: the cell is never null while `self` is alive, and the pair
        // cannot be reclaimed before `guard` is dropped.
        (shared, unsafe { shared.deref() })
    }

    /// Returns a consistent snapshot of the current pair.
    pub fn load(&self) -> Pair<T> {
        let guard = &epoch::pin();
        self.current(guard).1.clone()
    }

    /// Returns the current reference and mark, observed together.
    pub fn get(&self) -> (Option<Arc<T>>, bool) {
        self.load().into_parts()
    }

    /// Returns the current reference.
    pub fn get_reference(&self) -> Option<Arc<T>> {
        let guard = &epoch::pin();
        self.current(guard).1.reference().cloned()
    }

    /// Returns the current mark.
    pub fn is_marked(&self) -> bool {
        let guard = &epoch::pin();
        self.current(guard).1.is_marked()
    }

    /// Unconditionally installs `reference` and `mark`.
    pub fn set(&self, reference: Option<Arc<T>>, mark: bool) {
        let guard = &epoch::pin();
        let old = self.pair.swap(
            Owned::new(Pair::new(reference, mark)),
            Ordering::AcqRel,
            guard,
        );
        // SAFETY: `old` is no longer reachable from the cell.
        unsafe { guard.defer_destroy(old) };
    }

    /// Installs `new_reference` and `new_mark` if the cell currently holds
    /// `expected_reference` and `expected_mark`.
    ///
    /// Both fields must match; a mismatch on either one fails without
    /// touching the cell. If the cell already holds the requested new state
    /// this succeeds without writing anything.
    ///
    /// Losing the pointer swap to a writer that installed a pair with the
    /// same contents is not a failure: the expectation is checked again
    /// against the new pair. On failure the error carries the pair that
    /// contradicted the expectation.
    pub fn compare_exchange(
        &self,
        expected_reference: Option<&Arc<T>>,
        new_reference: Option<Arc<T>>,
        expected_mark: bool,
        new_mark: bool,
    ) -> Result<(), CompareExchangeError<T>> {
        let guard = &epoch::pin();
        let backoff = Backoff::new();
        let mut replacement = Owned::new(Pair::new(new_reference, new_mark));

        loop {
            let (current, pair) = self.current(guard);

            if !pair.matches(expected_reference, expected_mark) {
                let (new, _) = replacement.into_box().into_parts();
                return Err(CompareExchangeError {
                    current: pair.clone(),
                    new,
                });
            }

            if pair.matches(replacement.reference(), replacement.is_marked()) {
                return Ok(());
            }

            match self.pair.compare_exchange(
                current,
                replacement,
                Ordering::AcqRel,
                Ordering::Acquire,
                guard,
            ) {
                Ok(_) => {
                    // SAFETY: `current` was just unlinked by our swap.
                    unsafe { guard.defer_destroy(current) };
                    return Ok(());
                }
                Err(e) => {
                    trace!("markable reference swap lost a race");
                    replacement = e.new;
                }
            }

            backoff.spin();
        }
    }

    /// Boolean form of [`compare_exchange`](Self::compare_exchange).
    pub fn compare_and_set(
        &self,
        expected_reference: Option<&Arc<T>>,
        new_reference: Option<Arc<T>>,
        expected_mark: bool,
        new_mark: bool,
    ) -> bool {
        self.compare_exchange(expected_reference, new_reference, expected_mark, new_mark)
            .is_ok()
    }

    /// Sets the mark to `new_mark` if the cell currently holds
    /// `expected_reference`, whatever the current mark is.
    ///
    /// Succeeds without writing if the mark already equals `new_mark`.
    pub fn attempt_mark(&self, expected_reference: Option<&Arc<T>>, new_mark: bool) -> bool {
        let guard = &epoch::pin();
        let backoff = Backoff::new();

        loop {
            let (current, pair) = self.current(guard);

            if !same_reference(pair.reference(), expected_reference) {
                return false;
            }
            if pair.is_marked() == new_mark {
                return true;
            }

            let marked = Owned::new(Pair::new(pair.reference().cloned(), new_mark));
            if self
                .pair
                .compare_exchange(current, marked, Ordering::AcqRel, Ordering::Acquire, guard)
                .is_ok()
            {
                // SAFETY: `current` was just unlinked by our swap.
                unsafe { guard.defer_destroy(current) };
                return true;
            }

            trace!("markable reference mark lost a race");
            backoff.spin();
        }
    }

    /// Consumes the cell and returns the pair it held.
    pub fn into_inner(self) -> Pair<T> {
        // SAFETY: owning `self` rules out concurrent access. The cell is left
        // null so that `Drop` has nothing to free.
        unsafe {
            let guard = epoch::unprotected();
            let shared = self.pair.swap(Shared::null(), Ordering::Relaxed, guard);
            *shared.into_owned().into_box()
        }
    }
}

impl<T: Send + Sync + 'static> Drop for MarkableReference<T> {
    fn drop(&mut self) {
        // SAFETY: `&mut self` rules out concurrent access; retired pairs are
        // owned by the collector, only the current one is ours to free.
        unsafe {
            let guard = epoch::unprotected();
            let shared = self.pair.load(Ordering::Relaxed, guard);
            if !shared.is_null() {
                drop(shared.into_owned());
            }
        }
    }
}

impl<T: Send + Sync + 'static> Default for MarkableReference<T> {
    /// An empty, unmarked cell.
    fn default() -> Self {
        Self::from(Pair::default())
    }
}

impl<T: Send + Sync + 'static> From<Pair<T>> for MarkableReference<T> {
    fn from(pair: Pair<T>) -> Self {
        Self {
            pair: Atomic::new(pair),
        }
    }
}

impl<T: Send + Sync + 'static + fmt::Debug> fmt::Debug for MarkableReference<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pair = self.load();
        f.debug_struct("MarkableReference")
            .field("reference", &pair.reference())
            .field("mark", &pair.is_marked())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair_ptr<T: Send + Sync + 'static>(cell: &MarkableReference<T>) -> *const Pair<T> {
        let guard = &epoch::pin();
        cell.pair.load(Ordering::Acquire, guard).as_raw()
    }

    #[test]
    fn idempotent_success_does_not_swap() {
        let r = Arc::new(5);
        let cell = MarkableReference::new(Some(r.clone()), true);
        let before = pair_ptr(&cell);

        assert!(cell.compare_and_set(Some(&r), Some(r.clone()), true, true));
        assert_eq!(pair_ptr(&cell), before);
    }

    #[test]
    fn failed_cas_does_not_swap() {
        let r = Arc::new(5);
        let other = Arc::new(6);
        let cell = MarkableReference::new(Some(r.clone()), false);
        let before = pair_ptr(&cell);

        assert!(!cell.compare_and_set(Some(&other), None, false, true));
        assert!(!cell.compare_and_set(Some(&r), None, true, true));
        assert_eq!(pair_ptr(&cell), before);
    }

    #[test]
    fn every_update_installs_a_fresh_pair() {
        let cell: MarkableReference<u8> = MarkableReference::default();
        let first = pair_ptr(&cell);

        cell.set(None, true);
        let second = pair_ptr(&cell);
        assert_ne!(first, second);

        assert!(cell.attempt_mark(None, false));
        assert_ne!(pair_ptr(&cell), second);
    }

    #[test]
    fn into_inner_leaves_nothing_to_drop() {
        let r = Arc::new(String::from("owned"));
        let cell = MarkableReference::new(Some(r.clone()), true);
        assert_eq!(Arc::strong_count(&r), 2);

        let pair = cell.into_inner();
        assert!(pair.is_marked());
        assert_eq!(Arc::strong_count(&r), 2);
        drop(pair);
        assert_eq!(Arc::strong_count(&r), 1);
    }
}
