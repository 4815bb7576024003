use std::fmt;
use std::sync::Arc;

use crate::pair::Pair;

/// Returned by [`MarkableReference::compare_exchange`] when the swap did not
/// happen.
///
/// Carries the pair that was observed instead of the expected one, and hands
/// the rejected new reference back to the caller.
///
/// [`MarkableReference::compare_exchange`]: crate::MarkableReference::compare_exchange
pub struct CompareExchangeError<T> {
    /// The pair stored in the cell when the operation gave up.
    pub current: Pair<T>,
    /// The reference that would have been installed.
    pub new: Option<Arc<T>>,
}

impl<T: fmt::Debug> fmt::Debug for CompareExchangeError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompareExchangeError")
            .field("current", &self.current)
            .field("new", &self.new)
            .finish()
    }
}

impl<T> fmt::Display for CompareExchangeError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reference = if self.current.reference().is_some() {
            "set"
        } else {
            "empty"
        };
        write!(
            f,
            "markable reference changed: current reference is {}, mark is {}",
            reference,
            self.current.is_marked()
        )
    }
}

impl<T: fmt::Debug> std::error::Error for CompareExchangeError<T> {}
