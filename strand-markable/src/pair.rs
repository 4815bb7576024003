use std::fmt;
use std::sync::Arc;

/// An immutable (reference, mark) combination.
///
/// References are compared by identity, not by value: two pairs hold the same
/// reference only if both point at the same allocation, or both are empty.
pub struct Pair<T> {
    reference: Option<Arc<T>>,
    mark: bool,
}

impl<T> Pair<T> {
    /// Creates a pair from its two parts.
    pub fn new(reference: Option<Arc<T>>, mark: bool) -> Self {
        Self { reference, mark }
    }

    /// The reference held by this pair.
    pub fn reference(&self) -> Option<&Arc<T>> {
        self.reference.as_ref()
    }

    /// The mark held by this pair.
    pub fn is_marked(&self) -> bool {
        self.mark
    }

    /// Splits the pair into its reference and mark.
    pub fn into_parts(self) -> (Option<Arc<T>>, bool) {
        (self.reference, self.mark)
    }

    /// Whether this pair holds exactly `reference` and `mark`.
    ///
    /// Fails on any single-field mismatch.
    pub fn matches(&self, reference: Option<&Arc<T>>, mark: bool) -> bool {
        self.mark == mark && same_reference(self.reference.as_ref(), reference)
    }
}

pub(crate) fn same_reference<T>(a: Option<&Arc<T>>, b: Option<&Arc<T>>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => Arc::ptr_eq(a, b),
        (None, None) => true,
        _ => false,
    }
}

impl<T> Clone for Pair<T> {
    fn clone(&self) -> Self {
        Self {
            reference: self.reference.clone(),
            mark: self.mark,
        }
    }
}

impl<T> Default for Pair<T> {
    fn default() -> Self {
        Self::new(None, false)
    }
}

impl<T> PartialEq for Pair<T> {
    fn eq(&self, other: &Self) -> bool {
        other.matches(self.reference(), self.mark)
    }
}

impl<T> Eq for Pair<T> {}

impl<T: fmt::Debug> fmt::Debug for Pair<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pair")
            .field("reference", &self.reference)
            .field("mark", &self.mark)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_not_value() {
        let a = Arc::new(7);
        let b = Arc::new(7);

        let pair = Pair::new(Some(a.clone()), false);
        assert!(pair.matches(Some(&a), false));
        assert!(!pair.matches(Some(&b), false));
    }

    #[test]
    fn any_field_mismatch_fails() {
        let a = Arc::new(1);
        let b = Arc::new(2);
        let pair = Pair::new(Some(a.clone()), false);

        assert!(!pair.matches(Some(&a), true));
        assert!(!pair.matches(Some(&b), false));
        assert!(!pair.matches(Some(&b), true));
        assert!(!pair.matches(None, false));
    }

    #[test]
    fn empty_references_are_equal() {
        let pair: Pair<u32> = Pair::default();
        assert!(pair.matches(None, false));
        assert_eq!(pair, Pair::new(None, false));
        assert_ne!(pair, Pair::new(None, true));
    }
}
