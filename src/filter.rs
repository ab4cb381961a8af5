//! Limit + predicate filters shared by the job ledger and the token store.

use std::fmt;
use std::sync::Arc;

/// A first-class predicate over records of type `T`.
pub type Predicate<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;

/// Builds a [`Predicate`] from a closure.
pub fn predicate<T>(f: impl Fn(&T) -> bool + Send + Sync + 'static) -> Predicate<T> {
    Arc::new(f)
}

/// Logical AND of every predicate; an empty set matches everything.
pub fn multi_match<T: 'static>(predicates: Vec<Predicate<T>>) -> Predicate<T> {
    Arc::new(move |item: &T| predicates.iter().all(|p| p(item)))
}

/// Bounds a scan: at most `limit` records for which `matcher` holds.
///
/// A limit of zero yields nothing. A filter without a matcher accepts every
/// record.
pub struct Filter<T> {
    pub limit: usize,
    pub matcher: Option<Predicate<T>>,
}

impl<T: 'static> Filter<T> {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            matcher: None,
        }
    }

    /// Adds `p` to the filter, AND-ed with whatever is already there.
    pub fn with(mut self, p: Predicate<T>) -> Self {
        self.matcher = Some(match self.matcher.take() {
            Some(existing) => multi_match(vec![existing, p]),
            None => p,
        });
        self
    }

    pub fn matches(&self, item: &T) -> bool {
        self.matcher.as_ref().is_none_or(|m| m(item))
    }

    /// Applies the filter to an already ordered sequence.
    pub fn apply(&self, items: impl IntoIterator<Item = T>) -> Vec<T> {
        if self.limit == 0 {
            return Vec::new();
        }
        items
            .into_iter()
            .filter(|item| self.matches(item))
            .take(self.limit)
            .collect()
    }
}

impl<T> Clone for Filter<T> {
    fn clone(&self) -> Self {
        Self {
            limit: self.limit,
            matcher: self.matcher.clone(),
        }
    }
}

impl<T> fmt::Debug for Filter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Filter")
            .field("limit", &self.limit)
            .field("matcher", &self.matcher.as_ref().map(|_| "<predicate>"))
            .finish()
    }
}
