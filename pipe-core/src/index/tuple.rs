//! Total order sum tuples.

use std::cmp::Ordering;
use std::fmt;

/// A fixed-length tuple of non-negative integers used to give progress indices a stable,
/// deterministic sort order.
///
/// Tuples are compared by length first, a shorter tuple always preceding a longer one. Tuples of
/// equal length are compared element-wise starting from the *last* element.
///
/// This ordering is only an approximation of progress and must never be used to decide whether
/// one progress index is actually after another. See `ProgressIndex::is_after` for that.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct TotalOrderSumTuple(Vec<u64>);

impl TotalOrderSumTuple {
    /// Create a new tuple from the given values.
    pub fn new(values: Vec<u64>) -> Self {
        Self(values)
    }

    /// The values of this tuple.
    pub fn values(&self) -> &[u64] {
        &self.0
    }

    /// The length of this tuple.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Sum the given tuples element-wise.
    ///
    /// Shorter tuples are padded with zeros on the right up to the length of the longest tuple.
    /// The sum of an empty list is the empty tuple.
    pub fn sum<'a, I>(tuples: I) -> Self
    where
        I: IntoIterator<Item = &'a TotalOrderSumTuple>,
    {
        let mut acc: Vec<u64> = Vec::new();
        for tuple in tuples {
            if tuple.0.len() > acc.len() {
                acc.resize(tuple.0.len(), 0);
            }
            for (slot, val) in acc.iter_mut().zip(tuple.0.iter()) {
                *slot = slot.saturating_add(*val);
            }
        }
        Self(acc)
    }
}

impl From<Vec<u64>> for TotalOrderSumTuple {
    fn from(values: Vec<u64>) -> Self {
        Self(values)
    }
}

impl Ord for TotalOrderSumTuple {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .len()
            .cmp(&other.0.len())
            .then_with(|| self.0.iter().rev().cmp(other.0.iter().rev()))
    }
}

impl PartialOrd for TotalOrderSumTuple {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for TotalOrderSumTuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (idx, val) in self.0.iter().enumerate() {
            if idx > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", val)?;
        }
        write!(f, ")")
    }
}
