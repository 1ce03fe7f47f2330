//! Deep merge with array replacement.
//!
//! `lower.merge(&upper)` overlays `upper` on `lower`:
//! - maps and option structs merge field by field, recursively
//! - lists and scalars are replaced wholesale, never concatenated
//! - an unset (`None`) upper field leaves the lower value in place
//!
//! Merging a value with itself is a no-op.

use indexmap::{IndexMap, IndexSet};
use std::hash::Hash;

/// Overlay semantics used to combine route rules.
pub trait Merge {
    /// Merge `upper` into `self`; `upper` wins where both define a value.
    fn merge(&mut self, upper: &Self);
}

impl<T: Merge + Clone> Merge for Option<T> {
    fn merge(&mut self, upper: &Self) {
        match (self.as_mut(), upper) {
            (_, None) => {}
            (Some(lower), Some(upper)) => lower.merge(upper),
            (None, Some(upper)) => *self = Some(upper.clone()),
        }
    }
}

macro_rules! replace_on_merge {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Merge for $ty {
                fn merge(&mut self, upper: &Self) {
                    *self = upper.clone();
                }
            }
        )*
    };
}

replace_on_merge!(bool, u32, u64, usize, String);

impl<T: Clone> Merge for Vec<T> {
    fn merge(&mut self, upper: &Self) {
        *self = upper.clone();
    }
}

impl<T: Clone + Hash + Eq> Merge for IndexSet<T> {
    fn merge(&mut self, upper: &Self) {
        *self = upper.clone();
    }
}

impl<K, V> Merge for IndexMap<K, V>
where
    K: Clone + Hash + Eq,
    V: Merge + Clone,
{
    fn merge(&mut self, upper: &Self) {
        for (key, value) in upper {
            match self.get_mut(key) {
                Some(existing) => existing.merge(value),
                None => {
                    self.insert(key.clone(), value.clone());
                }
            }
        }
    }
}
