//! Global per-type allocation and free counters.

use alloctrace_util::IndexVec;

use crate::object::TypeTag;

/// Counts indexed by type tag, as handed to callers
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TypeCounts {
    counts: IndexVec<TypeTag, u64>,
}

impl TypeCounts {
    /// Count for `type_tag` (0 for tags never seen)
    pub fn get(&self, type_tag: TypeTag) -> u64 {
        self.counts.get(type_tag).copied().unwrap_or(0)
    }

    /// Every slot in type order, including zeros
    pub fn iter(&self) -> impl Iterator<Item = (TypeTag, u64)> + '_ {
        self.counts.iter_enumerated().map(|(tag, count)| (tag, *count))
    }

    /// Slots with a non-zero count
    pub fn nonzero(&self) -> impl Iterator<Item = (TypeTag, u64)> + '_ {
        self.iter().filter(|(_, count)| *count > 0)
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn as_slice(&self) -> &[u64] {
        self.counts.as_slice()
    }
}

/// Objects ever allocated and ever freed, by type
#[derive(Clone, Debug, Default)]
pub struct TypeCounters {
    allocated: TypeCounts,
    freed: TypeCounts,
    hint: usize,
}

impl TypeCounters {
    /// Counters pre-sized for `hint` type tags
    pub fn with_hint(hint: usize) -> Self {
        let mut counters = Self {
            hint,
            ..Self::default()
        };
        counters.reset();
        counters
    }

    #[inline]
    pub fn count_allocated(&mut self, type_tag: TypeTag) {
        *self.allocated.counts.ensure_mut(type_tag) += 1;
    }

    #[inline]
    pub fn count_freed(&mut self, type_tag: TypeTag) {
        *self.freed.counts.ensure_mut(type_tag) += 1;
    }

    pub fn allocated(&self) -> &TypeCounts {
        &self.allocated
    }

    pub fn freed(&self) -> &TypeCounts {
        &self.freed
    }

    /// Zero every count, keeping the pre-sized length
    pub fn reset(&mut self) {
        for counts in [&mut self.allocated, &mut self.freed] {
            counts.counts.clear();
            counts.counts.resize_with(self.hint, || 0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_by_type() {
        let mut counters = TypeCounters::with_hint(4);
        counters.count_allocated(TypeTag(1));
        counters.count_allocated(TypeTag(1));
        counters.count_freed(TypeTag(1));

        assert_eq!(counters.allocated().get(TypeTag(1)), 2);
        assert_eq!(counters.freed().get(TypeTag(1)), 1);
        assert_eq!(counters.allocated().len(), 4);
    }

    #[test]
    fn test_growth_beyond_hint() {
        let mut counters = TypeCounters::with_hint(2);
        counters.count_freed(TypeTag(10));
        assert_eq!(counters.freed().len(), 11);
        assert_eq!(counters.freed().get(TypeTag(10)), 1);
        assert_eq!(counters.freed().get(TypeTag(99)), 0);
    }

    #[test]
    fn test_nonzero_and_total() {
        let mut counters = TypeCounters::with_hint(8);
        counters.count_allocated(TypeTag(3));
        counters.count_allocated(TypeTag(5));
        let seen: Vec<_> = counters.allocated().nonzero().collect();
        assert_eq!(seen, vec![(TypeTag(3), 1), (TypeTag(5), 1)]);
        assert_eq!(counters.allocated().total(), 2);
    }

    #[test]
    fn test_reset_keeps_hint_length() {
        let mut counters = TypeCounters::with_hint(3);
        counters.count_allocated(TypeTag(7));
        counters.reset();
        assert_eq!(counters.allocated().as_slice(), &[0, 0, 0]);
    }
}
