//! Per-type lifetime histograms
//!
//! For each type tag, entry `i` counts the objects of that type observed at
//! exactly age `i`. Rows only grow; a row always covers the largest age
//! recorded for its type.

use alloctrace_util::IndexVec;

use crate::invariant;
use crate::object::TypeTag;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LifetimeTable {
    rows: IndexVec<TypeTag, Vec<u64>>,
}

impl LifetimeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one object of `type_tag` at `age`
    ///
    /// # Panics
    ///
    /// When `age` cannot index a row on this platform.
    pub fn record(&mut self, type_tag: TypeTag, age: u64) {
        let len = usize::try_from(age)
            .ok()
            .and_then(|slot| slot.checked_add(1))
            .unwrap_or(0);
        invariant!(len != 0, "age {} does not fit a histogram row", age);

        let row = self.rows.ensure_mut(type_tag);
        if len > row.len() {
            row.resize(len, 0);
        }
        row[len - 1] += 1;
    }

    /// Histogram row for `type_tag` (empty when nothing was recorded)
    pub fn get(&self, type_tag: TypeTag) -> &[u64] {
        self.rows.get(type_tag).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Non-empty rows in type order
    pub fn iter(&self) -> impl Iterator<Item = (TypeTag, &[u64])> {
        self.rows
            .iter_enumerated()
            .filter(|(_, row)| !row.is_empty())
            .map(|(tag, row)| (tag, row.as_slice()))
    }

    /// Largest age recorded for any type
    pub fn max_age(&self) -> Option<u64> {
        self.rows
            .iter()
            .filter_map(|row| row.len().checked_sub(1))
            .max()
            .map(|age| age as u64)
    }

    /// Objects recorded for `type_tag`
    pub fn total(&self, type_tag: TypeTag) -> u64 {
        self.get(type_tag).iter().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.iter().all(Vec::is_empty)
    }

    pub fn clear(&mut self) {
        self.rows.clear();
    }
}
