//! Result views
//!
//! A [`Snapshot`] is the union of the stored freed-object aggregates and a
//! transient aggregation over the objects still alive when it was taken.
//! Keys are resolved to owned values, so a snapshot stays valid after the
//! tracer moves on or is cleared.

use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

use alloctrace_util::PathInterner;
use indexmap::IndexMap;

use crate::aggregate::{AggregateValue, Aggregator, KeyField, KeyLayout};
use crate::object::{OwnerType, TypeTag};

/// A resolved key field
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeyValue {
    Path(Option<Arc<str>>),
    Line(u32),
    Type(TypeTag),
    Class(Option<OwnerType>),
}

impl KeyValue {
    /// Path field holding `text`
    pub fn path(text: &str) -> Self {
        KeyValue::Path(Some(Arc::from(text)))
    }

    fn resolve(field: KeyField, interner: &PathInterner) -> Self {
        match field {
            KeyField::Path(path) => KeyValue::Path(path.map(|id| interner.resolve(id).clone())),
            KeyField::Line(line) => KeyValue::Line(line),
            KeyField::Type(tag) => KeyValue::Type(tag),
            KeyField::Class(owner) => KeyValue::Class(owner),
        }
    }
}

impl fmt::Display for KeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyValue::Path(Some(path)) => f.write_str(path),
            KeyValue::Path(None) | KeyValue::Class(None) => Ok(()),
            KeyValue::Line(line) => write!(f, "{}", line),
            KeyValue::Type(tag) => write!(f, "{}", tag),
            KeyValue::Class(Some(owner)) => write!(f, "{}", owner),
        }
    }
}

/// Resolved composite key, fields in header order
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResultKey(Vec<KeyValue>);

impl ResultKey {
    pub fn fields(&self) -> &[KeyValue] {
        &self.0
    }

    pub fn path(&self) -> Option<&str> {
        self.0.iter().find_map(|field| match field {
            KeyValue::Path(path) => path.as_deref(),
            _ => None,
        })
    }

    pub fn line(&self) -> Option<u32> {
        self.0.iter().find_map(|field| match field {
            KeyValue::Line(line) => Some(*line),
            _ => None,
        })
    }

    pub fn type_tag(&self) -> Option<TypeTag> {
        self.0.iter().find_map(|field| match field {
            KeyValue::Type(tag) => Some(*tag),
            _ => None,
        })
    }

    pub fn owner(&self) -> Option<OwnerType> {
        self.0.iter().find_map(|field| match field {
            KeyValue::Class(owner) => *owner,
            _ => None,
        })
    }
}

impl Borrow<[KeyValue]> for ResultKey {
    fn borrow(&self) -> &[KeyValue] {
        &self.0
    }
}

/// Combined freed + live statistics at one epoch
#[derive(Clone, Debug, PartialEq)]
pub struct Snapshot {
    layout: KeyLayout,
    rows: IndexMap<ResultKey, AggregateValue>,
    live_objects: usize,
    epoch: u64,
}

impl Snapshot {
    /// Union of `stored` and `transient`, with keys resolved through `interner`
    ///
    /// Keys present in both are combined field-wise. Neither input is
    /// modified.
    pub fn build(
        stored: &Aggregator,
        transient: &Aggregator,
        interner: &PathInterner,
        live_objects: usize,
        epoch: u64,
    ) -> Self {
        let rows = stored
            .merged_with(transient)
            .into_iter()
            .map(|(key, value)| {
                let fields = key
                    .fields()
                    .map(|field| KeyValue::resolve(field, interner))
                    .collect();
                (ResultKey(fields), value)
            })
            .collect();

        Self {
            layout: stored.layout(),
            rows,
            live_objects,
            epoch,
        }
    }

    /// View with no rows, for a session that was already over
    pub fn empty(layout: KeyLayout, epoch: u64) -> Self {
        Self {
            layout,
            rows: IndexMap::default(),
            live_objects: 0,
            epoch,
        }
    }

    /// Key field names followed by value field names
    pub fn header(&self) -> Vec<&'static str> {
        header_for(self.layout)
    }

    pub fn layout(&self) -> KeyLayout {
        self.layout
    }

    /// Statistics for the key with exactly these fields
    pub fn get(&self, key: &[KeyValue]) -> Option<&AggregateValue> {
        self.rows.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ResultKey, &AggregateValue)> {
        self.rows.iter()
    }

    /// Rows ordered by key
    pub fn sorted(&self) -> Vec<(&ResultKey, &AggregateValue)> {
        let mut rows: Vec<_> = self.rows.iter().collect();
        rows.sort_by(|a, b| a.0.cmp(b.0));
        rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Objects counted across all rows, freed and living
    pub fn total_count(&self) -> u64 {
        self.rows.values().map(|value| value.count).sum()
    }

    /// Living objects folded into this view
    pub fn live_objects(&self) -> usize {
        self.live_objects
    }

    /// Epoch ages were measured at
    pub fn epoch(&self) -> u64 {
        self.epoch
    }
}

pub(crate) fn header_for(layout: KeyLayout) -> Vec<&'static str> {
    let mut header = layout.names();
    header.extend(AggregateValue::FIELDS);
    header
}
