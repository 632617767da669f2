//! Composite-key aggregation
//!
//! Statistics are grouped by a key built from up to four dimensions of an
//! allocation: its call-site path, call-site line, type tag, and owning type.
//! Which dimensions participate is fixed per session by a [`KeyLayout`], and
//! every key in one [`Aggregator`] has exactly the layout's fields in the
//! canonical order path, line, type, class.
//!
//! Path fields hold interned handles, so two keys are equal only when they
//! carry the same handle. The aggregator itself does not touch the interner:
//! [`Aggregator::fold`] reports the handle a newly inserted key refers to so
//! the owner can take a reference on it, and [`Aggregator::clear`] gives the
//! references back.

use std::fmt;
use std::str::FromStr;

use alloctrace_util::{PathId, PathInterner};
use indexmap::IndexMap;
use rustc_hash::FxBuildHasher;
use serde::{Deserialize, Serialize};

use crate::error::TracerError;
use crate::host::LiveRefresh;
use crate::object::{AllocationRecord, OwnerType, TypeTag};

/// One grouping dimension
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Dimension {
    Path,
    Line,
    Type,
    Class,
}

impl Dimension {
    /// All dimensions in canonical key order
    pub const ALL: [Dimension; 4] = [
        Dimension::Path,
        Dimension::Line,
        Dimension::Type,
        Dimension::Class,
    ];

    /// Field name used in headers and in `setup`
    pub fn name(self) -> &'static str {
        match self {
            Dimension::Path => "path",
            Dimension::Line => "line",
            Dimension::Type => "type",
            Dimension::Class => "class",
        }
    }

    #[inline]
    fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Dimension {
    type Err = TracerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "path" => Ok(Dimension::Path),
            "line" => Ok(Dimension::Line),
            "type" => Ok(Dimension::Type),
            "class" => Ok(Dimension::Class),
            other => Err(TracerError::UnknownField(other.to_string())),
        }
    }
}

/// The set of dimensions that make up every aggregate key
///
/// Serialized as the list of field names in canonical order. An empty list
/// means the default layout.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct KeyLayout {
    mask: u8,
}

impl KeyLayout {
    /// Layout holding the given dimensions, in canonical order
    pub fn of(dimensions: &[Dimension]) -> Self {
        let mask = dimensions.iter().fold(0, |mask, dim| mask | dim.bit());
        Self { mask }
    }

    /// Parse field names as accepted by `setup`
    ///
    /// Duplicates are ignored; an empty list yields the default layout.
    ///
    /// # Examples
    ///
    /// ```
    /// use alloctrace::aggregate::{Dimension, KeyLayout};
    ///
    /// let layout = KeyLayout::parse(&["type", "path"]).unwrap();
    /// assert_eq!(layout.names(), vec!["path", "type"]);
    /// assert!(KeyLayout::parse(&["file"]).is_err());
    /// ```
    pub fn parse<S: AsRef<str>>(names: &[S]) -> Result<Self, TracerError> {
        if names.is_empty() {
            return Ok(Self::default());
        }
        let dims = names
            .iter()
            .map(|name| name.as_ref().parse::<Dimension>())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::of(&dims))
    }

    #[inline]
    pub fn contains(self, dimension: Dimension) -> bool {
        self.mask & dimension.bit() != 0
    }

    /// Configured dimensions in canonical order
    pub fn dimensions(self) -> impl Iterator<Item = Dimension> {
        Dimension::ALL.into_iter().filter(move |dim| self.contains(*dim))
    }

    /// Number of fields in every key
    pub fn len(self) -> usize {
        self.mask.count_ones() as usize
    }

    pub fn is_empty(self) -> bool {
        self.mask == 0
    }

    /// Field names in canonical order
    pub fn names(self) -> Vec<&'static str> {
        self.dimensions().map(Dimension::name).collect()
    }
}

impl Default for KeyLayout {
    fn default() -> Self {
        Self::of(&[Dimension::Path, Dimension::Line])
    }
}

impl fmt::Debug for KeyLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

impl fmt::Display for KeyLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.names().join(","))
    }
}

impl TryFrom<Vec<String>> for KeyLayout {
    type Error = TracerError;

    fn try_from(names: Vec<String>) -> Result<Self, Self::Error> {
        Self::parse(&names)
    }
}

impl From<KeyLayout> for Vec<String> {
    fn from(layout: KeyLayout) -> Self {
        layout.dimensions().map(|dim| dim.name().to_string()).collect()
    }
}

/// One populated key field
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum KeyField {
    Path(Option<PathId>),
    Line(u32),
    Type(TypeTag),
    Class(Option<OwnerType>),
}

/// Fixed-capacity composite key
///
/// Only the first `len` slots are populated; the rest are always `None`, so
/// derived equality and hashing cover exactly the populated prefix.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct AggregateKey {
    len: u8,
    fields: [Option<KeyField>; 4],
}

impl AggregateKey {
    /// Build the key for `sample` under `layout`
    pub fn build(layout: KeyLayout, sample: &AgeSample) -> Self {
        let mut fields = [None; 4];
        let mut len = 0;
        for dim in layout.dimensions() {
            fields[len] = Some(match dim {
                Dimension::Path => KeyField::Path(sample.path),
                Dimension::Line => KeyField::Line(sample.line),
                Dimension::Type => KeyField::Type(sample.type_tag),
                Dimension::Class => KeyField::Class(sample.owner),
            });
            len += 1;
        }
        Self {
            len: len as u8,
            fields,
        }
    }

    /// Populated fields in layout order
    pub fn fields(&self) -> impl Iterator<Item = KeyField> + '_ {
        self.fields[..self.len as usize].iter().flatten().copied()
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The interned path this key refers to, if the layout has one
    pub fn path(&self) -> Option<PathId> {
        self.fields().find_map(|field| match field {
            KeyField::Path(path) => path,
            _ => None,
        })
    }
}

/// Running statistics for one key
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateValue {
    pub count: u64,
    /// Objects that survived at least one collection
    pub promoted_count: u64,
    pub total_age: u64,
    pub min_age: u64,
    pub max_age: u64,
    pub total_bytes: u64,
}

impl AggregateValue {
    /// Column names of the value tuple, in order
    pub const FIELDS: [&'static str; 6] = [
        "count",
        "old_count",
        "total_age",
        "min_age",
        "max_age",
        "total_memsize",
    ];

    /// Empty value for a key first seen at `age`
    pub fn seeded(age: u64) -> Self {
        Self {
            count: 0,
            promoted_count: 0,
            total_age: 0,
            min_age: age,
            max_age: age,
            total_bytes: 0,
        }
    }

    /// Fold one sample in
    pub fn accumulate(&mut self, sample: &AgeSample) {
        self.count += 1;
        if sample.promoted {
            self.promoted_count += 1;
        }
        self.total_age += sample.age;
        self.min_age = self.min_age.min(sample.age);
        self.max_age = self.max_age.max(sample.age);
        self.total_bytes += sample.bytes;
    }

    /// Combine with the value of the same key from another aggregation
    pub fn merge(&mut self, other: &AggregateValue) {
        self.count += other.count;
        self.promoted_count += other.promoted_count;
        self.total_age += other.total_age;
        self.min_age = self.min_age.min(other.min_age);
        self.max_age = self.max_age.max(other.max_age);
        self.total_bytes += other.total_bytes;
    }

    /// Mean age over all counted objects
    pub fn average_age(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.total_age as f64 / self.count as f64
        }
    }

    /// Values in [`AggregateValue::FIELDS`] order
    pub fn to_array(&self) -> [u64; 6] {
        [
            self.count,
            self.promoted_count,
            self.total_age,
            self.min_age,
            self.max_age,
            self.total_bytes,
        ]
    }
}

/// What one object contributes to an aggregation
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AgeSample {
    pub path: Option<PathId>,
    pub line: u32,
    pub type_tag: TypeTag,
    pub owner: Option<OwnerType>,
    pub age: u64,
    pub promoted: bool,
    pub bytes: u64,
}

impl AgeSample {
    /// Contribution of a freed record at `epoch`
    pub fn freed(record: &AllocationRecord, epoch: u64) -> Self {
        Self {
            path: record.path,
            line: record.line,
            type_tag: record.type_tag,
            owner: record.owner,
            age: record.age_at(epoch),
            promoted: record.promoted,
            bytes: record.byte_size,
        }
    }

    /// Contribution of a still-living record at `epoch`
    ///
    /// A refresh replaces the captured owner (and re-reads the type flags)
    /// only when the host still reports the recorded type tag. Live objects
    /// contribute no bytes.
    pub fn living(
        record: &AllocationRecord,
        epoch: u64,
        promoted: bool,
        refresh: Option<LiveRefresh>,
    ) -> Self {
        let owner = match refresh {
            Some(refresh) if refresh.type_tag == record.type_tag => refresh.owner,
            _ => record.owner,
        };
        Self {
            path: record.path,
            line: record.line,
            type_tag: record.type_tag,
            owner,
            age: record.age_at(epoch),
            promoted,
            bytes: 0,
        }
    }
}

/// Insertion-ordered table from composite key to statistics
#[derive(Clone, Debug, Default)]
pub struct Aggregator {
    layout: KeyLayout,
    table: IndexMap<AggregateKey, AggregateValue, FxBuildHasher>,
}

impl Aggregator {
    pub fn new(layout: KeyLayout) -> Self {
        Self {
            layout,
            table: IndexMap::default(),
        }
    }

    pub fn layout(&self) -> KeyLayout {
        self.layout
    }

    /// Fold a sample into its key's statistics
    ///
    /// Returns the path handle of a newly inserted key; the caller owns one
    /// reference to it on the key's behalf.
    pub fn fold(&mut self, sample: &AgeSample) -> Option<PathId> {
        let key = AggregateKey::build(self.layout, sample);
        let mut inserted = false;
        self.table
            .entry(key)
            .or_insert_with(|| {
                inserted = true;
                AggregateValue::seeded(sample.age)
            })
            .accumulate(sample);

        if inserted {
            key.path()
        } else {
            None
        }
    }

    pub fn get(&self, key: &AggregateKey) -> Option<&AggregateValue> {
        self.table.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&AggregateKey, &AggregateValue)> {
        self.table.iter()
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// This table's entries combined field-wise with `other`'s
    ///
    /// Neither side is modified.
    pub fn merged_with(
        &self,
        other: &Aggregator,
    ) -> IndexMap<AggregateKey, AggregateValue, FxBuildHasher> {
        let mut merged = self.table.clone();
        for (key, value) in other.iter() {
            merged
                .entry(*key)
                .and_modify(|existing| existing.merge(value))
                .or_insert(*value);
        }
        merged
    }

    /// Drop every entry, releasing the path reference each key holds
    pub fn clear(&mut self, interner: &mut PathInterner) {
        for (key, _) in self.table.drain(..) {
            if let Some(path) = key.path() {
                interner.release(path);
            }
        }
    }

    /// Replace the layout; only valid on an empty table
    pub(crate) fn set_layout(&mut self, layout: KeyLayout) {
        crate::invariant!(
            self.table.is_empty(),
            "key layout changed with {} entries",
            self.table.len()
        );
        self.layout = layout;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(type_tag: u32, age: u64) -> AgeSample {
        AgeSample {
            path: None,
            line: 0,
            type_tag: TypeTag(type_tag),
            owner: None,
            age,
            promoted: false,
            bytes: 0,
        }
    }

    #[test]
    fn test_dimension_parse() {
        assert_eq!("class".parse::<Dimension>().unwrap(), Dimension::Class);
        assert!(matches!(
            "klass".parse::<Dimension>(),
            Err(TracerError::UnknownField(name)) if name == "klass"
        ));
    }

    #[test]
    fn test_layout_canonical_order() {
        let layout = KeyLayout::parse(&["class", "line", "class", "path"]).unwrap();
        assert_eq!(layout.names(), vec!["path", "line", "class"]);
        assert_eq!(layout.len(), 3);
        assert_eq!(layout.to_string(), "path,line,class");
    }

    #[test]
    fn test_layout_default() {
        let empty: [&str; 0] = [];
        assert_eq!(KeyLayout::parse(&empty).unwrap(), KeyLayout::default());
        assert_eq!(KeyLayout::default().names(), vec!["path", "line"]);
    }

    #[test]
    fn test_layout_serde() {
        let layout: KeyLayout = serde_json::from_str(r#"["type","path"]"#).unwrap();
        assert_eq!(serde_json::to_string(&layout).unwrap(), r#"["path","type"]"#);
        assert!(serde_json::from_str::<KeyLayout>(r#"["bogus"]"#).is_err());
    }

    #[test]
    fn test_key_field_order_follows_layout() {
        let layout = KeyLayout::of(&[Dimension::Class, Dimension::Type]);
        let mut s = sample(4, 0);
        s.owner = Some(OwnerType(8));
        let key = AggregateKey::build(layout, &s);

        let fields: Vec<_> = key.fields().collect();
        assert_eq!(
            fields,
            vec![KeyField::Type(TypeTag(4)), KeyField::Class(Some(OwnerType(8)))]
        );
        assert_eq!(key.path(), None);
    }

    #[test]
    fn test_value_seed_and_accumulate() {
        let mut value = AggregateValue::seeded(3);
        value.accumulate(&AgeSample {
            promoted: true,
            bytes: 40,
            ..sample(1, 3)
        });
        value.accumulate(&sample(1, 1));

        assert_eq!(value.count, 2);
        assert_eq!(value.promoted_count, 1);
        assert_eq!(value.total_age, 4);
        assert_eq!(value.min_age, 1);
        assert_eq!(value.max_age, 3);
        assert_eq!(value.total_bytes, 40);
        assert!((value.average_age() - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_fold_reports_path_of_new_key_only() {
        let mut paths = PathInterner::new();
        let path = paths.intern("a.rb");
        let mut agg = Aggregator::new(KeyLayout::default());
        let s = AgeSample {
            path: Some(path),
            ..sample(1, 0)
        };

        assert_eq!(agg.fold(&s), Some(path));
        assert_eq!(agg.fold(&s), None);
        assert_eq!(agg.len(), 1);
    }

    #[test]
    fn test_merged_with_combines_fieldwise() {
        let layout = KeyLayout::of(&[Dimension::Type]);
        let mut dead = Aggregator::new(layout);
        dead.fold(&AgeSample {
            bytes: 10,
            ..sample(1, 5)
        });
        let mut live = Aggregator::new(layout);
        live.fold(&sample(1, 2));
        live.fold(&sample(2, 7));

        let merged = dead.merged_with(&live);
        let key = AggregateKey::build(layout, &sample(1, 0));
        let value = merged[&key];
        assert_eq!(value.count, 2);
        assert_eq!(value.min_age, 2);
        assert_eq!(value.max_age, 5);
        assert_eq!(value.total_bytes, 10);
        assert_eq!(merged.len(), 2);

        // neither input changed
        assert_eq!(dead.get(&key).map(|v| v.count), Some(1));
        assert_eq!(live.len(), 2);
    }

    #[test]
    fn test_clear_releases_key_paths() {
        let mut paths = PathInterner::new();
        let path = paths.intern("a.rb");
        let mut agg = Aggregator::new(KeyLayout::default());
        if let Some(held) = agg.fold(&AgeSample {
            path: Some(path),
            ..sample(1, 0)
        }) {
            paths.retain(held);
        }
        paths.release(path);
        assert_eq!(paths.ref_count(path), 1);

        agg.clear(&mut paths);
        assert!(agg.is_empty());
        assert!(paths.is_empty());
    }

    #[test]
    fn test_living_sample_refresh_rules() {
        let mut record = AllocationRecord::blank();
        record.type_tag = TypeTag(3);
        record.owner = Some(OwnerType(1));
        record.byte_size = 0;

        let same = LiveRefresh {
            type_tag: TypeTag(3),
            owner: Some(OwnerType(2)),
        };
        let other = LiveRefresh {
            type_tag: TypeTag(9),
            owner: Some(OwnerType(5)),
        };

        assert_eq!(AgeSample::living(&record, 0, false, Some(same)).owner, Some(OwnerType(2)));
        assert_eq!(AgeSample::living(&record, 0, false, Some(other)).owner, Some(OwnerType(1)));
        assert_eq!(AgeSample::living(&record, 0, false, None).owner, Some(OwnerType(1)));
    }
}
