//! Text and JSON renderings of tracer output
//!
//! - [`write_result_tsv`]: header line, then one row per key sorted by key
//! - [`write_summary_tsv`]: rows by descending count with an average age
//! - [`write_lifetime_tsv`]: one row per type, one column per age
//! - [`write_counts`]: per-type allocated or freed counts
//! - [`result_json`]: the result view as a JSON array of rows
//!
//! Type tags and owning types are printed through a [`Naming`], which by
//! default prints their numeric values.

use std::borrow::Cow;
use std::collections::HashMap;
use std::io::{self, Write};

use crate::aggregate::AggregateValue;
use crate::counters::TypeCounts;
use crate::lifetime::LifetimeTable;
use crate::object::{OwnerType, TypeTag};
use crate::snapshot::{KeyValue, ResultKey, Snapshot};

/// Display names for type tags and owning types
pub trait Naming {
    fn type_name(&self, type_tag: TypeTag) -> Cow<'_, str> {
        Cow::Owned(type_tag.to_string())
    }

    fn owner_name(&self, owner: OwnerType) -> Cow<'_, str> {
        Cow::Owned(owner.to_string())
    }
}

/// Prints tags and owners as numbers
#[derive(Debug, Clone, Copy, Default)]
pub struct NumericNames;

impl Naming for NumericNames {}

/// Lookup table of names, falling back to numbers
#[derive(Debug, Clone, Default)]
pub struct NameTable {
    types: HashMap<TypeTag, String>,
    owners: HashMap<OwnerType, String>,
}

impl NameTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_type(mut self, type_tag: TypeTag, name: impl Into<String>) -> Self {
        self.types.insert(type_tag, name.into());
        self
    }

    pub fn with_owner(mut self, owner: OwnerType, name: impl Into<String>) -> Self {
        self.owners.insert(owner, name.into());
        self
    }

    pub fn insert_type(&mut self, type_tag: TypeTag, name: impl Into<String>) {
        self.types.insert(type_tag, name.into());
    }

    pub fn insert_owner(&mut self, owner: OwnerType, name: impl Into<String>) {
        self.owners.insert(owner, name.into());
    }
}

impl Naming for NameTable {
    fn type_name(&self, type_tag: TypeTag) -> Cow<'_, str> {
        match self.types.get(&type_tag) {
            Some(name) => Cow::Borrowed(name.as_str()),
            None => Cow::Owned(type_tag.to_string()),
        }
    }

    fn owner_name(&self, owner: OwnerType) -> Cow<'_, str> {
        match self.owners.get(&owner) {
            Some(name) => Cow::Borrowed(name.as_str()),
            None => Cow::Owned(owner.to_string()),
        }
    }
}

fn field_text<'a>(field: &'a KeyValue, naming: &'a dyn Naming) -> Cow<'a, str> {
    match field {
        KeyValue::Path(Some(path)) => Cow::Borrowed(path.as_ref()),
        KeyValue::Path(None) | KeyValue::Class(None) => Cow::Borrowed(""),
        KeyValue::Line(line) => Cow::Owned(line.to_string()),
        KeyValue::Type(tag) => naming.type_name(*tag),
        KeyValue::Class(Some(owner)) => naming.owner_name(*owner),
    }
}

fn key_columns(key: &ResultKey, naming: &dyn Naming) -> Vec<String> {
    key.fields()
        .iter()
        .map(|field| field_text(field, naming).into_owned())
        .collect()
}

/// Header, then every row sorted by key, tab separated
pub fn write_result_tsv<W: Write + ?Sized>(
    out: &mut W,
    snapshot: &Snapshot,
    naming: &dyn Naming,
) -> io::Result<()> {
    writeln!(out, "{}", snapshot.header().join("\t"))?;
    for (key, value) in snapshot.sorted() {
        let mut columns = key_columns(key, naming);
        columns.extend(value.to_array().iter().map(u64::to_string));
        writeln!(out, "{}", columns.join("\t"))?;
    }
    Ok(())
}

/// Rows by descending count, with the average age in place of the total
pub fn write_summary_tsv<W: Write + ?Sized>(
    out: &mut W,
    snapshot: &Snapshot,
    naming: &dyn Naming,
) -> io::Result<()> {
    let mut header: Vec<&str> = snapshot.layout().names();
    header.extend([
        "count",
        "old_count",
        "average_age",
        "min_age",
        "max_age",
        "memsize",
    ]);
    writeln!(out, "{}", header.join("\t"))?;

    let mut rows = snapshot.sorted();
    rows.sort_by(|a, b| b.1.count.cmp(&a.1.count));
    for (key, value) in rows {
        let mut columns = key_columns(key, naming);
        columns.push(value.count.to_string());
        columns.push(value.promoted_count.to_string());
        columns.push(format!("{:.2}", value.average_age()));
        columns.push(value.min_age.to_string());
        columns.push(value.max_age.to_string());
        columns.push(value.total_bytes.to_string());
        writeln!(out, "{}", columns.join("\t"))?;
    }
    Ok(())
}

/// `type` followed by one column per age, then one row per type
pub fn write_lifetime_tsv<W: Write + ?Sized>(
    out: &mut W,
    table: &LifetimeTable,
    naming: &dyn Naming,
) -> io::Result<()> {
    let width = table.max_age().map_or(0, |age| age + 1);
    let mut header = vec!["type".to_string()];
    header.extend((0..width).map(|age| age.to_string()));
    writeln!(out, "{}", header.join("\t"))?;

    for (tag, row) in table.iter() {
        let mut columns = vec![naming.type_name(tag).into_owned()];
        columns.extend(row.iter().map(u64::to_string));
        writeln!(out, "{}", columns.join("\t"))?;
    }
    Ok(())
}

/// Non-zero per-type counts, one `name<TAB>count` line each
pub fn write_counts<W: Write + ?Sized>(
    out: &mut W,
    counts: &TypeCounts,
    naming: &dyn Naming,
) -> io::Result<()> {
    for (tag, count) in counts.nonzero() {
        writeln!(out, "{:<10}\t{:>8}", naming.type_name(tag), count)?;
    }
    Ok(())
}

/// The result view as `[{"key": {...}, "value": {...}}, ...]`, sorted by key
pub fn result_json(snapshot: &Snapshot, naming: &dyn Naming) -> serde_json::Value {
    let names = snapshot.layout().names();
    let rows: Vec<serde_json::Value> = snapshot
        .sorted()
        .into_iter()
        .map(|(key, value)| {
            let key: serde_json::Map<String, serde_json::Value> = names
                .iter()
                .zip(key.fields())
                .map(|(name, field)| (name.to_string(), field_json(field, naming)))
                .collect();
            serde_json::json!({ "key": key, "value": value_json(value) })
        })
        .collect();
    serde_json::Value::Array(rows)
}

fn field_json(field: &KeyValue, naming: &dyn Naming) -> serde_json::Value {
    match field {
        KeyValue::Path(path) => serde_json::json!(path.as_deref()),
        KeyValue::Line(line) => serde_json::json!(line),
        KeyValue::Type(tag) => serde_json::json!(naming.type_name(*tag)),
        KeyValue::Class(owner) => {
            serde_json::json!(owner.map(|o| naming.owner_name(o).into_owned()))
        },
    }
}

fn value_json(value: &AggregateValue) -> serde_json::Value {
    serde_json::json!({
        "count": value.count,
        "old_count": value.promoted_count,
        "total_age": value.total_age,
        "min_age": value.min_age,
        "max_age": value.max_age,
        "total_memsize": value.total_bytes,
        "average_age": value.average_age(),
    })
}
