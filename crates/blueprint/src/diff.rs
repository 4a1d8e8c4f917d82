//! Typed structural diff between two table descriptors.
//!
//! Non-semantic metadata (table `meta`, column and relation aliases, and the
//! derived `is_local_unique`) never produces a change.

use std::fmt;

use blueprint_schema::{
    Capability, Column, ColumnType, CompositeIndex, CompositeUnique, IndexKind, Relation, Table,
};
use indexmap::IndexMap;
use serde_json::Value;

/// All changes needed to turn one table into another.
#[derive(Debug, Clone, PartialEq)]
pub struct TableDiff {
    pub table: String,
    /// New persistence, if it changed.
    pub is_logged: Option<bool>,
    /// Removals first, then additions, then alterations.
    pub columns: Vec<ColumnDiff>,
    pub uniques: Vec<EntryChange<CompositeUnique>>,
    pub indexes: Vec<EntryChange<CompositeIndex>>,
    pub relations: Vec<EntryChange<Relation>>,
}

impl TableDiff {
    pub fn is_empty(&self) -> bool {
        self.is_logged.is_none()
            && self.columns.is_empty()
            && self.uniques.is_empty()
            && self.indexes.is_empty()
            && self.relations.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ColumnDiff {
    Added { name: String, column: Column },
    Removed { name: String, column: Column },
    Altered { name: String, changes: Vec<FieldChange> },
}

/// One changed field of a column that exists on both sides.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldChange {
    Type {
        from: ColumnType,
        to: ColumnType,
    },
    Nullable {
        from: bool,
        to: bool,
    },
    Unique {
        from: bool,
        to: bool,
    },
    Primary {
        from: bool,
        to: bool,
    },
    Indexed {
        from: Option<IndexKind>,
        to: Option<IndexKind>,
    },
    Default {
        from: Option<Value>,
        to: Option<Value>,
    },
    Capability {
        from: Option<Capability>,
        to: Option<Capability>,
    },
}

impl FieldChange {
    /// Field name as it appears in descriptors.
    pub fn field(&self) -> &'static str {
        match self {
            FieldChange::Type { .. } => "type",
            FieldChange::Nullable { .. } => "is_nullable",
            FieldChange::Unique { .. } => "is_unique",
            FieldChange::Primary { .. } => "is_primary",
            FieldChange::Indexed { .. } => "is_indexed",
            FieldChange::Default { .. } => "default_value",
            FieldChange::Capability { .. } => "capability",
        }
    }
}

/// Change to a named entry (composite unique, composite index, relation).
#[derive(Debug, Clone, PartialEq)]
pub enum EntryChange<T> {
    Added { name: String, to: T },
    Removed { name: String, from: T },
    Replaced { name: String, from: T, to: T },
}

impl<T> EntryChange<T> {
    pub fn name(&self) -> &str {
        match self {
            EntryChange::Added { name, .. }
            | EntryChange::Removed { name, .. }
            | EntryChange::Replaced { name, .. } => name,
        }
    }
}

/// Compute the diff from `current` to `target`.
pub fn diff(current: &Table, target: &Table) -> TableDiff {
    TableDiff {
        table: target.name.clone(),
        is_logged: (current.is_logged != target.is_logged).then_some(target.is_logged),
        columns: diff_columns(&current.columns, &target.columns),
        uniques: diff_entries(&current.uniques, &target.uniques, |a, b| a == b),
        indexes: diff_entries(&current.indexes, &target.indexes, |a, b| a == b),
        relations: diff_entries(&current.relations, &target.relations, same_relation),
    }
}

fn diff_columns(
    current: &IndexMap<String, Column>,
    target: &IndexMap<String, Column>,
) -> Vec<ColumnDiff> {
    let mut out = Vec::new();

    for (name, column) in current {
        if !target.contains_key(name) {
            out.push(ColumnDiff::Removed {
                name: name.clone(),
                column: column.clone(),
            });
        }
    }

    for (name, column) in target {
        if !current.contains_key(name) {
            out.push(ColumnDiff::Added {
                name: name.clone(),
                column: column.clone(),
            });
        }
    }

    for (name, to) in target {
        let Some(from) = current.get(name) else {
            continue;
        };
        let changes = diff_fields(from, to);
        if !changes.is_empty() {
            out.push(ColumnDiff::Altered {
                name: name.clone(),
                changes,
            });
        }
    }

    out
}

fn diff_fields(from: &Column, to: &Column) -> Vec<FieldChange> {
    let mut changes = Vec::new();

    if from.column_type.canonical() != to.column_type.canonical() {
        changes.push(FieldChange::Type {
            from: from.column_type.clone(),
            to: to.column_type.clone(),
        });
    }
    if from.is_nullable != to.is_nullable {
        changes.push(FieldChange::Nullable {
            from: from.is_nullable,
            to: to.is_nullable,
        });
    }
    if from.is_unique != to.is_unique {
        changes.push(FieldChange::Unique {
            from: from.is_unique,
            to: to.is_unique,
        });
    }
    if from.is_primary != to.is_primary {
        changes.push(FieldChange::Primary {
            from: from.is_primary,
            to: to.is_primary,
        });
    }
    if from.is_indexed != to.is_indexed {
        changes.push(FieldChange::Indexed {
            from: from.is_indexed,
            to: to.is_indexed,
        });
    }
    if !same_default(&from.default_value, &to.default_value) {
        changes.push(FieldChange::Default {
            from: from.default_value.clone(),
            to: to.default_value.clone(),
        });
    }
    if from.capability != to.capability {
        changes.push(FieldChange::Capability {
            from: from.capability,
            to: to.capability,
        });
    }

    changes
}

/// Defaults compare numbers by value, so `2` and `2.0` are the same default.
/// No default and `DEFAULT NULL` are the same to Postgres, which stores neither.
fn same_default(a: &Option<Value>, b: &Option<Value>) -> bool {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x.as_f64() == y.as_f64(),
        (None | Some(Value::Null), None | Some(Value::Null)) => true,
        _ => a == b,
    }
}

fn same_relation(a: &Relation, b: &Relation) -> bool {
    a.columns == b.columns
        && a.references == b.references
        && a.on_delete == b.on_delete
        && a.on_update == b.on_update
}

fn diff_entries<T: Clone>(
    current: &IndexMap<String, T>,
    target: &IndexMap<String, T>,
    same: impl Fn(&T, &T) -> bool,
) -> Vec<EntryChange<T>> {
    let mut out = Vec::new();
    for (name, from) in current {
        if !target.contains_key(name) {
            out.push(EntryChange::Removed {
                name: name.clone(),
                from: from.clone(),
            });
        }
    }
    for (name, to) in target {
        match current.get(name) {
            None => out.push(EntryChange::Added {
                name: name.clone(),
                to: to.clone(),
            }),
            Some(from) if !same(from, to) => out.push(EntryChange::Replaced {
                name: name.clone(),
                from: from.clone(),
                to: to.clone(),
            }),
            Some(_) => {}
        }
    }
    out
}

fn show_default(value: &Option<Value>) -> String {
    match value {
        Some(v) => v.to_string(),
        None => "(none)".to_string(),
    }
}

impl fmt::Display for FieldChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldChange::Type { from, to } => write!(f, "type: {} -> {}", from, to),
            FieldChange::Nullable { from, to } => {
                let show = |n: bool| if n { "nullable" } else { "not null" };
                write!(f, "{} -> {}", show(*from), show(*to))
            }
            FieldChange::Unique { from, to }
            | FieldChange::Primary { from, to } => {
                write!(f, "{}: {} -> {}", self.field(), from, to)
            }
            FieldChange::Indexed { from, to } => {
                let show = |k: &Option<IndexKind>| k.map_or("none".to_string(), |k| k.to_string());
                write!(f, "index: {} -> {}", show(from), show(to))
            }
            FieldChange::Default { from, to } => {
                write!(f, "default: {} -> {}", show_default(from), show_default(to))
            }
            FieldChange::Capability { from, to } => {
                write!(f, "capability: {:?} -> {:?}", from, to)
            }
        }
    }
}

impl fmt::Display for TableDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}:", self.table)?;
        if let Some(logged) = self.is_logged {
            let show = if logged { "logged" } else { "unlogged" };
            writeln!(f, "  ~ {}", show)?;
        }
        for change in &self.columns {
            match change {
                ColumnDiff::Added { name, column } => {
                    let nullable = if column.is_nullable { " (nullable)" } else { "" };
                    writeln!(f, "  + {}: {}{}", name, column.column_type, nullable)?
                }
                ColumnDiff::Removed { name, .. } => writeln!(f, "  - {}", name)?,
                ColumnDiff::Altered { name, changes } => {
                    for c in changes {
                        writeln!(f, "  ~ {} {}", name, c)?;
                    }
                }
            }
        }
        for (kind, names) in [
            ("unique", entry_lines(&self.uniques)),
            ("index", entry_lines(&self.indexes)),
            ("relation", entry_lines(&self.relations)),
        ] {
            for (sign, name) in names {
                writeln!(f, "  {} {} {}", sign, kind, name)?;
            }
        }
        Ok(())
    }
}

fn entry_lines<T>(changes: &[EntryChange<T>]) -> Vec<(char, &str)> {
    changes
        .iter()
        .map(|c| {
            let sign = match c {
                EntryChange::Added { .. } => '+',
                EntryChange::Removed { .. } => '-',
                EntryChange::Replaced { .. } => '~',
            };
            (sign, c.name())
        })
        .collect()
}
