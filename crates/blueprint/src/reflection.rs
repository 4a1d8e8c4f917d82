//! The fact model: a snapshot of the catalog, normalized into table
//! descriptors on demand.

use std::collections::{HashMap, HashSet};

use blueprint_schema::{
    Column, ColumnType, CompositeIndex, CompositeUnique, IndexKind, PgType, Reference, Relation,
    Table,
};
use indexmap::IndexMap;
use regex::Regex;
use serde_json::Value;

use crate::introspect::{
    RawColumn, RawConstraint, RawEnumColumn, RawForeignKey, RawIndex, RawTable, Reflector,
};
use crate::meta::{ColumnMeta, RelationMeta, TableMeta};
use crate::{Error, Result};

/// Everything the reflector returned, before grouping.
#[derive(Debug, Clone, Default)]
pub struct RawFacts {
    pub tables: Vec<RawTable>,
    pub types: Vec<String>,
    pub enumerators: Vec<RawEnumColumn>,
    pub foreign_keys: Vec<RawForeignKey>,
    pub unique_names: Vec<String>,
    pub uniques: Vec<RawConstraint>,
    pub primary_keys: Vec<RawConstraint>,
    pub indexes: Vec<RawIndex>,
    pub columns: Vec<RawColumn>,
}

#[derive(Debug, Clone)]
struct TableFacts {
    is_logged: bool,
    comment: Option<String>,
}

/// Catalog snapshot grouped by table.
#[derive(Debug, Clone, Default)]
pub struct Facts {
    tables: IndexMap<String, TableFacts>,
    types: HashSet<String>,
    /// table -> column -> enum column
    enums: HashMap<String, HashMap<String, RawEnumColumn>>,
    relations: HashMap<String, Vec<RawForeignKey>>,
    unique_names: HashSet<String>,
    uniques: HashMap<String, Vec<RawConstraint>>,
    primary_keys: HashMap<String, RawConstraint>,
    indexes: HashMap<String, Vec<RawIndex>>,
    columns: HashMap<String, Vec<RawColumn>>,
}

impl Facts {
    pub fn from_raw(raw: RawFacts) -> Self {
        let mut facts = Facts {
            tables: raw
                .tables
                .into_iter()
                .map(|t| {
                    (
                        t.name,
                        TableFacts {
                            is_logged: t.is_logged,
                            comment: t.comment,
                        },
                    )
                })
                .collect(),
            types: raw.types.into_iter().collect(),
            unique_names: raw.unique_names.into_iter().collect(),
            ..Default::default()
        };
        for e in raw.enumerators {
            facts
                .enums
                .entry(e.table.clone())
                .or_default()
                .insert(e.column.clone(), e);
        }
        for fk in raw.foreign_keys {
            facts.relations.entry(fk.table.clone()).or_default().push(fk);
        }
        for u in raw.uniques {
            facts.uniques.entry(u.table.clone()).or_default().push(u);
        }
        for pk in raw.primary_keys {
            facts.primary_keys.insert(pk.table.clone(), pk);
        }
        for i in raw.indexes {
            facts.indexes.entry(i.table.clone()).or_default().push(i);
        }
        for c in raw.columns {
            facts.columns.entry(c.table.clone()).or_default().push(c);
        }
        facts
    }

    /// Name of the primary key constraint of `table`, if it has one.
    pub fn primary_key_name(&self, table: &str) -> Option<&str> {
        self.primary_keys.get(table).map(|pk| pk.name.as_str())
    }

    /// Name of the single-column unique constraint on `table.column`.
    pub fn unique_key_name(&self, table: &str, column: &str) -> Option<&str> {
        self.uniques
            .get(table)?
            .iter()
            .find(|u| u.columns.len() == 1 && u.columns[0] == column)
            .map(|u| u.name.as_str())
    }

    /// Name of the single-column index on `table.column`.
    pub fn index_name(&self, table: &str, column: &str) -> Option<&str> {
        self.indexes
            .get(table)?
            .iter()
            .find(|i| i.columns.len() == 1 && i.columns[0] == column)
            .map(|i| i.name.as_str())
    }
}

/// The batch context for one reconciliation run.
///
/// Holds the catalog snapshot plus whatever the planner has registered as
/// "about to be created" since the last refresh.
pub struct Reflection<R> {
    reflector: R,
    facts: Facts,
    row_presence: HashMap<String, bool>,
}

impl<R: Reflector> Reflection<R> {
    pub fn new(reflector: R) -> Self {
        Self {
            reflector,
            facts: Facts::default(),
            row_presence: HashMap::new(),
        }
    }

    pub fn facts(&self) -> &Facts {
        &self.facts
    }

    /// Re-read every fact category and replace the snapshot.
    pub async fn update_facts(&mut self) -> Result<()> {
        let r = &self.reflector;
        let (tables, types, enumerators, foreign_keys, unique_names, uniques, primary_keys, indexes, columns) = tokio::try_join!(
            r.tables(),
            r.types(),
            r.enumerators(),
            r.foreign_keys(),
            r.unique_names(),
            r.uniques(),
            r.primary_keys(),
            r.indexes(),
            r.columns(),
        )?;

        tracing::debug!(tables = tables.len(), columns = columns.len(), "refreshed facts");

        self.facts = Facts::from_raw(RawFacts {
            tables,
            types,
            enumerators,
            foreign_keys,
            unique_names,
            uniques,
            primary_keys,
            indexes,
            columns,
        });
        self.row_presence.clear();
        Ok(())
    }

    pub fn is_table_exists(&self, name: &str) -> bool {
        self.facts.tables.contains_key(name)
    }

    pub fn is_unique_constraint_exists(&self, name: &str) -> bool {
        self.facts.unique_names.contains(name)
    }

    pub fn is_type_exists(&self, name: &str) -> bool {
        self.facts.types.contains(name)
    }

    /// Table names matching any of `filters` (all tables when empty).
    pub fn tables(&self, filters: &[&str]) -> Result<Vec<String>> {
        let filters = filters
            .iter()
            .map(|f| Regex::new(f))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(self
            .facts
            .tables
            .keys()
            .filter(|name| filters.is_empty() || filters.iter().any(|re| re.is_match(name)))
            .cloned()
            .collect())
    }

    pub fn add_table(&mut self, name: &str, is_logged: bool) {
        self.facts
            .tables
            .entry(name.to_string())
            .or_insert(TableFacts {
                is_logged,
                comment: None,
            });
    }

    pub fn add_type(&mut self, name: &str) {
        self.facts.types.insert(name.to_string());
    }

    pub fn add_unique(&mut self, name: &str) {
        self.facts.unique_names.insert(name.to_string());
    }

    pub fn add_foreign_key(&mut self, table: &str, name: &str, relation: &Relation) {
        self.facts
            .relations
            .entry(table.to_string())
            .or_default()
            .push(RawForeignKey {
                table: table.to_string(),
                name: name.to_string(),
                columns: relation.columns.clone(),
                ref_table: relation.references.table.clone(),
                ref_columns: relation.references.columns.clone(),
                on_delete: relation.on_delete,
                on_update: relation.on_update,
                comment: RelationMeta::for_relation(relation).encode(),
            });
    }

    /// Whether `table` has at least one row, memoized until the next refresh.
    pub async fn has_rows(&mut self, table: &str) -> Result<bool> {
        if let Some(present) = self.row_presence.get(table) {
            return Ok(*present);
        }
        let present = self.reflector.has_rows(table).await?;
        self.row_presence.insert(table.to_string(), present);
        Ok(present)
    }

    /// The current descriptor of `name`, `None` if the table doesn't exist.
    pub fn table_state(&self, name: &str) -> Result<Option<Table>> {
        let Some(table_facts) = self.facts.tables.get(name) else {
            return Ok(None);
        };

        let mut table = Table::new(name);
        table.is_logged = table_facts.is_logged;
        table.meta = TableMeta::decode(table_facts.comment.as_deref()).and_then(|m| m.meta);

        let mut unique_columns: HashSet<&str> = HashSet::new();
        for unique in self.facts.uniques.get(name).into_iter().flatten() {
            match unique.columns.as_slice() {
                [column] => {
                    unique_columns.insert(column.as_str());
                }
                columns => {
                    table.uniques.insert(
                        unique.name.clone(),
                        CompositeUnique {
                            columns: columns.to_vec(),
                        },
                    );
                }
            }
        }

        let mut indexed: HashMap<&str, IndexKind> = HashMap::new();
        for index in self.facts.indexes.get(name).into_iter().flatten() {
            match index.columns.as_slice() {
                [column] => {
                    indexed.insert(column.as_str(), index.kind);
                }
                columns => {
                    table.indexes.insert(
                        index.name.clone(),
                        CompositeIndex {
                            kind: index.kind,
                            columns: columns.to_vec(),
                        },
                    );
                }
            }
        }

        let primary_key: &[String] = self
            .facts
            .primary_keys
            .get(name)
            .map(|pk| pk.columns.as_slice())
            .unwrap_or_default();
        let enums = self.facts.enums.get(name);

        for raw in self.facts.columns.get(name).into_iter().flatten() {
            let column = self.column_state(
                raw,
                enums.and_then(|e| e.get(&raw.name)),
                primary_key.contains(&raw.name),
                unique_columns.contains(raw.name.as_str()),
                indexed.get(raw.name.as_str()).copied(),
            )?;
            table.columns.insert(raw.name.clone(), column);
        }

        for fk in self.facts.relations.get(name).into_iter().flatten() {
            let relation = Relation {
                columns: fk.columns.clone(),
                references: Reference {
                    table: fk.ref_table.clone(),
                    columns: fk.ref_columns.clone(),
                },
                is_local_unique: is_local_unique(&table, &fk.columns),
                on_delete: fk.on_delete,
                on_update: fk.on_update,
                alias: RelationMeta::decode(fk.comment.as_deref()).and_then(|m| m.alias),
            };
            table.relations.insert(fk.name.clone(), relation);
        }

        table.validate()?;
        Ok(Some(table))
    }

    fn column_state(
        &self,
        raw: &RawColumn,
        enumeration: Option<&RawEnumColumn>,
        is_primary: bool,
        is_unique: bool,
        is_indexed: Option<IndexKind>,
    ) -> Result<Column> {
        let meta = ColumnMeta::decode(raw.comment.as_deref()).unwrap_or_default();

        let mut column_type = match enumeration {
            Some(e) => ColumnType::Enum {
                native_name: e.type_name.clone(),
                values: e.values.clone(),
            },
            None => ColumnType::basic(PgType::parse(&raw.type_name).ok_or_else(|| {
                Error::UnsupportedType {
                    table: raw.table.clone(),
                    column: raw.name.clone(),
                    type_name: raw.type_name.clone(),
                }
            })?),
        };

        let mut column = Column::new(column_type.clone());
        column.is_nullable = raw.is_nullable;
        column.is_primary = is_primary;
        column.is_unique = is_unique;
        column.is_indexed = is_indexed;
        column.alias = meta.alias.clone();
        column.capability = meta.capability()?;
        column.transformers = (meta.transformers != 0).then_some(meta.transformers);
        column.default_value = raw.default_value.clone();

        // a sequence default means a serial column
        if let Some(Value::String(default)) = &column.default_value
            && default.to_ascii_lowercase().starts_with("nextval")
        {
            column.is_primary = true;
            if let Some(serial) = column_type.pg_type().and_then(|t| t.to_serial()) {
                column_type = ColumnType::basic(serial);
            }
            column.default_value = None;
        }

        if column.is_primary {
            column.is_nullable = false;
            column.is_unique = false;
        }

        if let ColumnType::Basic { name } = column_type {
            let mods = raw.modifiers;
            if name.requires_length()
                && let Some(length) = mods.max_length
            {
                column_type = ColumnType::VariableLength { name, length };
            } else if name.requires_precision()
                && let Some(precision) = mods.precision
            {
                column_type = ColumnType::Scalable {
                    name,
                    precision,
                    scale: mods.scale.unwrap_or(0),
                };
            }
        }

        column.default_value = column
            .default_value
            .take()
            .and_then(|value| coerce_default(&column_type, value));
        if column.is_nullable && column.default_value.is_none() {
            column.default_value = Some(Value::Null);
        }

        column.column_type = column_type;
        Ok(column)
    }
}

/// Turn a decoded default string into the value its column type implies.
fn coerce_default(column_type: &ColumnType, value: Value) -> Option<Value> {
    let Value::String(text) = &value else {
        return Some(value);
    };
    let Some(ty) = column_type.pg_type() else {
        return Some(value);
    };

    if ty.is_json() {
        return Some(serde_json::from_str(text).unwrap_or(value));
    }
    if ty == PgType::Boolean {
        return Some(Value::Bool(text == "true"));
    }
    if ty.is_float() {
        return text
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number);
    }
    if ty.is_integer() {
        return leading_integer(text.trim()).map(Value::from);
    }
    Some(value)
}

/// The integer at the start of `text`: `42.0` reads as 42, `abc` as nothing.
fn leading_integer(text: &str) -> Option<i64> {
    let digits = text.strip_prefix(['-', '+']).unwrap_or(text);
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    let sign = text.len() - digits.len();
    text[..sign + end].parse().ok()
}

/// Whether the local columns of a foreign key are unique on their own.
fn is_local_unique(table: &Table, columns: &[String]) -> bool {
    let set: HashSet<&str> = columns.iter().map(String::as_str).collect();
    let primary_key: HashSet<&str> = table.primary_key().into_iter().collect();
    if !primary_key.is_empty() && set == primary_key {
        return true;
    }
    if let [column] = columns
        && table.columns.get(column).is_some_and(|c| c.is_unique)
    {
        return true;
    }
    table
        .uniques
        .values()
        .any(|u| u.columns.iter().map(String::as_str).collect::<HashSet<_>>() == set)
}
