//! Structural validation of table descriptors.

use blueprint_sql::PG_IDENT_MAX;
use serde_json::Value;
use thiserror::Error;

use crate::{ColumnType, IndexKind, Table};

/// A descriptor violated one of its invariants.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid table `{table}`: {kind}")]
pub struct ValidationError {
    pub table: String,
    pub kind: ValidationErrorKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationErrorKind {
    #[error("table name is empty")]
    EmptyName,

    #[error("composite {constraint} `{name}` needs at least 2 columns, has {count}")]
    TooFewColumns {
        constraint: &'static str,
        name: String,
        count: usize,
    },

    #[error("{constraint} `{name}` references unknown column `{column}`")]
    UnknownColumn {
        constraint: &'static str,
        name: String,
        column: String,
    },

    #[error("table name is {length} bytes long, the limit is {}", PG_IDENT_MAX)]
    NameTooLong { length: usize },

    #[error("table name may only contain letters, digits and underscores")]
    InvalidName,

    #[error("serial column `{column}` must be primary")]
    SerialNotPrimary { column: String },

    #[error("nullable column `{column}` needs an explicit default (use null)")]
    NullableWithoutDefault { column: String },

    #[error("serial column `{column}` can't be nullable")]
    SerialNullable { column: String },

    #[error("column `{column}` of type {column_type} can't be unique")]
    UniqueNotAllowed { column: String, column_type: String },

    #[error("column `{column}` of type {column_type} can't be primary")]
    PrimaryNotAllowed { column: String, column_type: String },

    #[error("primary column `{column}` can't also be unique")]
    PrimaryAndUnique { column: String },

    #[error("primary column `{column}` can't be nullable")]
    PrimaryAndNullable { column: String },

    #[error("alias of column `{column}` has control characters or surrounding whitespace")]
    InvalidAlias { column: String },

    #[error("enum column `{column}` has no values")]
    EmptyEnum { column: String },

    #[error("enum column `{column}` repeats value `{value}`")]
    DuplicateEnumValue { column: String, value: String },

    #[error("default of enum column `{column}` is not one of its values")]
    EnumDefaultNotAllowed { column: String },

    #[error("column `{column}` has parameters its type doesn't take: {column_type}")]
    UnexpectedTypeParameters { column: String, column_type: String },

    #[error("composite index `{name}` can't use {kind}")]
    UnsupportedCompositeIndexKind { name: String, kind: IndexKind },

    #[error("composite unique `{name}` includes column `{column}` which can't be unique")]
    CompositeUniqueNotAllowed { name: String, column: String },

    #[error("relation `{name}` has no columns")]
    EmptyRelation { name: String },

    #[error("relation `{name}` maps {local} column(s) to {referenced}")]
    RelationArity {
        name: String,
        local: usize,
        referenced: usize,
    },
}

/// Validate a table descriptor, stopping at the first violation.
pub fn validate(table: &Table) -> Result<(), ValidationError> {
    check(table).map_err(|kind| ValidationError {
        table: table.name.clone(),
        kind,
    })
}

fn check(table: &Table) -> Result<(), ValidationErrorKind> {
    use ValidationErrorKind::*;

    if table.name.trim().is_empty() {
        return Err(EmptyName);
    }

    let composites = table
        .indexes
        .iter()
        .map(|(name, index)| ("index", name, &index.columns))
        .chain(
            table
                .uniques
                .iter()
                .map(|(name, unique)| ("unique", name, &unique.columns)),
        );
    for (constraint, name, columns) in composites {
        if columns.len() < 2 {
            return Err(TooFewColumns {
                constraint,
                name: name.clone(),
                count: columns.len(),
            });
        }
        if let Some(column) = columns.iter().find(|c| !table.columns.contains_key(*c)) {
            return Err(UnknownColumn {
                constraint,
                name: name.clone(),
                column: column.clone(),
            });
        }
    }

    if table.name.len() > PG_IDENT_MAX {
        return Err(NameTooLong {
            length: table.name.len(),
        });
    }
    if !table
        .name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(InvalidName);
    }

    for (name, column) in &table.columns {
        let column_name = || name.clone();
        let ty = &column.column_type;

        if ty.is_serial() && !column.is_primary {
            return Err(SerialNotPrimary {
                column: column_name(),
            });
        }
        if column.is_nullable && column.default_value.is_none() {
            return Err(NullableWithoutDefault {
                column: column_name(),
            });
        }
        if ty.is_serial() && column.is_nullable {
            return Err(SerialNullable {
                column: column_name(),
            });
        }
        if column.is_unique && !ty.can_be_unique() {
            return Err(UniqueNotAllowed {
                column: column_name(),
                column_type: ty.to_string(),
            });
        }
        if column.is_primary && !ty.can_be_primary() {
            return Err(PrimaryNotAllowed {
                column: column_name(),
                column_type: ty.to_string(),
            });
        }
        if column.is_primary && column.is_unique {
            return Err(PrimaryAndUnique {
                column: column_name(),
            });
        }
        if column.is_primary && column.is_nullable {
            return Err(PrimaryAndNullable {
                column: column_name(),
            });
        }
        if let Some(alias) = &column.alias
            && (alias.chars().any(char::is_control) || alias.trim() != alias)
        {
            return Err(InvalidAlias {
                column: column_name(),
            });
        }
        if let ColumnType::Enum { values, .. } = ty {
            if values.is_empty() {
                return Err(EmptyEnum {
                    column: column_name(),
                });
            }
            for (i, value) in values.iter().enumerate() {
                if values[..i].contains(value) {
                    return Err(DuplicateEnumValue {
                        column: column_name(),
                        value: value.clone(),
                    });
                }
            }
            let default_allowed = match &column.default_value {
                None | Some(Value::Null) => true,
                Some(Value::String(s)) => values.contains(s),
                Some(_) => false,
            };
            if !default_allowed {
                return Err(EnumDefaultNotAllowed {
                    column: column_name(),
                });
            }
        }
        if !ty.has_valid_parameters() {
            return Err(UnexpectedTypeParameters {
                column: column_name(),
                column_type: ty.to_string(),
            });
        }
    }

    for (name, index) in &table.indexes {
        if matches!(index.kind, IndexKind::Hash | IndexKind::Spgist) {
            return Err(UnsupportedCompositeIndexKind {
                name: name.clone(),
                kind: index.kind,
            });
        }
    }

    for (name, unique) in &table.uniques {
        let offending = unique.columns.iter().find(|c| {
            table
                .columns
                .get(*c)
                .is_some_and(|col| !col.column_type.can_be_unique())
        });
        if let Some(column) = offending {
            return Err(CompositeUniqueNotAllowed {
                name: name.clone(),
                column: column.clone(),
            });
        }
    }

    for (name, relation) in &table.relations {
        if relation.columns.is_empty() {
            return Err(EmptyRelation { name: name.clone() });
        }
        if relation.columns.len() != relation.references.columns.len() {
            return Err(RelationArity {
                name: name.clone(),
                local: relation.columns.len(),
                referenced: relation.references.columns.len(),
            });
        }
        if let Some(column) = relation
            .columns
            .iter()
            .find(|c| !table.columns.contains_key(*c))
        {
            return Err(UnknownColumn {
                constraint: "relation",
                name: name.clone(),
                column: column.clone(),
            });
        }
    }

    Ok(())
}
