//! Catalog queries.
//!
//! A [`Reflector`] reads raw, denormalized facts about the current schema.
//! [`PgReflector`] reads them from `pg_catalog`; normalization into table
//! descriptors happens in [`crate::Reflection`].

use std::future::Future;

use blueprint_schema::{IndexKind, ReferentialAction};
use blueprint_sql::Ident;
use serde_json::Value;
use tokio_postgres::Row;
use tokio_postgres::types::ToSql;

use crate::{Connection, ConnectionExt, Result, TracedConn};

/// A table and its persistence.
#[derive(Debug, Clone, PartialEq)]
pub struct RawTable {
    pub name: String,
    pub is_logged: bool,
    pub comment: Option<String>,
}

/// A column whose type is a native enum.
#[derive(Debug, Clone, PartialEq)]
pub struct RawEnumColumn {
    pub table: String,
    pub column: String,
    pub type_name: String,
    /// Labels in sort order.
    pub values: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawForeignKey {
    pub table: String,
    pub name: String,
    pub columns: Vec<String>,
    pub ref_table: String,
    pub ref_columns: Vec<String>,
    pub on_delete: ReferentialAction,
    pub on_update: ReferentialAction,
    pub comment: Option<String>,
}

/// A unique or primary key constraint.
#[derive(Debug, Clone, PartialEq)]
pub struct RawConstraint {
    pub table: String,
    pub name: String,
    pub columns: Vec<String>,
}

/// An index that doesn't back a constraint.
#[derive(Debug, Clone, PartialEq)]
pub struct RawIndex {
    pub table: String,
    pub name: String,
    pub kind: IndexKind,
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawColumn {
    pub table: String,
    pub name: String,
    /// `pg_type.typname`
    pub type_name: String,
    pub is_nullable: bool,
    /// Decoded default: a string or null, `None` without a default.
    pub default_value: Option<Value>,
    pub modifiers: TypeModifiers,
    pub comment: Option<String>,
}

/// Length/precision/scale decoded from `atttypmod`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TypeModifiers {
    pub max_length: Option<u32>,
    pub precision: Option<u32>,
    pub scale: Option<u32>,
}

const BPCHAR_OID: u32 = 1042;
const VARCHAR_OID: u32 = 1043;
const BIT_OID: u32 = 1560;
const VARBIT_OID: u32 = 1562;
const NUMERIC_OID: u32 = 1700;

/// Decode a type modifier for the types that carry one.
pub fn type_modifiers(type_oid: u32, type_mod: i32) -> TypeModifiers {
    let mut mods = TypeModifiers::default();
    if type_mod == -1 {
        return mods;
    }
    match type_oid {
        BPCHAR_OID | VARCHAR_OID => mods.max_length = u32::try_from(type_mod - 4).ok(),
        BIT_OID | VARBIT_OID => mods.max_length = u32::try_from(type_mod).ok(),
        NUMERIC_OID => {
            let m = type_mod - 4;
            mods.precision = u32::try_from((m >> 16) & 0xFFFF).ok();
            mods.scale = u32::try_from(m & 0xFFFF).ok();
        }
        _ => {}
    }
    mods
}

/// Decode a default expression from `pg_get_expr`.
///
/// `'text'::type` becomes the raw text, `NULL` and `NULL::type` become null,
/// a parenthesized negative number loses its parentheses. Anything else
/// (function calls, bare numbers and booleans) is kept verbatim as a string.
pub fn decode_default(expr: &str) -> Value {
    let mut expr = expr.trim();
    while let Some(inner) = expr.strip_prefix('(').and_then(|e| e.strip_suffix(')')) {
        if !is_balanced(inner) {
            break;
        }
        expr = inner.trim();
    }

    let upper = expr.to_ascii_uppercase();
    if upper == "NULL" || upper.starts_with("NULL::") {
        return Value::Null;
    }

    if let Some((text, rest)) = split_quoted(expr)
        && (rest.is_empty() || rest.starts_with("::"))
    {
        return Value::String(text);
    }

    Value::String(expr.to_string())
}

fn is_balanced(s: &str) -> bool {
    let mut depth = 0i32;
    let mut in_quote = false;
    for c in s.chars() {
        match c {
            '\'' => in_quote = !in_quote,
            '(' if !in_quote => depth += 1,
            ')' if !in_quote => {
                depth -= 1;
                if depth < 0 {
                    return false;
                }
            }
            _ => {}
        }
    }
    depth == 0
}

/// Split a leading `'...'` literal off `s`, unescaping doubled quotes.
fn split_quoted(s: &str) -> Option<(String, &str)> {
    let body = s.strip_prefix('\'')?;
    let mut text = String::new();
    let mut chars = body.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if c == '\'' {
            if matches!(chars.peek(), Some((_, '\''))) {
                chars.next();
                text.push('\'');
            } else {
                return Some((text, &body[i + 1..]));
            }
        } else {
            text.push(c);
        }
    }
    None
}

/// Read access to the live catalog.
///
/// Each method returns one category of facts for the current schema. All
/// calls are read-only and independent, so they may run concurrently.
pub trait Reflector: Send + Sync {
    fn tables(&self) -> impl Future<Output = Result<Vec<RawTable>>> + Send;

    /// Names of native enum types.
    fn types(&self) -> impl Future<Output = Result<Vec<String>>> + Send;

    fn enumerators(&self) -> impl Future<Output = Result<Vec<RawEnumColumn>>> + Send;

    fn foreign_keys(&self) -> impl Future<Output = Result<Vec<RawForeignKey>>> + Send;

    /// Names of every unique constraint in the schema.
    fn unique_names(&self) -> impl Future<Output = Result<Vec<String>>> + Send;

    fn uniques(&self) -> impl Future<Output = Result<Vec<RawConstraint>>> + Send;

    fn primary_keys(&self) -> impl Future<Output = Result<Vec<RawConstraint>>> + Send;

    fn indexes(&self) -> impl Future<Output = Result<Vec<RawIndex>>> + Send;

    fn columns(&self) -> impl Future<Output = Result<Vec<RawColumn>>> + Send;

    /// Whether `table` holds at least one row.
    fn has_rows(&self, table: &str) -> impl Future<Output = Result<bool>> + Send;
}

/// Reads facts from `pg_catalog`, scoped to `current_schema()`.
pub struct PgReflector<'a, C: Connection> {
    conn: TracedConn<'a, C>,
}

impl<'a, C: Connection> PgReflector<'a, C> {
    pub fn new(conn: &'a C) -> Self {
        Self {
            conn: conn.traced(),
        }
    }

    async fn rows(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> Result<Vec<Row>> {
        Ok(self.conn.query(sql, params).await?)
    }
}

const TABLES_SQL: &str = "
SELECT c.relname::text AS name,
       c.relpersistence = 'p' AS is_logged,
       obj_description(c.oid, 'pg_class') AS comment
FROM pg_catalog.pg_class c
JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
WHERE n.nspname = current_schema() AND c.relkind = 'r'
ORDER BY c.relname";

const TYPES_SQL: &str = "
SELECT t.typname::text AS name
FROM pg_catalog.pg_type t
JOIN pg_catalog.pg_namespace n ON n.oid = t.typnamespace
WHERE n.nspname = current_schema() AND t.typtype = 'e'
ORDER BY t.typname";

const ENUMERATORS_SQL: &str = "
SELECT c.relname::text AS table_name,
       a.attname::text AS column_name,
       t.typname::text AS type_name,
       array_agg(e.enumlabel::text ORDER BY e.enumsortorder) AS labels
FROM pg_catalog.pg_attribute a
JOIN pg_catalog.pg_class c ON c.oid = a.attrelid
JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
JOIN pg_catalog.pg_type t ON t.oid = a.atttypid
JOIN pg_catalog.pg_enum e ON e.enumtypid = t.oid
WHERE n.nspname = current_schema() AND c.relkind = 'r'
  AND a.attnum > 0 AND NOT a.attisdropped AND t.typtype = 'e'
GROUP BY c.relname, a.attname, t.typname";

const FOREIGN_KEYS_SQL: &str = "
SELECT con.conname::text AS name,
       c.relname::text AS table_name,
       rc.relname::text AS ref_table,
       array(SELECT a.attname::text
             FROM unnest(con.conkey) WITH ORDINALITY AS k(attnum, ord)
             JOIN pg_catalog.pg_attribute a ON a.attrelid = con.conrelid AND a.attnum = k.attnum
             ORDER BY k.ord) AS columns,
       array(SELECT a.attname::text
             FROM unnest(con.confkey) WITH ORDINALITY AS k(attnum, ord)
             JOIN pg_catalog.pg_attribute a ON a.attrelid = con.confrelid AND a.attnum = k.attnum
             ORDER BY k.ord) AS ref_columns,
       con.confdeltype::text AS on_delete,
       con.confupdtype::text AS on_update,
       obj_description(con.oid, 'pg_constraint') AS comment
FROM pg_catalog.pg_constraint con
JOIN pg_catalog.pg_class c ON c.oid = con.conrelid
JOIN pg_catalog.pg_class rc ON rc.oid = con.confrelid
JOIN pg_catalog.pg_namespace n ON n.oid = con.connamespace
WHERE n.nspname = current_schema() AND con.contype = 'f'
ORDER BY c.relname, con.conname";

const UNIQUE_NAMES_SQL: &str = "
SELECT con.conname::text AS name
FROM pg_catalog.pg_constraint con
JOIN pg_catalog.pg_namespace n ON n.oid = con.connamespace
WHERE n.nspname = current_schema() AND con.contype = 'u'";

/// Unique (`$1 = 'u'`) or primary key (`$1 = 'p'`) constraints with their columns in key order.
const CONSTRAINTS_SQL: &str = "
SELECT con.conname::text AS name,
       c.relname::text AS table_name,
       array(SELECT a.attname::text
             FROM unnest(con.conkey) WITH ORDINALITY AS k(attnum, ord)
             JOIN pg_catalog.pg_attribute a ON a.attrelid = con.conrelid AND a.attnum = k.attnum
             ORDER BY k.ord) AS columns
FROM pg_catalog.pg_constraint con
JOIN pg_catalog.pg_class c ON c.oid = con.conrelid
JOIN pg_catalog.pg_namespace n ON n.oid = con.connamespace
WHERE n.nspname = current_schema() AND con.contype::text = $1
ORDER BY c.relname, con.conname";

const INDEXES_SQL: &str = "
SELECT i.relname::text AS name,
       c.relname::text AS table_name,
       am.amname::text AS method,
       array(SELECT a.attname::text
             FROM unnest(ix.indkey::int2[]) WITH ORDINALITY AS k(attnum, ord)
             JOIN pg_catalog.pg_attribute a ON a.attrelid = ix.indrelid AND a.attnum = k.attnum
             ORDER BY k.ord) AS columns
FROM pg_catalog.pg_index ix
JOIN pg_catalog.pg_class i ON i.oid = ix.indexrelid
JOIN pg_catalog.pg_class c ON c.oid = ix.indrelid
JOIN pg_catalog.pg_am am ON am.oid = i.relam
JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
WHERE n.nspname = current_schema() AND c.relkind = 'r'
  AND NOT EXISTS (
    SELECT 1 FROM pg_catalog.pg_constraint con
    WHERE con.conindid = ix.indexrelid AND con.contype IN ('p', 'u', 'x')
  )
ORDER BY c.relname, i.relname";

const COLUMNS_SQL: &str = "
SELECT c.relname::text AS table_name,
       a.attname::text AS name,
       t.typname::text AS type_name,
       NOT a.attnotnull AS is_nullable,
       pg_get_expr(d.adbin, d.adrelid) AS default_expr,
       a.atttypid AS type_oid,
       a.atttypmod AS type_mod,
       col_description(a.attrelid, a.attnum) AS comment
FROM pg_catalog.pg_attribute a
JOIN pg_catalog.pg_class c ON c.oid = a.attrelid
JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
JOIN pg_catalog.pg_type t ON t.oid = a.atttypid
LEFT JOIN pg_catalog.pg_attrdef d ON d.adrelid = a.attrelid AND d.adnum = a.attnum
WHERE n.nspname = current_schema() AND c.relkind = 'r'
  AND a.attnum > 0 AND NOT a.attisdropped
ORDER BY c.relname, a.attnum";

fn referential_action(row: &Row, column: &str) -> Result<ReferentialAction> {
    let code: String = row.try_get(column)?;
    Ok(ReferentialAction::from_catalog_code(&code).unwrap_or_default())
}

fn name(row: &Row) -> Result<String> {
    Ok(row.try_get("name")?)
}

fn raw_table(row: &Row) -> Result<RawTable> {
    Ok(RawTable {
        name: row.try_get("name")?,
        is_logged: row.try_get("is_logged")?,
        comment: row.try_get("comment")?,
    })
}

fn raw_enum_column(row: &Row) -> Result<RawEnumColumn> {
    Ok(RawEnumColumn {
        table: row.try_get("table_name")?,
        column: row.try_get("column_name")?,
        type_name: row.try_get("type_name")?,
        values: row.try_get("labels")?,
    })
}

fn raw_foreign_key(row: &Row) -> Result<RawForeignKey> {
    Ok(RawForeignKey {
        table: row.try_get("table_name")?,
        name: row.try_get("name")?,
        columns: row.try_get("columns")?,
        ref_table: row.try_get("ref_table")?,
        ref_columns: row.try_get("ref_columns")?,
        on_delete: referential_action(row, "on_delete")?,
        on_update: referential_action(row, "on_update")?,
        comment: row.try_get("comment")?,
    })
}

fn raw_constraint(row: &Row) -> Result<RawConstraint> {
    Ok(RawConstraint {
        table: row.try_get("table_name")?,
        name: row.try_get("name")?,
        columns: row.try_get("columns")?,
    })
}

fn raw_column(row: &Row) -> Result<RawColumn> {
    let default_expr: Option<String> = row.try_get("default_expr")?;
    let type_oid: u32 = row.try_get("type_oid")?;
    let type_mod: i32 = row.try_get("type_mod")?;
    Ok(RawColumn {
        table: row.try_get("table_name")?,
        name: row.try_get("name")?,
        type_name: row.try_get("type_name")?,
        is_nullable: row.try_get("is_nullable")?,
        default_value: default_expr.as_deref().map(decode_default),
        modifiers: type_modifiers(type_oid, type_mod),
        comment: row.try_get("comment")?,
    })
}

impl<C: Connection> Reflector for PgReflector<'_, C> {
    async fn tables(&self) -> Result<Vec<RawTable>> {
        self.rows(TABLES_SQL, &[]).await?.iter().map(raw_table).collect()
    }

    async fn types(&self) -> Result<Vec<String>> {
        self.rows(TYPES_SQL, &[]).await?.iter().map(name).collect()
    }

    async fn enumerators(&self) -> Result<Vec<RawEnumColumn>> {
        self.rows(ENUMERATORS_SQL, &[])
            .await?
            .iter()
            .map(raw_enum_column)
            .collect()
    }

    async fn foreign_keys(&self) -> Result<Vec<RawForeignKey>> {
        self.rows(FOREIGN_KEYS_SQL, &[])
            .await?
            .iter()
            .map(raw_foreign_key)
            .collect()
    }

    async fn unique_names(&self) -> Result<Vec<String>> {
        self.rows(UNIQUE_NAMES_SQL, &[]).await?.iter().map(name).collect()
    }

    async fn uniques(&self) -> Result<Vec<RawConstraint>> {
        self.rows(CONSTRAINTS_SQL, &[&"u"])
            .await?
            .iter()
            .map(raw_constraint)
            .collect()
    }

    async fn primary_keys(&self) -> Result<Vec<RawConstraint>> {
        self.rows(CONSTRAINTS_SQL, &[&"p"])
            .await?
            .iter()
            .map(raw_constraint)
            .collect()
    }

    async fn indexes(&self) -> Result<Vec<RawIndex>> {
        let rows = self.rows(INDEXES_SQL, &[]).await?;
        let mut indexes = Vec::with_capacity(rows.len());
        for row in &rows {
            let name: String = row.try_get("name")?;
            let method: String = row.try_get("method")?;
            let Some(kind) = IndexKind::from_method(&method) else {
                tracing::warn!(index = %name, %method, "skipping index with unknown access method");
                continue;
            };
            indexes.push(RawIndex {
                table: row.try_get("table_name")?,
                name,
                kind,
                columns: row.try_get("columns")?,
            });
        }
        Ok(indexes)
    }

    async fn columns(&self) -> Result<Vec<RawColumn>> {
        self.rows(COLUMNS_SQL, &[]).await?.iter().map(raw_column).collect()
    }

    async fn has_rows(&self, table: &str) -> Result<bool> {
        let sql = format!("SELECT 1 FROM {} LIMIT 1", Ident(table));
        Ok(self.conn.query_opt(&sql, &[]).await?.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typmod_formulas() {
        // varchar(255)
        assert_eq!(type_modifiers(VARCHAR_OID, 259).max_length, Some(255));
        // char(10)
        assert_eq!(type_modifiers(BPCHAR_OID, 14).max_length, Some(10));
        // bit(8)
        assert_eq!(type_modifiers(BIT_OID, 8).max_length, Some(8));
        // numeric(10, 2)
        let m = type_modifiers(NUMERIC_OID, ((10 << 16) | 2) + 4);
        assert_eq!((m.precision, m.scale), (Some(10), Some(2)));
        // unconstrained
        assert_eq!(type_modifiers(NUMERIC_OID, -1), TypeModifiers::default());
        assert_eq!(type_modifiers(VARCHAR_OID, -1), TypeModifiers::default());
        // no modifier table entry
        assert_eq!(type_modifiers(23, 12), TypeModifiers::default());
    }

    #[test]
    fn default_literals() {
        assert_eq!(decode_default("'hello'::text"), Value::from("hello"));
        assert_eq!(decode_default("'it''s'::character varying"), Value::from("it's"));
        assert_eq!(decode_default("'{\"a\": 1}'::jsonb"), Value::from("{\"a\": 1}"));
        assert_eq!(decode_default("'happy'::mood"), Value::from("happy"));
        assert_eq!(decode_default("'-1.5'::double precision"), Value::from("-1.5"));
        assert_eq!(decode_default("''::text"), Value::from(""));
    }

    #[test]
    fn default_nulls() {
        assert_eq!(decode_default("NULL"), Value::Null);
        assert_eq!(decode_default("NULL::text"), Value::Null);
        assert_eq!(decode_default("NULL::character varying"), Value::Null);
    }

    #[test]
    fn default_expressions_are_kept() {
        assert_eq!(decode_default("42"), Value::from("42"));
        assert_eq!(decode_default("(-42)"), Value::from("-42"));
        assert_eq!(decode_default("true"), Value::from("true"));
        assert_eq!(
            decode_default("nextval('user_id_seq'::regclass)"),
            Value::from("nextval('user_id_seq'::regclass)")
        );
        assert_eq!(decode_default("now()"), Value::from("now()"));
        // not a single wrapping pair
        assert_eq!(decode_default("(1) + (2)"), Value::from("(1) + (2)"));
    }
}
