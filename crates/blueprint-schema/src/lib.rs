//! Table descriptor types for blueprint.
//!
//! A [`Table`] is the declarative description of one table: its columns,
//! composite uniques and indexes, foreign keys and persistence. The same type
//! describes both the desired state and what was read back from the catalog.

use blueprint_sql::quote_ident;
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;

mod rules;
mod validate;

pub use validate::{ValidationError, ValidationErrorKind, validate};

/// Postgres column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum PgType {
    /// SMALLINT (2 bytes)
    SmallInt,
    /// INTEGER (4 bytes)
    Integer,
    /// BIGINT (8 bytes)
    BigInt,
    SmallSerial,
    Serial,
    BigSerial,
    /// REAL (4 bytes floating point)
    Real,
    /// DOUBLE PRECISION (8 bytes floating point)
    DoublePrecision,
    /// NUMERIC (arbitrary precision)
    Numeric,
    Money,
    Boolean,
    Text,
    /// VARCHAR, optionally with a length
    Varchar,
    /// CHAR (`bpchar` in the catalog)
    Char,
    Bit,
    Varbit,
    /// BYTEA (binary)
    Bytea,
    Date,
    Time,
    Timetz,
    Timestamp,
    Timestamptz,
    Interval,
    Uuid,
    Json,
    Jsonb,
    Xml,
    Inet,
    Cidr,
    Macaddr,
    Macaddr8,
    Point,
    Line,
    Lseg,
    Box,
    Path,
    Polygon,
    Circle,
    Tsvector,
    Tsquery,
    TxidSnapshot,
    PgSnapshot,
}

impl PgType {
    /// The name used in DDL and in descriptors.
    pub fn sql_name(&self) -> &'static str {
        match self {
            PgType::SmallInt => "smallint",
            PgType::Integer => "integer",
            PgType::BigInt => "bigint",
            PgType::SmallSerial => "smallserial",
            PgType::Serial => "serial",
            PgType::BigSerial => "bigserial",
            PgType::Real => "real",
            PgType::DoublePrecision => "double precision",
            PgType::Numeric => "numeric",
            PgType::Money => "money",
            PgType::Boolean => "boolean",
            PgType::Text => "text",
            PgType::Varchar => "varchar",
            PgType::Char => "char",
            PgType::Bit => "bit",
            PgType::Varbit => "varbit",
            PgType::Bytea => "bytea",
            PgType::Date => "date",
            PgType::Time => "time",
            PgType::Timetz => "timetz",
            PgType::Timestamp => "timestamp",
            PgType::Timestamptz => "timestamptz",
            PgType::Interval => "interval",
            PgType::Uuid => "uuid",
            PgType::Json => "json",
            PgType::Jsonb => "jsonb",
            PgType::Xml => "xml",
            PgType::Inet => "inet",
            PgType::Cidr => "cidr",
            PgType::Macaddr => "macaddr",
            PgType::Macaddr8 => "macaddr8",
            PgType::Point => "point",
            PgType::Line => "line",
            PgType::Lseg => "lseg",
            PgType::Box => "box",
            PgType::Path => "path",
            PgType::Polygon => "polygon",
            PgType::Circle => "circle",
            PgType::Tsvector => "tsvector",
            PgType::Tsquery => "tsquery",
            PgType::TxidSnapshot => "txid_snapshot",
            PgType::PgSnapshot => "pg_snapshot",
        }
    }

    /// Parse a type name, accepting both DDL spellings and catalog `typname`s
    /// (`int4`, `float8`, `bpchar`, ...).
    pub fn parse(name: &str) -> Option<PgType> {
        let ty = match name.trim().to_ascii_lowercase().as_str() {
            "smallint" | "int2" => PgType::SmallInt,
            "integer" | "int" | "int4" => PgType::Integer,
            "bigint" | "int8" => PgType::BigInt,
            "smallserial" | "serial2" => PgType::SmallSerial,
            "serial" | "serial4" => PgType::Serial,
            "bigserial" | "serial8" => PgType::BigSerial,
            "real" | "float4" => PgType::Real,
            "double precision" | "float8" => PgType::DoublePrecision,
            "numeric" | "decimal" => PgType::Numeric,
            "money" => PgType::Money,
            "boolean" | "bool" => PgType::Boolean,
            "text" => PgType::Text,
            "varchar" | "character varying" => PgType::Varchar,
            "char" | "character" | "bpchar" => PgType::Char,
            "bit" => PgType::Bit,
            "varbit" | "bit varying" => PgType::Varbit,
            "bytea" => PgType::Bytea,
            "date" => PgType::Date,
            "time" | "time without time zone" => PgType::Time,
            "timetz" | "time with time zone" => PgType::Timetz,
            "timestamp" | "timestamp without time zone" => PgType::Timestamp,
            "timestamptz" | "timestamp with time zone" => PgType::Timestamptz,
            "interval" => PgType::Interval,
            "uuid" => PgType::Uuid,
            "json" => PgType::Json,
            "jsonb" => PgType::Jsonb,
            "xml" => PgType::Xml,
            "inet" => PgType::Inet,
            "cidr" => PgType::Cidr,
            "macaddr" => PgType::Macaddr,
            "macaddr8" => PgType::Macaddr8,
            "point" => PgType::Point,
            "line" => PgType::Line,
            "lseg" => PgType::Lseg,
            "box" => PgType::Box,
            "path" => PgType::Path,
            "polygon" => PgType::Polygon,
            "circle" => PgType::Circle,
            "tsvector" => PgType::Tsvector,
            "tsquery" => PgType::Tsquery,
            "txid_snapshot" => PgType::TxidSnapshot,
            "pg_snapshot" => PgType::PgSnapshot,
            _ => return None,
        };
        Some(ty)
    }
}

impl fmt::Display for PgType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.sql_name())
    }
}

impl From<PgType> for String {
    fn from(ty: PgType) -> Self {
        ty.sql_name().to_string()
    }
}

impl TryFrom<String> for PgType {
    type Error = String;

    fn try_from(name: String) -> Result<Self, Self::Error> {
        PgType::parse(&name).ok_or_else(|| format!("unknown postgres type `{}`", name))
    }
}

/// The type of a column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ColumnType {
    Basic {
        name: PgType,
    },
    /// `numeric(precision, scale)`
    Scalable {
        name: PgType,
        precision: u32,
        scale: u32,
    },
    /// `varchar(n)`, `char(n)`, `bit(n)`, `varbit(n)`
    VariableLength {
        name: PgType,
        length: u32,
    },
    /// A native Postgres enum type.
    Enum {
        native_name: String,
        values: Vec<String>,
    },
}

impl ColumnType {
    pub fn basic(name: PgType) -> Self {
        ColumnType::Basic { name }
    }

    pub fn varchar(length: u32) -> Self {
        ColumnType::VariableLength {
            name: PgType::Varchar,
            length,
        }
    }

    pub fn numeric(precision: u32, scale: u32) -> Self {
        ColumnType::Scalable {
            name: PgType::Numeric,
            precision,
            scale,
        }
    }

    pub fn enumeration(
        native_name: impl Into<String>,
        values: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        ColumnType::Enum {
            native_name: native_name.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// The underlying Postgres type, `None` for enums.
    pub fn pg_type(&self) -> Option<PgType> {
        match self {
            ColumnType::Basic { name }
            | ColumnType::Scalable { name, .. }
            | ColumnType::VariableLength { name, .. } => Some(*name),
            ColumnType::Enum { .. } => None,
        }
    }

    /// The type Postgres actually stores: `char` and `bit` without a length
    /// are `char(1)` and `bit(1)`.
    pub fn canonical(&self) -> ColumnType {
        match self {
            ColumnType::Basic {
                name: name @ (PgType::Char | PgType::Bit),
            } => ColumnType::VariableLength {
                name: *name,
                length: 1,
            },
            other => other.clone(),
        }
    }

    /// Type as written in DDL.
    pub fn native_type(&self) -> String {
        match self {
            ColumnType::Basic { name } => name.sql_name().to_string(),
            ColumnType::Scalable {
                name,
                precision,
                scale,
            } => format!("{}({}, {})", name, precision, scale),
            ColumnType::VariableLength { name, length } => format!("{}({})", name, length),
            ColumnType::Enum { native_name, .. } => quote_ident(native_name),
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::Enum {
                native_name,
                values,
            } => write!(f, "enum {}({})", native_name, values.join(", ")),
            other => f.write_str(&other.native_type()),
        }
    }
}

/// Index access method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexKind {
    Btree,
    Hash,
    Gin,
    Brin,
    Gist,
    Spgist,
}

impl IndexKind {
    /// The `USING` method name, which is also `pg_am.amname`.
    pub fn method(&self) -> &'static str {
        match self {
            IndexKind::Btree => "btree",
            IndexKind::Hash => "hash",
            IndexKind::Gin => "gin",
            IndexKind::Brin => "brin",
            IndexKind::Gist => "gist",
            IndexKind::Spgist => "spgist",
        }
    }

    pub fn from_method(method: &str) -> Option<IndexKind> {
        match method {
            "btree" => Some(IndexKind::Btree),
            "hash" => Some(IndexKind::Hash),
            "gin" => Some(IndexKind::Gin),
            "brin" => Some(IndexKind::Brin),
            "gist" => Some(IndexKind::Gist),
            "spgist" => Some(IndexKind::Spgist),
            _ => None,
        }
    }
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.method())
    }
}

/// A reserved column behavior, stored in the column comment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Capability {
    CreatedAt,
    UpdatedAt,
    DeletedAt,
    Version,
}

impl Capability {
    pub const ALL: [Capability; 4] = [
        Capability::CreatedAt,
        Capability::UpdatedAt,
        Capability::DeletedAt,
        Capability::Version,
    ];

    /// Bit used in the encoded capability mask.
    pub fn bit(&self) -> u32 {
        match self {
            Capability::CreatedAt => 1,
            Capability::UpdatedAt => 2,
            Capability::DeletedAt => 4,
            Capability::Version => 8,
        }
    }
}

/// Foreign key `ON DELETE` / `ON UPDATE` behavior.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReferentialAction {
    #[default]
    NoAction,
    Restrict,
    Cascade,
    SetNull,
    SetDefault,
}

impl ReferentialAction {
    pub fn to_sql(&self) -> &'static str {
        match self {
            ReferentialAction::NoAction => "NO ACTION",
            ReferentialAction::Restrict => "RESTRICT",
            ReferentialAction::Cascade => "CASCADE",
            ReferentialAction::SetNull => "SET NULL",
            ReferentialAction::SetDefault => "SET DEFAULT",
        }
    }

    /// Decode `pg_constraint.confdeltype` / `confupdtype`.
    pub fn from_catalog_code(code: &str) -> Option<ReferentialAction> {
        match code {
            "a" => Some(ReferentialAction::NoAction),
            "r" => Some(ReferentialAction::Restrict),
            "c" => Some(ReferentialAction::Cascade),
            "n" => Some(ReferentialAction::SetNull),
            "d" => Some(ReferentialAction::SetDefault),
            _ => None,
        }
    }
}

/// Deserialize a present field as `Some`, even when it is JSON `null`.
///
/// Combined with `#[serde(default)]` this keeps "no default" (`None`) apart
/// from "default NULL" (`Some(Value::Null)`).
fn present<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Value>, D::Error> {
    Value::deserialize(deserializer).map(Some)
}

/// A column definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    #[serde(default)]
    pub is_nullable: bool,
    #[serde(default)]
    pub is_unique: bool,
    #[serde(default)]
    pub is_primary: bool,
    /// Single-column index, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_indexed: Option<IndexKind>,
    /// `None` means no default; `Some(Value::Null)` means `DEFAULT NULL`.
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub default_value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capability: Option<Capability>,
    /// External name, kept in the column comment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    /// Value-transformer bitmask owned by the ORM layer. Stored in the
    /// column comment and never interpreted here.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transformers: Option<u32>,
}

impl Column {
    /// A non-null column without a default.
    pub fn new(column_type: ColumnType) -> Self {
        Self {
            column_type,
            is_nullable: false,
            is_unique: false,
            is_primary: false,
            is_indexed: None,
            default_value: None,
            capability: None,
            alias: None,
            transformers: None,
        }
    }

    /// A `serial` primary key column.
    pub fn serial() -> Self {
        Self::new(ColumnType::basic(PgType::Serial)).primary()
    }

    pub fn nullable(mut self) -> Self {
        self.is_nullable = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.is_unique = true;
        self
    }

    pub fn primary(mut self) -> Self {
        self.is_primary = true;
        self
    }

    pub fn indexed(mut self, kind: IndexKind) -> Self {
        self.is_indexed = Some(kind);
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    pub fn capability(mut self, capability: Capability) -> Self {
        self.capability = Some(capability);
        self
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn transformers(mut self, mask: u32) -> Self {
        self.transformers = Some(mask);
        self
    }
}

/// A unique constraint spanning two or more columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompositeUnique {
    pub columns: Vec<String>,
}

/// An index spanning two or more columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompositeIndex {
    pub kind: IndexKind,
    pub columns: Vec<String>,
}

/// The referenced side of a foreign key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    pub table: String,
    pub columns: Vec<String>,
}

/// A foreign key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relation {
    /// Local columns, in order.
    pub columns: Vec<String>,
    pub references: Reference,
    /// Whether the local columns are themselves unique (one-to-one).
    #[serde(default)]
    pub is_local_unique: bool,
    #[serde(default)]
    pub on_delete: ReferentialAction,
    #[serde(default)]
    pub on_update: ReferentialAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

impl Relation {
    pub fn new(
        columns: impl IntoIterator<Item = impl Into<String>>,
        table: impl Into<String>,
        ref_columns: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            references: Reference {
                table: table.into(),
                columns: ref_columns.into_iter().map(Into::into).collect(),
            },
            is_local_unique: false,
            on_delete: ReferentialAction::NoAction,
            on_update: ReferentialAction::NoAction,
            alias: None,
        }
    }

    pub fn on_delete(mut self, action: ReferentialAction) -> Self {
        self.on_delete = action;
        self
    }

    pub fn on_update(mut self, action: ReferentialAction) -> Self {
        self.on_update = action;
        self
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }
}

fn logged() -> bool {
    true
}

/// A table descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub name: String,
    #[serde(default)]
    pub columns: IndexMap<String, Column>,
    /// Composite unique constraints by name. Single-column uniqueness lives on the column.
    #[serde(default)]
    pub uniques: IndexMap<String, CompositeUnique>,
    /// Composite indexes by name. Single-column indexes live on the column.
    #[serde(default)]
    pub indexes: IndexMap<String, CompositeIndex>,
    /// Foreign keys by constraint name.
    #[serde(default)]
    pub relations: IndexMap<String, Relation>,
    #[serde(default = "logged")]
    pub is_logged: bool,
    /// Free-form metadata, kept in the table comment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

impl Table {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: IndexMap::new(),
            uniques: IndexMap::new(),
            indexes: IndexMap::new(),
            relations: IndexMap::new(),
            is_logged: true,
            meta: None,
        }
    }

    pub fn column(mut self, name: impl Into<String>, column: Column) -> Self {
        self.columns.insert(name.into(), column);
        self
    }

    pub fn unique(
        mut self,
        name: impl Into<String>,
        columns: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.uniques.insert(
            name.into(),
            CompositeUnique {
                columns: columns.into_iter().map(Into::into).collect(),
            },
        );
        self
    }

    pub fn index(
        mut self,
        name: impl Into<String>,
        kind: IndexKind,
        columns: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.indexes.insert(
            name.into(),
            CompositeIndex {
                kind,
                columns: columns.into_iter().map(Into::into).collect(),
            },
        );
        self
    }

    pub fn relation(mut self, name: impl Into<String>, relation: Relation) -> Self {
        self.relations.insert(name.into(), relation);
        self
    }

    pub fn unlogged(mut self) -> Self {
        self.is_logged = false;
        self
    }

    pub fn meta(mut self, meta: Value) -> Self {
        self.meta = Some(meta);
        self
    }

    /// Primary key columns, in column order.
    pub fn primary_key(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|(_, c)| c.is_primary)
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Check this descriptor's structural invariants.
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate(self)
    }
}

#[cfg(test)]
mod tests;
