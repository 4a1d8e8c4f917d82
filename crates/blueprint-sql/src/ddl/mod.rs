//! DDL statement AST.

use std::fmt;

use crate::{Ident, Lit};

/// A single DDL statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    CreateType(CreateType),
    CreateTable(CreateTable),
    DropTable(DropTable),
    AlterTable(AlterTable),
    CreateIndex(CreateIndex),
    DropIndex(DropIndex),
    Comment(Comment),
}

/// Render statements as one script, each terminated by `;`.
pub fn render_script(statements: &[Statement]) -> String {
    statements
        .iter()
        .map(|s| format!("{};", s))
        .collect::<Vec<_>>()
        .join("\n")
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Statement::CreateType(s) => fmt::Display::fmt(s, f),
            Statement::CreateTable(s) => fmt::Display::fmt(s, f),
            Statement::DropTable(s) => fmt::Display::fmt(s, f),
            Statement::AlterTable(s) => fmt::Display::fmt(s, f),
            Statement::CreateIndex(s) => fmt::Display::fmt(s, f),
            Statement::DropIndex(s) => fmt::Display::fmt(s, f),
            Statement::Comment(s) => fmt::Display::fmt(s, f),
        }
    }
}

macro_rules! impl_from_stmt {
    ($($variant:ident),*) => {
        $(
            impl From<$variant> for Statement {
                fn from(s: $variant) -> Self {
                    Statement::$variant(s)
                }
            }
        )*
    };
}

impl_from_stmt!(
    CreateType,
    CreateTable,
    DropTable,
    AlterTable,
    CreateIndex,
    DropIndex,
    Comment
);

/// `CREATE TYPE name AS ENUM (...)`
#[derive(Debug, Clone, PartialEq)]
pub struct CreateType {
    pub name: String,
    pub variants: Vec<String>,
}

impl fmt::Display for CreateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CREATE TYPE {} AS ENUM (", Ident(&self.name))?;
        for (i, v) in self.variants.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", Lit(v))?;
        }
        write!(f, ")")
    }
}

/// `CREATE TABLE name ()`
///
/// Tables are created empty; columns are added by a follow-up `ALTER TABLE`.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateTable {
    pub name: String,
}

impl fmt::Display for CreateTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CREATE TABLE {} ()", Ident(&self.name))
    }
}

/// `DROP TABLE name`
#[derive(Debug, Clone, PartialEq)]
pub struct DropTable {
    pub name: String,
}

impl fmt::Display for DropTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DROP TABLE {}", Ident(&self.name))
    }
}

/// `ALTER TABLE name action, action, ...`
#[derive(Debug, Clone, PartialEq)]
pub struct AlterTable {
    pub table: String,
    pub actions: Vec<AlterAction>,
}

impl AlterTable {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            actions: Vec::new(),
        }
    }

    pub fn action(mut self, action: AlterAction) -> Self {
        self.actions.push(action);
        self
    }
}

impl fmt::Display for AlterTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ALTER TABLE {} ", Ident(&self.table))?;
        for (i, action) in self.actions.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", action)?;
        }
        Ok(())
    }
}

/// One clause of an `ALTER TABLE`.
#[derive(Debug, Clone, PartialEq)]
pub enum AlterAction {
    AddColumn(ColumnDef),
    DropColumn(String),
    AlterColumn {
        column: String,
        change: ColumnChange,
    },
    AddConstraint {
        name: Option<String>,
        constraint: TableConstraint,
    },
    DropConstraint(String),
    /// `SET LOGGED` when true, `SET UNLOGGED` otherwise.
    SetLogged(bool),
}

impl fmt::Display for AlterAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlterAction::AddColumn(def) => write!(f, "ADD COLUMN {}", def),
            AlterAction::DropColumn(name) => write!(f, "DROP COLUMN {}", Ident(name)),
            AlterAction::AlterColumn { column, change } => {
                write!(f, "ALTER COLUMN {} {}", Ident(column), change)
            }
            AlterAction::AddConstraint { name, constraint } => {
                write!(f, "ADD ")?;
                if let Some(name) = name {
                    write!(f, "CONSTRAINT {} ", Ident(name))?;
                }
                write!(f, "{}", constraint)
            }
            AlterAction::DropConstraint(name) => write!(f, "DROP CONSTRAINT {}", Ident(name)),
            AlterAction::SetLogged(true) => write!(f, "SET LOGGED"),
            AlterAction::SetLogged(false) => write!(f, "SET UNLOGGED"),
        }
    }
}

/// A column-level alteration.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnChange {
    SetNotNull,
    DropNotNull,
    /// `SET DEFAULT <expr>`, the expression is already rendered SQL.
    SetDefault(String),
    DropDefault,
}

impl fmt::Display for ColumnChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnChange::SetNotNull => write!(f, "SET NOT NULL"),
            ColumnChange::DropNotNull => write!(f, "DROP NOT NULL"),
            ColumnChange::SetDefault(expr) => write!(f, "SET DEFAULT {}", expr),
            ColumnChange::DropDefault => write!(f, "DROP DEFAULT"),
        }
    }
}

/// Column definition used by `ADD COLUMN`.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDef {
    pub name: String,
    /// Rendered type, e.g. `varchar(255)` or a quoted enum type name.
    pub data_type: String,
    pub not_null: bool,
    pub unique: bool,
    pub primary_key: bool,
    /// Rendered default expression.
    pub default: Option<String>,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            not_null: false,
            unique: false,
            primary_key: false,
            default: None,
        }
    }
}

impl fmt::Display for ColumnDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", Ident(&self.name), self.data_type)?;
        if let Some(default) = &self.default {
            write!(f, " DEFAULT {}", default)?;
        }
        if self.not_null {
            write!(f, " NOT NULL")?;
        } else {
            write!(f, " NULL")?;
        }
        if self.unique {
            write!(f, " UNIQUE")?;
        }
        if self.primary_key {
            write!(f, " PRIMARY KEY")?;
        }
        Ok(())
    }
}

/// A table-level constraint.
#[derive(Debug, Clone, PartialEq)]
pub enum TableConstraint {
    PrimaryKey(Vec<String>),
    Unique(Vec<String>),
    ForeignKey {
        columns: Vec<String>,
        ref_table: String,
        ref_columns: Vec<String>,
        on_delete: &'static str,
        on_update: &'static str,
    },
}

fn write_columns(f: &mut fmt::Formatter<'_>, columns: &[String]) -> fmt::Result {
    write!(f, "(")?;
    for (i, c) in columns.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", Ident(c))?;
    }
    write!(f, ")")
}

impl fmt::Display for TableConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableConstraint::PrimaryKey(columns) => {
                write!(f, "PRIMARY KEY ")?;
                write_columns(f, columns)
            }
            TableConstraint::Unique(columns) => {
                write!(f, "UNIQUE ")?;
                write_columns(f, columns)
            }
            TableConstraint::ForeignKey {
                columns,
                ref_table,
                ref_columns,
                on_delete,
                on_update,
            } => {
                write!(f, "FOREIGN KEY ")?;
                write_columns(f, columns)?;
                write!(f, " REFERENCES {} ", Ident(ref_table))?;
                write_columns(f, ref_columns)?;
                write!(f, " ON DELETE {} ON UPDATE {}", on_delete, on_update)
            }
        }
    }
}

/// `CREATE INDEX name ON table USING method (columns)`
#[derive(Debug, Clone, PartialEq)]
pub struct CreateIndex {
    pub name: String,
    pub table: String,
    /// Access method (`btree`, `gin`, ...).
    pub method: &'static str,
    pub columns: Vec<String>,
}

impl fmt::Display for CreateIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CREATE INDEX {} ON {} USING {} ",
            Ident(&self.name),
            Ident(&self.table),
            self.method
        )?;
        write_columns(f, &self.columns)
    }
}

/// `DROP INDEX name`
#[derive(Debug, Clone, PartialEq)]
pub struct DropIndex {
    pub name: String,
}

impl fmt::Display for DropIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DROP INDEX {}", Ident(&self.name))
    }
}

/// Object a comment is attached to.
#[derive(Debug, Clone, PartialEq)]
pub enum CommentTarget {
    Table(String),
    Column { table: String, column: String },
    Constraint { table: String, name: String },
}

/// `COMMENT ON ... IS ...`; a `None` text clears the comment.
#[derive(Debug, Clone, PartialEq)]
pub struct Comment {
    pub target: CommentTarget,
    pub text: Option<String>,
}

impl fmt::Display for Comment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "COMMENT ON ")?;
        match &self.target {
            CommentTarget::Table(table) => write!(f, "TABLE {}", Ident(table))?,
            CommentTarget::Column { table, column } => {
                write!(f, "COLUMN {}.{}", Ident(table), Ident(column))?
            }
            CommentTarget::Constraint { table, name } => {
                write!(f, "CONSTRAINT {} ON {}", Ident(name), Ident(table))?
            }
        }
        match &self.text {
            Some(text) => write!(f, " IS {}", Lit(text)),
            None => write!(f, " IS NULL"),
        }
    }
}
