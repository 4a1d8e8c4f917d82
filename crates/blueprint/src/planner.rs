//! Turns target descriptors into a [`MigrationPlan`].
//!
//! New tables are built from scratch by [`Planner::create_table`]. Existing
//! tables are reflected, diffed against the target and patched by
//! [`Planner::alter_table`]. Both register what they create in the shared
//! [`Reflection`], so later tables in the same batch see it as existing.
//!
//! Steps are bucketed into phases so that a whole batch runs in a safe order:
//!
//! | phase | contents |
//! |---|---|
//! | 0 | create enum types, create tables, set unlogged |
//! | 1 | columns of new tables, set logged, drop foreign keys |
//! | 2 | composites of new tables, drop composites, drop primary keys |
//! | 3 | add, drop and alter columns |
//! | 4 | add primary keys and composites of existing tables |
//! | 8 | add foreign keys |
//! | 9 | foreign key comments |

use std::collections::HashSet;

use blueprint_schema::{Column, ColumnType, Relation, Table};
use blueprint_sql::{
    AlterAction, AlterTable, ColumnChange, ColumnDef, Comment, CommentTarget, CreateIndex,
    CreateTable, CreateType, DropIndex, Statement, TableConstraint, escape_string, index_name,
    primary_key_name, unique_key_name,
};
use serde_json::Value;

use crate::diff::{ColumnDiff, EntryChange, FieldChange, diff};
use crate::introspect::Reflector;
use crate::meta::{ColumnMeta, RelationMeta, TableMeta};
use crate::plan::{MigrationPlan, Risk, Step};
use crate::reflection::Reflection;
use crate::{Error, Result};

pub const PHASE_CREATE: u8 = 0;
pub const PHASE_COLUMNS: u8 = 1;
pub const PHASE_COMPOSITES: u8 = 2;
pub const PHASE_ALTER: u8 = 3;
pub const PHASE_CONSTRAINTS: u8 = 4;
pub const PHASE_RELATIONS: u8 = 8;
pub const PHASE_RELATION_COMMENTS: u8 = 9;

/// Plan every target against one refreshed batch context.
///
/// All targets are validated before anything is planned. Tables that don't
/// exist yet are registered up front, so a foreign key to a table created in
/// the same batch is only `LOW` risk.
pub async fn plan_tables<R: Reflector>(
    reflection: &mut Reflection<R>,
    targets: &[Table],
) -> Result<MigrationPlan> {
    for target in targets {
        target.validate()?;
    }

    let new_tables: HashSet<&str> = targets
        .iter()
        .filter(|t| !reflection.is_table_exists(&t.name))
        .map(|t| t.name.as_str())
        .collect();
    for target in targets {
        if new_tables.contains(target.name.as_str()) {
            reflection.add_table(&target.name, target.is_logged);
        }
    }

    let mut planner = Planner::new(reflection);
    for target in targets {
        if new_tables.contains(target.name.as_str()) {
            planner.create_table(target)?;
        } else {
            planner.alter_table(target).await?;
        }
    }
    Ok(planner.into_plan())
}

fn alter(table: &str, actions: impl IntoIterator<Item = AlterAction>) -> Statement {
    AlterTable {
        table: table.to_string(),
        actions: actions.into_iter().collect(),
    }
    .into()
}

fn add_constraint(name: &str, constraint: TableConstraint) -> AlterAction {
    AlterAction::AddConstraint {
        name: Some(name.to_string()),
        constraint,
    }
}

fn alter_column(column: &str, change: ColumnChange) -> AlterAction {
    AlterAction::AlterColumn {
        column: column.to_string(),
        change,
    }
}

/// Render a default value as a SQL expression for `column_type`.
pub fn default_literal(column_type: &ColumnType, value: &Value) -> String {
    let is_json = column_type.pg_type().is_some_and(|t| t.is_json());
    match value {
        Value::Null => "NULL".to_string(),
        _ if is_json => escape_string(&value.to_string()),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => escape_string(s),
        Value::Array(_) | Value::Object(_) => escape_string(&value.to_string()),
    }
}

/// `ADD COLUMN` definition for a column. `inline_primary` adds `PRIMARY KEY`.
pub fn column_def(name: &str, column: &Column, inline_primary: bool) -> ColumnDef {
    ColumnDef {
        name: name.to_string(),
        data_type: column.column_type.native_type(),
        not_null: !column.is_nullable,
        unique: column.is_unique,
        primary_key: inline_primary,
        default: column
            .default_value
            .as_ref()
            .map(|v| default_literal(&column.column_type, v)),
    }
}

/// Statements that go with a new column: its single-column index and its
/// metadata comment.
fn column_extras(table: &str, name: &str, column: &Column) -> Vec<Statement> {
    let mut statements = Vec::new();
    if let Some(kind) = column.is_indexed {
        statements.push(
            CreateIndex {
                name: index_name(table, &[name]),
                table: table.to_string(),
                method: kind.method(),
                columns: vec![name.to_string()],
            }
            .into(),
        );
    }
    if let Some(text) = ColumnMeta::for_column(column).encode() {
        statements.push(
            Comment {
                target: CommentTarget::Column {
                    table: table.to_string(),
                    column: name.to_string(),
                },
                text: Some(text),
            }
            .into(),
        );
    }
    statements
}

/// Accumulates steps for a batch of tables.
pub struct Planner<'r, R> {
    reflection: &'r mut Reflection<R>,
    plan: MigrationPlan,
}

impl<'r, R: Reflector> Planner<'r, R> {
    pub fn new(reflection: &'r mut Reflection<R>) -> Self {
        Self {
            reflection,
            plan: MigrationPlan::new(),
        }
    }

    /// The accumulated plan, sorted by phase.
    pub fn into_plan(self) -> MigrationPlan {
        let mut plan = self.plan;
        plan.sort();
        plan
    }

    fn step(
        &mut self,
        phase: u8,
        risk: Risk,
        description: String,
        statements: impl IntoIterator<Item = Statement>,
    ) {
        self.plan.push(Step::new(
            phase,
            risk,
            description,
            statements.into_iter().collect(),
        ));
    }

    /// Create the native enum types `target` uses that don't exist yet.
    fn ensure_enum_types(&mut self, target: &Table) {
        for column in target.columns.values() {
            let ColumnType::Enum {
                native_name,
                values,
            } = &column.column_type
            else {
                continue;
            };
            if self.reflection.is_type_exists(native_name) {
                continue;
            }
            self.step(
                PHASE_CREATE,
                Risk::None,
                format!("create type {}", native_name),
                [CreateType {
                    name: native_name.clone(),
                    variants: values.clone(),
                }
                .into()],
            );
            self.reflection.add_type(native_name);
        }
    }

    /// Plan a table that doesn't exist yet.
    pub fn create_table(&mut self, target: &Table) -> Result<()> {
        let table = target.name.as_str();
        tracing::debug!(table, "planning new table");

        self.ensure_enum_types(target);

        let mut statements: Vec<Statement> = vec![
            CreateTable {
                name: table.to_string(),
            }
            .into(),
        ];
        if let Some(text) = TableMeta::for_table(target).encode() {
            statements.push(
                Comment {
                    target: CommentTarget::Table(table.to_string()),
                    text: Some(text),
                }
                .into(),
            );
        }
        self.step(
            PHASE_CREATE,
            Risk::None,
            format!("create table {}", table),
            statements,
        );
        if !target.is_logged {
            self.step(
                PHASE_CREATE,
                Risk::None,
                format!("set {} unlogged", table),
                [alter(table, [AlterAction::SetLogged(false)])],
            );
        }
        self.reflection.add_table(table, target.is_logged);

        let primary_key = target.primary_key();
        if !target.columns.is_empty() {
            let inline_primary = primary_key.len() == 1;
            let mut actions: Vec<AlterAction> = target
                .columns
                .iter()
                .map(|(name, column)| {
                    AlterAction::AddColumn(column_def(
                        name,
                        column,
                        inline_primary && column.is_primary,
                    ))
                })
                .collect();
            if primary_key.len() > 1 {
                actions.push(add_constraint(
                    &primary_key_name(table),
                    TableConstraint::PrimaryKey(
                        primary_key.iter().map(|c| c.to_string()).collect(),
                    ),
                ));
            }

            let mut statements = vec![alter(table, actions)];
            for (name, column) in &target.columns {
                statements.extend(column_extras(table, name, column));
                if column.is_unique {
                    self.reflection.add_unique(&unique_key_name(table, name));
                }
            }
            self.step(
                PHASE_COLUMNS,
                Risk::None,
                format!("add columns to {}", table),
                statements,
            );
        }

        for (name, index) in &target.indexes {
            self.step(
                PHASE_COMPOSITES,
                Risk::Low,
                format!("create index {} on {}", name, table),
                [CreateIndex {
                    name: name.clone(),
                    table: table.to_string(),
                    method: index.kind.method(),
                    columns: index.columns.clone(),
                }
                .into()],
            );
        }

        for (name, unique) in &target.uniques {
            if self.reflection.is_unique_constraint_exists(name) {
                return Err(Error::DuplicateUnique {
                    table: table.to_string(),
                    name: name.clone(),
                });
            }
            self.step(
                PHASE_COMPOSITES,
                Risk::None,
                format!("add unique {} on {}", name, table),
                [alter(
                    table,
                    [add_constraint(
                        name,
                        TableConstraint::Unique(unique.columns.clone()),
                    )],
                )],
            );
            self.reflection.add_unique(name);
        }

        for (name, relation) in &target.relations {
            self.add_relation(table, name, relation);
        }

        Ok(())
    }

    /// Add a foreign key, `HIGH` risk when the referenced table is unknown.
    fn add_relation(&mut self, table: &str, name: &str, relation: &Relation) {
        let ref_table = relation.references.table.as_str();
        let risk = if self.reflection.is_table_exists(ref_table) {
            Risk::Low
        } else {
            Risk::High
        };
        self.step(
            PHASE_RELATIONS,
            risk,
            format!("add foreign key {} on {} -> {}", name, table, ref_table),
            [alter(
                table,
                [add_constraint(
                    name,
                    TableConstraint::ForeignKey {
                        columns: relation.columns.clone(),
                        ref_table: ref_table.to_string(),
                        ref_columns: relation.references.columns.clone(),
                        on_delete: relation.on_delete.to_sql(),
                        on_update: relation.on_update.to_sql(),
                    },
                )],
            )],
        );
        if let Some(text) = RelationMeta::for_relation(relation).encode() {
            self.step(
                PHASE_RELATION_COMMENTS,
                Risk::None,
                format!("comment on foreign key {}", name),
                [Comment {
                    target: CommentTarget::Constraint {
                        table: table.to_string(),
                        name: name.to_string(),
                    },
                    text: Some(text),
                }
                .into()],
            );
        }
        self.reflection.add_foreign_key(table, name, relation);
    }

    fn drop_constraint(&mut self, phase: u8, table: &str, name: &str, what: &str) {
        self.step(
            phase,
            Risk::Low,
            format!("drop {} {} on {}", what, name, table),
            [alter(table, [AlterAction::DropConstraint(name.to_string())])],
        );
    }

    /// Plan changes to a table that exists.
    pub async fn alter_table(&mut self, target: &Table) -> Result<()> {
        let table = target.name.as_str();
        let current = self
            .reflection
            .table_state(table)?
            .ok_or_else(|| Error::ModelNotFound(table.to_string()))?;

        let changes = diff(&current, target);
        if changes.is_empty() {
            tracing::debug!(table, "table is up to date");
            return Ok(());
        }
        tracing::debug!(table, "planning changes:\n{}", changes);

        self.ensure_enum_types(target);

        if let Some(logged) = changes.is_logged {
            let what = if logged { "logged" } else { "unlogged" };
            self.step(
                PHASE_COLUMNS,
                Risk::Low,
                format!("set {} {}", table, what),
                [alter(table, [AlterAction::SetLogged(logged)])],
            );
        }

        let target_pk = target.primary_key();
        let mut primary_changed = false;
        let mut removed_primary: Vec<&str> = Vec::new();
        let mut added_primary: Vec<&str> = Vec::new();

        for change in &changes.columns {
            match change {
                ColumnDiff::Removed { name, column } => {
                    self.step(
                        PHASE_ALTER,
                        Risk::Low,
                        format!("drop column {}.{}", table, name),
                        [alter(table, [AlterAction::DropColumn(name.clone())])],
                    );
                    if column.is_primary {
                        primary_changed = true;
                        removed_primary.push(name);
                    }
                }
                ColumnDiff::Added { name, column } => {
                    let risk = if column.default_value.is_none()
                        && self.reflection.has_rows(table).await?
                    {
                        Risk::Impossible
                    } else {
                        Risk::None
                    };
                    let inline_primary = target_pk.as_slice() == [name.as_str()];
                    let mut statements = vec![alter(
                        table,
                        [AlterAction::AddColumn(column_def(
                            name,
                            column,
                            inline_primary,
                        ))],
                    )];
                    statements.extend(column_extras(table, name, column));
                    self.step(
                        PHASE_ALTER,
                        risk,
                        format!("add column {}.{}", table, name),
                        statements,
                    );
                    if column.is_unique {
                        self.reflection.add_unique(&unique_key_name(table, name));
                    }
                    if column.is_primary {
                        primary_changed = true;
                        added_primary.push(name);
                    }
                }
                ColumnDiff::Altered { name, changes } => {
                    for field in changes {
                        primary_changed |= self.alter_field(&current, target, name, field)?;
                    }
                }
            }
        }

        for change in &changes.uniques {
            match change {
                EntryChange::Removed { name, .. } => {
                    self.drop_constraint(PHASE_COMPOSITES, table, name, "unique")
                }
                EntryChange::Added { name, to } => self.add_unique(table, name, &to.columns)?,
                EntryChange::Replaced { name, to, .. } => {
                    self.drop_constraint(PHASE_COMPOSITES, table, name, "unique");
                    self.step(
                        PHASE_CONSTRAINTS,
                        Risk::Low,
                        format!("add unique {} on {}", name, table),
                        [alter(
                            table,
                            [add_constraint(
                                name,
                                TableConstraint::Unique(to.columns.clone()),
                            )],
                        )],
                    );
                }
            }
        }

        for change in &changes.indexes {
            if let EntryChange::Removed { name, .. } | EntryChange::Replaced { name, .. } = change {
                self.step(
                    PHASE_COMPOSITES,
                    Risk::Low,
                    format!("drop index {}", name),
                    [DropIndex { name: name.clone() }.into()],
                );
            }
            if let EntryChange::Added { name, to } | EntryChange::Replaced { name, to, .. } = change
            {
                self.step(
                    PHASE_CONSTRAINTS,
                    Risk::Low,
                    format!("create index {} on {}", name, table),
                    [CreateIndex {
                        name: name.clone(),
                        table: table.to_string(),
                        method: to.kind.method(),
                        columns: to.columns.clone(),
                    }
                    .into()],
                );
            }
        }

        for change in &changes.relations {
            if let EntryChange::Removed { name, .. } | EntryChange::Replaced { name, .. } = change {
                self.drop_constraint(PHASE_COLUMNS, table, name, "foreign key");
            }
            if let EntryChange::Added { name, to } | EntryChange::Replaced { name, to, .. } = change
            {
                self.add_relation(table, name, to);
            }
        }

        if primary_changed {
            let current_pk = current.primary_key();

            // dropping the only primary column drops its constraint too
            let dropped_with_column = matches!(current_pk.as_slice(), [c] if removed_primary.contains(c));
            if !current_pk.is_empty() && !dropped_with_column {
                let name = self
                    .reflection
                    .facts()
                    .primary_key_name(table)
                    .map(str::to_string)
                    .unwrap_or_else(|| primary_key_name(table));
                self.drop_constraint(PHASE_COMPOSITES, table, &name, "primary key");
            }

            // a single new primary column got an inline PRIMARY KEY
            let added_with_column = matches!(target_pk.as_slice(), [c] if added_primary.contains(c));
            if !target_pk.is_empty() && !added_with_column {
                self.step(
                    PHASE_CONSTRAINTS,
                    Risk::Low,
                    format!("add primary key on {} ({})", table, target_pk.join(", ")),
                    [alter(
                        table,
                        [add_constraint(
                            &primary_key_name(table),
                            TableConstraint::PrimaryKey(
                                target_pk.iter().map(|c| c.to_string()).collect(),
                            ),
                        )],
                    )],
                );
            }
        }

        Ok(())
    }

    /// Add a composite unique to an existing table.
    fn add_unique(&mut self, table: &str, name: &str, columns: &[String]) -> Result<()> {
        if self.reflection.is_unique_constraint_exists(name) {
            return Err(Error::DuplicateUnique {
                table: table.to_string(),
                name: name.to_string(),
            });
        }
        self.step(
            PHASE_CONSTRAINTS,
            Risk::Low,
            format!("add unique {} on {}", name, table),
            [alter(
                table,
                [add_constraint(name, TableConstraint::Unique(columns.to_vec()))],
            )],
        );
        self.reflection.add_unique(name);
        Ok(())
    }

    /// Plan one changed field of an existing column. Returns whether the
    /// primary key needs recomputing.
    fn alter_field(
        &mut self,
        current: &Table,
        target: &Table,
        column: &str,
        field: &FieldChange,
    ) -> Result<bool> {
        let table = target.name.as_str();
        let not_implemented = || Error::NotImplemented {
            table: table.to_string(),
            column: column.to_string(),
            field: field.field(),
        };

        match field {
            FieldChange::Type { .. } | FieldChange::Indexed { .. } => Err(not_implemented()),
            FieldChange::Primary { .. } => Ok(true),
            FieldChange::Nullable { to, .. } => {
                let (change, what) = if *to {
                    (ColumnChange::DropNotNull, "nullable")
                } else {
                    (ColumnChange::SetNotNull, "not null")
                };
                self.step(
                    PHASE_ALTER,
                    Risk::Low,
                    format!("make {}.{} {}", table, column, what),
                    [alter(table, [alter_column(column, change)])],
                );
                Ok(false)
            }
            FieldChange::Unique { to: true, .. } => {
                let name = unique_key_name(table, column);
                self.step(
                    PHASE_ALTER,
                    Risk::Low,
                    format!("add unique {} on {}", name, table),
                    [alter(
                        table,
                        [add_constraint(
                            &name,
                            TableConstraint::Unique(vec![column.to_string()]),
                        )],
                    )],
                );
                self.reflection.add_unique(&name);
                Ok(false)
            }
            FieldChange::Unique { to: false, .. } => {
                let name = self
                    .reflection
                    .facts()
                    .unique_key_name(table, column)
                    .map(str::to_string)
                    .unwrap_or_else(|| unique_key_name(table, column));
                self.drop_constraint(PHASE_ALTER, table, &name, "unique");
                Ok(false)
            }
            FieldChange::Default { to, .. } => {
                let column_type = &target
                    .columns
                    .get(column)
                    .ok_or_else(not_implemented)?
                    .column_type;
                let change = match to {
                    Some(value) => ColumnChange::SetDefault(default_literal(column_type, value)),
                    None => ColumnChange::DropDefault,
                };
                self.step(
                    PHASE_ALTER,
                    Risk::Low,
                    format!("change default of {}.{}", table, column),
                    [alter(table, [alter_column(column, change)])],
                );
                Ok(false)
            }
            FieldChange::Capability { .. } => {
                let target_column = target.columns.get(column).ok_or_else(not_implemented)?;
                let mut meta = ColumnMeta::for_column(target_column);
                // transformer bits belong to the ORM layer, keep what the catalog has
                if target_column.transformers.is_none() {
                    meta.transformers = current
                        .columns
                        .get(column)
                        .and_then(|c| c.transformers)
                        .unwrap_or(0);
                }
                let text = meta.encode();
                self.step(
                    PHASE_ALTER,
                    Risk::None,
                    format!("change capability of {}.{}", table, column),
                    [Comment {
                        target: CommentTarget::Column {
                            table: table.to_string(),
                            column: column.to_string(),
                        },
                        text,
                    }
                    .into()],
                );
                Ok(false)
            }
        }
    }
}
