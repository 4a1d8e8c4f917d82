//! In-memory stand-ins for the catalog and the connection.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio_postgres::Row;
use tokio_postgres::types::ToSql;

use crate::introspect::{
    RawColumn, RawConstraint, RawEnumColumn, RawForeignKey, RawIndex, RawTable, Reflector,
    TypeModifiers,
};
use crate::reflection::RawFacts;
use crate::{Connection, Reflection, Result};

/// A reflector that answers from a fixed set of facts.
#[derive(Debug, Clone, Default)]
pub struct StaticReflector {
    pub facts: RawFacts,
    /// Tables holding at least one row.
    pub rows: HashMap<String, bool>,
}

impl StaticReflector {
    pub fn table(mut self, name: &str) -> Self {
        self.facts.tables.push(RawTable {
            name: name.to_string(),
            is_logged: true,
            comment: None,
        });
        self
    }

    pub fn column(mut self, table: &str, name: &str, type_name: &str, nullable: bool) -> Self {
        self.facts.columns.push(RawColumn {
            table: table.to_string(),
            name: name.to_string(),
            type_name: type_name.to_string(),
            is_nullable: nullable,
            default_value: None,
            modifiers: TypeModifiers::default(),
            comment: None,
        });
        self
    }

    /// Set the decoded default of the last added column.
    pub fn default_value(mut self, value: serde_json::Value) -> Self {
        if let Some(column) = self.facts.columns.last_mut() {
            column.default_value = Some(value);
        }
        self
    }

    /// Set the type modifiers of the last added column.
    pub fn modifiers(mut self, modifiers: TypeModifiers) -> Self {
        if let Some(column) = self.facts.columns.last_mut() {
            column.modifiers = modifiers;
        }
        self
    }

    /// Set the comment of the last added column.
    pub fn comment(mut self, comment: &str) -> Self {
        if let Some(column) = self.facts.columns.last_mut() {
            column.comment = Some(comment.to_string());
        }
        self
    }

    pub fn primary_key(mut self, table: &str, columns: &[&str]) -> Self {
        self.facts.primary_keys.push(RawConstraint {
            table: table.to_string(),
            name: format!("{}_pkey", table),
            columns: columns.iter().map(|c| c.to_string()).collect(),
        });
        self
    }

    pub fn unique(mut self, table: &str, name: &str, columns: &[&str]) -> Self {
        self.facts.unique_names.push(name.to_string());
        self.facts.uniques.push(RawConstraint {
            table: table.to_string(),
            name: name.to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
        });
        self
    }

    pub fn index(mut self, index: RawIndex) -> Self {
        self.facts.indexes.push(index);
        self
    }

    pub fn enumeration(mut self, column: RawEnumColumn) -> Self {
        if !self.facts.types.contains(&column.type_name) {
            self.facts.types.push(column.type_name.clone());
        }
        self.facts.enumerators.push(column);
        self
    }

    pub fn foreign_key(mut self, fk: RawForeignKey) -> Self {
        self.facts.foreign_keys.push(fk);
        self
    }

    pub fn with_rows(mut self, table: &str) -> Self {
        self.rows.insert(table.to_string(), true);
        self
    }

    /// A refreshed batch context over these facts.
    pub async fn reflect(self) -> Reflection<StaticReflector> {
        let mut reflection = Reflection::new(self);
        reflection
            .update_facts()
            .await
            .expect("static facts never fail");
        reflection
    }
}

impl Reflector for StaticReflector {
    async fn tables(&self) -> Result<Vec<RawTable>> {
        Ok(self.facts.tables.clone())
    }

    async fn types(&self) -> Result<Vec<String>> {
        Ok(self.facts.types.clone())
    }

    async fn enumerators(&self) -> Result<Vec<RawEnumColumn>> {
        Ok(self.facts.enumerators.clone())
    }

    async fn foreign_keys(&self) -> Result<Vec<RawForeignKey>> {
        Ok(self.facts.foreign_keys.clone())
    }

    async fn unique_names(&self) -> Result<Vec<String>> {
        Ok(self.facts.unique_names.clone())
    }

    async fn uniques(&self) -> Result<Vec<RawConstraint>> {
        Ok(self.facts.uniques.clone())
    }

    async fn primary_keys(&self) -> Result<Vec<RawConstraint>> {
        Ok(self.facts.primary_keys.clone())
    }

    async fn indexes(&self) -> Result<Vec<RawIndex>> {
        Ok(self.facts.indexes.clone())
    }

    async fn columns(&self) -> Result<Vec<RawColumn>> {
        Ok(self.facts.columns.clone())
    }

    async fn has_rows(&self, table: &str) -> Result<bool> {
        Ok(self.rows.get(table).copied().unwrap_or(false))
    }
}

/// A connection that records batches and returns no rows.
#[derive(Default)]
pub struct RecordingConn {
    executed: Mutex<Vec<String>>,
}

impl RecordingConn {
    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }
}

impl Connection for RecordingConn {
    fn query<'a>(
        &'a self,
        _sql: &'a str,
        _params: &'a [&'a (dyn ToSql + Sync)],
    ) -> crate::traced::BoxFuture<'a, Vec<Row>> {
        Box::pin(async { Ok(Vec::new()) })
    }

    fn query_opt<'a>(
        &'a self,
        _sql: &'a str,
        _params: &'a [&'a (dyn ToSql + Sync)],
    ) -> crate::traced::BoxFuture<'a, Option<Row>> {
        Box::pin(async { Ok(None) })
    }

    fn batch_execute<'a>(&'a self, sql: &'a str) -> crate::traced::BoxFuture<'a, ()> {
        self.executed.lock().unwrap().push(sql.to_string());
        Box::pin(async { Ok(()) })
    }
}
