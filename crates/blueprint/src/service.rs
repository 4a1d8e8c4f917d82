//! The public reconciliation operations.
//!
//! # Example
//!
//! ```ignore
//! let reconciler = blueprint::connect("postgres://localhost/app").await?;
//! let plan = reconciler.compare_state(&targets).await?;
//! println!("{plan}");
//! reconciler.set_state(&targets).await?;
//! ```

use blueprint_schema::Table;
use blueprint_sql::DropTable;

use crate::introspect::PgReflector;
use crate::plan::{MigrationPlan, StepResult};
use crate::planner::plan_tables;
use crate::reflection::Reflection;
use crate::{Connection, ConnectionExt, Error, Result};

/// Reads and reconciles the schema behind one connection.
pub struct Reconciler<C> {
    conn: C,
}

impl<C: Connection> Reconciler<C> {
    pub fn new(conn: C) -> Self {
        Self { conn }
    }

    pub fn connection(&self) -> &C {
        &self.conn
    }

    /// A freshly refreshed batch context.
    async fn reflect(&self) -> Result<Reflection<PgReflector<'_, C>>> {
        let mut reflection = Reflection::new(PgReflector::new(&self.conn));
        reflection.update_facts().await?;
        Ok(reflection)
    }

    /// Descriptors of every table whose name matches any of `filters`
    /// (regular expressions), or of all tables when `filters` is empty.
    pub async fn read_state(&self, filters: &[&str]) -> Result<Vec<Table>> {
        let reflection = self.reflect().await?;
        let mut tables = Vec::new();
        for name in reflection.tables(filters)? {
            if let Some(table) = reflection.table_state(&name)? {
                tables.push(table);
            }
        }
        Ok(tables)
    }

    /// Descriptor of a single table.
    pub async fn read_table(&self, name: &str) -> Result<Table> {
        self.reflect()
            .await?
            .table_state(name)?
            .ok_or_else(|| Error::ModelNotFound(name.to_string()))
    }

    /// The plan that would bring the database to `targets`.
    pub async fn compare_state(&self, targets: &[Table]) -> Result<MigrationPlan> {
        let mut reflection = self.reflect().await?;
        let plan = plan_tables(&mut reflection, targets).await?;
        tracing::info!(
            tables = targets.len(),
            steps = plan.len(),
            risk = %plan.highest_risk().unwrap_or_default(),
            "compared state"
        );
        Ok(plan)
    }

    /// Compare and execute in one go.
    pub async fn set_state(&self, targets: &[Table]) -> Result<Vec<StepResult>> {
        self.compare_state(targets).await?.execute(&self.conn).await
    }

    pub async fn drop_table(&self, name: &str) -> Result<()> {
        let sql = DropTable {
            name: name.to_string(),
        }
        .to_string();
        self.conn.traced().batch_execute(&sql).await?;
        tracing::info!(table = name, "dropped table");
        Ok(())
    }
}

/// Connect with a plain `tokio-postgres` client.
pub async fn connect(url: &str) -> Result<Reconciler<tokio_postgres::Client>> {
    let (client, connection) = tokio_postgres::connect(url, tokio_postgres::NoTls).await?;

    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::error!("database connection error: {}", e);
        }
    });

    Ok(Reconciler::new(client))
}

/// Only Postgres is supported.
pub fn check_provider(provider: &str) -> Result<()> {
    match provider {
        "postgres" | "postgresql" | "pg" => Ok(()),
        other => Err(Error::UnsupportedProvider(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingConn;

    #[test]
    fn test_check_provider() {
        assert!(check_provider("postgres").is_ok());
        let err = check_provider("mysql").unwrap_err();
        assert_eq!(
            err.to_string(),
            "unsupported provider `mysql`, only postgres is supported"
        );
    }

    #[tokio::test]
    async fn test_drop_table() {
        let reconciler = Reconciler::new(RecordingConn::default());
        reconciler.drop_table("user").await.unwrap();
        assert_eq!(reconciler.connection().executed(), [r#"DROP TABLE "user""#]);
    }

    #[tokio::test]
    async fn test_read_state_of_empty_catalog() {
        let reconciler = Reconciler::new(RecordingConn::default());
        assert!(reconciler.read_state(&[]).await.unwrap().is_empty());
        let err = reconciler.read_table("ghost").await.unwrap_err();
        assert!(matches!(err, Error::ModelNotFound(name) if name == "ghost"));
    }
}
