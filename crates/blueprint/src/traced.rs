//! Traced database connection wrapper.
//!
//! Every catalog query and DDL batch goes through [`Connection`], and
//! [`TracedConn`] logs each call via tracing.

use std::future::Future;
use std::pin::Pin;

use tokio_postgres::types::ToSql;
use tokio_postgres::{Error, Row};
use tracing::Instrument;

pub(crate) type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, Error>> + Send + 'a>>;

/// A wrapper around a database connection that logs all queries via tracing.
///
/// This is a thin wrapper that delegates to the underlying connection but adds
/// `tracing::debug_span!` around each call.
///
/// # Example
///
/// ```ignore
/// use blueprint::ConnectionExt;
///
/// let traced = client.traced();
/// let rows = traced.query("SELECT relname FROM pg_class", &[]).await?;
/// traced.batch_execute("CREATE TABLE \"t\" ()").await?;
/// ```
pub struct TracedConn<'a, C: Connection> {
    conn: &'a C,
}

impl<'a, C: Connection> TracedConn<'a, C> {
    /// Create a new traced connection wrapper.
    pub fn new(conn: &'a C) -> Self {
        Self { conn }
    }

    /// Execute a query, returning all rows.
    pub async fn query(
        &self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<Vec<Row>, Error> {
        let span = tracing::debug_span!(
            "db.query",
            sql = %sql,
            params = params.len(),
            rows = tracing::field::Empty,
        );
        let rows = self
            .conn
            .query(sql, params)
            .instrument(span.clone())
            .await?;
        span.record("rows", rows.len());
        Ok(rows)
    }

    /// Execute a query, returning at most one row.
    pub async fn query_opt(
        &self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<Option<Row>, Error> {
        let span = tracing::debug_span!(
            "db.query",
            sql = %sql,
            params = params.len(),
            rows = tracing::field::Empty,
        );
        let row = self
            .conn
            .query_opt(sql, params)
            .instrument(span.clone())
            .await?;
        span.record("rows", if row.is_some() { 1u64 } else { 0u64 });
        Ok(row)
    }

    /// Run one or more `;`-separated statements without parameters.
    pub async fn batch_execute(&self, sql: &str) -> Result<(), Error> {
        let span = tracing::debug_span!("db.batch", sql = %sql);
        self.conn.batch_execute(sql).instrument(span).await
    }
}

/// Extension trait to get a traced wrapper from a connection.
pub trait ConnectionExt: Connection + Sized {
    /// Wrap this connection in a `TracedConn` for query logging.
    fn traced(&self) -> TracedConn<'_, Self> {
        TracedConn::new(self)
    }
}

impl<C: Connection> ConnectionExt for C {}

/// Trait for database connections the reconciler can talk through.
///
/// This is implemented for `tokio_postgres::Client` and `deadpool_postgres::Object`.
pub trait Connection: Send + Sync {
    /// Execute a query, returning all rows.
    fn query<'a>(
        &'a self,
        sql: &'a str,
        params: &'a [&'a (dyn ToSql + Sync)],
    ) -> BoxFuture<'a, Vec<Row>>;

    /// Execute a query, returning at most one row.
    fn query_opt<'a>(
        &'a self,
        sql: &'a str,
        params: &'a [&'a (dyn ToSql + Sync)],
    ) -> BoxFuture<'a, Option<Row>>;

    /// Run `;`-separated statements using the simple query protocol.
    fn batch_execute<'a>(&'a self, sql: &'a str) -> BoxFuture<'a, ()>;
}

impl Connection for tokio_postgres::Client {
    fn query<'a>(
        &'a self,
        sql: &'a str,
        params: &'a [&'a (dyn ToSql + Sync)],
    ) -> BoxFuture<'a, Vec<Row>> {
        Box::pin(tokio_postgres::Client::query(self, sql, params))
    }

    fn query_opt<'a>(
        &'a self,
        sql: &'a str,
        params: &'a [&'a (dyn ToSql + Sync)],
    ) -> BoxFuture<'a, Option<Row>> {
        Box::pin(tokio_postgres::Client::query_opt(self, sql, params))
    }

    fn batch_execute<'a>(&'a self, sql: &'a str) -> BoxFuture<'a, ()> {
        Box::pin(tokio_postgres::Client::batch_execute(self, sql))
    }
}

impl Connection for deadpool_postgres::Object {
    fn query<'a>(
        &'a self,
        sql: &'a str,
        params: &'a [&'a (dyn ToSql + Sync)],
    ) -> BoxFuture<'a, Vec<Row>> {
        // Deref to the underlying Client to avoid recursion
        use std::ops::Deref;
        let client: &tokio_postgres::Client = self.deref();
        Box::pin(client.query(sql, params))
    }

    fn query_opt<'a>(
        &'a self,
        sql: &'a str,
        params: &'a [&'a (dyn ToSql + Sync)],
    ) -> BoxFuture<'a, Option<Row>> {
        use std::ops::Deref;
        let client: &tokio_postgres::Client = self.deref();
        Box::pin(client.query_opt(sql, params))
    }

    fn batch_execute<'a>(&'a self, sql: &'a str) -> BoxFuture<'a, ()> {
        use std::ops::Deref;
        let client: &tokio_postgres::Client = self.deref();
        Box::pin(client.batch_execute(sql))
    }
}
