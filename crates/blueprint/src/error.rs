use blueprint_schema::ValidationError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("postgres error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    #[error(transparent)]
    InvalidTable(#[from] ValidationError),

    #[error("plan contains impossible steps, nothing was executed: {}", .steps.join("; "))]
    ImpossibleMigration { steps: Vec<String> },

    #[error("changing `{field}` of column `{table}.{column}` is not implemented")]
    NotImplemented {
        table: String,
        column: String,
        field: &'static str,
    },

    #[error("column `{table}.{column}` has unsupported type `{type_name}`")]
    UnsupportedType {
        table: String,
        column: String,
        type_name: String,
    },

    #[error("unique constraint `{name}` on `{table}` is already declared")]
    DuplicateUnique { table: String, name: String },

    #[error("invalid metadata comment: {0}")]
    Metadata(String),

    #[error("invalid table filter: {0}")]
    InvalidFilter(#[from] regex::Error),

    #[error("table `{0}` not found")]
    ModelNotFound(String),

    #[error("unsupported provider `{0}`, only postgres is supported")]
    UnsupportedProvider(String),
}
