//! Declarative schema reconciliation for Postgres.
//!
//! Describe each table as a [`Table`] and let blueprint work out the DDL:
//!
//! - [`Reflection`] reads the live catalog into the same descriptors
//! - [`diff()`] compares a current descriptor with a target one
//! - the planner turns the differences into a [`MigrationPlan`] of phased,
//!   risk-rated steps
//! - [`MigrationPlan::execute`] runs it, refusing plans with an impossible step
//!
//! [`Reconciler`] wraps all of this behind `read_state`, `compare_state`,
//! `set_state` and `drop_table`.
//!
//! # Naming Convention
//!
//! Constraint and index names follow Postgres' own defaults where they exist
//! (`{table}_pkey`, `{table}_{column}_key`) and `idx_{table}_{columns}` for
//! indexes. Names longer than 63 bytes get a stable hash suffix.

pub mod diff;
mod error;
pub mod introspect;
pub mod meta;
pub mod plan;
pub mod planner;
pub mod reflection;
pub mod service;
mod traced;

#[cfg(test)]
pub(crate) mod testing;

pub use blueprint_schema::{
    Capability, Column, ColumnType, CompositeIndex, CompositeUnique, IndexKind, PgType, Reference,
    ReferentialAction, Relation, Table, ValidationError, ValidationErrorKind,
};
pub use diff::{ColumnDiff, EntryChange, FieldChange, TableDiff, diff};
pub use error::Error;
pub use introspect::{PgReflector, Reflector};
pub use plan::{MigrationPlan, Risk, Step, StepResult};
pub use planner::{Planner, plan_tables};
pub use reflection::{Facts, RawFacts, Reflection};
pub use service::{Reconciler, check_provider, connect};
pub use traced::{Connection, ConnectionExt, TracedConn};

/// Result type for blueprint operations.
pub type Result<T> = std::result::Result<T, Error>;
