//! Integration tests against real PostgreSQL.
//!
//! These tests verify that:
//! 1. Tables written by a plan read back as the descriptors that produced them
//! 2. Re-planning a reconciled database yields no steps
//! 3. Risky plans are refused before any DDL runs
//!
//! Run with: cargo nextest run -p blueprint --test reconcile --run-ignored all
//!
//! Note: Requires Docker to be running.

use std::time::Duration;

use blueprint::{
    Capability, Column, ColumnType, Error, IndexKind, PgType, Reconciler, ReferentialAction,
    Relation, Risk, Table,
};
use serde_json::{Value, json};
use testcontainers_modules::postgres::Postgres;
use testcontainers::ContainerAsync;
use testcontainers::runners::AsyncRunner;
use tokio_postgres::{Client, NoTls};

/// Start a PostgreSQL container and return a reconciler connected to it.
async fn setup_postgres() -> (ContainerAsync<Postgres>, Reconciler<Client>) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("blueprint=debug")
        .with_test_writer()
        .try_init();

    let container = Postgres::default()
        .start()
        .await
        .expect("failed to start postgres container");
    let host = container.get_host().await.expect("container host");
    let port = container
        .get_host_port_ipv4(5432)
        .await
        .expect("postgres port not available");

    let conn_str = format!(
        "host={} port={} user=postgres password=postgres dbname=postgres",
        host, port
    );

    // Postgres may not accept connections right after the port opens
    let mut attempts = 0;
    let max_attempts = 10;
    let (client, connection) = loop {
        attempts += 1;
        match tokio_postgres::connect(&conn_str, NoTls).await {
            Ok(result) => break result,
            Err(e) if attempts < max_attempts => {
                tracing::debug!("Connection attempt {} failed: {}, retrying...", attempts, e);
                tokio::time::sleep(Duration::from_millis(500)).await;
            }
            Err(e) => panic!(
                "failed to connect to postgres after {} attempts: {}",
                attempts, e
            ),
        }
    };

    tokio::spawn(async move {
        if let Err(e) = connection.await {
            eprintln!("connection error: {}", e);
        }
    });

    (container, Reconciler::new(client))
}

fn int() -> Column {
    Column::new(ColumnType::basic(PgType::Integer))
}

fn nullable(ty: ColumnType) -> Column {
    Column::new(ty).nullable().default_value(Value::Null)
}

fn pk_of(table: &Table) -> Vec<String> {
    table.primary_key().into_iter().map(String::from).collect()
}

fn everything() -> Table {
    Table::new("everything")
        .column("id", Column::serial())
        .column(
            "email",
            Column::new(ColumnType::varchar(120)).unique().alias("eMail"),
        )
        .column(
            "code",
            Column::new(ColumnType::VariableLength {
                name: PgType::Char,
                length: 3,
            })
            .default_value("abc"),
        )
        .column("count", int().default_value(7))
        .column("big", Column::new(ColumnType::basic(PgType::BigInt)).default_value(-12))
        .column("ratio", Column::new(ColumnType::basic(PgType::DoublePrecision)).default_value(0.25))
        .column("price", Column::new(ColumnType::numeric(10, 2)).default_value(2.5))
        .column("active", Column::new(ColumnType::basic(PgType::Boolean)).default_value(true))
        .column("title", Column::new(ColumnType::basic(PgType::Text)).default_value("it's"))
        .column("tag", nullable(ColumnType::basic(PgType::Text)).indexed(IndexKind::Hash))
        .column("doc", Column::new(ColumnType::basic(PgType::Jsonb)).default_value(json!({"a": [1, 2]})))
        .column("mood", Column::new(ColumnType::enumeration("mood", ["happy", "sad"])).default_value("happy"))
        .column("external_id", nullable(ColumnType::basic(PgType::Uuid)))
        .column("born_on", nullable(ColumnType::basic(PgType::Date)))
        .column(
            "updated_at",
            nullable(ColumnType::basic(PgType::Timestamptz)).capability(Capability::UpdatedAt),
        )
        .unique("uq_everything_code_count", ["code", "count"])
        .index("idx_everything_mood_tag", IndexKind::Btree, ["mood", "tag"])
        .meta(json!({"owner": "tests"}))
}

fn child() -> Table {
    Table::new("child")
        .column("id", Column::serial())
        .column("parent_id", int())
        .relation(
            "child_parent_fk",
            Relation::new(["parent_id"], "everything", ["id"])
                .on_delete(ReferentialAction::Cascade)
                .alias("parent"),
        )
}

#[tokio::test]
#[ignore = "requires a Docker daemon"]
async fn test_round_trip_and_idempotence() {
    let (_container, reconciler) = setup_postgres().await;
    let targets = [child(), everything()];

    let plan = reconciler.compare_state(&targets).await.unwrap();
    assert_eq!(plan.highest_risk(), Some(Risk::Low));
    reconciler.set_state(&targets).await.unwrap();

    assert_eq!(reconciler.read_table("everything").await.unwrap(), everything());
    assert_eq!(reconciler.read_table("child").await.unwrap(), child());

    let plan = reconciler.compare_state(&targets).await.unwrap();
    assert!(plan.is_empty(), "unexpected steps:\n{plan}");

    let all = reconciler.read_state(&["^child$"]).await.unwrap();
    assert_eq!(all, [child()]);
}

#[tokio::test]
#[ignore = "requires a Docker daemon"]
async fn test_example_scenario() {
    let (_container, reconciler) = setup_postgres().await;
    let t = Table::new("t")
        .column("id", Column::serial())
        .column("name", nullable(ColumnType::basic(PgType::Text)));

    let plan = reconciler.compare_state(std::slice::from_ref(&t)).await.unwrap();
    assert_eq!(plan.len(), 2);
    assert!(plan.steps().iter().all(|s| s.risk == Risk::None));
    assert_eq!(plan.steps()[0].phase, 0);
    assert_eq!(plan.steps()[1].phase, 1);

    let results = plan.execute(reconciler.connection()).await.unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[1].order, 1);

    let plan = reconciler.compare_state(&[t]).await.unwrap();
    assert!(plan.is_empty(), "unexpected steps:\n{plan}");
}

#[tokio::test]
#[ignore = "requires a Docker daemon"]
async fn test_impossible_add_runs_nothing() {
    let (_container, reconciler) = setup_postgres().await;
    let t = Table::new("t").column("id", Column::serial());
    reconciler.set_state(std::slice::from_ref(&t)).await.unwrap();

    use blueprint::ConnectionExt;
    let conn = reconciler.connection().traced();
    conn.batch_execute("INSERT INTO t DEFAULT VALUES").await.unwrap();

    let with_age = t.clone().column("age", int());
    let plan = reconciler.compare_state(std::slice::from_ref(&with_age)).await.unwrap();
    assert_eq!(plan.highest_risk(), Some(Risk::Impossible));

    let err = reconciler.set_state(std::slice::from_ref(&with_age)).await.unwrap_err();
    assert!(matches!(err, Error::ImpossibleMigration { .. }), "{err}");
    assert_eq!(reconciler.read_table("t").await.unwrap(), t);

    conn.batch_execute("DELETE FROM t").await.unwrap();
    reconciler.set_state(std::slice::from_ref(&with_age)).await.unwrap();
    assert_eq!(reconciler.read_table("t").await.unwrap(), with_age);
}

#[tokio::test]
#[ignore = "requires a Docker daemon"]
async fn test_primary_key_algebra() {
    let (_container, reconciler) = setup_postgres().await;

    let one = Table::new("pk").column("a", int().primary());
    let two = one.clone().column("b", int().primary());
    let three = two.clone().column("c", int().primary());

    for target in [&one, &two, &three, &one] {
        reconciler.set_state(std::slice::from_ref(target)).await.unwrap();
        let current = reconciler.read_table("pk").await.unwrap();
        assert_eq!(pk_of(&current), pk_of(target));
        assert_eq!(&current, target);
    }

    // the only primary column is swapped: no separate constraint steps
    let swapped = Table::new("pk").column("z", int().primary());
    let plan = reconciler.compare_state(std::slice::from_ref(&swapped)).await.unwrap();
    assert_eq!(plan.len(), 2, "{plan}");
    reconciler.set_state(&[swapped.clone()]).await.unwrap();
    assert_eq!(reconciler.read_table("pk").await.unwrap(), swapped);
}

#[tokio::test]
#[ignore = "requires a Docker daemon"]
async fn test_single_column_constraints_fold() {
    let (_container, reconciler) = setup_postgres().await;

    use blueprint::ConnectionExt;
    reconciler
        .connection()
        .traced()
        .batch_execute(
            "CREATE TABLE f (a integer NOT NULL, b integer NOT NULL, c text NOT NULL);
             ALTER TABLE f ADD CONSTRAINT f_only_a UNIQUE (a);
             ALTER TABLE f ADD CONSTRAINT f_b_a UNIQUE (b, a);
             CREATE INDEX f_c ON f (c);
             CREATE INDEX f_c_b ON f (c, b);",
        )
        .await
        .unwrap();

    let f = reconciler.read_table("f").await.unwrap();
    assert!(f.columns["a"].is_unique);
    assert_eq!(f.columns["c"].is_indexed, Some(IndexKind::Btree));
    assert_eq!(f.uniques.len(), 1);
    assert_eq!(f.uniques["f_b_a"].columns, ["b", "a"]);
    assert_eq!(f.indexes.len(), 1);
    assert_eq!(f.indexes["f_c_b"].columns, ["c", "b"]);
}

#[tokio::test]
#[ignore = "requires a Docker daemon"]
async fn test_drop_table() {
    let (_container, reconciler) = setup_postgres().await;
    let t = Table::new("gone").column("id", Column::serial());
    reconciler.set_state(&[t]).await.unwrap();

    reconciler.drop_table("gone").await.unwrap();
    let err = reconciler.read_table("gone").await.unwrap_err();
    assert!(matches!(err, Error::ModelNotFound(_)));
}
