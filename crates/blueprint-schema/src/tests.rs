use super::*;
use proptest::prelude::*;
use serde_json::json;

fn kind(table: &Table) -> ValidationErrorKind {
    table.validate().expect_err("table should be invalid").kind
}

fn users() -> Table {
    Table::new("user")
        .column("id", Column::serial())
        .column(
            "email",
            Column::new(ColumnType::varchar(255)).unique(),
        )
        .column(
            "nickname",
            Column::new(ColumnType::basic(PgType::Text))
                .nullable()
                .default_value(Value::Null),
        )
}

// ==================== validator ====================

#[test]
fn test_valid_table() {
    users().validate().unwrap();
}

#[test]
fn test_empty_name() {
    let table = Table::new("   ");
    assert_eq!(kind(&table), ValidationErrorKind::EmptyName);
}

#[test]
fn test_name_of_64_chars_fails() {
    let mut table = users();
    table.name = "a".repeat(64);
    assert_eq!(
        kind(&table),
        ValidationErrorKind::NameTooLong { length: 64 }
    );

    table.name = "a".repeat(63);
    table.validate().unwrap();
}

#[test]
fn test_name_with_space_fails() {
    let mut table = users();
    table.name = "user profile".into();
    assert_eq!(kind(&table), ValidationErrorKind::InvalidName);
}

#[test]
fn test_composite_checked_before_name() {
    // a bad composite is reported even though the name is also invalid
    let table = Table::new("bad name").unique("uq_one", ["id"]);
    assert!(matches!(
        kind(&table),
        ValidationErrorKind::TooFewColumns {
            constraint: "unique",
            count: 1,
            ..
        }
    ));
}

#[test]
fn test_composite_unknown_column() {
    let table = users().index("idx_user_x", IndexKind::Btree, ["email", "missing"]);
    assert_eq!(
        kind(&table),
        ValidationErrorKind::UnknownColumn {
            constraint: "index",
            name: "idx_user_x".into(),
            column: "missing".into(),
        }
    );
}

#[test]
fn test_nullable_needs_explicit_default() {
    let table = Table::new("t").column(
        "note",
        Column::new(ColumnType::basic(PgType::Text)).nullable(),
    );
    assert_eq!(
        kind(&table),
        ValidationErrorKind::NullableWithoutDefault {
            column: "note".into()
        }
    );

    let table = Table::new("t").column(
        "note",
        Column::new(ColumnType::basic(PgType::Text))
            .nullable()
            .default_value(Value::Null),
    );
    table.validate().unwrap();
}

#[test]
fn test_serial_must_be_primary() {
    let table = Table::new("t").column("id", Column::new(ColumnType::basic(PgType::BigSerial)));
    assert_eq!(
        kind(&table),
        ValidationErrorKind::SerialNotPrimary { column: "id".into() }
    );
}

#[test]
fn test_serial_nullable() {
    // primary + nullable serial: the serial rule fires before the primary one
    let table = Table::new("t").column(
        "id",
        Column::serial().nullable().default_value(Value::Null),
    );
    assert_eq!(
        kind(&table),
        ValidationErrorKind::SerialNullable { column: "id".into() }
    );
}

#[test]
fn test_key_type_rules() {
    let table = Table::new("t").column(
        "doc",
        Column::new(ColumnType::basic(PgType::Jsonb)).unique(),
    );
    assert!(matches!(
        kind(&table),
        ValidationErrorKind::UniqueNotAllowed { .. }
    ));

    let table = Table::new("t").column(
        "shape",
        Column::new(ColumnType::basic(PgType::Polygon)).primary(),
    );
    assert!(matches!(
        kind(&table),
        ValidationErrorKind::PrimaryNotAllowed { .. }
    ));

    let table = Table::new("t").column(
        "id",
        Column::new(ColumnType::basic(PgType::Uuid)).primary().unique(),
    );
    assert_eq!(
        kind(&table),
        ValidationErrorKind::PrimaryAndUnique { column: "id".into() }
    );

    let table = Table::new("t").column(
        "id",
        Column::new(ColumnType::basic(PgType::Uuid))
            .primary()
            .nullable()
            .default_value(Value::Null),
    );
    assert_eq!(
        kind(&table),
        ValidationErrorKind::PrimaryAndNullable { column: "id".into() }
    );
}

#[test]
fn test_alias() {
    for alias in [" name", "name ", "na\nme", "na\u{7}me"] {
        let table = Table::new("t").column(
            "name",
            Column::new(ColumnType::basic(PgType::Text)).alias(alias),
        );
        assert_eq!(
            kind(&table),
            ValidationErrorKind::InvalidAlias {
                column: "name".into()
            },
            "alias {alias:?}"
        );
    }

    let table = Table::new("t").column(
        "name",
        Column::new(ColumnType::basic(PgType::Text)).alias("Display Name"),
    );
    table.validate().unwrap();
}

#[test]
fn test_enum_rules() {
    let empty = Table::new("t").column(
        "mood",
        Column::new(ColumnType::enumeration("mood", Vec::<String>::new())),
    );
    assert_eq!(
        kind(&empty),
        ValidationErrorKind::EmptyEnum {
            column: "mood".into()
        }
    );

    let duplicate = Table::new("t").column(
        "mood",
        Column::new(ColumnType::enumeration("mood", ["happy", "sad", "happy"])),
    );
    assert_eq!(
        kind(&duplicate),
        ValidationErrorKind::DuplicateEnumValue {
            column: "mood".into(),
            value: "happy".into(),
        }
    );

    let bad_default = Table::new("t").column(
        "mood",
        Column::new(ColumnType::enumeration("mood", ["happy", "sad"])).default_value("meh"),
    );
    assert_eq!(
        kind(&bad_default),
        ValidationErrorKind::EnumDefaultNotAllowed {
            column: "mood".into()
        }
    );

    let good = Table::new("t").column(
        "mood",
        Column::new(ColumnType::enumeration("mood", ["happy", "sad"])).default_value("sad"),
    );
    good.validate().unwrap();
}

#[test]
fn test_composite_index_kinds() {
    for bad in [IndexKind::Hash, IndexKind::Spgist] {
        let table = users().index("idx_user_pair", bad, ["email", "nickname"]);
        assert_eq!(
            kind(&table),
            ValidationErrorKind::UnsupportedCompositeIndexKind {
                name: "idx_user_pair".into(),
                kind: bad,
            }
        );
    }
    for good in [IndexKind::Btree, IndexKind::Gin, IndexKind::Gist, IndexKind::Brin] {
        users()
            .index("idx_user_pair", good, ["email", "nickname"])
            .validate()
            .unwrap();
    }
}

#[test]
fn test_composite_unique_column_types() {
    let table = users()
        .column(
            "settings",
            Column::new(ColumnType::basic(PgType::Jsonb)).default_value(json!({})),
        )
        .unique("uq_user_settings", ["email", "settings"]);
    assert_eq!(
        kind(&table),
        ValidationErrorKind::CompositeUniqueNotAllowed {
            name: "uq_user_settings".into(),
            column: "settings".into(),
        }
    );
}

#[test]
fn test_relations() {
    let post = Table::new("post")
        .column("id", Column::serial())
        .column("author_id", Column::new(ColumnType::basic(PgType::Integer)));

    post.clone()
        .relation("post_author_fk", Relation::new(["author_id"], "user", ["id"]))
        .validate()
        .unwrap();

    let arity = post
        .clone()
        .relation("post_author_fk", Relation::new(["author_id"], "user", ["id", "x"]));
    assert!(matches!(
        kind(&arity),
        ValidationErrorKind::RelationArity {
            local: 1,
            referenced: 2,
            ..
        }
    ));

    let unknown = post.relation("post_editor_fk", Relation::new(["editor_id"], "user", ["id"]));
    assert!(matches!(
        kind(&unknown),
        ValidationErrorKind::UnknownColumn {
            constraint: "relation",
            ..
        }
    ));
}

#[test]
fn test_error_message() {
    let table = Table::new("t").column("id", Column::new(ColumnType::basic(PgType::Serial)));
    let err = table.validate().unwrap_err();
    assert_eq!(
        err.to_string(),
        "invalid table `t`: serial column `id` must be primary"
    );
}

proptest! {
    #[test]
    fn prop_valid_identifiers_pass(name in "[_]?[A-Za-z0-9_]{1,62}") {
        let mut table = users();
        table.name = name;
        prop_assert!(table.validate().is_ok());
    }

    #[test]
    fn prop_long_names_fail(name in "[a-z]{64,100}") {
        let mut table = users();
        table.name = name;
        let is_too_long = matches!(
            table.validate().map_err(|e| e.kind),
            Err(ValidationErrorKind::NameTooLong { .. })
        );
        prop_assert!(is_too_long);
    }
}

// ==================== types & serde ====================

#[test]
fn test_native_types() {
    assert_eq!(ColumnType::varchar(255).native_type(), "varchar(255)");
    assert_eq!(ColumnType::numeric(10, 2).native_type(), "numeric(10, 2)");
    assert_eq!(
        ColumnType::basic(PgType::DoublePrecision).native_type(),
        "double precision"
    );
    assert_eq!(
        ColumnType::enumeration("user mood", ["a"]).native_type(),
        "\"user mood\""
    );
}

#[test]
fn test_catalog_type_names() {
    assert_eq!(PgType::parse("int4"), Some(PgType::Integer));
    assert_eq!(PgType::parse("float8"), Some(PgType::DoublePrecision));
    assert_eq!(PgType::parse("bpchar"), Some(PgType::Char));
    assert_eq!(PgType::parse("bool"), Some(PgType::Boolean));
    assert_eq!(PgType::parse("character varying"), Some(PgType::Varchar));
    assert_eq!(PgType::parse("hstore"), None);
}

#[test]
fn test_default_value_null_vs_missing() {
    let with_null: Column = serde_json::from_value(json!({
        "type": { "kind": "basic", "name": "text" },
        "is_nullable": true,
        "default_value": null,
    }))
    .unwrap();
    assert_eq!(with_null.default_value, Some(Value::Null));

    let missing: Column = serde_json::from_value(json!({
        "type": { "kind": "basic", "name": "text" },
        "is_nullable": true,
    }))
    .unwrap();
    assert_eq!(missing.default_value, None);
}

#[test]
fn test_table_from_json() {
    let table: Table = serde_json::from_value(json!({
        "name": "post",
        "columns": {
            "id": { "type": { "kind": "basic", "name": "bigserial" }, "is_primary": true },
            "title": { "type": { "kind": "variable_length", "name": "varchar", "length": 200 } },
            "mood": {
                "type": { "kind": "enum", "native_name": "mood", "values": ["happy", "sad"] },
                "is_indexed": "hash",
                "default_value": "happy",
                "capability": "VERSION"
            },
            "author_id": { "type": { "kind": "basic", "name": "integer" } }
        },
        "relations": {
            "post_author_fk": {
                "columns": ["author_id"],
                "references": { "table": "user", "columns": ["id"] },
                "on_delete": "set-null"
            }
        }
    }))
    .unwrap();

    assert!(table.is_logged);
    assert_eq!(table.primary_key(), vec!["id"]);
    assert_eq!(table.columns["mood"].is_indexed, Some(IndexKind::Hash));
    assert_eq!(table.columns["mood"].capability, Some(Capability::Version));
    assert_eq!(
        table.relations["post_author_fk"].on_delete,
        ReferentialAction::SetNull
    );
    table.validate().unwrap();
}

// ==================== types ====================

#[test]
fn test_char_and_bit_without_length_are_length_one() {
    assert_eq!(
        ColumnType::basic(PgType::Char).canonical(),
        ColumnType::VariableLength {
            name: PgType::Char,
            length: 1
        }
    );
    assert_eq!(
        ColumnType::basic(PgType::Bit).canonical(),
        ColumnType::VariableLength {
            name: PgType::Bit,
            length: 1
        }
    );
    // unbounded varchar and varbit really are unbounded
    assert_eq!(
        ColumnType::basic(PgType::Varchar).canonical(),
        ColumnType::basic(PgType::Varchar)
    );
    assert_eq!(
        ColumnType::basic(PgType::Varbit).canonical(),
        ColumnType::basic(PgType::Varbit)
    );
}

#[test]
fn test_transformers_survive_json() {
    let column: Column = serde_json::from_value(json!({
        "type": { "kind": "basic", "name": "text" },
        "transformers": 5
    }))
    .unwrap();
    assert_eq!(column.transformers, Some(5));
    assert_eq!(
        serde_json::to_value(&column).unwrap()["transformers"],
        json!(5)
    );
}
