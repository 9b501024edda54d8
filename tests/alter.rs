mod common;

use common::FakeDatabase;
use serde_json::{Value, json};
use tabledesk::alter::{
    alter_column, alter_column_type, alter_columns_in_table, batch_update_columns, drop_columns,
    rename_column,
};
use tabledesk::db::ProcArg;
use tabledesk::error::{AlterError, ErrorKind};

const TABLE: u32 = 24_601;

fn alter_payload(db: &FakeDatabase) -> Value {
    let calls = db.calls_to("alter_columns");
    assert_eq!(calls.len(), 1, "expected exactly one alter_columns call");
    match calls[0] {
        [ProcArg::Oid(oid), ProcArg::Json(payload)] => {
            assert_eq!(*oid, TABLE);
            payload.clone()
        }
        other => panic!("unexpected arguments {other:?}"),
    }
}

#[test]
fn alter_column_sends_canonical_descriptor() {
    let mut db = FakeDatabase::new();
    let alteration = alter_column(
        &mut db,
        TABLE,
        3,
        json!({"name": "  total ", "nullable": false, "description": null}),
    )
    .expect("alter succeeds");

    assert_eq!(alteration.attnum, 3);
    assert_eq!(
        alter_payload(&db),
        json!([{"attnum": 3, "name": "total", "not_null": true, "description": null}])
    );
}

#[test]
fn convenience_wrappers_build_requests() {
    let mut db = FakeDatabase::new();
    alter_column_type(&mut db, TABLE, 2, "numeric", Some(json!({"precision": 6}))).unwrap();
    rename_column(&mut db, TABLE, 5, "renamed").unwrap();

    let payloads = db
        .calls_to("alter_columns")
        .into_iter()
        .map(|args| match args {
            [_, ProcArg::Json(payload)] => payload.clone(),
            other => panic!("unexpected arguments {other:?}"),
        })
        .collect::<Vec<_>>();
    assert_eq!(
        payloads,
        vec![
            json!([{"attnum": 2, "type": {"name": "numeric", "options": {"precision": 6}}}]),
            json!([{"attnum": 5, "name": "renamed"}]),
        ]
    );
}

#[test]
fn invalid_text_with_default_is_invalid_default() {
    let mut db = FakeDatabase::new()
        .with_column_name(TABLE, 2, "price")
        .failing("alter_columns", "22P02", "invalid input syntax for type integer");
    let err = alter_column(
        &mut db,
        TABLE,
        2,
        json!({"type": "integer", "column_default_dict": {"value": "abc"}}),
    )
    .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidDefault);
    assert_eq!(err.kind().code(), "invalid_default");
    assert!(db.calls_to("get_column_name").is_empty());
}

#[test]
fn invalid_text_without_default_is_enriched_invalid_type() {
    let mut db = FakeDatabase::new()
        .with_column_name(TABLE, 2, "price")
        .failing("alter_columns", "22P02", "invalid input syntax for type integer");
    let err = alter_column(&mut db, TABLE, 2, json!({"type": "integer"})).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidType);
    assert_eq!(err.column_name(), Some("price"));
    assert_eq!(err.type_name(), Some("integer"));
    assert_eq!(
        err.to_string(),
        "Column \"price\" cannot be converted to type integer"
    );
    assert_eq!(
        db.calls_to("get_column_name"),
        vec![&[ProcArg::Oid(TABLE), ProcArg::Int(2)][..]]
    );
}

#[test]
fn clearing_a_default_does_not_count_as_supplying_one() {
    let mut db = FakeDatabase::new()
        .with_column_name(TABLE, 4, "code")
        .failing("alter_columns", "22P02", "invalid input syntax");
    let err = alter_column(&mut db, TABLE, 4, json!({"type": "integer", "default": null}))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidType);
    assert_eq!(err.column_name(), Some("code"));
}

#[test]
fn raise_exception_and_parameter_errors_are_classified() {
    let mut db = FakeDatabase::new()
        .with_column_name(TABLE, 1, "flag")
        .failing("alter_columns", "P0001", "cannot cast");
    let err = alter_column(&mut db, TABLE, 1, json!({"type": "boolean"})).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidType);
    assert_eq!(err.column_name(), Some("flag"));

    let mut db = FakeDatabase::new().failing("alter_columns", "22023", "precision out of range");
    let err = alter_column(
        &mut db,
        TABLE,
        1,
        json!({"type": "numeric", "type_options": {"precision": 5000}}),
    )
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidTypeOption);
    assert_eq!(err.db_message(), Some("precision out of range"));
}

#[test]
fn unknown_database_errors_propagate_unchanged() {
    let mut db = FakeDatabase::new().failing("alter_columns", "42501", "permission denied");
    let err = alter_column(&mut db, TABLE, 1, json!({"name": "x"})).unwrap_err();
    assert!(matches!(err, AlterError::Database(_)));
    assert_eq!(err.kind().code(), "database_error");
    assert_eq!(err.to_string(), "permission denied");
    assert_eq!(
        err.db_error().and_then(|db| db.sqlstate()),
        Some("42501")
    );
}

#[test]
fn validation_failures_never_reach_the_database() {
    let mut db = FakeDatabase::new();
    let err = alter_column(&mut db, TABLE, 1, json!("rename")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let err = batch_update_columns(
        &mut db,
        TABLE,
        &[json!({"attnum": 1, "name": "ok"}), json!({"attnum": 2, "nullable": false})],
    )
    .unwrap_err();
    assert_eq!(err.kind().code(), "validation_error");

    let err = batch_update_columns(&mut db, TABLE, &[json!({"name": "no attnum"})]).unwrap_err();
    assert!(err.to_string().contains("\"attnum\" is required"));

    assert!(db.calls.is_empty());
}

#[test]
fn batch_update_sends_one_call() {
    let mut db = FakeDatabase::new();
    let alterations = batch_update_columns(
        &mut db,
        TABLE,
        &[
            json!({"attnum": 1, "name": "first"}),
            json!({"attnum": 2, "type": "text", "type_options": null}),
            json!({"attnum": 3, "delete": false}),
        ],
    )
    .unwrap();
    assert_eq!(alterations.len(), 3);
    assert_eq!(
        alter_payload(&db),
        json!([
            {"attnum": 1, "name": "first"},
            {"attnum": 2, "type": {"name": "text"}},
            {"attnum": 3, "delete": false}
        ])
    );
}

#[test]
fn batch_failures_are_not_enriched() {
    let mut db = FakeDatabase::new()
        .with_column_name(TABLE, 1, "amount")
        .failing("alter_columns", "P0001", "cannot cast");
    let err = batch_update_columns(&mut db, TABLE, &[json!({"attnum": 1, "type": "integer"})])
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidType);
    assert_eq!(err.column_name(), None);
    assert_eq!(err.type_name(), None);
    assert!(db.calls_to("get_column_name").is_empty());
}

#[test]
fn alter_columns_in_table_counts_items() {
    let mut db = FakeDatabase::new();
    let applied = alter_columns_in_table(
        &mut db,
        TABLE,
        &[
            json!({"id": 1, "default": {"value": 0}}),
            json!({"id": 2, "description": "notes"}),
        ],
    )
    .unwrap();
    assert_eq!(applied, 2);
    assert_eq!(
        alter_payload(&db),
        json!([
            {"attnum": 1, "default": 0},
            {"attnum": 2, "description": "notes"}
        ])
    );
}

#[test]
fn alter_columns_in_table_reports_item_position() {
    let mut db = FakeDatabase::new();
    let err = alter_columns_in_table(&mut db, TABLE, &[json!({"id": 1}), json!({"name": "x"})])
        .unwrap_err();
    assert!(err.to_string().contains("item 1"));
    assert!(db.calls.is_empty());
}

#[test]
fn drop_columns_only_sends_flagged_attnums() {
    let mut db = FakeDatabase::new();
    let dropped = drop_columns(
        &mut db,
        TABLE,
        &[
            json!({"attnum": 2, "delete": true}),
            json!({"attnum": 3, "delete": false}),
            json!({"attnum": null, "delete": true}),
            json!({"attnum": 5, "delete": true}),
            json!({"name": "unrelated"}),
        ],
    )
    .unwrap();
    assert_eq!(dropped, vec![2, 5]);
    assert_eq!(
        db.calls_to("drop_columns"),
        vec![&[ProcArg::Oid(TABLE), ProcArg::Int(2), ProcArg::Int(5)][..]]
    );
}

#[test]
fn drop_columns_without_candidates_makes_no_call() {
    let mut db = FakeDatabase::new();
    let dropped = drop_columns(&mut db, TABLE, &[json!({"attnum": 2})]).unwrap();
    assert!(dropped.is_empty());
    assert!(db.calls.is_empty());
}
