mod support;

use qdb_rest::batch::ErrorPolicy;
use qdb_rest::client::{DryRunClient, ExecOptions, QuestDb};
use qdb_rest::commands::tables::{drop_all, print_schemas};
use qdb_rest::error::{EXIT_SUCCESS, QdbError};
use qdb_rest::interrupt::Interrupt;
use qdb_rest::saga::{OriginalPolicy, ReplaceRequest, create_or_replace_table};
use qdb_rest::tables::{drop_table, show_create_table};
use serde_json::json;
use support::FakeQuestDb;

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

// --- drop ---

#[tokio::test]
async fn test_drop_existing_table() {
    let db = FakeQuestDb::new().with_table("trades", "rows");
    let report = drop_table(&db, "trades", &ExecOptions::default(), &Interrupt::new())
        .await
        .unwrap();
    assert_eq!(report.table_name, "trades");
    assert_eq!(report.status, "OK");
    assert!(db.table("trades").is_none());

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json, json!({ "tableName": "trades", "status": "OK" }));
}

#[tokio::test]
async fn test_create_then_drop_seen_by_table_exists() {
    let db = FakeQuestDb::new();
    let interrupt = Interrupt::new();
    assert!(!db.table_exists("trades").await.unwrap());

    let request = ReplaceRequest {
        target: "trades".to_string(),
        query: "SELECT 1 x".to_string(),
        timestamp: None,
        partition_by: None,
        upsert_keys: Vec::new(),
        original: OriginalPolicy::default(),
        exec_options: ExecOptions::default(),
    };
    create_or_replace_table(&db, &request, &interrupt).await.unwrap();
    assert!(db.table_exists("trades").await.unwrap());

    drop_table(&db, "trades", &ExecOptions::default(), &interrupt)
        .await
        .unwrap();
    assert!(!db.table_exists("trades").await.unwrap());
}

#[tokio::test]
async fn test_drop_missing_table_is_not_found() {
    let db = FakeQuestDb::new();
    let err = drop_table(&db, "ghost", &ExecOptions::default(), &Interrupt::new())
        .await
        .unwrap_err();
    match err {
        QdbError::TableNotFound { table, .. } => assert_eq!(table.as_deref(), Some("ghost")),
        other => panic!("Expected TableNotFound. Got: {:?}", other),
    }
}

#[tokio::test]
async fn test_drop_empty_name_rejected() {
    let db = FakeQuestDb::new();
    let err = drop_table(&db, " ", &ExecOptions::default(), &Interrupt::new())
        .await
        .unwrap_err();
    assert!(matches!(err, QdbError::Precondition { .. }), "Got: {:?}", err);
    assert!(db.log().is_empty());
}

#[tokio::test]
async fn test_drop_quotes_odd_names() {
    let db = FakeQuestDb::new().with_table("my \"odd\" table", "rows");
    drop_table(&db, "my \"odd\" table", &ExecOptions::default(), &Interrupt::new())
        .await
        .unwrap();
    assert_eq!(db.statements(), vec!["DROP TABLE \"my \"\"odd\"\" table\"".to_string()]);
    assert!(db.table_names().is_empty());
}

#[tokio::test]
async fn test_drop_dry_run_status() {
    let db = DryRunClient::new();
    let report = drop_table(&db, "trades", &ExecOptions::default(), &Interrupt::new())
        .await
        .unwrap();
    assert_eq!(report.status, "OK (Simulated)");
    assert_eq!(db.statements(), vec!["DROP TABLE \"trades\"".to_string()]);
}

#[tokio::test]
async fn test_drop_all_continue_reports_partial() {
    let db = FakeQuestDb::new()
        .with_table("a", "rows")
        .with_table("c", "rows");
    let err = drop_all(&db, &names(&["a", "b", "c"]), ErrorPolicy::Continue, &Interrupt::new())
        .await
        .unwrap_err();
    match err {
        QdbError::Partial { failed, total } => {
            assert_eq!(failed, 1);
            assert_eq!(total, 3);
        }
        other => panic!("Expected Partial. Got: {:?}", other),
    }
    assert!(db.table_names().is_empty(), "a and c are still dropped");
}

#[tokio::test]
async fn test_drop_all_stop_on_error() {
    let db = FakeQuestDb::new()
        .with_table("a", "rows")
        .with_table("c", "rows");
    let err = drop_all(&db, &names(&["a", "b", "c"]), ErrorPolicy::StopOnError, &Interrupt::new())
        .await
        .unwrap_err();
    assert!(err.is_table_not_found(), "Got: {:?}", err);
    assert_eq!(db.table_names(), vec!["c".to_string()]);
}

#[tokio::test]
async fn test_drop_all_success() {
    let db = FakeQuestDb::new().with_table("a", "rows");
    let code = drop_all(&db, &names(&["a"]), ErrorPolicy::StopOnError, &Interrupt::new())
        .await
        .unwrap();
    assert_eq!(code, EXIT_SUCCESS);
}

// --- schema ---

#[tokio::test]
async fn test_show_create_table() {
    let db = FakeQuestDb::new().with_ts_table("trades", "rows", "ts");
    let ddl = show_create_table(&db, "trades", &ExecOptions::default(), &Interrupt::new())
        .await
        .unwrap()
        .unwrap();
    assert!(ddl.starts_with("CREATE TABLE 'trades'"), "Got: {}", ddl);
    assert!(ddl.contains("timestamp(ts)"), "Got: {}", ddl);
}

#[tokio::test]
async fn test_show_create_table_missing() {
    let db = FakeQuestDb::new();
    let err = show_create_table(&db, "ghost", &ExecOptions::default(), &Interrupt::new())
        .await
        .unwrap_err();
    assert!(err.is_table_not_found(), "Got: {:?}", err);
}

#[tokio::test]
async fn test_show_create_table_without_rows() {
    let db = FakeQuestDb::new();
    db.respond(
        "SHOW CREATE TABLE",
        json!({ "columns": [{ "name": "ddl", "type": "STRING" }], "dataset": [], "count": 0 }),
    );
    let err = show_create_table(&db, "trades", &ExecOptions::default(), &Interrupt::new())
        .await
        .unwrap_err();
    assert!(err.is_table_not_found(), "Got: {:?}", err);
}

#[tokio::test]
async fn test_show_create_table_dry_run() {
    let db = DryRunClient::new();
    let ddl = show_create_table(&db, "trades", &ExecOptions::default(), &Interrupt::new())
        .await
        .unwrap();
    assert!(ddl.is_none());
}

#[tokio::test]
async fn test_print_schemas_partial() {
    let db = FakeQuestDb::new().with_table("trades", "rows");
    let err = print_schemas(&db, &names(&["trades", "ghost"]), ErrorPolicy::Continue, &Interrupt::new())
        .await
        .unwrap_err();
    assert!(matches!(err, QdbError::Partial { failed: 1, total: 2 }), "Got: {:?}", err);
}

#[tokio::test]
async fn test_print_schemas_stops_on_interrupt() {
    let db = FakeQuestDb::new()
        .with_table("a", "rows")
        .with_table("b", "rows");
    let interrupt = Interrupt::new();
    db.interrupt_after("SHOW CREATE TABLE \"a\"", &interrupt);
    let err = print_schemas(&db, &names(&["a", "b"]), ErrorPolicy::Continue, &interrupt)
        .await
        .unwrap_err();
    assert!(err.is_interrupt(), "Got: {:?}", err);
    assert_eq!(db.statements(), vec!["SHOW CREATE TABLE \"a\"".to_string()]);
}
