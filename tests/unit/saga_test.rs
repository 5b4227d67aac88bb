mod support;

use qdb_rest::client::{ExecOptions, QuestDb};
use qdb_rest::error::{EXIT_INTERRUPTED, QdbError};
use qdb_rest::interrupt::Interrupt;
use qdb_rest::saga::{
    OriginalData, OriginalPolicy, Recovery, RenameRequest, ReplaceRequest, SagaFailure, SagaStep,
    create_or_replace_table, rename_table,
};
use qdb_rest::sql::PartitionBy;
use support::FakeQuestDb;

const QUERY: &str = "SELECT * FROM raw_trades";

fn replace(target: &str, original: OriginalPolicy) -> ReplaceRequest {
    ReplaceRequest {
        target: target.to_string(),
        query: QUERY.to_string(),
        timestamp: None,
        partition_by: None,
        upsert_keys: Vec::new(),
        original,
        exec_options: ExecOptions::default(),
    }
}

fn rename(old: &str, new: &str, existing: OriginalPolicy) -> RenameRequest {
    RenameRequest {
        old_name: old.to_string(),
        new_name: new.to_string(),
        existing,
        exec_options: ExecOptions::default(),
    }
}

fn backup(name: &str) -> OriginalPolicy {
    OriginalPolicy::Backup {
        name: Some(name.to_string()),
    }
}

fn saga_failure(err: QdbError) -> Box<SagaFailure> {
    match err {
        QdbError::Saga(failure) => failure,
        other => panic!("Expected a saga failure. Got: {:?}", other),
    }
}

fn temp_tables(db: &FakeQuestDb) -> Vec<String> {
    db.table_names()
        .into_iter()
        .filter(|t| t.starts_with("__cli_temp_"))
        .collect()
}

// --- create-or-replace: success paths ---

#[tokio::test]
async fn test_create_when_target_absent() {
    let db = FakeQuestDb::new();
    let report = create_or_replace_table(&db, &replace("trades", OriginalPolicy::default()), &Interrupt::new())
        .await
        .unwrap();

    assert_eq!(report.target_table, "trades");
    assert_eq!(report.original, OriginalData::Absent);
    assert!(!report.dry_run);
    assert_eq!(db.table("trades").unwrap().contents, QUERY);
    assert_eq!(db.table_names(), vec!["trades".to_string()]);
    assert!(db.table_exists("trades").await.unwrap());
    assert!(!db.table_exists(&report.temp_table).await.unwrap());

    let statements = db.statements();
    assert_eq!(statements.len(), 2, "Got: {:?}", statements);
    assert!(statements[0].starts_with(&format!("CREATE TABLE \"{}\" AS (", report.temp_table)));
    assert_eq!(
        statements[1],
        format!("RENAME TABLE \"{}\" TO \"trades\"", report.temp_table)
    );
}

#[tokio::test]
async fn test_replace_backs_up_original_by_default() {
    let db = FakeQuestDb::new().with_table("trades", "old rows");
    let report = create_or_replace_table(&db, &replace("trades", OriginalPolicy::default()), &Interrupt::new())
        .await
        .unwrap();

    let OriginalData::BackedUp { table } = &report.original else {
        panic!("Expected a backup. Got: {:?}", report.original);
    };
    assert!(table.starts_with("__qdb_cli_backup_trades_"), "Got: {}", table);
    assert_eq!(db.table(table).unwrap().contents, "old rows");
    assert_eq!(db.table("trades").unwrap().contents, QUERY);
    assert!(temp_tables(&db).is_empty());
}

#[tokio::test]
async fn test_replace_with_named_backup() {
    let db = FakeQuestDb::new().with_table("trades", "old rows");
    let report = create_or_replace_table(&db, &replace("trades", backup("trades_prev")), &Interrupt::new())
        .await
        .unwrap();

    assert_eq!(
        report.original,
        OriginalData::BackedUp {
            table: "trades_prev".to_string()
        }
    );
    assert_eq!(db.table("trades_prev").unwrap().contents, "old rows");
    assert!(db.log().contains(&"chk trades_prev".to_string()));
}

#[tokio::test]
async fn test_replace_dropping_original() {
    let db = FakeQuestDb::new().with_table("trades", "old rows");
    let report = create_or_replace_table(&db, &replace("trades", OriginalPolicy::Drop), &Interrupt::new())
        .await
        .unwrap();

    assert_eq!(report.original, OriginalData::Dropped);
    assert_eq!(db.table_names(), vec!["trades".to_string()]);
    assert_eq!(db.table("trades").unwrap().contents, QUERY);
    assert!(db.statements().contains(&"DROP TABLE \"trades\"".to_string()));
}

#[tokio::test]
async fn test_replace_with_dedup_settings() {
    let db = FakeQuestDb::new();
    let mut request = replace("trades", OriginalPolicy::default());
    request.timestamp = Some("ts".to_string());
    request.partition_by = Some(PartitionBy::Day);
    request.upsert_keys = vec!["ts".to_string(), "sym".to_string()];

    let report = create_or_replace_table(&db, &request, &Interrupt::new()).await.unwrap();
    assert_eq!(report.upsert_keys, vec!["ts".to_string(), "sym".to_string()]);

    let create = &db.statements()[0];
    assert!(create.contains("TIMESTAMP(\"ts\") PARTITION BY DAY"), "Got: {}", create);
    assert!(create.contains("DEDUP UPSERT KEYS(\"ts\", \"sym\")"), "Got: {}", create);
    let table = db.table("trades").unwrap();
    assert!(table.dedup);
    assert_eq!(table.timestamp.as_deref(), Some("ts"));
}

#[tokio::test]
async fn test_trailing_semicolon_is_stripped_from_query() {
    let db = FakeQuestDb::new();
    let mut request = replace("trades", OriginalPolicy::default());
    request.query = "SELECT 1 AS x;\n".to_string();
    create_or_replace_table(&db, &request, &Interrupt::new()).await.unwrap();
    assert_eq!(db.table("trades").unwrap().contents, "SELECT 1 AS x");
}

// --- create-or-replace: preconditions ---

#[tokio::test]
async fn test_preconditions_send_nothing() {
    let db = FakeQuestDb::new().with_table("trades", "old rows");

    let mut empty_query = replace("trades", OriginalPolicy::default());
    empty_query.query = "   ".to_string();
    let err = create_or_replace_table(&db, &empty_query, &Interrupt::new()).await.unwrap_err();
    assert!(matches!(err, QdbError::Precondition { .. }), "Got: {:?}", err);

    let mut keys_without_ts = replace("trades", OriginalPolicy::default());
    keys_without_ts.upsert_keys = vec!["sym".to_string()];
    let err = create_or_replace_table(&db, &keys_without_ts, &Interrupt::new()).await.unwrap_err();
    assert!(matches!(err, QdbError::Precondition { .. }), "Got: {:?}", err);

    let mut ts_not_in_keys = replace("trades", OriginalPolicy::default());
    ts_not_in_keys.timestamp = Some("ts".to_string());
    ts_not_in_keys.upsert_keys = vec!["sym".to_string()];
    let err = create_or_replace_table(&db, &ts_not_in_keys, &Interrupt::new()).await.unwrap_err();
    assert!(err.to_string().contains("'ts'"), "Got: {}", err);

    let clash = replace("trades", backup("TRADES"));
    let err = create_or_replace_table(&db, &clash, &Interrupt::new()).await.unwrap_err();
    assert!(matches!(err, QdbError::Precondition { .. }), "Got: {:?}", err);

    assert!(db.log().is_empty(), "Got: {:?}", db.log());
}

// --- create-or-replace: failures and compensation ---

#[tokio::test]
async fn test_create_failure_leaves_nothing_behind() {
    let db = FakeQuestDb::new().with_table("trades", "old rows");
    db.fail_on("CREATE TABLE", "Invalid column: nope");

    let err = create_or_replace_table(&db, &replace("trades", OriginalPolicy::default()), &Interrupt::new())
        .await
        .unwrap_err();
    let failure = saga_failure(err);
    assert_eq!(failure.step, SagaStep::CreateTemp);
    assert_eq!(failure.recovery, Recovery::Clean);
    assert!(matches!(failure.cause, QdbError::Query { .. }), "Got: {:?}", failure.cause);
    assert_eq!(db.table_names(), vec!["trades".to_string()]);
    assert_eq!(db.table("trades").unwrap().contents, "old rows");
}

#[tokio::test]
async fn test_final_rename_failure_restores_backup() {
    let db = FakeQuestDb::new().with_table("trades", "old rows");
    db.fail_on("RENAME TABLE \"__cli_temp_", "rename failed");

    let err = create_or_replace_table(&db, &replace("trades", OriginalPolicy::default()), &Interrupt::new())
        .await
        .unwrap_err();
    let message = err.to_string();
    let failure = saga_failure(err);
    assert_eq!(failure.step, SagaStep::RenameFinal);
    assert_eq!(failure.recovery, Recovery::Clean);
    assert!(message.contains("rolled back cleanly"), "Got: {}", message);
    assert!(!failure.state.backup_created);
    assert!(!failure.state.temp_table_created);

    assert_eq!(db.table_names(), vec!["trades".to_string()]);
    assert_eq!(db.table("trades").unwrap().contents, "old rows");
}

#[tokio::test]
async fn test_final_rename_failure_after_drop_keeps_new_data() {
    let db = FakeQuestDb::new().with_table("trades", "old rows");
    db.fail_on("RENAME TABLE \"__cli_temp_", "rename failed");

    let err = create_or_replace_table(&db, &replace("trades", OriginalPolicy::Drop), &Interrupt::new())
        .await
        .unwrap_err();
    let message = err.to_string();
    let failure = saga_failure(err);
    assert_eq!(failure.step, SagaStep::RenameFinal);
    let Recovery::Degraded { warnings } = &failure.recovery else {
        panic!("Expected degraded recovery. Got: {:?}", failure.recovery);
    };
    assert_eq!(warnings.len(), 1, "Got: {:?}", warnings);
    assert!(warnings[0].contains("dropped without a backup"), "Got: {}", warnings[0]);
    assert!(message.contains("manual cleanup required"), "Got: {}", message);

    let temps = temp_tables(&db);
    assert_eq!(temps.len(), 1, "The new data should be kept");
    assert_eq!(db.table(&temps[0]).unwrap().contents, QUERY);
    assert!(db.table("trades").is_none());
}

#[tokio::test]
async fn test_backup_failure_drops_temp_table() {
    let db = FakeQuestDb::new().with_table("trades", "old rows");
    db.fail_on("RENAME TABLE \"trades\"", "cannot rename");

    let err = create_or_replace_table(&db, &replace("trades", OriginalPolicy::default()), &Interrupt::new())
        .await
        .unwrap_err();
    let failure = saga_failure(err);
    assert_eq!(failure.step, SagaStep::BackupOriginal);
    assert_eq!(failure.recovery, Recovery::Clean);
    assert!(temp_tables(&db).is_empty());
    assert_eq!(db.table("trades").unwrap().contents, "old rows");
}

#[tokio::test]
async fn test_existing_backup_name_is_refused() {
    let db = FakeQuestDb::new()
        .with_table("trades", "old rows")
        .with_table("trades_prev", "older rows");

    let err = create_or_replace_table(&db, &replace("trades", backup("trades_prev")), &Interrupt::new())
        .await
        .unwrap_err();
    let failure = saga_failure(err);
    assert_eq!(failure.step, SagaStep::CheckBackup);
    assert!(matches!(failure.cause, QdbError::Precondition { .. }), "Got: {:?}", failure.cause);
    assert_eq!(failure.recovery, Recovery::Clean);
    assert!(temp_tables(&db).is_empty());
    assert_eq!(db.table("trades_prev").unwrap().contents, "older rows");
}

#[tokio::test]
async fn test_target_check_error_is_not_treated_as_absent() {
    let db = FakeQuestDb::new();
    db.fail_on("chk trades", "server unavailable");

    let err = create_or_replace_table(&db, &replace("trades", OriginalPolicy::default()), &Interrupt::new())
        .await
        .unwrap_err();
    let failure = saga_failure(err);
    assert_eq!(failure.step, SagaStep::CheckTarget);
    assert!(matches!(failure.cause, QdbError::Api { .. }), "Got: {:?}", failure.cause);
    assert!(db.table_names().is_empty());
}

#[tokio::test]
async fn test_failed_restore_reports_manual_steps() {
    let db = FakeQuestDb::new().with_table("trades", "old rows");
    db.fail_on("TO \"trades\"", "rename failed");

    let err = create_or_replace_table(&db, &replace("trades", backup("trades_prev")), &Interrupt::new())
        .await
        .unwrap_err();
    let failure = saga_failure(err);
    let Recovery::Degraded { warnings } = &failure.recovery else {
        panic!("Expected degraded recovery. Got: {:?}", failure.recovery);
    };
    assert!(
        warnings[0].contains("RENAME TABLE \"trades_prev\" TO \"trades\""),
        "Got: {}",
        warnings[0]
    );
    assert_eq!(db.table("trades_prev").unwrap().contents, "old rows");
    // The temporary table is still dropped.
    assert!(temp_tables(&db).is_empty());
}

// --- create-or-replace: interrupts ---

#[tokio::test]
async fn test_forced_exit_held_off_during_rollback() {
    let db = FakeQuestDb::new().with_table("trades", "old rows");
    let interrupt = Interrupt::new();
    db.watch_force_exit(&interrupt);
    db.interrupt_after("CREATE TABLE", &interrupt);

    let err = create_or_replace_table(&db, &replace("trades", OriginalPolicy::default()), &interrupt)
        .await
        .unwrap_err();
    assert!(err.is_interrupt());

    let seen = db.force_exit_log();
    let (create, allowed) = &seen[0];
    assert!(create.starts_with("CREATE TABLE"), "Got: {:?}", seen);
    assert!(*allowed, "Forward steps may be cut short");
    let (cleanup, allowed) = seen.last().unwrap();
    assert!(cleanup.starts_with("DROP TABLE \"__cli_temp_"), "Got: {:?}", seen);
    assert!(!*allowed, "Rollback must not be cut short");

    assert!(interrupt.force_exit_allowed());
}

#[tokio::test]
async fn test_interrupt_after_create_rolls_back() {
    let db = FakeQuestDb::new().with_table("trades", "old rows");
    let interrupt = Interrupt::new();
    db.interrupt_after("CREATE TABLE", &interrupt);

    let err = create_or_replace_table(&db, &replace("trades", OriginalPolicy::default()), &interrupt)
        .await
        .unwrap_err();
    assert!(err.is_interrupt());
    assert_eq!(err.exit_code(), EXIT_INTERRUPTED);

    let failure = saga_failure(err);
    assert_eq!(failure.step, SagaStep::CheckTarget);
    assert_eq!(failure.recovery, Recovery::Clean);
    assert!(temp_tables(&db).is_empty());
    assert_eq!(db.table("trades").unwrap().contents, "old rows");
}

#[tokio::test]
async fn test_interrupt_after_backup_restores_original() {
    let db = FakeQuestDb::new().with_table("trades", "old rows");
    let interrupt = Interrupt::new();
    db.interrupt_after("RENAME TABLE \"trades\"", &interrupt);

    let err = create_or_replace_table(&db, &replace("trades", OriginalPolicy::default()), &interrupt)
        .await
        .unwrap_err();
    assert!(err.is_interrupt());
    let failure = saga_failure(err);
    assert_eq!(failure.step, SagaStep::RenameFinal);
    assert_eq!(failure.recovery, Recovery::Clean);
    assert_eq!(db.table_names(), vec!["trades".to_string()]);
    assert_eq!(db.table("trades").unwrap().contents, "old rows");
}

#[tokio::test]
async fn test_interrupt_before_start_sends_nothing() {
    let db = FakeQuestDb::new();
    let interrupt = Interrupt::new();
    interrupt.trigger();

    let err = create_or_replace_table(&db, &replace("trades", OriginalPolicy::default()), &interrupt)
        .await
        .unwrap_err();
    assert!(err.is_interrupt());
    assert!(db.log().is_empty(), "Got: {:?}", db.log());
}

// --- rename ---

#[tokio::test]
async fn test_rename_simple() {
    let db = FakeQuestDb::new().with_table("trades", "rows");
    let report = rename_table(&db, &rename("trades", "trades_v2", OriginalPolicy::default()), &Interrupt::new())
        .await
        .unwrap();

    assert_eq!(report.replaced, OriginalData::Absent);
    assert_eq!(db.table_names(), vec!["trades_v2".to_string()]);
    assert_eq!(
        db.statements(),
        vec!["RENAME TABLE \"trades\" TO \"trades_v2\"".to_string()]
    );
}

#[tokio::test]
async fn test_rename_missing_source() {
    let db = FakeQuestDb::new();
    let err = rename_table(&db, &rename("ghost", "trades", OriginalPolicy::default()), &Interrupt::new())
        .await
        .unwrap_err();
    let failure = saga_failure(err);
    assert_eq!(failure.step, SagaStep::CheckSource);
    assert!(failure.cause.is_table_not_found(), "Got: {:?}", failure.cause);
    assert_eq!(failure.recovery, Recovery::Clean);
    assert!(db.statements().is_empty());
}

#[tokio::test]
async fn test_rename_backs_up_existing_target() {
    let db = FakeQuestDb::new()
        .with_table("staging", "new rows")
        .with_table("trades", "old rows");
    let report = rename_table(&db, &rename("staging", "trades", OriginalPolicy::default()), &Interrupt::new())
        .await
        .unwrap();

    let OriginalData::BackedUp { table } = &report.replaced else {
        panic!("Expected a backup. Got: {:?}", report.replaced);
    };
    assert_eq!(db.table(table).unwrap().contents, "old rows");
    assert_eq!(db.table("trades").unwrap().contents, "new rows");
    assert!(db.table("staging").is_none());
}

#[tokio::test]
async fn test_rename_drops_existing_target() {
    let db = FakeQuestDb::new()
        .with_table("staging", "new rows")
        .with_table("trades", "old rows");
    let report = rename_table(&db, &rename("staging", "trades", OriginalPolicy::Drop), &Interrupt::new())
        .await
        .unwrap();

    assert_eq!(report.replaced, OriginalData::Dropped);
    assert_eq!(db.table_names(), vec!["trades".to_string()]);
    assert_eq!(db.table("trades").unwrap().contents, "new rows");
}

#[tokio::test]
async fn test_rename_failure_restores_existing_target() {
    let db = FakeQuestDb::new()
        .with_table("staging", "new rows")
        .with_table("trades", "old rows");
    db.fail_on("RENAME TABLE \"staging\"", "rename failed");

    let err = rename_table(&db, &rename("staging", "trades", backup("trades_prev")), &Interrupt::new())
        .await
        .unwrap_err();
    let failure = saga_failure(err);
    assert_eq!(failure.step, SagaStep::RenameFinal);
    assert_eq!(failure.recovery, Recovery::Clean);
    assert_eq!(db.table("trades").unwrap().contents, "old rows");
    assert_eq!(db.table("staging").unwrap().contents, "new rows");
    assert!(db.table("trades_prev").is_none());
}

#[tokio::test]
async fn test_rename_preconditions() {
    let db = FakeQuestDb::new().with_table("trades", "rows");

    let err = rename_table(&db, &rename("trades", "TRADES", OriginalPolicy::default()), &Interrupt::new())
        .await
        .unwrap_err();
    assert!(matches!(err, QdbError::Precondition { .. }), "Got: {:?}", err);

    let err = rename_table(&db, &rename("", "x", OriginalPolicy::default()), &Interrupt::new())
        .await
        .unwrap_err();
    assert!(matches!(err, QdbError::Precondition { .. }), "Got: {:?}", err);

    let err = rename_table(&db, &rename("trades", "x", backup("trades")), &Interrupt::new())
        .await
        .unwrap_err();
    assert!(matches!(err, QdbError::Precondition { .. }), "Got: {:?}", err);

    assert!(db.log().is_empty(), "Got: {:?}", db.log());
}
