//! Deduplication settings on existing WAL tables.

use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::client::{ExecOptions, QuestDb};
use crate::error::QdbError;
use crate::interrupt::Interrupt;
use crate::sql;
use crate::tables::show_create_table;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DedupeAction {
    Enable { upsert_keys: Vec<String> },
    Disable,
    Check,
}

/// Current deduplication settings of a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DedupeStatus {
    pub table_name: String,
    pub dedup_enabled: bool,
    pub designated_timestamp: Option<String>,
    pub upsert_keys: Vec<String>,
}

/// Result of enabling or disabling deduplication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DedupeChange {
    pub table_name: String,
    pub dedup_enabled: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub upsert_keys: Vec<String>,
    pub designated_timestamp: Option<String>,
    pub statement: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub dry_run: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum DedupeOutcome {
    Changed(DedupeChange),
    Status(DedupeStatus),
}

pub async fn apply<Q: QuestDb>(
    db: &Q,
    table: &str,
    action: &DedupeAction,
    options: &ExecOptions,
    interrupt: &Interrupt,
) -> Result<DedupeOutcome, QdbError> {
    interrupt.check()?;
    match action {
        DedupeAction::Enable { upsert_keys } => {
            enable(db, table, upsert_keys, options, interrupt)
                .await
                .map(DedupeOutcome::Changed)
        }
        DedupeAction::Disable => disable(db, table, options).await.map(DedupeOutcome::Changed),
        DedupeAction::Check => check(db, table, options).await.map(DedupeOutcome::Status),
    }
}

/// Enable deduplication. The upsert keys must include the table's designated
/// timestamp, which is looked up before the change is sent.
pub async fn enable<Q: QuestDb>(
    db: &Q,
    table: &str,
    upsert_keys: &[String],
    options: &ExecOptions,
    interrupt: &Interrupt,
) -> Result<DedupeChange, QdbError> {
    if upsert_keys.is_empty() {
        return Err(QdbError::precondition(
            "at least one upsert key is required to enable deduplication",
        ));
    }

    let ddl = show_create_table(db, table, options, interrupt).await?;
    let designated = ddl.as_deref().and_then(sql::designated_timestamp);
    match (&designated, &ddl) {
        (Some(ts), _) => sql::ensure_timestamp_in_keys(ts, upsert_keys)?,
        (None, None) => warn!(
            "dry run: cannot verify that the upsert keys of '{}' include its designated timestamp",
            table
        ),
        (None, Some(_)) => {
            return Err(QdbError::precondition(format!(
                "table '{table}' has no designated timestamp; deduplication requires one"
            )));
        }
    }

    interrupt.check()?;
    let statement = sql::dedup_enable(table, upsert_keys);
    db.exec(&statement, options).await?;
    info!("deduplication enabled on '{}' ({})", table, upsert_keys.join(", "));
    Ok(DedupeChange {
        table_name: table.to_string(),
        dedup_enabled: true,
        upsert_keys: upsert_keys.to_vec(),
        designated_timestamp: designated,
        statement,
        dry_run: db.is_dry_run(),
    })
}

pub async fn disable<Q: QuestDb>(
    db: &Q,
    table: &str,
    options: &ExecOptions,
) -> Result<DedupeChange, QdbError> {
    let statement = sql::dedup_disable(table);
    db.exec(&statement, options).await?;
    info!("deduplication disabled on '{}'", table);
    Ok(DedupeChange {
        table_name: table.to_string(),
        dedup_enabled: false,
        upsert_keys: Vec::new(),
        designated_timestamp: None,
        statement,
        dry_run: db.is_dry_run(),
    })
}

/// Read-only; repeated calls give the same answer while the table is
/// unchanged.
pub async fn check<Q: QuestDb>(
    db: &Q,
    table: &str,
    options: &ExecOptions,
) -> Result<DedupeStatus, QdbError> {
    let status = db.exec(&sql::table_dedup_status(table), options).await?;
    if status.is_simulated() {
        return Ok(DedupeStatus {
            table_name: table.to_string(),
            dedup_enabled: false,
            designated_timestamp: None,
            upsert_keys: Vec::new(),
        });
    }

    let rows = status.rows().ok_or_else(|| QdbError::Response {
        message: "tables() query returned no result set".to_string(),
    })?;
    let Some(row) = rows.dataset.first() else {
        return Err(QdbError::TableNotFound {
            table: Some(table.to_string()),
            message: format!("table '{table}' does not exist"),
        });
    };
    let designated_timestamp = row.first().and_then(Value::as_str).map(str::to_string);
    let dedup_enabled = row.get(1).and_then(Value::as_bool).unwrap_or(false);

    let keys = db.exec(&sql::table_upsert_keys(table), options).await?;
    let upsert_keys = keys
        .rows()
        .map(|rows| {
            rows.dataset
                .iter()
                .filter_map(|r| r.first().and_then(Value::as_str).map(str::to_string))
                .collect()
        })
        .unwrap_or_default();

    Ok(DedupeStatus {
        table_name: table.to_string(),
        dedup_enabled,
        designated_timestamp,
        upsert_keys,
    })
}
