use serde::Serialize;
use serde_json::Value;
use tracing::info;

use crate::client::{ExecOptions, QuestDb};
use crate::error::QdbError;
use crate::interrupt::Interrupt;
use crate::sql;

/// Drop one table. A missing table comes back as `TableNotFound`.
pub async fn drop_table<Q: QuestDb>(
    db: &Q,
    table: &str,
    options: &ExecOptions,
    interrupt: &Interrupt,
) -> Result<DropReport, QdbError> {
    interrupt.check()?;
    if table.trim().is_empty() {
        return Err(QdbError::precondition("table name must not be empty"));
    }
    db.exec(&sql::drop_table(table), options).await?;
    info!("dropped table '{}'", table);
    Ok(DropReport {
        table_name: table.to_string(),
        status: if db.is_dry_run() {
            "OK (Simulated)"
        } else {
            "OK"
        },
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DropReport {
    pub table_name: String,
    pub status: &'static str,
}

/// `SHOW CREATE TABLE` text for one table. `None` in dry-run mode, where no
/// result comes back.
pub async fn show_create_table<Q: QuestDb>(
    db: &Q,
    table: &str,
    options: &ExecOptions,
    interrupt: &Interrupt,
) -> Result<Option<String>, QdbError> {
    interrupt.check()?;
    let response = db.exec(&sql::show_create_table(table), options).await?;
    if response.is_simulated() {
        return Ok(None);
    }
    let rows = response.rows().ok_or_else(|| QdbError::Response {
        message: format!("SHOW CREATE TABLE for '{table}' returned no result set"),
    })?;
    match rows.first_value() {
        Some(Value::String(ddl)) => Ok(Some(ddl.clone())),
        Some(other) => Ok(Some(other.to_string())),
        None => Err(QdbError::TableNotFound {
            table: Some(table.to_string()),
            message: format!("SHOW CREATE TABLE for '{table}' returned no rows"),
        }),
    }
}
