use std::collections::HashSet;
use std::sync::Mutex;

use serde_json::{Value, json};
use tracing::info;

use crate::client::{
    ExecOptions, ExecOutcome, ExecResponse, ExportOptions, ImportOptions, QuestDb,
};
use crate::error::QdbError;

/// Stands in for the server when `--dry-run` is set.
///
/// Nothing is sent. Each request is logged and a simulated answer comes back.
/// Tables passed to [`DryRunClient::assuming`] are reported as existing so
/// the printed plan shows the full sequence (backup, drop, rename); all other
/// tables are reported missing.
#[derive(Debug, Default)]
pub struct DryRunClient {
    existing: HashSet<String>,
    statements: Mutex<Vec<String>>,
}

impl DryRunClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn assuming<I, S>(tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            existing: tables
                .into_iter()
                .map(|t| t.as_ref().to_ascii_lowercase())
                .collect(),
            statements: Mutex::new(Vec::new()),
        }
    }

    /// Statements "executed" so far, in order.
    pub fn statements(&self) -> Vec<String> {
        self.statements
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    fn record(&self, statement: &str) {
        if let Ok(mut statements) = self.statements.lock() {
            statements.push(statement.to_string());
        }
    }
}

impl QuestDb for DryRunClient {
    async fn exec(&self, query: &str, options: &ExecOptions) -> Result<ExecResponse, QdbError> {
        info!("[dry-run] would execute: {}", query);
        if let Some(ms) = options.statement_timeout_ms {
            info!("[dry-run]   with Statement-Timeout: {}ms", ms);
        }
        self.record(query);
        Ok(ExecResponse {
            outcome: ExecOutcome::Ack("OK (Simulated)".to_string()),
            raw: json!({ "dry_run": true, "ddl": "OK (Simulated)" }),
        })
    }

    async fn table_exists(&self, table: &str) -> Result<bool, QdbError> {
        let exists = self.existing.contains(&table.to_ascii_lowercase());
        info!(
            "[dry-run] would check table '{}', assuming it {}",
            table,
            if exists { "exists" } else { "does not exist" }
        );
        Ok(exists)
    }

    fn is_dry_run(&self) -> bool {
        true
    }
}

/// Simulated `/imp` reply for one file.
pub fn simulate_import(file_name: &str, options: &ImportOptions, schema: Option<&str>) -> Value {
    info!(
        "[dry-run] would import '{}' into table '{}'",
        file_name, options.table_name
    );
    for (key, value) in options.query_params() {
        info!("[dry-run]   {}={}", key, value);
    }
    if let Some(schema) = schema {
        info!("[dry-run]   schema: {}", schema);
    }
    json!({
        "dry_run": true,
        "file": file_name,
        "table": options.table_name,
        "status": "OK (Simulated)",
    })
}

/// Simulated `/exp` reply.
pub fn simulate_export(query: &str, options: &ExportOptions) -> String {
    info!("[dry-run] would export: {}", query);
    for (key, value) in options.query_params(query).into_iter().skip(1) {
        info!("[dry-run]   {}={}", key, value);
    }
    let mut csv = String::new();
    if options.nm != Some(true) {
        csv.push_str("\"dry_run_col1\",\"dry_run_col2\"\n");
    }
    csv.push_str("\"simulated_val1\",\"simulated_val2\"\n");
    csv
}

/// Simulated `/chk` reply.
pub fn simulate_chk(table: &str) -> Value {
    info!("[dry-run] would check table '{}'", table);
    json!({ "dry_run": true, "tableName": table, "status": "Exists (Simulated)" })
}
