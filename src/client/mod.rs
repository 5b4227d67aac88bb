pub mod dry_run;
pub mod rest;

use std::fmt;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{QdbError, classify_query_error};

pub use dry_run::DryRunClient;
pub use rest::{ExportStream, RestClient};

/// Optional `/exec` parameters. `None` means the parameter is not sent.
#[derive(Debug, Clone, Default)]
pub struct ExecOptions {
    /// `"10"` or `"10,20"`.
    pub limit: Option<String>,
    pub count: Option<bool>,
    pub nm: Option<bool>,
    pub timings: Option<bool>,
    pub explain: Option<bool>,
    pub quote_large_num: Option<bool>,
    /// Sent as the `Statement-Timeout` header, in milliseconds.
    pub statement_timeout_ms: Option<u64>,
}

impl ExecOptions {
    /// Query-string pairs for a request, booleans rendered lowercase.
    pub fn query_params(&self, query: &str) -> Vec<(&'static str, String)> {
        let mut params = vec![("query", query.to_string())];
        if let Some(limit) = &self.limit {
            params.push(("limit", limit.clone()));
        }
        push_bool(&mut params, "count", self.count);
        push_bool(&mut params, "nm", self.nm);
        push_bool(&mut params, "timings", self.timings);
        push_bool(&mut params, "explain", self.explain);
        push_bool(&mut params, "quoteLargeNum", self.quote_large_num);
        params
    }
}

fn push_bool(params: &mut Vec<(&'static str, String)>, key: &'static str, value: Option<bool>) {
    if let Some(v) = value {
        params.push((key, v.to_string()));
    }
}

/// Column metadata as reported by `/exec`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
}

/// A tabular `/exec` result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowSet {
    #[serde(default)]
    pub query: Option<String>,
    /// Empty when `nm=true` was requested.
    #[serde(default)]
    pub columns: Vec<Column>,
    pub dataset: Vec<Vec<Value>>,
    #[serde(default)]
    pub count: Option<u64>,
}

/// Column selector for field extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldRef {
    Name(String),
    Index(usize),
}

impl FieldRef {
    /// All-digit input selects by position, anything else by name.
    pub fn parse(s: &str) -> Self {
        match s.parse::<usize>() {
            Ok(index) => FieldRef::Index(index),
            Err(_) => FieldRef::Name(s.to_string()),
        }
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldRef::Name(name) => write!(f, "'{name}'"),
            FieldRef::Index(index) => write!(f, "index {index}"),
        }
    }
}

impl RowSet {
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Resolve a column: exact name first, then case-insensitive, or a
    /// zero-based index.
    pub fn column_index(&self, field: &FieldRef) -> Result<usize, QdbError> {
        let found = match field {
            FieldRef::Index(index) => (*index < self.columns.len()).then_some(*index),
            FieldRef::Name(name) => self
                .columns
                .iter()
                .position(|c| &c.name == name)
                .or_else(|| {
                    self.columns
                        .iter()
                        .position(|c| c.name.eq_ignore_ascii_case(name))
                }),
        };
        found.ok_or_else(|| QdbError::Format {
            message: format!(
                "field {} not found, available columns: [{}]",
                field,
                self.column_names().join(", ")
            ),
        })
    }

    /// All values of one column.
    pub fn extract_field(&self, field: &FieldRef) -> Result<Vec<Value>, QdbError> {
        let index = self.column_index(field)?;
        Ok(self
            .dataset
            .iter()
            .map(|row| row.get(index).cloned().unwrap_or(Value::Null))
            .collect())
    }

    pub fn first_value(&self) -> Option<&Value> {
        self.dataset.first().and_then(|row| row.first())
    }
}

/// What a successful `/exec` returned.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecOutcome {
    Rows(RowSet),
    /// DDL or DML acknowledgement, e.g. `"OK"`.
    Ack(String),
}

#[derive(Debug, Clone)]
pub struct ExecResponse {
    pub outcome: ExecOutcome,
    /// The body exactly as the server sent it.
    pub raw: Value,
}

impl ExecResponse {
    /// Interpret an `/exec` body. An `error` member becomes a typed error.
    pub fn from_json(raw: Value, query: &str) -> Result<Self, QdbError> {
        if let Some(message) = raw.get("error").and_then(Value::as_str) {
            let sent = raw
                .get("query")
                .and_then(Value::as_str)
                .unwrap_or(query)
                .to_string();
            let position = raw.get("position").and_then(Value::as_i64);
            return Err(classify_query_error(message, Some(sent), position));
        }

        let outcome = if raw.get("dataset").is_some() {
            let rows: RowSet =
                serde_json::from_value(raw.clone()).map_err(|e| QdbError::Response {
                    message: format!("unexpected /exec result shape: {e}"),
                })?;
            ExecOutcome::Rows(rows)
        } else {
            let ack = ["ddl", "dml"]
                .iter()
                .find_map(|key| raw.get(*key))
                .map(|v| v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string()))
                .unwrap_or_else(|| "OK".to_string());
            ExecOutcome::Ack(ack)
        };
        Ok(Self { outcome, raw })
    }

    pub fn rows(&self) -> Option<&RowSet> {
        match &self.outcome {
            ExecOutcome::Rows(rows) => Some(rows),
            ExecOutcome::Ack(_) => None,
        }
    }

    pub fn is_simulated(&self) -> bool {
        self.raw.get("dry_run").and_then(Value::as_bool).unwrap_or(false)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ImportFormat {
    #[default]
    Tabular,
    Json,
}

impl ImportFormat {
    pub fn as_param(self) -> &'static str {
        match self {
            ImportFormat::Tabular => "tabular",
            ImportFormat::Json => "json",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "camelCase")]
pub enum Atomicity {
    Abort,
    SkipCol,
    SkipRow,
}

impl Atomicity {
    pub fn as_param(self) -> &'static str {
        match self {
            Atomicity::Abort => "abort",
            Atomicity::SkipCol => "skipCol",
            Atomicity::SkipRow => "skipRow",
        }
    }
}

/// `/imp` parameters. The table name is always sent.
#[derive(Debug, Clone, Default)]
pub struct ImportOptions {
    pub table_name: String,
    pub partition_by: Option<crate::sql::PartitionBy>,
    pub timestamp: Option<String>,
    pub overwrite: Option<bool>,
    pub atomicity: Option<Atomicity>,
    pub delimiter: Option<String>,
    pub force_header: Option<bool>,
    pub skip_lev: Option<bool>,
    pub fmt: ImportFormat,
    pub o3_max_lag: Option<u64>,
    pub max_uncommitted_rows: Option<u64>,
    pub create: Option<bool>,
}

impl ImportOptions {
    pub fn query_params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![("name", self.table_name.clone())];
        if let Some(partition) = self.partition_by {
            params.push(("partitionBy", partition.to_string()));
        }
        if let Some(ts) = &self.timestamp {
            params.push(("timestamp", ts.clone()));
        }
        push_bool(&mut params, "overwrite", self.overwrite);
        if let Some(atomicity) = self.atomicity {
            params.push(("atomicity", atomicity.as_param().to_string()));
        }
        if let Some(delimiter) = &self.delimiter {
            params.push(("delimiter", delimiter.clone()));
        }
        push_bool(&mut params, "forceHeader", self.force_header);
        push_bool(&mut params, "skipLev", self.skip_lev);
        params.push(("fmt", self.fmt.as_param().to_string()));
        if let Some(lag) = self.o3_max_lag {
            params.push(("o3MaxLag", lag.to_string()));
        }
        if let Some(rows) = self.max_uncommitted_rows {
            params.push(("maxUncommittedRows", rows.to_string()));
        }
        push_bool(&mut params, "create", self.create);
        params
    }
}

/// One file to upload.
#[derive(Debug, Clone)]
pub struct ImportSource {
    pub file_name: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ImportResponse {
    Json(Value),
    /// Text table returned for `fmt=tabular`.
    Tabular(String),
    /// `fmt=json` was requested but the body was not JSON.
    Unparsed(String),
}

impl ImportResponse {
    /// Failure markers: a JSON `status` other than `OK`, or a body that
    /// should have been JSON and was not.
    pub fn failed(&self) -> bool {
        match self {
            ImportResponse::Json(body) => body
                .get("status")
                .and_then(Value::as_str)
                .is_some_and(|status| status != "OK"),
            ImportResponse::Tabular(_) => false,
            ImportResponse::Unparsed(_) => true,
        }
    }

    pub fn failure_reason(&self) -> Option<String> {
        match self {
            ImportResponse::Json(body) if self.failed() => Some(
                body.get("status")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown")
                    .to_string(),
            ),
            ImportResponse::Unparsed(text) => Some(format!(
                "response was not JSON: {}",
                truncate(text, 200)
            )),
            _ => None,
        }
    }
}

/// `/exp` parameters.
#[derive(Debug, Clone, Default)]
pub struct ExportOptions {
    pub limit: Option<String>,
    pub nm: Option<bool>,
}

impl ExportOptions {
    pub fn query_params(&self, query: &str) -> Vec<(&'static str, String)> {
        let mut params = vec![("query", query.to_string())];
        if let Some(limit) = &self.limit {
            params.push(("limit", limit.clone()));
        }
        push_bool(&mut params, "nm", self.nm);
        params
    }
}

/// `/chk` body.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChkResponse {
    pub status: String,
}

impl ChkResponse {
    pub fn exists(&self) -> bool {
        self.status == "Exists"
    }
}

/// The operations sagas and table maintenance need. Implemented by the live
/// REST client and by the dry-run simulator.
pub trait QuestDb {
    fn exec(
        &self,
        query: &str,
        options: &ExecOptions,
    ) -> impl std::future::Future<Output = Result<ExecResponse, QdbError>> + Send;

    fn table_exists(
        &self,
        table: &str,
    ) -> impl std::future::Future<Output = Result<bool, QdbError>> + Send;

    /// True when statements are only being printed.
    fn is_dry_run(&self) -> bool {
        false
    }
}

pub(crate) fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
