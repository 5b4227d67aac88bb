use serde::Serialize;
use serde_json::Value;
use tabled::{Table, builder::Builder, settings};

use crate::client::{ExecResponse, FieldRef, RowSet};
use crate::error::QdbError;

/// How `exec` prints a result.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Pretty-printed server JSON.
    #[default]
    Json,
    /// Only the first cell of the first row.
    One,
    Csv,
    Psql,
    Markdown,
}

impl OutputFormat {
    pub fn from_flags(one: bool, csv: bool, psql: bool, markdown: bool) -> Self {
        if one {
            OutputFormat::One
        } else if csv {
            OutputFormat::Csv
        } else if psql {
            OutputFormat::Psql
        } else if markdown {
            OutputFormat::Markdown
        } else {
            OutputFormat::Json
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TableStyle {
    Psql,
    Markdown,
}

impl TableStyle {
    fn apply(self, table: &mut Table) {
        match self {
            Self::Psql => table.with(settings::Style::psql()),
            Self::Markdown => table.with(settings::Style::markdown()),
        };
    }
}

/// Render one `/exec` response. Results without rows (DDL acks) always print
/// as JSON. The returned text ends with a newline.
pub fn render_exec(response: &ExecResponse, format: OutputFormat) -> Result<String, QdbError> {
    let Some(rows) = response.rows() else {
        return to_json(&response.raw);
    };
    match format {
        OutputFormat::Json => to_json(&response.raw),
        OutputFormat::One => Ok(match rows.first_value() {
            Some(value) => format!("{}\n", cell_text(value)),
            None => String::new(),
        }),
        OutputFormat::Csv => to_csv(rows),
        OutputFormat::Psql => Ok(to_table(rows, TableStyle::Psql)),
        OutputFormat::Markdown => Ok(to_table(rows, TableStyle::Markdown)),
    }
}

/// One value per line.
pub fn render_field(rows: &RowSet, field: &FieldRef) -> Result<String, QdbError> {
    let mut out = String::new();
    for value in rows.extract_field(field)? {
        out.push_str(&cell_text(&value));
        out.push('\n');
    }
    Ok(out)
}

pub fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String, QdbError> {
    serde_json::to_string_pretty(value)
        .map(|s| format!("{s}\n"))
        .map_err(|e| QdbError::Format {
            message: e.to_string(),
        })
}

/// Cell text: strings unquoted, null empty, everything else as JSON.
pub fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// RFC 4180 CSV with a header row (omitted when column names are absent).
pub fn to_csv(rows: &RowSet) -> Result<String, QdbError> {
    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::CRLF)
        .from_writer(Vec::new());
    let format_err = |e: csv::Error| QdbError::Format {
        message: e.to_string(),
    };

    if !rows.columns.is_empty() {
        writer
            .write_record(rows.columns.iter().map(|c| c.name.as_str()))
            .map_err(format_err)?;
    }
    for row in &rows.dataset {
        writer
            .write_record(row.iter().map(cell_text))
            .map_err(format_err)?;
    }

    let bytes = writer.into_inner().map_err(|e| QdbError::Format {
        message: e.to_string(),
    })?;
    String::from_utf8(bytes).map_err(|e| QdbError::Format {
        message: e.to_string(),
    })
}

/// Render rows as a text table.
pub fn to_table(rows: &RowSet, style: TableStyle) -> String {
    if rows.columns.is_empty() && rows.dataset.is_empty() {
        return String::new();
    }

    let mut builder = Builder::default();
    if !rows.columns.is_empty() {
        builder.push_record(rows.columns.iter().map(|c| c.name.clone()));
    }
    for row in &rows.dataset {
        builder.push_record(row.iter().map(cell_text));
    }

    let mut table = builder.build();
    style.apply(&mut table);
    format!("{table}\n")
}
