//! SQL text builders, identifier quoting, and statement splitting.
//!
//! Every identifier that reaches a statement goes through [`quote_ident`].

use std::fmt;

use clap::ValueEnum;
use sqlparser::dialect::GenericDialect;
use sqlparser::tokenizer::{Location, Token, TokenWithLocation, Tokenizer};
use tracing::warn;
use uuid::Uuid;

use crate::error::QdbError;

/// QuestDB rejects table names longer than this.
pub const MAX_TABLE_NAME_LEN: usize = 127;

const TEMP_PREFIX: &str = "__cli_temp_";
const BACKUP_PREFIX: &str = "__qdb_cli_backup_";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "UPPER")]
pub enum PartitionBy {
    None,
    Year,
    Month,
    Week,
    Day,
    Hour,
}

impl fmt::Display for PartitionBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PartitionBy::None => "NONE",
            PartitionBy::Year => "YEAR",
            PartitionBy::Month => "MONTH",
            PartitionBy::Week => "WEEK",
            PartitionBy::Day => "DAY",
            PartitionBy::Hour => "HOUR",
        };
        f.write_str(s)
    }
}

/// Double-quote an identifier, doubling embedded quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Single-quote a string literal, doubling embedded quotes.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn quote_list(names: &[String]) -> String {
    names
        .iter()
        .map(|n| quote_ident(n))
        .collect::<Vec<_>>()
        .join(", ")
}

/// `__cli_temp_<target>_<uuid>`, capped to the server's name limit.
pub fn temp_table_name(target: &str) -> String {
    unique_name(TEMP_PREFIX, target)
}

/// Default backup name for `target`. Carries a fresh UUID so repeated runs
/// never collide.
pub fn backup_table_name(target: &str) -> String {
    unique_name(BACKUP_PREFIX, target)
}

/// The target part is truncated (on a char boundary) so the unique suffix is
/// always kept whole.
fn unique_name(prefix: &str, target: &str) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    let budget = MAX_TABLE_NAME_LEN.saturating_sub(prefix.len() + 1 + suffix.len());
    let mut end = target.len().min(budget);
    while !target.is_char_boundary(end) {
        end -= 1;
    }
    format!("{prefix}{}_{suffix}", &target[..end])
}

/// Pieces of a `CREATE TABLE ... AS (...)` statement.
#[derive(Debug, Clone, Copy)]
pub struct CreateTableAs<'a> {
    pub table: &'a str,
    pub query: &'a str,
    pub timestamp: Option<&'a str>,
    pub partition_by: Option<PartitionBy>,
    pub upsert_keys: &'a [String],
}

/// Render the statement. The WAL clause is left to the server default.
pub fn create_table_as(stmt: &CreateTableAs<'_>) -> String {
    let mut sql = format!(
        "CREATE TABLE {} AS ({})",
        quote_ident(stmt.table),
        trim_statement(stmt.query)
    );
    if let Some(ts) = stmt.timestamp {
        sql.push_str(&format!(" TIMESTAMP({})", quote_ident(ts)));
    }
    if let Some(partition) = stmt.partition_by {
        sql.push_str(&format!(" PARTITION BY {partition}"));
    }
    if !stmt.upsert_keys.is_empty() {
        sql.push_str(&format!(
            " DEDUP UPSERT KEYS({})",
            quote_list(stmt.upsert_keys)
        ));
    }
    sql
}

pub fn rename_table(from: &str, to: &str) -> String {
    format!("RENAME TABLE {} TO {}", quote_ident(from), quote_ident(to))
}

pub fn drop_table(table: &str) -> String {
    format!("DROP TABLE {}", quote_ident(table))
}

pub fn show_create_table(table: &str) -> String {
    format!("SHOW CREATE TABLE {}", quote_ident(table))
}

pub fn dedup_enable(table: &str, upsert_keys: &[String]) -> String {
    format!(
        "ALTER TABLE {} DEDUP ENABLE UPSERT KEYS({})",
        quote_ident(table),
        quote_list(upsert_keys)
    )
}

pub fn dedup_disable(table: &str) -> String {
    format!("ALTER TABLE {} DEDUP DISABLE", quote_ident(table))
}

/// One row: `designatedTimestamp`, `dedup` from the `tables()` catalog.
pub fn table_dedup_status(table: &str) -> String {
    format!(
        "SELECT designatedTimestamp, dedup FROM tables() WHERE table_name = {}",
        quote_literal(table)
    )
}

/// Upsert key column names of `table`.
pub fn table_upsert_keys(table: &str) -> String {
    format!(
        "SELECT \"column\" FROM table_columns({}) WHERE upsertKey = true",
        quote_literal(table)
    )
}

/// Strip trailing semicolons and whitespace so the query can be embedded.
fn trim_statement(query: &str) -> &str {
    query.trim().trim_end_matches(|c: char| c == ';' || c.is_whitespace())
}

/// Deduplication requires the designated timestamp among the upsert keys.
/// Checked before any request goes out.
pub fn check_upsert_keys(timestamp: Option<&str>, upsert_keys: &[String]) -> Result<(), QdbError> {
    if upsert_keys.is_empty() {
        return Ok(());
    }
    let Some(ts) = timestamp else {
        return Err(QdbError::precondition(
            "upsert keys require a designated timestamp column (--timestamp)",
        ));
    };
    ensure_timestamp_in_keys(ts, upsert_keys)
}

/// Column names compare case-insensitively, as QuestDB does.
pub fn ensure_timestamp_in_keys(timestamp: &str, upsert_keys: &[String]) -> Result<(), QdbError> {
    if upsert_keys.iter().any(|k| k.eq_ignore_ascii_case(timestamp)) {
        Ok(())
    } else {
        Err(QdbError::precondition(format!(
            "designated timestamp column '{}' must be included in upsert keys ({})",
            timestamp,
            upsert_keys.join(", ")
        )))
    }
}

/// Find the designated timestamp in `SHOW CREATE TABLE` output: the
/// `timestamp(col)` clause that follows the column list.
pub fn designated_timestamp(create_statement: &str) -> Option<String> {
    let dialect = GenericDialect {};
    let tokens = Tokenizer::new(&dialect, create_statement).tokenize().ok()?;
    let significant: Vec<&Token> = tokens
        .iter()
        .filter(|t| !matches!(t, Token::Whitespace(_)))
        .collect();

    significant.windows(5).find_map(|w| match w {
        [Token::RParen, Token::Word(kw), Token::LParen, column, Token::RParen]
            if kw.quote_style.is_none() && kw.value.eq_ignore_ascii_case("timestamp") =>
        {
            match column {
                Token::Word(word) => Some(word.value.clone()),
                Token::SingleQuotedString(s) => Some(s.clone()),
                _ => None,
            }
        }
        _ => None,
    })
}

/// Split a script into statements on top-level semicolons.
///
/// Semicolons inside string literals, quoted identifiers and comments do not
/// split. Pieces holding only whitespace or comments are dropped. If the text
/// cannot be tokenized, the whole trimmed input is returned as one statement.
pub fn split_statements(sql: &str) -> Vec<String> {
    let dialect = GenericDialect {};
    let tokens = match Tokenizer::new(&dialect, sql).tokenize_with_location() {
        Ok(tokens) => tokens,
        Err(e) => {
            warn!("could not tokenize SQL ({e}), sending it as a single statement");
            return whole(sql);
        }
    };

    let separators: Vec<Location> = tokens
        .iter()
        .filter(|t| t.token == Token::SemiColon)
        .map(|t| t.location.clone())
        .collect();
    let offsets = byte_offsets(sql, &separators);
    if offsets.len() != separators.len() {
        warn!("could not locate statement separators, sending SQL as a single statement");
        return whole(sql);
    }

    let mut statements = Vec::new();
    let mut start = 0;
    let mut content = false;
    let mut offset_iter = offsets.iter();
    for TokenWithLocation { token, .. } in &tokens {
        match token {
            Token::SemiColon => {
                let Some(&end) = offset_iter.next() else { break };
                if content {
                    push_trimmed(&mut statements, &sql[start..end]);
                }
                start = end + 1;
                content = false;
            }
            Token::Whitespace(_) => {}
            _ => content = true,
        }
    }
    if content {
        push_trimmed(&mut statements, &sql[start..]);
    }
    statements
}

fn whole(sql: &str) -> Vec<String> {
    let mut statements = Vec::new();
    push_trimmed(&mut statements, sql);
    statements
}

fn push_trimmed(statements: &mut Vec<String>, piece: &str) {
    let piece = piece.trim();
    if !piece.is_empty() {
        statements.push(piece.to_string());
    }
}

/// Map tokenizer locations (1-based line/column, counted in chars) to byte
/// offsets. `locations` must be in source order.
fn byte_offsets(sql: &str, locations: &[Location]) -> Vec<usize> {
    let mut offsets = Vec::with_capacity(locations.len());
    let mut wanted = locations.iter().peekable();
    let (mut line, mut column) = (1u64, 1u64);

    for (idx, ch) in sql.char_indices() {
        while let Some(loc) = wanted.peek() {
            if loc.line == line && loc.column == column {
                offsets.push(idx);
                wanted.next();
            } else {
                break;
            }
        }
        if wanted.peek().is_none() {
            break;
        }
        if ch == '\n' {
            line += 1;
            column = 1;
        } else {
            column += 1;
        }
    }
    offsets
}
