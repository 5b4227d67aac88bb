use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::client::{Atomicity, ImportFormat};
use crate::sql::PartitionBy;

#[derive(Parser, Debug)]
#[command(
    name = "qdb-cli",
    version,
    about = "QuestDB REST API command line interface",
    long_about = "QuestDB REST API command line interface.\n\
                  Logs go to stderr, data goes to stdout.\n\n\
                  Connection settings come from flags, then QDB_HOST, QDB_PORT, QDB_USER, \
                  QDB_PASSWORD, QDB_TIMEOUT and QDB_SCHEME, then the config file \
                  (~/.questdb-rest/config.json), then defaults."
)]
pub struct Cli {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    /// Path to a JSON config file (default: ~/.questdb-rest/config.json)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Only log warnings and errors
    #[arg(short = 'W', long, global = true, conflicts_with = "debug")]
    pub warning: bool,

    /// Log debug output, including request timings
    #[arg(short = 'D', long, global = true)]
    pub debug: bool,

    /// Log what would be sent without contacting the server
    #[arg(short = 'R', long, global = true)]
    pub dry_run: bool,

    /// Disable credential masking in diagnostics
    #[arg(long, global = true)]
    pub show_secrets: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Connection flags. Unset values fall through to env, file and defaults.
#[derive(Args, Debug, Clone, Default)]
pub struct ConnectionArgs {
    /// QuestDB server host
    #[arg(short = 'H', long, global = true)]
    pub host: Option<String>,

    /// QuestDB REST API port
    #[arg(long, global = true)]
    pub port: Option<u16>,

    /// Username for basic authentication
    #[arg(short = 'u', long, global = true)]
    pub user: Option<String>,

    /// Password for basic authentication (prompted for when a user is set without one)
    #[arg(long, global = true)]
    pub password: Option<String>,

    /// Request timeout in seconds
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    /// URL scheme: http or https
    #[arg(long, global = true)]
    pub scheme: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Execute SQL statement(s) using /exec
    Exec(ExecArgs),

    /// Import file(s) using /imp
    Imp(ImpArgs),

    /// Export query results as CSV using /exp
    Exp(ExpArgs),

    /// Check whether a table exists using /chk (exit 3 if it does not)
    Chk(ChkArgs),

    /// Print CREATE TABLE statements
    Schema(TablesArgs),

    /// Rename a table, backing up any table that already has the new name
    Rename(RenameArgs),

    /// Drop one or more tables
    Drop(TablesArgs),

    /// Enable, disable or check deduplication on WAL tables
    Dedupe(DedupeArgs),

    /// Replace a table's contents with a query result via a temporary table
    #[command(name = "create-or-replace-table-from-query", visible_alias = "cor")]
    CreateOrReplaceTableFromQuery(ReplaceArgs),

    /// Write a default config file
    #[command(name = "gen-config")]
    GenConfig,
}

#[derive(Args, Debug, Clone, Default)]
pub struct ExecArgs {
    /// SQL to execute; several statements may be separated by ';'
    #[arg(short = 'q', long, conflicts_with = "file")]
    pub query: Option<String>,

    /// Read SQL from a file (stdin is used when neither -q nor -f is given)
    #[arg(short = 'f', long)]
    pub file: Option<PathBuf>,

    /// Limit results, e.g. "10" or "10,20"; applies per statement
    #[arg(short = 'l', long)]
    pub limit: Option<String>,

    /// Include the row count
    #[arg(short = 'C', long)]
    pub count: bool,

    /// Skip column metadata
    #[arg(long)]
    pub nm: bool,

    /// Include execution timings
    #[arg(short = 'T', long)]
    pub timings: bool,

    /// Include the execution plan
    #[arg(short = 'E', long)]
    pub explain: bool,

    /// Return LONG numbers as quoted strings
    #[arg(short = 'Q', long = "quoteLargeNum")]
    pub quote_large_num: bool,

    /// Per-statement timeout in milliseconds
    #[arg(long)]
    pub statement_timeout: Option<u64>,

    /// Keep going after a failed statement and exit 2 at the end
    #[arg(long)]
    pub no_stop_on_error: bool,

    /// Print only the first cell of the first row
    #[arg(short = 'o', long, group = "exec_format")]
    pub one: bool,

    /// Print results as a Markdown table
    #[arg(short = 'm', long, group = "exec_format")]
    pub markdown: bool,

    /// Print results as a psql-style table
    #[arg(short = 'p', long, group = "exec_format")]
    pub psql: bool,

    /// Print results as CSV
    #[arg(long, group = "exec_format")]
    pub csv: bool,

    /// Print the values of one column (name or 0-based index), one per line
    #[arg(short = 'x', long, group = "exec_format")]
    pub extract_field: Option<String>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum NameFunc {
    /// File name without extension
    #[default]
    Stem,
    /// --name-func-prefix followed by the stem
    AddPrefix,
}

#[derive(Args, Debug, Clone, Default)]
pub struct ImpArgs {
    /// Data file(s) to import
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Table name for all files (overrides --name-func)
    #[arg(short = 'n', long)]
    pub name: Option<String>,

    /// How to derive the table name from the file name
    #[arg(long, value_enum)]
    pub name_func: Option<NameFunc>,

    /// Prefix for --name-func add-prefix
    #[arg(long, default_value = "")]
    pub name_func_prefix: String,

    /// JSON schema string applied to all files
    #[arg(short = 's', long, conflicts_with = "schema_file")]
    pub schema: Option<String>,

    /// JSON schema file applied to all files
    #[arg(long)]
    pub schema_file: Option<PathBuf>,

    /// Partitioning when the table is created
    #[arg(short = 'P', long = "partitionBy", value_enum, ignore_case = true)]
    pub partition_by: Option<PartitionBy>,

    /// Designated timestamp column when the table is created
    #[arg(short = 't', long)]
    pub timestamp: Option<String>,

    /// Overwrite existing table data and structure
    #[arg(short = 'o', long)]
    pub overwrite: bool,

    /// Behaviour on data errors
    #[arg(short = 'a', long, value_enum, default_value = "skipCol")]
    pub atomicity: Option<Atomicity>,

    /// CSV delimiter
    #[arg(short = 'd', long)]
    pub delimiter: Option<String>,

    /// Treat the first line as a header
    #[arg(short = 'F', long = "forceHeader")]
    pub force_header: bool,

    /// Skip extra values on a line
    #[arg(short = 'S', long = "skipLev")]
    pub skip_lev: bool,

    /// Response format
    #[arg(long, value_enum, default_value = "tabular")]
    pub fmt: ImportFormat,

    /// O3 max lag in microseconds, when the table is created
    #[arg(short = 'O', long = "o3MaxLag")]
    pub o3_max_lag: Option<u64>,

    /// Max uncommitted rows, when the table is created
    #[arg(short = 'M', long = "maxUncommittedRows")]
    pub max_uncommitted_rows: Option<u64>,

    /// Do not create the table if it does not exist
    #[arg(long)]
    pub no_create: bool,

    /// Keep going after a failed file and exit 2 at the end
    #[arg(long)]
    pub no_stop_on_error: bool,
}

#[derive(Args, Debug, Clone, Default)]
pub struct ExpArgs {
    /// Query whose result is exported
    pub query: String,

    /// Limit results, e.g. "10", "10,20" or "-20"
    #[arg(short = 'l', long)]
    pub limit: Option<String>,

    /// Skip the header row
    #[arg(long)]
    pub nm: bool,

    /// Write the CSV to this file instead of stdout
    #[arg(short = 'o', long)]
    pub output_file: Option<PathBuf>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct ChkArgs {
    /// Table to check
    pub table_name: String,
}

/// Shared by `schema` and `drop`.
#[derive(Args, Debug, Clone, Default)]
pub struct TablesArgs {
    /// Table name(s); read from stdin, one per line, when omitted
    pub tables: Vec<String>,

    /// Keep going after a failed table and exit 2 at the end
    #[arg(long)]
    pub no_stop_on_error: bool,
}

#[derive(Args, Debug, Clone, Default)]
pub struct RenameArgs {
    /// Current table name
    pub old_name: String,

    /// New table name
    pub new_name: String,

    /// Drop a table that already has the new name instead of backing it up
    #[arg(long)]
    pub no_backup_if_new_exists: bool,

    /// Backup name for an existing table with the new name (default: generated)
    #[arg(long, conflicts_with = "no_backup_if_new_exists")]
    pub backup_table_name: Option<String>,

    /// Per-statement timeout in milliseconds
    #[arg(long)]
    pub statement_timeout: Option<u64>,
}

#[derive(Args, Debug, Clone, Default)]
#[command(group(clap::ArgGroup::new("dedupe_action").args(["enable", "disable", "check"])))]
pub struct DedupeArgs {
    /// Table name(s); read from stdin, one per line, when omitted
    pub tables: Vec<String>,

    /// Enable deduplication (requires --upsert-keys)
    #[arg(long, requires = "upsert_keys")]
    pub enable: bool,

    /// Disable deduplication
    #[arg(long)]
    pub disable: bool,

    /// Show current deduplication settings (the default)
    #[arg(long)]
    pub check: bool,

    /// Upsert key columns; must include the designated timestamp
    #[arg(short = 'k', long, value_delimiter = ',', num_args = 1..)]
    pub upsert_keys: Vec<String>,

    /// Keep going after a failed table and exit 2 at the end
    #[arg(long)]
    pub no_stop_on_error: bool,
}

#[derive(Args, Debug, Clone, Default)]
pub struct ReplaceArgs {
    /// Table to create or replace
    pub table: String,

    /// Query producing the new contents (read from -f or stdin when omitted)
    pub query: Option<String>,

    /// Read the query from a file
    #[arg(short = 'f', long, conflicts_with = "query")]
    pub file: Option<PathBuf>,

    /// Designated timestamp column of the new table
    #[arg(short = 't', long)]
    pub timestamp: Option<String>,

    /// Partitioning of the new table
    #[arg(short = 'P', long, value_enum, ignore_case = true)]
    pub partition_by: Option<PartitionBy>,

    /// Upsert key columns for deduplication; must include --timestamp
    #[arg(short = 'k', long, value_delimiter = ',', num_args = 1..)]
    pub upsert_keys: Vec<String>,

    /// Drop the existing table instead of backing it up
    #[arg(long)]
    pub no_backup_original_table: bool,

    /// Backup name for the existing table (default: generated)
    #[arg(long, conflicts_with = "no_backup_original_table")]
    pub backup_table_name: Option<String>,

    /// Per-statement timeout in milliseconds
    #[arg(long)]
    pub statement_timeout: Option<u64>,
}
