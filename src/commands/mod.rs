pub mod chk;
pub mod dedupe;
pub mod exec;
pub mod exp;
pub mod gen_config;
pub mod imp;
pub mod rename;
pub mod replace;
pub mod tables;

use std::io::{IsTerminal, Read};
use std::path::Path;

use tracing::{debug, info};

use crate::cli::{Cli, Command};
use crate::client::RestClient;
use crate::config::{self, ConnectionConfig};
use crate::error::QdbError;
use crate::interrupt::Interrupt;

/// What every handler gets: resolved settings, no ambient state.
pub struct Context {
    pub connection: ConnectionConfig,
    pub dry_run: bool,
    pub show_secrets: bool,
    pub interrupt: Interrupt,
}

impl Context {
    /// Build the live client. Never called in dry-run mode.
    pub fn client(&self) -> Result<RestClient, QdbError> {
        let client = RestClient::new(&self.connection)?;
        debug!("connecting to {}", self.connection.describe(self.show_secrets));
        Ok(client)
    }
}

/// Dispatch a parsed command line. Returns the process exit code.
pub async fn run(cli: Cli, interrupt: Interrupt) -> Result<i32, QdbError> {
    if let Command::GenConfig = cli.command {
        return gen_config::run(cli.config.as_deref());
    }

    let mut connection = config::load(&cli.connection, cli.config.as_deref())?;
    if connection.needs_password() {
        if cli.dry_run {
            info!("dry run: skipping password prompt");
        } else {
            config::prompt_password(&mut connection)?;
        }
    }
    info!("using {}", connection.describe(cli.show_secrets));
    if cli.dry_run {
        info!("dry run: no requests will be sent");
    }

    let ctx = Context {
        connection,
        dry_run: cli.dry_run,
        show_secrets: cli.show_secrets,
        interrupt,
    };

    match cli.command {
        Command::Exec(args) => exec::run(&ctx, &args).await,
        Command::Imp(args) => imp::run(&ctx, &args).await,
        Command::Exp(args) => exp::run(&ctx, &args).await,
        Command::Chk(args) => chk::run(&ctx, &args).await,
        Command::Schema(args) => tables::schema(&ctx, &args).await,
        Command::Drop(args) => tables::drop(&ctx, &args).await,
        Command::Rename(args) => rename::run(&ctx, &args).await,
        Command::Dedupe(args) => dedupe::run(&ctx, &args).await,
        Command::CreateOrReplaceTableFromQuery(args) => replace::run(&ctx, &args).await,
        Command::GenConfig => gen_config::run(cli.config.as_deref()),
    }
}

/// SQL from an inline value, a file, or piped stdin, in that order.
pub(crate) fn read_sql(inline: Option<&str>, file: Option<&Path>) -> Result<String, QdbError> {
    if let Some(sql) = inline {
        return Ok(sql.to_string());
    }
    if let Some(path) = file {
        return std::fs::read_to_string(path).map_err(|e| {
            QdbError::Io(std::io::Error::new(
                e.kind(),
                format!("cannot read SQL file {}: {}", path.display(), e),
            ))
        });
    }
    read_piped_stdin()?.ok_or_else(|| {
        QdbError::precondition("no SQL given: use --query, --file, or pipe it on stdin")
    })
}

/// Non-empty stdin, when it is not a terminal.
pub(crate) fn read_piped_stdin() -> Result<Option<String>, QdbError> {
    let stdin = std::io::stdin();
    if stdin.is_terminal() {
        return Ok(None);
    }
    let mut buf = String::new();
    stdin.lock().read_to_string(&mut buf)?;
    Ok((!buf.trim().is_empty()).then_some(buf))
}

/// Table names from the command line, or one per line on stdin.
pub(crate) fn table_names(from_args: &[String]) -> Result<Vec<String>, QdbError> {
    if !from_args.is_empty() {
        return Ok(from_args.to_vec());
    }
    let names: Vec<String> = read_piped_stdin()?
        .map(|text| {
            text.lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    if names.is_empty() {
        return Err(QdbError::precondition(
            "no table names given: pass them as arguments or on stdin",
        ));
    }
    Ok(names)
}
