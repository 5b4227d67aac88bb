use tracing::{info, warn};

use crate::batch::{Batch, ErrorPolicy};
use crate::cli::ExecArgs;
use crate::client::{DryRunClient, ExecOptions, FieldRef, QuestDb};
use crate::commands::{Context, read_sql};
use crate::error::{EXIT_SUCCESS, QdbError};
use crate::format::{self, OutputFormat};
use crate::interrupt::Interrupt;
use crate::output;
use crate::sql;

pub fn exec_options(args: &ExecArgs) -> ExecOptions {
    ExecOptions {
        limit: args.limit.clone(),
        count: args.count.then_some(true),
        nm: args.nm.then_some(true),
        timings: args.timings.then_some(true),
        explain: args.explain.then_some(true),
        quote_large_num: args.quote_large_num.then_some(true),
        statement_timeout_ms: args.statement_timeout,
    }
}

/// How each statement's result is printed.
#[derive(Debug, Clone)]
pub enum Rendering {
    Format(OutputFormat),
    Field(FieldRef),
}

impl Rendering {
    pub fn from_args(args: &ExecArgs) -> Self {
        match args.extract_field.as_deref() {
            Some(field) => Rendering::Field(FieldRef::parse(field)),
            None => Rendering::Format(OutputFormat::from_flags(
                args.one,
                args.csv,
                args.psql,
                args.markdown,
            )),
        }
    }
}

pub async fn run(ctx: &Context, args: &ExecArgs) -> Result<i32, QdbError> {
    let sql = read_sql(args.query.as_deref(), args.file.as_deref())?;
    let statements = sql::split_statements(&sql);
    if statements.is_empty() {
        warn!("no SQL statements found");
        return Ok(EXIT_SUCCESS);
    }
    info!("found {} statement(s)", statements.len());

    let options = exec_options(args);
    let rendering = Rendering::from_args(args);
    let policy = ErrorPolicy::from_flag(!args.no_stop_on_error);

    if ctx.dry_run {
        let db = DryRunClient::new();
        run_statements(&db, &statements, &options, &rendering, policy, &ctx.interrupt).await
    } else {
        let client = ctx.client()?;
        run_statements(&client, &statements, &options, &rendering, policy, &ctx.interrupt).await
    }
}

/// Execute statements in order, printing each result as it arrives.
pub async fn run_statements<Q: QuestDb>(
    db: &Q,
    statements: &[String],
    options: &ExecOptions,
    rendering: &Rendering,
    policy: ErrorPolicy,
    interrupt: &Interrupt,
) -> Result<i32, QdbError> {
    let total = statements.len();
    let mut batch = Batch::new(policy, total);

    for (i, statement) in statements.iter().enumerate() {
        let index = i + 1;
        interrupt.check()?;
        info!("executing statement {}/{}", index, total);

        let outcome = execute_one(db, statement, options, rendering).await;
        if let Err(e) = &outcome
            && !e.is_interrupt()
        {
            output::print_statement_error(index, e, statement)?;
        }
        if let Some(text) = batch.record(&format!("statement {index}"), outcome)? {
            output::print_result(&text)?;
        }
    }

    batch.finish()?;
    Ok(EXIT_SUCCESS)
}

async fn execute_one<Q: QuestDb>(
    db: &Q,
    statement: &str,
    options: &ExecOptions,
    rendering: &Rendering,
) -> Result<String, QdbError> {
    let response = db.exec(statement, options).await?;
    match (rendering, response.rows()) {
        (Rendering::Field(field), Some(rows)) => format::render_field(rows, field),
        (Rendering::Field(_), None) => format::to_json(&response.raw),
        (Rendering::Format(fmt), _) => format::render_exec(&response, *fmt),
    }
}
