use crate::batch::{Batch, ErrorPolicy};
use crate::cli::TablesArgs;
use crate::client::{DryRunClient, ExecOptions, QuestDb};
use crate::commands::{Context, table_names};
use crate::error::{EXIT_SUCCESS, QdbError};
use crate::format;
use crate::interrupt::Interrupt;
use crate::output;
use crate::sql;
use crate::tables;

pub async fn schema(ctx: &Context, args: &TablesArgs) -> Result<i32, QdbError> {
    let names = table_names(&args.tables)?;
    let policy = ErrorPolicy::from_flag(!args.no_stop_on_error);
    if ctx.dry_run {
        print_schemas(&DryRunClient::new(), &names, policy, &ctx.interrupt).await
    } else {
        print_schemas(&ctx.client()?, &names, policy, &ctx.interrupt).await
    }
}

/// Print each table's DDL, terminated with `;`.
pub async fn print_schemas<Q: QuestDb>(
    db: &Q,
    names: &[String],
    policy: ErrorPolicy,
    interrupt: &Interrupt,
) -> Result<i32, QdbError> {
    let options = ExecOptions::default();
    let mut batch = Batch::new(policy, names.len());
    for name in names {
        let result = tables::show_create_table(db, name, &options, interrupt).await;
        if let Some(ddl) = batch.record(name, result)? {
            let text = ddl.unwrap_or_else(|| format!("-- dry run: {}", sql::show_create_table(name)));
            let text = text.trim_end();
            if text.ends_with(';') || text.starts_with("--") {
                output::print_result(&format!("{text}\n"))?;
            } else {
                output::print_result(&format!("{text};\n"))?;
            }
        }
    }
    batch.finish()?;
    Ok(EXIT_SUCCESS)
}

pub async fn drop(ctx: &Context, args: &TablesArgs) -> Result<i32, QdbError> {
    let names = table_names(&args.tables)?;
    let policy = ErrorPolicy::from_flag(!args.no_stop_on_error);
    if ctx.dry_run {
        drop_all(&DryRunClient::new(), &names, policy, &ctx.interrupt).await
    } else {
        drop_all(&ctx.client()?, &names, policy, &ctx.interrupt).await
    }
}

pub async fn drop_all<Q: QuestDb>(
    db: &Q,
    names: &[String],
    policy: ErrorPolicy,
    interrupt: &Interrupt,
) -> Result<i32, QdbError> {
    let options = ExecOptions::default();
    let mut batch = Batch::new(policy, names.len());
    for name in names {
        let result = tables::drop_table(db, name, &options, interrupt).await;
        if let Some(report) = batch.record(name, result)? {
            output::print_result(&format::to_json(&report)?)?;
        }
    }
    batch.finish()?;
    Ok(EXIT_SUCCESS)
}
