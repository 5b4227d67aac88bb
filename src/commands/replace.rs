use crate::cli::ReplaceArgs;
use crate::client::{DryRunClient, ExecOptions};
use crate::commands::{Context, read_sql};
use crate::error::{EXIT_SUCCESS, QdbError};
use crate::format;
use crate::output;
use crate::saga::{self, OriginalPolicy, ReplaceRequest};

pub fn replace_request(args: &ReplaceArgs, query: String) -> ReplaceRequest {
    ReplaceRequest {
        target: args.table.clone(),
        query,
        timestamp: args.timestamp.clone(),
        partition_by: args.partition_by,
        upsert_keys: args.upsert_keys.clone(),
        original: if args.no_backup_original_table {
            OriginalPolicy::Drop
        } else {
            OriginalPolicy::Backup {
                name: args.backup_table_name.clone(),
            }
        },
        exec_options: ExecOptions {
            statement_timeout_ms: args.statement_timeout,
            ..ExecOptions::default()
        },
    }
}

pub async fn run(ctx: &Context, args: &ReplaceArgs) -> Result<i32, QdbError> {
    let query = read_sql(args.query.as_deref(), args.file.as_deref())?;
    let request = replace_request(args, query);
    let report = if ctx.dry_run {
        let db = DryRunClient::assuming([&args.table]);
        saga::create_or_replace_table(&db, &request, &ctx.interrupt).await?
    } else {
        saga::create_or_replace_table(&ctx.client()?, &request, &ctx.interrupt).await?
    };
    output::print_result(&format::to_json(&report)?)?;
    Ok(EXIT_SUCCESS)
}
