use crate::cli::RenameArgs;
use crate::client::{DryRunClient, ExecOptions};
use crate::commands::Context;
use crate::error::{EXIT_SUCCESS, QdbError};
use crate::format;
use crate::output;
use crate::saga::{self, OriginalPolicy, RenameRequest};

pub fn rename_request(args: &RenameArgs) -> RenameRequest {
    RenameRequest {
        old_name: args.old_name.clone(),
        new_name: args.new_name.clone(),
        existing: if args.no_backup_if_new_exists {
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

pub async fn run(ctx: &Context, args: &RenameArgs) -> Result<i32, QdbError> {
    let request = rename_request(args);
    let report = if ctx.dry_run {
        let db = DryRunClient::assuming([&args.old_name, &args.new_name]);
        saga::rename_table(&db, &request, &ctx.interrupt).await?
    } else {
        saga::rename_table(&ctx.client()?, &request, &ctx.interrupt).await?
    };
    output::print_result(&format::to_json(&report)?)?;
    Ok(EXIT_SUCCESS)
}
