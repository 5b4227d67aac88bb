use serde_json::json;
use tracing::{error, info};

use crate::cli::ChkArgs;
use crate::client::dry_run::simulate_chk;
use crate::commands::Context;
use crate::error::{EXIT_SUCCESS, EXIT_TABLE_MISSING, QdbError};
use crate::format;
use crate::output;

/// Exit 0 when the table exists, 3 when it does not.
pub async fn run(ctx: &Context, args: &ChkArgs) -> Result<i32, QdbError> {
    let table = args.table_name.as_str();
    info!("checking whether table '{}' exists", table);

    if ctx.dry_run {
        output::print_result(&format::to_json(&simulate_chk(table))?)?;
        return Ok(EXIT_SUCCESS);
    }

    let client = ctx.client()?;
    match client.table_exists(table).await {
        Ok(exists) => {
            let status = if exists { "Exists" } else { "Does not exist" };
            info!("table '{}': {}", table, status);
            output::print_result(&format::to_json(
                &json!({ "tableName": table, "status": status }),
            )?)?;
            Ok(if exists { EXIT_SUCCESS } else { EXIT_TABLE_MISSING })
        }
        Err(e) => {
            error!("could not check table '{}': {}", table, e);
            // The check error decides the exit code, not a failed print.
            let _ = output::print_result(&format::to_json(
                &json!({ "tableName": table, "status": "Error", "detail": e.to_string() }),
            )?);
            Err(e)
        }
    }
}
