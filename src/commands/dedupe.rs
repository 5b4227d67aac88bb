use crate::batch::{Batch, ErrorPolicy};
use crate::cli::DedupeArgs;
use crate::client::{DryRunClient, ExecOptions, QuestDb};
use crate::commands::{Context, table_names};
use crate::dedupe::{self, DedupeAction};
use crate::error::{EXIT_SUCCESS, QdbError};
use crate::format;
use crate::interrupt::Interrupt;
use crate::output;

pub fn action(args: &DedupeArgs) -> DedupeAction {
    if args.enable {
        DedupeAction::Enable {
            upsert_keys: args.upsert_keys.clone(),
        }
    } else if args.disable {
        DedupeAction::Disable
    } else {
        DedupeAction::Check
    }
}

pub async fn run(ctx: &Context, args: &DedupeArgs) -> Result<i32, QdbError> {
    let names = table_names(&args.tables)?;
    let action = action(args);
    let policy = ErrorPolicy::from_flag(!args.no_stop_on_error);
    if ctx.dry_run {
        apply_all(&DryRunClient::new(), &names, &action, policy, &ctx.interrupt).await
    } else {
        apply_all(&ctx.client()?, &names, &action, policy, &ctx.interrupt).await
    }
}

async fn apply_all<Q: QuestDb>(
    db: &Q,
    names: &[String],
    action: &DedupeAction,
    policy: ErrorPolicy,
    interrupt: &Interrupt,
) -> Result<i32, QdbError> {
    let options = ExecOptions::default();
    let mut batch = Batch::new(policy, names.len());
    for name in names {
        let result = dedupe::apply(db, name, action, &options, interrupt).await;
        if let Some(outcome) = batch.record(name, result)? {
            output::print_result(&format::to_json(&outcome)?)?;
        }
    }
    batch.finish()?;
    Ok(EXIT_SUCCESS)
}
