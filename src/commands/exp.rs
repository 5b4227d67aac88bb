use tracing::info;

use crate::cli::ExpArgs;
use crate::client::ExportOptions;
use crate::client::dry_run::simulate_export;
use crate::commands::Context;
use crate::error::{EXIT_SUCCESS, QdbError};
use crate::output;

pub async fn run(ctx: &Context, args: &ExpArgs) -> Result<i32, QdbError> {
    let options = ExportOptions {
        limit: args.limit.clone(),
        nm: args.nm.then_some(true),
    };

    if ctx.dry_run {
        let csv = simulate_export(&args.query, &options);
        match &args.output_file {
            Some(path) => output::write_file(&csv, path)?,
            None => output::print_result(&csv)?,
        }
        return Ok(EXIT_SUCCESS);
    }

    let client = ctx.client()?;
    let stream = client.exp(&args.query, &options).await?;

    match &args.output_file {
        Some(path) => {
            let mut file = output::create_file(path)?;
            let bytes = stream.copy_to(&mut file).await?;
            info!("exported {} bytes to {}", bytes, path.display());
        }
        None => {
            let mut tail = output::TrailingNewline::new(std::io::stdout());
            let bytes = stream.copy_to(&mut tail).await?;
            tail.finish()?;
            info!("exported {} bytes to stdout", bytes);
        }
    }
    Ok(EXIT_SUCCESS)
}
