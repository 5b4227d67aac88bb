use std::path::Path;

use tracing::info;

use crate::batch::{Batch, ErrorPolicy};
use crate::cli::{ImpArgs, NameFunc};
use crate::client::dry_run::simulate_import;
use crate::client::{ImportOptions, ImportResponse, ImportSource, RestClient};
use crate::commands::Context;
use crate::error::{EXIT_SUCCESS, QdbError};
use crate::format;
use crate::output;

/// Table name for one file: `--name` wins, else the naming function.
pub fn derive_table_name(
    path: &Path,
    name: Option<&str>,
    func: NameFunc,
    prefix: &str,
) -> Result<String, QdbError> {
    if let Some(name) = name.filter(|n| !n.is_empty()) {
        return Ok(name.to_string());
    }
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            QdbError::precondition(format!(
                "cannot derive a table name from '{}'",
                path.display()
            ))
        })?;
    Ok(match func {
        NameFunc::Stem => stem.to_string(),
        NameFunc::AddPrefix => format!("{prefix}{stem}"),
    })
}

pub fn import_options(args: &ImpArgs, table_name: String) -> ImportOptions {
    ImportOptions {
        table_name,
        partition_by: args.partition_by,
        timestamp: args.timestamp.clone(),
        overwrite: args.overwrite.then_some(true),
        atomicity: args.atomicity,
        delimiter: args.delimiter.clone(),
        force_header: args.force_header.then_some(true),
        skip_lev: args.skip_lev.then_some(true),
        fmt: args.fmt,
        o3_max_lag: args.o3_max_lag,
        max_uncommitted_rows: args.max_uncommitted_rows,
        create: Some(!args.no_create),
    }
}

fn load_schema(args: &ImpArgs) -> Result<Option<String>, QdbError> {
    if let Some(schema) = &args.schema {
        return Ok(Some(schema.clone()));
    }
    match &args.schema_file {
        Some(path) => std::fs::read_to_string(path).map(Some).map_err(|e| {
            QdbError::Io(std::io::Error::new(
                e.kind(),
                format!("cannot read schema file {}: {}", path.display(), e),
            ))
        }),
        None => Ok(None),
    }
}

pub async fn run(ctx: &Context, args: &ImpArgs) -> Result<i32, QdbError> {
    let schema = load_schema(args)?;
    let client = if ctx.dry_run { None } else { Some(ctx.client()?) };
    let mut batch = Batch::new(ErrorPolicy::from_flag(!args.no_stop_on_error), args.files.len());

    for (i, path) in args.files.iter().enumerate() {
        ctx.interrupt.check()?;
        info!("processing file {}/{}: {}", i + 1, args.files.len(), path.display());
        let result = import_file(client.as_ref(), args, path, schema.as_deref()).await;
        batch.record(&path.display().to_string(), result)?;
    }

    batch.finish()?;
    Ok(EXIT_SUCCESS)
}

async fn import_file(
    client: Option<&RestClient>,
    args: &ImpArgs,
    path: &Path,
    schema: Option<&str>,
) -> Result<(), QdbError> {
    let table_name = derive_table_name(
        path,
        args.name.as_deref(),
        args.name_func.unwrap_or_default(),
        &args.name_func_prefix,
    )?;
    let options = import_options(args, table_name);
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    let Some(client) = client else {
        output::print_result(&format::to_json(&simulate_import(&file_name, &options, schema))?)?;
        return Ok(());
    };

    let data = tokio::fs::read(path).await.map_err(|e| {
        QdbError::Io(std::io::Error::new(
            e.kind(),
            format!("cannot read {}: {}", path.display(), e),
        ))
    })?;
    let response = client
        .imp(
            ImportSource { file_name, data },
            schema.map(str::to_string),
            &options,
        )
        .await?;

    match &response {
        ImportResponse::Json(body) => output::print_result(&format::to_json(body)?)?,
        ImportResponse::Tabular(text) | ImportResponse::Unparsed(text) => {
            output::print_result(text)?;
            if !text.ends_with('\n') {
                output::print_result("\n")?;
            }
        }
    }

    match response.failure_reason() {
        Some(reason) => Err(QdbError::Response {
            message: format!(
                "import of '{}' into '{}' failed: {}",
                path.display(),
                options.table_name,
                reason
            ),
        }),
        None => {
            info!("imported '{}' into '{}'", path.display(), options.table_name);
            Ok(())
        }
    }
}
