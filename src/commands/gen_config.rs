use std::path::Path;

use crate::config::{default_config_path, write_default_config};
use crate::error::{EXIT_SUCCESS, QdbError};
use crate::output;

/// Write the default config to `--config` or the standard location.
pub fn run(path: Option<&Path>) -> Result<i32, QdbError> {
    let target = match path {
        Some(p) => p.to_path_buf(),
        None => default_config_path()
            .ok_or_else(|| QdbError::config("cannot determine the home directory"))?,
    };
    write_default_config(&target)?;
    output::print_result(&format!(
        "Default config file generated at {}\n",
        target.display()
    ))?;
    Ok(EXIT_SUCCESS)
}
