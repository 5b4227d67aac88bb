use clap::Parser;
use qdb_rest::cli::Cli;
use qdb_rest::interrupt::Interrupt;
use qdb_rest::logging::{self, LogLevel, Timer};
use qdb_rest::{commands, output};
use std::process;
use tracing::debug;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Load .env file (optional, ignore if missing)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    logging::init(LogLevel::from_flags(cli.warning, cli.debug));

    let timer = Timer::start();
    let interrupt = Interrupt::listen();
    let code = match commands::run(cli, interrupt).await {
        Ok(code) => code,
        Err(err) if err.is_broken_pipe() => {
            debug!("stdout closed, stopping");
            err.exit_code()
        }
        Err(err) => {
            output::print_error(&err);
            err.exit_code()
        }
    };
    debug!("finished with exit code {} in {}ms", code, timer.elapsed_ms());
    process::exit(code);
}
