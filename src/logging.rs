use std::time::Instant;

use tracing_subscriber::EnvFilter;

/// Log verbosity chosen on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Warning,
    #[default]
    Info,
    Debug,
}

impl LogLevel {
    pub fn from_flags(warning: bool, debug: bool) -> Self {
        if debug {
            LogLevel::Debug
        } else if warning {
            LogLevel::Warning
        } else {
            LogLevel::Info
        }
    }

    fn directive(self) -> &'static str {
        match self {
            LogLevel::Warning => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
        }
    }
}

/// Build the filter: base level plus quieter HTTP stack crates.
/// `RUST_LOG` wins when set.
fn build_filter(level: LogLevel) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }
    let noisy = ["hyper", "hyper_util", "reqwest", "rustls", "h2"];
    let mut directives = vec![level.directive().to_string()];
    directives.extend(noisy.iter().map(|target| format!("{target}=warn")));
    EnvFilter::new(directives.join(","))
}

/// Install the stderr subscriber. Data goes to stdout, so logs never do.
pub fn init(level: LogLevel) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(build_filter(level))
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .try_init();
}

/// Measures how long a request took, for debug logs.
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed_ms(&self) -> u128 {
        self.start.elapsed().as_millis()
    }
}

