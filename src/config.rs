use crate::cli::ConnectionArgs;
use crate::error::QdbError;
use crate::masking::describe_credentials;
use directories::BaseDirs;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 9000;
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_SCHEME: &str = "http";

/// Everything needed to reach one QuestDB server.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    pub scheme: String,
    pub user: Option<String>,
    pub password: Option<SecretString>,
    pub timeout_secs: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            scheme: DEFAULT_SCHEME.to_string(),
            user: None,
            password: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl ConnectionConfig {
    pub fn base_url(&self) -> String {
        format!("{}://{}:{}", self.scheme, self.host, self.port)
    }

    /// A user without a password means we have to ask for one.
    pub fn needs_password(&self) -> bool {
        self.user.is_some() && self.password.is_none()
    }

    pub fn describe(&self, show_secrets: bool) -> String {
        format!(
            "{} ({}, timeout {}s)",
            self.base_url(),
            describe_credentials(self.user.as_deref(), self.password.as_ref(), show_secrets),
            self.timeout_secs
        )
    }
}

// --- JSON config file ---

/// On-disk config, `~/.questdb-rest/config.json` by default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub timeout: Option<u64>,
    #[serde(default)]
    pub scheme: Option<String>,
}

impl ConfigFile {
    /// The file `gen-config` writes.
    pub fn template() -> Self {
        Self {
            host: Some(DEFAULT_HOST.to_string()),
            port: Some(DEFAULT_PORT),
            user: Some(String::new()),
            password: Some(String::new()),
            timeout: Some(DEFAULT_TIMEOUT_SECS),
            scheme: Some(DEFAULT_SCHEME.to_string()),
        }
    }
}

/// Config path resolution result; explicit paths must exist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConfigPath {
    pub path: PathBuf,
    /// true if given via --config or QDB_CONFIG
    pub explicit: bool,
}

pub fn default_config_path() -> Option<PathBuf> {
    BaseDirs::new().map(|dirs| dirs.home_dir().join(".questdb-rest").join("config.json"))
}

/// Resolve the config file path: --config flag > QDB_CONFIG > default.
pub fn resolve_config_path(cli_config: Option<&Path>) -> Option<ResolvedConfigPath> {
    if let Some(path) = cli_config {
        return Some(ResolvedConfigPath {
            path: path.to_path_buf(),
            explicit: true,
        });
    }
    if let Some(path) = env_non_empty("QDB_CONFIG") {
        return Some(ResolvedConfigPath {
            path: PathBuf::from(path),
            explicit: true,
        });
    }
    default_config_path().map(|path| ResolvedConfigPath {
        path,
        explicit: false,
    })
}

/// Load the config file. A missing or broken file at the default location is
/// not an error; at an explicit location it is.
pub fn load_config_file(resolved: Option<&ResolvedConfigPath>) -> Result<ConfigFile, QdbError> {
    let Some(resolved) = resolved else {
        return Ok(ConfigFile::default());
    };

    if !resolved.path.exists() {
        if resolved.explicit {
            return Err(QdbError::config(format!(
                "config file not found: {}",
                resolved.path.display()
            )));
        }
        return Ok(ConfigFile::default());
    }

    let parsed = std::fs::read_to_string(&resolved.path)
        .map_err(|e| format!("cannot read config file {}: {}", resolved.path.display(), e))
        .and_then(|content| {
            serde_json::from_str::<ConfigFile>(&content)
                .map_err(|e| format!("invalid config file {}: {}", resolved.path.display(), e))
        });

    match parsed {
        Ok(file) => Ok(file),
        Err(message) if resolved.explicit => Err(QdbError::config(message)),
        Err(message) => {
            warn!("{message}, ignoring it");
            Ok(ConfigFile::default())
        }
    }
}

/// Treat empty strings as unset.
pub fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

/// Read an env var, treating empty values as unset.
pub fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_parsed<T: std::str::FromStr>(key: &str) -> Result<Option<T>, QdbError> {
    match env_non_empty(key) {
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| QdbError::config(format!("invalid value for {key}: '{raw}'"))),
        None => Ok(None),
    }
}

/// Merge the layers: CLI flag > QDB_* env var > config file > default.
pub fn resolve(args: &ConnectionArgs, file: &ConfigFile) -> Result<ConnectionConfig, QdbError> {
    let host = non_empty(args.host.as_deref())
        .map(str::to_string)
        .or_else(|| env_non_empty("QDB_HOST"))
        .or_else(|| non_empty(file.host.as_deref()).map(str::to_string))
        .unwrap_or_else(|| DEFAULT_HOST.to_string());

    let port = match args.port {
        Some(port) => port,
        None => env_parsed::<u16>("QDB_PORT")?
            .or(file.port)
            .unwrap_or(DEFAULT_PORT),
    };

    let timeout_secs = match args.timeout {
        Some(timeout) => timeout,
        None => env_parsed::<u64>("QDB_TIMEOUT")?
            .or(file.timeout)
            .unwrap_or(DEFAULT_TIMEOUT_SECS),
    };

    let scheme = non_empty(args.scheme.as_deref())
        .map(str::to_string)
        .or_else(|| env_non_empty("QDB_SCHEME"))
        .or_else(|| non_empty(file.scheme.as_deref()).map(str::to_string))
        .unwrap_or_else(|| DEFAULT_SCHEME.to_string())
        .to_ascii_lowercase();

    let user = non_empty(args.user.as_deref())
        .map(str::to_string)
        .or_else(|| env_non_empty("QDB_USER"))
        .or_else(|| non_empty(file.user.as_deref()).map(str::to_string));

    let password = non_empty(args.password.as_deref())
        .map(str::to_string)
        .or_else(|| env_non_empty("QDB_PASSWORD"))
        .or_else(|| non_empty(file.password.as_deref()).map(str::to_string))
        .map(SecretString::from);

    let config = ConnectionConfig {
        host,
        port,
        scheme,
        user,
        password,
        timeout_secs,
    };
    validate(&config)?;
    Ok(config)
}

fn validate(config: &ConnectionConfig) -> Result<(), QdbError> {
    if config.host.trim().is_empty() {
        return Err(QdbError::config("host must not be empty"));
    }
    if config.port == 0 {
        return Err(QdbError::config("port must be between 1 and 65535"));
    }
    if config.timeout_secs == 0 {
        return Err(QdbError::config("timeout must be at least 1 second"));
    }
    if config.scheme != "http" && config.scheme != "https" {
        return Err(QdbError::config(format!(
            "unsupported scheme '{}' (expected 'http' or 'https')",
            config.scheme
        )));
    }
    Ok(())
}

/// Build the connection config from CLI args, env and the config file.
pub fn load(args: &ConnectionArgs, config_path: Option<&Path>) -> Result<ConnectionConfig, QdbError> {
    let resolved = resolve_config_path(config_path);
    let file = load_config_file(resolved.as_ref())?;
    resolve(args, &file)
}

/// Ask for the password on the terminal. An empty answer is an error.
pub fn prompt_password(config: &mut ConnectionConfig) -> Result<(), QdbError> {
    let Some(user) = config.user.as_deref() else {
        return Ok(());
    };
    let answer = rpassword::prompt_password(format!("Password for user '{user}': "))
        .map_err(|e| QdbError::config(format!("could not read password: {e}")))?;
    if answer.is_empty() {
        return Err(QdbError::config(format!(
            "password required for user '{user}' but none was provided"
        )));
    }
    config.password = Some(SecretString::from(answer));
    Ok(())
}

/// Write the default config file, replacing any existing one.
pub fn write_default_config(path: &Path) -> Result<(), QdbError> {
    if let Some(dir) = path.parent()
        && !dir.as_os_str().is_empty()
    {
        std::fs::create_dir_all(dir)?;
    }
    let content = serde_json::to_string_pretty(&ConfigFile::template()).map_err(|e| {
        QdbError::Format {
            message: format!("cannot serialize config: {e}"),
        }
    })?;
    std::fs::write(path, format!("{content}\n"))?;
    info!("default config file written to {}", path.display());
    Ok(())
}
