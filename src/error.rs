use thiserror::Error;

use crate::saga::SagaFailure;

pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILURE: i32 = 1;
pub const EXIT_PARTIAL: i32 = 2;
pub const EXIT_TABLE_MISSING: i32 = 3;
pub const EXIT_INTERRUPTED: i32 = 130;

#[derive(Debug, Error)]
pub enum QdbError {
    /// Server unreachable or the request timed out. Never retried.
    #[error("connection: {message}")]
    Connection { message: String },

    /// Non-2xx HTTP response.
    #[error("api: HTTP {status}: {message}")]
    Api {
        status: u16,
        message: String,
        body: Option<serde_json::Value>,
    },

    /// The server answered but reported a SQL-level error in the body.
    #[error("query: {message}")]
    Query {
        message: String,
        query: Option<String>,
        position: Option<i64>,
    },

    /// A query error that reads as "table does not exist". Best-effort: the
    /// classification relies on the server's message text.
    #[error("not found: {message}")]
    TableNotFound {
        table: Option<String>,
        message: String,
    },

    /// Client-side validation failed before anything was sent.
    #[error("precondition: {message}")]
    Precondition { message: String },

    #[error("request: {message}")]
    Request { message: String },

    #[error("response: {message}")]
    Response { message: String },

    #[error("config: {message}")]
    Config { message: String },

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("format: {message}")]
    Format { message: String },

    #[error("interrupted by user")]
    Interrupted,

    #[error("{0}")]
    Saga(Box<SagaFailure>),

    #[error("partial failure: {failed} of {total} item(s) failed")]
    Partial { failed: usize, total: usize },
}

impl QdbError {
    pub fn precondition(message: impl Into<String>) -> Self {
        QdbError::Precondition {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        QdbError::Config {
            message: message.into(),
        }
    }

    pub fn is_table_not_found(&self) -> bool {
        matches!(self, QdbError::TableNotFound { .. })
    }

    /// True for an interrupt, including one that aborted a saga.
    pub fn is_interrupt(&self) -> bool {
        match self {
            QdbError::Interrupted => true,
            QdbError::Saga(failure) => failure.cause.is_interrupt(),
            _ => false,
        }
    }

    /// stdout was closed by the reader (`| head`). Not a failure.
    pub fn is_broken_pipe(&self) -> bool {
        matches!(self, QdbError::Io(e) if e.kind() == std::io::ErrorKind::BrokenPipe)
    }

    pub fn exit_code(&self) -> i32 {
        if self.is_interrupt() {
            return EXIT_INTERRUPTED;
        }
        if self.is_broken_pipe() {
            return EXIT_SUCCESS;
        }
        match self {
            QdbError::Partial { .. } => EXIT_PARTIAL,
            _ => EXIT_FAILURE,
        }
    }
}

/// Turn an error body from `/exec` into a typed error. This is the only place
/// "table does not exist" messages are recognised.
pub fn classify_query_error(
    message: &str,
    query: Option<String>,
    position: Option<i64>,
) -> QdbError {
    let lower = message.to_ascii_lowercase();
    let not_found = lower.contains("table does not exist")
        || lower.contains("table not found")
        || (lower.contains("does not exist") && lower.contains("[table="));

    if not_found {
        QdbError::TableNotFound {
            table: table_from_message(message),
            message: message.to_string(),
        }
    } else {
        QdbError::Query {
            message: message.to_string(),
            query,
            position,
        }
    }
}

/// QuestDB tags messages with `[table=name]`.
fn table_from_message(message: &str) -> Option<String> {
    let start = message.find("[table=")? + "[table=".len();
    let rest = &message[start..];
    let end = rest.find(']')?;
    let name = rest[..end].trim();
    (!name.is_empty()).then(|| name.to_string())
}

