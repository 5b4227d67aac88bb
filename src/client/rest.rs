use std::io::Write;
use std::time::Duration;

use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tracing::{debug, warn};

use crate::client::{
    ChkResponse, ExecOptions, ExecResponse, ExportOptions, FieldRef, ImportFormat, ImportOptions,
    ImportResponse, ImportSource, QuestDb, truncate,
};
use crate::config::ConnectionConfig;
use crate::error::{QdbError, classify_query_error};
use crate::logging::Timer;

/// HTTP client for the QuestDB REST endpoints `/exec`, `/imp`, `/exp` and
/// `/chk`. Requests are sent one at a time and never retried.
pub struct RestClient {
    base_url: String,
    user: Option<String>,
    password: Option<SecretString>,
    timeout_secs: u64,
    client: Client,
}

impl RestClient {
    pub fn new(config: &ConnectionConfig) -> Result<Self, QdbError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| QdbError::Request {
                message: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            base_url: config.base_url(),
            user: config.user.clone(),
            password: config.password.clone(),
            timeout_secs: config.timeout_secs,
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), endpoint)
    }

    /// Basic auth is attached only when a user is configured.
    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.user {
            Some(user) => request.basic_auth(
                user,
                Some(
                    self.password
                        .as_ref()
                        .map(|p| p.expose_secret().to_string())
                        .unwrap_or_default(),
                ),
            ),
            None => request,
        }
    }

    async fn send(&self, endpoint: &str, request: RequestBuilder) -> Result<Response, QdbError> {
        let timer = Timer::start();
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| self.transport_error(endpoint, e))?;
        debug!(
            "/{} -> HTTP {} in {}ms",
            endpoint,
            response.status().as_u16(),
            timer.elapsed_ms()
        );
        Ok(response)
    }

    fn transport_error(&self, endpoint: &str, e: reqwest::Error) -> QdbError {
        if e.is_timeout() {
            QdbError::Connection {
                message: format!(
                    "request to /{} timed out after {}s",
                    endpoint, self.timeout_secs
                ),
            }
        } else if e.is_connect() {
            QdbError::Connection {
                message: format!("could not connect to QuestDB at {}: {}", self.base_url, e),
            }
        } else {
            QdbError::Request {
                message: format!("request to /{endpoint} failed: {e}"),
            }
        }
    }

    async fn check_status(endpoint: &str, response: Response) -> Result<Response, QdbError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let text = response.text().await.unwrap_or_default();
        Err(api_error(endpoint, status, &text))
    }

    /// `/exec`. A body carrying `error` becomes `Query` or `TableNotFound`,
    /// whether it came with HTTP 200 or 400.
    pub async fn exec(&self, query: &str, options: &ExecOptions) -> Result<ExecResponse, QdbError> {
        debug!("/exec query: {}", query);
        let mut request = self
            .client
            .get(self.url("exec"))
            .query(&options.query_params(query));
        if let Some(ms) = options.statement_timeout_ms {
            request = request.header("Statement-Timeout", ms.to_string());
        }
        let response = self.send("exec", request).await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(exec_http_error(status, &text, query));
        }

        let text = response.text().await.map_err(|e| QdbError::Response {
            message: format!("failed to read /exec response: {e}"),
        })?;
        let body: Value = serde_json::from_str(&text).map_err(|_| QdbError::Response {
            message: format!(
                "failed to decode JSON response from /exec, content: {}",
                truncate(&text, 200)
            ),
        })?;
        ExecResponse::from_json(body, query)
    }

    /// Run a query and return one column of its result.
    pub async fn exec_extract_field(
        &self,
        query: &str,
        field: &FieldRef,
        options: &ExecOptions,
    ) -> Result<Vec<Value>, QdbError> {
        let response = self.exec(query, options).await?;
        let rows = response.rows().ok_or_else(|| QdbError::Format {
            message: "query returned no result set to extract a field from".to_string(),
        })?;
        rows.extract_field(field)
    }

    /// `/imp`. The optional schema part is sent ahead of the data part.
    pub async fn imp(
        &self,
        source: ImportSource,
        schema: Option<String>,
        options: &ImportOptions,
    ) -> Result<ImportResponse, QdbError> {
        let mut form = Form::new();
        if let Some(schema) = schema {
            let part = Part::text(schema)
                .file_name("schema.json")
                .mime_str("application/json")
                .map_err(|e| self.transport_error("imp", e))?;
            form = form.part("schema", part);
        }
        let size = source.data.len();
        let data = Part::bytes(source.data)
            .file_name(source.file_name.clone())
            .mime_str("application/octet-stream")
            .map_err(|e| self.transport_error("imp", e))?;
        form = form.part("data", data);

        debug!("/imp {} ({} bytes) into '{}'", source.file_name, size, options.table_name);
        let request = self
            .client
            .post(self.url("imp"))
            .query(&options.query_params())
            .multipart(form);
        let response = Self::check_status("imp", self.send("imp", request).await?).await?;

        let text = response.text().await.map_err(|e| QdbError::Response {
            message: format!("failed to read /imp response: {e}"),
        })?;
        Ok(match options.fmt {
            ImportFormat::Json => match serde_json::from_str(&text) {
                Ok(body) => ImportResponse::Json(body),
                Err(_) => ImportResponse::Unparsed(text),
            },
            ImportFormat::Tabular => ImportResponse::Tabular(text),
        })
    }

    /// `/exp`. The body is left unread so callers can stream it.
    pub async fn exp(&self, query: &str, options: &ExportOptions) -> Result<ExportStream, QdbError> {
        debug!("/exp query: {}", query);
        let request = self
            .client
            .get(self.url("exp"))
            .query(&options.query_params(query));
        let response = Self::check_status("exp", self.send("exp", request).await?).await?;
        Ok(ExportStream { response })
    }

    /// `/chk`.
    pub async fn chk(&self, table: &str) -> Result<ChkResponse, QdbError> {
        if table.trim().is_empty() {
            return Err(QdbError::precondition("table name must not be empty"));
        }
        let params = [("f", "json"), ("j", table), ("version", "2")];
        let request = self.client.get(self.url("chk")).query(&params);
        let response = Self::check_status("chk", self.send("chk", request).await?).await?;
        let text = response.text().await.map_err(|e| QdbError::Response {
            message: format!("failed to read /chk response: {e}"),
        })?;
        serde_json::from_str(&text).map_err(|_| QdbError::Response {
            message: format!("unexpected /chk response: {}", truncate(&text, 200)),
        })
    }

    /// API errors propagate; they are never read as "does not exist".
    pub async fn table_exists(&self, table: &str) -> Result<bool, QdbError> {
        Ok(self.chk(table).await?.exists())
    }
}

impl QuestDb for RestClient {
    async fn exec(&self, query: &str, options: &ExecOptions) -> Result<ExecResponse, QdbError> {
        RestClient::exec(self, query, options).await
    }

    async fn table_exists(&self, table: &str) -> Result<bool, QdbError> {
        RestClient::table_exists(self, table).await
    }
}

/// A pending `/exp` body.
pub struct ExportStream {
    response: Response,
}

impl ExportStream {
    /// Copy the body chunk by chunk. Returns bytes written.
    pub async fn copy_to<W: Write>(mut self, out: &mut W) -> Result<u64, QdbError> {
        let mut written = 0u64;
        while let Some(chunk) = self.response.chunk().await.map_err(|e| QdbError::Response {
            message: format!("failed while streaming /exp response: {e}"),
        })? {
            out.write_all(&chunk)?;
            written += chunk.len() as u64;
        }
        out.flush()?;
        Ok(written)
    }
}

fn api_error_message(body: &Value) -> Option<String> {
    if let Some(message) = body.get("message").and_then(Value::as_str) {
        return Some(message.to_string());
    }
    if let Some(error) = body.get("error").and_then(Value::as_str) {
        return Some(error.to_string());
    }
    match body.get("status").and_then(Value::as_str) {
        Some(status) if status != "OK" => Some(status.to_string()),
        _ => None,
    }
}

/// Map a non-2xx response to an error. The message comes from the JSON
/// body's `message`, `error` or non-OK `status`, else the raw text.
fn api_error(endpoint: &str, status: StatusCode, text: &str) -> QdbError {
    let body: Option<Value> = serde_json::from_str(text).ok();
    let message = body
        .as_ref()
        .and_then(api_error_message)
        .unwrap_or_else(|| {
            if text.trim().is_empty() {
                status.canonical_reason().unwrap_or("error").to_string()
            } else {
                truncate(text.trim(), 200)
            }
        });
    warn!("/{} returned HTTP {}: {}", endpoint, status.as_u16(), message);
    QdbError::Api {
        status: status.as_u16(),
        message,
        body,
    }
}

/// Recent servers answer SQL errors on `/exec` with HTTP 400 and the same
/// `error`/`position` body as a 200 response.
fn exec_http_error(status: StatusCode, text: &str, query: &str) -> QdbError {
    if let Ok(body) = serde_json::from_str::<Value>(text)
        && let Some(message) = body.get("error").and_then(Value::as_str)
    {
        return classify_query_error(
            message,
            Some(query.to_string()),
            body.get("position").and_then(Value::as_i64),
        );
    }
    api_error("exec", status, text)
}
