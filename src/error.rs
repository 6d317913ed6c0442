//! Error types for Stackbridge.
//!
//! Provides structured error handling with:
//! - Machine-readable error codes (`ErrorCode`)
//! - Category-based exit codes (2=auth, 3=not_found, 4=validation, etc.)
//! - Retryability flags so operators know when a re-run is worthwhile
//! - Context-aware recovery hints
//! - Structured JSON output for piped / non-TTY consumers
//!
//! Connector failures use the narrower [`ConnectorError`], whose
//! [`ConnectorErrorKind`] is the closed set every platform connector maps
//! its transport errors into.

use thiserror::Error;

use crate::sync::{FetchError, SyncError};

/// Result type alias for Stackbridge operations.
pub type Result<T> = std::result::Result<T, Error>;

// ── Connector Errors ──────────────────────────────────────────

/// The closed set of failure kinds a connector operation can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectorErrorKind {
    /// Credentials rejected (401/403).
    Auth,
    /// Addressed record or collection does not exist (404).
    NotFound,
    /// Throttled after the connector's own backoff gave up (429).
    RateLimit,
    /// Network failure, timeout or 5xx. Worth retrying later.
    Transient,
    /// Anything else, including malformed responses.
    Unknown,
}

impl ConnectorErrorKind {
    /// Classify an HTTP status code.
    #[must_use]
    pub const fn from_status(status: u16) -> Self {
        match status {
            401 | 403 => Self::Auth,
            404 => Self::NotFound,
            429 => Self::RateLimit,
            408 | 500..=599 => Self::Transient,
            _ => Self::Unknown,
        }
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Auth => "auth",
            Self::NotFound => "not_found",
            Self::RateLimit => "rate_limit",
            Self::Transient => "transient",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ConnectorErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed connector call (list, create, update or set-parent).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{kind} error: {message}")]
pub struct ConnectorError {
    pub kind: ConnectorErrorKind,
    pub message: String,
}

impl ConnectorError {
    pub fn new(kind: ConnectorErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(ConnectorErrorKind::Auth, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ConnectorErrorKind::NotFound, message)
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(ConnectorErrorKind::Transient, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(ConnectorErrorKind::Unknown, message)
    }

    /// Build from an HTTP status and response body.
    pub fn from_status(status: u16, body: &str) -> Self {
        let body = body.trim();
        let message = if body.is_empty() {
            format!("HTTP {status}")
        } else {
            format!("HTTP {status}: {}", truncate(body, 300))
        };
        Self::new(ConnectorErrorKind::from_status(status), message)
    }

    /// Whether the failure should stop the whole scope rather than one entity.
    #[must_use]
    pub const fn is_scope_fatal(&self) -> bool {
        matches!(self.kind, ConnectorErrorKind::Auth)
    }
}

impl From<reqwest::Error> for ConnectorError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return Self::new(ConnectorErrorKind::from_status(status.as_u16()), err.to_string());
        }
        if err.is_timeout() || err.is_connect() || err.is_request() {
            Self::transient(err.to_string())
        } else {
            Self::unknown(err.to_string())
        }
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

// ── Error Code ────────────────────────────────────────────────

/// Machine-readable error codes grouped by category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Auth (exit 2)
    AuthFailed,

    // Not Found (exit 3)
    NotFound,

    // Validation (exit 4)
    InvalidArgument,

    // Throttling (exit 5)
    RateLimited,

    // Sync (exit 6)
    FetchFailed,
    SyncAborted,
    ConnectorError,

    // Config (exit 7)
    ConfigError,
    MissingSetting,
    ConflictingLayout,

    // I/O (exit 8)
    IoError,
    JsonError,

    // Internal (exit 1)
    InternalError,
}

impl ErrorCode {
    /// Machine-readable SCREAMING_SNAKE code string.
    #[must_use]
    pub const fn as_str(&self) -> &str {
        match self {
            Self::AuthFailed => "AUTH_FAILED",
            Self::NotFound => "NOT_FOUND",
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::RateLimited => "RATE_LIMITED",
            Self::FetchFailed => "FETCH_FAILED",
            Self::SyncAborted => "SYNC_ABORTED",
            Self::ConnectorError => "CONNECTOR_ERROR",
            Self::ConfigError => "CONFIG_ERROR",
            Self::MissingSetting => "MISSING_SETTING",
            Self::ConflictingLayout => "CONFLICTING_LAYOUT",
            Self::IoError => "IO_ERROR",
            Self::JsonError => "JSON_ERROR",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Category-based exit code (1-8).
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::InternalError => 1,
            Self::AuthFailed => 2,
            Self::NotFound => 3,
            Self::InvalidArgument => 4,
            Self::RateLimited => 5,
            Self::FetchFailed | Self::SyncAborted | Self::ConnectorError => 6,
            Self::ConfigError | Self::MissingSetting | Self::ConflictingLayout => 7,
            Self::IoError | Self::JsonError => 8,
        }
    }

    /// Whether re-running the same command later may succeed.
    ///
    /// Matching is idempotent, so a re-run after a transient failure never
    /// duplicates records that the first run already created.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited | Self::FetchFailed | Self::SyncAborted | Self::ConnectorError
        )
    }
}

// ── Error Enum ────────────────────────────────────────────────

/// Errors that can occur in Stackbridge operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Missing setting: {name} (set --{flag} or {env})")]
    MissingSetting {
        name: &'static str,
        flag: &'static str,
        env: &'static str,
    },

    #[error("Both BOOKSTACK_SHELF_ID ({shelf_id}) and BOOKSTACK_BOOK_ID ({book_id}) are set")]
    ConflictingLayout { shelf_id: u64, book_id: u64 },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Connector error: {0}")]
    Connector(#[from] ConnectorError),

    #[error("{0}")]
    Fetch(#[from] FetchError),

    #[error("{0}")]
    Sync(#[from] SyncError),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Map this error to its structured `ErrorCode`.
    #[must_use]
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::MissingSetting { .. } => ErrorCode::MissingSetting,
            Self::ConflictingLayout { .. } => ErrorCode::ConflictingLayout,
            Self::Config(_) => ErrorCode::ConfigError,
            Self::Connector(e) => connector_code(e),
            Self::Fetch(e) => fetch_code(e),
            Self::Sync(SyncError::Fetch { error, .. }) => fetch_code(error),
            Self::Sync(SyncError::Aborted { cause, .. }) => match cause.kind {
                crate::error::ConnectorErrorKind::Auth => ErrorCode::AuthFailed,
                _ => ErrorCode::SyncAborted,
            },
            Self::Sync(SyncError::Config(_)) => ErrorCode::ConfigError,
            Self::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Self::Io(_) => ErrorCode::IoError,
            Self::Json(_) => ErrorCode::JsonError,
            Self::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Category-based exit code, delegating to the `ErrorCode`.
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        self.error_code().exit_code()
    }

    /// Context-aware recovery hint for operators.
    ///
    /// Returns `None` if no actionable suggestion exists.
    #[must_use]
    pub fn hint(&self) -> Option<String> {
        match self {
            Self::MissingSetting { env, .. } => Some(format!(
                "Export {env}, pass the flag, or add the value to ~/.stackbridge/config.json"
            )),

            Self::ConflictingLayout { .. } => Some(
                "Choose one layout: BOOKSTACK_SHELF_ID places each top-level page in its own \
                 book on the shelf; BOOKSTACK_BOOK_ID migrates everything into one book."
                    .to_string(),
            ),

            Self::Connector(e) | Self::Sync(SyncError::Aborted { cause: e, .. }) => {
                connector_hint(e)
            }

            Self::Fetch(e) | Self::Sync(SyncError::Fetch { error: e, .. }) => Some(format!(
                "Fetched {} record(s) over {} page(s) before the failure. \
                 Nothing was written; re-run once the service is reachable.",
                e.fetched, e.pages
            )),

            Self::Config(_)
            | Self::Sync(SyncError::Config(_))
            | Self::InvalidArgument(_)
            | Self::Io(_)
            | Self::Json(_)
            | Self::Other(_) => None,
        }
    }

    /// Structured JSON representation for machine consumption.
    #[must_use]
    pub fn to_structured_json(&self) -> serde_json::Value {
        let code = self.error_code();
        let mut obj = serde_json::json!({
            "error": {
                "code": code.as_str(),
                "message": self.to_string(),
                "retryable": code.is_retryable(),
                "exit_code": code.exit_code(),
            }
        });

        if let Some(hint) = self.hint() {
            obj["error"]["hint"] = serde_json::Value::String(hint);
        }

        // Aborted runs still carry the partial plan.
        if let Self::Sync(SyncError::Aborted { report, .. }) = self {
            if let Ok(value) = serde_json::to_value(report.as_ref()) {
                obj["error"]["partial_report"] = value;
            }
        }

        obj
    }
}

const fn connector_code(e: &ConnectorError) -> ErrorCode {
    match e.kind {
        ConnectorErrorKind::Auth => ErrorCode::AuthFailed,
        ConnectorErrorKind::NotFound => ErrorCode::NotFound,
        ConnectorErrorKind::RateLimit => ErrorCode::RateLimited,
        ConnectorErrorKind::Transient | ConnectorErrorKind::Unknown => ErrorCode::ConnectorError,
    }
}

const fn fetch_code(e: &FetchError) -> ErrorCode {
    match e.connector_kind() {
        Some(ConnectorErrorKind::Auth) => ErrorCode::AuthFailed,
        Some(ConnectorErrorKind::RateLimit) => ErrorCode::RateLimited,
        _ => ErrorCode::FetchFailed,
    }
}

fn connector_hint(e: &ConnectorError) -> Option<String> {
    match e.kind {
        ConnectorErrorKind::Auth => Some(
            "Check the API token and that the account can read and write the configured \
             project or space."
                .to_string(),
        ),
        ConnectorErrorKind::NotFound => {
            Some("Check the project key, project id, space key or book/shelf id.".to_string())
        }
        ConnectorErrorKind::RateLimit => Some(
            "The service kept throttling after backoff. Wait a few minutes and re-run; \
             records already migrated will be skipped."
                .to_string(),
        ),
        ConnectorErrorKind::Transient | ConnectorErrorKind::Unknown => None,
    }
}
