//! Error types for RegionGate
//!
//! Provides structured error handling with:
//! - Numeric error codes for machine parsing
//! - A coarse [`ErrorKind`] so callers can tell conflicts, infrastructure
//!   outages and business failures apart
//! - User-friendly messages with suggestions
//! - Exit codes for CLI

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for dispatch operations
pub type Result<T> = std::result::Result<T, Error>;

/// Numeric error codes for machine parsing and documentation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ErrorCode {
    // Configuration errors (1xx)
    ConfigNotFound = 100,
    ConfigParseError = 101,
    ConfigValidation = 102,

    // IO errors (2xx)
    IoRead = 200,
    IoWrite = 201,
    IoPermission = 202,
    IoNotFound = 203,
    Serialization = 204,

    // Backend errors (3xx)
    BackendUnavailable = 300,
    BackendRpc = 301,

    // Request errors (4xx)
    InvalidRequest = 400,
    ExecutionNotFound = 404,
    AlreadyRunning = 409,
    TaskIdReused = 410,

    // Execution errors (5xx)
    ExecutionFailed = 500,
    ExecutionTimeout = 501,
    ExecutionCanceled = 502,
    ExecutionTerminated = 503,

    // Internal errors (9xx)
    InternalError = 900,
    NotSupported = 902,
}

impl ErrorCode {
    /// Get the string code (e.g., "E409")
    pub fn as_str(&self) -> String {
        format!("E{}", *self as u16)
    }

    /// Get the exit code for CLI (maps to 1-125 range)
    pub fn exit_code(&self) -> i32 {
        match *self as u16 {
            100..=199 => 10,
            200..=299 => 20,
            300..=399 => 30,
            400..=499 => 40,
            500..=599 => 50,
            900..=999 => 90,
            _ => 1,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Coarse classification of an error, stable across variants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The task id is already bound to an execution that blocks reuse
    Conflict,
    /// The execution backend could not be reached or answered with an RPC failure
    Infrastructure,
    /// The task itself failed, timed out, or was stopped
    Execution,
    /// The backend has no execution under the requested id
    NotFound,
    /// The caller violated a dispatch precondition
    InvalidRequest,
    /// Configuration could not be loaded or is invalid
    Config,
    /// Everything else
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Conflict => "conflict",
            ErrorKind::Infrastructure => "infrastructure",
            ErrorKind::Execution => "execution",
            ErrorKind::NotFound => "not_found",
            ErrorKind::InvalidRequest => "invalid_request",
            ErrorKind::Config => "config",
            ErrorKind::Internal => "internal",
        };
        write!(f, "{}", s)
    }
}

/// Main error type
#[derive(Error, Debug)]
pub enum Error {
    // ─────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound {
        path: PathBuf,
        #[source]
        source: Option<std::io::Error>,
    },

    /// Configuration parse error
    #[error("Failed to parse configuration: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<toml::de::Error>,
    },

    /// Configuration validation error
    #[error("Configuration validation failed: {message}")]
    ConfigValidation { message: String, field: Option<String> },

    /// Generic configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    // ─────────────────────────────────────────────────────────────
    // IO Errors
    // ─────────────────────────────────────────────────────────────

    /// File write error
    #[error("Failed to write file: {path}")]
    IoWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML serialization error
    #[error("TOML serialization error: {0}")]
    Toml(#[from] toml::ser::Error),

    /// JSON serialization error
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // ─────────────────────────────────────────────────────────────
    // Backend Errors
    // ─────────────────────────────────────────────────────────────

    /// The execution backend cannot be reached
    #[error("Execution backend '{backend}' unavailable: {message}")]
    BackendUnavailable { backend: String, message: String },

    /// The backend answered, but the call failed
    #[error("Backend RPC failed: {0}")]
    Rpc(String),

    // ─────────────────────────────────────────────────────────────
    // Request Errors
    // ─────────────────────────────────────────────────────────────

    /// Dispatch precondition violated
    #[error("Invalid request: {field} {message}")]
    InvalidRequest { field: String, message: String },

    /// No execution exists under the id
    #[error("Execution not found: {execution_id}")]
    ExecutionNotFound { execution_id: String },

    /// A running execution already owns the task id
    #[error("Task {task_id} is already running (run {run_id})")]
    AlreadyRunning { task_id: String, run_id: String },

    /// The task id belongs to a closed execution whose status blocks reuse
    #[error("Task id {task_id} cannot be reused: previous execution ended as {status}")]
    TaskIdReused { task_id: String, status: String },

    // ─────────────────────────────────────────────────────────────
    // Execution Errors
    // ─────────────────────────────────────────────────────────────

    /// Business logic failed after exhausting its attempts
    #[error("Task execution failed: {message}")]
    ExecutionFailed {
        task_id: Option<String>,
        message: String,
        attempts: u32,
    },

    /// The final attempt exceeded its start-to-close timeout
    #[error("Task {task_id} timed out after {attempts} attempt(s)")]
    ExecutionTimedOut { task_id: String, attempts: u32 },

    /// The execution was canceled before it finished
    #[error("Task {task_id} was canceled")]
    ExecutionCanceled { task_id: String },

    /// The execution was forcibly terminated
    #[error("Task {task_id} was terminated: {reason}")]
    ExecutionTerminated { task_id: String, reason: String },

    // ─────────────────────────────────────────────────────────────
    // Internal Errors
    // ─────────────────────────────────────────────────────────────

    /// Feature not supported
    #[error("Not supported: {0}")]
    NotSupported(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    // ─────────────────────────────────────────────────────────────
    // Error Classification
    // ─────────────────────────────────────────────────────────────

    /// Get the numeric error code
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::ConfigNotFound { .. } => ErrorCode::ConfigNotFound,
            Error::ConfigParse { .. } => ErrorCode::ConfigParseError,
            Error::ConfigValidation { .. } => ErrorCode::ConfigValidation,
            Error::Config(_) => ErrorCode::ConfigValidation,

            Error::IoWrite { .. } => ErrorCode::IoWrite,
            Error::Io(e) => match e.kind() {
                std::io::ErrorKind::NotFound => ErrorCode::IoNotFound,
                std::io::ErrorKind::PermissionDenied => ErrorCode::IoPermission,
                _ => ErrorCode::IoRead,
            },
            Error::Toml(_) | Error::Json(_) => ErrorCode::Serialization,

            Error::BackendUnavailable { .. } => ErrorCode::BackendUnavailable,
            Error::Rpc(_) => ErrorCode::BackendRpc,

            Error::InvalidRequest { .. } => ErrorCode::InvalidRequest,
            Error::ExecutionNotFound { .. } => ErrorCode::ExecutionNotFound,
            Error::AlreadyRunning { .. } => ErrorCode::AlreadyRunning,
            Error::TaskIdReused { .. } => ErrorCode::TaskIdReused,

            Error::ExecutionFailed { .. } => ErrorCode::ExecutionFailed,
            Error::ExecutionTimedOut { .. } => ErrorCode::ExecutionTimeout,
            Error::ExecutionCanceled { .. } => ErrorCode::ExecutionCanceled,
            Error::ExecutionTerminated { .. } => ErrorCode::ExecutionTerminated,

            Error::NotSupported(_) => ErrorCode::NotSupported,
            Error::Internal(_) => ErrorCode::InternalError,
        }
    }

    /// Get the coarse error kind
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::AlreadyRunning { .. } | Error::TaskIdReused { .. } => ErrorKind::Conflict,
            Error::BackendUnavailable { .. } | Error::Rpc(_) => ErrorKind::Infrastructure,
            Error::ExecutionFailed { .. }
            | Error::ExecutionTimedOut { .. }
            | Error::ExecutionCanceled { .. }
            | Error::ExecutionTerminated { .. } => ErrorKind::Execution,
            Error::ExecutionNotFound { .. } => ErrorKind::NotFound,
            Error::InvalidRequest { .. } => ErrorKind::InvalidRequest,
            Error::ConfigNotFound { .. }
            | Error::ConfigParse { .. }
            | Error::ConfigValidation { .. }
            | Error::Config(_) => ErrorKind::Config,
            _ => ErrorKind::Internal,
        }
    }

    /// Whether the error is a task id conflict
    pub fn is_conflict(&self) -> bool {
        self.kind() == ErrorKind::Conflict
    }

    /// Check if the error is retryable by the caller
    ///
    /// Conflicts are never retryable: retrying a rejected start would either
    /// fail again or silently create a duplicate.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::BackendUnavailable { .. } | Error::Rpc(_) | Error::Io(_)
        )
    }

    /// Check if the error is fatal (the process should exit)
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::ConfigNotFound { .. }
                | Error::ConfigParse { .. }
                | Error::ConfigValidation { .. }
                | Error::Config(_)
                | Error::Internal(_)
        )
    }

    /// Get the exit code for CLI
    pub fn exit_code(&self) -> i32 {
        self.code().exit_code()
    }

    // ─────────────────────────────────────────────────────────────
    // User-Friendly Messages
    // ─────────────────────────────────────────────────────────────

    /// Get a user-friendly suggestion for how to fix this error
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Error::ConfigNotFound { .. } => Some(
                "Run 'regiongate config init' to create a default configuration file."
            ),
            Error::ConfigParse { .. } => Some(
                "Check your configuration file syntax. Run 'regiongate config validate' to see details."
            ),
            Error::ConfigValidation { .. } | Error::Config(_) => Some(
                "Review the configuration file and fix the invalid values."
            ),
            Error::BackendUnavailable { .. } | Error::Rpc(_) => Some(
                "The execution backend could not be reached. Retry after a delay."
            ),
            Error::AlreadyRunning { .. } => Some(
                "Wait for the running task to finish, or poll its status with 'regiongate status'."
            ),
            Error::TaskIdReused { .. } => Some(
                "Task ids can only be reused after a failed or timed-out execution. Choose a new task id."
            ),
            Error::ExecutionTimedOut { .. } => Some(
                "Raise the execution timeout or the retry count for this task."
            ),
            _ => None,
        }
    }

    /// Format the error for terminal display with colors
    pub fn format_for_terminal(&self) -> String {
        let mut output = format!("\x1b[31mError [{}]\x1b[0m: {}\n", self.code().as_str(), self);

        if let Some(hint) = self.suggestion() {
            output.push_str(&format!("\n\x1b[33mHint\x1b[0m: {}\n", hint));
        }

        output
    }

    /// Format the error for logging (no colors)
    pub fn format_for_log(&self) -> String {
        format!("[{}] {}", self.code().as_str(), self)
    }
}

// ─────────────────────────────────────────────────────────────────
// Error Constructors
// ─────────────────────────────────────────────────────────────────

impl Error {
    /// Create a config not found error
    pub fn config_not_found(path: impl Into<PathBuf>) -> Self {
        Error::ConfigNotFound {
            path: path.into(),
            source: None,
        }
    }

    /// Create a config validation error with field name
    pub fn config_field_invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Error::ConfigValidation {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Create an invalid request error
    pub fn invalid_request(field: impl Into<String>, message: impl Into<String>) -> Self {
        Error::InvalidRequest {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a backend unavailable error
    pub fn backend_unavailable(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Error::BackendUnavailable {
            backend: backend.into(),
            message: message.into(),
        }
    }

    /// Create an execution failed error
    pub fn execution_failed(task_id: impl Into<String>, message: impl Into<String>, attempts: u32) -> Self {
        Error::ExecutionFailed {
            task_id: Some(task_id.into()),
            message: message.into(),
            attempts,
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────
