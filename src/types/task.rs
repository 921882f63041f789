//! Task type definitions
//!
//! Caller-facing task vocabulary: dispatch modes, task-control arguments,
//! identities and the projected status snapshot returned by queries.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────
// Task Type Enum
// ─────────────────────────────────────────────────────────────────

/// Dispatch mode of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskType {
    /// Block until the execution is terminal and return its result
    Sync,
    /// Return as soon as the backend accepts the start
    #[default]
    Async,
}

impl TaskType {
    /// Get all task types
    pub fn all() -> &'static [TaskType] {
        &[TaskType::Sync, TaskType::Async]
    }

    /// Whether the dispatch call waits for the execution to finish
    pub fn is_blocking(&self) -> bool {
        matches!(self, TaskType::Sync)
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskType::Sync => write!(f, "SYNC"),
            TaskType::Async => write!(f, "ASYNC"),
        }
    }
}

impl FromStr for TaskType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "SYNC" => Ok(TaskType::Sync),
            "ASYNC" => Ok(TaskType::Async),
            other => Err(format!("unknown task type '{}', expected SYNC or ASYNC", other)),
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Task Arguments
// ─────────────────────────────────────────────────────────────────

/// Task-control parameters for a single dispatch
///
/// Unset fields are filled in by the execution options builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TaskArgs {
    /// Maximum wall-clock time for a single attempt
    pub execution_timeout: Option<Duration>,
    /// Maximum attempts at the backend; 1 means no retry
    pub retry_count: Option<u32>,
}

impl TaskArgs {
    /// Arguments that take every default
    pub fn new() -> Self {
        Self::default()
    }

    /// Ten-minute attempts, retried up to three times in total
    pub fn retrying() -> Self {
        Self {
            execution_timeout: Some(Duration::from_secs(10 * 60)),
            retry_count: Some(3),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.execution_timeout = Some(timeout);
        self
    }

    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = Some(retry_count);
        self
    }
}

// ─────────────────────────────────────────────────────────────────
// Identity
// ─────────────────────────────────────────────────────────────────

/// Identity of a dispatched task
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskIdentity {
    /// Caller-chosen id, doubles as the backend execution id
    pub task_id: String,
    /// Queue the task was routed to
    pub region: String,
    /// Backend-assigned run id, present once the start was accepted
    pub run_id: Option<String>,
}

// ─────────────────────────────────────────────────────────────────
// Projected Status
// ─────────────────────────────────────────────────────────────────

/// Caller-facing status taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusKind {
    Running,
    Success,
    Failed,
    Timeout,
    Canceled,
    Killed,
    NotFound,
    Unknown,
}

impl StatusKind {
    /// Whether the status can no longer change for the current run
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StatusKind::Success
                | StatusKind::Failed
                | StatusKind::Timeout
                | StatusKind::Canceled
                | StatusKind::Killed
        )
    }

    /// Whether a snapshot with this status carries an error message
    pub fn carries_error(&self) -> bool {
        matches!(
            self,
            StatusKind::Failed | StatusKind::Timeout | StatusKind::NotFound
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StatusKind::Running => "RUNNING",
            StatusKind::Success => "SUCCESS",
            StatusKind::Failed => "FAILED",
            StatusKind::Timeout => "TIMEOUT",
            StatusKind::Canceled => "CANCELED",
            StatusKind::Killed => "KILLED",
            StatusKind::NotFound => "NOT_FOUND",
            StatusKind::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for StatusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fixed message reported for timed-out executions
pub const TIMEOUT_MESSAGE: &str = "Task execution timed out.";

/// Point-in-time projection of a task's execution state
///
/// Built only through the constructors below, so `result` is set only for
/// `SUCCESS` and `error_message` only for `FAILED`, `TIMEOUT` and `NOT_FOUND`.
/// Serialized field names are camelCase and absent values are `null`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStatus {
    task_id: String,
    run_id: Option<String>,
    status: StatusKind,
    result: Option<String>,
    error_message: Option<String>,
}

impl TaskStatus {
    fn snapshot(task_id: impl Into<String>, run_id: Option<String>, status: StatusKind) -> Self {
        Self {
            task_id: task_id.into(),
            run_id,
            status,
            result: None,
            error_message: None,
        }
    }

    pub fn running(task_id: impl Into<String>, run_id: Option<String>) -> Self {
        Self::snapshot(task_id, run_id, StatusKind::Running)
    }

    pub fn success(task_id: impl Into<String>, run_id: Option<String>, result: impl Into<String>) -> Self {
        Self {
            result: Some(result.into()),
            ..Self::snapshot(task_id, run_id, StatusKind::Success)
        }
    }

    pub fn failed(task_id: impl Into<String>, run_id: Option<String>, message: impl Into<String>) -> Self {
        Self {
            error_message: Some(message.into()),
            ..Self::snapshot(task_id, run_id, StatusKind::Failed)
        }
    }

    pub fn timeout(task_id: impl Into<String>, run_id: Option<String>) -> Self {
        Self {
            error_message: Some(TIMEOUT_MESSAGE.to_string()),
            ..Self::snapshot(task_id, run_id, StatusKind::Timeout)
        }
    }

    pub fn canceled(task_id: impl Into<String>, run_id: Option<String>) -> Self {
        Self::snapshot(task_id, run_id, StatusKind::Canceled)
    }

    pub fn killed(task_id: impl Into<String>, run_id: Option<String>) -> Self {
        Self::snapshot(task_id, run_id, StatusKind::Killed)
    }

    pub fn unknown(task_id: impl Into<String>, run_id: Option<String>) -> Self {
        Self::snapshot(task_id, run_id, StatusKind::Unknown)
    }

    /// Snapshot for a query that could not be answered; `run_id` is always null
    pub fn not_found(task_id: impl Into<String>, cause: impl Into<String>) -> Self {
        Self {
            error_message: Some(cause.into()),
            ..Self::snapshot(task_id, None, StatusKind::NotFound)
        }
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn run_id(&self) -> Option<&str> {
        self.run_id.as_deref()
    }

    pub fn status(&self) -> StatusKind {
        self.status
    }

    pub fn result(&self) -> Option<&str> {
        self.result.as_deref()
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

// ─────────────────────────────────────────────────────────────────
// Request / Response
// ─────────────────────────────────────────────────────────────────

/// Dispatch request as accepted from callers
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchRequest {
    /// Task id to use; generated when absent
    #[serde(default)]
    pub task_id: Option<String>,

    /// Target region; the configured default when absent
    #[serde(default)]
    pub region: Option<String>,

    /// Opaque payload handed to the business activity
    pub command: String,

    #[serde(default)]
    pub task_type: TaskType,

    /// Per-attempt timeout in seconds
    #[serde(default)]
    pub execution_timeout_secs: Option<u64>,

    #[serde(default)]
    pub retry_count: Option<u32>,
}

impl DispatchRequest {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Default::default()
        }
    }

    pub fn with_task_id(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn with_task_type(mut self, task_type: TaskType) -> Self {
        self.task_type = task_type;
        self
    }

    /// Task-control arguments carried by the request
    pub fn args(&self) -> TaskArgs {
        TaskArgs {
            execution_timeout: self.execution_timeout_secs.map(Duration::from_secs),
            retry_count: self.retry_count,
        }
    }
}

/// Dispatch response returned to callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchResponse {
    pub task_id: String,
    /// Present for async dispatches
    pub run_id: Option<String>,
    /// Present for sync dispatches
    pub result: Option<String>,
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────
