//! Execution backend vocabulary
//!
//! Native execution states, per-attempt options and start requests as the
//! durable-execution backend understands them.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────
// Native Status
// ─────────────────────────────────────────────────────────────────

/// Execution state as reported by the backend
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NativeStatus {
    Running,
    Completed,
    Failed,
    TimedOut,
    Canceled,
    Terminated,
    /// A state this layer does not recognize (continued-as-new, unspecified, ...)
    Other(String),
}

impl NativeStatus {
    /// Parse a backend status name, falling back to [`NativeStatus::Other`]
    pub fn parse(name: &str) -> Self {
        match name.to_ascii_uppercase().as_str() {
            "RUNNING" => NativeStatus::Running,
            "COMPLETED" => NativeStatus::Completed,
            "FAILED" => NativeStatus::Failed,
            "TIMED_OUT" => NativeStatus::TimedOut,
            "CANCELED" => NativeStatus::Canceled,
            "TERMINATED" => NativeStatus::Terminated,
            _ => NativeStatus::Other(name.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            NativeStatus::Running => "RUNNING",
            NativeStatus::Completed => "COMPLETED",
            NativeStatus::Failed => "FAILED",
            NativeStatus::TimedOut => "TIMED_OUT",
            NativeStatus::Canceled => "CANCELED",
            NativeStatus::Terminated => "TERMINATED",
            NativeStatus::Other(name) => name,
        }
    }

    /// Whether the execution has closed
    pub fn is_closed(&self) -> bool {
        !matches!(self, NativeStatus::Running)
    }
}

impl fmt::Display for NativeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─────────────────────────────────────────────────────────────────
// Reuse Policy
// ─────────────────────────────────────────────────────────────────

/// Rule deciding whether a closed execution id may be started again
///
/// A running execution always blocks a new start regardless of policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReusePolicy {
    /// Any closed execution may be superseded
    AllowDuplicate,
    /// Only failed or timed-out executions may be superseded
    #[default]
    AllowDuplicateFailedOnly,
    /// The id can never be reused
    RejectDuplicate,
}

impl ReusePolicy {
    /// Whether a closed execution in `previous` state may be superseded
    pub fn permits(&self, previous: &NativeStatus) -> bool {
        match self {
            ReusePolicy::AllowDuplicate => previous.is_closed(),
            ReusePolicy::AllowDuplicateFailedOnly => {
                matches!(previous, NativeStatus::Failed | NativeStatus::TimedOut)
            }
            ReusePolicy::RejectDuplicate => false,
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Execution Options
// ─────────────────────────────────────────────────────────────────

/// Retry policy applied between attempts
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub initial_interval: Duration,
    pub backoff_coefficient: f64,
    pub maximum_interval: Duration,
    /// Maximum attempts including the first; always at least 1
    pub maximum_attempts: u32,
}

impl RetryPolicy {
    /// Delay before the attempt following `attempt` (1-based)
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32) as i32;
        let scaled = self.initial_interval.as_secs_f64() * self.backoff_coefficient.powi(exponent);
        let capped = scaled.min(self.maximum_interval.as_secs_f64());
        Duration::from_secs_f64(capped.max(0.0))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_secs(1),
            backoff_coefficient: 2.0,
            maximum_interval: Duration::from_secs(100),
            maximum_attempts: 1,
        }
    }
}

/// Options governing every attempt of an execution
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionOptions {
    /// Maximum wall-clock time of a single attempt
    pub start_to_close_timeout: Duration,
    pub retry_policy: RetryPolicy,
}

impl ExecutionOptions {
    /// Upper bound on how long an execution can take, back-off included
    pub fn worst_case_duration(&self) -> Duration {
        let attempts = self.retry_policy.maximum_attempts.max(1);
        let work = self.start_to_close_timeout.saturating_mul(attempts);
        (1..attempts).fold(work, |acc, attempt| {
            acc.saturating_add(self.retry_policy.delay_after(attempt))
        })
    }
}

// ─────────────────────────────────────────────────────────────────
// Requests & Descriptions
// ─────────────────────────────────────────────────────────────────

/// A request to start (or run to completion) a named execution
#[derive(Debug, Clone)]
pub struct StartRequest {
    /// Queue the execution is routed to
    pub queue: String,
    /// Caller-chosen execution id
    pub execution_id: String,
    /// Workflow type the queue's worker must provide
    pub workflow_type: String,
    pub payload: String,
    pub options: ExecutionOptions,
    pub reuse_policy: ReusePolicy,
}

/// Handle returned when a start is accepted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionHandle {
    pub execution_id: String,
    pub run_id: String,
}

/// Execution metadata returned by `describe`
#[derive(Debug, Clone)]
pub struct ExecutionDescription {
    pub execution_id: String,
    pub run_id: String,
    pub workflow_type: String,
    pub queue: String,
    pub status: NativeStatus,
    /// Attempt currently running, or the last one made
    pub attempt: u32,
    pub start_time: DateTime<Utc>,
    pub close_time: Option<DateTime<Utc>>,
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────
