//! Status reconciler
//!
//! Projects the backend's native execution state onto the caller-facing
//! status taxonomy, fetching results or failures where the state calls for it.
//!
//! | Native state | Projected | Extraction                      |
//! |--------------|-----------|---------------------------------|
//! | RUNNING      | RUNNING   | none                            |
//! | COMPLETED    | SUCCESS   | fetch result                    |
//! | FAILED       | FAILED    | fetch result, failure -> error  |
//! | TIMED_OUT    | TIMEOUT   | fixed message                   |
//! | CANCELED     | CANCELED  | none                            |
//! | TERMINATED   | KILLED    | none                            |
//! | other        | UNKNOWN   | none                            |
//!
//! Queries never fail: any error becomes `NOT_FOUND` carrying the cause.

use tracing::{debug, warn};

use crate::backend::SharedBackend;
use crate::error::Error;
use crate::types::{NativeStatus, StatusKind, TaskStatus};

/// Message used when a failed execution unexpectedly yields a value
const FAILED_WITHOUT_CAUSE: &str = "Task execution failed.";

/// Map a native execution state onto the caller-facing taxonomy
pub fn project_status(native: &NativeStatus) -> StatusKind {
    match native {
        NativeStatus::Running => StatusKind::Running,
        NativeStatus::Completed => StatusKind::Success,
        NativeStatus::Failed => StatusKind::Failed,
        NativeStatus::TimedOut => StatusKind::Timeout,
        NativeStatus::Canceled => StatusKind::Canceled,
        NativeStatus::Terminated => StatusKind::Killed,
        NativeStatus::Other(_) => StatusKind::Unknown,
    }
}

/// Result of fetching an execution outcome, with the raised error kept as a value
enum FetchOutcome {
    Value(String),
    Raised(Error),
}

impl FetchOutcome {
    async fn capture(backend: &SharedBackend, execution_id: &str, run_id: &str) -> Self {
        match backend.fetch_result(execution_id, Some(run_id)).await {
            Ok(value) => FetchOutcome::Value(value),
            Err(e) => FetchOutcome::Raised(e),
        }
    }
}

/// Answers status queries against the backend
#[derive(Clone)]
pub struct StatusReconciler {
    backend: SharedBackend,
}

impl StatusReconciler {
    pub fn new(backend: SharedBackend) -> Self {
        Self { backend }
    }

    /// Current status of the latest run under `task_id`
    pub async fn query(&self, task_id: &str) -> TaskStatus {
        let description = match self.backend.describe(task_id).await {
            Ok(description) => description,
            Err(e) => return absorb(task_id, e),
        };

        let run_id = description.run_id;
        let kind = project_status(&description.status);
        debug!(task_id = %task_id, run_id = %run_id, native = %description.status, status = %kind, "Status queried");

        match kind {
            StatusKind::Running => TaskStatus::running(task_id, Some(run_id)),
            StatusKind::Success => match FetchOutcome::capture(&self.backend, task_id, &run_id).await {
                FetchOutcome::Value(result) => TaskStatus::success(task_id, Some(run_id), result),
                FetchOutcome::Raised(e) => absorb(task_id, e),
            },
            StatusKind::Failed => match FetchOutcome::capture(&self.backend, task_id, &run_id).await {
                FetchOutcome::Raised(e) => TaskStatus::failed(task_id, Some(run_id), e.to_string()),
                FetchOutcome::Value(_) => TaskStatus::failed(task_id, Some(run_id), FAILED_WITHOUT_CAUSE),
            },
            StatusKind::Timeout => TaskStatus::timeout(task_id, Some(run_id)),
            StatusKind::Canceled => TaskStatus::canceled(task_id, Some(run_id)),
            StatusKind::Killed => TaskStatus::killed(task_id, Some(run_id)),
            StatusKind::Unknown | StatusKind::NotFound => TaskStatus::unknown(task_id, Some(run_id)),
        }
    }
}

fn absorb(task_id: &str, err: Error) -> TaskStatus {
    warn!(task_id = %task_id, error = %err, kind = %err.kind(), "Status query failed");
    TaskStatus::not_found(task_id, err.to_string())
}
