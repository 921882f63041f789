//! Backend trait definitions
//!
//! Defines the narrow RPC-style client interface the dispatch layer uses to
//! talk to a durable-execution backend.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::types::{ExecutionDescription, ExecutionHandle, StartRequest};

// ─────────────────────────────────────────────────────────────────
// Backend Health
// ─────────────────────────────────────────────────────────────────

/// Health status of a backend
#[derive(Debug, Clone)]
pub struct BackendHealth {
    /// Whether the backend accepts calls
    pub operational: bool,

    /// Executions that have not closed yet
    pub running_executions: usize,

    /// Queues that currently have a worker polling them
    pub worker_queues: Vec<String>,

    /// Any error message
    pub error: Option<String>,
}

impl Default for BackendHealth {
    fn default() -> Self {
        Self {
            operational: true,
            running_executions: 0,
            worker_queues: Vec::new(),
            error: None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// ExecutionBackend Trait
// ─────────────────────────────────────────────────────────────────

/// Client interface to a durable-execution backend
///
/// Every call is one round trip. Implementations report an unreachable
/// backend as [`Error::BackendUnavailable`] and a refused start as
/// [`Error::AlreadyRunning`] or [`Error::TaskIdReused`]. The trait is
/// object-safe so the client can be shared as [`SharedBackend`].
#[async_trait]
pub trait ExecutionBackend: Send + Sync {
    // ─────────────────────────────────────────────────────────────
    // Identity & Health
    // ─────────────────────────────────────────────────────────────

    /// Get the backend name (e.g., "memory")
    fn name(&self) -> &'static str;

    /// Check the health of the backend
    async fn health_check(&self) -> Result<BackendHealth>;

    // ─────────────────────────────────────────────────────────────
    // Starting Executions
    // ─────────────────────────────────────────────────────────────

    /// Start an execution without waiting for it
    async fn start_execution(&self, request: StartRequest) -> Result<ExecutionHandle>;

    /// Start an execution and block until it closes
    ///
    /// Returns the result of a completed execution, or the execution error
    /// of one that failed, timed out, or was stopped.
    async fn execute(&self, request: StartRequest) -> Result<String>;

    // ─────────────────────────────────────────────────────────────
    // Inspection
    // ─────────────────────────────────────────────────────────────

    /// Describe the latest run under an execution id
    async fn describe(&self, execution_id: &str) -> Result<ExecutionDescription>;

    /// Fetch the outcome of a closed execution without blocking
    ///
    /// `run_id` pins the run; `None` means the latest. A failed execution
    /// yields its failure as the error.
    async fn fetch_result(&self, execution_id: &str, run_id: Option<&str>) -> Result<String>;

    // ─────────────────────────────────────────────────────────────
    // Stopping Executions
    // ─────────────────────────────────────────────────────────────

    /// Request cancellation of a running execution
    async fn cancel(&self, execution_id: &str) -> Result<()> {
        Err(Error::NotSupported(format!(
            "Backend '{}' does not support cancellation of '{}'",
            self.name(),
            execution_id
        )))
    }

    /// Forcibly terminate a running execution
    async fn terminate(&self, execution_id: &str, reason: &str) -> Result<()> {
        let _ = reason;
        Err(Error::NotSupported(format!(
            "Backend '{}' does not support termination of '{}'",
            self.name(),
            execution_id
        )))
    }
}

// ─────────────────────────────────────────────────────────────────
// Arc wrapper for trait objects
// ─────────────────────────────────────────────────────────────────

/// Type alias for a shared backend reference
pub type SharedBackend = Arc<dyn ExecutionBackend>;

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NativeStatus;

    struct ReadOnlyBackend;

    #[async_trait]
    impl ExecutionBackend for ReadOnlyBackend {
        fn name(&self) -> &'static str {
            "read-only"
        }

        async fn health_check(&self) -> Result<BackendHealth> {
            Ok(BackendHealth::default())
        }

        async fn start_execution(&self, _request: StartRequest) -> Result<ExecutionHandle> {
            Err(Error::NotSupported("start".into()))
        }

        async fn execute(&self, _request: StartRequest) -> Result<String> {
            Err(Error::NotSupported("execute".into()))
        }

        async fn describe(&self, execution_id: &str) -> Result<ExecutionDescription> {
            Ok(ExecutionDescription {
                execution_id: execution_id.to_string(),
                run_id: "run".into(),
                workflow_type: "TaskWorkflow".into(),
                queue: "q".into(),
                status: NativeStatus::Running,
                attempt: 1,
                start_time: chrono::Utc::now(),
                close_time: None,
            })
        }

        async fn fetch_result(&self, _execution_id: &str, _run_id: Option<&str>) -> Result<String> {
            Err(Error::NotSupported("fetch".into()))
        }
    }

    #[test]
    fn test_backend_health_default() {
        let health = BackendHealth::default();
        assert!(health.operational);
        assert_eq!(health.running_executions, 0);
        assert!(health.error.is_none());
    }

    #[tokio::test]
    async fn test_stop_defaults_not_supported() {
        let backend: SharedBackend = Arc::new(ReadOnlyBackend);

        let err = backend.cancel("t1").await.unwrap_err();
        assert!(matches!(err, Error::NotSupported(_)));
        assert!(err.to_string().contains("read-only"));

        let err = backend.terminate("t1", "stop").await.unwrap_err();
        assert!(matches!(err, Error::NotSupported(_)));
    }
}
