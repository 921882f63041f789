//! Task service facade
//!
//! The controller-level entry point: fills request defaults, generates task
//! ids, dispatches, and answers status, wait, cancel and kill requests.

use std::time::Duration;

use backoff::{backoff::Backoff, ExponentialBackoff};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::backend::{BackendHealth, SharedBackend};
use crate::config::{PollSettings, ServiceConfig};
use crate::error::Result;
use crate::types::{DispatchRequest, DispatchResponse, TaskStatus};

use super::dispatcher::Dispatcher;
use super::reconciler::StatusReconciler;

/// Dispatch and status operations over one shared backend client
#[derive(Clone)]
pub struct TaskService {
    backend: SharedBackend,
    dispatcher: Dispatcher,
    reconciler: StatusReconciler,
    default_region: String,
    poll: PollSettings,
}

impl TaskService {
    pub fn new(backend: SharedBackend, config: &ServiceConfig) -> Self {
        Self {
            dispatcher: Dispatcher::from_settings(backend.clone(), &config.dispatch),
            reconciler: StatusReconciler::new(backend.clone()),
            backend,
            default_region: config.dispatch.default_region.clone(),
            poll: config.poll.clone(),
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn reconciler(&self) -> &StatusReconciler {
        &self.reconciler
    }

    /// Submit a task, generating its id when the request carries none
    pub async fn submit(&self, request: DispatchRequest) -> Result<DispatchResponse> {
        let task_id = request
            .task_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let region = request
            .region
            .clone()
            .unwrap_or_else(|| self.default_region.clone());

        debug!(task_id = %task_id, region = %region, mode = %request.task_type, "Submitting task");

        let outcome = self
            .dispatcher
            .dispatch(request.task_type, &region, &task_id, &request.command, request.args())
            .await?;

        Ok(outcome.into_response())
    }

    /// Current status of a task
    pub async fn status(&self, task_id: &str) -> TaskStatus {
        self.reconciler.query(task_id).await
    }

    /// Poll until the task reaches a terminal status or the attempt budget is spent
    ///
    /// Returns the last snapshot either way.
    pub async fn wait_for_terminal(&self, task_id: &str) -> TaskStatus {
        let mut backoff = ExponentialBackoff {
            initial_interval: Duration::from_millis(self.poll.initial_interval_ms),
            max_interval: Duration::from_millis(self.poll.max_interval_ms),
            max_elapsed_time: None,
            ..Default::default()
        };
        let max_attempts = self.poll.max_attempts.max(1);

        let mut attempt = 1;
        loop {
            let status = self.reconciler.query(task_id).await;
            if status.is_terminal() {
                info!(task_id = %task_id, status = %status.status(), attempts = attempt, "Task reached terminal status");
                return status;
            }
            if attempt >= max_attempts {
                warn!(task_id = %task_id, status = %status.status(), attempts = attempt, "Gave up waiting for task");
                return status;
            }

            let delay = backoff
                .next_backoff()
                .unwrap_or_else(|| Duration::from_millis(self.poll.max_interval_ms));
            debug!(task_id = %task_id, status = %status.status(), delay_ms = delay.as_millis() as u64, "Task not finished, polling again");
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    /// Request cancellation of a running task
    pub async fn cancel(&self, task_id: &str) -> Result<()> {
        self.backend.cancel(task_id).await
    }

    /// Forcibly terminate a running task
    pub async fn terminate(&self, task_id: &str, reason: &str) -> Result<()> {
        self.backend.terminate(task_id, reason).await
    }

    /// Health of the backend
    pub async fn health(&self) -> Result<BackendHealth> {
        self.backend.health_check().await
    }
}
