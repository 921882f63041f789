//! Task dispatcher
//!
//! Routes a task to its region's queue under an idempotent execution id and
//! either starts it (ASYNC) or runs it to completion (SYNC).

use std::time::Instant;

use tracing::{debug, error, info, warn};

use crate::backend::SharedBackend;
use crate::config::DispatchSettings;
use crate::error::{Error, ErrorKind, Result};
use crate::types::{DispatchResponse, ReusePolicy, StartRequest, TaskArgs, TaskIdentity, TaskType};

use super::options::ExecutionOptionsBuilder;

/// Outcome of an accepted dispatch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The backend accepted the start and assigned a run id
    Started(TaskIdentity),
    /// The execution ran to completion
    Completed { task_id: String, result: String },
}

impl DispatchOutcome {
    pub fn task_id(&self) -> &str {
        match self {
            DispatchOutcome::Started(identity) => &identity.task_id,
            DispatchOutcome::Completed { task_id, .. } => task_id,
        }
    }

    /// Run id, only for async dispatches
    pub fn run_id(&self) -> Option<&str> {
        match self {
            DispatchOutcome::Started(identity) => identity.run_id.as_deref(),
            DispatchOutcome::Completed { .. } => None,
        }
    }

    /// Result, only for sync dispatches
    pub fn result(&self) -> Option<&str> {
        match self {
            DispatchOutcome::Started(_) => None,
            DispatchOutcome::Completed { result, .. } => Some(result),
        }
    }

    pub fn into_response(self) -> DispatchResponse {
        match self {
            DispatchOutcome::Started(identity) => DispatchResponse {
                task_id: identity.task_id,
                run_id: identity.run_id,
                result: None,
            },
            DispatchOutcome::Completed { task_id, result } => DispatchResponse {
                task_id,
                run_id: None,
                result: Some(result),
            },
        }
    }
}

/// Turns task submissions into routed, idempotent execution requests
///
/// Stateless apart from the shared backend client; safe to share behind an
/// `Arc`. Failed dispatches are never retried here.
#[derive(Clone)]
pub struct Dispatcher {
    backend: SharedBackend,
    options: ExecutionOptionsBuilder,
    async_workflow: String,
    sync_workflow: String,
}

impl Dispatcher {
    /// Dispatcher with built-in defaults
    pub fn new(backend: SharedBackend) -> Self {
        Self::from_settings(backend, &DispatchSettings::default())
    }

    /// Dispatcher using the configured workflow types and option defaults
    pub fn from_settings(backend: SharedBackend, settings: &DispatchSettings) -> Self {
        Self {
            backend,
            options: ExecutionOptionsBuilder::from_settings(settings),
            async_workflow: settings.async_workflow.clone(),
            sync_workflow: settings.sync_workflow.clone(),
        }
    }

    pub fn with_options(mut self, options: ExecutionOptionsBuilder) -> Self {
        self.options = options;
        self
    }

    /// Workflow type started for a dispatch mode
    pub fn workflow_for(&self, task_type: TaskType) -> &str {
        match task_type {
            TaskType::Sync => &self.sync_workflow,
            TaskType::Async => &self.async_workflow,
        }
    }

    /// Dispatch a task in the given mode
    pub async fn dispatch(
        &self,
        task_type: TaskType,
        region: &str,
        task_id: &str,
        payload: &str,
        args: TaskArgs,
    ) -> Result<DispatchOutcome> {
        match task_type {
            TaskType::Async => self
                .dispatch_async(region, task_id, payload, args)
                .await
                .map(DispatchOutcome::Started),
            TaskType::Sync => self
                .dispatch_sync(region, task_id, payload, args)
                .await
                .map(|result| DispatchOutcome::Completed {
                    task_id: task_id.to_string(),
                    result,
                }),
        }
    }

    /// Start a task and return as soon as the backend accepts it
    pub async fn dispatch_async(
        &self,
        region: &str,
        task_id: &str,
        payload: &str,
        args: TaskArgs,
    ) -> Result<TaskIdentity> {
        let request = self.start_request(TaskType::Async, region, task_id, payload, &args)?;

        let handle = self
            .backend
            .start_execution(request)
            .await
            .map_err(|e| log_rejection(TaskType::Async, region, task_id, e))?;

        info!(
            mode = %TaskType::Async,
            region = %region,
            task_id = %task_id,
            run_id = %handle.run_id,
            "Task dispatched"
        );

        Ok(TaskIdentity {
            task_id: handle.execution_id,
            region: region.to_string(),
            run_id: Some(handle.run_id),
        })
    }

    /// Run a task and block until it reaches a terminal state
    pub async fn dispatch_sync(
        &self,
        region: &str,
        task_id: &str,
        payload: &str,
        args: TaskArgs,
    ) -> Result<String> {
        let request = self.start_request(TaskType::Sync, region, task_id, payload, &args)?;
        debug!(
            region = %region,
            task_id = %task_id,
            attempts = request.options.retry_policy.maximum_attempts,
            worst_case_ms = u64::try_from(request.options.worst_case_duration().as_millis()).unwrap_or(u64::MAX),
            "Blocking on task"
        );
        let started = Instant::now();

        let result = self
            .backend
            .execute(request)
            .await
            .map_err(|e| log_rejection(TaskType::Sync, region, task_id, e))?;

        info!(
            mode = %TaskType::Sync,
            region = %region,
            task_id = %task_id,
            cost_ms = started.elapsed().as_millis() as u64,
            "Task completed"
        );

        Ok(result)
    }

    fn start_request(
        &self,
        task_type: TaskType,
        region: &str,
        task_id: &str,
        payload: &str,
        args: &TaskArgs,
    ) -> Result<StartRequest> {
        validate(region, task_id, args)?;

        Ok(StartRequest {
            queue: region.to_string(),
            execution_id: task_id.to_string(),
            workflow_type: self.workflow_for(task_type).to_string(),
            payload: payload.to_string(),
            options: self.options.build(args),
            reuse_policy: ReusePolicy::AllowDuplicateFailedOnly,
        })
    }
}

fn validate(region: &str, task_id: &str, args: &TaskArgs) -> Result<()> {
    if region.trim().is_empty() {
        return Err(Error::invalid_request("region", "must not be empty"));
    }
    if task_id.trim().is_empty() {
        return Err(Error::invalid_request("taskId", "must not be empty"));
    }
    if args.retry_count == Some(0) {
        return Err(Error::invalid_request("retryCount", "must be at least 1"));
    }
    if args.execution_timeout.is_some_and(|t| t.is_zero()) {
        return Err(Error::invalid_request("executionTimeout", "must be greater than zero"));
    }
    Ok(())
}

fn log_rejection(task_type: TaskType, region: &str, task_id: &str, err: Error) -> Error {
    match err.kind() {
        ErrorKind::Conflict => {
            warn!(mode = %task_type, region = %region, task_id = %task_id, error = %err, "Dispatch rejected: task id conflict")
        }
        ErrorKind::Execution => {
            warn!(mode = %task_type, region = %region, task_id = %task_id, error = %err, "Task execution failed")
        }
        _ => {
            error!(mode = %task_type, region = %region, task_id = %task_id, error = %err.format_for_log(), "Dispatch failed")
        }
    }
    err
}
