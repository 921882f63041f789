//! Execution ledger
//!
//! Tracks the latest run under every execution id together with its state,
//! outcome and the signals used to stop or await it.

use std::collections::HashMap;
use std::time::Instant;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::sync::{oneshot, watch};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::types::{ExecutionDescription, ExecutionHandle, ExecutionOptions, NativeStatus, StartRequest};

// ─────────────────────────────────────────────────────────────────
// Execution Record
// ─────────────────────────────────────────────────────────────────

/// The latest run under one execution id
#[derive(Debug)]
pub struct ExecutionRecord {
    pub execution_id: String,
    pub run_id: String,
    pub workflow_type: String,
    pub queue: String,
    pub payload: String,
    pub options: ExecutionOptions,

    /// Current state
    pub status: NativeStatus,

    /// Attempt currently running, or the last one made (0 until a worker picks it up)
    pub attempt: u32,

    /// Result of a completed run
    pub result: Option<String>,

    /// Failure message or termination reason
    pub failure: Option<String>,

    pub start_time: DateTime<Utc>,
    pub close_time: Option<DateTime<Utc>>,
    pub started_at: Instant,

    /// Whether a worker has started driving this run
    pub driven: bool,

    /// Stop signal for the driving worker
    pub cancel_tx: Option<oneshot::Sender<()>>,

    status_tx: watch::Sender<NativeStatus>,
}

impl ExecutionRecord {
    fn new(request: &StartRequest) -> Self {
        let (status_tx, _) = watch::channel(NativeStatus::Running);
        Self {
            execution_id: request.execution_id.clone(),
            run_id: Uuid::new_v4().to_string(),
            workflow_type: request.workflow_type.clone(),
            queue: request.queue.clone(),
            payload: request.payload.clone(),
            options: request.options.clone(),
            status: NativeStatus::Running,
            attempt: 0,
            result: None,
            failure: None,
            start_time: Utc::now(),
            close_time: None,
            started_at: Instant::now(),
            driven: false,
            cancel_tx: None,
            status_tx,
        }
    }

    pub fn handle(&self) -> ExecutionHandle {
        ExecutionHandle {
            execution_id: self.execution_id.clone(),
            run_id: self.run_id.clone(),
        }
    }

    pub fn describe(&self) -> ExecutionDescription {
        ExecutionDescription {
            execution_id: self.execution_id.clone(),
            run_id: self.run_id.clone(),
            workflow_type: self.workflow_type.clone(),
            queue: self.queue.clone(),
            status: self.status.clone(),
            attempt: self.attempt,
            start_time: self.start_time,
            close_time: self.close_time,
        }
    }

    /// Subscribe to state changes of this run
    pub fn subscribe(&self) -> watch::Receiver<NativeStatus> {
        self.status_tx.subscribe()
    }

    /// Close the run, waking awaiters and stopping its worker
    fn close(&mut self, status: NativeStatus, result: Option<String>, failure: Option<String>) {
        self.status = status.clone();
        self.result = result;
        self.failure = failure;
        self.close_time = Some(Utc::now());
        if let Some(tx) = self.cancel_tx.take() {
            let _ = tx.send(());
        }
        self.status_tx.send_replace(status);
    }

    /// Outcome of a closed run; a failed run yields its failure as the error
    pub fn outcome(&self) -> Result<String> {
        match &self.status {
            NativeStatus::Completed => self
                .result
                .clone()
                .ok_or_else(|| Error::Internal(format!("completed run {} has no result", self.run_id))),
            NativeStatus::Failed => Err(Error::ExecutionFailed {
                task_id: Some(self.execution_id.clone()),
                message: self.failure.clone().unwrap_or_else(|| "unknown failure".to_string()),
                attempts: self.attempt,
            }),
            NativeStatus::TimedOut => Err(Error::ExecutionTimedOut {
                task_id: self.execution_id.clone(),
                attempts: self.attempt,
            }),
            NativeStatus::Canceled => Err(Error::ExecutionCanceled {
                task_id: self.execution_id.clone(),
            }),
            NativeStatus::Terminated => Err(Error::ExecutionTerminated {
                task_id: self.execution_id.clone(),
                reason: self.failure.clone().unwrap_or_default(),
            }),
            NativeStatus::Running => Err(Error::Rpc(format!(
                "execution {} (run {}) has not closed yet",
                self.execution_id, self.run_id
            ))),
            NativeStatus::Other(name) => Err(Error::Rpc(format!(
                "execution {} is in unsupported state {}",
                self.execution_id, name
            ))),
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Execution Ledger
// ─────────────────────────────────────────────────────────────────

/// All executions known to the backend, keyed by execution id
#[derive(Debug, Default)]
pub struct ExecutionLedger {
    records: RwLock<HashMap<String, ExecutionRecord>>,
}

impl ExecutionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit a start request, superseding a closed run if the reuse policy allows
    ///
    /// The check and the insert happen under one write lock, so of two
    /// concurrent starts for the same id at most one is admitted.
    pub fn admit(&self, request: &StartRequest) -> Result<(ExecutionHandle, watch::Receiver<NativeStatus>)> {
        let mut records = self.records.write();

        if let Some(previous) = records.get(&request.execution_id) {
            if previous.status == NativeStatus::Running {
                return Err(Error::AlreadyRunning {
                    task_id: previous.execution_id.clone(),
                    run_id: previous.run_id.clone(),
                });
            }
            if !request.reuse_policy.permits(&previous.status) {
                return Err(Error::TaskIdReused {
                    task_id: previous.execution_id.clone(),
                    status: previous.status.to_string(),
                });
            }
        }

        let record = ExecutionRecord::new(request);
        let admitted = (record.handle(), record.subscribe());
        records.insert(request.execution_id.clone(), record);
        Ok(admitted)
    }

    /// Run `f` against the record for `execution_id`
    pub fn with_record<T>(&self, execution_id: &str, f: impl FnOnce(&ExecutionRecord) -> T) -> Result<T> {
        self.records
            .read()
            .get(execution_id)
            .map(f)
            .ok_or_else(|| Error::ExecutionNotFound {
                execution_id: execution_id.to_string(),
            })
    }

    /// Mark a run as driven by a worker and hand back its stop signal
    ///
    /// Returns `None` if the run is no longer current, already closed or
    /// already driven.
    pub fn claim(&self, execution_id: &str, run_id: &str) -> Option<oneshot::Receiver<()>> {
        let mut records = self.records.write();
        let record = records.get_mut(execution_id)?;
        if record.run_id != run_id || record.status.is_closed() || record.driven {
            return None;
        }
        let (cancel_tx, cancel_rx) = oneshot::channel();
        record.driven = true;
        record.cancel_tx = Some(cancel_tx);
        Some(cancel_rx)
    }

    /// Record that `attempt` is starting; false if the run was closed meanwhile
    pub fn begin_attempt(&self, execution_id: &str, run_id: &str, attempt: u32) -> bool {
        let mut records = self.records.write();
        match records.get_mut(execution_id) {
            Some(record) if record.run_id == run_id && !record.status.is_closed() => {
                record.attempt = attempt;
                true
            }
            _ => false,
        }
    }

    /// Close a specific run if it is still the current, running one
    pub fn close_run(
        &self,
        execution_id: &str,
        run_id: &str,
        status: NativeStatus,
        result: Option<String>,
        failure: Option<String>,
    ) -> bool {
        let mut records = self.records.write();
        match records.get_mut(execution_id) {
            Some(record) if record.run_id == run_id && !record.status.is_closed() => {
                record.close(status, result, failure);
                true
            }
            _ => false,
        }
    }

    /// Stop the current run of an execution from outside its worker
    pub fn stop(&self, execution_id: &str, status: NativeStatus, reason: Option<String>) -> Result<ExecutionHandle> {
        let mut records = self.records.write();
        let record = records.get_mut(execution_id).ok_or_else(|| Error::ExecutionNotFound {
            execution_id: execution_id.to_string(),
        })?;

        if record.status.is_closed() {
            return Err(Error::Rpc(format!(
                "execution {} already closed as {}",
                execution_id, record.status
            )));
        }

        record.close(status, None, reason);
        Ok(record.handle())
    }

    /// Runs on `queue` of `workflow_type` that no worker has picked up yet
    pub fn pending_on(&self, queue: &str, workflow_type: &str) -> Vec<(String, String)> {
        self.records
            .read()
            .values()
            .filter(|r| !r.driven && !r.status.is_closed() && r.queue == queue && r.workflow_type == workflow_type)
            .map(|r| (r.execution_id.clone(), r.run_id.clone()))
            .collect()
    }

    /// Number of runs that have not closed
    pub fn running_count(&self) -> usize {
        self.records
            .read()
            .values()
            .filter(|r| !r.status.is_closed())
            .count()
    }

    /// Number of execution ids known
    pub fn len(&self) -> usize {
        self.records.read().len()
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────
