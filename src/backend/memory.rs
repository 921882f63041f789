//! In-process execution backend
//!
//! A simulated durable-execution engine: queues get workers that bind
//! workflow types to activities, runs are driven attempt by attempt under
//! their start-to-close timeout and retry policy, and execution ids obey
//! the requested reuse policy. Nothing is persisted.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinError;
use tracing::{debug, info, warn};

use crate::config::ServiceConfig;
use crate::error::{Error, Result};
use crate::types::{ExecutionDescription, ExecutionHandle, ExecutionOptions, NativeStatus, StartRequest};

use super::activity::{BusinessActivity, PingActivity, SharedActivity};
use super::ledger::ExecutionLedger;
use super::{BackendHealth, ExecutionBackend};

const BACKEND_NAME: &str = "memory";

// ─────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────

/// Configuration for in-memory backend behavior
#[derive(Debug, Clone)]
pub struct MemoryConfig {
    /// Simulated latency of every client call
    pub rpc_latency: Duration,

    /// Whether the backend starts reachable
    pub available: bool,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            rpc_latency: Duration::ZERO,
            available: true,
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// In-Memory Backend
// ─────────────────────────────────────────────────────────────────

/// In-process implementation of [`ExecutionBackend`]
#[derive(Clone)]
pub struct InMemoryBackend {
    inner: Arc<Inner>,
}

struct Inner {
    config: MemoryConfig,
    ledger: ExecutionLedger,
    /// queue -> workflow type -> activity
    workers: RwLock<HashMap<String, HashMap<String, SharedActivity>>>,
    available: AtomicBool,
    call_counts: RwLock<CallCounts>,
}

/// Track method call counts for verification
#[derive(Debug, Default)]
struct CallCounts {
    start_execution: u32,
    execute: u32,
    describe: u32,
    fetch_result: u32,
    cancel: u32,
    terminate: u32,
    health_check: u32,
}

impl InMemoryBackend {
    /// Create a new backend with default configuration and no workers
    pub fn new() -> Self {
        Self::with_config(MemoryConfig::default())
    }

    /// Create a new backend with custom configuration
    pub fn with_config(config: MemoryConfig) -> Self {
        let available = AtomicBool::new(config.available);
        Self {
            inner: Arc::new(Inner {
                config,
                ledger: ExecutionLedger::new(),
                workers: RwLock::new(HashMap::new()),
                available,
                call_counts: RwLock::new(CallCounts::default()),
            }),
        }
    }

    /// Create a backend with standard workers on every configured region
    pub fn from_config(config: &ServiceConfig) -> Self {
        let backend = Self::with_config(MemoryConfig {
            rpc_latency: config.backend.rpc_latency(),
            ..Default::default()
        });
        for region in &config.backend.regions {
            backend.register_standard_workers(
                region,
                &config.dispatch.async_workflow,
                &config.dispatch.sync_workflow,
                config.backend.work_duration(),
            );
        }
        backend
    }

    // ─────────────────────────────────────────────────────────────
    // Workers
    // ─────────────────────────────────────────────────────────────

    /// Register a worker on `queue` that runs `workflow_type` with `activity`
    ///
    /// Runs already waiting on the queue for that workflow type are picked up
    /// immediately, so this must be called from within a Tokio runtime.
    pub fn register_worker(&self, queue: &str, workflow_type: &str, activity: SharedActivity) {
        self.inner
            .workers
            .write()
            .entry(queue.to_string())
            .or_default()
            .insert(workflow_type.to_string(), activity.clone());

        info!(queue = %queue, workflow_type = %workflow_type, activity = %activity.name(), "Worker registered");

        for (execution_id, run_id) in self.inner.ledger.pending_on(queue, workflow_type) {
            debug!(task_id = %execution_id, run_id = %run_id, "Picking up waiting execution");
            self.spawn_driver(&execution_id, &run_id, activity.clone());
        }
    }

    /// Register the business and ping workers on `queue`
    pub fn register_standard_workers(
        &self,
        queue: &str,
        async_workflow: &str,
        sync_workflow: &str,
        work_duration: Duration,
    ) {
        self.register_worker(queue, async_workflow, Arc::new(BusinessActivity::new(work_duration)));
        self.register_worker(queue, sync_workflow, Arc::new(PingActivity));
    }

    /// Queues that currently have at least one worker
    pub fn worker_queues(&self) -> Vec<String> {
        let mut queues: Vec<String> = self.inner.workers.read().keys().cloned().collect();
        queues.sort();
        queues
    }

    fn activity_for(&self, queue: &str, workflow_type: &str) -> Option<SharedActivity> {
        self.inner
            .workers
            .read()
            .get(queue)
            .and_then(|types| types.get(workflow_type))
            .cloned()
    }

    // ─────────────────────────────────────────────────────────────
    // Test & Simulation Controls
    // ─────────────────────────────────────────────────────────────

    /// Make the backend reachable or unreachable
    pub fn set_available(&self, available: bool) {
        self.inner.available.store(available, Ordering::SeqCst);
        if available {
            info!(backend = BACKEND_NAME, "Backend reachable");
        } else {
            warn!(backend = BACKEND_NAME, "Backend unreachable");
        }
    }

    pub fn is_available(&self) -> bool {
        self.inner.available.load(Ordering::SeqCst)
    }

    /// Get the number of times a method was called
    pub fn call_count(&self, method: &str) -> u32 {
        let counts = self.inner.call_counts.read();
        match method {
            "start_execution" => counts.start_execution,
            "execute" => counts.execute,
            "describe" => counts.describe,
            "fetch_result" => counts.fetch_result,
            "cancel" => counts.cancel,
            "terminate" => counts.terminate,
            "health_check" => counts.health_check,
            _ => 0,
        }
    }

    /// Reset all call counts
    pub fn reset_counts(&self) {
        *self.inner.call_counts.write() = CallCounts::default();
    }

    /// Number of execution ids the backend knows
    pub fn execution_count(&self) -> usize {
        self.inner.ledger.len()
    }

    // ─────────────────────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────────────────────

    /// Count the call, simulate latency, and fail if unreachable
    async fn rpc(&self, method: &str) -> Result<()> {
        {
            let mut counts = self.inner.call_counts.write();
            match method {
                "start_execution" => counts.start_execution += 1,
                "execute" => counts.execute += 1,
                "describe" => counts.describe += 1,
                "fetch_result" => counts.fetch_result += 1,
                "cancel" => counts.cancel += 1,
                "terminate" => counts.terminate += 1,
                _ => {}
            }
        }

        if !self.inner.config.rpc_latency.is_zero() {
            tokio::time::sleep(self.inner.config.rpc_latency).await;
        }

        if !self.is_available() {
            return Err(Error::backend_unavailable(
                BACKEND_NAME,
                format!("{} failed: connection refused", method),
            ));
        }
        Ok(())
    }

    /// Admit a start and hand it to a worker if its queue has one
    fn admit(&self, request: &StartRequest) -> Result<(ExecutionHandle, tokio::sync::watch::Receiver<NativeStatus>)> {
        let admitted = self.inner.ledger.admit(request)?;
        let handle = &admitted.0;

        match self.activity_for(&request.queue, &request.workflow_type) {
            Some(activity) => self.spawn_driver(&handle.execution_id, &handle.run_id, activity),
            None => debug!(
                task_id = %handle.execution_id,
                queue = %request.queue,
                workflow_type = %request.workflow_type,
                "No worker on queue, execution waits"
            ),
        }

        Ok(admitted)
    }

    fn spawn_driver(&self, execution_id: &str, run_id: &str, activity: SharedActivity) {
        let Some(stop_rx) = self.inner.ledger.claim(execution_id, run_id) else {
            return;
        };
        let Ok((payload, options)) = self
            .inner
            .ledger
            .with_record(execution_id, |r| (r.payload.clone(), r.options.clone()))
        else {
            return;
        };

        let inner = self.inner.clone();
        let execution_id = execution_id.to_string();
        let run_id = run_id.to_string();

        tokio::spawn(async move {
            drive_execution(inner, execution_id, run_id, activity, payload, options, stop_rx).await;
        });
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

// ─────────────────────────────────────────────────────────────────
// Execution Driver
// ─────────────────────────────────────────────────────────────────

/// Run attempts of one execution until it completes, exhausts its retries,
/// or is stopped from outside
async fn drive_execution(
    inner: Arc<Inner>,
    execution_id: String,
    run_id: String,
    activity: SharedActivity,
    payload: String,
    options: ExecutionOptions,
    mut stop_rx: oneshot::Receiver<()>,
) {
    let max_attempts = options.retry_policy.maximum_attempts.max(1);
    let mut last_timed_out = false;
    let mut last_failure = String::new();

    for attempt in 1..=max_attempts {
        if !inner.ledger.begin_attempt(&execution_id, &run_id, attempt) {
            return;
        }
        debug!(task_id = %execution_id, run_id = %run_id, attempt, "Attempt started");

        // Each attempt runs in its own task so a panicking activity fails the
        // attempt instead of taking the driver down with it.
        let mut attempt_task = tokio::spawn({
            let activity = activity.clone();
            let payload = payload.clone();
            async move { activity.execute(&payload).await }
        });
        let abort_attempt = attempt_task.abort_handle();

        let outcome = tokio::select! {
            _ = &mut stop_rx => {
                abort_attempt.abort();
                debug!(task_id = %execution_id, run_id = %run_id, "Execution stopped");
                return;
            }
            outcome = tokio::time::timeout(options.start_to_close_timeout, &mut attempt_task) => outcome,
        };

        match outcome {
            Ok(Ok(Ok(result))) => {
                if inner.ledger.close_run(&execution_id, &run_id, NativeStatus::Completed, Some(result), None) {
                    info!(task_id = %execution_id, run_id = %run_id, attempt, "Execution completed");
                }
                return;
            }
            Ok(Ok(Err(e))) => {
                warn!(task_id = %execution_id, run_id = %run_id, attempt, error = %e, "Attempt failed");
                last_timed_out = false;
                last_failure = e.to_string();
            }
            Ok(Err(join_err)) => {
                let message = attempt_abort_message(join_err);
                warn!(task_id = %execution_id, run_id = %run_id, attempt, error = %message, "Attempt aborted");
                last_timed_out = false;
                last_failure = message;
            }
            Err(_) => {
                abort_attempt.abort();
                warn!(
                    task_id = %execution_id,
                    run_id = %run_id,
                    attempt,
                    timeout_ms = options.start_to_close_timeout.as_millis() as u64,
                    "Attempt timed out"
                );
                last_timed_out = true;
            }
        }

        if attempt < max_attempts {
            let delay = options.retry_policy.delay_after(attempt);
            tokio::select! {
                _ = &mut stop_rx => return,
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    let closed = if last_timed_out {
        inner.ledger.close_run(&execution_id, &run_id, NativeStatus::TimedOut, None, None)
    } else {
        inner
            .ledger
            .close_run(&execution_id, &run_id, NativeStatus::Failed, None, Some(last_failure))
    };

    if closed {
        warn!(
            task_id = %execution_id,
            run_id = %run_id,
            attempts = max_attempts,
            timed_out = last_timed_out,
            "Execution closed without a result"
        );
    }
}

/// Failure message for an attempt task that panicked or was cancelled
fn attempt_abort_message(err: JoinError) -> String {
    if !err.is_panic() {
        return format!("activity was cancelled: {}", err);
    }
    let payload = err.into_panic();
    let reason = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    format!("activity panicked: {}", reason)
}

// ─────────────────────────────────────────────────────────────────
// ExecutionBackend Implementation
// ─────────────────────────────────────────────────────────────────

#[async_trait]
impl ExecutionBackend for InMemoryBackend {
    fn name(&self) -> &'static str {
        BACKEND_NAME
    }

    async fn health_check(&self) -> Result<BackendHealth> {
        self.inner.call_counts.write().health_check += 1;

        let operational = self.is_available();
        Ok(BackendHealth {
            operational,
            running_executions: self.inner.ledger.running_count(),
            worker_queues: self.worker_queues(),
            error: (!operational).then(|| "backend unreachable".to_string()),
        })
    }

    async fn start_execution(&self, request: StartRequest) -> Result<ExecutionHandle> {
        self.rpc("start_execution").await?;
        let (handle, _) = self.admit(&request)?;
        Ok(handle)
    }

    async fn execute(&self, request: StartRequest) -> Result<String> {
        self.rpc("execute").await?;
        let (handle, mut status_rx) = self.admit(&request)?;

        status_rx
            .wait_for(|status| status.is_closed())
            .await
            .map_err(|_| Error::Internal(format!("execution {} was dropped", handle.execution_id)))?;

        self.inner.ledger.with_record(&handle.execution_id, |record| {
            if record.run_id == handle.run_id {
                record.outcome()
            } else {
                Err(Error::ExecutionNotFound {
                    execution_id: format!("{} (run {})", handle.execution_id, handle.run_id),
                })
            }
        })?
    }

    async fn describe(&self, execution_id: &str) -> Result<ExecutionDescription> {
        self.rpc("describe").await?;
        self.inner.ledger.with_record(execution_id, |record| record.describe())
    }

    async fn fetch_result(&self, execution_id: &str, run_id: Option<&str>) -> Result<String> {
        self.rpc("fetch_result").await?;
        self.inner.ledger.with_record(execution_id, |record| match run_id {
            Some(run_id) if run_id != record.run_id => Err(Error::ExecutionNotFound {
                execution_id: format!("{} (run {})", execution_id, run_id),
            }),
            _ => record.outcome(),
        })?
    }

    async fn cancel(&self, execution_id: &str) -> Result<()> {
        self.rpc("cancel").await?;
        let handle = self.inner.ledger.stop(execution_id, NativeStatus::Canceled, None)?;
        info!(task_id = %handle.execution_id, run_id = %handle.run_id, "Execution canceled");
        Ok(())
    }

    async fn terminate(&self, execution_id: &str, reason: &str) -> Result<()> {
        self.rpc("terminate").await?;
        let handle = self
            .inner
            .ledger
            .stop(execution_id, NativeStatus::Terminated, Some(reason.to_string()))?;
        info!(task_id = %handle.execution_id, run_id = %handle.run_id, reason = %reason, "Execution terminated");
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::FnActivity;
    use crate::types::{ReusePolicy, RetryPolicy};
    use std::sync::atomic::AtomicU32;

    fn make_request(id: &str, workflow_type: &str, attempts: u32, timeout: Duration) -> StartRequest {
        StartRequest {
            queue: "queue-a".into(),
            execution_id: id.into(),
            workflow_type: workflow_type.into(),
            payload: "X".into(),
            options: ExecutionOptions {
                start_to_close_timeout: timeout,
                retry_policy: RetryPolicy {
                    maximum_attempts: attempts,
                    ..Default::default()
                },
            },
            reuse_policy: ReusePolicy::AllowDuplicateFailedOnly,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_business_workflow() {
        let backend = InMemoryBackend::new();
        backend.register_standard_workers("queue-a", "TaskWorkflow", "PingWorkflow", Duration::from_secs(10));

        let result = backend
            .execute(make_request("t1", "TaskWorkflow", 1, Duration::from_secs(60)))
            .await
            .unwrap();
        assert!(result.starts_with("Task result: "));

        let desc = backend.describe("t1").await.unwrap();
        assert_eq!(desc.status, NativeStatus::Completed);
        assert_eq!(desc.attempt, 1);
        assert!(desc.close_time.is_some());
    }

    #[tokio::test]
    async fn test_unregistered_queue_stays_running() {
        let backend = InMemoryBackend::new();
        let handle = backend
            .start_execution(make_request("t1", "TaskWorkflow", 1, Duration::from_secs(1)))
            .await
            .unwrap();

        let desc = backend.describe("t1").await.unwrap();
        assert_eq!(desc.run_id, handle.run_id);
        assert_eq!(desc.status, NativeStatus::Running);
        assert_eq!(desc.attempt, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_worker_picks_up_waiting_run() {
        let backend = InMemoryBackend::new();
        let request = make_request("t1", "PingWorkflow", 1, Duration::from_secs(1));
        let waiter = {
            let backend = backend.clone();
            tokio::spawn(async move { backend.execute(request).await })
        };
        tokio::task::yield_now().await;

        backend.register_worker("queue-a", "PingWorkflow", Arc::new(PingActivity));

        let result = waiter.await.unwrap().unwrap();
        assert!(result.starts_with("Pong: "));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let backend = InMemoryBackend::new();
        backend.register_worker(
            "queue-a",
            "Flaky",
            FnActivity::shared("flaky", move |_payload: String| {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(anyhow::anyhow!("transient"))
                    } else {
                        Ok("done".to_string())
                    }
                }
            }),
        );

        let result = backend
            .execute(make_request("t1", "Flaky", 3, Duration::from_secs(5)))
            .await
            .unwrap();

        assert_eq!(result, "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(backend.describe("t1").await.unwrap().attempt, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_attempts_fail() {
        let backend = InMemoryBackend::new();
        backend.register_worker(
            "queue-a",
            "Broken",
            FnActivity::shared("broken", |_payload: String| async move {
                Err::<String, _>(anyhow::anyhow!("bad payload"))
            }),
        );

        let err = backend
            .execute(make_request("t1", "Broken", 2, Duration::from_secs(5)))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::ExecutionFailed { attempts: 2, .. }));
        assert!(err.to_string().contains("bad payload"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_attempt_is_retried() {
        let backend = InMemoryBackend::new();
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        backend.register_worker(
            "queue-a",
            "Fragile",
            FnActivity::shared("fragile", move |_payload: String| {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                        panic!("index out of bounds");
                    }
                    Ok::<_, anyhow::Error>("recovered".to_string())
                }
            }),
        );

        let result = backend
            .execute(make_request("t1", "Fragile", 2, Duration::from_secs(5)))
            .await
            .unwrap();

        assert_eq!(result, "recovered");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_panic_on_last_attempt_fails_run() {
        let backend = InMemoryBackend::new();
        backend.register_worker(
            "queue-a",
            "Panics",
            FnActivity::shared("panics", |_payload: String| async move {
                if true {
                    panic!("corrupt state");
                }
                Ok::<_, anyhow::Error>(String::new())
            }),
        );

        let err = backend
            .execute(make_request("t1", "Panics", 1, Duration::from_secs(5)))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::ExecutionFailed { .. }));
        assert!(err.to_string().contains("activity panicked: corrupt state"));
        assert_eq!(backend.describe("t1").await.unwrap().status, NativeStatus::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_final_timeout_is_timed_out() {
        let backend = InMemoryBackend::new();
        backend.register_worker("queue-a", "Slow", Arc::new(BusinessActivity::new(Duration::from_secs(30))));

        let err = backend
            .execute(make_request("t1", "Slow", 2, Duration::from_secs(1)))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::ExecutionTimedOut { attempts: 2, .. }));
        assert_eq!(backend.describe("t1").await.unwrap().status, NativeStatus::TimedOut);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_and_terminate() {
        let backend = InMemoryBackend::new();
        backend.register_worker("queue-a", "Slow", Arc::new(BusinessActivity::new(Duration::from_secs(30))));

        backend.start_execution(make_request("t1", "Slow", 1, Duration::from_secs(60))).await.unwrap();
        backend.start_execution(make_request("t2", "Slow", 1, Duration::from_secs(60))).await.unwrap();

        backend.cancel("t1").await.unwrap();
        backend.terminate("t2", "operator request").await.unwrap();

        assert_eq!(backend.describe("t1").await.unwrap().status, NativeStatus::Canceled);
        assert_eq!(backend.describe("t2").await.unwrap().status, NativeStatus::Terminated);
        assert!(backend.cancel("t1").await.is_err());
        assert!(matches!(
            backend.cancel("missing").await,
            Err(Error::ExecutionNotFound { .. })
        ));

        // stopped runs never complete afterwards
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(backend.describe("t1").await.unwrap().status, NativeStatus::Canceled);
    }

    #[tokio::test]
    async fn test_unavailable_backend() {
        let backend = InMemoryBackend::with_config(MemoryConfig {
            available: false,
            ..Default::default()
        });

        let err = backend
            .start_execution(make_request("t1", "TaskWorkflow", 1, Duration::from_secs(1)))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::BackendUnavailable { .. }));
        assert_eq!(backend.execution_count(), 0);

        let health = backend.health_check().await.unwrap();
        assert!(!health.operational);
        assert!(health.error.is_some());

        backend.set_available(true);
        assert!(backend.describe("t1").await.is_err());
        assert!(backend.health_check().await.unwrap().operational);
    }

    #[tokio::test]
    async fn test_fetch_result_pinned_run() {
        let backend = InMemoryBackend::new();
        backend.register_worker("queue-a", "PingWorkflow", Arc::new(PingActivity));

        let result = backend
            .execute(make_request("t1", "PingWorkflow", 1, Duration::from_secs(1)))
            .await
            .unwrap();
        let run_id = backend.describe("t1").await.unwrap().run_id;

        assert_eq!(backend.fetch_result("t1", Some(&run_id)).await.unwrap(), result);
        assert_eq!(backend.fetch_result("t1", None).await.unwrap(), result);
        assert!(matches!(
            backend.fetch_result("t1", Some("stale")).await,
            Err(Error::ExecutionNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_from_config_registers_regions() {
        let mut config = ServiceConfig::default();
        config.backend.regions = vec!["queue-b".into(), "queue-a".into()];

        let backend = InMemoryBackend::from_config(&config);
        assert_eq!(backend.worker_queues(), vec!["queue-a", "queue-b"]);
    }

    #[tokio::test]
    async fn test_call_counts() {
        let backend = InMemoryBackend::new();
        let _ = backend.describe("t1").await;
        let _ = backend.describe("t1").await;
        let _ = backend.fetch_result("t1", None).await;

        assert_eq!(backend.call_count("describe"), 2);
        assert_eq!(backend.call_count("fetch_result"), 1);
        assert_eq!(backend.call_count("unknown"), 0);

        backend.reset_counts();
        assert_eq!(backend.call_count("describe"), 0);
    }
}
