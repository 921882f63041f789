//! Business activities run by backend workers
//!
//! An activity is the black-box unit of work behind a workflow type: it takes
//! the task payload and returns a result string. Failures are ordinary
//! `anyhow` errors; the backend turns them into execution failures.

use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

/// A unit of business work bound to a workflow type
#[async_trait]
pub trait Activity: Send + Sync {
    /// Activity name, used in logs
    fn name(&self) -> &str;

    /// Run one attempt against the payload
    async fn execute(&self, payload: &str) -> anyhow::Result<String>;
}

/// Type alias for a shared activity reference
pub type SharedActivity = Arc<dyn Activity>;

fn epoch_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

// ─────────────────────────────────────────────────────────────────
// Built-in Activities
// ─────────────────────────────────────────────────────────────────

/// Simulated long-running business work
#[derive(Debug, Clone)]
pub struct BusinessActivity {
    work_duration: Duration,
}

impl BusinessActivity {
    pub fn new(work_duration: Duration) -> Self {
        Self { work_duration }
    }
}

impl Default for BusinessActivity {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

#[async_trait]
impl Activity for BusinessActivity {
    fn name(&self) -> &str {
        "business"
    }

    async fn execute(&self, payload: &str) -> anyhow::Result<String> {
        debug!(payload_len = payload.len(), duration_ms = self.work_duration.as_millis() as u64, "Business activity started");
        tokio::time::sleep(self.work_duration).await;
        Ok(format!("Task result: {}", epoch_millis()))
    }
}

/// Immediate liveness answer
#[derive(Debug, Clone, Copy, Default)]
pub struct PingActivity;

#[async_trait]
impl Activity for PingActivity {
    fn name(&self) -> &str {
        "ping"
    }

    async fn execute(&self, _payload: &str) -> anyhow::Result<String> {
        Ok(format!("Pong: {}", epoch_millis()))
    }
}

/// Activity backed by an async closure
pub struct FnActivity<F> {
    name: String,
    func: F,
}

impl<F, Fut> FnActivity<F>
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<String>> + Send + 'static,
{
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }

    /// Wrap into a shared activity
    pub fn shared(name: impl Into<String>, func: F) -> SharedActivity {
        Arc::new(Self::new(name, func))
    }
}

#[async_trait]
impl<F, Fut> Activity for FnActivity<F>
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<String>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, payload: &str) -> anyhow::Result<String> {
        (self.func)(payload.to_string()).await
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────
