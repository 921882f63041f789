//! Common test utilities and fixtures
//!
//! This module provides shared test infrastructure

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use regiongate::backend::{FnActivity, InMemoryBackend};
use regiongate::{ServiceConfig, TaskService};

/// Get the path to the test fixtures directory
pub fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
}

/// Get a path to a specific fixture file
pub fn fixture_path(name: &str) -> PathBuf {
    fixtures_dir().join(name)
}

/// Get the valid config fixture path
pub fn valid_config_fixture() -> PathBuf {
    fixture_path("valid_config.toml")
}

/// Get the invalid config fixture path
pub fn invalid_config_fixture() -> PathBuf {
    fixture_path("invalid_config.toml")
}

/// Configuration with one worker region, "queue-a", and 10s business work
pub fn test_config() -> ServiceConfig {
    let mut config = ServiceConfig::default();
    config.dispatch.default_region = "queue-a".to_string();
    config.backend.regions = vec!["queue-a".to_string()];
    config.backend.work_duration_ms = 10_000;
    config.poll.initial_interval_ms = 100;
    config.poll.max_interval_ms = 1_000;
    config.poll.max_attempts = 200;
    config
}

/// Service and its backend handle built from `config`
pub fn build_service(config: &ServiceConfig) -> (TaskService, InMemoryBackend) {
    let backend = InMemoryBackend::from_config(config);
    let service = TaskService::new(Arc::new(backend.clone()), config);
    (service, backend)
}

/// Register a business worker on `queue` that always fails, counting attempts
pub fn register_failing_worker(backend: &InMemoryBackend, queue: &str, workflow_type: &str) -> Arc<AtomicU32> {
    let attempts = Arc::new(AtomicU32::new(0));
    let counter = attempts.clone();
    backend.register_worker(
        queue,
        workflow_type,
        FnActivity::shared("always-fails", move |payload: String| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<String, _>(anyhow::anyhow!("cannot process payload '{}'", payload))
            }
        }),
    );
    attempts
}

/// Register a worker on `queue` that sleeps for `work` before answering
pub fn register_slow_worker(backend: &InMemoryBackend, queue: &str, workflow_type: &str, work: Duration) {
    backend.register_worker(
        queue,
        workflow_type,
        FnActivity::shared("slow", move |_payload: String| async move {
            tokio::time::sleep(work).await;
            Ok("slow result".to_string())
        }),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixtures_exist() {
        assert!(fixtures_dir().exists(), "Fixtures directory should exist");
        assert!(valid_config_fixture().exists(), "Valid config fixture should exist");
        assert!(invalid_config_fixture().exists(), "Invalid config fixture should exist");
    }
}
