//! Execution options builder
//!
//! Translates task-control arguments into the per-attempt timeout and retry
//! policy the backend understands.

use std::time::Duration;

use crate::config::DispatchSettings;
use crate::types::{ExecutionOptions, RetryPolicy, TaskArgs};

/// Default per-attempt timeout
pub const DEFAULT_EXECUTION_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Default maximum attempts (no retry)
pub const DEFAULT_RETRY_COUNT: u32 = 1;

/// Builds [`ExecutionOptions`] from [`TaskArgs`], filling unset fields
#[derive(Debug, Clone)]
pub struct ExecutionOptionsBuilder {
    default_timeout: Duration,
    default_retry_count: u32,
    initial_interval: Duration,
    backoff_coefficient: f64,
    maximum_interval: Duration,
}

impl Default for ExecutionOptionsBuilder {
    fn default() -> Self {
        Self {
            default_timeout: DEFAULT_EXECUTION_TIMEOUT,
            default_retry_count: DEFAULT_RETRY_COUNT,
            initial_interval: Duration::from_secs(1),
            backoff_coefficient: 2.0,
            maximum_interval: Duration::from_secs(100),
        }
    }
}

impl ExecutionOptionsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder using the configured dispatch defaults
    pub fn from_settings(settings: &DispatchSettings) -> Self {
        Self {
            default_timeout: settings.default_execution_timeout(),
            default_retry_count: settings.default_retry_count,
            initial_interval: Duration::from_millis(settings.retry_initial_interval_ms),
            backoff_coefficient: settings.retry_backoff_coefficient,
            maximum_interval: Duration::from_millis(settings.retry_max_interval_ms),
        }
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn with_retry_interval(mut self, initial: Duration, coefficient: f64, maximum: Duration) -> Self {
        self.initial_interval = initial;
        self.backoff_coefficient = coefficient;
        self.maximum_interval = maximum;
        self
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Build options for one dispatch
    ///
    /// Never fails: the timeout is at least one millisecond and the attempt
    /// count at least one. Callers that must reject zeros do so before.
    pub fn build(&self, args: &TaskArgs) -> ExecutionOptions {
        let timeout = args
            .execution_timeout
            .unwrap_or(self.default_timeout)
            .max(Duration::from_millis(1));
        let attempts = args.retry_count.unwrap_or(self.default_retry_count).max(1);

        ExecutionOptions {
            start_to_close_timeout: timeout,
            retry_policy: RetryPolicy {
                initial_interval: self.initial_interval,
                backoff_coefficient: self.backoff_coefficient.max(1.0),
                maximum_interval: self.maximum_interval.max(self.initial_interval),
                maximum_attempts: attempts,
            },
        }
    }
}

/// Build options with the built-in defaults
pub fn build_execution_options(args: &TaskArgs) -> ExecutionOptions {
    ExecutionOptionsBuilder::default().build(args)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_applied() {
        let options = build_execution_options(&TaskArgs::default());
        assert_eq!(options.start_to_close_timeout, Duration::from_secs(600));
        assert_eq!(options.retry_policy.maximum_attempts, 1);
    }

    #[test]
    fn test_explicit_args_win() {
        let args = TaskArgs::new()
            .with_timeout(Duration::from_secs(30))
            .with_retry_count(4);
        let options = build_execution_options(&args);
        assert_eq!(options.start_to_close_timeout, Duration::from_secs(30));
        assert_eq!(options.retry_policy.maximum_attempts, 4);
    }

    #[test]
    fn test_retrying_args() {
        let options = build_execution_options(&TaskArgs::retrying());
        assert_eq!(options.start_to_close_timeout, Duration::from_secs(600));
        assert_eq!(options.retry_policy.maximum_attempts, 3);
    }

    #[test]
    fn test_zero_values_clamped() {
        let args = TaskArgs::new().with_timeout(Duration::ZERO).with_retry_count(0);
        let options = build_execution_options(&args);
        assert_eq!(options.start_to_close_timeout, Duration::from_millis(1));
        assert_eq!(options.retry_policy.maximum_attempts, 1);
    }

    #[test]
    fn test_from_settings() {
        let settings = DispatchSettings {
            default_execution_timeout_secs: 5,
            default_retry_count: 2,
            retry_initial_interval_ms: 200,
            retry_backoff_coefficient: 3.0,
            retry_max_interval_ms: 1000,
            ..Default::default()
        };
        let builder = ExecutionOptionsBuilder::from_settings(&settings);
        assert_eq!(builder.default_timeout(), Duration::from_secs(5));

        let options = builder.build(&TaskArgs::default());
        assert_eq!(options.retry_policy.maximum_attempts, 2);
        assert_eq!(options.retry_policy.initial_interval, Duration::from_millis(200));
        assert_eq!(options.retry_policy.delay_after(3), Duration::from_millis(1000));
    }
}
