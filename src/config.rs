//! Configuration system for RegionGate
//!
//! Supports multiple configuration sources with the following precedence (highest to lowest):
//! 1. CLI arguments
//! 2. Environment variables (REGIONGATE_* prefix)
//! 3. Configuration file (TOML)
//! 4. Default values

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Main service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Routing and execution defaults for dispatch
    pub dispatch: DispatchSettings,

    /// Status polling used while awaiting a terminal state
    pub poll: PollSettings,

    /// In-process execution backend
    pub backend: BackendSettings,

    /// Logging configuration
    pub logging: LoggingSettings,
}

/// Dispatch defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchSettings {
    /// Region used when a request names none
    pub default_region: String,

    /// Workflow type started for ASYNC tasks
    pub async_workflow: String,

    /// Workflow type run for SYNC tasks
    pub sync_workflow: String,

    /// Per-attempt timeout applied when a task sets none
    pub default_execution_timeout_secs: u64,

    /// Maximum attempts applied when a task sets none (1 = no retry)
    pub default_retry_count: u32,

    /// Delay before the first retry
    pub retry_initial_interval_ms: u64,

    /// Growth factor of the retry delay
    pub retry_backoff_coefficient: f64,

    /// Cap on the retry delay
    pub retry_max_interval_ms: u64,
}

/// Status polling settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollSettings {
    /// Delay before the second status query
    pub initial_interval_ms: u64,

    /// Cap on the delay between queries
    pub max_interval_ms: u64,

    /// Queries made before giving up
    pub max_attempts: u32,
}

/// In-process backend settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendSettings {
    /// Queues that get a worker pool at startup
    pub regions: Vec<String>,

    /// Simulated duration of the business activity
    pub work_duration_ms: u64,

    /// Simulated latency of every backend call
    pub rpc_latency_ms: u64,
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Log level: trace, debug, info, warn, error
    pub level: String,

    /// Log file path (empty = no file logging)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,

    /// File rotation: hourly, daily, never
    pub rotation: String,

    /// Number of rotated log files to keep
    pub max_files: u32,

    /// Enable JSON formatted logging
    pub json_format: bool,
}

// ─────────────────────────────────────────────────────────────────
// Defaults
// ─────────────────────────────────────────────────────────────────

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            default_region: "queue-beijing".to_string(),
            async_workflow: "TaskWorkflow".to_string(),
            sync_workflow: "PingWorkflow".to_string(),
            default_execution_timeout_secs: 600,
            default_retry_count: 1,
            retry_initial_interval_ms: 1000,
            retry_backoff_coefficient: 2.0,
            retry_max_interval_ms: 100_000,
        }
    }
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            initial_interval_ms: 500,
            max_interval_ms: 5000,
            max_attempts: 60,
        }
    }
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            regions: vec!["queue-beijing".to_string()],
            work_duration_ms: 10_000,
            rpc_latency_ms: 0,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
            rotation: "daily".to_string(),
            max_files: 5,
            json_format: false,
        }
    }
}

impl DispatchSettings {
    pub fn default_execution_timeout(&self) -> Duration {
        Duration::from_secs(self.default_execution_timeout_secs)
    }
}

impl BackendSettings {
    pub fn work_duration(&self) -> Duration {
        Duration::from_millis(self.work_duration_ms)
    }

    pub fn rpc_latency(&self) -> Duration {
        Duration::from_millis(self.rpc_latency_ms)
    }
}

// ─────────────────────────────────────────────────────────────────
// Loading
// ─────────────────────────────────────────────────────────────────

impl ServiceConfig {
    /// Load configuration from file with environment variable overrides
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut config = Self::default();

        // 1. Load from config file if it exists
        let config_file = Self::find_config_file(config_path)?;
        if let Some(path) = config_file {
            debug!(path = %path.display(), "Loading configuration file");
            let content = fs::read_to_string(&path).map_err(|e| Error::ConfigNotFound {
                path: path.clone(),
                source: Some(e),
            })?;
            config = Self::from_toml(&content)?;
            info!(path = %path.display(), "Configuration loaded from file");
        }

        // 2. Apply environment variable overrides
        config.apply_env_overrides();

        // 3. Expand paths
        config.expand_paths();

        // 4. Validate
        config.validate()?;

        Ok(config)
    }

    /// Parse configuration from TOML text without validating it
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::ConfigParse {
            message: e.to_string(),
            source: Some(e),
        })
    }

    /// Find the configuration file to use
    fn find_config_file(explicit_path: Option<&str>) -> Result<Option<PathBuf>> {
        // If explicit path provided, use it (error if not found)
        if let Some(path) = explicit_path {
            let path = PathBuf::from(expand_path(path));
            if path.exists() {
                return Ok(Some(path));
            }
            return Err(Error::config_not_found(path));
        }

        // Search in standard locations
        let search_paths = [
            PathBuf::from("regiongate.toml"),
            dirs::config_dir()
                .map(|p| p.join("regiongate").join("config.toml"))
                .unwrap_or_default(),
            dirs::home_dir()
                .map(|p| p.join(".regiongate").join("config.toml"))
                .unwrap_or_default(),
            PathBuf::from("/etc/regiongate/config.toml"),
        ];

        for path in &search_paths {
            if !path.as_os_str().is_empty() && path.exists() {
                debug!(path = %path.display(), "Found configuration file");
                return Ok(Some(path.clone()));
            }
        }

        debug!("No configuration file found, using defaults");
        Ok(None)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        // Dispatch settings
        if let Ok(val) = std::env::var("REGIONGATE_DEFAULT_REGION") {
            self.dispatch.default_region = val;
        }
        if let Ok(val) = std::env::var("REGIONGATE_ASYNC_WORKFLOW") {
            self.dispatch.async_workflow = val;
        }
        if let Ok(val) = std::env::var("REGIONGATE_SYNC_WORKFLOW") {
            self.dispatch.sync_workflow = val;
        }
        if let Some(n) = env_parse("REGIONGATE_EXECUTION_TIMEOUT_SECS") {
            self.dispatch.default_execution_timeout_secs = n;
        }
        if let Some(n) = env_parse("REGIONGATE_RETRY_COUNT") {
            self.dispatch.default_retry_count = n;
        }

        // Poll settings
        if let Some(n) = env_parse("REGIONGATE_POLL_INITIAL_INTERVAL_MS") {
            self.poll.initial_interval_ms = n;
        }
        if let Some(n) = env_parse("REGIONGATE_POLL_MAX_ATTEMPTS") {
            self.poll.max_attempts = n;
        }

        // Backend settings
        if let Ok(val) = std::env::var("REGIONGATE_REGIONS") {
            self.backend.regions = val
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Some(n) = env_parse("REGIONGATE_WORK_DURATION_MS") {
            self.backend.work_duration_ms = n;
        }
        if let Some(n) = env_parse("REGIONGATE_RPC_LATENCY_MS") {
            self.backend.rpc_latency_ms = n;
        }

        // Logging settings
        if let Ok(val) = std::env::var("REGIONGATE_LOG_LEVEL") {
            self.logging.level = val;
        }
        if let Ok(val) = std::env::var("REGIONGATE_LOG_FILE") {
            self.logging.file = Some(val);
        }
        if let Ok(val) = std::env::var("REGIONGATE_LOG_JSON") {
            self.logging.json_format = val.to_lowercase() == "true" || val == "1";
        }
    }

    /// Expand ~ and other path variables
    fn expand_paths(&mut self) {
        if let Some(ref file) = self.logging.file {
            self.logging.file = Some(expand_path(file));
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let dispatch = &self.dispatch;

        for (field, value) in [
            ("dispatch.default_region", &dispatch.default_region),
            ("dispatch.async_workflow", &dispatch.async_workflow),
            ("dispatch.sync_workflow", &dispatch.sync_workflow),
        ] {
            if value.trim().is_empty() {
                return Err(Error::config_field_invalid(field, format!("{} cannot be empty", field)));
            }
        }

        if dispatch.default_execution_timeout_secs == 0 {
            return Err(Error::config_field_invalid(
                "dispatch.default_execution_timeout_secs",
                "default_execution_timeout_secs must be at least 1",
            ));
        }
        if dispatch.default_retry_count == 0 {
            return Err(Error::config_field_invalid(
                "dispatch.default_retry_count",
                "default_retry_count must be at least 1",
            ));
        }
        if dispatch.retry_backoff_coefficient.is_nan() || dispatch.retry_backoff_coefficient < 1.0 {
            return Err(Error::config_field_invalid(
                "dispatch.retry_backoff_coefficient",
                "retry_backoff_coefficient must be at least 1.0",
            ));
        }
        if dispatch.retry_max_interval_ms < dispatch.retry_initial_interval_ms {
            return Err(Error::config_field_invalid(
                "dispatch.retry_max_interval_ms",
                "retry_max_interval_ms must not be below retry_initial_interval_ms",
            ));
        }

        if self.poll.max_attempts == 0 {
            return Err(Error::config_field_invalid(
                "poll.max_attempts",
                "poll.max_attempts must be at least 1",
            ));
        }

        if self.backend.regions.iter().any(|r| r.trim().is_empty()) {
            return Err(Error::config_field_invalid(
                "backend.regions",
                "backend.regions cannot contain empty names",
            ));
        }

        // Validate log level
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(Error::config_field_invalid(
                "logging.level",
                format!(
                    "Invalid log level '{}'. Must be one of: {}",
                    self.logging.level,
                    valid_levels.join(", ")
                ),
            ));
        }

        let valid_rotations = ["hourly", "daily", "never"];
        if !valid_rotations.contains(&self.logging.rotation.to_lowercase().as_str()) {
            return Err(Error::config_field_invalid(
                "logging.rotation",
                format!(
                    "Invalid log rotation '{}'. Must be one of: {}",
                    self.logging.rotation,
                    valid_rotations.join(", ")
                ),
            ));
        }

        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|val| val.parse().ok())
}

/// Expand ~ and environment variables in paths
fn expand_path(path: &str) -> String {
    shellexpand::full(path)
        .unwrap_or_else(|_| std::borrow::Cow::Borrowed(path))
        .into_owned()
}

/// Initialize a new configuration file, returning where it was written
pub fn init_config(path: Option<&str>, force: bool) -> Result<PathBuf> {
    let config_path = path
        .map(|p| PathBuf::from(expand_path(p)))
        .unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".regiongate")
                .join("config.toml")
        });

    if config_path.exists() && !force {
        return Err(Error::Config(format!(
            "Configuration file already exists: {}. Use --force to overwrite.",
            config_path.display()
        )));
    }

    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::IoWrite {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }

    fs::write(&config_path, generate_default_config()).map_err(|e| Error::IoWrite {
        path: config_path.clone(),
        source: e,
    })?;

    Ok(config_path)
}

/// Generate default configuration content with comments
fn generate_default_config() -> String {
    r#"# RegionGate Configuration

[dispatch]
# Region (queue) used when a request names none
default_region = "queue-beijing"

# Workflow types started for ASYNC and SYNC tasks
async_workflow = "TaskWorkflow"
sync_workflow = "PingWorkflow"

# Per-attempt timeout applied when a task sets none (seconds)
default_execution_timeout_secs = 600

# Maximum attempts applied when a task sets none (1 = no retry)
default_retry_count = 1

# Retry back-off between attempts
retry_initial_interval_ms = 1000
retry_backoff_coefficient = 2.0
retry_max_interval_ms = 100000

[poll]
# Status polling while waiting for a task to finish
initial_interval_ms = 500
max_interval_ms = 5000
max_attempts = 60

[backend]
# Queues that get a worker pool at startup
regions = ["queue-beijing"]

# Simulated duration of the business activity
work_duration_ms = 10000

# Simulated latency of every backend call
rpc_latency_ms = 0

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log file path (comment out to disable file logging)
# file = "~/.regiongate/logs/regiongate.log"

# File rotation: hourly, daily, never
rotation = "daily"

# Number of rotated log files to keep
max_files = 5

# Enable JSON formatted logging
json_format = false
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn test_default_config() {
        let config = ServiceConfig::default();
        assert_eq!(config.dispatch.default_region, "queue-beijing");
        assert_eq!(config.dispatch.async_workflow, "TaskWorkflow");
        assert_eq!(config.dispatch.sync_workflow, "PingWorkflow");
        assert_eq!(config.dispatch.default_execution_timeout(), Duration::from_secs(600));
        assert_eq!(config.dispatch.default_retry_count, 1);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_env_override() {
        env::set_var("REGIONGATE_SYNC_WORKFLOW", "EchoWorkflow");
        env::set_var("REGIONGATE_REGIONS", "queue-a, queue-b,");
        env::set_var("REGIONGATE_RPC_LATENCY_MS", "25");

        let mut config = ServiceConfig::default();
        config.apply_env_overrides();

        assert_eq!(config.dispatch.sync_workflow, "EchoWorkflow");
        assert_eq!(config.backend.regions, vec!["queue-a", "queue-b"]);
        assert_eq!(config.backend.rpc_latency(), Duration::from_millis(25));

        env::remove_var("REGIONGATE_SYNC_WORKFLOW");
        env::remove_var("REGIONGATE_REGIONS");
        env::remove_var("REGIONGATE_RPC_LATENCY_MS");
    }

    #[test]
    fn test_validation_empty_region() {
        let mut config = ServiceConfig::default();
        config.dispatch.default_region = "  ".to_string();
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            Error::ConfigValidation { field: Some(ref f), .. } if f == "dispatch.default_region"
        ));
    }

    #[test]
    fn test_validation_zero_retry_and_timeout() {
        let mut config = ServiceConfig::default();
        config.dispatch.default_retry_count = 0;
        assert!(config.validate().is_err());

        let mut config = ServiceConfig::default();
        config.dispatch.default_execution_timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_backoff_coefficient() {
        let mut config = ServiceConfig::default();
        config.dispatch.retry_backoff_coefficient = 0.5;
        assert!(config.validate().is_err());

        config.dispatch.retry_backoff_coefficient = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_invalid_log_level() {
        let mut config = ServiceConfig::default();
        config.logging.level = "invalid".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_invalid_rotation() {
        let mut config = ServiceConfig::default();
        config.logging.rotation = "weekly".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_valid_config() {
        assert!(ServiceConfig::default().validate().is_ok());
    }

    #[test]
    fn test_path_expansion() {
        let mut config = ServiceConfig::default();
        config.logging.file = Some("~/logs/regiongate.log".to_string());
        config.expand_paths();

        assert!(!config.logging.file.unwrap().contains('~'));
    }

    #[test]
    fn test_generated_default_is_valid() {
        let config = ServiceConfig::from_toml(&generate_default_config()).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.poll.max_attempts, 60);
        assert_eq!(config.backend.regions, vec!["queue-beijing"]);
    }

    #[test]
    fn test_serialize_deserialize() {
        let config = ServiceConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: ServiceConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(config.dispatch.default_region, parsed.dispatch.default_region);
        assert_eq!(config.poll.max_interval_ms, parsed.poll.max_interval_ms);
    }

    #[test]
    fn test_parse_partial_config_file() {
        let config_str = r#"
[dispatch]
default_region = "queue-shanghai"
default_retry_count = 3

[backend]
regions = ["queue-shanghai", "queue-beijing"]
work_duration_ms = 50

[logging]
level = "debug"
"#;

        let config = ServiceConfig::from_toml(config_str).unwrap();

        assert_eq!(config.dispatch.default_region, "queue-shanghai");
        assert_eq!(config.dispatch.default_retry_count, 3);
        assert_eq!(config.dispatch.async_workflow, "TaskWorkflow");
        assert_eq!(config.backend.work_duration(), Duration::from_millis(50));
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.poll.max_attempts, 60);
    }

    #[test]
    fn test_parse_error_kind() {
        let err = ServiceConfig::from_toml("[dispatch\nbroken").unwrap_err();
        assert!(matches!(err, Error::ConfigParse { .. }));
    }
}
