//! CLI argument parsing using clap v4
//!
//! Defines the command-line interface for RegionGate.

use clap::{Parser, Subcommand};

use crate::types::TaskType;

/// RegionGate - region-routed task dispatch
///
/// Dispatches tasks to region-isolated worker pools on a durable-execution
/// backend and reports their status.
#[derive(Parser, Debug)]
#[command(name = "regiongate")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to configuration file
    #[arg(short, long, global = true, env = "REGIONGATE_CONFIG")]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Dispatch a task and print the dispatch response as JSON
    Dispatch {
        /// Payload handed to the business activity
        command: String,

        /// Task id (generated when omitted)
        #[arg(long)]
        task_id: Option<String>,

        /// Target region (queue)
        #[arg(short, long)]
        region: Option<String>,

        /// Dispatch mode: SYNC or ASYNC
        #[arg(short = 't', long = "type", default_value = "ASYNC")]
        task_type: TaskType,

        /// Per-attempt timeout in seconds
        #[arg(long)]
        timeout_secs: Option<u64>,

        /// Maximum attempts (1 = no retry)
        #[arg(long)]
        retry_count: Option<u32>,

        /// After an async dispatch, wait for the task and print its final status
        #[arg(short, long)]
        wait: bool,
    },

    /// Query the status of a task and print it as JSON
    Status {
        /// Task id to query
        task_id: String,
    },

    /// Walk through dispatch, status, conflict and lookup on an in-process backend
    Demo {
        /// Simulated business activity duration in milliseconds
        #[arg(long)]
        work_ms: Option<u64>,

        /// Region to dispatch to
        #[arg(short, long)]
        region: Option<String>,
    },

    /// Display version and build information
    Version {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

/// Configuration subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum ConfigSubcommand {
    /// Display the effective configuration
    Show,

    /// Initialize a new configuration file
    Init {
        /// Path where to create the config file
        #[arg(short, long)]
        path: Option<String>,

        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Validate the configuration
    Validate,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_dispatch_defaults() {
        let cli = Cli::parse_from(["regiongate", "dispatch", "echo hi"]);
        match cli.command {
            Commands::Dispatch {
                command,
                task_id,
                region,
                task_type,
                timeout_secs,
                retry_count,
                wait,
            } => {
                assert_eq!(command, "echo hi");
                assert!(task_id.is_none());
                assert!(region.is_none());
                assert_eq!(task_type, TaskType::Async);
                assert!(timeout_secs.is_none());
                assert!(retry_count.is_none());
                assert!(!wait);
            }
            _ => panic!("Expected Dispatch command"),
        }
    }

    #[test]
    fn test_dispatch_with_options() {
        let cli = Cli::parse_from([
            "regiongate",
            "dispatch",
            "X",
            "--task-id",
            "t1",
            "--region",
            "queue-a",
            "--type",
            "sync",
            "--retry-count",
            "3",
        ]);
        match cli.command {
            Commands::Dispatch {
                task_id,
                region,
                task_type,
                retry_count,
                ..
            } => {
                assert_eq!(task_id, Some("t1".to_string()));
                assert_eq!(region, Some("queue-a".to_string()));
                assert_eq!(task_type, TaskType::Sync);
                assert_eq!(retry_count, Some(3));
            }
            _ => panic!("Expected Dispatch command"),
        }
    }

    #[test]
    fn test_dispatch_rejects_unknown_type() {
        let result = Cli::try_parse_from(["regiongate", "dispatch", "X", "--type", "later"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_status_command() {
        let cli = Cli::parse_from(["regiongate", "status", "t1"]);
        match cli.command {
            Commands::Status { task_id } => assert_eq!(task_id, "t1"),
            _ => panic!("Expected Status command"),
        }
    }

    #[test]
    fn test_demo_command() {
        let cli = Cli::parse_from(["regiongate", "demo", "--work-ms", "20"]);
        match cli.command {
            Commands::Demo { work_ms, region } => {
                assert_eq!(work_ms, Some(20));
                assert!(region.is_none());
            }
            _ => panic!("Expected Demo command"),
        }
    }

    #[test]
    fn test_verbose_flags() {
        let cli = Cli::parse_from(["regiongate", "-vv", "version"]);
        assert_eq!(cli.verbose, 2);
        assert!(!cli.quiet);
    }

    #[test]
    fn test_global_config_flag() {
        let cli = Cli::parse_from(["regiongate", "status", "t1", "--config", "/tmp/rg.toml"]);
        assert_eq!(cli.config, Some("/tmp/rg.toml".to_string()));
    }

    #[test]
    fn test_config_init() {
        let cli = Cli::parse_from(["regiongate", "config", "init", "--force"]);
        match cli.command {
            Commands::Config {
                subcommand: ConfigSubcommand::Init { path, force },
            } => {
                assert!(path.is_none());
                assert!(force);
            }
            _ => panic!("Expected Config Init command"),
        }
    }
}
