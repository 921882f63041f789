//! RegionGate - region-routed task dispatch
//!
//! This is the main entry point for the regiongate binary. Every command runs
//! against an in-process execution backend built from the configuration.

use std::sync::Arc;

use clap::Parser;
use serde::Serialize;
use tracing::{debug, info};

use regiongate::backend::InMemoryBackend;
use regiongate::cli::{Cli, Commands, ConfigSubcommand};
use regiongate::config::{self, ServiceConfig};
use regiongate::error::{Error, Result};
use regiongate::types::{DispatchRequest, TaskType};
use regiongate::{logging, version, TaskService};

fn main() {
    // Parse CLI arguments first (before logging, so we know verbosity)
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprint!("{}", e.format_for_terminal());
        std::process::exit(e.exit_code());
    }
}

/// Commands that run against the backend inside an async runtime
enum RuntimeCommand {
    Dispatch { request: DispatchRequest, wait: bool },
    Status { task_id: String },
    Demo { region: Option<String>, work_ms: Option<u64> },
}

fn run(cli: Cli) -> Result<()> {
    let command = match cli.command {
        // Commands that don't need the backend
        Commands::Version { json } => return version::print_version(json),
        Commands::Config { subcommand } => {
            logging::init_simple(tracing::Level::WARN)?;
            return handle_config_command(subcommand, cli.config.as_deref());
        }
        Commands::Dispatch {
            command,
            task_id,
            region,
            task_type,
            timeout_secs,
            retry_count,
            wait,
        } => RuntimeCommand::Dispatch {
            request: DispatchRequest {
                task_id,
                region,
                command,
                task_type,
                execution_timeout_secs: timeout_secs,
                retry_count,
            },
            wait,
        },
        Commands::Status { task_id } => RuntimeCommand::Status { task_id },
        Commands::Demo { work_ms, region } => RuntimeCommand::Demo { region, work_ms },
    };

    let mut config = ServiceConfig::load(cli.config.as_deref())?;
    if let RuntimeCommand::Demo { work_ms: Some(ms), .. } = &command {
        config.backend.work_duration_ms = *ms;
    }

    // The guards must be kept alive for the lifetime of the program
    let _log_guards = logging::init_logging(&config.logging, cli.verbose, cli.quiet)?;

    let build = version::build_info();
    debug!(version = %build.full_version(), target = %build.target, profile = %build.profile, "Starting regiongate");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads(num_cpus::get().clamp(1, 4))
        .thread_name("regiongate")
        .build()
        .map_err(|e| Error::Internal(format!("Failed to create async runtime: {}", e)))?;

    runtime.block_on(run_command(command, config))
}

async fn run_command(command: RuntimeCommand, config: ServiceConfig) -> Result<()> {
    let backend = InMemoryBackend::from_config(&config);
    let service = TaskService::new(Arc::new(backend), &config);

    match command {
        RuntimeCommand::Dispatch { request, wait } => {
            let response = service.submit(request).await?;
            print_json(&response)?;

            if wait && response.run_id.is_some() {
                let status = service.wait_for_terminal(&response.task_id).await;
                print_json(&status)?;
            }
        }
        RuntimeCommand::Status { task_id } => {
            print_json(&service.status(&task_id).await)?;
        }
        RuntimeCommand::Demo { region, .. } => {
            let region = region.unwrap_or_else(|| config.dispatch.default_region.clone());
            run_demo(&service, &region).await?;
        }
    }

    Ok(())
}

/// Walk through the main dispatch and status paths, printing each step
async fn run_demo(service: &TaskService, region: &str) -> Result<()> {
    let task_id = "demo-task";

    println!("==> Async dispatch of '{}' to {}", task_id, region);
    let response = service
        .submit(DispatchRequest::new("demo payload").with_task_id(task_id).with_region(region))
        .await?;
    print_json(&response)?;

    println!("==> Immediate status");
    print_json(&service.status(task_id).await)?;

    println!("==> Duplicate dispatch while running");
    match service
        .submit(DispatchRequest::new("demo payload").with_task_id(task_id).with_region(region))
        .await
    {
        Ok(response) => print_json(&response)?,
        Err(e) => println!("{}", e.format_for_log()),
    }

    println!("==> Waiting for completion");
    print_json(&service.wait_for_terminal(task_id).await)?;

    println!("==> Status of an unknown task");
    print_json(&service.status("nonexistent").await)?;

    println!("==> Sync dispatch");
    let response = service
        .submit(DispatchRequest::new("ping").with_region(region).with_task_type(TaskType::Sync))
        .await?;
    print_json(&response)?;

    info!(region = %region, "Demo finished");
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Handle configuration subcommands
fn handle_config_command(subcommand: ConfigSubcommand, config_path: Option<&str>) -> Result<()> {
    match subcommand {
        ConfigSubcommand::Show => {
            let cfg = ServiceConfig::load(config_path)?;
            println!("{}", toml::to_string_pretty(&cfg)?);
        }
        ConfigSubcommand::Init { path, force } => {
            let written = config::init_config(path.as_deref(), force)?;
            println!("Configuration file created: {}", written.display());
        }
        ConfigSubcommand::Validate => {
            ServiceConfig::load(config_path)?;
            println!("Configuration is valid.");
        }
    }

    Ok(())
}
