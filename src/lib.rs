//! RegionGate - region-routed task dispatch and status reconciliation
//!
//! Submits tasks to region-isolated worker pools on a durable-execution
//! backend, either fire-and-forget or blocking, and projects the backend's
//! execution states into a stable caller-facing status taxonomy.
//!
//! ```no_run
//! use std::sync::Arc;
//! use regiongate::{DispatchRequest, InMemoryBackend, ServiceConfig, TaskService};
//!
//! # async fn run() -> regiongate::Result<()> {
//! let config = ServiceConfig::default();
//! let backend = InMemoryBackend::from_config(&config);
//! let service = TaskService::new(Arc::new(backend), &config);
//!
//! let response = service.submit(DispatchRequest::new("payload")).await?;
//! let status = service.wait_for_terminal(&response.task_id).await;
//! println!("{}", status.status());
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod cli;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod logging;
pub mod types;
pub mod version;

pub use backend::{ExecutionBackend, InMemoryBackend, SharedBackend};
pub use config::ServiceConfig;
pub use dispatch::{DispatchOutcome, Dispatcher, StatusReconciler, TaskService};
pub use error::{Error, ErrorKind, Result};
pub use types::{DispatchRequest, DispatchResponse, StatusKind, TaskArgs, TaskStatus, TaskType};
