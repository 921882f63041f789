//! Task dispatch and status reconciliation
//!
//! This module turns task submissions into routed, idempotent execution
//! requests and projects backend execution state back into task statuses.

mod dispatcher;
mod options;
mod reconciler;
mod service;

pub use dispatcher::{DispatchOutcome, Dispatcher};
pub use options::{build_execution_options, ExecutionOptionsBuilder, DEFAULT_EXECUTION_TIMEOUT, DEFAULT_RETRY_COUNT};
pub use reconciler::{project_status, StatusReconciler};
pub use service::TaskService;
