//! Execution backend module
//!
//! This module provides the client abstraction over the durable-execution
//! backend, the activities its workers run, and an in-process
//! implementation.

mod activity;
mod ledger;
mod memory;
mod traits;

pub use activity::{Activity, BusinessActivity, FnActivity, PingActivity, SharedActivity};
pub use memory::{InMemoryBackend, MemoryConfig};
pub use traits::*;
