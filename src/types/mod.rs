//! Type definitions for RegionGate
//!
//! This module contains the caller-facing task types and the execution
//! vocabulary shared with backends.

mod execution;
mod task;

pub use execution::*;
pub use task::*;
