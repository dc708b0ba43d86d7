// src/engine/mod.rs

//! Execution engine.
//!
//! The [`dispatcher`] admits submitted runs under a concurrency bound,
//! drives them through their lifecycle and records every transition.
//! [`output`] holds the truncation applied to captured output.

pub mod dispatcher;
pub mod output;

pub use dispatcher::{
    CANCELLED_BEFORE_ADMISSION, Dispatcher, DispatcherOptions, ExecutionRequest,
};
pub use output::{TRUNCATION_SUFFIX, truncate_output};
