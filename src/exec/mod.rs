// src/exec/mod.rs

//! Script execution layer.
//!
//! - [`backend`] defines the `ScriptExecutor` trait plus the per-run context
//!   and result types. Tests replace the production executors through it.
//! - [`router`] picks the shell or database executor by script kind.
//! - [`shell`] runs `.ps1` scripts through the interpreter found by
//!   [`interpreter`].
//! - [`database`] runs `.sql` scripts transactionally against SQLite.

pub mod backend;
pub mod database;
pub mod interpreter;
pub mod router;
pub mod shell;

pub use backend::{ExecutionContext, ExecutionResult, ScriptExecutor};
pub use database::{DatabaseExecutor, NamedConnection};
pub use router::ExecutorRouter;
pub use shell::{ShellExecutor, ShellOptions};
