// src/exec/shell.rs

//! Runs `.ps1` scripts in the shell interpreter with parameters rendered as
//! named arguments.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{error, info};

use crate::exec::backend::{ExecutionContext, ExecutionResult, ScriptExecutor};
use crate::exec::interpreter::resolve_interpreter;
use crate::metadata::{ParameterDefinition, ScriptMetadata};
use crate::params::{DATETIME_FORMAT, ParamValue, ParameterBag};
use crate::repository::process::{ProcessRunner, ProcessSpec};
use crate::storage::TempStorage;
use crate::types::{BoxFuture, ParamType, RESERVED_PARAM_PREFIX};

#[derive(Debug, Clone, Default)]
pub struct ShellOptions {
    /// Explicit interpreter path; tried before PATH.
    pub shell_path: Option<PathBuf>,
    /// Allow the legacy Windows interpreter when the modern one is missing.
    pub allow_legacy: bool,
    /// Leave the materialised script on disk after the run.
    pub keep_temp_scripts: bool,
}

pub struct ShellExecutor {
    options: ShellOptions,
    runner: Arc<dyn ProcessRunner>,
    storage: Arc<dyn TempStorage>,
}

impl ShellExecutor {
    pub fn new(
        options: ShellOptions,
        runner: Arc<dyn ProcessRunner>,
        storage: Arc<dyn TempStorage>,
    ) -> Self {
        Self {
            options,
            runner,
            storage,
        }
    }

    async fn run(&self, metadata: &ScriptMetadata, ctx: &ExecutionContext) -> ExecutionResult {
        let interpreter =
            match resolve_interpreter(self.options.shell_path.as_deref(), self.options.allow_legacy) {
                Ok(path) => path,
                Err(err) => {
                    error!(script = %metadata.id, error = %err, "cannot run shell script");
                    return ExecutionResult::error(err.to_string());
                }
            };

        let spec = shell_spec(&interpreter, &ctx.script_path, metadata, &ctx.parameters);
        info!(script = %metadata.id, interpreter = %interpreter.display(), "starting shell script");

        match self.runner.run(&spec, &ctx.cancel).await {
            Ok(output) => {
                info!(script = %metadata.id, exit_code = output.exit_code, "shell script exited");
                ExecutionResult::from_exit(output.exit_code, output.stdout, output.stderr)
            }
            Err(_) if ctx.cancel.is_cancelled() => {
                info!(script = %metadata.id, "shell script cancelled");
                ExecutionResult::error("execution cancelled")
            }
            Err(err) => {
                error!(script = %metadata.id, error = %err, "shell script could not be run");
                ExecutionResult::error(format!("{err:#}"))
            }
        }
    }
}

impl ScriptExecutor for ShellExecutor {
    fn execute<'a>(
        &'a self,
        metadata: &'a ScriptMetadata,
        ctx: &'a ExecutionContext,
    ) -> BoxFuture<'a, ExecutionResult> {
        Box::pin(async move {
            let result = self.run(metadata, ctx).await;
            if self.options.keep_temp_scripts {
                info!(path = %ctx.script_path.display(), "keeping materialised script");
            } else {
                self.storage.delete(&ctx.script_path);
            }
            result
        })
    }
}

/// Full interpreter invocation for one run.
pub fn shell_spec(
    interpreter: &Path,
    script_path: &Path,
    metadata: &ScriptMetadata,
    bag: &ParameterBag,
) -> ProcessSpec {
    let working_dir = script_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(std::env::temp_dir);
    ProcessSpec::new(interpreter, working_dir).args([
        "-NoProfile".to_string(),
        "-NonInteractive".to_string(),
        "-ExecutionPolicy".to_string(),
        "Bypass".to_string(),
        "-Command".to_string(),
        build_invocation(script_path, metadata, bag),
    ])
}

/// The `-Command` expression: call the script and pass each declared
/// parameter present in `bag`, in declaration order.
///
/// Null values and reserved (`__`-prefixed) names are skipped.
pub fn build_invocation(script_path: &Path, metadata: &ScriptMetadata, bag: &ParameterBag) -> String {
    let mut expr = format!("& {}", quote(&script_path.to_string_lossy()));
    for def in &metadata.parameters {
        if def.name.starts_with(RESERVED_PARAM_PREFIX) {
            continue;
        }
        let Some(value) = bag.get(&def.name) else {
            continue;
        };
        if matches!(value, ParamValue::Null) {
            continue;
        }
        expr.push(' ');
        expr.push_str(&render_argument(def, value));
    }
    expr
}

fn render_argument(def: &ParameterDefinition, value: &ParamValue) -> String {
    let name = &def.name;
    match (def.param_type, value) {
        (ParamType::Bool, value) => {
            let flag = value.to_bool().unwrap_or(false);
            format!("-{name}:${flag}")
        }
        (ParamType::Int, ParamValue::Int(i)) => format!("-{name} {i}"),
        (ParamType::Decimal, ParamValue::Decimal(d)) => format!("-{name} {d}"),
        (ParamType::Decimal, ParamValue::Int(i)) => format!("-{name} {i}"),
        (ParamType::DateTime, ParamValue::DateTime(dt)) => {
            format!("-{name} {}", quote(&dt.format(DATETIME_FORMAT).to_string()))
        }
        (_, value) => format!("-{name} {}", quote(&value.to_string())),
    }
}

/// Single-quoted literal; embedded quotes are doubled.
fn quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}
