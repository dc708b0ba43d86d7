// src/exec/database.rs

//! Runs `.sql` scripts against SQLite inside a single transaction.
//!
//! Parameters are substituted textually for `$(Name)` and `{{Name}}` tokens;
//! values are not escaped, so script authors own injection safety.

use std::sync::{Arc, LazyLock};

use anyhow::{Context, Result, anyhow, bail};
use regex::Regex;
use rusqlite::{Connection, OpenFlags, Transaction};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::exec::backend::{ExecutionContext, ExecutionResult, ScriptExecutor};
use crate::metadata::ScriptMetadata;
use crate::params::ParameterBag;
use crate::storage::TempStorage;
use crate::types::BoxFuture;

static STATEMENT_END: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r";\s*\n").unwrap_or_else(|e| panic!("statement separator pattern is invalid: {e}"))
});

/// One configured database target.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NamedConnection {
    pub name: String,
    pub connection_string: String,
}

/// How to open the database file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OpenMode {
    ReadOnly,
    ReadWrite,
    #[default]
    ReadWriteCreate,
    Memory,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionTarget {
    pub path: String,
    pub mode: OpenMode,
}

/// Parse `Data Source=...;Mode=...` style strings. A string without any
/// `key=value` pair is taken as a bare file path.
pub fn parse_connection_string(s: &str) -> Result<ConnectionTarget> {
    let s = s.trim();
    if s.is_empty() {
        bail!("connection string is empty");
    }
    if !s.contains('=') {
        return Ok(target_for(s.to_string(), OpenMode::default()));
    }

    let mut path = None;
    let mut mode = OpenMode::default();
    for part in s.split(';').map(str::trim).filter(|p| !p.is_empty()) {
        let Some((key, value)) = part.split_once('=') else {
            bail!("malformed connection string segment '{part}'");
        };
        let key: String = key.chars().filter(|c| !c.is_whitespace()).collect();
        let value = value.trim().trim_matches('"');
        match key.to_ascii_lowercase().as_str() {
            "datasource" | "filename" => path = Some(value.to_string()),
            "mode" => {
                mode = match value.to_ascii_lowercase().as_str() {
                    "readonly" => OpenMode::ReadOnly,
                    "readwrite" => OpenMode::ReadWrite,
                    "readwritecreate" => OpenMode::ReadWriteCreate,
                    "memory" => OpenMode::Memory,
                    other => bail!("unsupported connection mode '{other}'"),
                }
            }
            _ => debug!(key = %key, "ignoring connection string key"),
        }
    }

    let path = path.ok_or_else(|| anyhow!("connection string has no Data Source"))?;
    Ok(target_for(path, mode))
}

fn target_for(path: String, mode: OpenMode) -> ConnectionTarget {
    let mode = if path == ":memory:" { OpenMode::Memory } else { mode };
    ConnectionTarget { path, mode }
}

fn open(target: &ConnectionTarget) -> Result<Connection> {
    let flags = match target.mode {
        OpenMode::Memory => return Connection::open_in_memory().context("opening in-memory database"),
        OpenMode::ReadOnly => OpenFlags::SQLITE_OPEN_READ_ONLY,
        OpenMode::ReadWrite => OpenFlags::SQLITE_OPEN_READ_WRITE,
        OpenMode::ReadWriteCreate => OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
    };
    Connection::open_with_flags(&target.path, flags)
        .with_context(|| format!("opening database '{}'", target.path))
}

/// Replace `$(Name)` and `{{Name}}` with each bag value's text form.
pub fn substitute_tokens(sql: &str, bag: &ParameterBag) -> String {
    let mut out = sql.to_string();
    for (name, value) in bag {
        let text = value.to_string();
        out = out
            .replace(&format!("$({name})"), &text)
            .replace(&format!("{{{{{name}}}}}"), &text);
    }
    out
}

/// Split on a semicolon followed by a line break. The semicolon stays with
/// its statement; blank and comment-only pieces are dropped.
pub fn split_statements(sql: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut start = 0;
    for m in STATEMENT_END.find_iter(sql) {
        push_statement(&mut statements, &sql[start..=m.start()]);
        start = m.end();
    }
    push_statement(&mut statements, &sql[start..]);
    statements
}

fn push_statement(out: &mut Vec<String>, piece: &str) {
    let piece = piece.trim();
    let has_sql = piece
        .lines()
        .map(str::trim)
        .filter(|l| !l.starts_with("--"))
        .any(|l| l.chars().any(|c| !c.is_whitespace() && c != ';'));
    if has_sql {
        out.push(piece.to_string());
    }
}

/// Rows changed, or rows returned for statements that produce a result set.
fn run_statement(tx: &Transaction<'_>, sql: &str) -> rusqlite::Result<usize> {
    let mut stmt = tx.prepare(sql)?;
    if stmt.column_count() == 0 {
        return stmt.execute([]);
    }
    let mut rows = stmt.query([])?;
    let mut count = 0;
    while rows.next()?.is_some() {
        count += 1;
    }
    Ok(count)
}

fn run_batch(mut conn: Connection, statements: &[String], cancel: &CancellationToken) -> Result<String> {
    let tx = conn.transaction().context("starting transaction")?;
    let mut log = Vec::with_capacity(statements.len());
    for (index, sql) in statements.iter().enumerate() {
        if cancel.is_cancelled() {
            bail!("execution cancelled");
        }
        let affected =
            run_statement(&tx, sql).with_context(|| format!("statement {} failed", index + 1))?;
        log.push(format!("[OK] {affected} rows affected"));
    }
    tx.commit().context("committing transaction")?;
    Ok(log.join("\n"))
}

pub struct DatabaseExecutor {
    connections: Vec<NamedConnection>,
    storage: Arc<dyn TempStorage>,
}

impl DatabaseExecutor {
    pub fn new(connections: Vec<NamedConnection>, storage: Arc<dyn TempStorage>) -> Self {
        Self {
            connections,
            storage,
        }
    }

    /// The script's own connection string, else the first configured one.
    pub fn resolve_connection<'a>(&'a self, metadata: &'a ScriptMetadata) -> Option<&'a str> {
        metadata
            .connection_string
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .or_else(|| self.connections.first().map(|c| c.connection_string.as_str()))
    }

    async fn run(&self, metadata: &ScriptMetadata, ctx: &ExecutionContext) -> Result<String> {
        let raw = tokio::fs::read_to_string(&ctx.script_path)
            .await
            .with_context(|| format!("reading {}", ctx.script_path.display()))?;
        let sql = substitute_tokens(&raw, &ctx.parameters);
        let statements = split_statements(&sql);

        let target = self
            .resolve_connection(metadata)
            .ok_or_else(|| anyhow!("connection string missing"))
            .and_then(parse_connection_string)?;
        let conn = open(&target)?;

        let interrupt = conn.get_interrupt_handle();
        let watch = ctx.cancel.clone();
        let watcher = tokio::spawn(async move {
            watch.cancelled().await;
            interrupt.interrupt();
        });

        debug!(script = %metadata.id, statements = statements.len(), "running database batch");
        let cancel = ctx.cancel.clone();
        let outcome = tokio::task::spawn_blocking(move || run_batch(conn, &statements, &cancel)).await;
        watcher.abort();

        outcome.context("database worker failed")?
    }
}

impl ScriptExecutor for DatabaseExecutor {
    fn execute<'a>(
        &'a self,
        metadata: &'a ScriptMetadata,
        ctx: &'a ExecutionContext,
    ) -> BoxFuture<'a, ExecutionResult> {
        Box::pin(async move {
            let result = match self.run(metadata, ctx).await {
                Ok(log) => {
                    info!(script = %metadata.id, "database script committed");
                    ExecutionResult::succeeded(log)
                }
                Err(err) => {
                    error!(script = %metadata.id, error = %format!("{err:#}"), "database script failed");
                    ExecutionResult::error(format!("{err:#}"))
                }
            };
            self.storage.delete(&ctx.script_path);
            result
        })
    }
}
