// src/lib.rs

pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod history;
pub mod logging;
pub mod metadata;
pub mod notify;
pub mod params;
pub mod repository;
pub mod service;
pub mod storage;
pub mod types;

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::cli::{CliArgs, Command};
use crate::config::{ConfigFile, default_config_path, load_and_validate};
use crate::params::ParameterBag;
use crate::service::ScriptRunner;
use crate::storage::FsTempStorage;
use crate::types::ExecutionStatus;

/// High-level entry point used by `main.rs`.
///
/// Loads config, wires the runner, and executes one subcommand. Ctrl-C
/// cancels in-flight git fetches and executions.
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = args
        .config
        .map(PathBuf::from)
        .unwrap_or_else(default_config_path);
    let cfg = load_and_validate(&config_path)
        .with_context(|| format!("loading config {}", config_path.display()))?;
    debug!(path = %config_path.display(), "config loaded");

    let runner = ScriptRunner::from_config(&cfg);

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            cancel.cancel();
        });
    }

    match args.command {
        Command::List => {
            for script in runner.list(&cancel).await?.iter() {
                println!(
                    "{}\t{}\t{}\t{}",
                    script.id,
                    script.name,
                    script.category,
                    script.kind()
                );
            }
        }
        Command::Show { id } => {
            let meta = runner.metadata(&id, &cancel).await?;
            println!("{}", serde_json::to_string_pretty(&meta)?);
        }
        Command::Content { id } => {
            print!("{}", runner.content(&id, &cancel).await?);
        }
        Command::Run { id, params, user } => {
            let bag: ParameterBag = params.into_iter().collect();
            let user = user.unwrap_or_else(default_user);
            run_and_wait(&runner, &id, bag, &user, &cancel).await?;
        }
        Command::Sweep => sweep(&cfg)?,
    }
    Ok(())
}

async fn run_and_wait(
    runner: &ScriptRunner,
    id: &str,
    bag: ParameterBag,
    user: &str,
    cancel: &CancellationToken,
) -> Result<()> {
    let execution = runner.submit(id, bag, user, cancel).await?;
    info!(execution = %execution, "waiting for execution");

    let dispatcher = runner.dispatcher();
    tokio::select! {
        _ = dispatcher.shutdown() => {}
        _ = cancel.cancelled() => {
            dispatcher.cancel(execution);
            dispatcher.abandon().await;
        }
    }

    let record = runner
        .record(execution)
        .await?
        .with_context(|| format!("execution {execution} has no history record"))?;

    print!("{}", record.stdout);
    if !record.stderr.is_empty() {
        eprint!("{}", record.stderr);
    }
    if record.status != ExecutionStatus::Succeeded {
        bail!(
            "execution {} finished {} with exit code {}",
            execution,
            record.status,
            record.exit_code
        );
    }
    Ok(())
}

fn sweep(cfg: &ConfigFile) -> Result<()> {
    let storage = FsTempStorage::new(cfg.storage.temp_root());
    let removed = storage.sweep_orphans(cfg.storage.orphan_max_age());
    println!("removed {removed} orphaned temp directories");
    Ok(())
}

fn default_user() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string())
}
