// src/config/model.rs

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::engine::DispatcherOptions;
use crate::exec::{NamedConnection, ShellOptions};
use crate::repository::GitRemote;
use crate::storage::FsTempStorage;
use crate::types::RepoProvider;

/// Configuration as read from a TOML file, before validation.
///
/// ```toml
/// [repository]
/// provider = "github"
///
/// [repository.github]
/// url = "https://github.com/acme/ops-scripts.git"
/// branch = "main"
/// token = "env:OPS_SCRIPTS_TOKEN"
///
/// [execution]
/// max_concurrent = 2
///
/// [[database.connections]]
/// name = "main"
/// connection_string = "Data Source=/var/lib/app/app.db"
/// ```
///
/// All sections are optional and have reasonable defaults.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct RawConfigFile {
    #[serde(default)]
    pub repository: RepositorySection,

    #[serde(default)]
    pub execution: ExecutionSection,

    #[serde(default)]
    pub database: DatabaseSection,

    #[serde(default)]
    pub storage: StorageSection,
}

/// Validated configuration. Build it with `ConfigFile::try_from(raw)`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub repository: RepositorySection,
    pub execution: ExecutionSection,
    pub database: DatabaseSection,
    pub storage: StorageSection,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(raw: RawConfigFile) -> Self {
        Self {
            repository: raw.repository,
            execution: raw.execution,
            database: raw.database,
            storage: raw.storage,
        }
    }

    pub fn dispatcher_options(&self) -> DispatcherOptions {
        DispatcherOptions {
            max_concurrent: self.execution.max_concurrent,
            output_truncation: self.execution.output_truncation,
        }
    }

    pub fn shell_options(&self) -> ShellOptions {
        ShellOptions {
            shell_path: self.execution.shell_path.clone(),
            allow_legacy: self.execution.fallback_to_legacy_shell,
            keep_temp_scripts: self.execution.keep_temp_scripts,
        }
    }
}

/// `[repository]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RepositorySection {
    /// Which of the remote subtables is used.
    #[serde(default)]
    pub provider: RepoProvider,

    /// Explicit git executable. When unset, git is looked up next to the
    /// program.
    #[serde(default)]
    pub git_path: Option<PathBuf>,

    /// How long listings and script bodies are cached.
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    #[serde(default)]
    pub github: RemoteSection,

    #[serde(default)]
    pub azure_devops: RemoteSection,
}

fn default_cache_ttl_secs() -> u64 {
    30
}

impl Default for RepositorySection {
    fn default() -> Self {
        Self {
            provider: RepoProvider::default(),
            git_path: None,
            cache_ttl_secs: default_cache_ttl_secs(),
            github: RemoteSection::default(),
            azure_devops: RemoteSection::default(),
        }
    }
}

impl RepositorySection {
    /// Remote selected by `provider`.
    pub fn active_remote(&self) -> &RemoteSection {
        match self.provider {
            RepoProvider::Github => &self.github,
            RepoProvider::AzureDevops => &self.azure_devops,
        }
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

/// `[repository.github]` / `[repository.azure_devops]`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RemoteSection {
    #[serde(default)]
    pub url: String,

    #[serde(default = "default_branch")]
    pub branch: String,

    /// Access token, or `env:NAME` to read it from an environment variable.
    #[serde(default)]
    pub token: Option<String>,

    #[serde(default)]
    pub proxy: Option<String>,
}

fn default_branch() -> String {
    "main".to_string()
}

impl Default for RemoteSection {
    fn default() -> Self {
        Self {
            url: String::new(),
            branch: default_branch(),
            token: None,
            proxy: None,
        }
    }
}

impl RemoteSection {
    /// Token with any `env:` indirection resolved. Unset or empty
    /// variables yield `None`.
    pub fn resolve_token(&self) -> Option<String> {
        let raw = self.token.as_deref()?.trim();
        let value = match raw.strip_prefix("env:") {
            Some(var) => std::env::var(var.trim()).ok()?,
            None => raw.to_string(),
        };
        (!value.is_empty()).then_some(value)
    }

    pub fn to_git_remote(&self) -> GitRemote {
        GitRemote {
            url: self.url.clone(),
            branch: self.branch.clone(),
            token: self.resolve_token(),
            proxy: self.proxy.clone().filter(|p| !p.trim().is_empty()),
        }
    }
}

/// `[execution]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExecutionSection {
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Recorded stdout/stderr are cut to this many characters.
    #[serde(default = "default_output_truncation")]
    pub output_truncation: usize,

    #[serde(default)]
    pub shell_path: Option<PathBuf>,

    #[serde(default = "default_true")]
    pub fallback_to_legacy_shell: bool,

    /// Leave materialised shell scripts on disk for inspection.
    #[serde(default)]
    pub keep_temp_scripts: bool,
}

fn default_max_concurrent() -> usize {
    2
}

fn default_output_truncation() -> usize {
    10_000
}

fn default_true() -> bool {
    true
}

impl Default for ExecutionSection {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            output_truncation: default_output_truncation(),
            shell_path: None,
            fallback_to_legacy_shell: default_true(),
            keep_temp_scripts: false,
        }
    }
}

/// `[database]` section. The first connection is the default target.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct DatabaseSection {
    #[serde(default)]
    pub connections: Vec<NamedConnection>,
}

/// `[storage]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageSection {
    #[serde(default)]
    pub temp_root: Option<PathBuf>,

    /// `sweep` removes temp directories older than this.
    #[serde(default = "default_orphan_max_age_secs")]
    pub orphan_max_age_secs: u64,
}

fn default_orphan_max_age_secs() -> u64 {
    3600
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            temp_root: None,
            orphan_max_age_secs: default_orphan_max_age_secs(),
        }
    }
}

impl StorageSection {
    pub fn temp_root(&self) -> PathBuf {
        self.temp_root
            .clone()
            .unwrap_or_else(FsTempStorage::default_root)
    }

    pub fn orphan_max_age(&self) -> Duration {
        Duration::from_secs(self.orphan_max_age_secs)
    }
}
