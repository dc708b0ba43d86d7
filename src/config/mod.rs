// src/config/mod.rs

//! Configuration loading and validation.
//!
//! - `model.rs`: the TOML-backed data model and its defaults.
//! - `loader.rs`: reading a config file from disk.
//! - `validate.rs`: semantic checks turning a raw file into a `ConfigFile`.

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path};
pub use model::{
    ConfigFile, DatabaseSection, ExecutionSection, RawConfigFile, RemoteSection,
    RepositorySection, StorageSection,
};
