// src/metadata/mod.rs

//! Script descriptors extracted from the structured comment block at the top
//! of each script file.

pub mod parser;

use serde::{Deserialize, Serialize};

use crate::types::{ParamType, ScriptKind};

pub use parser::parse;

/// Contract for one declared script input.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ParameterDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: ParamType,
    pub required: bool,
    pub display_name: Option<String>,
    pub default: Option<String>,
    pub help_text: Option<String>,
    /// Allowed values for `Enum` parameters. Empty means unconstrained.
    pub enum_values: Vec<String>,
}

impl ParameterDefinition {
    pub fn new(name: impl Into<String>, param_type: ParamType) -> Self {
        Self {
            name: name.into(),
            param_type,
            ..Self::default()
        }
    }
}

/// Descriptor of one script in the repository.
///
/// `id` is the unique key; lookups compare it case-insensitively.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ScriptMetadata {
    pub id: String,
    pub name: String,
    pub category: String,
    pub description: Option<String>,
    /// Declaration order is preserved; it drives shell argument order.
    pub parameters: Vec<ParameterDefinition>,
    /// Set for database scripts; its presence alone routes to the database
    /// executor.
    pub connection_string: Option<String>,
    /// Repository-relative path, filled in by the repository after parsing.
    pub source_path: Option<String>,
}

impl ScriptMetadata {
    /// A database script has a `.sql` source path or a non-blank
    /// connection string, whatever its extension.
    pub fn is_database_script(&self) -> bool {
        self.kind() == ScriptKind::Database
    }

    /// Executor family for this script. Everything that is not a database
    /// script runs in the shell interpreter.
    pub fn kind(&self) -> ScriptKind {
        let has_connection = self
            .connection_string
            .as_deref()
            .is_some_and(|c| !c.trim().is_empty());
        if has_connection {
            return ScriptKind::Database;
        }
        self.source_path
            .as_deref()
            .and_then(ScriptKind::from_path)
            .unwrap_or(ScriptKind::Shell)
    }

    pub fn with_source_path(mut self, path: impl Into<String>) -> Self {
        self.source_path = Some(path.into());
        self
    }

    pub fn matches_id(&self, id: &str) -> bool {
        self.id.eq_ignore_ascii_case(id)
    }

    /// Look up a declared parameter by name (case-insensitive).
    pub fn parameter(&self, name: &str) -> Option<&ParameterDefinition> {
        self.parameters
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
    }
}
