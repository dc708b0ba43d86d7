// src/metadata/parser.rs

//! Line-oriented parser for the `SCRIPT-METADATA:` comment block.
//!
//! ```text
//! <#
//! SCRIPT-METADATA:
//! Id: purge-logs
//! Name: Purge logs
//! Category: Maintenance
//! Parameters:
//! - Name: Days
//!   Type: Int
//!   Required: true
//!   Default: "30"
//! END-SCRIPT-METADATA
//! #>
//! ```
//!
//! Only the first block is read. Keys match case-insensitively; unknown
//! lines are ignored.

use std::sync::LazyLock;

use regex::Regex;

use crate::errors::ParseError;
use crate::metadata::{ParameterDefinition, ScriptMetadata};
use crate::types::ParamType;

static BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)SCRIPT-METADATA:(.*?)END-SCRIPT-METADATA")
        .unwrap_or_else(|e| panic!("metadata block pattern is invalid: {e}"))
});

/// Parse the metadata block embedded in `text`.
///
/// `Id`, `Name` and `Category` are mandatory; a blank value counts as
/// missing. `source_path` is left unset; the repository fills it in.
pub fn parse(text: &str) -> Result<ScriptMetadata, ParseError> {
    let body = BLOCK
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .ok_or(ParseError::MissingBlock)?;

    let mut meta = ScriptMetadata::default();
    let mut current: Option<ParameterDefinition> = None;

    for raw in body.lines() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(name) = parameter_start(line) {
            if let Some(done) = current.take() {
                meta.parameters.push(done);
            }
            current = Some(ParameterDefinition::new(name, ParamType::String));
            continue;
        }

        let Some((key, value)) = split_key(line) else {
            continue;
        };

        // Connection strings are top-level even when written under a parameter.
        if key.eq_ignore_ascii_case("SqlConnectionString") {
            meta.connection_string = Some(unquote(value).to_string());
            continue;
        }

        match current.as_mut() {
            Some(param) => apply_parameter_key(param, &key, value),
            None => apply_top_level_key(&mut meta, &key, value),
        }
    }

    if let Some(done) = current.take() {
        meta.parameters.push(done);
    }

    let mut missing = Vec::new();
    if meta.id.trim().is_empty() {
        missing.push("Id");
    }
    if meta.name.trim().is_empty() {
        missing.push("Name");
    }
    if meta.category.trim().is_empty() {
        missing.push("Category");
    }
    if !missing.is_empty() {
        return Err(ParseError::MissingFields(missing.join(", ")));
    }

    Ok(meta)
}

/// `- Name: X` opens a new parameter entry.
fn parameter_start(line: &str) -> Option<String> {
    let rest = line.strip_prefix('-')?.trim_start();
    let (key, value) = split_key(rest)?;
    key.eq_ignore_ascii_case("Name").then(|| value.to_string())
}

fn split_key(line: &str) -> Option<(String, &str)> {
    let (key, value) = line.split_once(':')?;
    Some((key.trim().to_string(), value.trim()))
}

fn unquote(value: &str) -> &str {
    value.trim_matches('"')
}

fn apply_top_level_key(meta: &mut ScriptMetadata, key: &str, value: &str) {
    match key.to_ascii_lowercase().as_str() {
        "id" => meta.id = value.to_string(),
        "name" => meta.name = value.to_string(),
        "category" => meta.category = value.to_string(),
        "description" => meta.description = Some(value.to_string()),
        _ => {}
    }
}

fn apply_parameter_key(param: &mut ParameterDefinition, key: &str, value: &str) {
    match key.to_ascii_lowercase().as_str() {
        "type" => param.param_type = value.parse().unwrap_or_default(),
        "required" => param.required = value.eq_ignore_ascii_case("true"),
        "displayname" => param.display_name = Some(value.to_string()),
        "default" => param.default = Some(unquote(value).to_string()),
        "helptext" => param.help_text = Some(unquote(value).to_string()),
        "enumvalues" | "values" => {
            param.enum_values = value
                .split(',')
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .collect();
        }
        _ => {}
    }
}
