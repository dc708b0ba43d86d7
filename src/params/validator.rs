// src/params/validator.rs

//! Apply defaults, enforce required-ness, and coerce each declared parameter
//! into its declared type.

use tracing::debug;

use crate::errors::ValidationError;
use crate::metadata::{ParameterDefinition, ScriptMetadata};
use crate::params::{ParamValue, ParameterBag};
use crate::types::ParamType;

/// Longest accepted `String` parameter, in characters.
pub const MAX_STRING_LENGTH: usize = 4000;

/// Validate `bag` against `metadata` in place.
///
/// Parameters are processed in declaration order and the first failure is
/// returned. Entries not declared by the script are left untouched. On error
/// the bag may already hold coerced values for earlier parameters.
pub fn validate(metadata: &ScriptMetadata, bag: &mut ParameterBag) -> Result<(), ValidationError> {
    for def in &metadata.parameters {
        let blank = bag.get(&def.name).is_none_or(ParamValue::is_blank);

        if blank {
            if let Some(default) = def.default.as_deref().filter(|d| !d.trim().is_empty()) {
                debug!(parameter = %def.name, "applying declared default");
                bag.insert(def.name.clone(), ParamValue::String(default.to_string()));
            } else if def.required {
                return Err(ValidationError::MissingRequired(def.name.clone()));
            } else {
                // Optional and blank: nothing to coerce.
                continue;
            }
        }

        let Some(value) = bag.get(&def.name) else {
            continue;
        };
        let coerced = coerce(def, value)?;
        bag.insert(def.name.clone(), coerced);
    }
    Ok(())
}

fn coerce(def: &ParameterDefinition, value: &ParamValue) -> Result<ParamValue, ValidationError> {
    let conversion = |cause: String| ValidationError::Conversion {
        name: def.name.clone(),
        cause,
    };

    match def.param_type {
        ParamType::String => {
            let text = value.to_string();
            let len = text.chars().count();
            if len > MAX_STRING_LENGTH {
                return Err(ValidationError::TooLong {
                    name: def.name.clone(),
                    len,
                    max: MAX_STRING_LENGTH,
                });
            }
            Ok(ParamValue::String(text))
        }
        ParamType::Int => value.to_int().map(ParamValue::Int).map_err(conversion),
        ParamType::Decimal => value.to_decimal().map(ParamValue::Decimal).map_err(conversion),
        ParamType::Bool => value.to_bool().map(ParamValue::Bool).map_err(conversion),
        ParamType::DateTime => value.to_datetime().map(ParamValue::DateTime).map_err(conversion),
        ParamType::Enum => {
            let text = value.to_string();
            if !def.enum_values.is_empty()
                && !def.enum_values.iter().any(|v| v.eq_ignore_ascii_case(&text))
            {
                return Err(ValidationError::InvalidEnum {
                    name: def.name.clone(),
                    value: text,
                });
            }
            Ok(ParamValue::String(text))
        }
    }
}
