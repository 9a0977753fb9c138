//! Static literal validation against a field's declared shape.
//!
//! Static transformations carry a user-typed literal. These helpers check the
//! literal against the field's `(type, format)` using JSON Schema, so a
//! `number` field rejects `"abc"` and a `date-time` field rejects
//! `"yesterday"`. Editing operations never call this; reports do.

use serde_json::{json, Map, Value};

use crate::error::{ValidateError, ValueError};
use crate::types::{Field, SimpleType, StaticValue};

/// JSON Schema primitive type names.
const JSON_SCHEMA_TYPES: &[&str] = &[
    "string", "number", "integer", "boolean", "object", "array", "null",
];

/// Build the JSON Schema describing values of `simple_type`.
///
/// Types outside JSON Schema's vocabulary constrain only the format.
pub fn value_schema(simple_type: &SimpleType) -> Value {
    let mut schema = Map::new();
    if JSON_SCHEMA_TYPES.contains(&simple_type.kind.as_str()) {
        schema.insert("type".to_string(), json!(simple_type.kind));
    }
    if let Some(format) = &simple_type.format {
        schema.insert("format".to_string(), json!(format));
    }
    Value::Object(schema)
}

/// Validate a static literal assigned to `field`.
///
/// # Errors
///
/// Returns `ValidateError::Invalid` listing every violation, or
/// `ValidateError::InvalidSchema` if the field's shape can't be compiled.
pub fn validate_static_value(field: &Field, value: &StaticValue) -> Result<(), ValidateError> {
    validate_against_type(&field.slug, &field.simple_type, &value.to_json())
}

/// Validate an arbitrary JSON value against a declared shape.
pub fn validate_against_type(
    path: &str,
    simple_type: &SimpleType,
    value: &Value,
) -> Result<(), ValidateError> {
    let schema = value_schema(simple_type);
    let validator = jsonschema::options()
        .should_validate_formats(true)
        .build(&schema)
        .map_err(|e| ValidateError::InvalidSchema {
            message: e.to_string(),
        })?;

    let errors: Vec<ValueError> = validator
        .iter_errors(value)
        .map(|e| ValueError {
            path: path.to_string(),
            message: e.to_string(),
        })
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ValidateError::Invalid { errors })
    }
}
