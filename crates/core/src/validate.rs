//! Schema validation for spec, rule and map documents.
//!
//! Schemas are embedded JSON Schema (draft 2020-12) files. All violations of
//! a document are collected into one [`SpecError::Validation`].

use crate::error::SpecError;
use serde_json::Value;

const SPEC_SCHEMA: &str = include_str!("../schema/spec.schema.json");
const RULES_SCHEMA: &str = include_str!("../schema/rules.schema.json");
const MAP_SCHEMA: &str = include_str!("../schema/map.schema.json");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaKind {
    Spec,
    Rules,
    Map,
}

impl SchemaKind {
    pub fn name(&self) -> &'static str {
        match self {
            SchemaKind::Spec => "spec",
            SchemaKind::Rules => "rules",
            SchemaKind::Map => "map",
        }
    }

    fn source(&self) -> &'static str {
        match self {
            SchemaKind::Spec => SPEC_SCHEMA,
            SchemaKind::Rules => RULES_SCHEMA,
            SchemaKind::Map => MAP_SCHEMA,
        }
    }

    /// The schema document itself.
    pub fn schema(&self) -> Value {
        serde_json::from_str(self.source()).unwrap_or(Value::Null)
    }
}

/// All schema violations of `doc`, as messages. Empty when valid.
pub fn schema_errors(kind: SchemaKind, doc: &Value) -> Result<Vec<String>, SpecError> {
    let schema = kind.schema();
    let validator = jsonschema::validator_for(&schema).map_err(|e| SpecError::Validation {
        document: kind.name().to_string(),
        errors: vec![format!("internal error: failed to compile schema: {}", e)],
    })?;
    Ok(validator.iter_errors(doc).map(|e| format!("{}", e)).collect())
}

/// Validate `doc`, failing with every violation at once.
pub fn validate_document(kind: SchemaKind, doc: &Value) -> Result<(), SpecError> {
    let errors = schema_errors(kind, doc)?;
    if errors.is_empty() {
        return Ok(());
    }
    Err(SpecError::Validation {
        document: kind.name().to_string(),
        errors,
    })
}
