//! YAML documents as `serde_json` values.
//!
//! Specs, rule files, map files and transform sources are authored in YAML
//! but validated and evaluated as JSON. Mapping keys are stringified
//! (`1` → `"1"`, `true` → `"true"`, `~` → `"null"`) and tags are dropped.

use crate::error::SpecError;
use crate::source::SourceProvider;
use serde_json::{Map, Number, Value};
use std::path::Path;

fn key_string(key: &serde_yaml::Value) -> String {
    match key {
        serde_yaml::Value::Null => "null".to_string(),
        serde_yaml::Value::Bool(b) => b.to_string(),
        serde_yaml::Value::Number(n) => n.to_string(),
        serde_yaml::Value::String(s) => s.clone(),
        serde_yaml::Value::Tagged(t) => key_string(&t.value),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim().to_string())
            .unwrap_or_default(),
    }
}

/// Convert a YAML value to JSON.
pub fn yaml_to_json(value: serde_yaml::Value) -> Value {
    match value {
        serde_yaml::Value::Null => Value::Null,
        serde_yaml::Value::Bool(b) => Value::Bool(b),
        serde_yaml::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::from(i)
            } else if let Some(u) = n.as_u64() {
                Value::from(u)
            } else {
                n.as_f64()
                    .and_then(Number::from_f64)
                    .map(Value::Number)
                    .unwrap_or(Value::Null)
            }
        }
        serde_yaml::Value::String(s) => Value::String(s),
        serde_yaml::Value::Sequence(items) => {
            Value::Array(items.into_iter().map(yaml_to_json).collect())
        }
        serde_yaml::Value::Mapping(mapping) => {
            let mut out = Map::new();
            for (k, v) in mapping {
                out.insert(key_string(&k), yaml_to_json(v));
            }
            Value::Object(out)
        }
        serde_yaml::Value::Tagged(tagged) => yaml_to_json(tagged.value),
    }
}

/// Parse YAML text. An empty document is `null`.
pub fn parse_yaml(text: &str, path: &Path) -> Result<Value, SpecError> {
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    let value: serde_yaml::Value = serde_yaml::from_str(text).map_err(|e| SpecError::Yaml {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    Ok(yaml_to_json(value))
}

/// Read a YAML file through `provider`.
pub fn read_yaml(path: &Path, provider: &dyn SourceProvider) -> Result<Value, SpecError> {
    let text = provider.read_source(path).map_err(|e| SpecError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    parse_yaml(&text, path)
}

/// Read a YAML file whose top level must be a mapping.
pub fn read_yaml_mapping(
    path: &Path,
    provider: &dyn SourceProvider,
) -> Result<Map<String, Value>, SpecError> {
    match read_yaml(path, provider)? {
        Value::Object(map) => Ok(map),
        _ => Err(SpecError::NotAMapping {
            path: path.to_path_buf(),
        }),
    }
}

/// True for `.yaml` / `.yml` paths.
pub fn has_yaml_suffix(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn stringifies_keys_and_keeps_order() {
        let v = parse_yaml("z: 1\n1: one\ntrue: yes\n~: none\n", Path::new("t.yaml")).unwrap();
        assert_eq!(v, json!({"z": 1, "1": "one", "true": "yes", "null": "none"}));
        let keys: Vec<&String> = v.as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["z", "1", "true", "null"]);
    }

    #[test]
    fn empty_document_is_null() {
        assert_eq!(parse_yaml("  \n", Path::new("t.yaml")).unwrap(), Value::Null);
    }

    #[test]
    fn syntax_error_names_file() {
        let err = parse_yaml("a: [1, 2", Path::new("broken.yaml")).unwrap_err();
        assert!(err.to_string().contains("broken.yaml"));
    }

    #[test]
    fn suffix_check() {
        assert!(has_yaml_suffix(Path::new("a.yaml")));
        assert!(has_yaml_suffix(Path::new("a.yml")));
        assert!(!has_yaml_suffix(Path::new("a.json")));
    }
}
