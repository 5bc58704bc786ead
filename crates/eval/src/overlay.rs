//! Map overlays: a second declarative pass over a remapped tree.
//!
//! A map file keys output paths to one rule or a list of rules. The first
//! rule whose `when` matches decides the new value; `override: false` only
//! fills values that are missing or null.

use crate::error::RemapError;
use crate::scan::ParameterSource;
use pvmap_core::json::{get_nested_in, loose_eq, set_nested, to_text};
use pvmap_core::yaml::read_yaml;
use pvmap_core::{validate_document, SchemaKind, SourceProvider, SpecError, Spec};
use regex::Regex;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

fn yes() -> bool {
    true
}

fn present<'de, D: serde::Deserializer<'de>>(d: D) -> Result<Option<Value>, D::Error> {
    Value::deserialize(d).map(Some)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MapRuleKind {
    Mapping,
    Const,
}

/// One candidate rule for an output path.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MapRule {
    #[serde(default)]
    pub when: Option<Map<String, Value>>,
    #[serde(default, rename = "type")]
    pub kind: Option<MapRuleKind>,
    #[serde(default)]
    pub values: Option<Map<String, Value>>,
    #[serde(default, deserialize_with = "present")]
    pub default: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    pub value: Option<Value>,
    #[serde(default = "yes", rename = "override")]
    pub override_existing: bool,
}

impl MapRule {
    fn effective_kind(&self) -> Option<MapRuleKind> {
        self.kind.or_else(|| {
            if self.values.is_some() {
                Some(MapRuleKind::Mapping)
            } else if self.value.is_some() {
                Some(MapRuleKind::Const)
            } else {
                None
            }
        })
    }

    /// The value this rule produces for `current`, or `None` when it has
    /// nothing to say.
    fn resolve(&self, current: &Value) -> Result<Option<Value>, RemapError> {
        if self.when.is_none() {
            if let Some(default) = &self.default {
                return Ok(Some(default.clone()));
            }
        }
        match self.effective_kind() {
            Some(MapRuleKind::Mapping) => {
                let Some(values) = &self.values else {
                    return Err(RemapError::config("map values must be a mapping"));
                };
                if current.is_null() && self.default.is_none() && !values.contains_key("null") {
                    return Ok(None);
                }
                Ok(Some(lookup(current, values, self.default.as_ref())))
            }
            Some(MapRuleKind::Const) => Ok(Some(self.value.clone().unwrap_or(Value::Null))),
            None => Ok(self.default.clone()),
        }
    }
}

/// Element-wise for lists; exact key, then the stringified value, then the
/// default, else the value unchanged.
fn lookup(value: &Value, values: &Map<String, Value>, default: Option<&Value>) -> Value {
    if let Value::Array(items) = value {
        return Value::Array(items.iter().map(|v| lookup(v, values, default)).collect());
    }
    if let Some(mapped) = values.get(&to_text(value)) {
        return mapped.clone();
    }
    default.cloned().unwrap_or_else(|| value.clone())
}

/// A parsed map file, in file order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MapDocument {
    entries: Vec<(String, Vec<MapRule>)>,
}

impl MapDocument {
    /// Build from the document's JSON form. List items that are not
    /// mappings are ignored; a scalar in place of a rule is an error.
    pub fn from_json(doc: &Map<String, Value>) -> Result<MapDocument, RemapError> {
        let mut entries = Vec::new();
        for (key, raw) in doc {
            let items: Vec<&Value> = match raw {
                Value::Array(items) => items.iter().filter(|v| v.is_object()).collect(),
                Value::Object(_) => vec![raw],
                _ => {
                    return Err(RemapError::config(format!(
                        "map rule for '{}' must be a mapping or list of mappings",
                        key
                    )))
                }
            };
            let rules = items
                .into_iter()
                .map(|item| {
                    serde_json::from_value(item.clone()).map_err(|e| {
                        RemapError::config(format!("invalid map rule for '{}': {}", key, e))
                    })
                })
                .collect::<Result<Vec<MapRule>, _>>()?;
            entries.push((key.clone(), rules));
        }
        Ok(MapDocument { entries })
    }

    pub fn entries(&self) -> &[(String, Vec<MapRule>)] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The map file to apply: the explicit override, else `__meta__.map_file`
/// relative to the spec's own file.
pub fn resolve_map_path(spec: &Spec, explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let map_file = Path::new(spec.meta().map_file.as_deref()?);
    if map_file.is_absolute() {
        return Some(map_file.to_path_buf());
    }
    let base = spec
        .spec_path()
        .and_then(Path::parent)
        .unwrap_or_else(|| Path::new("."));
    Some(base.join(map_file))
}

/// Read a map file. An empty file is an empty document.
pub fn load_map_file(
    path: &Path,
    provider: &dyn SourceProvider,
    validate: bool,
) -> Result<MapDocument, RemapError> {
    if !provider.is_file(path) {
        return Err(RemapError::MapFileNotFound {
            path: path.to_path_buf(),
        });
    }
    let doc = read_yaml(path, provider)?;
    if doc.is_null() {
        return Ok(MapDocument::default());
    }
    let Value::Object(map) = &doc else {
        return Err(SpecError::NotAMapping {
            path: path.to_path_buf(),
        }
        .into());
    };
    if validate {
        validate_document(SchemaKind::Map, &doc)?;
    }
    MapDocument::from_json(map)
}

/// Source ids a `when` clause can test, under all accepted spellings.
struct SourceIds {
    scan_id: Option<u32>,
    reco_id: Option<u32>,
}

impl SourceIds {
    fn get(&self, name: &str) -> Option<Value> {
        let id = match name.to_ascii_lowercase().as_str() {
            "scanid" | "scan_id" => self.scan_id,
            "recoid" | "reco_id" => self.reco_id,
            _ => None,
        };
        id.map(Value::from)
    }
}

/// Apply `doc` to `result` in place.
pub fn apply_map_overlay(
    result: &mut Map<String, Value>,
    doc: &MapDocument,
    source: &dyn ParameterSource,
) -> Result<(), RemapError> {
    let ids = SourceIds {
        scan_id: source.scan_id(),
        reco_id: source.reco_id(),
    };
    for (out_key, rules) in &doc.entries {
        let current = current_value(result, out_key);
        for rule in rules {
            if let Some(when) = &rule.when {
                if !matches_when(when, result, &ids)? {
                    continue;
                }
            }
            let Some(value) = rule.resolve(current.as_ref().unwrap_or(&Value::Null))? else {
                break;
            };
            let empty = current.as_ref().is_none_or(Value::is_null);
            if rule.override_existing || empty {
                log::trace!("map overlay sets '{}'", out_key);
                set_nested(result, out_key, value);
            }
            break;
        }
    }
    Ok(())
}

/// Dotted paths count only when the nested value is non-null; plain keys
/// count whenever present.
fn current_value(result: &Map<String, Value>, key: &str) -> Option<Value> {
    if key.contains('.') {
        return get_nested_in(result, key).filter(|v| !v.is_null()).cloned();
    }
    result.get(key).cloned()
}

fn matches_when(
    when: &Map<String, Value>,
    result: &Map<String, Value>,
    ids: &SourceIds,
) -> Result<bool, RemapError> {
    for (key, cond) in when {
        let actual = match ids.get(key) {
            Some(id) => id,
            None => match current_value(result, key) {
                Some(value) => value,
                None => return Ok(false),
            },
        };
        if !matches_condition(&actual, cond)? {
            return Ok(false);
        }
    }
    Ok(true)
}

/// A mapping condition combines `not`, `in`, `regex` and plain equality on
/// any other key; anything else is compared for equality.
fn matches_condition(value: &Value, cond: &Value) -> Result<bool, RemapError> {
    let Value::Object(ops) = cond else {
        return Ok(loose_eq(value, cond));
    };
    for (op, expected) in ops {
        let ok = match op.as_str() {
            "not" => !matches_condition(value, expected)?,
            "in" => {
                let options: &[Value] = match expected {
                    Value::Array(items) => items,
                    other => std::slice::from_ref(other),
                };
                let is_option = |v: &Value| options.iter().any(|o| loose_eq(o, v));
                match value {
                    Value::Array(items) => items.iter().any(is_option),
                    other => is_option(other),
                }
            }
            "regex" => {
                let re = Regex::new(&to_text(expected))
                    .map_err(|e| RemapError::config(format!("invalid map regex: {}", e)))?;
                re.is_match(&to_text(value))
            }
            _ => loose_eq(value, expected),
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}
