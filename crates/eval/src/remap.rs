//! Spec-driven remapping of parameter tables into an output tree.
//!
//! Each spec entry resolves to one value, written at its (possibly dotted)
//! output key in spec order. Later entries can read earlier outputs through
//! `ref` inputs. An optional map overlay runs over the finished tree.

use crate::error::RemapError;
use crate::overlay::{apply_map_overlay, load_map_file, resolve_map_path};
use crate::scan::ParameterSource;
use pvmap_core::json::{get_nested_in, set_nested};
use pvmap_core::{
    validate_document, FileSystemProvider, InputMap, InputSpec, ParamFile, Rule, SchemaKind,
    SourceEntry, SourceProvider, Spec, Transform, TransformChain, TransformRegistry,
};
use serde_json::{Map, Value};
use std::path::Path;

/// Options for [`map_parameters_with`].
pub struct MapOptions<'a> {
    /// Map file to overlay, overriding `__meta__.map_file`.
    pub map_file: Option<&'a Path>,
    /// Validate the spec (and the map file) against their schemas first.
    pub validate: bool,
    /// Reads the map file.
    pub provider: &'a dyn SourceProvider,
}

impl Default for MapOptions<'_> {
    fn default() -> Self {
        MapOptions {
            map_file: None,
            validate: false,
            provider: &FileSystemProvider,
        }
    }
}

/// Remap `source` through `spec`, returning a JSON object.
pub fn map_parameters(
    source: &dyn ParameterSource,
    spec: &Spec,
    transforms: &TransformRegistry,
) -> Result<Value, RemapError> {
    map_parameters_with(source, spec, transforms, &MapOptions::default())
}

/// Remap with an explicit map file, validation and file provider.
pub fn map_parameters_with(
    source: &dyn ParameterSource,
    spec: &Spec,
    transforms: &TransformRegistry,
    options: &MapOptions<'_>,
) -> Result<Value, RemapError> {
    if options.validate {
        validate_document(SchemaKind::Spec, &spec.to_json())?;
    }
    if source.is_study() {
        check_study_sources(spec)?;
    }

    let ctx = Resolver { source, transforms };
    let mut result = Map::new();
    for entry in spec.entries() {
        log::trace!("resolving '{}'", entry.key);
        let value = ctx
            .resolve_rule(&entry.rule, &result)
            .map_err(|e| RemapError::Rule {
                key: entry.key.clone(),
                body: entry.body.clone(),
                source: Box::new(e),
            })?;
        set_nested(&mut result, &entry.key, value);
    }

    if let Some(map_path) = resolve_map_path(spec, options.map_file) {
        log::debug!("applying map file {}", map_path.display());
        let doc = load_map_file(&map_path, options.provider, options.validate)?;
        apply_map_overlay(&mut result, &doc, source)?;
    }
    Ok(Value::Object(result))
}

/// A study only carries `subject`; every descriptor must read from it.
fn check_study_sources(spec: &Spec) -> Result<(), RemapError> {
    let descriptors = spec.descriptors();
    let mut found: Vec<String> = descriptors
        .iter()
        .filter(|d| d.file != ParamFile::Subject)
        .map(|d| d.file.as_str().to_string())
        .collect();
    found.sort();
    found.dedup();
    if !found.is_empty() || descriptors.is_empty() {
        return Err(RemapError::StudySources { found });
    }
    Ok(())
}

// ──────────────────────────────────────────────
// Resolution
// ──────────────────────────────────────────────

struct Resolver<'a> {
    source: &'a dyn ParameterSource,
    transforms: &'a TransformRegistry,
}

impl Resolver<'_> {
    fn resolve_rule(&self, rule: &Rule, result: &Map<String, Value>) -> Result<Value, RemapError> {
        if let Some(inputs) = &rule.inputs {
            return self.resolve_inputs_rule(inputs, rule.transform.as_ref(), result);
        }
        let value = self.resolve_sources(rule.sources.as_deref().unwrap_or(&[]), result)?;
        match &rule.transform {
            Some(chain) => self.apply_chain(chain, value),
            None => Ok(value),
        }
    }

    /// Resolve every input, then hand them to the transform as keywords.
    fn resolve_inputs_rule(
        &self,
        inputs: &InputMap,
        transform: Option<&TransformChain>,
        result: &Map<String, Value>,
    ) -> Result<Value, RemapError> {
        let mut resolved = Map::new();
        for (name, spec) in inputs.iter() {
            resolved.insert(name.to_string(), self.resolve_input(name, spec, result)?);
        }
        match transform {
            Some(chain) => self.apply_keywords(chain, resolved),
            None => Ok(Value::Object(resolved)),
        }
    }

    fn resolve_input(
        &self,
        name: &str,
        spec: &InputSpec,
        result: &Map<String, Value>,
    ) -> Result<Value, RemapError> {
        if let Some(constant) = &spec.constant {
            return Ok(constant.clone());
        }
        if let Some(reference) = &spec.reference {
            return Ok(get_nested_in(result, reference).cloned().unwrap_or(Value::Null));
        }
        let mut value = self.resolve_sources(spec.sources.as_deref().unwrap_or(&[]), result)?;
        if value.is_null() {
            if let Some(default) = &spec.default {
                value = default.clone();
            }
        }
        if value.is_null() {
            if spec.required {
                return Err(RemapError::MissingRequired {
                    input: name.to_string(),
                });
            }
            return Ok(Value::Null);
        }
        match &spec.transform {
            Some(chain) => self.apply_chain(chain, value),
            None => Ok(value),
        }
    }

    /// First non-null value among `sources`. An inline entry returns its
    /// result immediately, null or not.
    fn resolve_sources(
        &self,
        sources: &[SourceEntry],
        result: &Map<String, Value>,
    ) -> Result<Value, RemapError> {
        for entry in sources {
            match entry {
                SourceEntry::Inline(inline) => {
                    return self.resolve_inputs_rule(&inline.inputs, inline.transform.as_ref(), result);
                }
                SourceEntry::Param(desc) => {
                    let Some(table) = self.source.parameters(desc.file, desc.reco_id)? else {
                        continue;
                    };
                    match table.get(&desc.key) {
                        Some(value) if !value.is_null() => return Ok(value.to_json()),
                        _ => {}
                    }
                }
            }
        }
        Ok(Value::Null)
    }

    fn lookup(&self, name: &str) -> Result<&Transform, RemapError> {
        self.transforms
            .get(name)
            .ok_or_else(|| RemapError::UnknownTransform {
                name: name.to_string(),
            })
    }

    /// Apply each transform in turn to a single value.
    fn apply_chain(&self, chain: &TransformChain, mut value: Value) -> Result<Value, RemapError> {
        for name in chain.names() {
            value = self
                .lookup(name)?
                .call_value(value)
                .map_err(|e| RemapError::Transform {
                    name: name.clone(),
                    source: e,
                })?;
        }
        Ok(value)
    }

    /// Call the head of `chain` with `keywords`, then the tail positionally.
    fn apply_keywords(
        &self,
        chain: &TransformChain,
        keywords: Map<String, Value>,
    ) -> Result<Value, RemapError> {
        let Some((head, tail)) = chain.names().split_first() else {
            return Err(RemapError::config("transform list cannot be empty"));
        };
        let transform = self.lookup(head)?;
        let (extra, missing) = transform
            .signature()
            .mismatch(keywords.keys().map(String::as_str));
        if !extra.is_empty() || !missing.is_empty() {
            return Err(RemapError::TransformSignature {
                name: head.clone(),
                extra,
                missing,
            });
        }
        let value = transform
            .call_keywords(keywords)
            .map_err(|e| RemapError::Transform {
                name: head.clone(),
                source: e,
            })?;
        self.apply_chain(&TransformChain::new(tail.to_vec()), value)
    }
}
