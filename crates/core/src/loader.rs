//! Spec loading: include resolution, cycle detection, merging and transform
//! registry assembly.

use crate::error::SpecError;
use crate::source::{FileSystemProvider, SourceProvider};
use crate::spec::{Spec, META_KEY, SPEC_PATH_KEY};
use crate::transforms::TransformRegistry;
use crate::validate::{validate_document, SchemaKind};
use crate::yaml::{has_yaml_suffix, read_yaml_mapping};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncludeMode {
    Override,
    Strict,
}

#[derive(Debug, Clone, Copy)]
pub struct LoadOptions {
    /// Validate the merged document against the spec schema.
    pub validate: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        LoadOptions { validate: true }
    }
}

/// A spec together with the transforms its sources define.
#[derive(Debug, Clone)]
pub struct LoadedSpec {
    pub spec: Spec,
    pub transforms: TransformRegistry,
}

/// Load a spec file and everything it includes, returning the merged spec
/// and its transform registry.
///
/// Uses the default [`FileSystemProvider`] for file I/O.
pub fn load_spec(path: &Path) -> Result<(Spec, TransformRegistry), SpecError> {
    load_spec_with_provider(path, &FileSystemProvider, LoadOptions::default())
}

/// Load a spec file through `provider`.
pub fn load_spec_with_provider(
    path: &Path,
    provider: &dyn SourceProvider,
    options: LoadOptions,
) -> Result<(Spec, TransformRegistry), SpecError> {
    let mut stack: Vec<PathBuf> = Vec::new();
    // Parallel set for O(1) cycle checks; `stack` keeps order for messages.
    let mut stack_set: HashSet<PathBuf> = HashSet::new();

    let (root, merged, transform_paths) = load_document(path, provider, &mut stack, &mut stack_set)?;
    let merged = annotate_spec_path(merged, &root);

    if options.validate {
        validate_document(SchemaKind::Spec, &Value::Object(merged.clone()))?;
    }

    let mut seen = HashSet::new();
    let transform_paths: Vec<PathBuf> = transform_paths
        .into_iter()
        .filter(|p| seen.insert(p.clone()))
        .collect();
    if options.validate {
        if let Some(missing) = transform_paths.iter().find(|p| !provider.is_file(p)) {
            return Err(SpecError::InvalidMeta {
                path: root.clone(),
                field: "transforms_source".to_string(),
                message: format!("file not found: {}", missing.display()),
            });
        }
    }
    let transforms = TransformRegistry::from_sources(&transform_paths, provider)?;

    let spec = Spec::from_json(merged)?;
    for (name, key) in spec.transform_refs() {
        if !transforms.contains(name) {
            return Err(SpecError::UnknownTransform {
                name: name.to_string(),
                key: key.to_string(),
            });
        }
    }
    log::debug!(
        "loaded spec {} ({} rules, {} transforms)",
        root.display(),
        spec.entries().len(),
        transforms.len()
    );
    Ok((spec, transforms))
}

type Document = (PathBuf, Map<String, Value>, Vec<PathBuf>);

fn file_name(p: &Path) -> String {
    p.file_name()
        .unwrap_or_default()
        .to_string_lossy()
        .to_string()
}

fn load_document(
    path: &Path,
    provider: &dyn SourceProvider,
    stack: &mut Vec<PathBuf>,
    stack_set: &mut HashSet<PathBuf>,
) -> Result<Document, SpecError> {
    if !has_yaml_suffix(path) {
        return Err(SpecError::BadSuffix {
            path: path.to_path_buf(),
        });
    }
    let canon = provider.canonicalize(path).map_err(|e| SpecError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;

    if stack_set.contains(&canon) {
        let mut chain: Vec<String> = stack.iter().map(|p| file_name(p)).collect();
        chain.push(file_name(&canon));
        return Err(SpecError::IncludeCycle {
            chain: chain.join(" \u{2192} "),
        });
    }

    let doc = read_yaml_mapping(&canon, provider)?;
    let base_dir = canon.parent().unwrap_or(Path::new(".")).to_owned();

    let meta = match doc.get(META_KEY) {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(m)) => m.clone(),
        Some(_) => {
            return Err(SpecError::InvalidMeta {
                path: canon,
                field: META_KEY.to_string(),
                message: "must be a mapping".to_string(),
            })
        }
    };

    let mut local_transforms = Vec::new();
    collect_transform_sources(&meta, &canon, &base_dir, provider, &mut local_transforms)?;
    for (key, value) in &doc {
        if key == META_KEY {
            continue;
        }
        if let Some(Value::Object(nested)) = value.get(META_KEY) {
            collect_transform_sources(nested, &canon, &base_dir, provider, &mut local_transforms)?;
        }
    }

    let mode = match meta.get("include_mode") {
        None | Some(Value::Null) => IncludeMode::Override,
        Some(Value::String(s)) if s == "override" => IncludeMode::Override,
        Some(Value::String(s)) if s == "strict" => IncludeMode::Strict,
        Some(other) => {
            return Err(SpecError::InvalidMeta {
                path: canon,
                field: "include_mode".to_string(),
                message: format!("must be 'override' or 'strict', got {}", other),
            })
        }
    };
    let includes = string_list(meta.get("include"), &canon, "include")?;

    stack_set.insert(canon.clone());
    stack.push(canon.clone());

    let mut merged = Map::new();
    let mut transform_paths = Vec::new();
    for include in &includes {
        let resolved = provider
            .resolve_relative(&base_dir, include)
            .and_then(|p| provider.canonicalize(&p))
            .map_err(|e| SpecError::UnresolvedInclude {
                include: include.clone(),
                from: canon.clone(),
                source: e,
            })?;
        log::debug!("{} includes {}", canon.display(), resolved.display());
        let (_, child, child_transforms) = load_document(&resolved, provider, stack, stack_set)?;
        transform_paths.extend(child_transforms);
        for (key, value) in child {
            if key == META_KEY {
                continue;
            }
            merge_key(&mut merged, key, value, mode, &canon)?;
        }
    }

    stack.pop();
    stack_set.remove(&canon);

    for (key, value) in doc {
        if key == META_KEY {
            continue;
        }
        merge_key(&mut merged, key, value, mode, &canon)?;
    }

    let mut meta = meta;
    meta.remove("include");
    meta.remove("include_mode");
    if !meta.is_empty() {
        merged.insert(META_KEY.to_string(), Value::Object(meta));
    }

    transform_paths.extend(local_transforms);
    Ok((canon, merged, transform_paths))
}

fn merge_key(
    merged: &mut Map<String, Value>,
    key: String,
    value: Value,
    mode: IncludeMode,
    path: &Path,
) -> Result<(), SpecError> {
    if mode == IncludeMode::Strict && merged.contains_key(&key) {
        return Err(SpecError::IncludeConflict {
            key,
            path: path.to_path_buf(),
        });
    }
    merged.insert(key, value);
    Ok(())
}

fn string_list(value: Option<&Value>, path: &Path, field: &str) -> Result<Vec<String>, SpecError> {
    let invalid = || SpecError::InvalidMeta {
        path: path.to_path_buf(),
        field: field.to_string(),
        message: "must be a string or list of strings".to_string(),
    };
    match value {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::String(s)) => Ok(vec![s.clone()]),
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| v.as_str().map(str::to_owned).ok_or_else(invalid))
            .collect(),
        Some(_) => Err(invalid()),
    }
}

fn collect_transform_sources(
    meta: &Map<String, Value>,
    spec_path: &Path,
    base_dir: &Path,
    provider: &dyn SourceProvider,
    out: &mut Vec<PathBuf>,
) -> Result<(), SpecError> {
    for item in string_list(meta.get("transforms_source"), spec_path, "transforms_source")? {
        let resolved = provider
            .resolve_relative(base_dir, &item)
            .map_err(|e| SpecError::Io {
                path: base_dir.join(&item),
                source: e,
            })?;
        out.push(resolved);
    }
    Ok(())
}

/// Record the spec's own path in its `__meta__` and in every rule-level
/// `__meta__`, so relative references (such as `map_file`) resolve later.
fn annotate_spec_path(mut doc: Map<String, Value>, path: &Path) -> Map<String, Value> {
    let path_value = Value::String(path.to_string_lossy().to_string());
    for (key, value) in doc.iter_mut() {
        if key == META_KEY {
            continue;
        }
        if let Some(Value::Object(nested)) = value.get_mut(META_KEY) {
            nested.insert(SPEC_PATH_KEY.to_string(), path_value.clone());
        }
    }
    match doc.get_mut(META_KEY) {
        Some(Value::Object(meta)) => {
            meta.insert(SPEC_PATH_KEY.to_string(), path_value);
        }
        _ => {
            let mut meta = Map::new();
            meta.insert(SPEC_PATH_KEY.to_string(), path_value);
            doc.insert(META_KEY.to_string(), Value::Object(meta));
        }
    }
    doc
}

/// Loaded specs keyed by canonical path, so a rule directory that refers to
/// the same spec many times parses it once. Owned by one rule-loading call.
#[derive(Default)]
pub struct SpecCache {
    entries: HashMap<PathBuf, Arc<LoadedSpec>>,
}

impl SpecCache {
    pub fn new() -> Self {
        SpecCache::default()
    }

    pub fn load(
        &mut self,
        path: &Path,
        provider: &dyn SourceProvider,
        options: LoadOptions,
    ) -> Result<Arc<LoadedSpec>, SpecError> {
        let canon = provider.canonicalize(path).map_err(|e| SpecError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        if let Some(hit) = self.entries.get(&canon) {
            return Ok(Arc::clone(hit));
        }
        let (spec, transforms) = load_spec_with_provider(&canon, provider, options)?;
        let loaded = Arc::new(LoadedSpec { spec, transforms });
        self.entries.insert(canon, Arc::clone(&loaded));
        Ok(loaded)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::InMemoryProvider;

    fn load(provider: &InMemoryProvider, path: &str) -> Result<(Spec, TransformRegistry), SpecError> {
        load_spec_with_provider(Path::new(path), provider, LoadOptions::default())
    }

    fn keys(spec: &Spec) -> Vec<&str> {
        spec.entries().iter().map(|e| e.key.as_str()).collect()
    }

    fn rule_key(spec: &Spec, key: &str) -> String {
        let entry = spec.entries().iter().find(|e| e.key == key).unwrap();
        match &entry.rule.sources.as_ref().unwrap()[0] {
            crate::spec::SourceEntry::Param(d) => d.key.clone(),
            other => panic!("unexpected source {:?}", other),
        }
    }

    const BASE: &str = "\
shared:
  sources: [{file: method, key: FromBase}]
base_only:
  sources: [{file: method, key: B}]
";

    #[test]
    fn override_mode_local_wins() {
        let provider = InMemoryProvider::default()
            .with_file("/specs/base.yaml", BASE)
            .with_file(
                "/specs/child.yaml",
                "__meta__:\n  include: base.yaml\n  name: child\nshared:\n  sources: [{file: method, key: FromChild}]\n",
            );
        let (spec, _) = load(&provider, "/specs/child.yaml").unwrap();
        assert_eq!(keys(&spec), vec!["shared", "base_only"]);
        assert_eq!(rule_key(&spec, "shared"), "FromChild");
        assert_eq!(spec.meta().name.as_deref(), Some("child"));
        assert!(spec.meta().extra.get("include").is_none());
        assert_eq!(spec.spec_path(), Some(Path::new("/specs/child.yaml")));
    }

    #[test]
    fn strict_mode_conflict_raises() {
        let provider = InMemoryProvider::default()
            .with_file("/specs/base.yaml", BASE)
            .with_file(
                "/specs/child.yaml",
                "__meta__:\n  include: [base.yaml]\n  include_mode: strict\nshared:\n  sources: [{file: method, key: X}]\n",
            );
        let err = load(&provider, "/specs/child.yaml").unwrap_err();
        assert!(matches!(err, SpecError::IncludeConflict { ref key, .. } if key == "shared"));
    }

    #[test]
    fn include_cycle_is_detected() {
        let provider = InMemoryProvider::default()
            .with_file("/s/a.yaml", "__meta__: {include: b.yaml}\n")
            .with_file("/s/b.yaml", "__meta__: {include: a.yaml}\n");
        let err = load(&provider, "/s/a.yaml").unwrap_err();
        match err {
            SpecError::IncludeCycle { chain } => {
                assert_eq!(chain, "a.yaml \u{2192} b.yaml \u{2192} a.yaml")
            }
            other => panic!("expected cycle, got {}", other),
        }
    }

    #[test]
    fn diamond_include_is_not_a_cycle() {
        let provider = InMemoryProvider::default()
            .with_file("/s/common.yaml", "c:\n  sources: [{file: acqp, key: C}]\n")
            .with_file("/s/left.yaml", "__meta__: {include: common.yaml}\n")
            .with_file("/s/right.yaml", "__meta__: {include: common.yaml}\n")
            .with_file("/s/top.yaml", "__meta__: {include: [left.yaml, right.yaml]}\n");
        let (spec, _) = load(&provider, "/s/top.yaml").unwrap();
        assert_eq!(keys(&spec), vec!["c"]);
    }

    #[test]
    fn unresolved_include_is_error() {
        let provider =
            InMemoryProvider::default().with_file("/s/a.yaml", "__meta__: {include: missing.yaml}\n");
        let err = load(&provider, "/s/a.yaml").unwrap_err();
        assert!(matches!(err, SpecError::UnresolvedInclude { .. }));
    }

    #[test]
    fn bad_suffix_and_non_mapping() {
        let provider = InMemoryProvider::default()
            .with_file("/s/a.json", "{}")
            .with_file("/s/list.yaml", "- 1\n- 2\n");
        assert!(matches!(load(&provider, "/s/a.json"), Err(SpecError::BadSuffix { .. })));
        assert!(matches!(load(&provider, "/s/list.yaml"), Err(SpecError::NotAMapping { .. })));
    }

    #[test]
    fn invalid_include_mode() {
        let provider =
            InMemoryProvider::default().with_file("/s/a.yaml", "__meta__: {include_mode: merge}\n");
        let err = load(&provider, "/s/a.yaml").unwrap_err();
        assert!(matches!(err, SpecError::InvalidMeta { ref field, .. } if field == "include_mode"));
    }

    #[test]
    fn transforms_from_includes_and_nested_meta() {
        let provider = InMemoryProvider::default()
            .with_file("/s/t/base.yaml", "norm: lower\n")
            .with_file("/s/t/local.yaml", "norm: upper\nlabel: strip\n")
            .with_file(
                "/s/base.yaml",
                "__meta__: {transforms_source: t/base.yaml}\n",
            )
            .with_file(
                "/s/top.yaml",
                "__meta__: {include: base.yaml}\nout:\n  __meta__: {transforms_source: [t/local.yaml]}\n  sources: [{file: method, key: A}]\n  transform: [norm, label]\n",
            );
        let (_, transforms) = load(&provider, "/s/top.yaml").unwrap();
        assert_eq!(transforms.names(), vec!["label", "norm"]);
        let norm = transforms.get("norm").unwrap();
        assert_eq!(
            norm.call_value(serde_json::json!("a")).unwrap(),
            serde_json::json!("A")
        );
    }

    #[test]
    fn unknown_transform_fails_at_load() {
        let provider = InMemoryProvider::default().with_file(
            "/s/a.yaml",
            "out:\n  sources: [{file: method, key: A}]\n  transform: nowhere\n",
        );
        let err = load(&provider, "/s/a.yaml").unwrap_err();
        assert!(matches!(err, SpecError::UnknownTransform { ref name, .. } if name == "nowhere"));
    }

    #[test]
    fn missing_transform_source_fails_validation() {
        let provider = InMemoryProvider::default()
            .with_file("/s/a.yaml", "__meta__: {transforms_source: nope.yaml}\n");
        let err = load(&provider, "/s/a.yaml").unwrap_err();
        assert!(matches!(err, SpecError::InvalidMeta { .. }));
    }

    #[test]
    fn schema_violation_is_aggregated() {
        let provider = InMemoryProvider::default().with_file(
            "/s/a.yaml",
            "a:\n  sources: [{file: fid, key: A}]\nb:\n  sources: [{file: method}]\n",
        );
        match load(&provider, "/s/a.yaml").unwrap_err() {
            SpecError::Validation { errors, .. } => assert!(errors.len() >= 2),
            other => panic!("expected validation error, got {}", other),
        }
    }

    #[test]
    fn cache_loads_each_path_once() {
        let provider = InMemoryProvider::default().with_file("/s/a.yaml", BASE);
        let mut cache = SpecCache::new();
        let first = cache.load(Path::new("/s/a.yaml"), &provider, LoadOptions::default()).unwrap();
        let again = cache
            .load(Path::new("/s/../s/a.yaml"), &provider, LoadOptions::default())
            .unwrap();
        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(cache.len(), 1);
    }
}
