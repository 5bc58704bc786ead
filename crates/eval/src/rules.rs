//! Rule files: conditional selection of the spec to apply to a scan.
//!
//! Every `*.yaml` file in the rules directory may list entries under
//! `info_spec`, `metadata_spec` and `converter_entrypoint`. An entry's
//! `when` is a small spec whose output becomes the bindings for its `if`
//! expression. When several entries match, the last one wins.

use crate::error::RemapError;
use crate::predicate::eval_condition;
use crate::remap::map_parameters;
use crate::scan::ParameterSource;
use pvmap_core::yaml::{has_yaml_suffix, read_yaml};
use pvmap_core::{
    validate_document, LoadOptions, LoadedSpec, SchemaKind, SourceProvider, Spec, SpecCache,
    SpecError, TransformRegistry,
};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const RULES_DIRNAME: &str = "rules";
pub const SPECS_DIRNAME: &str = "specs";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleCategory {
    InfoSpec,
    MetadataSpec,
    ConverterEntrypoint,
}

impl RuleCategory {
    pub const ALL: [RuleCategory; 3] = [
        RuleCategory::InfoSpec,
        RuleCategory::MetadataSpec,
        RuleCategory::ConverterEntrypoint,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RuleCategory::InfoSpec => "info_spec",
            RuleCategory::MetadataSpec => "metadata_spec",
            RuleCategory::ConverterEntrypoint => "converter_entrypoint",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        RuleCategory::ALL.into_iter().find(|c| c.as_str() == name)
    }

    /// Categories whose `use` names a spec file.
    pub fn selects_spec(&self) -> bool {
        !matches!(self, RuleCategory::ConverterEntrypoint)
    }
}

#[derive(Deserialize)]
struct RuleEntryRepr {
    name: String,
    #[serde(rename = "use")]
    target: String,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    when: Option<Map<String, Value>>,
    #[serde(default, rename = "if")]
    condition: Option<Value>,
}

/// One selector entry of a rule file.
#[derive(Debug, Clone)]
pub struct RuleEntry {
    pub name: String,
    pub category: RuleCategory,
    /// The `use` value as written.
    pub target: String,
    pub version: Option<String>,
    pub description: Option<String>,
    /// The `when` block, parsed as a spec.
    pub when: Spec,
    /// The raw `if` expression; parsed when evaluated.
    pub condition: Option<Value>,
    /// Resolved spec file for spec categories.
    pub spec_path: Option<PathBuf>,
    /// The referenced spec, once loaded.
    pub spec: Option<Arc<LoadedSpec>>,
}

impl RuleEntry {
    pub fn from_json(category: RuleCategory, value: &Value) -> Result<RuleEntry, RemapError> {
        let repr: RuleEntryRepr = serde_json::from_value(value.clone()).map_err(|e| {
            RemapError::config(format!("invalid {} entry: {}", category.as_str(), e))
        })?;
        let when = Spec::from_json(repr.when.unwrap_or_default())?;
        Ok(RuleEntry {
            name: repr.name,
            category,
            target: repr.target,
            version: repr.version,
            description: repr.description,
            when,
            condition: repr.condition,
            spec_path: None,
            spec: None,
        })
    }

    /// Transforms available to the `when` block: those of the referenced spec.
    pub fn transforms(&self) -> Option<&TransformRegistry> {
        self.spec.as_deref().map(|loaded| &loaded.transforms)
    }
}

/// Rule entries from every rule file, per category, in load order.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    info_spec: Vec<RuleEntry>,
    metadata_spec: Vec<RuleEntry>,
    converter_entrypoint: Vec<RuleEntry>,
}

impl RuleSet {
    pub fn get(&self, category: RuleCategory) -> &[RuleEntry] {
        match category {
            RuleCategory::InfoSpec => &self.info_spec,
            RuleCategory::MetadataSpec => &self.metadata_spec,
            RuleCategory::ConverterEntrypoint => &self.converter_entrypoint,
        }
    }

    pub fn push(&mut self, entry: RuleEntry) {
        match entry.category {
            RuleCategory::InfoSpec => self.info_spec.push(entry),
            RuleCategory::MetadataSpec => self.metadata_spec.push(entry),
            RuleCategory::ConverterEntrypoint => self.converter_entrypoint.push(entry),
        }
    }

    pub fn len(&self) -> usize {
        self.info_spec.len() + self.metadata_spec.len() + self.converter_entrypoint.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ──────────────────────────────────────────────
// Loading
// ──────────────────────────────────────────────

/// Where a rule's `use` points: absolute paths as-is, `specs/...` under
/// the root, anything else under `<root>/specs`.
pub fn resolve_spec_path(target: &str, root: &Path) -> PathBuf {
    let candidate = Path::new(target);
    if candidate.is_absolute() {
        return candidate.to_path_buf();
    }
    let under_specs = candidate
        .components()
        .next()
        .is_some_and(|c| c.as_os_str() == SPECS_DIRNAME);
    if under_specs {
        root.join(candidate)
    } else {
        root.join(SPECS_DIRNAME).join(candidate)
    }
}

/// Load `<root>/rules` with validation.
pub fn load_rules(root: &Path, provider: &dyn SourceProvider) -> Result<RuleSet, RemapError> {
    load_rules_from(
        &root.join(RULES_DIRNAME),
        root,
        provider,
        LoadOptions::default(),
    )
}

/// Load every rule file in `rules_dir`, resolving spec references against
/// `root`. Each referenced spec is loaded once.
///
/// With `options.validate`, rule files are schema-checked and a missing
/// spec is an error; without it, entries with a missing spec are kept
/// without one.
pub fn load_rules_from(
    rules_dir: &Path,
    root: &Path,
    provider: &dyn SourceProvider,
    options: LoadOptions,
) -> Result<RuleSet, RemapError> {
    let files = match provider.list_files(rules_dir) {
        Ok(files) => files,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
        Err(e) => {
            return Err(SpecError::Io {
                path: rules_dir.to_path_buf(),
                source: e,
            }
            .into())
        }
    };

    let mut cache = SpecCache::new();
    let mut rules = RuleSet::default();
    for path in files.iter().filter(|p| has_yaml_suffix(p)) {
        log::debug!("loading rule file {}", path.display());
        let doc = read_yaml(path, provider)?;
        if doc.is_null() {
            continue;
        }
        let Value::Object(map) = &doc else {
            return Err(SpecError::NotAMapping { path: path.clone() }.into());
        };
        if options.validate {
            validate_document(SchemaKind::Rules, &doc)?;
        }
        for category in RuleCategory::ALL {
            let items = match map.get(category.as_str()) {
                None | Some(Value::Null) => continue,
                Some(Value::Array(items)) => items,
                Some(_) => {
                    return Err(RemapError::config(format!(
                        "{}: {} must be a list",
                        path.display(),
                        category.as_str()
                    )))
                }
            };
            for item in items.iter().filter(|v| v.is_object()) {
                let mut entry = RuleEntry::from_json(category, item)?;
                if category.selects_spec() {
                    attach_spec(&mut entry, root, provider, options, &mut cache)?;
                }
                check_when_transforms(&entry)?;
                rules.push(entry);
            }
        }
    }
    log::debug!("loaded {} rules, {} specs", rules.len(), cache.len());
    Ok(rules)
}

fn attach_spec(
    entry: &mut RuleEntry,
    root: &Path,
    provider: &dyn SourceProvider,
    options: LoadOptions,
    cache: &mut SpecCache,
) -> Result<(), RemapError> {
    let path = resolve_spec_path(&entry.target, root);
    if !provider.is_file(&path) {
        if options.validate {
            return Err(RemapError::config(format!(
                "rule '{}' uses missing spec {}",
                entry.name,
                path.display()
            )));
        }
        log::warn!("rule '{}': spec {} not found", entry.name, path.display());
        entry.spec_path = Some(path);
        return Ok(());
    }
    entry.spec = Some(cache.load(&path, provider, options)?);
    entry.spec_path = Some(path);
    Ok(())
}

/// Every transform named in the entry's `when` block must come from the
/// spec it selects.
fn check_when_transforms(entry: &RuleEntry) -> Result<(), RemapError> {
    let empty = TransformRegistry::new();
    let transforms = entry.transforms().unwrap_or(&empty);
    for (name, key) in entry.when.transform_refs() {
        if !transforms.contains(name) {
            return Err(SpecError::UnknownTransform {
                name: name.to_string(),
                key: format!("{}.when.{}", entry.name, key),
            }
            .into());
        }
    }
    Ok(())
}

// ──────────────────────────────────────────────
// Selection
// ──────────────────────────────────────────────

/// Run the entry's `when` block against `source` and test its `if`.
pub fn rule_matches(source: &dyn ParameterSource, rule: &RuleEntry) -> Result<bool, RemapError> {
    let bindings = if rule.when.is_empty() {
        Map::new()
    } else {
        let empty = TransformRegistry::new();
        let transforms = rule.transforms().unwrap_or(&empty);
        match map_parameters(source, &rule.when, transforms)? {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    };
    eval_condition(rule.condition.as_ref(), &bindings).map_err(|e| RemapError::RuleEvaluation {
        name: rule.name.clone(),
        message: e.to_string(),
    })
}

/// The last entry of `rules` that matches `source`.
pub fn select_rule_use<'r>(
    source: &dyn ParameterSource,
    rules: &'r [RuleEntry],
) -> Result<Option<&'r RuleEntry>, RemapError> {
    let mut selected = None;
    for rule in rules {
        if rule_matches(source, rule)? {
            log::debug!("rule '{}' matches", rule.name);
            selected = Some(rule);
        }
    }
    Ok(selected)
}

/// The `metadata_spec` entry selected for `source`.
pub fn resolve_metadata_spec<'r>(
    source: &dyn ParameterSource,
    rules: &'r RuleSet,
) -> Result<Option<&'r RuleEntry>, RemapError> {
    select_rule_use(source, rules.get(RuleCategory::MetadataSpec))
}
