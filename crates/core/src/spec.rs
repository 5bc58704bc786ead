//! Typed remapping specs.
//!
//! A spec is an ordered mapping of output key → [`Rule`] plus an optional
//! `__meta__` block. Output keys may be dotted (`subject.id`). Rules are
//! evaluated in the order they appear, so a rule may `ref` outputs written
//! by earlier rules.

use crate::error::SpecError;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::path::{Path, PathBuf};

pub const META_KEY: &str = "__meta__";
pub const SPEC_PATH_KEY: &str = "__spec_path__";

/// Parameter files a source descriptor can read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamFile {
    Method,
    Acqp,
    VisuPars,
    Reco,
    Subject,
}

impl ParamFile {
    pub const ALL: [ParamFile; 5] = [
        ParamFile::Method,
        ParamFile::Acqp,
        ParamFile::VisuPars,
        ParamFile::Reco,
        ParamFile::Subject,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ParamFile::Method => "method",
            ParamFile::Acqp => "acqp",
            ParamFile::VisuPars => "visu_pars",
            ParamFile::Reco => "reco",
            ParamFile::Subject => "subject",
        }
    }

    /// `visu_pars` and `reco` live under a reconstruction.
    pub fn is_reco_scoped(&self) -> bool {
        matches!(self, ParamFile::VisuPars | ParamFile::Reco)
    }

    pub fn from_name(name: &str) -> Option<Self> {
        ParamFile::ALL.into_iter().find(|f| f.as_str() == name)
    }
}

impl fmt::Display for ParamFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `{file, key, reco_id?}`: read `key` from a parameter file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceDescriptor {
    pub file: ParamFile,
    pub key: String,
    #[serde(default)]
    pub reco_id: Option<u32>,
}

/// `{inputs, transform?}` used in place of a descriptor.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InlineSource {
    pub inputs: InputMap,
    #[serde(default)]
    pub transform: Option<TransformChain>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum SourceEntry {
    Inline(InlineSource),
    Param(SourceDescriptor),
}

/// One transform name or an ordered chain of names.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(from = "ChainRepr")]
pub struct TransformChain(Vec<String>);

#[derive(Deserialize)]
#[serde(untagged)]
enum ChainRepr {
    One(String),
    Many(Vec<String>),
}

impl From<ChainRepr> for TransformChain {
    fn from(repr: ChainRepr) -> Self {
        match repr {
            ChainRepr::One(name) => TransformChain(vec![name]),
            ChainRepr::Many(names) => TransformChain(names),
        }
    }
}

impl TransformChain {
    pub fn new(names: Vec<String>) -> Self {
        TransformChain(names)
    }

    pub fn names(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

fn present<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Value>, D::Error> {
    Value::deserialize(d).map(Some)
}

/// How one named input of an `inputs` block is resolved.
///
/// `const` and `default` distinguish "absent" (`None`) from an explicit
/// null (`Some(Value::Null)`).
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InputSpec {
    #[serde(default)]
    pub sources: Option<Vec<SourceEntry>>,
    #[serde(default, rename = "const", deserialize_with = "present")]
    pub constant: Option<Value>,
    #[serde(default, rename = "ref")]
    pub reference: Option<String>,
    #[serde(default, deserialize_with = "present")]
    pub default: Option<Value>,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub transform: Option<TransformChain>,
}

/// Named inputs in declaration order.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(try_from = "Map<String, Value>")]
pub struct InputMap(Vec<(String, InputSpec)>);

impl TryFrom<Map<String, Value>> for InputMap {
    type Error = String;

    fn try_from(map: Map<String, Value>) -> Result<Self, Self::Error> {
        let mut inputs = Vec::with_capacity(map.len());
        for (name, body) in map {
            let spec: InputSpec = serde_json::from_value(body)
                .map_err(|e| format!("input '{}': {}", name, e))?;
            inputs.push((name, spec));
        }
        Ok(InputMap(inputs))
    }
}

impl InputMap {
    pub fn iter(&self) -> impl Iterator<Item = (&str, &InputSpec)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// How one output key is produced.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Rule {
    #[serde(default)]
    pub sources: Option<Vec<SourceEntry>>,
    #[serde(default)]
    pub inputs: Option<InputMap>,
    #[serde(default)]
    pub transform: Option<TransformChain>,
    #[serde(default, rename = "__meta__")]
    pub meta: Option<Map<String, Value>>,
}

/// One rule together with its output key and authored body.
#[derive(Debug, Clone, PartialEq)]
pub struct SpecEntry {
    pub key: String,
    pub rule: Rule,
    /// The rule as written, for error messages.
    pub body: Value,
}

/// The `__meta__` block of a merged spec.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpecMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub map_file: Option<String>,
    #[serde(default, rename = "__spec_path__", skip_serializing_if = "Option::is_none")]
    pub spec_path: Option<PathBuf>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A parsed spec, ready for evaluation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Spec {
    entries: Vec<SpecEntry>,
    meta: SpecMeta,
    raw: Map<String, Value>,
}

impl Spec {
    /// Build a spec from its JSON document. Every non-`__meta__` value must
    /// be a rule mapping with only the known rule keys.
    pub fn from_json(doc: Map<String, Value>) -> Result<Spec, SpecError> {
        let mut entries = Vec::new();
        let mut meta = SpecMeta::default();
        for (key, body) in &doc {
            if key == META_KEY {
                meta = serde_json::from_value(body.clone()).map_err(|e| SpecError::InvalidRule {
                    key: META_KEY.to_string(),
                    message: e.to_string(),
                })?;
                continue;
            }
            if !body.is_object() {
                return Err(SpecError::InvalidRule {
                    key: key.clone(),
                    message: "rule must be a mapping".to_string(),
                });
            }
            let rule: Rule =
                serde_json::from_value(body.clone()).map_err(|e| SpecError::InvalidRule {
                    key: key.clone(),
                    message: e.to_string(),
                })?;
            entries.push(SpecEntry {
                key: key.clone(),
                rule,
                body: body.clone(),
            });
        }
        Ok(Spec {
            entries,
            meta,
            raw: doc,
        })
    }

    /// Build a spec from any JSON value; the value must be a mapping.
    pub fn from_value(value: Value) -> Result<Spec, SpecError> {
        match value {
            Value::Object(doc) => Spec::from_json(doc),
            _ => Err(SpecError::InvalidRule {
                key: "<spec>".to_string(),
                message: "spec must be a mapping".to_string(),
            }),
        }
    }

    /// Parse a spec from YAML text without include or transform handling.
    pub fn from_yaml_str(text: &str) -> Result<Spec, SpecError> {
        let value = crate::yaml::parse_yaml(text, Path::new("<inline>"))?;
        if value.is_null() {
            return Ok(Spec::default());
        }
        Spec::from_value(value)
    }

    pub fn entries(&self) -> &[SpecEntry] {
        &self.entries
    }

    pub fn meta(&self) -> &SpecMeta {
        &self.meta
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The document as loaded (merged, with `__spec_path__` annotations).
    pub fn to_json(&self) -> Value {
        Value::Object(self.raw.clone())
    }

    pub fn spec_path(&self) -> Option<&Path> {
        self.meta.spec_path.as_deref()
    }

    /// Every transform name referenced anywhere in the spec, paired with the
    /// output key that references it.
    pub fn transform_refs(&self) -> Vec<(&str, &str)> {
        let mut out = Vec::new();
        for entry in &self.entries {
            let key = entry.key.as_str();
            chain_refs(entry.rule.transform.as_ref(), key, &mut out);
            if let Some(sources) = &entry.rule.sources {
                source_refs(sources, key, &mut out);
            }
            if let Some(inputs) = &entry.rule.inputs {
                input_refs(inputs, key, &mut out);
            }
        }
        out
    }

    /// Every parameter-file descriptor reachable from the spec.
    pub fn descriptors(&self) -> Vec<&SourceDescriptor> {
        let mut out = Vec::new();
        for entry in &self.entries {
            if let Some(sources) = &entry.rule.sources {
                collect_descriptors(sources, &mut out);
            }
            if let Some(inputs) = &entry.rule.inputs {
                collect_input_descriptors(inputs, &mut out);
            }
        }
        out
    }
}

fn chain_refs<'a>(chain: Option<&'a TransformChain>, key: &'a str, out: &mut Vec<(&'a str, &'a str)>) {
    if let Some(chain) = chain {
        out.extend(chain.names().iter().map(|n| (n.as_str(), key)));
    }
}

fn source_refs<'a>(sources: &'a [SourceEntry], key: &'a str, out: &mut Vec<(&'a str, &'a str)>) {
    for source in sources {
        if let SourceEntry::Inline(inline) = source {
            chain_refs(inline.transform.as_ref(), key, out);
            input_refs(&inline.inputs, key, out);
        }
    }
}

fn input_refs<'a>(inputs: &'a InputMap, key: &'a str, out: &mut Vec<(&'a str, &'a str)>) {
    for (_, input) in inputs.iter() {
        chain_refs(input.transform.as_ref(), key, out);
        if let Some(sources) = &input.sources {
            source_refs(sources, key, out);
        }
    }
}

fn collect_descriptors<'a>(sources: &'a [SourceEntry], out: &mut Vec<&'a SourceDescriptor>) {
    for source in sources {
        match source {
            SourceEntry::Param(desc) => out.push(desc),
            SourceEntry::Inline(inline) => collect_input_descriptors(&inline.inputs, out),
        }
    }
}

fn collect_input_descriptors<'a>(inputs: &'a InputMap, out: &mut Vec<&'a SourceDescriptor>) {
    for (_, input) in inputs.iter() {
        if let Some(sources) = &input.sources {
            collect_descriptors(sources, out);
        }
    }
}
